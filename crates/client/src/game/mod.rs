// World state - views, entity store, merge, per-frame snapshot
//
// The World is owned by exactly one task. Every mutation (decoded messages,
// connection events, ticks) goes through `&mut self`, and merge runs to
// completion inside the handler that triggered it, so a frame built
// afterwards never sees a half-merged table.
mod entity;
mod merge;
mod store;
mod view;

pub use entity::{DeadTo, Death, Descriptors, Entity};
pub use merge::{MergeEngine, MergeOutcome, MergeStrategy};
pub use store::{EntityStore, Resolution, DEATH_GRACE_MS};
pub use view::{ServerStats, View, ViewId};

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec2;
use protocol::packets::{ChatMessage, ServerMessage, WorldUpdate};
use tracing::{debug, trace, warn};

use crate::camera::{self, ViewMass};
use crate::config::{CameraConfig, Config};
use crate::network::{ConnectionState, NetEventKind};
use crate::render::{CameraSnapshot, Frame, Interpolator, RenderCell, ViewFrame};

/// Chat messages kept for the chat widget.
pub const CHAT_HISTORY: usize = 100;

pub struct World {
    store: EntityStore,
    views: BTreeMap<ViewId, View>,
    merge: MergeEngine,
    interp: Interpolator,
    camera: CameraConfig,
    jelly_physics: bool,
    chat: Arc<Vec<(ViewId, ChatMessage)>>,
    last_merge: Option<MergeOutcome>,
}

impl World {
    pub fn new(config: &Config) -> Self {
        Self {
            store: EntityStore::new(),
            views: BTreeMap::new(),
            merge: MergeEngine::new(config.sync.strategy),
            interp: Interpolator::new(config.render.draw_delay_ms as f64, config.render.jelly_factor),
            camera: config.camera.clone(),
            jelly_physics: config.render.jelly_physics,
            chat: Arc::new(Vec::new()),
            last_merge: None,
        }
    }

    /// Create `id` if it does not exist yet.
    pub fn create_view(&mut self, id: ViewId) -> &mut View {
        self.views.entry(id).or_insert_with(|| View::new(id))
    }

    pub fn view(&self, id: ViewId) -> Option<&View> {
        self.views.get(&id)
    }

    pub fn view_mut(&mut self, id: ViewId) -> Option<&mut View> {
        self.views.get_mut(&id)
    }

    pub fn views(&self) -> impl Iterator<Item = &View> {
        self.views.values()
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn interpolator(&self) -> &Interpolator {
        &self.interp
    }

    pub fn last_merge(&self) -> Option<MergeOutcome> {
        self.last_merge
    }

    pub fn chat(&self) -> &[(ViewId, ChatMessage)] {
        &self.chat
    }

    /// Views currently receiving updates, in view order.
    pub fn active_views(&self) -> Vec<ViewId> {
        self.views
            .values()
            .filter(|view| view.is_active())
            .map(|view| view.id)
            .collect()
    }

    pub fn handle_event(&mut self, view: ViewId, kind: NetEventKind, now: f64) {
        match kind {
            NetEventKind::State(state) => self.set_connection(view, state, now),
            NetEventKind::Message(message) => self.handle_message(view, message, now),
            NetEventKind::Latency(latency) => {
                if let Some(view) = self.views.get_mut(&view) {
                    view.latency = latency;
                }
            }
        }
    }

    fn set_connection(&mut self, id: ViewId, state: ConnectionState, now: f64) {
        let Some(view) = self.views.get_mut(&id) else {
            return;
        };
        debug!(view = %id, "connection {} -> {}", view.connection, state);
        view.connection = state;
        if state == ConnectionState::Closed {
            self.reset_view(id, now);
        }
    }

    /// Tear down `id`'s contributions: its copies die now and leave the
    /// table once the grace window passes.
    pub fn close_view(&mut self, id: ViewId, now: f64) {
        if let Some(view) = self.views.get_mut(&id) {
            view.connection = ConnectionState::Closed;
        }
        self.reset_view(id, now);
    }

    fn reset_view(&mut self, id: ViewId, now: f64) {
        if let Some(view) = self.views.get_mut(&id) {
            view.owned.clear();
            view.latency = None;
            view.camera.spectate = None;
        }
        self.store.mark_all_dead(id, now, &self.interp);
        self.recompute(now);
    }

    /// Apply one decoded message received on `view`.
    pub fn handle_message(&mut self, id: ViewId, message: ServerMessage, now: f64) {
        let Some(view) = self.views.get_mut(&id) else {
            debug!(view = %id, "message for unknown view, ignoring");
            return;
        };

        match message {
            ServerMessage::WorldUpdate(update) => self.handle_world_update(id, update, now),
            ServerMessage::Camera { x, y, scale } => {
                view.camera.spectate = Some((Vec2::new(x, y), scale));
            }
            ServerMessage::ClearAll => {
                view.owned.clear();
                self.store.mark_all_dead(id, now, &self.interp);
                self.recompute(now);
            }
            ServerMessage::ClearOwned => view.owned.clear(),
            ServerMessage::OwnedCell(cell) => {
                if !view.owns(cell) {
                    view.owned.push(cell);
                }
            }
            ServerMessage::Leaderboard(entries) => view.leaderboard = entries,
            ServerMessage::Border(border) => {
                // Spectators start looking at the middle of the map.
                if view.owned.is_empty() && view.camera.pos == Vec2::ZERO {
                    let (cx, cy) = border.center();
                    let center = Vec2::new(cx as f32, cy as f32);
                    view.camera.pos = center;
                    view.camera.target_pos = center;
                }
                view.border = Some(border);
            }
            ServerMessage::Chat(chat) => {
                let log = Arc::make_mut(&mut self.chat);
                if log.len() >= CHAT_HISTORY {
                    log.remove(0);
                }
                log.push((id, chat));
            }
            ServerMessage::ServerStats(raw) => {
                match serde_json::from_str::<ServerStats>(&raw) {
                    Ok(stats) => view.stats = Some(stats),
                    Err(e) => warn!(view = %id, "Failed to parse server stats: {}", e),
                }
                view.raw_stats = Some(raw);
            }
        }
    }

    fn handle_world_update(&mut self, id: ViewId, update: WorldUpdate, now: f64) {
        trace!(
            view = %id,
            kills = update.kills.len(),
            upserts = update.upserts.len(),
            deletes = update.deletes.len(),
            "world update"
        );
        let Some(view) = self.views.get_mut(&id) else {
            return;
        };

        for kill in &update.kills {
            self.store
                .mark_dead(id, kill.killed, Some(kill.killer), now, &self.interp);
            view.disown(kill.killed);
        }
        for cell in &update.upserts {
            self.store.upsert(id, cell, now, &self.interp);
        }
        for &deleted in &update.deletes {
            self.store.mark_dead(id, deleted, None, now, &self.interp);
            view.disown(deleted);
        }

        self.store.prune(now);
        self.recompute(now);
    }

    /// Run the merge engine over the whole table.
    pub fn recompute(&mut self, now: f64) -> MergeOutcome {
        let active = self.active_views();
        let outcome = self
            .merge
            .recompute(&mut self.store, &active, now, &self.interp);
        if outcome == MergeOutcome::Deferred && self.last_merge != Some(MergeOutcome::Deferred) {
            debug!("views disagree, holding merged state");
        }
        self.last_merge = Some(outcome);
        outcome
    }

    /// Drop expired copies and re-merge what is left.
    pub fn prune(&mut self, now: f64) {
        if self.store.prune(now) > 0 {
            trace!("pruned resolutions");
        }
        self.recompute(now);
    }

    /// Set the movement target sent for `view` on every input tick.
    pub fn set_target(&mut self, id: ViewId, target: Vec2) {
        match self.views.get_mut(&id) {
            Some(view) => view.target = Some(target),
            None => debug!(view = %id, "move for unknown view, ignoring"),
        }
    }

    /// Multiply the manual zoom factor of every view.
    pub fn zoom(&mut self, factor: f32) {
        for view in self.views.values_mut() {
            view.camera.adjust_zoom_factor(factor);
        }
    }

    /// Owned, alive cells of `id`.
    fn owned_cells(&self, id: ViewId) -> impl Iterator<Item = &Entity> {
        let owned = self.views.get(&id).map(|view| view.owned.as_slice()).unwrap_or_default();
        owned
            .iter()
            .filter_map(move |&cell| owned_entity(&self.store, id, cell))
            .filter(|entity| entity.is_alive())
    }

    /// Σ floor(r² / 100) over the owned, alive cells of `id`.
    pub fn score(&self, id: ViewId) -> u32 {
        self.owned_cells(id).map(Entity::mass).sum()
    }

    /// Whether any view owns a live cell.
    pub fn alive(&self) -> bool {
        self.views
            .keys()
            .any(|&id| self.owned_cells(id).next().is_some())
    }

    fn describe(&self, id: ViewId, now: f64) -> ViewMass {
        let mut mass = ViewMass::new(id);
        for entity in self.owned_cells(id) {
            let xyr = self.interp.position_at(entity, None, now);
            mass.add(xyr.pos, xyr.r, entity.mass(), self.camera.weighting);
        }
        mass
    }

    /// Update `id`'s camera target from its own cells and any views merging
    /// with it, then ease toward it. `dt` is in seconds.
    pub fn compute_camera(&mut self, id: ViewId, now: f64, dt: f32) {
        let me = self.describe(id, now);
        let others: Vec<ViewMass> = self
            .active_views()
            .into_iter()
            .filter(|&other| other != id)
            .map(|other| self.describe(other, now))
            .collect();
        let partners = camera::partners(&me, &others, &self.camera);
        let target = (!me.is_empty()).then(|| camera::target(&me, &partners, &self.camera));
        let merging = partners.iter().map(|m| m.view).collect();

        let Some(view) = self.views.get_mut(&id) else {
            return;
        };
        let camera = &mut view.camera;
        camera.merging = merging;
        match (target, camera.spectate) {
            (Some((pos, zoom)), _) => {
                camera.target_pos = pos;
                camera.target_scale = zoom * camera.zoom_factor;
            }
            (None, Some((pos, scale))) => {
                camera.target_pos = pos;
                camera.target_scale = scale * camera.zoom_factor;
            }
            (None, None) => {}
        }
        camera.step(target.is_some(), dt, &self.camera);
    }

    /// Advance every camera and build the render snapshot for `now`.
    pub fn frame(&mut self, now: f64, dt: f32) -> Frame {
        let ids: Vec<ViewId> = self.views.keys().copied().collect();
        for &id in &ids {
            self.compute_camera(id, now, dt);
        }

        let mut cells: Vec<RenderCell> = self
            .store
            .iter()
            .filter_map(|(_, resolution)| resolution.merged.as_ref())
            .filter_map(|entity| self.render_cell(entity, now))
            .collect();
        cells.sort_by(|a, b| a.r.total_cmp(&b.r));

        let views = self
            .views
            .values()
            .map(|view| ViewFrame {
                id: view.id,
                camera: CameraSnapshot {
                    pos: view.camera.pos,
                    scale: view.camera.scale,
                    merging: view.camera.merging.iter().copied().collect(),
                },
                border: view.border,
                leaderboard: view.leaderboard.clone(),
                owned: view.owned.clone(),
                alive: self.owned_cells(view.id).next().is_some(),
                score: self.score(view.id),
                stats: view.stats.clone(),
                latency: view.latency,
                connection: view.connection,
            })
            .collect();

        Frame {
            at: now,
            cells,
            views,
            chat: Arc::clone(&self.chat),
        }
    }

    fn render_cell(&self, entity: &Entity, now: f64) -> Option<RenderCell> {
        let alpha = entity.alpha(now);
        if !entity.is_alive() && alpha <= 0.0 {
            return None;
        }
        let killer = entity
            .killer()
            .and_then(|killer| self.store.get(killer))
            .and_then(|resolution| resolution.merged.as_ref());
        let xyr = self.interp.position_at(entity, killer, now);
        Some(RenderCell {
            id: entity.id,
            pos: xyr.pos,
            r: xyr.r,
            jelly_r: if self.jelly_physics { xyr.jelly_r } else { xyr.r },
            alpha,
            color: entity.color,
            name: entity.name.clone(),
            skin: entity.skin.clone(),
            clan: entity.clan.clone(),
            subscriber: entity.subscriber,
            spiked: entity.spiked,
            pellet: entity.pellet,
            ejected: entity.ejected,
            dead: !entity.is_alive(),
        })
    }
}

/// The merged copy of `cell`, or `view`'s own copy before the first merge.
fn owned_entity(store: &EntityStore, view: ViewId, cell: u32) -> Option<&Entity> {
    let resolution = store.get(cell)?;
    resolution
        .merged
        .as_ref()
        .or_else(|| resolution.views.get(&view))
}
