// Cross-view merge: turns per-view copies into one render-facing entity
//
// Strategies:
//   passthrough  at most one active view; merged = that view's copy
//   alpha        per id, the copy with the greatest visibility wins
//   flawless     every visible copy of every id must agree, or nothing moves
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::entity::{Death, Entity};
use super::store::{EntityStore, Resolution, DEATH_GRACE_MS};
use super::view::ViewId;
use crate::render::Interpolator;

/// Spawn age after which a copy counts as fully visible.
const VISIBILITY_CAP_MS: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Latest-wins; tolerant of lag, may warp.
    Alpha,
    /// Table-wide agreement or no update at all.
    #[default]
    Flawless,
}

/// What one `recompute` did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Passthrough,
    Committed,
    /// Views disagreed somewhere; every merged record is untouched.
    Deferred,
}

#[derive(Debug, Clone, Copy)]
pub struct MergeEngine {
    pub strategy: MergeStrategy,
}

impl MergeEngine {
    pub fn new(strategy: MergeStrategy) -> Self {
        Self { strategy }
    }

    /// Recompute `merged` for every Resolution in `store`.
    ///
    /// `active` lists the views currently receiving updates; with one or
    /// none the configured strategy is bypassed.
    pub fn recompute(
        &self,
        store: &mut EntityStore,
        active: &[ViewId],
        now: f64,
        interp: &Interpolator,
    ) -> MergeOutcome {
        if active.len() <= 1 {
            passthrough(store, active.first().copied());
            return MergeOutcome::Passthrough;
        }

        match self.strategy {
            MergeStrategy::Alpha => {
                alpha(store, now);
                MergeOutcome::Committed
            }
            MergeStrategy::Flawless => flawless(store, now, interp),
        }
    }
}

fn passthrough(store: &mut EntityStore, active: Option<ViewId>) {
    for resolution in store.resolutions.values_mut() {
        let chosen = active
            .filter(|view| resolution.views.contains_key(view))
            .or_else(|| resolution.views.keys().next().copied());
        let Some(view) = chosen else {
            continue;
        };
        resolution.merged = resolution.views.get(&view).cloned();
        resolution.model = Some(view);
    }
}

/// Age-based visibility in `[0, VISIBILITY_CAP_MS]`, decaying to zero over
/// the death grace window.
fn visibility(entity: &Entity, now: f64) -> f64 {
    let age = (now - entity.born_at).clamp(0.0, VISIBILITY_CAP_MS);
    match entity.dead_at() {
        Some(dead_at) => age * (1.0 - (now - dead_at) / DEATH_GRACE_MS).clamp(0.0, 1.0),
        None => age,
    }
}

fn alpha(store: &mut EntityStore, now: f64) {
    for resolution in store.resolutions.values_mut() {
        let mut best: Option<(ViewId, f64)> = None;
        // Views iterate in order, so a strict comparison keeps the earlier
        // view on ties.
        for (&view, entity) in &resolution.views {
            let score = visibility(entity, now);
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((view, score));
            }
        }
        if let Some((view, _)) = best {
            resolution.merged = resolution.views.get(&view).cloned();
            resolution.model = Some(view);
        }
    }
}

/// Pick the model for one id, or `None` when two visible copies disagree.
fn choose_model(resolution: &Resolution) -> Option<ViewId> {
    let mut visible = resolution
        .views
        .iter()
        .filter(|(_, entity)| !entity.left_view());

    if let Some((&first_view, first)) = visible.next() {
        return visible
            .all(|(_, other)| other.agrees_with(first))
            .then_some(first_view);
    }

    // Everyone lost sight of it: trust whoever saw it last.
    let mut latest: Option<(ViewId, f64)> = None;
    for (&view, entity) in &resolution.views {
        let dead_at = entity.dead_at().unwrap_or(f64::NEG_INFINITY);
        if latest.is_none_or(|(_, at)| dead_at > at) {
            latest = Some((view, dead_at));
        }
    }
    latest.map(|(view, _)| view)
}

fn flawless(store: &mut EntityStore, now: f64, interp: &Interpolator) -> MergeOutcome {
    let mut models = Vec::with_capacity(store.resolutions.len());
    for (&id, resolution) in &store.resolutions {
        match choose_model(resolution) {
            Some(view) => models.push((id, view)),
            None => {
                trace!(id, "views disagree, deferring merge");
                return MergeOutcome::Deferred;
            }
        }
    }

    for (id, view) in models {
        let Some(resolution) = store.resolutions.get_mut(&id) else {
            continue;
        };
        let Some(model) = resolution.views.get(&view) else {
            continue;
        };
        project(&mut resolution.merged, model, now, interp);
        resolution.model = Some(view);
    }
    MergeOutcome::Committed
}

/// Carry the model's latest state and any alive/dead transition onto the
/// merged copy.
fn project(merged: &mut Option<Entity>, model: &Entity, now: f64, interp: &Interpolator) {
    let Some(current) = merged.as_mut() else {
        if model.is_alive() {
            *merged = Some(model.clone());
        }
        return;
    };

    if let Some(dead_at) = current.dead_at() {
        // Only a genuine respawn at this id brings it back.
        if model.is_alive() && model.born_at > dead_at {
            *merged = Some(model.clone());
        }
        return;
    }

    if !current.agrees_with(model) {
        interp.restart(current, now);
        current.new_pos = model.new_pos;
        current.new_r = model.new_r;
    }
    current.copy_descriptors(model);

    if let Some(death) = model.death {
        interp.restart(current, now);
        current.death = Some(Death { at: now, to: death.to });
    }
}
