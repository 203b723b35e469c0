// Per-view entity store and the Resolution table
//
// Every id sighted by any view gets one Resolution holding each view's raw
// copy plus the merge result. Per-view copies are never deleted outright:
// they are marked dead and dropped by `prune` once the grace window passes.
use std::collections::{BTreeMap, HashMap};

use protocol::packets::CellUpdate;
use tracing::trace;

use super::entity::{DeadTo, Death, Descriptors, Entity};
use super::view::ViewId;
use crate::render::Interpolator;

/// How long a dead per-view copy lingers before `prune` drops it.
pub const DEATH_GRACE_MS: f64 = 200.0;

/// Cross-view bookkeeping for one entity id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Render-facing copy produced by the merge engine.
    pub merged: Option<Entity>,
    /// View whose copy was chosen as the model on the last committed pass.
    pub model: Option<ViewId>,
    /// Raw copy per observing view. Never empty while the Resolution exists.
    pub views: BTreeMap<ViewId, Entity>,
}

impl Resolution {
    /// The copy chosen on the last committed merge pass.
    pub fn model(&self) -> Option<&Entity> {
        self.model.and_then(|view| self.views.get(&view))
    }
}

#[derive(Debug, Default)]
pub struct EntityStore {
    pub(crate) resolutions: HashMap<u32, Resolution>,
    /// Descriptors of pruned copies with the time they were dropped, per
    /// view. A respawn at the same id within one grace window that omits
    /// them picks them up.
    pruned: HashMap<ViewId, HashMap<u32, (Descriptors, f64)>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u32) -> Option<&Resolution> {
        self.resolutions.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &Resolution)> {
        self.resolutions.iter()
    }

    pub fn len(&self) -> usize {
        self.resolutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolutions.is_empty()
    }

    /// The raw copy `view` holds for `id`.
    pub fn entity(&self, view: ViewId, id: u32) -> Option<&Entity> {
        self.resolutions.get(&id)?.views.get(&view)
    }

    /// Apply one upsert record from `view`.
    ///
    /// A live copy restarts its animation from where it is drawn now. A
    /// dead or missing copy is replaced by a fresh spawn, which inherits
    /// omitted descriptive fields from the previous occupant of the id.
    pub fn upsert(&mut self, view: ViewId, update: &CellUpdate, now: f64, interp: &Interpolator) {
        let resolution = self.resolutions.entry(update.id).or_default();

        if let Some(entity) = resolution.views.get_mut(&view) {
            if entity.is_alive() {
                interp.restart(entity, now);
                entity.new_pos = glam::Vec2::new(update.x as f32, update.y as f32);
                entity.new_r = update.r as f32;
                entity.apply_fields(update);
                return;
            }
        }

        let previous = match resolution.views.get(&view) {
            Some(dead) => Some(dead.descriptors()),
            None => self
                .pruned
                .get_mut(&view)
                .and_then(|pruned| pruned.remove(&update.id))
                .map(|(descriptors, _)| descriptors),
        };

        let mut entity = Entity::spawn(update, now);
        if let Some(previous) = previous {
            entity.inherit(&previous, update);
        }
        trace!(%view, id = update.id, "spawn");
        resolution.views.insert(view, entity);
    }

    /// Mark `view`'s copy of `id` dead. `killer` of `None` means it left the
    /// view. Already-dead copies keep their first cause of death.
    pub fn mark_dead(
        &mut self,
        view: ViewId,
        id: u32,
        killer: Option<u32>,
        now: f64,
        interp: &Interpolator,
    ) {
        let Some(entity) = self
            .resolutions
            .get_mut(&id)
            .and_then(|resolution| resolution.views.get_mut(&view))
        else {
            return;
        };
        if !entity.is_alive() {
            return;
        }

        interp.restart(entity, now);
        entity.death = Some(Death {
            at: now,
            to: killer.map_or(DeadTo::LeftView, DeadTo::Killed),
        });
    }

    /// Mark every live copy held by `view` as having left the view.
    pub fn mark_all_dead(&mut self, view: ViewId, now: f64, interp: &Interpolator) {
        for resolution in self.resolutions.values_mut() {
            if let Some(entity) = resolution.views.get_mut(&view) {
                if entity.is_alive() {
                    interp.restart(entity, now);
                    entity.death = Some(Death {
                        at: now,
                        to: DeadTo::LeftView,
                    });
                }
            }
        }
    }

    /// Drop per-view copies dead for at least the grace window, then drop
    /// Resolutions left with no copies. Returns how many Resolutions went.
    pub fn prune(&mut self, now: f64) -> usize {
        let Self {
            resolutions,
            pruned,
        } = self;
        for stash in pruned.values_mut() {
            stash.retain(|_, (_, at)| now - *at < DEATH_GRACE_MS);
        }

        let before = resolutions.len();
        resolutions.retain(|&id, resolution| {
            resolution.views.retain(|&view, entity| {
                let expired = entity
                    .dead_at()
                    .is_some_and(|dead_at| now - dead_at >= DEATH_GRACE_MS);
                if expired {
                    pruned
                        .entry(view)
                        .or_default()
                        .insert(id, (entity.descriptors(), now));
                }
                !expired
            });
            if resolution
                .model
                .is_some_and(|view| !resolution.views.contains_key(&view))
            {
                resolution.model = None;
            }
            !resolution.views.is_empty()
        });
        before - resolutions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use protocol::Color;

    const A: ViewId = ViewId::Primary;
    const B: ViewId = ViewId::Secondary;

    fn interp() -> Interpolator {
        Interpolator::new(100.0, 5.0)
    }

    #[test]
    fn test_upsert_restarts_from_drawn_position() {
        let mut store = EntityStore::new();
        store.upsert(A, &CellUpdate::at(1, 0, 0, 10), 0.0, &interp());
        store.upsert(A, &CellUpdate::at(1, 100, 0, 10), 0.0, &interp());
        // Halfway through the second leg, a third update arrives.
        store.upsert(A, &CellUpdate::at(1, 100, 100, 10), 50.0, &interp());

        let e = store.entity(A, 1).unwrap();
        assert_eq!(e.old_pos, Vec2::new(50.0, 0.0));
        assert_eq!(e.new_pos, Vec2::new(100.0, 100.0));
        assert_eq!(e.updated_at, 50.0);
        assert_eq!(e.born_at, 0.0);
    }

    #[test]
    fn test_optional_fields_are_sticky() {
        let mut store = EntityStore::new();
        let mut first = CellUpdate::at(9, 0, 0, 40);
        first.name = Some("Bob".into());
        first.color = Some(Color::new(1, 2, 3));
        first.skin = Some("doge".into());
        store.upsert(A, &first, 0.0, &interp());
        store.upsert(A, &CellUpdate::at(9, 5, 5, 40), 10.0, &interp());

        let e = store.entity(A, 9).unwrap();
        assert_eq!(e.name, "Bob");
        assert_eq!(e.color, Color::new(1, 2, 3));
        assert_eq!(e.skin.as_deref(), Some("doge"));
    }

    #[test]
    fn test_death_then_prune() {
        let mut store = EntityStore::new();
        store.upsert(A, &CellUpdate::at(3, 0, 0, 10), 0.0, &interp());
        store.mark_dead(A, 3, None, 1000.0, &interp());

        store.prune(1199.0);
        assert!(store.entity(A, 3).is_some());
        assert_eq!(store.len(), 1);

        store.prune(1201.0);
        assert!(store.entity(A, 3).is_none());
        assert!(store.get(3).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_resolution_survives_while_another_view_holds_it() {
        let mut store = EntityStore::new();
        store.upsert(A, &CellUpdate::at(3, 0, 0, 10), 0.0, &interp());
        store.upsert(B, &CellUpdate::at(3, 0, 0, 10), 0.0, &interp());
        store.mark_dead(A, 3, Some(8), 0.0, &interp());
        store.prune(500.0);

        let resolution = store.get(3).unwrap();
        assert!(!resolution.views.contains_key(&A));
        assert!(resolution.views.contains_key(&B));
    }

    #[test]
    fn test_first_cause_of_death_wins() {
        let mut store = EntityStore::new();
        store.upsert(A, &CellUpdate::at(3, 0, 0, 10), 0.0, &interp());
        store.mark_dead(A, 3, Some(8), 10.0, &interp());
        store.mark_dead(A, 3, None, 20.0, &interp());

        let e = store.entity(A, 3).unwrap();
        assert_eq!(e.killer(), Some(8));
        assert_eq!(e.dead_at(), Some(10.0));
    }

    #[test]
    fn test_respawn_inherits_from_pruned_occupant() {
        let mut store = EntityStore::new();
        let mut first = CellUpdate::at(5, 0, 0, 10);
        first.name = Some("Ann".into());
        store.upsert(A, &first, 0.0, &interp());
        store.mark_dead(A, 5, None, 0.0, &interp());
        store.prune(300.0);
        assert!(store.get(5).is_none());

        store.upsert(A, &CellUpdate::at(5, 9, 9, 10), 310.0, &interp());
        let e = store.entity(A, 5).unwrap();
        assert_eq!(e.name, "Ann");
        assert_eq!(e.born_at, 310.0);
        assert!(e.is_alive());
    }

    #[test]
    fn test_pruned_descriptors_outlive_input_ticks() {
        let mut store = EntityStore::new();
        let mut first = CellUpdate::at(5, 0, 0, 10);
        first.name = Some("Ann".into());
        store.upsert(A, &first, 0.0, &interp());
        store.mark_dead(A, 5, None, 0.0, &interp());
        store.prune(200.0);
        // Ticks keep pruning between world updates.
        store.prune(240.0);
        store.prune(280.0);

        store.upsert(A, &CellUpdate::at(5, 9, 9, 10), 300.0, &interp());
        assert_eq!(store.entity(A, 5).unwrap().name, "Ann");

        // Once a full grace window has passed the stash is gone.
        store.mark_dead(A, 5, None, 300.0, &interp());
        store.prune(500.0);
        store.prune(700.0);
        store.upsert(A, &CellUpdate::at(5, 9, 9, 10), 710.0, &interp());
        assert_eq!(store.entity(A, 5).unwrap().name, "");
    }

    #[test]
    fn test_respawn_over_dead_copy_is_fresh() {
        let mut store = EntityStore::new();
        let mut first = CellUpdate::at(5, 0, 0, 10);
        first.name = Some("Ann".into());
        store.upsert(A, &first, 0.0, &interp());
        store.mark_dead(A, 5, Some(1), 50.0, &interp());

        let mut second = CellUpdate::at(5, 40, 0, 12);
        second.name = Some("Eve".into());
        store.upsert(A, &second, 60.0, &interp());

        let e = store.entity(A, 5).unwrap();
        assert!(e.is_alive());
        assert_eq!(e.name, "Eve");
        assert_eq!(e.old_pos, Vec2::new(40.0, 0.0));
        assert_eq!(e.born_at, 60.0);
    }

    #[test]
    fn test_mark_all_dead_only_touches_one_view() {
        let mut store = EntityStore::new();
        for id in 1..=3 {
            store.upsert(A, &CellUpdate::at(id, 0, 0, 10), 0.0, &interp());
            store.upsert(B, &CellUpdate::at(id, 0, 0, 10), 0.0, &interp());
        }
        store.mark_all_dead(A, 5.0, &interp());

        for id in 1..=3 {
            assert!(store.entity(A, id).unwrap().left_view());
            assert!(store.entity(B, id).unwrap().is_alive());
        }
    }
}
