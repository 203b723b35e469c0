// Interpolation and the render-facing frame snapshot
//
// Interpolation:
//   a    = clamp((now - updated_at) / draw_delay, 0, 1)
//   pos  = old_pos + (target - old_pos) * a
//   r    = old_r + (new_r - old_r) * a
// where target is new_pos, or the killer's new_pos for an eaten cell.
// Jelly radius eases toward r independently of `a`.
use std::sync::Arc;
use std::time::Duration;

use glam::Vec2;
use protocol::packets::{Border, ChatMessage, LeaderboardEntry};
use protocol::Color;

use crate::game::{Entity, ServerStats, ViewId};
use crate::network::ConnectionState;
use crate::utils;

/// Instantaneous position and size of an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Xyr {
    pub pos: Vec2,
    pub r: f32,
    pub jelly_r: f32,
}

/// Turns (old, new) pairs into smooth positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolator {
    pub draw_delay_ms: f64,
    pub jelly_factor: f32,
}

impl Interpolator {
    pub fn new(draw_delay_ms: f64, jelly_factor: f32) -> Self {
        Self {
            draw_delay_ms,
            jelly_factor,
        }
    }

    /// Progress from `old_*` to `new_*`, never extrapolated.
    #[inline]
    pub fn progress(&self, entity: &Entity, now: f64) -> f32 {
        if self.draw_delay_ms <= 0.0 {
            return 1.0;
        }
        ((now - entity.updated_at) / self.draw_delay_ms).clamp(0.0, 1.0) as f32
    }

    /// Where `entity` is drawn at `now`.
    ///
    /// A dead entity slides toward `killer` when the killer was still alive
    /// at the moment of the kill.
    pub fn position_at(&self, entity: &Entity, killer: Option<&Entity>, now: f64) -> Xyr {
        let a = self.progress(entity, now);

        let mut target = entity.new_pos;
        if let (Some(death), Some(killer)) = (entity.death, killer) {
            if killer.dead_at().is_none_or(|killer_dead| killer_dead >= death.at) {
                target = killer.new_pos;
            }
        }

        let pos = entity.old_pos + (target - entity.old_pos) * a;
        let r = utils::lerp(entity.old_r, entity.new_r, a);
        let dt = ((now - entity.jelly_at).max(0.0) / 1000.0) as f32;
        let jelly_r = utils::exponential_ease(entity.jelly_r, r, self.jelly_factor, dt);

        Xyr { pos, r, jelly_r }
    }

    /// Start a new animation leg from wherever `entity` is drawn right now.
    pub fn restart(&self, entity: &mut Entity, now: f64) {
        let xyr = self.position_at(entity, None, now);
        entity.old_pos = xyr.pos;
        entity.old_r = xyr.r;
        entity.jelly_r = xyr.jelly_r;
        entity.jelly_at = now;
        entity.updated_at = now;
    }
}

/// One drawable cell in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderCell {
    pub id: u32,
    pub pos: Vec2,
    pub r: f32,
    pub jelly_r: f32,
    pub alpha: f32,
    pub color: Color,
    pub name: String,
    pub skin: Option<String>,
    pub clan: String,
    pub subscriber: bool,
    pub spiked: bool,
    pub pellet: bool,
    pub ejected: bool,
    pub dead: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSnapshot {
    pub pos: Vec2,
    pub scale: f32,
    pub merging: Vec<ViewId>,
}

/// Per-view state as of one render tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewFrame {
    pub id: ViewId,
    pub camera: CameraSnapshot,
    pub border: Option<Border>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub owned: Vec<u32>,
    /// Owns at least one live cell.
    pub alive: bool,
    pub score: u32,
    pub stats: Option<ServerStats>,
    pub latency: Option<Duration>,
    pub connection: ConnectionState,
}

/// Immutable snapshot handed to renderers and UI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Runtime clock time this frame was built for, in ms.
    pub at: f64,
    /// Cells sorted by radius, smallest first (draw order).
    pub cells: Vec<RenderCell>,
    pub views: Vec<ViewFrame>,
    pub chat: Arc<Vec<(ViewId, ChatMessage)>>,
}

impl Frame {
    pub fn view(&self, id: ViewId) -> Option<&ViewFrame> {
        self.views.iter().find(|v| v.id == id)
    }

    /// Score of one view; 0 for unknown views.
    pub fn score(&self, id: ViewId) -> u32 {
        self.view(id).map_or(0, |v| v.score)
    }

    /// Whether any view owns a live cell.
    pub fn alive(&self) -> bool {
        self.views.iter().any(|v| v.alive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{DeadTo, Death};
    use protocol::packets::CellUpdate;

    fn moving(now: f64) -> Entity {
        let mut e = Entity::spawn(&CellUpdate::at(1, 0, 0, 50), now);
        e.new_pos = Vec2::new(100.0, -40.0);
        e.new_r = 70.0;
        e
    }

    #[test]
    fn test_interpolation_boundaries() {
        let interp = Interpolator::new(120.0, 5.0);
        let e = moving(1000.0);

        let at_start = interp.position_at(&e, None, 1000.0);
        assert_eq!(at_start.pos, e.old_pos);
        assert_eq!(at_start.r, e.old_r);

        let halfway = interp.position_at(&e, None, 1060.0);
        assert_eq!(halfway.pos, Vec2::new(50.0, -20.0));
        assert_eq!(halfway.r, 60.0);

        for now in [1120.0, 1500.0, 1.0e9] {
            let done = interp.position_at(&e, None, now);
            assert_eq!(done.pos, e.new_pos);
            assert_eq!(done.r, e.new_r);
        }

        // Clock skew before the update never extrapolates backwards.
        assert_eq!(interp.position_at(&e, None, 900.0).pos, e.old_pos);
    }

    #[test]
    fn test_eaten_cell_slides_into_killer() {
        let interp = Interpolator::new(100.0, 5.0);
        let mut eaten = Entity::spawn(&CellUpdate::at(1, 0, 0, 10), 0.0);
        eaten.death = Some(Death {
            at: 50.0,
            to: DeadTo::Killed(2),
        });
        eaten.updated_at = 50.0;
        let mut killer = Entity::spawn(&CellUpdate::at(2, 200, 0, 80), 0.0);

        assert_eq!(interp.position_at(&eaten, Some(&killer), 150.0).pos, Vec2::new(200.0, 0.0));

        // Killer died later than the victim: still the target.
        killer.death = Some(Death {
            at: 60.0,
            to: DeadTo::LeftView,
        });
        assert_eq!(interp.position_at(&eaten, Some(&killer), 150.0).pos, Vec2::new(200.0, 0.0));

        // Killer was already gone before the victim died: ignored.
        killer.death = Some(Death {
            at: 40.0,
            to: DeadTo::LeftView,
        });
        assert_eq!(interp.position_at(&eaten, Some(&killer), 150.0).pos, Vec2::ZERO);
    }

    #[test]
    fn test_jelly_lags_radius() {
        let interp = Interpolator::new(0.0, 5.0);
        let mut e = Entity::spawn(&CellUpdate::at(1, 0, 0, 50), 0.0);
        e.new_r = 100.0;

        let xyr = interp.position_at(&e, None, 1000.0 / 60.0);
        assert_eq!(xyr.r, 100.0);
        assert!((xyr.jelly_r - 60.0).abs() < 1e-3, "{}", xyr.jelly_r);
    }

    #[test]
    fn test_restart_continues_from_drawn_position() {
        let interp = Interpolator::new(100.0, 5.0);
        let mut e = moving(0.0);
        interp.restart(&mut e, 50.0);
        assert_eq!(e.old_pos, Vec2::new(50.0, -20.0));
        assert_eq!(e.updated_at, 50.0);
        assert_eq!(interp.position_at(&e, None, 50.0).pos, Vec2::new(50.0, -20.0));
    }
}
