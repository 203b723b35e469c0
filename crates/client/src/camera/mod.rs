// Camera aggregation - per-view targets, cross-view blending, smooth follow
//
// Zoom:      min(64 / total_r, 1) ^ 0.4, times the manual zoom factor
// Viewport:  centroid ± (960, 540) / zoom
// Merge:     two views blend when the gap between their viewports is within
//            merge_base + merge_scale * sqrt(mass_a + mass_b) on both axes
// Easing:    exponential, frame-rate independent; faster while owning nothing
use std::collections::BTreeSet;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::config::CameraConfig;
use crate::game::ViewId;
use crate::utils;

/// Half of the logical 1920x1080 screen.
pub const HALF_SCREEN: Vec2 = Vec2::new(960.0, 540.0);

const MIN_ZOOM_FACTOR: f32 = 0.25;
const MAX_ZOOM_FACTOR: f32 = 2.5;

/// How a view's target blends with the views merging into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraPolicy {
    /// Own weighted centroid, autozoom on own size.
    #[default]
    Default,
    /// Mean of every merging view's centroid.
    Midpoint,
    /// Weighted centroid over all cells of every merging view.
    Weighted,
    /// Own weighted centroid, constant zoom.
    Fixed,
}

/// Per-cell weight in the centroid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraWeighting {
    /// r²
    #[default]
    Mass,
    /// 1
    Equal,
}

impl CameraWeighting {
    #[inline]
    pub fn weight(self, r: f32) -> f32 {
        match self {
            CameraWeighting::Mass => r * r,
            CameraWeighting::Equal => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraState {
    pub pos: Vec2,
    pub scale: f32,
    pub target_pos: Vec2,
    pub target_scale: f32,
    /// Other views currently blended into this one.
    pub merging: BTreeSet<ViewId>,
    pub zoom_factor: f32,
    /// Server-driven target used while the view owns nothing (spectating).
    pub spectate: Option<(Vec2, f32)>,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            pos: Vec2::ZERO,
            scale: 1.0,
            target_pos: Vec2::ZERO,
            target_scale: 1.0,
            merging: BTreeSet::new(),
            zoom_factor: 1.0,
            spectate: None,
        }
    }
}

impl CameraState {
    /// Ease toward the target. `dt` is in seconds.
    pub fn step(&mut self, owns_mass: bool, dt: f32, config: &CameraConfig) {
        let factor = if owns_mass {
            config.smoothness
        } else {
            config.empty_smoothness
        };
        self.pos = Vec2::new(
            utils::exponential_ease(self.pos.x, self.target_pos.x, factor, dt),
            utils::exponential_ease(self.pos.y, self.target_pos.y, factor, dt),
        );
        self.scale = utils::exponential_ease(self.scale, self.target_scale, config.zoom_smoothness, dt);
    }

    /// Multiply the manual zoom factor (mouse wheel), clamped to a safe range.
    pub fn adjust_zoom_factor(&mut self, delta: f32) {
        let next = self.zoom_factor * delta;
        if next.is_finite() {
            self.zoom_factor = next.clamp(MIN_ZOOM_FACTOR, MAX_ZOOM_FACTOR);
        }
    }

    /// Convert screen coordinates to world coordinates.
    #[inline]
    pub fn screen_to_world(&self, screen_pos: Vec2, screen_center: Vec2) -> Vec2 {
        (screen_pos - screen_center) / self.scale + self.pos
    }
}

/// JS-compatible autozoom: min(64 / total_r, 1) ^ 0.4
#[inline]
pub fn autozoom(total_r: f32) -> f32 {
    if total_r <= 0.0 {
        return 1.0;
    }
    (64.0_f32 / total_r).min(1.0).powf(0.4)
}

/// Aggregate of one view's owned, alive cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewMass {
    pub view: ViewId,
    /// Σ pos · weight
    pub weighted_sum: Vec2,
    /// Σ weight
    pub weight: f32,
    /// Σ r
    pub total_r: f32,
    /// Σ floor(r² / 100)
    pub mass: u32,
}

impl ViewMass {
    pub fn new(view: ViewId) -> Self {
        Self {
            view,
            weighted_sum: Vec2::ZERO,
            weight: 0.0,
            total_r: 0.0,
            mass: 0,
        }
    }

    pub fn add(&mut self, pos: Vec2, r: f32, mass: u32, weighting: CameraWeighting) {
        let w = weighting.weight(r);
        self.weighted_sum += pos * w;
        self.weight += w;
        self.total_r += r;
        self.mass += mass;
    }

    pub fn is_empty(&self) -> bool {
        self.weight <= 0.0
    }

    pub fn centroid(&self) -> Vec2 {
        if self.is_empty() {
            return Vec2::ZERO;
        }
        self.weighted_sum / self.weight
    }

    pub fn half_viewport(&self) -> Vec2 {
        HALF_SCREEN / autozoom(self.total_r)
    }

    /// Viewports are close enough to blend.
    pub fn near(&self, other: &ViewMass, config: &CameraConfig) -> bool {
        let threshold =
            config.merge_base + config.merge_scale * ((self.mass + other.mass) as f32).sqrt();
        let gap = (self.centroid() - other.centroid()).abs()
            - (self.half_viewport() + other.half_viewport());
        gap.x <= threshold && gap.y <= threshold
    }
}

/// Views in `all` whose viewport blends with `me`'s.
pub fn partners<'a>(me: &ViewMass, all: &'a [ViewMass], config: &CameraConfig) -> Vec<&'a ViewMass> {
    if !config.merge || me.is_empty() {
        return Vec::new();
    }
    all.iter()
        .filter(|other| other.view != me.view && !other.is_empty() && me.near(other, config))
        .collect()
}

/// Target position and base zoom (before the manual factor) for `me`.
pub fn target(me: &ViewMass, partners: &[&ViewMass], config: &CameraConfig) -> (Vec2, f32) {
    let group_r = me.total_r + partners.iter().map(|m| m.total_r).sum::<f32>();
    match config.policy {
        CameraPolicy::Default => (me.centroid(), autozoom(me.total_r)),
        CameraPolicy::Fixed => (me.centroid(), config.fixed_zoom),
        CameraPolicy::Midpoint => {
            let sum = me.centroid() + partners.iter().map(|m| m.centroid()).sum::<Vec2>();
            (sum / (partners.len() + 1) as f32, autozoom(group_r))
        }
        CameraPolicy::Weighted => {
            let sum = me.weighted_sum + partners.iter().map(|m| m.weighted_sum).sum::<Vec2>();
            let weight = me.weight + partners.iter().map(|m| m.weight).sum::<f32>();
            (sum / weight, autozoom(group_r))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mass_at(view: ViewId, pos: Vec2, r: f32) -> ViewMass {
        let mut m = ViewMass::new(view);
        m.add(pos, r, (r * r / 100.0) as u32, CameraWeighting::Mass);
        m
    }

    #[test]
    fn test_autozoom() {
        assert_eq!(autozoom(32.0), 1.0);
        assert_eq!(autozoom(0.0), 1.0);
        let z = autozoom(256.0);
        assert!((z - 0.25_f32.powf(0.4)).abs() < 1e-6);
    }

    #[test]
    fn test_weighting_exponent() {
        let mut mass = ViewMass::new(ViewId::Primary);
        mass.add(Vec2::ZERO, 10.0, 1, CameraWeighting::Mass);
        mass.add(Vec2::new(100.0, 0.0), 30.0, 9, CameraWeighting::Mass);
        assert_eq!(mass.centroid(), Vec2::new(90.0, 0.0));

        let mut equal = ViewMass::new(ViewId::Primary);
        equal.add(Vec2::ZERO, 10.0, 1, CameraWeighting::Equal);
        equal.add(Vec2::new(100.0, 0.0), 30.0, 9, CameraWeighting::Equal);
        assert_eq!(equal.centroid(), Vec2::new(50.0, 0.0));
    }

    #[test]
    fn test_nearby_views_merge() {
        let config = CameraConfig::default();
        let a = mass_at(ViewId::Primary, Vec2::ZERO, 40.0);
        let close = mass_at(ViewId::Secondary, Vec2::new(2500.0, 0.0), 40.0);
        let far = mass_at(ViewId::Secondary, Vec2::new(9000.0, 0.0), 40.0);

        assert!(a.near(&close, &config));
        assert!(!a.near(&far, &config));

        let all = [a, close];
        assert_eq!(partners(&a, &all, &config).len(), 1);

        let off = CameraConfig {
            merge: false,
            ..CameraConfig::default()
        };
        assert!(partners(&a, &all, &off).is_empty());
    }

    #[test]
    fn test_policies() {
        let mut config = CameraConfig::default();
        let a = mass_at(ViewId::Primary, Vec2::ZERO, 10.0);
        let b = mass_at(ViewId::Secondary, Vec2::new(100.0, 0.0), 30.0);

        config.policy = CameraPolicy::Default;
        assert_eq!(target(&a, &[&b], &config), (Vec2::ZERO, 1.0));

        config.policy = CameraPolicy::Midpoint;
        assert_eq!(target(&a, &[&b], &config).0, Vec2::new(50.0, 0.0));

        config.policy = CameraPolicy::Weighted;
        assert_eq!(target(&a, &[&b], &config).0, Vec2::new(90.0, 0.0));

        config.policy = CameraPolicy::Fixed;
        config.fixed_zoom = 0.5;
        assert_eq!(target(&a, &[&b], &config), (Vec2::ZERO, 0.5));
    }

    #[test]
    fn test_empty_view_eases_faster() {
        let config = CameraConfig::default();
        let mut alive = CameraState {
            target_pos: Vec2::new(100.0, 0.0),
            ..CameraState::default()
        };
        let mut empty = alive.clone();
        alive.step(true, 1.0 / 60.0, &config);
        empty.step(false, 1.0 / 60.0, &config);
        assert!(empty.pos.x > alive.pos.x);
        assert!(alive.pos.x > 0.0);
    }

    #[test]
    fn test_zoom_factor_clamped() {
        let mut camera = CameraState::default();
        camera.adjust_zoom_factor(100.0);
        assert_eq!(camera.zoom_factor, 2.5);
        camera.adjust_zoom_factor(0.0001);
        assert_eq!(camera.zoom_factor, 0.25);
        camera.adjust_zoom_factor(f32::NAN);
        assert_eq!(camera.zoom_factor, 0.25);
    }

    #[test]
    fn test_screen_to_world() {
        let camera = CameraState {
            pos: Vec2::new(1000.0, 500.0),
            scale: 0.5,
            ..CameraState::default()
        };
        let world = camera.screen_to_world(Vec2::new(1060.0, 540.0), Vec2::new(960.0, 540.0));
        assert_eq!(world, Vec2::new(1200.0, 500.0));
    }
}
