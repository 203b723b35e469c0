// Helper utilities: LERP, easing, clock

use std::time::Instant;

/// Linear interpolation between two values
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Frame-rate independent exponential ease.
///
/// `factor` is the per-60Hz-frame divisor: after one 1/60 s step the value
/// covers `1/factor` of the remaining distance. A factor of 1 snaps.
/// `dt` is in seconds.
#[inline]
pub fn exponential_ease(start: f32, target: f32, factor: f32, dt: f32) -> f32 {
    let factor = factor.max(1.0);
    let dt = dt.max(0.0);
    start + (target - start) * (1.0 - (1.0 - 1.0 / factor).powf(60.0 * dt))
}

/// Monotonic millisecond clock shared by the runtime.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Milliseconds since the clock was created.
    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ease_is_rate_independent() {
        // One 1/30 s step lands where two 1/60 s steps do.
        let one = exponential_ease(0.0, 100.0, 4.0, 1.0 / 30.0);
        let half = exponential_ease(0.0, 100.0, 4.0, 1.0 / 60.0);
        let two = exponential_ease(half, 100.0, 4.0, 1.0 / 60.0);
        assert!((one - two).abs() < 1e-3, "{one} vs {two}");
        assert!((half - 25.0).abs() < 1e-3);
    }

    #[test]
    fn test_ease_edges() {
        assert_eq!(exponential_ease(3.0, 9.0, 1.0, 0.016), 9.0);
        assert_eq!(exponential_ease(3.0, 9.0, 5.0, 0.0), 3.0);
        assert_eq!(lerp(2.0, 4.0, 0.5), 3.0);
    }
}
