// ============================================================================
// morph.rs — Morphtree
// Frame-rate independent damping and the per-frame clock shared by every
// animated entity.
// ============================================================================

/// Exponential approach of `current` toward `target`.
///
/// The step depends on wall-clock `dt`, so the convergence time is the same
/// whether a second is rendered in 10 frames or 240.
pub fn damp(current: f32, target: f32, rate: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        return current;
    }
    current + (target - current) * (1.0 - (-rate * dt).exp())
}

/// Elapsed time and frame delta, in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameClock {
    pub elapsed: f32,
    pub delta: f32,
}

impl FrameClock {
    /// Advance by `dt` seconds and return the new clock.
    pub fn tick(&mut self, dt: f32) -> FrameClock {
        let dt = dt.max(0.0);
        self.elapsed += dt;
        self.delta = dt;
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(steps: &[f32]) -> f32 {
        steps.iter().fold(0.0, |p, &dt| damp(p, 1.0, 4.0, dt))
    }

    #[test]
    fn converges_within_five_seconds() {
        let uniform = vec![5.0 / 60.0; 60];
        let uneven = [0.1, 0.9, 0.25, 0.75, 0.05, 1.2, 0.3, 0.7, 0.45, 0.3];
        assert!((uneven.iter().sum::<f32>() - 5.0).abs() < 1e-5);

        let a = run(&uniform);
        let b = run(&uneven);
        assert!(a > 0.95 && b > 0.95);
        assert!((a - b).abs() < 1e-4, "{a} vs {b}");
    }

    #[test]
    fn frame_rate_does_not_change_speed() {
        let at_30 = run(&vec![1.0 / 30.0; 15]);
        let at_144 = run(&vec![1.0 / 144.0; 72]);
        assert!((at_30 - at_144).abs() < 1e-4);
        assert!((at_30 - (1.0 - (-2.0f32).exp())).abs() < 1e-4);
    }

    #[test]
    fn zero_delta_is_a_no_op() {
        assert_eq!(damp(0.3, 1.0, 4.0, 0.0), 0.3);
        assert_eq!(damp(0.3, 1.0, 4.0, -1.0), 0.3);
    }

    #[test]
    fn clock_accumulates() {
        let mut clock = FrameClock::default();
        clock.tick(0.5);
        let c = clock.tick(0.25);
        assert_eq!(c.elapsed, 0.75);
        assert_eq!(c.delta, 0.25);
    }
}
