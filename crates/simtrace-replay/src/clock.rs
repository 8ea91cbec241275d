use std::time::{Duration, Instant};

/// `sim_now() = sim_t0 + (wall_now() − sim_wall0) × speed_factor`.
/// Used only to schedule event application; trace timestamps themselves
/// are never touched by this scaling.
#[derive(Debug, Clone, Copy)]
pub struct ScaledClock {
    sim_t0: i64,
    sim_wall0: Instant,
    speed_factor: f64,
}

impl ScaledClock {
    /// `sim_t0` is the trace's first event timestamp; the wall anchor is
    /// taken at construction time, i.e. when the engine enters `Priming`.
    pub fn start(sim_t0: i64, speed_factor: f64) -> Self {
        Self { sim_t0, sim_wall0: Instant::now(), speed_factor }
    }

    pub fn sim_now(&self) -> i64 {
        let elapsed = self.sim_wall0.elapsed().as_secs_f64() * self.speed_factor;
        self.sim_t0 + elapsed.floor() as i64
    }

    /// How long to sleep so that `sim_now()` reaches `target_ts`, or
    /// `Duration::ZERO` if that point has already passed.
    pub fn delay_until(&self, target_ts: i64) -> Duration {
        let sim_delta = (target_ts - self.sim_t0) as f64;
        let wall_delta = sim_delta / self.speed_factor;
        let target_wall = self.sim_wall0 + Duration::from_secs_f64(wall_delta.max(0.0));
        target_wall.saturating_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_until_is_zero_for_a_past_target() {
        let clock = ScaledClock::start(1000, 1.0);
        assert_eq!(clock.delay_until(1000), Duration::ZERO);
    }

    #[test]
    fn speed_factor_compresses_wall_delay() {
        let clock = ScaledClock::start(0, 10.0);
        // 100 sim-seconds at 10x speed should take ~10 wall-seconds.
        let delay = clock.delay_until(100);
        assert!(delay <= Duration::from_secs(10));
        assert!(delay >= Duration::from_secs(9));
    }
}
