use std::time::{Duration, Instant};

// Delay/sound timers always count down at 60 Hz, whatever the CPU rate
pub const TIMER_FREQ: u32 = 60;
pub const DEFAULT_CPU_FREQ: u32 = 400;

// Dual-rate clock: the CPU and the 60 Hz timers each accumulate the same
// monotonic elapsed time against their own period, so missing ticks on one
// side never skews the other. Each elapsed period yields exactly one tick;
// the loop never busy-spins to chase wall time.
pub struct Clock {
    cpu_period: Duration,
    timer_period: Duration,
    last: Instant,
    cpu_acc: Duration,
    timer_acc: Duration,
}

pub struct Ticks {
    pub cpu: u32,
    pub timer: u32,
}

impl Clock {
    pub fn new(cpu_freq: u32, start: Instant) -> Self {
        Clock {
            cpu_period: Duration::from_secs(1) / cpu_freq,
            timer_period: Duration::from_secs(1) / TIMER_FREQ,
            last: start,
            cpu_acc: Duration::ZERO,
            timer_acc: Duration::ZERO,
        }
    }

    // How many CPU and timer periods elapsed since the previous call.
    // Remainders stay in the accumulators, so sleep jitter between calls
    // cannot drift either rate.
    pub fn tick(&mut self, now: Instant) -> Ticks {
        let elapsed = now.saturating_duration_since(self.last);
        self.last = now;
        self.cpu_acc += elapsed;
        self.timer_acc += elapsed;

        Ticks {
            cpu: drain(&mut self.cpu_acc, self.cpu_period),
            timer: drain(&mut self.timer_acc, self.timer_period),
        }
    }
}

fn drain(acc: &mut Duration, period: Duration) -> u32 {
    let n = (acc.as_nanos() / period.as_nanos()) as u32;
    *acc -= period * n;
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_second_yields_both_full_rates() {
        let t0 = Instant::now();
        let mut clock = Clock::new(DEFAULT_CPU_FREQ, t0);

        let ticks = clock.tick(t0 + Duration::from_secs(1));
        assert_eq!(ticks.cpu, 400);
        assert_eq!(ticks.timer, 60);
    }

    #[test]
    fn remainders_carry_across_calls() {
        let t0 = Instant::now();
        let mut clock = Clock::new(400, t0);

        // 400 Hz -> 2.5 ms period; 2 ms is not yet a full period
        let ticks = clock.tick(t0 + Duration::from_millis(2));
        assert_eq!(ticks.cpu, 0);
        let ticks = clock.tick(t0 + Duration::from_millis(3));
        assert_eq!(ticks.cpu, 1);
    }

    #[test]
    fn uneven_polling_does_not_drift() {
        let t0 = Instant::now();
        let mut clock = Clock::new(500, t0);

        let mut cpu = 0;
        let mut timer = 0;
        // Jittery poll intervals: 1 ms, 7 ms, 1 ms, 7 ms, ..
        let mut now = t0;
        for i in 0..250 {
            now += Duration::from_millis(if i % 2 == 0 { 1 } else { 7 });
            let ticks = clock.tick(now);
            cpu += ticks.cpu;
            timer += ticks.timer;
        }

        // 1 s total elapsed regardless of how it was sliced up
        assert_eq!(cpu, 500);
        assert_eq!(timer, 60);
    }

    #[test]
    fn rates_are_decoupled() {
        let t0 = Instant::now();
        let mut clock = Clock::new(800, t0);

        // A timer period (1/60 s) holds 13 whole CPU periods at 800 Hz
        let ticks = clock.tick(t0 + Duration::from_secs(1) / 60);
        assert_eq!(ticks.timer, 1);
        assert_eq!(ticks.cpu, 13);
    }

    #[test]
    fn a_clock_stall_replays_the_elapsed_schedule_once() {
        let t0 = Instant::now();
        let mut clock = Clock::new(400, t0);

        // Host stalled for three seconds: both sides catch up in one call
        let ticks = clock.tick(t0 + Duration::from_secs(3));
        assert_eq!(ticks.cpu, 1200);
        assert_eq!(ticks.timer, 180);

        // ..and the backlog does not replay again
        let ticks = clock.tick(t0 + Duration::from_secs(3));
        assert_eq!(ticks.cpu, 0);
        assert_eq!(ticks.timer, 0);
    }
}
