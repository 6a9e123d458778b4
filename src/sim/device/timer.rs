use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{ExternalDevice, Interrupt};

/// A timer that raises an interrupt after a configured number of
/// executed instructions.
///
/// The reload interval is drawn uniformly from `[min, max]` each time
/// the timer fires, so a fixed interval (`min == max`) is fully
/// deterministic and a spread exercises interrupt timing randomly.
///
/// This is not part of the LC-3 specification, so the defaults
/// (vector `x81`, priority 4) are this crate's own convention.
#[derive(Debug)]
pub struct TimerDevice {
    rng: Box<StdRng>,
    min: u32,
    max: u32,
    remaining: u32,

    /// The interrupt vector this timer fires on.
    pub vect: u8,
    /// The priority (0-7) of the timer's interrupts.
    pub priority: u8,
    /// Whether the timer is counting down. Disabling the timer
    /// freezes the remaining count rather than clearing it.
    pub enabled: bool
}
impl TimerDevice {
    /// Creates a new timer.
    ///
    /// `seed` fixes the reload RNG, which only matters when
    /// `min != max`. The timer starts disabled.
    pub fn new(seed: Option<u64>, min: u32, max: u32, vect: u8, priority: u8) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let mut timer = Self {
            rng: Box::new(rng),
            min,
            max: max.max(min),
            remaining: 0,
            vect,
            priority,
            enabled: false
        };
        timer.reload();
        timer
    }

    /// The current reload interval as `(min, max)`.
    pub fn get_range(&self) -> (u32, u32) {
        (self.min, self.max)
    }
    /// Sets the reload interval. A `max` below `min` is raised to `min`.
    ///
    /// The new interval takes effect the next time the timer reloads.
    pub fn set_range(&mut self, min: u32, max: u32) -> &mut Self {
        self.min = min;
        self.max = max.max(min);
        self
    }
    /// Sets the reload interval to an exact instruction count.
    pub fn set_exact(&mut self, n: u32) -> &mut Self {
        self.set_range(n, n)
    }

    /// Instructions left until the timer fires.
    pub fn get_remaining(&self) -> u32 {
        self.remaining
    }
    /// Restarts the countdown with a freshly drawn interval.
    /// An interval of 0 behaves as 1 (firing every instruction).
    pub fn reload(&mut self) {
        self.remaining = self.rng.gen_range(self.min..=self.max).max(1);
    }
}
impl Default for TimerDevice {
    /// A disabled timer firing every 50 instructions on vector `x81`
    /// at priority 4.
    fn default() -> Self {
        Self::new(None, 50, 50, 0x81, 0b100)
    }
}
impl ExternalDevice for TimerDevice {
    // the timer has no memory-mapped registers
    fn io_read(&mut self, _addr: u16, _effectful: bool) -> Option<u16> {
        None
    }
    fn io_write(&mut self, _addr: u16, _data: u16) -> bool {
        false
    }

    fn io_reset(&mut self) {
        self.enabled = false;
        self.reload();
    }

    fn poll_interrupt(&mut self) -> Option<Interrupt> {
        if !self.enabled { return None }

        if self.remaining > 0 {
            self.remaining -= 1;
        }
        match self.remaining {
            0 => {
                self.reload();
                Some(Interrupt::vectored(self.vect, self.priority))
            },
            _ => None
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::sim::device::ExternalDevice;

    use super::TimerDevice;

    #[test]
    fn test_fires_on_schedule() {
        let mut timer = TimerDevice::new(None, 3, 3, 0x81, 4);
        timer.enabled = true;

        let fired: Vec<_> = (1..=9)
            .filter(|_| timer.poll_interrupt().is_some())
            .collect();
        assert_eq!(fired, vec![3, 6, 9]);
    }

    #[test]
    fn test_disabled_freezes_count() {
        let mut timer = TimerDevice::new(None, 5, 5, 0x81, 4);
        timer.enabled = true;

        assert!(timer.poll_interrupt().is_none());
        assert!(timer.poll_interrupt().is_none());
        let before = timer.get_remaining();

        timer.enabled = false;
        assert!(timer.poll_interrupt().is_none());
        assert_eq!(timer.get_remaining(), before);

        // resumes where it left off
        timer.enabled = true;
        assert!(timer.poll_interrupt().is_none());
        assert!(timer.poll_interrupt().is_none());
        assert!(timer.poll_interrupt().is_some());
    }

    #[test]
    fn test_seeded_reload_deterministic() {
        let run = || {
            let mut timer = TimerDevice::new(Some(17), 2, 30, 0x81, 4);
            timer.enabled = true;
            (0..200)
                .filter(|_| timer.poll_interrupt().is_some())
                .count()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_range_clamped() {
        let mut timer = TimerDevice::new(None, 10, 3, 0x81, 4);
        assert_eq!(timer.get_range(), (10, 10));
        timer.set_range(4, 1);
        assert_eq!(timer.get_range(), (4, 4));
    }
}
