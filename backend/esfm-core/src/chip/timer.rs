//! ESFM programmable timers
//!
//! Two 8-bit up-counters with OPL3-compatible semantics: timer 1 ticks every
//! 4 samples (80 microseconds) and timer 2 every 16 samples (320
//! microseconds). A timer counts up from its reload value and flags an
//! overflow when it wraps, unless its mask bit is set.

use bincode::{Decode, Encode};

#[derive(Debug, Clone, Encode, Decode)]
pub(super) struct ProgrammableTimer {
    period: u8,
    divider: u8,
    enabled: bool,
    masked: bool,
    overflow_flag: bool,
    pub(super) interval: u8,
    counter: u8,
}

impl ProgrammableTimer {
    pub(super) fn new(period: u8) -> Self {
        Self {
            period,
            divider: period,
            enabled: false,
            masked: false,
            overflow_flag: false,
            interval: 0,
            counter: 0,
        }
    }

    // Returns true when the timer overflows with its mask bit clear
    pub(super) fn tick(&mut self) -> bool {
        self.divider -= 1;
        if self.divider != 0 {
            return false;
        }
        self.divider = self.period;

        if !self.enabled {
            return false;
        }

        let (counter, overflowed) = self.counter.overflowing_add(1);
        self.counter = counter;
        if overflowed {
            self.counter = self.interval;
            if !self.masked {
                self.overflow_flag = true;
                return true;
            }
        }
        false
    }

    pub(super) fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            self.counter = self.interval;
        }
        self.enabled = enabled;
    }

    pub(super) fn set_masked(&mut self, masked: bool) {
        self.masked = masked;
    }

    pub(super) fn clear_overflow(&mut self) {
        self.overflow_flag = false;
    }

    pub(super) fn enabled(&self) -> bool {
        self.enabled
    }

    pub(super) fn masked(&self) -> bool {
        self.masked
    }

    pub(super) fn overflow_flag(&self) -> bool {
        self.overflow_flag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_timing() {
        let mut timer = ProgrammableTimer::new(4);
        timer.interval = 0xFC;
        timer.set_enabled(true);

        // Counter starts at the reload value and overflows after
        // (256 - reload) * period sample ticks
        for sample in 1..=15 {
            assert!(!timer.tick(), "sample {sample}");
        }
        assert!(timer.tick());
        assert!(timer.overflow_flag());

        // Counter reloads and overflows again with the same period
        timer.clear_overflow();
        for _ in 1..=16 {
            timer.tick();
        }
        assert!(timer.overflow_flag());
    }

    #[test]
    fn masked_timer_sets_no_flag() {
        let mut timer = ProgrammableTimer::new(4);
        timer.interval = 0xFF;
        timer.set_masked(true);
        timer.set_enabled(true);

        for _ in 0..64 {
            assert!(!timer.tick());
        }
        assert!(!timer.overflow_flag());
    }

    #[test]
    fn disabled_timer_does_not_count() {
        let mut timer = ProgrammableTimer::new(4);
        timer.interval = 0xFF;

        for _ in 0..64 {
            assert!(!timer.tick());
        }
        assert!(!timer.overflow_flag());
    }

    #[test]
    fn enable_reloads_counter() {
        let mut timer = ProgrammableTimer::new(16);
        timer.interval = 0xFE;
        timer.set_enabled(true);

        // 2 counter increments at 16 samples each
        for sample in 1..=31 {
            assert!(!timer.tick(), "sample {sample}");
        }
        assert!(timer.tick());
    }
}
