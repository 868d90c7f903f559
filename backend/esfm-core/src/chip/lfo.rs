//! Global low-frequency oscillators and timing counters
//!
//! One 10-bit global timer drives the tremolo and vibrato dividers and the
//! envelope delay counters; a separate 36-bit free-running counter dithers the
//! envelope generator's rate subdivision. All of them advance once per audio
//! sample, after every channel has been processed.

use bincode::{Decode, Encode};

const GLOBAL_TIMER_MASK: u16 = 0x3FF;

// Tremolo advances every 64 samples through a 210-position triangle wave
const TREMOLO_DIVIDER_MASK: u16 = 0x3F;
const TREMOLO_POSITIONS: u8 = 210;

// Vibrato advances every 1024 samples through 8 positions
const VIBRATO_DIVIDER_MASK: u16 = 0x3FF;

// The envelope timer is 36 bits and wraps to 0 with an overflow flag
const EG_TIMER_MASK: u64 = (1 << 36) - 1;

#[derive(Debug, Clone, Default, Encode, Decode)]
pub(super) struct GlobalTimers {
    pub(super) global_timer: u16,
    eg_timer: u64,
    eg_timer_overflow: bool,
    pub(super) eg_tick: bool,
    pub(super) eg_clocks: u8,
    pub(super) tremolo: u8,
    tremolo_pos: u8,
    pub(super) vibrato_pos: u8,
}

impl GlobalTimers {
    pub(super) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(super) fn clock(&mut self) {
        if self.global_timer & TREMOLO_DIVIDER_MASK == TREMOLO_DIVIDER_MASK {
            self.tremolo_pos = (self.tremolo_pos + 1) % TREMOLO_POSITIONS;
            self.tremolo = if self.tremolo_pos < TREMOLO_POSITIONS / 2 {
                self.tremolo_pos
            } else {
                TREMOLO_POSITIONS - self.tremolo_pos
            };
        }

        if self.global_timer & VIBRATO_DIVIDER_MASK == VIBRATO_DIVIDER_MASK {
            self.vibrato_pos = (self.vibrato_pos + 1) & 0x07;
        }

        self.global_timer = (self.global_timer + 1) & GLOBAL_TIMER_MASK;

        // The envelope rate subdivision follows the lowest set bit of the
        // envelope timer, which yields each value 2^n half as often as 2^(n-1)
        self.eg_clocks = match self.eg_timer.trailing_zeros() {
            shift @ 0..=12 => (shift + 1) as u8,
            _ => 0,
        };

        // The envelope timer advances every other sample, plus one extra
        // sample immediately after it wraps
        if self.eg_tick || self.eg_timer_overflow {
            if self.eg_timer == EG_TIMER_MASK {
                self.eg_timer = 0;
                self.eg_timer_overflow = true;
            } else {
                self.eg_timer += 1;
                self.eg_timer_overflow = false;
            }
        }

        self.eg_tick = !self.eg_tick;
    }
}
