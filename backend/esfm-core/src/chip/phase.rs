//! ESFM phase generator and noise LFSR
//!
//! Each slot owns a 19-bit phase accumulator whose top 10 bits address the
//! waveform unit. The increment combines the slot's F-number (optionally bent
//! by vibrato), octave block, and frequency multiplier. The fourth slot of a
//! channel can replace its phase output with a bit-mixing network driven by
//! the chip-wide noise LFSR to produce the rhythm sounds.

use bincode::{Decode, Encode};
use esfm_common::num::GetBit;

// Phase accumulator is 19 bits; its top 10 bits feed the waveform unit
const PHASE_COUNTER_MASK: u32 = (1 << 19) - 1;
pub(super) const PHASE_MASK: u16 = (1 << 10) - 1;

// Frequency multiplier values, stored doubled:
//   1/2, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 10, 12, 12, 15, 15
const MULTIPLIER_TABLE: [u32; 16] = [1, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 20, 24, 24, 30, 30];

#[derive(Debug, Clone, Default, Encode, Decode)]
pub(super) struct PhaseGenerator {
    // Register values
    pub(super) f_number: u16,
    pub(super) block: u8,
    pub(super) multiple: u8,
    pub(super) vibrato_enabled: bool,
    pub(super) vibrato_deep: bool,
    // Internal state
    counter: u32,
    output: u16,
}

impl PhaseGenerator {
    pub(super) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(super) fn clock(&mut self, phase_reset: bool, vibrato_pos: u8) {
        let f_number = self.modulated_f_number(vibrato_pos);
        let base_frequency = (u32::from(f_number) << self.block) >> 1;

        // The output lags by one sample: the waveform unit sees the value
        // sampled here, before the reset and increment apply
        self.output = ((self.counter >> 9) as u16) & PHASE_MASK;
        if phase_reset {
            self.counter = 0;
        }
        self.counter = (self.counter
            + ((base_frequency * MULTIPLIER_TABLE[self.multiple as usize]) >> 1))
            & PHASE_COUNTER_MASK;
    }

    fn modulated_f_number(&self, vibrato_pos: u8) -> u16 {
        if !self.vibrato_enabled {
            return self.f_number;
        }

        let mut range = ((self.f_number >> 7) & 0x07) as i16;
        if vibrato_pos & 0x03 == 0 {
            range = 0;
        } else if vibrato_pos.bit(0) {
            range >>= 1;
        }
        if !self.vibrato_deep {
            range >>= 1;
        }
        if vibrato_pos.bit(2) {
            range = -range;
        }
        self.f_number.wrapping_add_signed(range)
    }

    pub(super) fn output(&self) -> u16 {
        self.output
    }

    pub(super) fn override_output(&mut self, value: u16) {
        self.output = value;
    }

    #[cfg(test)]
    pub(super) fn counter(&self) -> u32 {
        self.counter
    }
}

// Rhythm-mode phase override for the fourth slot. `hh_phase` is the slot's own
// freshly sampled phase; `tc_phase` is the third slot's phase from the same
// sample
pub(super) fn rhythm_phase(mode: u8, hh_phase: u16, tc_phase: u16, noise_bit: u16) -> u16 {
    let hh_bit2 = (hh_phase >> 2) & 1;
    let hh_bit3 = (hh_phase >> 3) & 1;
    let hh_bit7 = (hh_phase >> 7) & 1;
    let hh_bit8 = (hh_phase >> 8) & 1;
    let tc_bit3 = (tc_phase >> 3) & 1;
    let tc_bit5 = (tc_phase >> 5) & 1;

    let rm_xor = (hh_bit2 ^ hh_bit7) | (hh_bit3 ^ tc_bit5) | (tc_bit3 ^ tc_bit5);

    match mode {
        // Snare drum
        1 => (hh_bit8 << 9) | ((hh_bit8 ^ noise_bit) << 8),
        // Hi-hat
        2 => (rm_xor << 9) | if rm_xor ^ noise_bit != 0 { 0xD0 } else { 0x34 },
        // Top cymbal
        3 => (rm_xor << 9) | 0x80,
        _ => panic!("invalid rhythm noise mode: {mode}"),
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub(super) struct NoiseGenerator {
    lfsr: u32,
}

impl NoiseGenerator {
    pub(super) fn new() -> Self {
        Self { lfsr: 1 }
    }

    pub(super) fn output(&self) -> u16 {
        (self.lfsr & 1) as u16
    }

    // 23-bit LFSR tapping bits 0 and 14; shifted once per slot, 72 times per
    // audio sample
    #[inline]
    pub(super) fn shift(&mut self) {
        let feedback = ((self.lfsr >> 14) ^ self.lfsr) & 1;
        self.lfsr = (self.lfsr >> 1) | (feedback << 22);
    }

    #[cfg(test)]
    pub(super) fn state(&self) -> u32 {
        self.lfsr
    }
}
