//! ESFM envelope generator
//!
//! A per-slot Attack/Decay/Sustain/Release machine over a 9-bit attenuation
//! counter, where 0 is full volume and 0x1FF silence. Rates are scaled by the
//! slot's keyscale value, then subdivided per sample using the global envelope
//! timer's dither value. Keying a slot on routes it through an optional
//! pre-attack delay before the attack phase begins.

use crate::chip::lfo::GlobalTimers;
use bincode::{Decode, Encode};
use std::cmp;

// Attenuation is 9 bits: 0 is full volume, 0x1FF silence
const ATTENUATION_MASK: u16 = 0x1FF;
pub(super) const MAX_ATTENUATION: u16 = ATTENUATION_MASK;

// Attenuation in the top 0x1F8..=0x1FF band counts as fully silent
const ENVELOPE_OFF_MASK: u16 = 0x1F8;

// KSL attenuation per F-number high bits, in 0.75 dB units
const KSL_TABLE: [i16; 16] = [0, 32, 40, 45, 48, 51, 53, 55, 56, 58, 59, 60, 61, 62, 63, 64];

// Right shift applied to the raw KSL attenuation for ksl = 0..3
// (off / 3 dB / 1.5 dB / 6 dB per octave)
const KSL_SHIFT: [u8; 4] = [8, 1, 2, 0];

// Extra rate steps for the fastest rates, indexed by rate_lo and the low two
// bits of the global timer
#[rustfmt::skip]
const EG_INCREMENT_STEPS: [[u8; 4]; 4] = [
    [0, 0, 0, 0],
    [1, 0, 0, 0],
    [1, 0, 1, 0],
    [1, 1, 1, 0],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub(super) enum EnvelopeState {
    Attack,
    Decay,
    Sustain,
    #[default]
    Release,
}

#[derive(Debug, Clone, Encode, Decode)]
pub(super) struct EnvelopeGenerator {
    // Register values
    pub(super) attack_rate: u8,
    pub(super) decay_rate: u8,
    pub(super) sustain_level: u8,
    pub(super) release_rate: u8,
    pub(super) total_level: u8,
    pub(super) key_scale_level: u8,
    pub(super) key_scale_rate: bool,
    pub(super) sustaining: bool,
    pub(super) delay: u8,
    pub(super) tremolo_enabled: bool,
    pub(super) tremolo_deep: bool,
    // Internal state
    state: EnvelopeState,
    position: u16,
    ksl_offset: u16,
    output: u16,
    keyscale: u8,
    delay_run: bool,
    delay_counter: u16,
}

impl EnvelopeGenerator {
    pub(super) fn new() -> Self {
        Self {
            attack_rate: 0,
            decay_rate: 0,
            sustain_level: 0,
            release_rate: 0,
            total_level: 0,
            key_scale_level: 0,
            key_scale_rate: false,
            sustaining: false,
            delay: 0,
            tremolo_enabled: false,
            tremolo_deep: false,
            state: EnvelopeState::Release,
            position: MAX_ATTENUATION,
            ksl_offset: 0,
            output: MAX_ATTENUATION,
            keyscale: 0,
            delay_run: false,
            delay_counter: 0,
        }
    }

    // Advances the envelope by one sample. Returns true when the slot's phase
    // accumulator must be reset (the pre-attack delay just elapsed)
    pub(super) fn clock(&mut self, key_on: bool, timers: &GlobalTimers) -> bool {
        self.output = self.position
            + (u16::from(self.total_level) << 2)
            + (self.ksl_offset >> KSL_SHIFT[self.key_scale_level as usize]);
        if self.tremolo_enabled {
            let tremolo_shift = if self.tremolo_deep { 2 } else { 4 };
            self.output += u16::from(timers.tremolo >> tremolo_shift);
        }

        let (reset, reg_rate) = if key_on && self.state == EnvelopeState::Release {
            // Keyed on but still in Release: wait out the pre-attack delay,
            // releasing at the release rate in the meantime
            if !self.delay_run {
                self.delay_run = true;
                self.delay_counter = if self.delay != 0 { 0x100 } else { 0 };
            }

            if self.delay_counter == 0 {
                self.delay_run = false;
                (true, self.attack_rate)
            } else {
                if timers.global_timer & (1 << self.delay) != 0 {
                    self.delay_counter -= 1;
                }
                (false, self.release_rate)
            }
        } else {
            let reg_rate = match self.state {
                EnvelopeState::Attack => self.attack_rate,
                EnvelopeState::Decay => self.decay_rate,
                EnvelopeState::Sustain => {
                    if self.sustaining { 0 } else { self.release_rate }
                }
                EnvelopeState::Release => self.release_rate,
            };
            (false, reg_rate)
        };

        let keyscale = self.keyscale >> (if self.key_scale_rate { 0 } else { 2 });
        let rate = u16::from(keyscale) + (u16::from(reg_rate) << 2);
        let rate_hi = cmp::min(rate >> 2, 0x0F) as u8;
        let rate_lo = (rate & 0x03) as u8;
        let eg_shift = rate_hi + timers.eg_clocks;

        let mut shift = 0;
        if reg_rate != 0 {
            if rate_hi < 12 {
                // Slow rates step only on envelope ticks, at a power-of-two
                // subdivision picked by the timer dither
                if timers.eg_tick {
                    shift = match eg_shift {
                        12 => 1,
                        13 => (rate_lo >> 1) & 0x01,
                        14 => rate_lo & 0x01,
                        _ => 0,
                    };
                }
            } else {
                shift = (rate_hi & 0x03)
                    + EG_INCREMENT_STEPS[rate_lo as usize][(timers.global_timer & 0x03) as usize];
                if shift & 0x04 != 0 {
                    shift = 0x03;
                }
                if shift == 0 {
                    shift = u8::from(timers.eg_tick);
                }
            }
        }

        let mut eg_rout = self.position;
        let mut eg_inc: i32 = 0;

        // Rates 60-63 attack instantly
        if reset && rate_hi == 0x0F {
            eg_rout = 0;
        }

        let eg_off = self.position & ENVELOPE_OFF_MASK == ENVELOPE_OFF_MASK;
        if self.state != EnvelopeState::Attack && !reset && eg_off {
            eg_rout = MAX_ATTENUATION;
        }

        match self.state {
            EnvelopeState::Attack => {
                if self.position == 0 {
                    self.state = EnvelopeState::Decay;
                } else if key_on && shift > 0 && rate_hi != 0x0F {
                    // Exponential attack curve; must be evaluated in wide
                    // arithmetic so the increment is nonzero at max attenuation
                    eg_inc = !i32::from(self.position) >> (4 - shift);
                }
            }
            EnvelopeState::Decay => {
                if self.position >> 4 == u16::from(self.sustain_level) {
                    self.state = EnvelopeState::Sustain;
                } else if !eg_off && !reset && shift > 0 {
                    eg_inc = 1 << (shift - 1);
                }
            }
            EnvelopeState::Sustain | EnvelopeState::Release => {
                if !eg_off && !reset && shift > 0 {
                    eg_inc = 1 << (shift - 1);
                }
            }
        }

        self.position = ((i32::from(eg_rout) + eg_inc) & i32::from(ATTENUATION_MASK)) as u16;

        if reset {
            self.state = EnvelopeState::Attack;
        }
        if !key_on {
            self.state = EnvelopeState::Release;
            self.delay_run = false;
        }

        reset
    }

    // The effective attenuation seen by the waveform unit this sample
    #[inline]
    pub(super) fn output(&self) -> u16 {
        self.output
    }

    pub(super) fn update_key_scaling(&mut self, f_number: u16, block: u8, keyscale_mode: bool) {
        let ksl = (KSL_TABLE[(f_number >> 6) as usize] << 2) - ((8 - i16::from(block)) << 5);
        self.ksl_offset = cmp::max(ksl, 0) as u16;

        // The keyscale value mixes the octave with one F-number bit; the
        // keyscale_mode config flag selects bit 8 over bit 9
        let f_num_bit = 9 - u8::from(keyscale_mode);
        self.keyscale = (block << 1) | (((f_number >> f_num_bit) & 1) as u8);
    }

    #[cfg(test)]
    pub(super) fn attenuation(&self) -> u16 {
        self.position
    }

    #[cfg(test)]
    pub(super) fn state(&self) -> EnvelopeState {
        self.state
    }

    #[cfg(test)]
    pub(super) fn keyscale(&self) -> u8 {
        self.keyscale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed_generator(attack_rate: u8) -> EnvelopeGenerator {
        let mut envelope = EnvelopeGenerator::new();
        envelope.attack_rate = attack_rate;
        envelope.release_rate = 0x0F;
        envelope.sustaining = true;
        envelope
    }

    #[test]
    fn stays_silent_when_released() {
        let timers = GlobalTimers::new();
        let mut envelope = EnvelopeGenerator::new();

        for _ in 0..1000 {
            assert!(!envelope.clock(false, &timers));
            assert_eq!(envelope.attenuation(), MAX_ATTENUATION);
            assert_eq!(envelope.state(), EnvelopeState::Release);
        }
    }

    #[test]
    fn instant_attack() {
        let timers = GlobalTimers::new();
        let mut envelope = keyed_generator(0x0F);

        // Rate 15 with no delay snaps straight to full volume and requests a
        // phase reset on the same sample
        assert!(envelope.clock(true, &timers));
        assert_eq!(envelope.attenuation(), 0);
        assert_eq!(envelope.state(), EnvelopeState::Attack);

        envelope.clock(true, &timers);
        assert_eq!(envelope.state(), EnvelopeState::Decay);
    }

    #[test]
    fn gradual_attack_reaches_full_volume() {
        let mut timers = GlobalTimers::new();
        let mut envelope = keyed_generator(0x08);

        assert!(envelope.clock(true, &timers));
        timers.clock();

        let mut positions = Vec::new();
        for _ in 0..20_000 {
            envelope.clock(true, &timers);
            timers.clock();
            positions.push(envelope.attenuation());
            if envelope.state() == EnvelopeState::Decay {
                break;
            }
        }

        assert_eq!(envelope.state(), EnvelopeState::Decay);
        assert!(positions.windows(2).all(|pair| pair[1] <= pair[0]));
    }

    #[test]
    fn key_off_forces_release() {
        let timers = GlobalTimers::new();
        let mut envelope = keyed_generator(0x0F);
        envelope.clock(true, &timers);
        envelope.clock(true, &timers);

        envelope.clock(false, &timers);
        assert_eq!(envelope.state(), EnvelopeState::Release);
    }

    #[test]
    fn release_decays_to_silence() {
        let mut timers = GlobalTimers::new();
        let mut envelope = keyed_generator(0x0F);
        envelope.clock(true, &timers);
        timers.clock();

        for _ in 0..20_000 {
            envelope.clock(false, &timers);
            timers.clock();
        }
        assert_eq!(envelope.attenuation(), MAX_ATTENUATION);
    }

    #[test]
    fn decay_holds_at_sustain_level() {
        let mut timers = GlobalTimers::new();
        let mut envelope = keyed_generator(0x0F);
        envelope.decay_rate = 0x0F;
        envelope.sustain_level = 0x04;

        envelope.clock(true, &timers);
        timers.clock();
        for _ in 0..20_000 {
            envelope.clock(true, &timers);
            timers.clock();
        }

        assert_eq!(envelope.state(), EnvelopeState::Sustain);
        assert_eq!(envelope.attenuation() >> 4, 0x04);

        // Sustaining envelopes hold position with rate 0
        let held = envelope.attenuation();
        for _ in 0..1000 {
            envelope.clock(true, &timers);
            timers.clock();
        }
        assert_eq!(envelope.attenuation(), held);
    }

    #[test]
    fn pre_attack_delay_counts_global_timer_bits() {
        let mut timers = GlobalTimers::new();
        timers.global_timer = 1 << 3;

        let mut envelope = keyed_generator(0x0F);
        envelope.delay = 3;

        // The counter arms at 0x100 and decrements on every sample where bit
        // 3 of the global timer is set; the timer is pinned here so the delay
        // elapses after exactly 0x100 samples
        for sample in 0..0x100 {
            assert!(!envelope.clock(true, &timers), "sample {sample}");
            assert_eq!(envelope.state(), EnvelopeState::Release);
        }
        assert!(envelope.clock(true, &timers));
        assert_eq!(envelope.state(), EnvelopeState::Attack);
    }

    #[test]
    fn key_off_during_delay_rearms_it() {
        let mut timers = GlobalTimers::new();
        timers.global_timer = 1 << 3;

        let mut envelope = keyed_generator(0x0F);
        envelope.delay = 3;

        for _ in 0..0x80 {
            envelope.clock(true, &timers);
        }
        envelope.clock(false, &timers);

        // Keying back on restarts the full delay
        for sample in 0..0x100 {
            assert!(!envelope.clock(true, &timers), "sample {sample}");
        }
        assert!(envelope.clock(true, &timers));
    }

    #[test]
    fn ksl_offset_clamps_at_zero() {
        let mut envelope = EnvelopeGenerator::new();

        // Low F-number, low block: raw KSL goes negative and clamps
        envelope.update_key_scaling(0x020, 0, false);
        assert_eq!(envelope.ksl_offset, 0);

        envelope.update_key_scaling(0x120, 2, false);
        assert_eq!(envelope.ksl_offset, 0);

        envelope.update_key_scaling(0x120, 6, false);
        assert_eq!(envelope.ksl_offset, 128);
    }

    #[test]
    fn keyscale_mode_selects_f_number_bit() {
        let mut envelope = EnvelopeGenerator::new();

        envelope.update_key_scaling(0x100, 0, false);
        assert_eq!(envelope.keyscale(), 0);

        envelope.update_key_scaling(0x100, 0, true);
        assert_eq!(envelope.keyscale(), 1);

        envelope.update_key_scaling(0x200, 3, false);
        assert_eq!(envelope.keyscale(), (3 << 1) | 1);
    }
}
