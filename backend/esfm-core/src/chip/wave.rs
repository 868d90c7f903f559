//! ESFM waveform unit
//!
//! Maps a 10-bit phase and an envelope attenuation to a signed amplitude
//! through the chip's log-sin and exponent ROMs. The chip works in the log
//! domain: the phase is looked up as an attenuation, the envelope is added to
//! it, and the sum is converted back to linear through the exponent ROM. The
//! sign is applied by one's complement, so the negative half-waves are offset
//! by one step exactly as on hardware.

use esfm_common::num::GetBit;
use std::array;
use std::sync::LazyLock;

// Log-amplitude value high enough to shift any exponent ROM output down to zero
const SILENCE: u16 = 0x1000;

// Quarter-wave log-sin ROM; stores attenuation on a log2 scale:
//   table[i] = round(-log2(sin((i + 0.5) / 256 * PI/2)) * 256)
static LOG_SINE_TABLE: LazyLock<[u16; 256]> = LazyLock::new(|| {
    array::from_fn(|i| {
        let sine = ((i as f64 + 0.5) / 256.0 * std::f64::consts::PI / 2.0).sin();
        (-sine.log2() * 256.0).round() as u16
    })
});

// Exponent ROM; 2^(-n) for n in [0, 1), scaled to 10 bits and stored with the
// implicit leading 1 in bit 10:
//   table[i] = round(2^((255 - i) / 256) * 1024)
static EXP2_TABLE: LazyLock<[u16; 256]> = LazyLock::new(|| {
    array::from_fn(|i| (2.0_f64.powf((255 - i) as f64 / 256.0) * 1024.0).round() as u16)
});

// Converts a log-domain attenuation to a linear amplitude. The low 8 bits
// index the exponent ROM and the high bits are applied as a right shift
fn exp2_lookup(level: u16) -> u16 {
    let level = level.min(0x1FFF);
    ((u32::from(EXP2_TABLE[(level & 0xFF) as usize]) << 1) >> (level >> 8)) as u16
}

// Log-sin attenuation for a half wave: the second quarter mirrors the first
fn half_sine_attenuation(phase: u16) -> u16 {
    if phase.bit(8) {
        LOG_SINE_TABLE[((phase & 0xFF) ^ 0xFF) as usize]
    } else {
        LOG_SINE_TABLE[(phase & 0xFF) as usize]
    }
}

// Log-sin attenuation for the double-frequency waveforms: two full periods are
// packed into the first half wave, and the second half is silent
fn double_sine_attenuation(phase: u16) -> u16 {
    if phase.bit(9) {
        SILENCE
    } else if phase.bit(7) {
        LOG_SINE_TABLE[(((phase ^ 0xFF) << 1) & 0xFF) as usize]
    } else {
        LOG_SINE_TABLE[((phase << 1) & 0xFF) as usize]
    }
}

// Applies the envelope attenuation and the sign mask. `neg` must be 0 or
// 0xFFFF; XOR with 0xFFFF is the chip's one's complement negation
fn attenuated_amplitude(attenuation: u16, envelope: u16, neg: u16) -> i16 {
    (exp2_lookup(attenuation + (envelope << 3)) ^ neg) as i16
}

fn full_sine(phase: u16, envelope: u16) -> i16 {
    let neg = if phase.bit(9) { 0xFFFF } else { 0 };
    attenuated_amplitude(half_sine_attenuation(phase), envelope, neg)
}

fn half_sine(phase: u16, envelope: u16) -> i16 {
    let attenuation = if phase.bit(9) { SILENCE } else { half_sine_attenuation(phase) };
    attenuated_amplitude(attenuation, envelope, 0)
}

fn absolute_sine(phase: u16, envelope: u16) -> i16 {
    attenuated_amplitude(half_sine_attenuation(phase), envelope, 0)
}

fn quarter_sine(phase: u16, envelope: u16) -> i16 {
    let attenuation =
        if phase.bit(8) { SILENCE } else { LOG_SINE_TABLE[(phase & 0xFF) as usize] };
    attenuated_amplitude(attenuation, envelope, 0)
}

fn alternating_sine(phase: u16, envelope: u16) -> i16 {
    let neg = if phase & 0x300 == 0x100 { 0xFFFF } else { 0 };
    attenuated_amplitude(double_sine_attenuation(phase), envelope, neg)
}

fn absolute_alternating_sine(phase: u16, envelope: u16) -> i16 {
    attenuated_amplitude(double_sine_attenuation(phase), envelope, 0)
}

fn square_wave(phase: u16, envelope: u16) -> i16 {
    let neg = if phase.bit(9) { 0xFFFF } else { 0 };
    attenuated_amplitude(0, envelope, neg)
}

// Sawtooth in the log domain: attenuation ramps linearly with phase, which
// produces an exponential decay per half period
fn log_sawtooth(phase: u16, envelope: u16) -> i16 {
    let (phase, neg) =
        if phase.bit(9) { ((phase & 0x1FF) ^ 0x1FF, 0xFFFF) } else { (phase, 0) };
    attenuated_amplitude(phase << 3, envelope, neg)
}

pub(super) fn amplitude(waveform: u8, phase: u16, envelope: u16) -> i16 {
    let phase = phase & 0x3FF;
    match waveform & 0x07 {
        0 => full_sine(phase, envelope),
        1 => half_sine(phase, envelope),
        2 => absolute_sine(phase, envelope),
        3 => quarter_sine(phase, envelope),
        4 => alternating_sine(phase, envelope),
        5 => absolute_alternating_sine(phase, envelope),
        6 => square_wave(phase, envelope),
        7 => log_sawtooth(phase, envelope),
        _ => unreachable!("waveform index is masked to 3 bits"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rom_endpoints() {
        assert_eq!(LOG_SINE_TABLE[0], 0x859);
        assert_eq!(LOG_SINE_TABLE[1], 0x6C3);
        assert_eq!(LOG_SINE_TABLE[128], 0x07F);
        assert_eq!(LOG_SINE_TABLE[255], 0x000);

        assert_eq!(EXP2_TABLE[0], 0x7FA);
        assert_eq!(EXP2_TABLE[1], 0x7F5);
        assert_eq!(EXP2_TABLE[128], 0x5A4);
        assert_eq!(EXP2_TABLE[255], 0x400);
    }

    #[test]
    fn full_sine_peaks() {
        // The quarter boundary is the loudest lookup: attenuation 0 maps to the
        // exponent ROM's full-scale output
        assert_eq!(amplitude(0, 0x100, 0), 4084);
        assert_eq!(amplitude(0, 0x300, 0), -4085);

        // Phase 0 is the quietest nonzero lookup
        assert_eq!(amplitude(0, 0, 0), exp2_lookup(0x859) as i16);
    }

    #[test]
    fn full_sine_symmetry() {
        // One's complement negation: second half is the first half inverted
        for phase in 0..0x200 {
            assert_eq!(amplitude(0, phase, 0), !amplitude(0, phase + 0x200, 0));
        }
    }

    #[test]
    fn half_sine_silences_negative_half() {
        for phase in 0x200..0x400 {
            assert_eq!(amplitude(1, phase, 0), 0);
        }
        assert_eq!(amplitude(1, 0x100, 0), 4084);
    }

    #[test]
    fn absolute_sine_is_never_negative() {
        for phase in 0..0x400 {
            assert!(amplitude(2, phase, 0) >= 0);
        }
        assert_eq!(amplitude(2, 0x300, 0), 4084);
    }

    #[test]
    fn quarter_sine_silences_mirrored_quarters() {
        for phase in 0x100..0x200 {
            assert_eq!(amplitude(3, phase, 0), 0);
        }
        assert_eq!(amplitude(3, 0xFF, 0), 4084);
    }

    #[test]
    fn alternating_sine_runs_at_double_frequency() {
        // Waveform 4 packs a full period into the first half wave, with the
        // second quarter sign-flipped; waveform 5 is its rectified variant
        assert_eq!(amplitude(4, 0x80, 0), 4084);
        assert_eq!(amplitude(4, 0x180, 0), -4085);
        assert_eq!(amplitude(5, 0x180, 0), 4084);
        for phase in 0x200..0x400 {
            assert_eq!(amplitude(4, phase, 0), 0);
            assert_eq!(amplitude(5, phase, 0), 0);
        }
    }

    #[test]
    fn square_wave_is_constant_magnitude() {
        for phase in 0..0x200 {
            assert_eq!(amplitude(6, phase, 0), 4084);
            assert_eq!(amplitude(6, phase + 0x200, 0), -4085);
        }
    }

    #[test]
    fn log_sawtooth_decays_within_half_period() {
        assert_eq!(amplitude(7, 0, 0), 4084);
        let mut prev = amplitude(7, 0, 0);
        for phase in 1..0x200 {
            let value = amplitude(7, phase, 0);
            assert!(value <= prev);
            prev = value;
        }
        assert_eq!(amplitude(7, 0x3FF, 0), -4085);
    }

    #[test]
    fn envelope_attenuates_output() {
        let mut prev = amplitude(0, 0x100, 0);
        for envelope in 1..0x200 {
            let value = amplitude(0, 0x100, envelope);
            assert!(value <= prev);
            prev = value;
        }

        // Full attenuation is silence on every waveform; the one's complement
        // sign leaves negative half-waves at -1 rather than 0
        for waveform in 0..8 {
            for phase in (0..0x400).step_by(37) {
                let value = amplitude(waveform, phase, 0x3FF);
                assert!(value == 0 || value == -1, "waveform {waveform} phase {phase}: {value}");
            }
        }
    }
}
