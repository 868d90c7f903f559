//! ESFM synthesis core: 18 channels of 4 operator slots each
//!
//! A single `generate_sample` call advances the whole chip by one audio
//! sample at the native rate of ~49716 Hz. Channels are processed in order,
//! and within a channel the four slots run strictly 0 to 3 so that each slot
//! reads its predecessor's freshly computed output as modulation input. Slot
//! 0 instead feeds back the average of its own last two outputs. After all
//! channels are mixed and clipped, the global timers and LFOs advance.

mod envelope;
mod lfo;
mod phase;
mod queue;
mod registers;
mod timer;
mod wave;

use crate::chip::envelope::EnvelopeGenerator;
use crate::chip::lfo::GlobalTimers;
use crate::chip::phase::{NoiseGenerator, PhaseGenerator};
use crate::chip::queue::WriteBuffer;
use crate::chip::timer::ProgrammableTimer;
use bincode::{Decode, Encode};
use std::array;

/// The chip's master clock divided down to the sample clock (14.318 MHz / 288).
pub const NATIVE_SAMPLE_RATE_HZ: f64 = 14_318_181.0 / 288.0;

const NUM_CHANNELS: usize = 18;
const SLOTS_PER_CHANNEL: usize = 4;

// Timer 1 ticks every 4 samples (80us), timer 2 every 16 samples (320us)
const TIMER_1_PERIOD: u8 = 4;
const TIMER_2_PERIOD: u8 = 16;

#[derive(Debug, Clone, Encode, Decode)]
struct Slot {
    phase: PhaseGenerator,
    envelope: EnvelopeGenerator,
    waveform: u8,
    rhythm_noise: u8,
    mod_input_level: u8,
    output_level: u8,
    out_enable: [i16; 2],
    output: i16,
    prev_output: i16,
    feedback_buf: i16,
}

impl Slot {
    fn new() -> Self {
        Self {
            phase: PhaseGenerator::new(),
            envelope: EnvelopeGenerator::new(),
            waveform: 0,
            rhythm_noise: 0,
            mod_input_level: 0,
            output_level: 0,
            out_enable: [!0; 2],
            output: 0,
            prev_output: 0,
            feedback_buf: 0,
        }
    }

    fn update_key_scaling(&mut self, keyscale_mode: bool) {
        self.envelope.update_key_scaling(self.phase.f_number, self.phase.block, keyscale_mode);
    }

    // Runs the waveform lookup and returns this slot's (left, right)
    // contribution to the channel bus
    #[inline]
    fn generate(&mut self, modulation: i16) -> (i16, i16) {
        let mut phase = self.phase.output() as i16;
        if self.mod_input_level != 0 {
            phase = phase.wrapping_add(modulation >> (7 - self.mod_input_level));
        }
        self.output = wave::amplitude(self.waveform, phase as u16, self.envelope.output());

        if self.output_level == 0 {
            return (0, 0);
        }
        let value = self.output >> (7 - self.output_level);
        (value & self.out_enable[0], value & self.out_enable[1])
    }
}

#[derive(Debug, Clone, Encode, Decode)]
struct Channel {
    slots: [Slot; SLOTS_PER_CHANNEL],
    output: [i16; 2],
    key_on: bool,
    key_on_2: bool,
    four_op_enable: bool,
    four_op_enable_2: bool,
    // Channels 16 and 17 key their upper slot pair from key_on_2
    split_key_on: bool,
}

impl Channel {
    fn new(split_key_on: bool) -> Self {
        Self {
            slots: array::from_fn(|_| Slot::new()),
            output: [0; 2],
            key_on: false,
            key_on_2: false,
            four_op_enable: false,
            four_op_enable_2: false,
            split_key_on,
        }
    }

    #[inline]
    fn clock(&mut self, timers: &GlobalTimers, noise: &mut NoiseGenerator) {
        self.output = [0; 2];

        // Slot 0 modulates itself with the average of its last two outputs,
        // computed before any slot runs this sample
        let slot_0 = &mut self.slots[0];
        slot_0.feedback_buf = (slot_0.output + slot_0.prev_output) >> 2;
        slot_0.prev_output = slot_0.output;

        for slot_idx in 0..SLOTS_PER_CHANNEL {
            let modulation = if slot_idx == 0 {
                self.slots[0].feedback_buf
            } else {
                self.slots[slot_idx - 1].output
            };
            let key_on = if self.split_key_on && slot_idx & 0x02 != 0 {
                self.key_on_2
            } else {
                self.key_on
            };
            // The rhythm network taps the third slot's phase from this sample
            let sibling_phase = self.slots[2].phase.output();

            let slot = &mut self.slots[slot_idx];
            let phase_reset = slot.envelope.clock(key_on, timers);
            slot.phase.clock(phase_reset, timers.vibrato_pos);
            if slot_idx == 3 && slot.rhythm_noise != 0 {
                let own_phase = slot.phase.output();
                slot.phase.override_output(phase::rhythm_phase(
                    slot.rhythm_noise,
                    own_phase,
                    sibling_phase,
                    noise.output(),
                ));
            }
            noise.shift();

            let (left, right) = slot.generate(modulation);
            self.output[0] += left;
            self.output[1] += right;
        }
    }
}

#[derive(Debug, Clone, Default, Encode, Decode)]
struct TestRegister {
    eg_halt: bool,
    distort: bool,
    attenuate: bool,
    phase_stop_reset: bool,
    mute: bool,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Chip {
    channels: [Channel; NUM_CHANNELS],
    timers: GlobalTimers,
    noise: NoiseGenerator,
    timer_1: ProgrammableTimer,
    timer_2: ProgrammableTimer,
    irq_bit: bool,
    address_latch: u16,
    native_mode: bool,
    emu_new_mode: bool,
    keyscale_mode: bool,
    test: TestRegister,
    write_buffer: WriteBuffer,
    sample_count: u64,
}

impl Chip {
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: array::from_fn(|idx| Channel::new(idx >= 16)),
            timers: GlobalTimers::new(),
            noise: NoiseGenerator::new(),
            timer_1: ProgrammableTimer::new(TIMER_1_PERIOD),
            timer_2: ProgrammableTimer::new(TIMER_2_PERIOD),
            irq_bit: false,
            address_latch: 0,
            native_mode: false,
            emu_new_mode: false,
            keyscale_mode: false,
            test: TestRegister::default(),
            write_buffer: WriteBuffer::new(),
            sample_count: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advances the chip by one sample and returns the (left, right) output
    /// pair. Buffered register writes that are due this sample are applied
    /// first.
    pub fn generate_sample(&mut self) -> (i16, i16) {
        while let Some((address, data)) = self.write_buffer.pop_due(self.sample_count) {
            self.write_register(address, data);
        }

        let mut sum_l = 0_i32;
        let mut sum_r = 0_i32;
        for channel in &mut self.channels {
            channel.clock(&self.timers, &mut self.noise);
            sum_l += i32::from(channel.output[0]);
            sum_r += i32::from(channel.output[1]);
        }

        let sample = if self.test.mute {
            (0, 0)
        } else {
            (clip_sample(sum_l), clip_sample(sum_r))
        };

        self.timers.clock();
        let timer_1_overflow = self.timer_1.tick();
        let timer_2_overflow = self.timer_2.tick();
        if timer_1_overflow || timer_2_overflow {
            self.irq_bit = true;
        }
        self.sample_count += 1;

        sample
    }

    /// Fills `out` with consecutive samples as interleaved L/R pairs. The
    /// slice length must be even.
    pub fn generate_stream(&mut self, out: &mut [i16]) {
        debug_assert!(out.len() % 2 == 0, "output buffer holds interleaved stereo pairs");

        for frame in out.chunks_exact_mut(2) {
            let (l, r) = self.generate_sample();
            frame[0] = l;
            frame[1] = r;
        }
    }
}

impl Default for Chip {
    fn default() -> Self {
        Self::new()
    }
}

fn clip_sample(sample: i32) -> i16 {
    sample.clamp(i16::MIN.into(), i16::MAX.into()) as i16
}
