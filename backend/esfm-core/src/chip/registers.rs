//! ESFM native-mode register file and the 4-port host bus interface
//!
//! The native map exposes eight registers per slot, one key-on register per
//! channel (with channels 16 and 17 split into two half-channel registers),
//! and a handful of global timer/config/test registers. The legacy 4-port
//! interface latches a 16-bit address; in native mode port 1 writes the
//! latched register directly, while in emulation mode only the minimal
//! OPL3-compatibility registers are decoded.

use crate::chip::{Chip, Slot};
use esfm_common::num::{GetBit, U16Ext};

const ADDRESS_MASK: u16 = 0x7FF;

// Address space layout
const SLOT_REGISTERS_END: u16 = 18 * 4 * 8;
const KEY_ON_REGISTERS_END: u16 = SLOT_REGISTERS_END + 16;
const KEY_ON_SPLIT_REGISTERS_END: u16 = KEY_ON_REGISTERS_END + 4;

const TIMER_1_REGISTER: u16 = 0x402;
const TIMER_2_REGISTER: u16 = 0x403;
const TIMER_CONTROL_REGISTER: u16 = 0x404;
const CONFIG_REGISTER: u16 = 0x408;
const TEST_REGISTER: u16 = 0x501;

impl Chip {
    /// Writes a register in the native-mode address map. Out-of-range
    /// addresses are ignored.
    pub fn write_register(&mut self, address: u16, data: u8) {
        let address = address & ADDRESS_MASK;

        if address < SLOT_REGISTERS_END {
            let channel_idx = (address >> 5) as usize;
            let slot_idx = ((address >> 3) & 0x03) as usize;
            let register_idx = (address & 0x07) as u8;

            log::trace!("Channel {channel_idx} slot {slot_idx} register {register_idx}: {data:02X}");

            let keyscale_mode = self.keyscale_mode;
            self.channels[channel_idx].slots[slot_idx].write_register(
                register_idx,
                data,
                keyscale_mode,
            );
        } else if address < KEY_ON_REGISTERS_END {
            let channel_idx = (address - SLOT_REGISTERS_END) as usize;
            let channel = &mut self.channels[channel_idx];
            channel.key_on = data.bit(0);
            channel.four_op_enable = data.bit(1);

            log::trace!("Channel {channel_idx} key on: {}", channel.key_on);
        } else if address < KEY_ON_SPLIT_REGISTERS_END {
            // Channels 16 and 17 key their two slot pairs separately
            let channel_idx = 16 + (address & 0x01) as usize;
            let channel = &mut self.channels[channel_idx];
            if address.bit(1) {
                channel.key_on_2 = data.bit(0);
                channel.four_op_enable_2 = data.bit(1);
            } else {
                channel.key_on = data.bit(0);
                channel.four_op_enable = data.bit(1);
            }

            log::trace!("Channel {channel_idx} split key on: {data:02X}");
        } else {
            self.write_global_register(address, data);
        }
    }

    fn write_global_register(&mut self, address: u16, data: u8) {
        match address & 0x5FF {
            TIMER_1_REGISTER => {
                self.timer_1.interval = data;
            }
            TIMER_2_REGISTER => {
                self.timer_2.interval = data;
            }
            TIMER_CONTROL_REGISTER => {
                if data.bit(7) {
                    self.timer_1.clear_overflow();
                    self.timer_2.clear_overflow();
                    self.irq_bit = false;
                }
                self.timer_1.set_enabled(data.bit(0));
                self.timer_2.set_enabled(data.bit(1));
                self.timer_1.set_masked(data.bit(5));
                self.timer_2.set_masked(data.bit(6));

                log::trace!("Timer control: {data:02X}");
            }
            CONFIG_REGISTER => {
                self.set_keyscale_mode(data.bit(6));

                log::trace!("Keyscale mode: {}", self.keyscale_mode);
            }
            TEST_REGISTER => {
                self.test.eg_halt = data.bit(0);
                self.test.distort = data.bit(1);
                self.test.attenuate = data.bit(4);
                self.test.phase_stop_reset = data.bit(5);
                self.test.mute = data.bit(6);

                log::trace!("Test register: {data:02X}");
            }
            _ => {}
        }
    }

    fn set_keyscale_mode(&mut self, keyscale_mode: bool) {
        self.keyscale_mode = keyscale_mode;

        // Every slot's keyscale value folds in an F-number bit selected by
        // this flag
        for channel in &mut self.channels {
            for slot in &mut channel.slots {
                slot.update_key_scaling(keyscale_mode);
            }
        }
    }

    /// Reads back a register in the native-mode address map. Out-of-range
    /// addresses read as 0.
    #[must_use]
    pub fn read_register(&self, address: u16) -> u8 {
        let address = address & ADDRESS_MASK;

        if address < SLOT_REGISTERS_END {
            let channel_idx = (address >> 5) as usize;
            let slot_idx = ((address >> 3) & 0x03) as usize;
            let register_idx = (address & 0x07) as u8;

            self.channels[channel_idx].slots[slot_idx].read_register(register_idx)
        } else if address < KEY_ON_REGISTERS_END {
            let channel = &self.channels[(address - SLOT_REGISTERS_END) as usize];
            u8::from(channel.key_on) | (u8::from(channel.four_op_enable) << 1)
        } else if address < KEY_ON_SPLIT_REGISTERS_END {
            let channel = &self.channels[16 + (address & 0x01) as usize];
            if address.bit(1) {
                u8::from(channel.key_on_2) | (u8::from(channel.four_op_enable_2) << 1)
            } else {
                u8::from(channel.key_on) | (u8::from(channel.four_op_enable) << 1)
            }
        } else {
            self.read_global_register(address)
        }
    }

    fn read_global_register(&self, address: u16) -> u8 {
        match address & 0x5FF {
            TIMER_1_REGISTER => self.timer_1.interval,
            TIMER_2_REGISTER => self.timer_2.interval,
            TIMER_CONTROL_REGISTER => {
                u8::from(self.timer_1.enabled())
                    | (u8::from(self.timer_2.enabled()) << 1)
                    | (u8::from(self.timer_1.masked()) << 5)
                    | (u8::from(self.timer_2.masked()) << 6)
            }
            CONFIG_REGISTER => u8::from(self.keyscale_mode) << 6,
            TEST_REGISTER => {
                u8::from(self.test.eg_halt)
                    | (u8::from(self.test.distort) << 1)
                    | (u8::from(self.test.attenuate) << 4)
                    | (u8::from(self.test.phase_stop_reset) << 5)
                    | (u8::from(self.test.mute) << 6)
            }
            _ => 0,
        }
    }

    /// Enqueues a register write to be applied a fixed two-sample delay from
    /// now, at the start of the due `generate_sample` call.
    pub fn write_register_buffered(&mut self, address: u16, data: u8) {
        self.write_buffer.push(self.sample_count, address, data);
    }

    /// Writes through the legacy 4-port interface. The decode depends on the
    /// current register map mode.
    pub fn write_port(&mut self, offset: u8, data: u8) {
        if self.native_mode {
            match offset & 0x03 {
                0 => {
                    // Any write to port 0 drops back to the emulation map
                    self.native_mode = false;
                }
                1 => self.write_register(self.address_latch, data),
                2 => self.address_latch.set_lsb(data),
                3 => self.address_latch.set_msb(data),
                _ => unreachable!("port offset is masked to 2 bits"),
            }
        } else {
            match offset & 0x03 {
                0 => self.address_latch.set_msb(data),
                1 => {
                    let address = self.address_latch >> 8;
                    self.write_emu_register(address, data);
                }
                2 => self.address_latch.set_lsb(data),
                3 => {
                    let address = (self.address_latch & 0x00FF) | 0x100;
                    self.write_emu_register(address, data);
                }
                _ => unreachable!("port offset is masked to 2 bits"),
            }
        }
    }

    // Minimal OPL3-compatibility decode: only the mode and keyscale
    // configuration registers are honored
    fn write_emu_register(&mut self, address: u16, data: u8) {
        let high = address.bit(8);
        let register = address & 0xFF;
        if register & 0xF0 != 0x00 {
            return;
        }

        if high {
            if register & 0x0F == 0x05 {
                self.emu_new_mode = data.bit(0);
                self.native_mode = data.bit(7);

                log::trace!("Native mode: {}", self.native_mode);
            }
        } else if register & 0x0F == 0x08 {
            self.set_keyscale_mode(data.bit(6));
        }
    }

    /// Reads through the legacy 4-port interface: the status byte at offset
    /// 0, and in native mode the latched register at offset 1.
    #[must_use]
    pub fn read_port(&self, offset: u8) -> u8 {
        match offset & 0x03 {
            0 => self.status(),
            1 if self.native_mode => self.read_register(self.address_latch),
            _ => 0,
        }
    }

    fn status(&self) -> u8 {
        (u8::from(self.irq_bit) << 7)
            | (u8::from(self.timer_1.overflow_flag()) << 6)
            | (u8::from(self.timer_2.overflow_flag()) << 5)
    }
}

impl Slot {
    fn write_register(&mut self, register_idx: u8, data: u8, keyscale_mode: bool) {
        match register_idx & 0x07 {
            0x00 => {
                self.envelope.tremolo_enabled = data.bit(7);
                self.phase.vibrato_enabled = data.bit(6);
                self.envelope.sustaining = data.bit(5);
                self.envelope.key_scale_rate = data.bit(4);
                self.phase.multiple = data & 0x0F;
            }
            0x01 => {
                self.envelope.key_scale_level = data >> 6;
                self.envelope.total_level = data & 0x3F;
            }
            0x02 => {
                self.envelope.attack_rate = data >> 4;
                self.envelope.decay_rate = data & 0x0F;
            }
            0x03 => {
                self.envelope.sustain_level = data >> 4;
                self.envelope.release_rate = data & 0x0F;
            }
            0x04 => {
                self.phase.f_number.set_lsb(data);
                self.update_key_scaling(keyscale_mode);
            }
            0x05 => {
                self.envelope.delay = data >> 5;
                self.phase.block = (data >> 2) & 0x07;
                self.phase.f_number = (self.phase.f_number & 0x00FF) | (u16::from(data & 0x03) << 8);
                self.update_key_scaling(keyscale_mode);
            }
            0x06 => {
                self.envelope.tremolo_deep = data.bit(7);
                self.phase.vibrato_deep = data.bit(6);
                self.out_enable[0] = if data.bit(5) { !0 } else { 0 };
                self.out_enable[1] = if data.bit(4) { !0 } else { 0 };
                self.mod_input_level = (data >> 1) & 0x07;
            }
            0x07 => {
                self.output_level = data >> 5;
                self.rhythm_noise = (data >> 3) & 0x03;
                self.waveform = data & 0x07;
            }
            _ => unreachable!("slot register index is masked to 3 bits"),
        }
    }

    fn read_register(&self, register_idx: u8) -> u8 {
        match register_idx & 0x07 {
            0x00 => {
                (u8::from(self.envelope.tremolo_enabled) << 7)
                    | (u8::from(self.phase.vibrato_enabled) << 6)
                    | (u8::from(self.envelope.sustaining) << 5)
                    | (u8::from(self.envelope.key_scale_rate) << 4)
                    | (self.phase.multiple & 0x0F)
            }
            0x01 => (self.envelope.key_scale_level << 6) | (self.envelope.total_level & 0x3F),
            0x02 => (self.envelope.attack_rate << 4) | (self.envelope.decay_rate & 0x0F),
            0x03 => (self.envelope.sustain_level << 4) | (self.envelope.release_rate & 0x0F),
            0x04 => self.phase.f_number.lsb(),
            0x05 => {
                (self.envelope.delay << 5)
                    | ((self.phase.block & 0x07) << 2)
                    | (self.phase.f_number.msb() & 0x03)
            }
            0x06 => {
                (u8::from(self.envelope.tremolo_deep) << 7)
                    | (u8::from(self.phase.vibrato_deep) << 6)
                    | (u8::from(self.out_enable[0] != 0) << 5)
                    | (u8::from(self.out_enable[1] != 0) << 4)
                    | ((self.mod_input_level & 0x07) << 1)
            }
            0x07 => {
                (self.output_level << 5)
                    | ((self.rhythm_noise & 0x03) << 3)
                    | (self.waveform & 0x07)
            }
            _ => unreachable!("slot register index is masked to 3 bits"),
        }
    }
}
