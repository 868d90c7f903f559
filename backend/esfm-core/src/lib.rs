//! ESS ESFM FM synthesis sound chip
//!
//! The ESFM is an enhanced OPL3 derivative used in ESS AudioDrive sound
//! cards: 18 channels of 4 chained operator slots, each with its own pitch,
//! envelope, waveform, and modulation depth. This crate emulates the chip's
//! native-mode register map and its sample-accurate digital output at the
//! native rate of ~49716 Hz.
//!
//! ```
//! use esfm_core::Chip;
//!
//! let mut chip = Chip::new();
//! // Channel 0 slot 0: full-volume instant-attack sine at f_num 0x120, block 4
//! for (register, data) in [0x21, 0x00, 0xF0, 0x08, 0x20, 0x11, 0x30, 0xE0].into_iter().enumerate() {
//!     chip.write_register(register as u16, data);
//! }
//! chip.write_register(0x240, 0x01);
//!
//! let (left, right) = chip.generate_sample();
//! assert_eq!(left, right);
//! ```

pub mod chip;

pub use chip::{Chip, NATIVE_SAMPLE_RATE_HZ};
