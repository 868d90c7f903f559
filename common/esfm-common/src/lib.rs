//! Helper code shared across the workspace crates.

pub mod num;
