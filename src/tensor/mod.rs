//! The 4-D discrimination tensor: lookup table, on-disk codec, trainer.

pub mod codec;
pub mod table;
pub mod train;

pub use table::{Tensor, BINS, CELLS};
