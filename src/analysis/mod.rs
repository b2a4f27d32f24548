//! Per-window feature extraction.
//!
//! The envelope stream is analyzed in 5 s windows advanced by 200 ms; each
//! window condenses to an 8-byte descriptor record that indexes the
//! discrimination tensor.

pub mod descriptor;
pub mod stats;
pub mod window;

pub use descriptor::{Descriptor, DESCRIPTOR_SIZE};
pub use window::WindowAnalyzer;
