//! Tuning constants shared across the pipeline stages.
//!
//! These are the sizes and corners the streaming buffers are preallocated
//! from; the latency of the filter is set entirely by this module.

/// Default audio sample rate in Hz, overridable from 11025 to 96000.
pub const SAMPLE_RATE: u32 = 44100;

/// Default channel count (interleaved signed 16-bit input).
pub const CHANNELS: u32 = 2;

/// Lowest accepted sample rate override in Hz.
pub const MIN_SAMPLE_RATE: u32 = 11025;

/// Highest accepted sample rate override in Hz.
pub const MAX_SAMPLE_RATE: u32 = 96000;

/// Width of the mean-square energy envelope window in milliseconds.
pub const LEVEL_WIN_MS: u32 = 50;

/// Length of the analysis window in seconds.
pub const WINDOW_SECONDS: u32 = 5;

/// Span of trailing scores averaged by the classifier, in seconds.
pub const AVERAGE_SECONDS: u32 = 5;

/// Window advance per descriptor, in milliseconds.
pub const STEP_MSECS: u32 = 200;

/// Number of scores in the classifier FIFO.
pub const AVERAGE_COUNT: usize = (AVERAGE_SECONDS * 1000 / STEP_MSECS) as usize;

/// Crossfade length in seconds (fade-out plus matching fade-in).
pub const CROSSFADE_SECS: u32 = 2;

/// Minimum confirmed dwell before a TALK transition is issued, in seconds.
pub const MIN_TALK_SECS: u32 = 10;

/// Minimum confirmed dwell before a MUSIC transition is issued, in seconds.
pub const MIN_MUSIC_SECS: u32 = 20;

/// A pending transition contradicted for this long is cancelled, in seconds.
pub const MAX_PEND_SECS: u32 = 60;

/// Depth of the output look-ahead ring in seconds.
pub const OUTPUT_SECONDS: u32 = 120;

/// Low-pass corner of the analysis band in Hz.
pub const LOWPASS_FREQ: f64 = 2000.0;

/// High-pass corner of the analysis band in Hz.
pub const HIGHPASS_FREQ: f64 = 250.0;

/// Cap on envelope half-cycle triggers per window.
pub const MAX_CYCLES: usize = 128;

/// Seed of the dither generator. Fixed: descriptor captures are only
/// reproducible when the dither stream is identical run to run.
pub const DITHER_SEED: u32 = 0x31415926;

/// Mean-square energy of a full-scale square wave, the 0 dBFS reference
/// for the level debug tap and verbose analysis lines.
pub const FULL_SCALE_RMS: f64 = 32768.0 * 32767.0 * 0.5;

/// Default verbose progress period in seconds when `-v` is given bare.
pub const VERBOSE_PERIOD_SECS: u32 = 300;
