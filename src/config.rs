//! Run configuration for the streaming filter.
//!
//! Everything here arrives on the command line; the pipeline derives its
//! buffer sizes from one validated `Config` at startup.

use crate::defaults;
use crate::error::{Result, SiftError};

/// Which class of audio the run elides, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkipMode {
    /// Pass all audio through (default).
    #[default]
    Nothing,
    /// Elide confirmed TALK regions.
    Talk,
    /// Elide confirmed MUSIC regions.
    Music,
    /// Emit no audio at all; useful with `-a` analysis capture.
    Everything,
}

/// What a debug-overridden output channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelTap {
    /// Normal audio (left = first input channel, right = last).
    #[default]
    Audio,
    /// The mono mixdown fed to the analyzer.
    Mono,
    /// The band-limited analysis signal.
    Filtered,
    /// The envelope level in scaled dB, delayed by half the level window.
    Level,
    /// The averaged tensor score, painted over each classified step.
    Tensor,
}

impl ChannelTap {
    /// Maps the `-l<n>` / `-r<n>` numeric spec to a tap.
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(ChannelTap::Audio),
            1 => Some(ChannelTap::Mono),
            2 => Some(ChannelTap::Filtered),
            3 => Some(ChannelTap::Level),
            4 => Some(ChannelTap::Tensor),
            _ => None,
        }
    }
}

/// One validated filter run.
#[derive(Debug, Clone)]
pub struct Config {
    pub channels: u32,
    pub sample_rate: u32,
    pub skip_mode: SkipMode,
    /// Score threshold offset, -99 to +99. Positive favors TALK tendency.
    pub threshold: i32,
    /// Insert synthetic crossfades while skipping long regions.
    pub keepalive: bool,
    pub quiet: bool,
    /// Progress period in seconds; `None` disables verbose output.
    pub verbose_period: Option<u32>,
    pub left_tap: ChannelTap,
    pub right_tap: ChannelTap,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channels: defaults::CHANNELS,
            sample_rate: defaults::SAMPLE_RATE,
            skip_mode: SkipMode::Nothing,
            threshold: 0,
            keepalive: false,
            quiet: false,
            verbose_period: None,
            left_tap: ChannelTap::Audio,
            right_tap: ChannelTap::Audio,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.channels < 1 || self.channels > 2 {
            return Err(SiftError::ConfigInvalidValue {
                key: "channels".to_string(),
                message: "must be 1 or 2".to_string(),
            });
        }

        if self.sample_rate < defaults::MIN_SAMPLE_RATE
            || self.sample_rate > defaults::MAX_SAMPLE_RATE
        {
            return Err(SiftError::ConfigInvalidValue {
                key: "sample_rate".to_string(),
                message: "must be 11025 Hz - 96000 Hz".to_string(),
            });
        }

        if self.threshold < -99 || self.threshold > 99 {
            return Err(SiftError::ConfigInvalidValue {
                key: "threshold".to_string(),
                message: "must be -99 to 99".to_string(),
            });
        }

        Ok(())
    }

    pub fn verbose(&self) -> bool {
        self.verbose_period.is_some()
    }

    /// Samples the analysis window advances per descriptor.
    pub fn step_samples(&self) -> usize {
        (defaults::STEP_MSECS * self.sample_rate / 1000) as usize
    }

    /// Length of the mean-square envelope ring, rounded to the nearest sample.
    pub fn envelope_len(&self) -> usize {
        ((self.sample_rate * defaults::LEVEL_WIN_MS + 500) / 1000) as usize
    }

    /// Length of the analysis window in samples.
    pub fn window_len(&self) -> usize {
        (defaults::WINDOW_SECONDS * self.sample_rate) as usize
    }

    /// Capacity of the output ring in frames.
    pub fn output_len(&self) -> usize {
        (defaults::OUTPUT_SECONDS * self.sample_rate) as usize
    }

    /// Length of a crossfade in frames.
    pub fn crossfade_len(&self) -> usize {
        (defaults::CROSSFADE_SECS * self.sample_rate) as usize
    }
}
