//! The streaming filter pipeline.
//!
//! Owns every stage from raw PCM in to spliced PCM out and drives them a
//! sample at a time: mono mixdown with dither, band-limiting, envelope,
//! window analysis, tensor scoring, hysteresis classification, and output
//! splicing. Single-threaded; all buffers are sized at construction and
//! nothing allocates in the steady state.

use crate::analysis::stats::AnalysisStats;
use crate::analysis::WindowAnalyzer;
use crate::audio::biquad::{Biquad, BiquadCoefficients};
use crate::audio::dither::Dither;
use crate::audio::envelope::EnvelopeRing;
use crate::classify::{Classifier, Mode};
use crate::config::{ChannelTap, Config, SkipMode};
use crate::defaults::{AVERAGE_SECONDS, FULL_SCALE_RMS, HIGHPASS_FREQ, LOWPASS_FREQ, WINDOW_SECONDS};
use crate::error::Result;
use crate::format_time;
use crate::splice::Splicer;
use crate::tensor::Tensor;
use std::io::Write;

/// Everything a finished run reports.
pub struct RunSummary {
    pub num_samples: i64,
    pub num_windows: u64,
    pub music_hits: u64,
    pub talk_hits: u64,
    pub samples_written: i64,
    pub samples_discarded: i64,
    pub transitions: u32,
    stats: AnalysisStats,
    analysis_active: bool,
}

impl RunSummary {
    /// Prints the end-of-run accounting block, and the descriptor field
    /// histograms when an analysis capture was taken.
    pub fn display(&self, config: &Config) {
        if config.quiet {
            return;
        }

        eprintln!(
            "total input duration = {}",
            format_time(self.num_samples, config.sample_rate)
        );

        if config.verbose() {
            eprintln!("total windows = {}", self.num_windows);
        }

        let windows = self.num_windows as f64;
        let unknowns = self.num_windows - self.music_hits - self.talk_hits;
        eprintln!(
            "raw music hits = {} ({:.1}%), raw talk hits = {} ({:.1}%), unknowns = {} ({:.1}%)",
            self.music_hits,
            self.music_hits as f64 * 100.0 / windows,
            self.talk_hits,
            self.talk_hits as f64 * 100.0 / windows,
            unknowns,
            unknowns as f64 * 100.0 / windows
        );

        let total = (self.samples_written + self.samples_discarded) as f64;
        eprintln!(
            "audio written = {} ({:.1}%), audio discarded = {} ({:.1}%)\n",
            format_time(self.samples_written, config.sample_rate),
            self.samples_written as f64 * 100.0 / total,
            format_time(self.samples_discarded, config.sample_rate),
            self.samples_discarded as f64 * 100.0 / total
        );

        if self.analysis_active {
            self.stats.display();
        }
    }
}

/// The assembled filter chain.
pub struct Pipeline<W: Write> {
    config: Config,
    tensor: Tensor,
    sink: W,
    analysis_sink: Option<Box<dyn Write>>,
    dither: Dither,
    highpass: [Biquad; 2],
    lowpass: [Biquad; 2],
    envelope: EnvelopeRing,
    analyzer: WindowAnalyzer,
    classifier: Classifier,
    splicer: Splicer,
    mono: Vec<f32>,
    num_samples: i64,
    transitions: u32,
}

impl<W: Write> Pipeline<W> {
    /// Builds the pipeline and pre-warms the envelope ring with filtered
    /// dither noise, so the first window's trough is the noise floor.
    pub fn new(config: Config, tensor: Tensor, sink: W, analysis_sink: Option<Box<dyn Write>>) -> Self {
        let rate = config.sample_rate;
        let mut dither = Dither::new();

        let highpass_coefs = BiquadCoefficients::highpass(HIGHPASS_FREQ / rate as f64);
        let lowpass_coefs = BiquadCoefficients::lowpass(LOWPASS_FREQ / rate as f64);
        let mut highpass = [Biquad::new(highpass_coefs), Biquad::new(highpass_coefs)];
        let mut lowpass = [Biquad::new(lowpass_coefs), Biquad::new(lowpass_coefs)];

        let mut envelope = EnvelopeRing::new(config.envelope_len());
        let mut noise: Vec<f32> = (0..envelope.len()).map(|_| dither.next_offset()).collect();
        for filter in highpass.iter_mut().chain(lowpass.iter_mut()) {
            filter.apply_buffer(&mut noise);
        }
        envelope.prewarm(&noise);

        let analyzer = WindowAnalyzer::new(
            config.window_len(),
            config.step_samples(),
            rate,
            config.verbose_period,
        );
        let classifier = Classifier::new(
            rate,
            config.step_samples(),
            config.crossfade_len(),
            config.threshold,
            config.verbose(),
        );
        let splicer = Splicer::new(&config);
        let mono = vec![0.0; rate as usize];

        Self {
            config,
            tensor,
            sink,
            analysis_sink,
            dither,
            highpass,
            lowpass,
            envelope,
            analyzer,
            classifier,
            splicer,
            mono,
            num_samples: 0,
            transitions: 0,
        }
    }

    /// Feeds one block of interleaved frames, at most one second's worth.
    /// A trailing partial frame is ignored.
    pub fn process_block(&mut self, input: &[i16]) -> Result<()> {
        let channels = self.config.channels as usize;
        let frames = input.len() / channels;
        debug_assert!(frames <= self.mono.len());

        if channels == 2 {
            for (j, mono) in self.mono[..frames].iter_mut().enumerate() {
                *mono = (input[j * 2] as f32 + input[j * 2 + 1] as f32) / 2.0
                    + self.dither.next_offset();
            }
        } else {
            for (j, mono) in self.mono[..frames].iter_mut().enumerate() {
                *mono = input[j] as f32 + self.dither.next_offset();
            }
        }

        for filter in self.highpass.iter_mut().chain(self.lowpass.iter_mut()) {
            filter.apply_buffer(&mut self.mono[..frames]);
        }

        for j in 0..frames {
            self.process_sample(input, j)?;
        }

        Ok(())
    }

    fn process_sample(&mut self, input: &[i16], j: usize) -> Result<()> {
        let channels = self.config.channels as usize;
        let level = self.envelope.push(self.mono[j]);

        let first = input[j * channels];
        let last = input[j * channels + channels - 1];

        let left = self.tap_value(self.config.left_tap, 0, first, last, level, j);
        let right = self.tap_value(self.config.right_tap, 1, first, last, level, j);
        self.splicer.push_frame(left, right);

        self.num_samples += 1;

        if let Some(descriptor) = self.analyzer.push(level, self.num_samples) {
            if let Some(capture) = self.analysis_sink.as_mut() {
                capture.write_all(&descriptor.to_bytes())?;
            }

            let score = self.tensor.lookup(&descriptor);
            let detected = self.classifier.push_score(score, self.num_samples);

            self.paint_tensor_tap();

            if let Some(mode) = detected {
                self.transitions += 1;
                self.on_detection(mode)?;
            }
        }

        self.splicer.maybe_flush(
            self.classifier.confirmed_sample(),
            self.num_samples,
            self.classifier.current_mode(),
            self.classifier.up_counters(),
            &mut self.sink,
        )?;

        Ok(())
    }

    /// Resolves one output channel. `Some` values land in the ring at the
    /// current frame; the level tap instead writes into the past (the
    /// envelope lags its audio by half the level window) and the tensor
    /// tap is painted per classified step.
    fn tap_value(
        &mut self,
        tap: ChannelTap,
        channel: usize,
        first: i16,
        last: i16,
        level: f32,
        j: usize,
    ) -> Option<i16> {
        match tap {
            ChannelTap::Audio => Some(if channel == 0 { first } else { last }),
            ChannelTap::Mono => Some(((first as i32 + last as i32) >> 1) as i16),
            ChannelTap::Filtered => Some(self.mono[j] as i16),
            ChannelTap::Level => {
                let env_half = self.envelope.len() / 2;
                if self.splicer.index() >= env_half {
                    let frame = self.splicer.index() - env_half;
                    let db = ((level as f64 / FULL_SCALE_RMS).log10() + 9.6) * 3413.0;
                    self.splicer
                        .set_sample(frame, channel, (db + 0.5).floor() as i16);
                }
                None
            }
            ChannelTap::Tensor => None,
        }
    }

    /// Paints the averaged score over the step it covers, delayed by the
    /// analysis look-back, when a tensor tap is active.
    fn paint_tensor_tap(&mut self) {
        let left = self.config.left_tap == ChannelTap::Tensor;
        let right = self.config.right_tap == ChannelTap::Tensor;
        if !left && !right {
            return;
        }

        let Some((sum, count)) = self.classifier.last_average() else {
            return;
        };

        let rate = self.config.sample_rate as i64;
        let step = self.config.step_samples();
        let start = self.splicer.index() as i64
            - (WINDOW_SECONDS as i64 * rate / 2)
            - (AVERAGE_SECONDS as i64 * rate / 2)
            - step as i64 / 2;

        let value = (sum * 100 + count as i32 / 2) / count as i32
            - self.config.threshold * 100;
        self.splicer.fill_span(start, step, left, right, value as i16);
    }

    fn on_detection(&mut self, mode: Mode) -> Result<()> {
        match self.config.skip_mode {
            SkipMode::Music | SkipMode::Talk => self.splicer.on_transition(
                mode,
                self.classifier.transition_sample(),
                self.num_samples,
                &mut self.sink,
            ),
            _ => {
                if !self.config.quiet {
                    eprintln!(
                        "{}: detected {} starting at {}",
                        format_time(self.num_samples, self.config.sample_rate),
                        mode.label(),
                        format_time(
                            self.classifier.transition_sample(),
                            self.config.sample_rate
                        )
                    );
                }
                Ok(())
            }
        }
    }

    /// Drains the output ring and reports the run.
    pub fn finish(mut self) -> Result<RunSummary> {
        self.splicer.drain(
            self.classifier.current_mode(),
            self.classifier.up_counters(),
            &mut self.sink,
        )?;
        self.sink.flush()?;

        let analysis_active = self.analysis_sink.is_some();
        if let Some(mut capture) = self.analysis_sink.take() {
            capture.flush()?;
        }

        Ok(RunSummary {
            num_samples: self.num_samples,
            num_windows: self.analyzer.num_windows(),
            music_hits: self.classifier.music_hits(),
            talk_hits: self.classifier.talk_hits(),
            samples_written: self.splicer.samples_written(),
            samples_discarded: self.splicer.samples_discarded(),
            transitions: self.transitions,
            stats: self.analyzer.into_stats(),
            analysis_active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::descriptor;
    use crate::defaults;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// In-memory sink that stays readable after the pipeline consumes it.
    #[derive(Clone, Default)]
    struct SharedSink(Rc<RefCell<Vec<u8>>>);

    impl SharedSink {
        fn take(&self) -> Vec<u8> {
            self.0.borrow_mut().split_off(0)
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn quiet_config(channels: u32) -> Config {
        Config {
            channels,
            sample_rate: defaults::MIN_SAMPLE_RATE,
            quiet: true,
            ..Default::default()
        }
    }

    fn run(
        config: Config,
        input: &[i16],
        analysis: Option<SharedSink>,
    ) -> (Vec<u8>, RunSummary) {
        let block = (config.sample_rate * config.channels) as usize;
        let output = SharedSink::default();
        let mut pipeline = Pipeline::new(
            config,
            Tensor::zeroed(),
            output.clone(),
            analysis.map(|sink| Box::new(sink) as Box<dyn Write>),
        );

        for chunk in input.chunks(block) {
            pipeline.process_block(chunk).unwrap();
        }
        let summary = pipeline.finish().unwrap();
        (output.take(), summary)
    }

    fn as_le_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_pass_through_stereo_is_bit_identical() {
        let frames = 3 * defaults::MIN_SAMPLE_RATE as usize;
        let mut input = Vec::with_capacity(frames * 2);
        for n in 0..frames {
            input.push((n % 3001) as i16 - 1500);
            input.push(1000 - (n % 2001) as i16);
        }

        let (output, summary) = run(quiet_config(2), &input, None);

        assert_eq!(output, as_le_bytes(&input));
        assert_eq!(summary.num_samples, frames as i64);
        assert_eq!(summary.samples_written, frames as i64);
        assert_eq!(summary.samples_discarded, 0);
    }

    #[test]
    fn test_mono_input_widens_to_duplicated_stereo() {
        let frames = 2 * defaults::MIN_SAMPLE_RATE as usize;
        let input: Vec<i16> = (0..frames).map(|n| (n % 1001) as i16 - 500).collect();

        let (output, summary) = run(quiet_config(1), &input, None);

        assert_eq!(output.len(), frames * 4);
        for (n, frame) in output.chunks_exact(4).enumerate() {
            let left = i16::from_le_bytes([frame[0], frame[1]]);
            let right = i16::from_le_bytes([frame[2], frame[3]]);
            assert_eq!(left, input[n]);
            assert_eq!(right, input[n]);
        }
        assert_eq!(summary.num_samples, frames as i64);
    }

    #[test]
    fn test_silence_yields_silence_and_quiet_descriptors() {
        let frames = 10 * defaults::MIN_SAMPLE_RATE as usize;
        let input = vec![0i16; frames * 2];
        let capture = SharedSink::default();

        let (output, summary) = run(quiet_config(2), &input, Some(capture.clone()));

        assert_eq!(output, vec![0u8; frames * 4]);

        // The window fills at five seconds, then advances every 200 ms
        let records = descriptor::read_all(&mut capture.take().as_slice()).unwrap();
        assert_eq!(records.len(), 26);
        assert_eq!(summary.num_windows, 26);

        // Dithered silence has almost no envelope range
        for record in records {
            assert!(record.range_db <= 10, "range = {}", record.range_db);
            assert_eq!(record.spare, 0);
        }
    }

    #[test]
    fn test_skip_everything_discards_the_whole_stream() {
        let frames = 3 * defaults::MIN_SAMPLE_RATE as usize;
        let input: Vec<i16> = vec![500; frames * 2];
        let config = Config {
            skip_mode: SkipMode::Everything,
            ..quiet_config(2)
        };

        let (output, summary) = run(config, &input, None);

        assert!(output.is_empty());
        assert_eq!(summary.samples_written, 0);
        assert_eq!(summary.samples_discarded, frames as i64);
        assert_eq!(
            summary.samples_written + summary.samples_discarded,
            summary.num_samples
        );
    }

    #[test]
    fn test_filtered_tap_replaces_one_channel_only() {
        let frames = defaults::MIN_SAMPLE_RATE as usize;
        let mut input = Vec::with_capacity(frames * 2);
        for n in 0..frames {
            let value = if n % 2 == 0 { 2000 } else { -2000 };
            input.push(value);
            input.push(value);
        }

        let config = Config {
            left_tap: ChannelTap::Filtered,
            ..quiet_config(2)
        };
        let (output, _) = run(config, &input, None);

        let mut left_differs = false;
        for (n, frame) in output.chunks_exact(4).enumerate() {
            let left = i16::from_le_bytes([frame[0], frame[1]]);
            let right = i16::from_le_bytes([frame[2], frame[3]]);
            assert_eq!(right, input[n * 2 + 1]);
            if left != input[n * 2] {
                left_differs = true;
            }
        }
        assert!(left_differs, "filtered tap should differ from raw audio");
    }
}
