//! Segment splicer and bounded-latency output pipeline.
//!
//! A deep ring of stereo frames holds everything between the input frontier
//! and the oldest unconfirmed decision. Confirmed transitions splice the
//! ring with linear fade-out/fade-in pairs centered on the transition
//! sample; the fades are additive halves, so their envelopes sum to unity
//! across the joint. Outside transitions the ring flushes in bulk once a
//! minute of confirmed audio accumulates, either written or discarded
//! according to the active skip mode.

use crate::classify::Mode;
use crate::config::{Config, SkipMode};
use crate::error::{Result, SiftError};
use crate::format_time;
use std::io::Write;

/// Frames written per chunk while flushing.
const WRITE_CHUNK_FRAMES: usize = 16384;

/// Applies a linear ramp from full scale down to zero, in place.
pub(crate) fn fade_out(samples: &mut [i16]) {
    let total = samples.len() as i64;
    let mut remaining = total;
    for sample in samples.iter_mut() {
        remaining -= 1;
        *sample = ((*sample as i64) * remaining / total) as i16;
    }
}

/// Applies a linear ramp from zero up to full scale, in place.
pub(crate) fn fade_in(samples: &mut [i16]) {
    let total = samples.len() as i64;
    let mut remaining = total;
    for sample in samples.iter_mut() {
        remaining -= 1;
        *sample = ((*sample as i64) * (total - remaining) / total) as i16;
    }
}

/// Output ring plus the crossfade hand-off buffer.
pub struct Splicer {
    ring: Vec<i16>,
    index: usize,
    crossfade: Vec<i16>,
    crossfade_len: usize,
    sample_rate: u32,
    step_samples: usize,
    skip_mode: SkipMode,
    keepalive: bool,
    quiet: bool,
    verbose: bool,
    samples_written: i64,
    samples_discarded: i64,
    scratch: Vec<u8>,
}

impl Splicer {
    pub fn new(config: &Config) -> Self {
        Self {
            ring: vec![0; config.output_len() * 2],
            index: 0,
            crossfade: vec![0; config.crossfade_len() * 2],
            crossfade_len: config.crossfade_len(),
            sample_rate: config.sample_rate,
            step_samples: config.step_samples(),
            skip_mode: config.skip_mode,
            keepalive: config.keepalive,
            quiet: config.quiet,
            verbose: config.verbose(),
            samples_written: 0,
            samples_discarded: 0,
            scratch: Vec::with_capacity(WRITE_CHUNK_FRAMES * 4),
        }
    }

    /// Current fill in frames.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn capacity_frames(&self) -> usize {
        self.ring.len() / 2
    }

    pub fn samples_written(&self) -> i64 {
        self.samples_written
    }

    pub fn samples_discarded(&self) -> i64 {
        self.samples_discarded
    }

    /// Appends one frame. A `None` channel leaves whatever the ring held
    /// there, which is how the delayed debug taps keep their lead-in.
    #[inline]
    pub fn push_frame(&mut self, left: Option<i16>, right: Option<i16>) {
        debug_assert!(self.index < self.capacity_frames());
        let base = self.index * 2;
        if let Some(value) = left {
            self.ring[base] = value;
        }
        if let Some(value) = right {
            self.ring[base + 1] = value;
        }
        self.index += 1;
    }

    /// Overwrites one channel of a frame already in the ring.
    #[inline]
    pub fn set_sample(&mut self, frame: usize, channel: usize, value: i16) {
        self.ring[frame * 2 + channel] = value;
    }

    /// Paints a span of already-enqueued frames, for the tensor tap.
    /// Spans reaching before the start of the ring are dropped.
    pub fn fill_span(&mut self, start_frame: i64, frames: usize, left: bool, right: bool, value: i16) {
        if start_frame < 0 {
            return;
        }
        let base = start_frame as usize * 2;
        for n in 0..frames {
            if left {
                self.ring[base + n * 2] = value;
            }
            if right {
                self.ring[base + n * 2 + 1] = value;
            }
        }
    }

    /// Splices a confirmed transition into the ring.
    ///
    /// When the newly detected mode is the skipped class this is a
    /// fade-out: everything before the crossfade is final output, and the
    /// faded tail is parked for the matching fade-in. Otherwise it is a
    /// fade-in: the skipped run-up is discarded and the parked tail is
    /// mixed over the fade.
    pub fn on_transition(
        &mut self,
        detected: Mode,
        transition_sample: i64,
        num_samples: i64,
        sink: &mut impl Write,
    ) -> Result<()> {
        let audio_offset = transition_sample - num_samples + self.index as i64;
        let crossfade_start = audio_offset - self.crossfade_len as i64 / 2;

        if crossfade_start < 0 {
            return Err(SiftError::TransitionOutOfRange(crossfade_start));
        }
        let crossfade_start = crossfade_start as usize;
        let span = self.crossfade_len * 2;

        if self.skip_matches(detected) {
            self.write_frames(sink, 0, crossfade_start)?;
            self.samples_written += crossfade_start as i64;
            self.shift_down(crossfade_start);

            if self.verbose {
                eprintln!(
                    "fade out: wrote {} samples ({:.1} secs), {:.1} secs remaining in buffer",
                    crossfade_start,
                    crossfade_start as f64 / self.sample_rate as f64,
                    self.index as f64 / self.sample_rate as f64
                );
            }

            self.crossfade.copy_from_slice(&self.ring[..span]);
            fade_out(&mut self.crossfade);
        } else {
            self.shift_down(crossfade_start);
            self.samples_discarded += crossfade_start as i64;

            if self.verbose {
                eprintln!(
                    "fade in: discarded {} samples ({:.1} secs), {:.1} secs remaining in buffer",
                    crossfade_start,
                    crossfade_start as f64 / self.sample_rate as f64,
                    self.index as f64 / self.sample_rate as f64
                );
            }

            if !self.quiet {
                eprintln!(
                    "crossfade to {} at {}",
                    detected.label(),
                    format_time(
                        self.samples_written + self.crossfade_len as i64 / 2,
                        self.sample_rate
                    )
                );
            }

            fade_in(&mut self.ring[..span]);

            for (out, &saved) in self.ring[..span].iter_mut().zip(self.crossfade.iter()) {
                *out = (*out as i32 + saved as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            }
        }

        Ok(())
    }

    /// Flushes confirmed audio once the ring is full or a minute of
    /// backlog has accumulated. In keep-alive mode a long skipped stretch
    /// is collapsed into one attenuated synthetic crossfade instead of
    /// vanishing entirely.
    pub fn maybe_flush(
        &mut self,
        confirmed_sample: i64,
        num_samples: i64,
        current_mode: Mode,
        up_counters: (u32, u32),
        sink: &mut impl Write,
    ) -> Result<()> {
        let available = confirmed_sample - num_samples
            + self.index as i64
            + self.step_samples as i64 / 2;

        if self.index < self.capacity_frames() && available < self.sample_rate as i64 * 60 {
            return Ok(());
        }

        if self.keepalive
            && available > self.crossfade_len as i64 * 2
            && self.skip_matches(current_mode)
        {
            let available = available as usize;
            let crossfade_start = available / 2 - self.crossfade_len;
            let base = crossfade_start * 2;
            let span = self.crossfade_len * 2;

            // Attenuate the whole excerpt by 4 so the added tails cannot clip
            for sample in &mut self.ring[base..base + span * 2] {
                *sample >>= 2;
            }

            fade_in(&mut self.ring[base..base + span]);

            for (out, &saved) in self.ring[base..base + span]
                .iter_mut()
                .zip(self.crossfade.iter())
            {
                *out = out.saturating_add(saved);
            }

            self.write_frames(sink, crossfade_start, self.crossfade_len)?;

            self.crossfade
                .copy_from_slice(&self.ring[base + span..base + span * 2]);
            fade_out(&mut self.crossfade);

            self.samples_discarded += (available - self.crossfade_len) as i64;
            self.samples_written += self.crossfade_len as i64;

            self.shift_down(available);

            let label = if current_mode == Mode::Music {
                "MUSICAL"
            } else {
                "TALKING"
            };
            let at = format_time(
                self.samples_written - self.crossfade_len as i64 / 2,
                self.sample_rate,
            );

            if self.verbose {
                eprintln!(
                    "discarded {} samples ({:.1} secs), inserted a {} crossfade at {}",
                    available - self.crossfade_len,
                    (available - self.crossfade_len) as f64 / self.sample_rate as f64,
                    label,
                    at
                );
            } else if !self.quiet {
                eprintln!("{} keep-alive at {}", label, at);
            }
        } else if available > 0 {
            let available = available as usize;
            let write_data = self.keeps_current(current_mode);

            if write_data {
                self.write_frames(sink, 0, available)?;
                self.samples_written += available as i64;
            } else {
                self.samples_discarded += available as i64;
            }

            self.shift_down(available);

            if self.verbose {
                eprintln!(
                    "{} {} samples ({:.1} secs), output index now {} ({:.1} secs), music/talk counts = {}/{}",
                    if write_data { "wrote" } else { "discarded" },
                    available,
                    available as f64 / self.sample_rate as f64,
                    self.index,
                    self.index as f64 / self.sample_rate as f64,
                    up_counters.0,
                    up_counters.1
                );
            }
        } else {
            return Err(SiftError::BufferStall);
        }

        Ok(())
    }

    /// Flushes whatever remains at EOF according to the current mode.
    pub fn drain(
        &mut self,
        current_mode: Mode,
        up_counters: (u32, u32),
        sink: &mut impl Write,
    ) -> Result<()> {
        if self.index == 0 {
            return Ok(());
        }

        let frames = self.index;
        let write_data = self.keeps_current(current_mode);

        if write_data {
            self.write_frames(sink, 0, frames)?;
            self.samples_written += frames as i64;
        } else {
            self.samples_discarded += frames as i64;
        }

        if self.verbose {
            eprintln!(
                "final: {} {} samples ({:.1} secs), music/talk counts = {}/{}",
                if write_data { "wrote" } else { "discarded" },
                frames,
                frames as f64 / self.sample_rate as f64,
                up_counters.0,
                up_counters.1
            );
        }

        self.index = 0;
        Ok(())
    }

    /// True when `mode` is the class this run elides.
    fn skip_matches(&self, mode: Mode) -> bool {
        let skip_for = if mode == Mode::Music {
            SkipMode::Music
        } else {
            SkipMode::Talk
        };
        self.skip_mode == skip_for
    }

    /// True when audio classified as `current` belongs in the output.
    fn keeps_current(&self, current: Mode) -> bool {
        let skip_for_other = if current == Mode::Music {
            SkipMode::Talk
        } else {
            SkipMode::Music
        };
        self.skip_mode == SkipMode::Nothing || self.skip_mode == skip_for_other
    }

    fn shift_down(&mut self, frames: usize) {
        self.ring.copy_within(frames * 2.., 0);
        self.index -= frames;
    }

    fn write_frames(&mut self, sink: &mut impl Write, start_frame: usize, frames: usize) -> Result<()> {
        let mut frame = start_frame;
        let end = start_frame + frames;

        while frame < end {
            let chunk = (end - frame).min(WRITE_CHUNK_FRAMES);
            self.scratch.clear();
            for &sample in &self.ring[frame * 2..(frame + chunk) * 2] {
                self.scratch.extend_from_slice(&sample.to_le_bytes());
            }
            sink.write_all(&self.scratch)?;
            frame += chunk;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults;

    fn config(skip_mode: SkipMode, keepalive: bool) -> Config {
        Config {
            sample_rate: defaults::MIN_SAMPLE_RATE,
            skip_mode,
            keepalive,
            quiet: true,
            ..Default::default()
        }
    }

    fn decode_frames(bytes: &[u8]) -> Vec<(i16, i16)> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                (
                    i16::from_le_bytes([chunk[0], chunk[1]]),
                    i16::from_le_bytes([chunk[2], chunk[3]]),
                )
            })
            .collect()
    }

    #[test]
    fn test_fade_out_ramps_to_zero() {
        let mut samples = [100i16; 4];
        fade_out(&mut samples);
        assert_eq!(samples, [75, 50, 25, 0]);
    }

    #[test]
    fn test_fade_in_ramps_to_full_scale() {
        let mut samples = [100i16; 4];
        fade_in(&mut samples);
        assert_eq!(samples, [25, 50, 75, 100]);
    }

    #[test]
    fn test_fades_are_complementary() {
        let mut out = [1000i16; 8];
        let mut into = [1000i16; 8];
        fade_out(&mut out);
        fade_in(&mut into);
        for (a, b) in out.iter().zip(into.iter()) {
            assert_eq!(a + b, 1000);
        }
    }

    #[test]
    fn test_push_frame_preserves_stale_channel_on_none() {
        let mut splicer = Splicer::new(&config(SkipMode::Nothing, false));
        splicer.push_frame(Some(7), Some(8));
        splicer.index = 0;
        splicer.push_frame(None, Some(9));
        assert_eq!(splicer.ring[0], 7);
        assert_eq!(splicer.ring[1], 9);
    }

    #[test]
    fn test_drain_writes_everything_in_pass_mode() {
        let mut splicer = Splicer::new(&config(SkipMode::Nothing, false));
        for n in 0..100i16 {
            splicer.push_frame(Some(n), Some(-n));
        }

        let mut sink = Vec::new();
        splicer.drain(Mode::None, (0, 0), &mut sink).unwrap();

        let frames = decode_frames(&sink);
        assert_eq!(frames.len(), 100);
        assert_eq!(frames[42], (42, -42));
        assert_eq!(splicer.samples_written(), 100);
        assert_eq!(splicer.samples_discarded(), 0);
        assert_eq!(splicer.index(), 0);
    }

    #[test]
    fn test_drain_discards_before_first_detection_when_skipping_talk() {
        // Before any confirmed mode, talk-skip treats the stream as talk
        let mut splicer = Splicer::new(&config(SkipMode::Talk, false));
        for _ in 0..50 {
            splicer.push_frame(Some(1), Some(1));
        }

        let mut sink = Vec::new();
        splicer.drain(Mode::None, (0, 0), &mut sink).unwrap();
        assert!(sink.is_empty());
        assert_eq!(splicer.samples_discarded(), 50);
    }

    #[test]
    fn test_drain_keeps_music_when_skipping_talk() {
        let mut splicer = Splicer::new(&config(SkipMode::Talk, false));
        for _ in 0..50 {
            splicer.push_frame(Some(1), Some(1));
        }

        let mut sink = Vec::new();
        splicer.drain(Mode::Music, (0, 0), &mut sink).unwrap();
        assert_eq!(sink.len(), 50 * 4);
        assert_eq!(splicer.samples_written(), 50);
    }

    #[test]
    fn test_skip_everything_discards_all_modes() {
        for mode in [Mode::None, Mode::Music, Mode::Talk] {
            let mut splicer = Splicer::new(&config(SkipMode::Everything, false));
            splicer.push_frame(Some(1), Some(1));
            let mut sink = Vec::new();
            splicer.drain(mode, (0, 0), &mut sink).unwrap();
            assert!(sink.is_empty());
        }
    }

    #[test]
    fn test_fade_out_transition_writes_head_and_parks_tail() {
        let cfg = config(SkipMode::Talk, false);
        let crossfade_len = cfg.crossfade_len();
        let mut splicer = Splicer::new(&cfg);

        let frames = 5 * crossfade_len;
        for _ in 0..frames {
            splicer.push_frame(Some(1000), Some(1000));
        }

        // Detected TALK while skipping talk: fade out. Anchor the
        // transition in the middle of the buffered audio.
        let num_samples = frames as i64;
        let transition = frames as i64 - 2 * crossfade_len as i64;
        let mut sink = Vec::new();
        splicer
            .on_transition(Mode::Talk, transition, num_samples, &mut sink)
            .unwrap();

        let head = frames - 2 * crossfade_len - crossfade_len / 2;
        assert_eq!(sink.len(), head * 4);
        assert_eq!(splicer.samples_written(), head as i64);
        assert_eq!(splicer.index(), frames - head);

        // The parked tail fades from full scale to silence
        assert_eq!(splicer.crossfade[0], 999);
        assert_eq!(*splicer.crossfade.last().unwrap(), 0);
    }

    #[test]
    fn test_fade_in_transition_discards_run_up_and_mixes_tail() {
        let cfg = config(SkipMode::Talk, false);
        let crossfade_len = cfg.crossfade_len();
        let mut splicer = Splicer::new(&cfg);

        let frames = 5 * crossfade_len;
        for _ in 0..frames {
            splicer.push_frame(Some(1000), Some(1000));
        }

        let num_samples = frames as i64;
        let transition = frames as i64 - 2 * crossfade_len as i64;
        let mut sink = Vec::new();
        splicer
            .on_transition(Mode::Music, transition, num_samples, &mut sink)
            .unwrap();

        // Nothing is written by a fade-in; the run-up is discarded
        assert!(sink.is_empty());
        let discarded = frames - 2 * crossfade_len - crossfade_len / 2;
        assert_eq!(splicer.samples_discarded(), discarded as i64);

        // The fade-in ramp starts near silence (parked tail was empty)
        // and the audio past the crossfade span is untouched
        assert!(splicer.ring[0].abs() <= 1);
        assert_eq!(splicer.ring[crossfade_len * 2], 1000);
    }

    #[test]
    fn test_transition_outside_ring_is_fatal() {
        let cfg = config(SkipMode::Talk, false);
        let mut splicer = Splicer::new(&cfg);
        for _ in 0..100 {
            splicer.push_frame(Some(0), Some(0));
        }

        let mut sink = Vec::new();
        let result = splicer.on_transition(Mode::Talk, 0, 1_000_000, &mut sink);
        assert!(matches!(result, Err(SiftError::TransitionOutOfRange(_))));
    }

    #[test]
    fn test_flush_skips_below_backlog_threshold() {
        let cfg = config(SkipMode::Nothing, false);
        let mut splicer = Splicer::new(&cfg);
        for _ in 0..1000 {
            splicer.push_frame(Some(5), Some(5));
        }

        let mut sink = Vec::new();
        splicer
            .maybe_flush(500, 1000, Mode::None, (0, 0), &mut sink)
            .unwrap();
        assert!(sink.is_empty());
        assert_eq!(splicer.index(), 1000);
    }

    #[test]
    fn test_flush_writes_backlog_in_pass_mode() {
        let cfg = config(SkipMode::Nothing, false);
        let rate = cfg.sample_rate as i64;
        let mut splicer = Splicer::new(&cfg);

        let frames = 67 * rate as usize;
        for _ in 0..frames {
            splicer.push_frame(Some(5), Some(5));
        }

        // The confirmed frontier lags five seconds behind the input, which
        // still leaves over a minute of backlog
        let confirmed = frames as i64 - 5 * rate;
        let mut sink = Vec::new();
        splicer
            .maybe_flush(confirmed, frames as i64, Mode::None, (0, 0), &mut sink)
            .unwrap();

        let expected = frames - 5 * rate as usize + cfg.step_samples() / 2;
        assert_eq!(splicer.samples_written(), expected as i64);
        assert_eq!(sink.len(), expected * 4);
        assert_eq!(splicer.index(), frames - expected);
    }

    #[test]
    fn test_full_ring_with_no_confirmed_audio_stalls() {
        let cfg = config(SkipMode::Nothing, false);
        let mut splicer = Splicer::new(&cfg);
        let capacity = splicer.capacity_frames();
        for _ in 0..capacity {
            splicer.push_frame(Some(0), Some(0));
        }

        // num_samples far past the confirmed frontier: nothing available
        let mut sink = Vec::new();
        let result = splicer.maybe_flush(
            0,
            3 * capacity as i64,
            Mode::None,
            (0, 0),
            &mut sink,
        );
        assert!(matches!(result, Err(SiftError::BufferStall)));
    }

    #[test]
    fn test_keepalive_collapses_backlog_into_one_crossfade() {
        let cfg = config(SkipMode::Talk, true);
        let crossfade_len = cfg.crossfade_len();
        let rate = cfg.sample_rate as i64;
        let mut splicer = Splicer::new(&cfg);

        let frames = 70 * rate as usize;
        for _ in 0..frames {
            splicer.push_frame(Some(4000), Some(4000));
        }

        let mut sink = Vec::new();
        splicer
            .maybe_flush(
                61 * rate,
                frames as i64,
                Mode::Talk,
                (0, 0),
                &mut sink,
            )
            .unwrap();

        let available = 61 * rate - frames as i64 + frames as i64 + cfg.step_samples() as i64 / 2;
        assert_eq!(splicer.samples_written(), crossfade_len as i64);
        assert_eq!(
            splicer.samples_discarded(),
            available - crossfade_len as i64
        );
        assert_eq!(splicer.index(), frames - available as usize);

        let written = decode_frames(&sink);
        assert_eq!(written.len(), crossfade_len);
        // Attenuated by 4 and faded in: starts silent, ends near 1000
        assert!(written[0].0.abs() <= 1);
        assert!(written[crossfade_len - 1].0 >= 999);

        // The parked tail fades the second half back out
        assert_eq!(splicer.crossfade[0], 999);
        assert_eq!(*splicer.crossfade.last().unwrap(), 0);
    }

    #[test]
    fn test_keepalive_applies_before_first_detection_when_skipping_talk() {
        // With no confirmed mode yet, talk-skip treats the stream as talk,
        // so a long backlog still collapses into a keep-alive crossfade.
        let cfg = config(SkipMode::Talk, true);
        let crossfade_len = cfg.crossfade_len();
        let rate = cfg.sample_rate as i64;
        let mut splicer = Splicer::new(&cfg);

        let frames = 70 * rate as usize;
        for _ in 0..frames {
            splicer.push_frame(Some(4000), Some(4000));
        }

        let mut sink = Vec::new();
        splicer
            .maybe_flush(61 * rate, frames as i64, Mode::None, (0, 0), &mut sink)
            .unwrap();
        assert_eq!(sink.len(), crossfade_len * 4);
        assert_eq!(splicer.samples_written(), crossfade_len as i64);
    }
}
