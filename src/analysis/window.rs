//! Sliding-window envelope analyzer.
//!
//! Accumulates per-sample mean-square levels into a 5 s window and emits
//! one descriptor every 200 ms step once the window is full. Extrema are
//! picked by alternating trough/peak triggers with a geometric threshold
//! derived from the window's own dynamic range, so the same logic scales
//! from whisper-level noise to full-scale program material.

use crate::analysis::descriptor::Descriptor;
use crate::analysis::stats::AnalysisStats;
use crate::defaults::{FULL_SCALE_RMS, MAX_CYCLES};
use crate::format_time;

/// Analyzer over a sliding energy window.
pub struct WindowAnalyzer {
    levels: Vec<f32>,
    fill: usize,
    step: usize,
    sample_rate: u32,
    verbose_period: Option<u32>,
    stats: AnalysisStats,
    num_windows: u64,
}

impl WindowAnalyzer {
    pub fn new(window_len: usize, step: usize, sample_rate: u32, verbose_period: Option<u32>) -> Self {
        Self {
            levels: vec![0.0; window_len],
            fill: 0,
            step,
            sample_rate,
            verbose_period,
            stats: AnalysisStats::new(),
            num_windows: 0,
        }
    }

    /// Adds one envelope level; returns a descriptor when the window fills.
    ///
    /// `num_samples` is the count of input samples consumed so far,
    /// including the one that produced this level.
    pub fn push(&mut self, level: f32, num_samples: i64) -> Option<Descriptor> {
        self.levels[self.fill] = level;
        self.fill += 1;

        if self.fill < self.levels.len() {
            return None;
        }

        let descriptor = self.analyze(num_samples);
        self.stats.record(&descriptor);
        self.num_windows += 1;

        self.levels.copy_within(self.step.., 0);
        self.fill -= self.step;

        Some(descriptor)
    }

    pub fn num_windows(&self) -> u64 {
        self.num_windows
    }

    pub fn stats(&self) -> &AnalysisStats {
        &self.stats
    }

    pub fn into_stats(self) -> AnalysisStats {
        self.stats
    }

    fn analyze(&self, num_samples: i64) -> Descriptor {
        let levels = &self.levels;
        let n = levels.len();

        let mut peak = levels[0];
        let mut trough = levels[0];
        for &level in &levels[1..] {
            if level < trough {
                trough = level;
            }
            if level > peak {
                peak = level;
            }
        }

        // max(1.0) also absorbs an all-zero window, which cannot happen
        // with dither active but must not poison the math if it does.
        let ratio = ((peak / trough) as f64).max(1.0);
        let range_db = (ratio.log10() * 10.0 + 0.5).floor();
        let square_root = ratio.sqrt();
        let cube_root = ratio.cbrt();
        let peak_bound = peak as f64 / cube_root;
        let trough_bound = trough as f64 * cube_root;

        let mut zones = [0usize; 3];
        let mut trigger_points = [0i64; MAX_CYCLES];
        let mut cycles = 0usize;
        let mut prev_peak = levels[0] as f64;
        let mut prev_trough = levels[0] as f64;
        let mut prev_peak_pos = 0i64;
        let mut prev_trough_pos = 0i64;

        for (i, &level) in levels.iter().enumerate().skip(1) {
            let level = level as f64;

            let zone = if level > peak_bound {
                2
            } else if level > trough_bound {
                1
            } else {
                0
            };
            zones[zone] += 1;

            if cycles & 1 == 1 {
                // odd: tracking a peak candidate, trigger on the drop
                if level > prev_peak {
                    prev_peak = level;
                    prev_peak_pos = i as i64;
                } else if level < prev_peak / square_root {
                    trigger_points[cycles] = prev_peak_pos;
                    cycles += 1;
                    prev_trough = level;

                    if cycles == MAX_CYCLES {
                        cycles -= 2;
                    }
                }
            } else {
                // even (initial): tracking a trough candidate, trigger on the rise
                if level < prev_trough {
                    prev_trough = level;
                    prev_trough_pos = i as i64;
                } else if level > prev_trough * square_root {
                    trigger_points[cycles] = prev_trough_pos;
                    cycles += 1;
                    prev_peak = level;
                }
            }
        }

        let mut attack_ratio = 0.5f64;

        if cycles >= 4 {
            let mut attack_count = 0i64;
            let mut attack_time = 0i64;
            let mut decay_count = 0i64;
            let mut decay_time = 0i64;

            for i in 2..cycles {
                let interval = trigger_points[i] - trigger_points[i - 1];
                if i & 1 == 1 {
                    attack_time += interval;
                    attack_count += 1;
                } else {
                    decay_time += interval;
                    decay_count += 1;
                }
            }

            // A window whose intervals all land in one parity class keeps
            // the 0.5 default rather than aborting the run.
            if attack_count > 0 && decay_count > 0 {
                attack_ratio = attack_time as f64 / (attack_time + decay_time) as f64;

                if attack_count != decay_count {
                    attack_ratio *=
                        (attack_count + decay_count) as f64 / (attack_count as f64 * 2.0);
                }
            }
        }

        let mut peak_jitter = 1.0f64;

        if cycles >= 6 {
            let num_peaks = cycles >> 1;
            let period = (trigger_points[num_peaks * 2 - 1] - trigger_points[1]) as f64
                / (num_peaks - 1) as f64;
            let mut error_sum = 0.0;

            let mut i = 3;
            while i < cycles - 2 {
                let prediction = trigger_points[1] as f64 + period * (i >> 1) as f64;
                error_sum += (trigger_points[i] as f64 - prediction).abs();
                i += 2;
            }

            peak_jitter = (error_sum / (num_peaks - 2) as f64) / period;

            if !(peak_jitter <= 1.0) {
                peak_jitter = 1.0;
            }
        }

        let mut low_fraction = zones[0] as f64 / n as f64;
        let mut mid_fraction = zones[1] as f64 / n as f64;
        let mut high_fraction = zones[2] as f64 / n as f64;

        // Nonlinear rescale concentrating typical fractions around 0.5
        low_fraction *= (1.0 - low_fraction) * (3.0 / 4.0) + 1.0;
        mid_fraction *= (1.0 - mid_fraction) * (3.0 / 4.0) + 1.0;
        high_fraction *= (1.0 - high_fraction) * (3.0 / 4.0) + 1.0;

        let descriptor = Descriptor {
            range_db: range_db.clamp(0.0, 95.0) as u8,
            cycles: (cycles & !1) as u8,
            low_third: quantize(low_fraction),
            mid_third: quantize(mid_fraction),
            high_third: quantize(high_fraction),
            attack_ratio: quantize(attack_ratio),
            peak_jitter: quantize(peak_jitter),
            spare: 0,
        };

        if let Some(period) = self.verbose_period {
            let window_start = num_samples - n as i64;
            if window_start % (self.sample_rate as i64 * period as i64) == 0 {
                eprintln!(
                    "{}-{}: level: {:5.1} dB - {:5.1} dB, peak/trough = {:4.1} dB, \
                     cycles = {:2}, zones = {:.3}, {:.3}, {:.3}, attack = {:.3}, jitter = {:.3}",
                    format_time(window_start, self.sample_rate),
                    format_time(num_samples, self.sample_rate),
                    ((trough as f64) / FULL_SCALE_RMS).log10() * 10.0,
                    ((peak as f64) / FULL_SCALE_RMS).log10() * 10.0,
                    ratio.log10() * 10.0,
                    descriptor.cycles,
                    descriptor.low_third as f64 / 255.0,
                    descriptor.mid_third as f64 / 255.0,
                    descriptor.high_third as f64 / 255.0,
                    attack_ratio,
                    peak_jitter,
                );
            }
        }

        descriptor
    }
}

fn quantize(fraction: f64) -> u8 {
    ((fraction * 255.0 + 0.5).floor()).min(255.0) as u8
}
