//! Descriptor field histograms for the analysis summary.
//!
//! Recorded for every window; displayed on stderr at EOF when an analysis
//! capture was requested and the run is not quiet.

use crate::analysis::descriptor::Descriptor;

/// Central tendency of one histogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub min: usize,
    pub max: usize,
    pub mean: f64,
    pub median: f64,
    pub mode: f64,
}

/// Per-field value histograms over all analyzed windows.
pub struct AnalysisStats {
    range_db: Vec<u32>,
    cycles: Vec<u32>,
    low_third: Vec<u32>,
    mid_third: Vec<u32>,
    high_third: Vec<u32>,
    attack_ratio: Vec<u32>,
    peak_jitter: Vec<u32>,
}

impl AnalysisStats {
    pub fn new() -> Self {
        Self {
            range_db: vec![0; 96],
            cycles: vec![0; 256],
            low_third: vec![0; 256],
            mid_third: vec![0; 256],
            high_third: vec![0; 256],
            attack_ratio: vec![0; 256],
            peak_jitter: vec![0; 256],
        }
    }

    pub fn record(&mut self, descriptor: &Descriptor) {
        self.range_db[descriptor.range_db as usize] += 1;
        self.cycles[descriptor.cycles as usize] += 1;
        self.low_third[descriptor.low_third as usize] += 1;
        self.mid_third[descriptor.mid_third as usize] += 1;
        self.high_third[descriptor.high_third as usize] += 1;

        // Attack and jitter carry defaults below their cycle minimums;
        // only measured values belong in the distributions.
        if descriptor.cycles >= 4 {
            self.attack_ratio[descriptor.attack_ratio as usize] += 1;
        }
        if descriptor.cycles >= 6 {
            self.peak_jitter[descriptor.peak_jitter as usize] += 1;
        }
    }

    /// Prints every field summary to stderr.
    pub fn display(&self) {
        display_histogram("peak_to_trough", &self.range_db);
        display_histogram("cycles", &self.cycles);
        display_histogram("lower third", &self.low_third);
        display_histogram("middle third", &self.mid_third);
        display_histogram("upper third", &self.high_third);
        display_histogram("attack ratio", &self.attack_ratio);
        display_histogram("peak jitter", &self.peak_jitter);
    }
}

impl Default for AnalysisStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes min/max/mean/median/mode; `None` for an empty histogram.
pub fn summarize(histogram: &[u32]) -> Option<Summary> {
    let mut min = usize::MAX;
    let mut max = 0;
    let mut hits = 0u64;
    let mut sum = 0u64;
    let mut max_hits = 0;
    let mut mode_low = 0;
    let mut mode_high = 0;

    for (value, &count) in histogram.iter().enumerate() {
        if count == 0 {
            continue;
        }
        if count > max_hits {
            max_hits = count;
            mode_low = value;
            mode_high = value;
        } else if count == max_hits {
            mode_high = value;
        }
        if value < min {
            min = value;
        }
        if value > max {
            max = value;
        }
        sum += count as u64 * value as u64;
        hits += count as u64;
    }

    if hits == 0 {
        return None;
    }

    let mut median = 0.0;
    let mut below = 0u64;
    for (value, &count) in histogram.iter().enumerate() {
        if count == 0 {
            continue;
        }
        if below + count as u64 > hits / 2 {
            median = value as f64 - 0.5 + (hits as f64 / 2.0 - below as f64) / count as f64;
            break;
        }
        below += count as u64;
    }

    Some(Summary {
        min,
        max,
        mean: sum as f64 / hits as f64,
        median,
        mode: (mode_low + mode_high) as f64 / 2.0,
    })
}

/// Narrowest central span holding at least `percent` of the population,
/// trimmed symmetrically from whichever tail is lighter. Returns
/// `(low, high, hits_in_span)`.
pub fn central_span(histogram: &[u32], percent: u32) -> Option<(usize, usize, u64)> {
    let mut low = 0;
    let mut high = 0;
    let mut total = 0u64;

    for (value, &count) in histogram.iter().enumerate() {
        if count == 0 {
            continue;
        }
        if total == 0 {
            low = value;
        }
        total += count as u64;
        high = value;
    }

    if total == 0 {
        return None;
    }

    let target = (total as f64 * percent as f64 / 100.0 + 0.5).floor() as u64;
    let mut remaining = total;
    let mut toggle = false;

    while remaining > target {
        let take_low = histogram[low] < histogram[high]
            || (histogram[low] == histogram[high] && {
                toggle = !toggle;
                toggle
            });

        if take_low {
            if remaining - histogram[low] as u64 / 2 > target {
                remaining -= histogram[low] as u64;
                low += 1;
            } else {
                break;
            }
        } else if remaining - histogram[high] as u64 / 2 > target {
            remaining -= histogram[high] as u64;
            high -= 1;
        } else {
            break;
        }
    }

    debug_assert_eq!(
        remaining,
        histogram[low..=high].iter().map(|&c| c as u64).sum::<u64>()
    );

    Some((low, high, remaining))
}

fn display_histogram(name: &str, histogram: &[u32]) {
    let Some(summary) = summarize(histogram) else {
        return;
    };

    eprintln!(
        "{}: range = {} to {}, mean = {}, median = {}, mode = {}",
        name, summary.min, summary.max, summary.mean, summary.median, summary.mode
    );

    let total: u64 = histogram.iter().map(|&c| c as u64).sum();
    for percent in [50, 75, 90, 95, 98] {
        if let Some((low, high, hits)) = central_span(histogram, percent) {
            eprintln!(
                "    {} ({:.1}%): {} to {}",
                hits,
                hits as f64 * 100.0 / total as f64,
                low,
                high
            );
        }
    }
}
