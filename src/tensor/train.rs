//! Offline tensor construction.
//!
//! Two labeled descriptor captures are tallied into 4-D histograms, merged
//! into a signed score table, dilated into empty neighborhoods, and the
//! collapsed plane replicated across any unused axes. Progress and
//! diagnostic accounting go to stderr throughout, as this runs attended.

use crate::analysis::descriptor::Descriptor;
use crate::tensor::table::{Tensor, BINS, CELLS};

/// Axis bounds after collapsing unused trailing dimensions to one bin.
pub fn collapsed_bins(dimensions: usize) -> [usize; 4] {
    let mut bins = BINS;
    if dimensions < 2 {
        bins[1] = 1;
    }
    if dimensions < 3 {
        bins[2] = 1;
    }
    if dimensions < 4 {
        bins[3] = 1;
    }
    bins
}

fn clamp_index(mut index: [usize; 4], bins: [usize; 4]) -> [usize; 4] {
    for axis in 0..4 {
        if index[axis] >= bins[axis] {
            index[axis] = bins[axis] - 1;
        }
    }
    index
}

/// Histogram of descriptor cells for one labeled capture.
pub struct Distribution {
    counts: Vec<u32>,
    window_count: u64,
}

impl Distribution {
    /// Tallies one capture. In alternating mode only odd-numbered windows
    /// are tallied (at double weight), reserving the even half for the
    /// post-build self-test.
    pub fn tally(records: &[Descriptor], bins: [usize; 4], alternate: bool) -> Self {
        let mut counts = vec![0u32; CELLS];
        let weight = if alternate { 2 } else { 1 };

        for (n, record) in records.iter().enumerate() {
            if alternate && n & 1 == 0 {
                continue;
            }
            let index = clamp_index(record.tensor_index(), bins);
            counts[Tensor::flat(index)] += weight;
        }

        Self {
            counts,
            window_count: records.len() as u64,
        }
    }

    pub fn count(&self, index: [usize; 4]) -> u32 {
        self.counts[Tensor::flat(index)]
    }

    pub fn window_count(&self) -> u64 {
        self.window_count
    }
}

/// Per-capture accounting from the scoring pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScoreStats {
    pub unique_hits: [u64; 2],
    pub unique_slots: [u64; 2],
    pub common_slots: u64,
    pub common_hits: [u64; 2],
    pub guess_hits: [u64; 2],
    pub guess_misses: [u64; 2],
}

impl ScoreStats {
    /// Prints the reference accounting block for one capture.
    pub fn display(&self, label: usize, window_count: u64) {
        let pct = |hits: u64| hits as f64 * 100.0 / window_count as f64;

        eprintln!("file{}: {} windows", label + 1, window_count);
        eprintln!(
            "       {} unique hits in {} slots, {:.1}%",
            self.unique_hits[label],
            self.unique_slots[label],
            pct(self.unique_hits[label])
        );
        eprintln!(
            "       {} common hits in {} slots",
            self.common_hits[label], self.common_slots
        );
        eprintln!(
            "       {} guess hits in {} slots, {:.1}%",
            self.guess_hits[label],
            self.common_slots,
            pct(self.guess_hits[label])
        );
        eprintln!(
            "       {} guess misses in {} slots, {:.1}%",
            self.guess_misses[label],
            self.common_slots,
            pct(self.guess_misses[label])
        );
        eprintln!(
            "       {} unique hits and {} guess hits = {:.1}%\n",
            self.unique_hits[label],
            self.guess_hits[label],
            pct(self.unique_hits[label] + self.guess_hits[label])
        );
    }
}

/// Merges two distributions into a signed score table.
///
/// Cells hit by only one capture score ±99; contested cells score by the
/// normalized weight difference; untouched cells stay 0 (unknown).
pub fn score(dist_a: &Distribution, dist_b: &Distribution, bins: [usize; 4]) -> (Tensor, ScoreStats) {
    let mut tensor = Tensor::zeroed();
    let mut stats = ScoreStats::default();

    for h in 0..bins[0] {
        for i in 0..bins[1] {
            for j in 0..bins[2] {
                for k in 0..bins[3] {
                    let index = [h, i, j, k];
                    let a = dist_a.count(index);
                    let b = dist_b.count(index);

                    if a > 0 && b == 0 {
                        tensor.set(index, 99);
                        stats.unique_hits[0] += a as u64;
                        stats.unique_slots[0] += 1;
                    } else if a == 0 && b > 0 {
                        tensor.set(index, -99);
                        stats.unique_hits[1] += b as u64;
                        stats.unique_slots[1] += 1;
                    } else if a > 0 && b > 0 {
                        let mut weight_a = a as f64 / dist_a.window_count() as f64;
                        let mut weight_b = b as f64 / dist_b.window_count() as f64;

                        if weight_a > weight_b {
                            weight_b /= weight_a;
                            weight_a = 1.0;
                        } else {
                            weight_a /= weight_b;
                            weight_b = 1.0;
                        }

                        if weight_a > weight_b {
                            stats.guess_misses[1] += b as u64;
                            stats.guess_hits[0] += a as u64;
                        } else {
                            stats.guess_misses[0] += a as u64;
                            stats.guess_hits[1] += b as u64;
                        }

                        stats.common_hits[0] += a as u64;
                        stats.common_hits[1] += b as u64;
                        stats.common_slots += 1;
                        tensor.set(index, (weight_a * 99.0 + weight_b * -99.0 + 0.5).floor() as i8);
                    }
                }
            }
        }
    }

    (tensor, stats)
}

/// Grows scored cells into empty neighborhoods.
///
/// Each pass writes the rounded mean of every empty cell's nonzero
/// 3×3×3×3 neighbors into a shadow table, so a pass never reads its own
/// output. Passes repeat until one changes nothing or no empty cell has a
/// nonzero neighbor; both conditions guarantee termination.
pub fn dilate(tensor: &mut Tensor, bins: [usize; 4]) {
    loop {
        let mut shadow = tensor.clone();
        let mut total_slots = 0u64;
        let mut used_slots = 0u64;
        let mut border_slots = 0u64;
        let mut total_border_hits = 0u64;

        for h in 0..bins[0] {
            for i in 0..bins[1] {
                for j in 0..bins[2] {
                    for k in 0..bins[3] {
                        total_slots += 1;

                        if tensor.get([h, i, j, k]) != 0 {
                            used_slots += 1;
                            continue;
                        }

                        let mut border_hits = 0i64;
                        let mut values_sum = 0i64;

                        for dh in neighborhood(h, bins[0]) {
                            for di in neighborhood(i, bins[1]) {
                                for dj in neighborhood(j, bins[2]) {
                                    for dk in neighborhood(k, bins[3]) {
                                        let value = tensor.get([dh, di, dj, dk]);
                                        if value != 0 {
                                            values_sum += value as i64;
                                            border_hits += 1;
                                        }
                                    }
                                }
                            }
                        }

                        if border_hits > 0 {
                            if border_slots == 0 {
                                eprintln!(
                                    "first slot filled is tensor [{}] [{}] [{}] [{}], sum = {}, hits = {}",
                                    h, i, j, k, values_sum, border_hits
                                );
                            }

                            let mean = (values_sum as f64 / border_hits as f64 + 0.5).floor();
                            shadow.set([h, i, j, k], mean as i8);
                            total_border_hits += border_hits as u64;
                            border_slots += 1;
                        }
                    }
                }
            }
        }

        eprintln!(
            "{} / {} slots used, {:.1}%",
            used_slots,
            total_slots,
            used_slots as f64 * 100.0 / total_slots as f64
        );

        if border_slots == 0 {
            eprintln!("no border slots found!\n");
            return;
        }

        eprintln!(
            "{} border slots found, average hits = {:.1}",
            border_slots,
            total_border_hits as f64 / border_slots as f64
        );
        eprintln!(
            "{} / {} used + border slots, {:.1}%",
            used_slots + border_slots,
            total_slots,
            (used_slots + border_slots) as f64 * 100.0 / total_slots as f64
        );

        if shadow == *tensor {
            eprintln!("nothing changed!\n");
            return;
        }

        *tensor = shadow;
        eprintln!("updated tensor\n");
    }
}

fn neighborhood(center: usize, bound: usize) -> impl Iterator<Item = usize> {
    let low = center.saturating_sub(1);
    let high = (center + 1).min(bound - 1);
    low..=high
}

/// Copies the collapsed plane across every unused axis so the runtime
/// table always has the full shape: each source index is the destination
/// index where it lies below the collapsed bound, and 0 where it does not.
pub fn replicate_collapsed_axes(tensor: &mut Tensor, bins: [usize; 4]) {
    if bins == BINS {
        return;
    }

    let source = tensor.clone();
    let fold = |index: usize, bound: usize| if index < bound { index } else { 0 };

    for h in 0..BINS[0] {
        for i in 0..BINS[1] {
            for j in 0..BINS[2] {
                for k in 0..BINS[3] {
                    tensor.set(
                        [h, i, j, k],
                        source.get([
                            fold(h, bins[0]),
                            fold(i, bins[1]),
                            fold(j, bins[2]),
                            fold(k, bins[3]),
                        ]),
                    );
                }
            }
        }
    }
}

/// Result of re-scanning one capture against the finished tensor.
#[derive(Debug, Clone, Copy)]
pub struct SelfTest {
    pub windows: u64,
    pub hits_a: u64,
    pub hits_b: u64,
}

/// Scores a capture's descriptors against the finished tensor. In
/// alternating mode only even-numbered windows count (at double weight),
/// the half withheld from the build.
pub fn self_test(tensor: &Tensor, records: &[Descriptor], alternate: bool) -> SelfTest {
    let weight = if alternate { 2 } else { 1 };
    let mut hits_a = 0u64;
    let mut hits_b = 0u64;

    for (n, record) in records.iter().enumerate() {
        if alternate && n & 1 == 1 {
            continue;
        }
        let value = tensor.lookup(record);
        if value > 0 {
            hits_a += weight;
        } else if value < 0 {
            hits_b += weight;
        }
    }

    SelfTest {
        windows: records.len() as u64,
        hits_a,
        hits_b,
    }
}

impl SelfTest {
    pub fn display(&self) {
        let pct = |hits: u64| hits as f64 * 100.0 / self.windows as f64;
        let unknown = self.windows - self.hits_a - self.hits_b;

        eprintln!(
            "read {} windows, file1 hits = {} ({:.1}%), file2 hits = {} ({:.1}%), ??? = {} ({:.1}%)",
            self.windows,
            self.hits_a,
            pct(self.hits_a),
            self.hits_b,
            pct(self.hits_b),
            unknown,
            pct(unknown)
        );
    }
}

/// Dumps a range × cycles slice at the midpoint of the other axes.
pub fn display_2d(tensor: &Tensor, bins: [usize; 4]) {
    let mut header = String::new();
    for i in 0..bins[1] {
        header.push_str(&format!(" {:3}", i));
    }
    eprintln!("cycles: {}", header);
    eprintln!("-------  {}", "----".repeat(bins[1]));

    for h in 0..bins[0] {
        let mut row = String::new();
        for i in 0..bins[1] {
            row.push_str(&format!(
                " {:3}",
                tensor.get([h, i, bins[2] / 2, bins[3] / 2])
            ));
        }
        eprintln!("{:2} dB:  {}", h, row);
    }

    eprintln!();
}
