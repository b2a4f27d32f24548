//! Trainer-to-runtime round trip: build a tensor from labeled descriptor
//! sets, persist it, reload it, and score the training classes.

use tonesift::analysis::descriptor::Descriptor;
use tonesift::tensor::codec;
use tonesift::tensor::train::{self, Distribution};
use tonesift::tensor::{Tensor, BINS};

fn record(range_db: u8, cycles: u8) -> Descriptor {
    Descriptor {
        range_db,
        cycles,
        low_third: 128,
        mid_third: 128,
        high_third: 128,
        attack_ratio: 128,
        peak_jitter: 255,
        spare: 0,
    }
}

/// Two synthetic classes, disjoint in envelope range.
fn captures() -> (Vec<Descriptor>, Vec<Descriptor>) {
    let music: Vec<Descriptor> = (0..60)
        .map(|n| record((n % 6) as u8, (n % 10) as u8 * 2))
        .collect();
    let talk: Vec<Descriptor> = (0..60)
        .map(|n| record(25 + (n % 10) as u8, (n % 4) as u8 * 2))
        .collect();
    (music, talk)
}

fn build(dimensions: usize, alternate: bool) -> Tensor {
    let (music, talk) = captures();
    let bins = train::collapsed_bins(dimensions);
    let dist_music = Distribution::tally(&music, bins, alternate);
    let dist_talk = Distribution::tally(&talk, bins, alternate);

    let (mut tensor, _) = train::score(&dist_music, &dist_talk, bins);
    train::dilate(&mut tensor, bins);
    train::replicate_collapsed_axes(&mut tensor, bins);
    tensor
}

#[test]
fn test_trained_tensor_survives_persistence_and_separates_classes() {
    let tensor = build(2, false);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trained.tensor");
    codec::write_tensor_file(&tensor, &path).unwrap();
    let restored = codec::read_tensor_file(&path).unwrap();
    assert_eq!(restored, tensor);

    let (music, talk) = captures();
    for record in &music {
        assert!(restored.lookup(record) > 0, "music record scored {:?}", record);
    }
    for record in &talk {
        assert!(restored.lookup(record) < 0, "talk record scored {:?}", record);
    }
}

#[test]
fn test_every_trained_cell_is_within_score_bounds() {
    let tensor = build(2, false);
    let bytes = tensor.to_bytes();
    for &byte in &bytes {
        let value = byte as i8;
        assert!((-99..=99).contains(&value), "cell value {}", value);
    }
}

#[test]
fn test_dilation_spreads_both_fronts_across_the_collapsed_axis() {
    let tensor = build(1, false);
    // The labeled regions sit at range 0-5 and 25-34. Their ±99 fronts
    // grow one bin per pass and meet at bin 15, whose neighbors average
    // to zero, so that single bin stays unknown.
    for h in 0..BINS[0] {
        let value = tensor.get([h, 0, 0, 0]);
        match h {
            15 => assert_eq!(value, 0, "meeting bin should stay unknown"),
            0..=14 => assert!(value > 0, "h = {} scored {}", h, value),
            _ => assert!(value < 0, "h = {} scored {}", h, value),
        }
    }
}

#[test]
fn test_replicated_axes_agree_with_the_collapsed_plane() {
    let tensor = build(2, false);
    for h in (0..BINS[0]).step_by(7) {
        for i in (0..BINS[1]).step_by(5) {
            let base = tensor.get([h, i, 0, 0]);
            for j in (0..BINS[2]).step_by(3) {
                for k in (0..BINS[3]).step_by(3) {
                    assert_eq!(tensor.get([h, i, j, k]), base);
                }
            }
        }
    }
}

#[test]
fn test_alternating_build_still_separates_held_out_windows() {
    let tensor = build(2, true);
    let (music, talk) = captures();

    let music_result = train::self_test(&tensor, &music, true);
    let talk_result = train::self_test(&tensor, &talk, true);

    // Each class's held-out (even) windows score on their own side
    assert_eq!(music_result.hits_a, music.len() as u64);
    assert_eq!(music_result.hits_b, 0);
    assert_eq!(talk_result.hits_b, talk.len() as u64);
    assert_eq!(talk_result.hits_a, 0);
}
