use anyhow::Context;
use clap::Parser;
use std::fs::File;
use std::path::{Path, PathBuf};
use tonesift::analysis::descriptor::{self, Descriptor};
use tonesift::tensor::codec;
use tonesift::tensor::train::{self, Distribution};

#[derive(Parser, Debug)]
#[command(
    name = "tonesift-train",
    version,
    about = "Combine two raw descriptor captures (from tonesift -a) into a \
             compressed discrimination tensor, using 1 to 4 dimensions"
)]
struct Cli {
    /// Descriptor capture of the class scored positive (music)
    music: PathBuf,

    /// Descriptor capture of the class scored negative (talk)
    talk: PathBuf,

    /// Tensor file to write; omit for a dry run
    output: Option<PathBuf>,

    /// Alternate windows between the build and test halves
    #[arg(short = 'a')]
    alternate: bool,

    /// Dimension count
    #[arg(short = 'd', value_name = "N", default_value_t = 4,
          value_parser = clap::value_parser!(u8).range(1..=4))]
    dimensions: u8,
}

fn read_capture(path: &Path) -> anyhow::Result<Vec<Descriptor>> {
    let mut file = File::open(path)
        .with_context(|| format!("can't open \"{}\" for reading", path.display()))?;
    let records = descriptor::read_all(&mut file)?;
    eprintln!("read {} windows", records.len());
    Ok(records)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let bins = train::collapsed_bins(cli.dimensions as usize);

    let music = read_capture(&cli.music)?;
    let talk = read_capture(&cli.talk)?;

    let dist_music = Distribution::tally(&music, bins, cli.alternate);
    let dist_talk = Distribution::tally(&talk, bins, cli.alternate);

    let (mut tensor, stats) = train::score(&dist_music, &dist_talk, bins);
    stats.display(0, dist_music.window_count());
    stats.display(1, dist_talk.window_count());

    train::display_2d(&tensor, bins);
    train::dilate(&mut tensor, bins);
    train::replicate_collapsed_axes(&mut tensor, bins);
    train::display_2d(&tensor, bins);

    if let Some(path) = &cli.output {
        codec::write_tensor_file(&tensor, path)
            .with_context(|| format!("can't write tensor \"{}\"", path.display()))?;
    }

    // Re-scan both captures against the finished tensor; in alternating
    // mode this scores the half that was withheld from the build.
    for records in [&music, &talk] {
        train::self_test(&tensor, records, cli.alternate).display();
    }

    Ok(())
}
