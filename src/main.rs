use anyhow::Context;
use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use tonesift::config::{ChannelTap, Config, SkipMode};
use tonesift::defaults;
use tonesift::error::SiftError;
use tonesift::pipeline::Pipeline;
use tonesift::tensor::{codec, Tensor};

#[derive(Parser, Debug)]
#[command(
    name = "tonesift",
    version,
    about = "Scan raw PCM on stdin with tensor discrimination and filter the \
             stereo output on stdout, skipping either music or talk; or \
             capture raw descriptor analytics for the trainer",
    group(clap::ArgGroup::new("skip").args(["music", "talk", "none", "pass"]))
)]
struct Cli {
    /// Write the descriptor stream to this file for the trainer
    #[arg(short = 'a', value_name = "FILE")]
    analysis: Option<PathBuf>,

    /// Channel count of the raw input (1 or 2)
    #[arg(short = 'c', value_name = "N", default_value_t = defaults::CHANNELS)]
    channels: u32,

    /// Use an external tensor file
    #[arg(short = 'd', value_name = "FILE")]
    tensor: Option<PathBuf>,

    /// Insert keep-alive crossfades during long skips
    #[arg(short = 'k')]
    keepalive: bool,

    /// Left output override (1=mono, 2=filtered, 3=level, 4=tensor)
    #[arg(short = 'l', value_name = "N", default_value_t = 0)]
    left: u8,

    /// Skip over music, with optional threshold offset (-99 to 99)
    #[arg(
        short = 'm',
        value_name = "THRESHOLD",
        num_args = 0..=1,
        default_missing_value = "0",
        allow_negative_numbers = true
    )]
    music: Option<i32>,

    /// No audio output at all (skip everything)
    #[arg(short = 'n')]
    none: bool,

    /// Pass all audio through (default)
    #[arg(short = 'p')]
    pass: bool,

    /// No messaging except errors
    #[arg(short = 'q')]
    quiet: bool,

    /// Right output override (1=mono, 2=filtered, 3=level, 4=tensor)
    #[arg(short = 'r', value_name = "N", default_value_t = 0)]
    right: u8,

    /// Sample rate override in Hz (11025 - 96000)
    #[arg(short = 's', value_name = "RATE", default_value_t = defaults::SAMPLE_RATE)]
    sample_rate: u32,

    /// Skip over talk, with optional threshold offset (sign inverted)
    #[arg(
        short = 't',
        value_name = "THRESHOLD",
        num_args = 0..=1,
        default_missing_value = "0",
        allow_negative_numbers = true
    )]
    talk: Option<i32>,

    /// Verbose, with optional progress period in seconds
    #[arg(
        short = 'v',
        value_name = "SECS",
        num_args = 0..=1,
        default_missing_value = "300"
    )]
    verbose: Option<u32>,
}

impl Cli {
    fn to_config(&self) -> Result<Config, SiftError> {
        let (skip_mode, threshold) = if let Some(offset) = self.music {
            (SkipMode::Music, offset)
        } else if let Some(offset) = self.talk {
            (SkipMode::Talk, -offset)
        } else if self.none {
            (SkipMode::Everything, 0)
        } else if self.pass {
            (SkipMode::Nothing, 0)
        } else {
            // No mode flag given; pass-all is the default
            (SkipMode::Nothing, 0)
        };

        let tap = |index: u8, key: &str| {
            ChannelTap::from_index(index).ok_or_else(|| SiftError::ConfigInvalidValue {
                key: key.to_string(),
                message: "output spec must be 0 - 4".to_string(),
            })
        };

        let config = Config {
            channels: self.channels,
            sample_rate: self.sample_rate,
            skip_mode,
            threshold,
            keepalive: self.keepalive,
            quiet: self.quiet,
            // -v0 disables verbosity, as if the flag were absent
            verbose_period: self.verbose.filter(|&period| period > 0),
            left_tap: tap(self.left, "left output")?,
            right_tap: tap(self.right, "right output")?,
        };

        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.to_config()?;

    // The discriminator is validated before any PCM is read; a skip run
    // refuses to start without a trusted one.
    let tensor = match &cli.tensor {
        Some(path) => codec::read_tensor_file(path)
            .with_context(|| format!("can't load tensor \"{}\"", path.display()))?,
        None => match config.skip_mode {
            SkipMode::Music | SkipMode::Talk => return Err(SiftError::MissingTensor.into()),
            _ => Tensor::zeroed(),
        },
    };

    let analysis_sink: Option<Box<dyn Write>> = match &cli.analysis {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("can't open \"{}\" for writing", path.display()))?;
            Some(Box::new(BufWriter::new(file)))
        }
        None => None,
    };

    let stdout = io::stdout().lock();
    let mut pipeline = Pipeline::new(config.clone(), tensor, BufWriter::new(stdout), analysis_sink);

    let mut stdin = io::stdin().lock();
    let frame_bytes = config.channels as usize * 2;
    let mut bytes = vec![0u8; config.sample_rate as usize * frame_bytes];
    let mut samples = vec![0i16; config.sample_rate as usize * config.channels as usize];

    loop {
        let read = read_block(&mut stdin, &mut bytes)?;
        if read < frame_bytes {
            break;
        }

        // Drop any trailing partial frame
        let whole = read / frame_bytes * frame_bytes;
        for (sample, chunk) in samples.iter_mut().zip(bytes[..whole].chunks_exact(2)) {
            *sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        }
        pipeline.process_block(&samples[..whole / 2])?;

        if read < bytes.len() {
            break;
        }
    }

    let summary = pipeline.finish()?;
    summary.display(&config);

    Ok(())
}

/// Reads until the buffer is full or the stream ends.
fn read_block(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = reader.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}
