use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use ola_stream_core::{
    EngineConfig, Identity, OutputMode, OverlapEngine, OverlapError, SpectralFilter, Transform,
    Work,
};
use tracing_subscriber::EnvFilter;

fn main() -> ola_stream_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            input,
            output,
            config,
            chunk,
            cutoff,
        } => run_process(&input, &output, config.as_deref(), chunk, cutoff),
        Commands::Inspect { config } => run_inspect(config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> ola_stream_core::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_path(path),
        None => Ok(EngineConfig::default()),
    }
}

/// Transform chosen on the command line.
enum Filter {
    Identity(Identity),
    LowPass(SpectralFilter),
}

impl Transform for Filter {
    fn transform(&mut self, window: &mut [Work]) {
        match self {
            Filter::Identity(inner) => inner.transform(window),
            Filter::LowPass(inner) => inner.transform(window),
        }
    }
}

fn run_process(
    input: &Path,
    output: &Path,
    config: Option<&Path>,
    chunk: usize,
    cutoff: Option<f64>,
) -> ola_stream_core::Result<()> {
    let config = load_config(config)?;
    if config.output != OutputMode::Streaming {
        return Err(OverlapError::msg("process needs a streaming output mode"));
    }
    if chunk == 0 {
        return Err(OverlapError::msg("--chunk must be at least 1"));
    }

    let filter = match cutoff {
        Some(cutoff) => Filter::LowPass(SpectralFilter::low_pass(cutoff)),
        None => Filter::Identity(Identity),
    };
    let mut engine = OverlapEngine::<i16, _>::new(&config, filter)?;
    tracing::info!(?input, ?output, chunk, ?cutoff, "processing raw pcm");

    let bytes = std::fs::read(input)?;
    if bytes.len() % 2 != 0 {
        tracing::warn!("input has an odd byte count, ignoring the last byte");
    }
    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    let processed = stream_aligned(&mut engine, &samples, chunk)?;

    let encoded: Vec<u8> = processed
        .iter()
        .flat_map(|sample| sample.to_le_bytes())
        .collect();
    std::fs::write(output, encoded)?;

    tracing::info!(
        samples = samples.len(),
        written = processed.len(),
        passes = engine.passes(),
        "done"
    );
    Ok(())
}

/// Runs a whole recording through the engine and returns output of the same
/// length, sample for sample aligned with `samples`.
fn stream_aligned<T: Transform>(
    engine: &mut OverlapEngine<i16, T>,
    samples: &[i16],
    chunk: usize,
) -> ola_stream_core::Result<Vec<i16>> {
    let geometry = *engine.geometry();
    let mut processed = Vec::with_capacity(samples.len());
    // Output sample `t` comes from input sample `t + lookbehind * block_size`;
    // leading silence of that length lines the two up again.
    let lead = vec![0i16; geometry.lookbehind * geometry.block_size];
    feed(engine, &lead, chunk, &mut processed)?;
    feed(engine, samples, chunk, &mut processed)?;
    // Trailing silence pushes the last real samples through a full window.
    let tail = vec![0i16; geometry.window_len + geometry.block_size];
    feed(engine, &tail, chunk, &mut processed)?;
    processed.truncate(samples.len());
    Ok(processed)
}

/// Pushes all of `data` through the engine, draining finished output as it
/// goes so the queues never stay full.
fn feed<T: Transform>(
    engine: &mut OverlapEngine<i16, T>,
    data: &[i16],
    chunk: usize,
    out: &mut Vec<i16>,
) -> ola_stream_core::Result<()> {
    let mut buf = vec![0i16; chunk.max(engine.geometry().block_size)];
    let mut sent = 0;
    while sent < data.len() {
        let end = (sent + chunk).min(data.len());
        let accepted = engine.put(&data[sent..end])?;
        sent += accepted;

        let mut drained = 0;
        loop {
            let n = engine.get(&mut buf)?;
            out.extend_from_slice(&buf[..n]);
            drained += n;
            if n < buf.len() {
                break;
            }
        }
        if accepted == 0 && drained == 0 {
            return Err(OverlapError::msg("engine stalled with input pending"));
        }
    }
    Ok(())
}

fn run_inspect(config: Option<&Path>) -> ola_stream_core::Result<()> {
    let config = load_config(config)?;
    let geometry = config.validate()?;
    tracing::info!(layout = ?config.layout, output = ?config.output, "derived geometry");
    println!("{}", serde_json::to_string_pretty(&geometry)?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Streaming overlap-add block processor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream raw little-endian 16-bit PCM through the overlap engine.
    Process {
        /// Raw PCM file to read.
        input: PathBuf,
        /// Raw PCM file to write.
        output: PathBuf,
        /// JSON engine configuration; defaults are used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Samples handed to the engine per call.
        #[arg(long, default_value_t = 512)]
        chunk: usize,
        /// Apply a low-pass filter at this fraction of Nyquist.
        #[arg(long)]
        cutoff: Option<f64>,
    },
    /// Print the window geometry derived from a configuration.
    Inspect {
        /// JSON engine configuration; defaults are used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
