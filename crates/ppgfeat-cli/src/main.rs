use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ppgfeat_lib::{
    config::{read_config, AugmentConfig, PhysioGate, PipelineConfig},
    dataset::Dataset,
    features::FeatureExtractor,
    filter::Conditioner,
    io::recording::{parse_f64_series, read_f64_series},
    quality::QualityGate,
    source::{DirectorySource, Limited, RecordingSource},
    Assembler,
};
use serde::Serialize;
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "ppgfeat",
    version,
    about = "Windowed PPG/accelerometer feature datasets"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn a root/<subject>/<recording> tree into a labeled Parquet archive
    Build(BuildArgs),
    /// Feature vector for one window of newline-delimited samples (stdin or --input)
    Features {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = 25.0)]
        fs: f64,
        #[arg(long, default_value_t = 0.4)]
        peak_distance_s: f64,
        /// Detrend and band-pass the samples first
        #[arg(long)]
        condition: bool,
    },
    /// Signal quality index of a conditioned signal (stdin or --input)
    Sqi {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = 25.0)]
        fs: f64,
        #[arg(long, default_value_t = 0.5)]
        low_hz: f64,
        #[arg(long, default_value_t = 5.0)]
        high_hz: f64,
        #[arg(long, default_value_t = 3)]
        order: usize,
        #[arg(long, default_value_t = -5.0, allow_hyphen_values = true)]
        threshold_db: f64,
    },
    /// Row count, schema and class balance of an archive
    Inspect {
        #[arg(long)]
        archive: PathBuf,
    },
}

#[derive(Args)]
struct BuildArgs {
    #[arg(long)]
    root: PathBuf,
    #[arg(long)]
    out: PathBuf,
    /// TOML pipeline configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Also write the feature table as CSV
    #[arg(long)]
    csv: Option<PathBuf>,
    #[arg(long)]
    fs: Option<f64>,
    #[arg(long)]
    channel: Option<String>,
    #[arg(long)]
    warmup_s: Option<f64>,
    #[arg(long)]
    window_s: Option<f64>,
    #[arg(long)]
    overlap: Option<f64>,
    #[arg(long)]
    jitter: Option<f64>,
    #[arg(long)]
    low_hz: Option<f64>,
    #[arg(long)]
    high_hz: Option<f64>,
    #[arg(long)]
    order: Option<usize>,
    #[arg(long, allow_hyphen_values = true)]
    sqi_threshold: Option<f64>,
    /// Keep every window regardless of signal quality
    #[arg(long)]
    no_quality: bool,
    /// Drop windows with implausible heart rate or intervals
    #[arg(long)]
    physio: bool,
    /// Add seeded augmented copies of every accepted window
    #[arg(long)]
    augment: bool,
    /// Store the conditioned window samples in the archive
    #[arg(long)]
    keep_raw: bool,
    #[arg(long)]
    workers: Option<usize>,
    /// Only process the first N recordings
    #[arg(long)]
    limit: Option<usize>,
}

impl BuildArgs {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => read_config(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(fs) = self.fs {
            cfg.sample_rate_hz = fs;
        }
        if let Some(channel) = &self.channel {
            cfg.channel = channel.clone();
        }
        if let Some(warmup) = self.warmup_s {
            cfg.warmup_s = warmup;
        }
        if let Some(seconds) = self.window_s {
            cfg.window.seconds = seconds;
        }
        if let Some(overlap) = self.overlap {
            cfg.window.overlap = overlap;
        }
        if let Some(jitter) = self.jitter {
            cfg.window.jitter_fraction = jitter;
        }
        if let Some(low) = self.low_hz {
            cfg.filter.low_hz = low;
        }
        if let Some(high) = self.high_hz {
            cfg.filter.high_hz = high;
        }
        if let Some(order) = self.order {
            cfg.filter.order = order;
        }
        if let Some(threshold) = self.sqi_threshold {
            cfg.quality.threshold_db = threshold;
        }
        if self.no_quality {
            cfg.quality.enabled = false;
        }
        if self.physio && cfg.physio.is_none() {
            cfg.physio = Some(PhysioGate::default());
        }
        if self.augment && cfg.augment.is_none() {
            cfg.augment = Some(AugmentConfig::default());
        }
        if self.keep_raw {
            cfg.keep_raw = true;
        }
        if let Some(workers) = self.workers {
            cfg.workers = Some(workers);
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Serialize)]
struct BuildSummary<'a> {
    archive: &'a Path,
    #[serde(flatten)]
    report: ppgfeat_lib::AssemblyReport,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Build(args) => cmd_build(&args)?,
        Commands::Features {
            input,
            fs,
            peak_distance_s,
            condition,
        } => cmd_features(input.as_deref(), fs, peak_distance_s, condition)?,
        Commands::Sqi {
            input,
            fs,
            low_hz,
            high_hz,
            order,
            threshold_db,
        } => cmd_sqi(input.as_deref(), fs, low_hz, high_hz, order, threshold_db)?,
        Commands::Inspect { archive } => cmd_inspect(&archive)?,
    }
    Ok(())
}

fn read_samples(input: Option<&Path>) -> Result<Vec<f64>> {
    match input {
        Some(path) => read_f64_series(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            parse_f64_series(&buf)
        }
    }
}

fn cmd_build(args: &BuildArgs) -> Result<()> {
    let cfg = args.pipeline_config()?;
    let assembler = Assembler::new(&cfg)?;
    let directory = DirectorySource::new(&args.root, cfg.channel.clone(), cfg.sample_rate_hz);
    let source: Box<dyn RecordingSource> = match args.limit {
        Some(limit) => Box::new(Limited::new(directory, limit)),
        None => Box::new(directory),
    };
    let (dataset, report) = assembler
        .assemble(source.as_ref())
        .with_context(|| format!("building dataset from {}", args.root.display()))?;
    dataset
        .write_parquet(&args.out)
        .with_context(|| format!("writing {}", args.out.display()))?;
    if let Some(csv_path) = &args.csv {
        dataset
            .write_csv(csv_path)
            .with_context(|| format!("writing {}", csv_path.display()))?;
    }
    let summary = BuildSummary {
        archive: &args.out,
        report,
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_features(input: Option<&Path>, fs: f64, peak_distance_s: f64, condition: bool) -> Result<()> {
    let mut cfg = PipelineConfig {
        sample_rate_hz: fs,
        ..PipelineConfig::default()
    };
    cfg.peaks.min_distance_s = peak_distance_s;
    let samples = read_samples(input)?;
    let window = if condition {
        Conditioner::from_config(&cfg)?.condition(&samples)?
    } else {
        samples
    };
    let features = FeatureExtractor::from_config(&cfg).extract(&window);
    println!("{}", serde_json::to_string(&features)?);
    Ok(())
}

fn cmd_sqi(
    input: Option<&Path>,
    fs: f64,
    low_hz: f64,
    high_hz: f64,
    order: usize,
    threshold_db: f64,
) -> Result<()> {
    let mut cfg = PipelineConfig {
        sample_rate_hz: fs,
        ..PipelineConfig::default()
    };
    cfg.filter.low_hz = low_hz;
    cfg.filter.high_hz = high_hz;
    cfg.filter.order = order;
    cfg.quality.threshold_db = threshold_db;
    cfg.validate()?;
    let samples = read_samples(input)?;
    let conditioned = Conditioner::from_config(&cfg)?.condition(&samples)?;
    let result = QualityGate::from_config(&cfg)?.evaluate(&conditioned)?;
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

fn cmd_inspect(archive: &Path) -> Result<()> {
    let dataset = Dataset::read_parquet(archive)
        .with_context(|| format!("reading {}", archive.display()))?;
    println!("{}", serde_json::to_string(&dataset.summary())?);
    Ok(())
}
