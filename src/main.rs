//! CIFAR-10 CNN classifier CLI
//!
//! Prepares the corpus, trains the network and reports test accuracy.
//! Also exposes the individual data steps: download, class gallery and
//! split statistics.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use cifar_cnn::backend::backend_name;
use cifar_cnn::dataset::{Cifar10Source, CifarData, SplitConfig};
use cifar_cnn::pipeline::{run_image_classification, ExperimentConfig, SyntheticCorpus};
use cifar_cnn::utils::gallery::render_class_samples;
use cifar_cnn::utils::logging::{init_logging, LogConfig, LogLevel};
use cifar_cnn::utils::format_number;

/// CIFAR-10 convolutional classifier experiment
#[derive(Parser, Debug)]
#[command(name = "cifar_cnn")]
#[command(version)]
#[command(about = "Train and evaluate a CNN on CIFAR-10 with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only report errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Explicit log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Prepare data, build, train and evaluate the model
    Run {
        /// Random seed for the split and batch order
        #[arg(long)]
        seed: Option<u64>,

        /// JSON experiment configuration; flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory holding the cached corpus
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Maximum number of training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Initial learning rate
        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Directory for run artifacts
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Fail instead of downloading when the corpus is not cached
        #[arg(long, default_value = "false")]
        no_download: bool,

        /// Skip training curves and the class gallery
        #[arg(long, default_value = "false")]
        no_plots: bool,

        /// Use a generated corpus instead of CIFAR-10
        #[arg(long, default_value = "false")]
        synthetic: bool,
    },

    /// Download and cache the CIFAR-10 corpus
    Download {
        #[arg(short, long, default_value = "data/cifar10")]
        data_dir: PathBuf,
    },

    /// Render one validation image per class
    Samples {
        #[arg(long, default_value = "7")]
        seed: u64,

        #[arg(short, long, default_value = "data/cifar10")]
        data_dir: PathBuf,

        /// Output PNG path
        #[arg(short, long, default_value = "output/samples.png")]
        output: PathBuf,
    },

    /// Show partition sizes and class balance
    Stats {
        #[arg(long, default_value = "7")]
        seed: u64,

        #[arg(short, long, default_value = "data/cifar10")]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.quiet {
        LogConfig::quiet()
    } else if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    if let Some(level) = &cli.log_level {
        log_config.level = LogLevel::parse(level);
    }

    let _ = init_logging(&log_config);
    tracing::debug!("Logging at level {}", log_config.level);

    print_banner();

    match cli.command {
        Commands::Run {
            seed,
            config,
            data_dir,
            epochs,
            batch_size,
            learning_rate,
            output_dir,
            no_download,
            no_plots,
            synthetic,
        } => {
            let mut experiment = match config {
                Some(path) => ExperimentConfig::load(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => ExperimentConfig::default(),
            };

            if let Some(seed) = seed {
                experiment.seed = seed;
            }
            if let Some(dir) = data_dir {
                experiment.data_dir = dir;
            }
            if let Some(epochs) = epochs {
                experiment.fit.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                experiment.fit.batch_size = batch_size;
            }
            if let Some(lr) = learning_rate {
                experiment.optimizer.learning_rate = lr;
            }
            if let Some(dir) = output_dir {
                experiment.output_dir = dir;
            }
            if no_download {
                experiment.download = false;
            }
            if no_plots {
                experiment.plots = false;
            }
            if synthetic && experiment.synthetic.is_none() {
                experiment.synthetic = Some(SyntheticCorpus::default());
            }

            cmd_run(&experiment)?;
        }

        Commands::Download { data_dir } => {
            cmd_download(&data_dir)?;
        }

        Commands::Samples {
            seed,
            data_dir,
            output,
        } => {
            cmd_samples(seed, &data_dir, &output)?;
        }

        Commands::Stats { seed, data_dir } => {
            cmd_stats(seed, &data_dir)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 =====================================================
   CIFAR-10 CNN Classifier
   Convolutional image classification with Burn + Rust
 =====================================================
  "#
        .green()
    );
}

fn cmd_run(experiment: &ExperimentConfig) -> Result<()> {
    println!("{}", "Experiment Configuration:".cyan().bold());
    println!("  Seed:          {}", experiment.seed);
    println!("  Corpus:        {}", match experiment.synthetic {
        Some(_) => "synthetic".to_string(),
        None => experiment.data_dir.display().to_string(),
    });
    println!("  Epochs:        {}", experiment.fit.epochs);
    println!("  Batch size:    {}", experiment.fit.batch_size);
    println!("  Learning rate: {}", experiment.optimizer.learning_rate);
    println!(
        "  Split:         {:.0}% / {:.0}% / {:.0}%",
        experiment.split.train_fraction * 100.0,
        experiment.split.validation_fraction * 100.0,
        experiment.split.test_fraction() * 100.0
    );
    println!("  Backend:       {}", backend_name());
    println!();

    let source = experiment.source();
    let report = run_image_classification(experiment, source.as_ref())?;

    println!();
    println!("{}", report.evaluation.metrics);
    println!("{}", report.evaluation.metrics.confusion_matrix);
    if let Some(best) = report.history.best_by_val_loss() {
        println!(
            "  Best validation loss {:.4} at epoch {}",
            best.val_loss.unwrap_or(f64::NAN),
            best.epoch
        );
    }
    if let Some(epoch) = report.history.restored_epoch {
        println!("  Parameters restored from epoch {}", epoch);
    }
    println!("  Artifacts: {}", report.run_dir.display());

    Ok(())
}

fn cmd_download(data_dir: &Path) -> Result<()> {
    info!("Caching CIFAR-10 in {}", data_dir.display());

    let source = Cifar10Source::new(data_dir);
    if source.is_cached() {
        println!("{} Corpus already cached in {}", "Note:".yellow(), data_dir.display());
        return Ok(());
    }

    source.ensure_cached().context("Download failed")?;
    println!("{} Corpus cached in {}", "Done:".green().bold(), data_dir.display());
    println!();
    println!("{}", "Next:".cyan());
    println!("  cifar_cnn run --data-dir {}", data_dir.display());
    Ok(())
}

fn load_data(seed: u64, data_dir: &Path) -> Result<CifarData> {
    let source = Cifar10Source::new(data_dir);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    CifarData::load(&source, &SplitConfig::default(), &mut rng).context("Failed to prepare the corpus")
}

fn cmd_samples(seed: u64, data_dir: &Path, output: &Path) -> Result<()> {
    let data = load_data(seed, data_dir)?;
    let shape = data.metadata().input_shape;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let samples = data.sample_by_class(&mut rng);
    let missing = samples.iter().filter(|s| s.is_err()).count();

    render_class_samples(&samples, (shape.width as u32, shape.height as u32), 4, output)?;
    println!("{} Gallery written to {}", "Done:".green().bold(), output.display());
    if missing > 0 {
        println!("{} {} classes had no validation images", "Warning:".yellow(), missing);
    }
    Ok(())
}

fn cmd_stats(seed: u64, data_dir: &Path) -> Result<()> {
    let data = load_data(seed, data_dir)?;
    let stats = data.stats();

    println!(
        "{} {} images pooled from {}",
        "Corpus:".cyan().bold(),
        format_number(stats.total_images),
        data_dir.display()
    );
    println!();
    println!("{}", stats);
    Ok(())
}
