use std::{path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use vocal_remover_core::{
    core::{dsp::freq_bins_for_hop, postprocess::UninformativeParams},
    load_model, split_file, train, ContextGateNet, Device, Progress, SeparateOptions,
    TrainOptions,
};

#[derive(Parser)]
#[command(name = "vocal-remover")]
#[command(about = "Spectrogram-masking vocal/instrumental separation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors and hide progress bars
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a mixture into instrumental and vocal stems
    Separate(SeparateArgs),
    /// Fit a context-gate model on paired mixture/instrumental directories
    Train(TrainArgs),
}

#[derive(Args)]
struct SeparateArgs {
    #[arg(short, long)]
    input: PathBuf,

    /// GPU index; negative runs on the CPU
    #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
    gpu: i32,

    /// `.onnx` graph or `.npz` checkpoint
    #[arg(short, long, default_value = "models/baseline.npz")]
    model: PathBuf,

    #[arg(short = 'r', long = "sr", default_value_t = 44_100)]
    sample_rate: u32,

    #[arg(short = 'l', long, default_value_t = 1024)]
    hop_length: usize,

    #[arg(short, long, default_value_t = 512)]
    window_size: usize,

    /// Also write mask.png
    #[arg(short = 'M', long)]
    out_mask: bool,

    /// Suppress vocal leakage in quiet regions
    #[arg(short, long)]
    postprocess: bool,

    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Context frames an ONNX model consumes on each side of a window
    #[arg(long, default_value_t = 32)]
    offset: usize,

    /// Extra right padding an ONNX model needs
    #[arg(long, default_value_t = 0)]
    conv_offset: usize,
}

#[derive(Args)]
struct TrainArgs {
    #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
    gpu: i32,

    #[arg(short, long, default_value_t = 2019)]
    seed: u64,

    #[arg(short = 'r', long = "sr", default_value_t = 44_100)]
    sample_rate: u32,

    #[arg(short = 'l', long, default_value_t = 1024)]
    hop_length: usize,

    #[arg(short = 'm', long)]
    mixture_dataset: PathBuf,

    #[arg(short = 'i', long)]
    instrumental_dataset: PathBuf,

    #[arg(long, default_value_t = 0.1)]
    validation_rate: f32,

    #[arg(long, default_value_t = 0.001)]
    learning_rate: f32,

    #[arg(long, default_value_t = 0.0001)]
    lr_min: f32,

    #[arg(long, default_value_t = 0.9)]
    lr_decay: f32,

    #[arg(long, default_value_t = 6)]
    lr_decay_interval: usize,

    #[arg(short = 'B', long = "batchsize", default_value_t = 8)]
    batch_size: usize,

    #[arg(short = 'b', long = "val-batchsize", default_value_t = 16)]
    val_batch_size: usize,

    #[arg(short, long, default_value_t = 512)]
    cropsize: usize,

    #[arg(short, long, default_value_t = 16)]
    patches: usize,

    #[arg(long, default_value_t = 64)]
    val_patches: usize,

    #[arg(short = 'E', long = "epoch", default_value_t = 80)]
    epochs: usize,

    #[arg(short = 'e', long = "inner-epoch", default_value_t = 4)]
    inner_epochs: usize,

    #[arg(short = 'O', long, default_value_t = 0.0)]
    oracle_rate: f32,

    #[arg(short = 'o', long, default_value_t = 0.5)]
    oracle_drop_rate: f32,

    #[arg(short = 'M', long)]
    mixup: bool,

    #[arg(short = 'a', long, default_value_t = 0.4)]
    mixup_alpha: f32,

    /// Context frames on each side of the gate
    #[arg(long, default_value_t = 32)]
    offset: usize,

    /// Start from this `.npz` checkpoint instead of a fresh gate
    #[arg(long)]
    resume: Option<PathBuf>,

    #[arg(long, default_value = "models")]
    model_dir: PathBuf,

    #[arg(long, default_value = ".")]
    log_dir: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match cli.command {
        Commands::Separate(args) => handle_separate(args, cli.quiet),
        Commands::Train(args) => handle_train(args, cli.quiet),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = if cli.quiet { "error" } else { filter };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

fn window_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} windows {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb
}

fn handle_separate(args: SeparateArgs, quiet: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !args.input.exists() {
        return Err(format!("Input file not found: {}", args.input.display()).into());
    }

    let device = Device::from_gpu_index(args.gpu);
    let mut model = load_model(&args.model, device, args.offset, args.conv_offset)?;

    let options = SeparateOptions {
        output_dir: args.output,
        sample_rate: args.sample_rate,
        hop_length: args.hop_length,
        window_size: args.window_size,
        postprocess: args.postprocess,
        out_mask: args.out_mask,
        uninformative: UninformativeParams::default(),
    };

    let bar = (!quiet).then(window_bar);
    let mut observer = |progress: Progress<'_>| {
        let Some(pb) = &bar else { return };
        match progress {
            Progress::Stage(stage) => pb.set_message(stage.to_string()),
            Progress::Windows { done, total } => {
                pb.set_length(total as u64);
                pb.set_position(done as u64);
            }
            _ => {}
        }
    };

    let result = split_file(&args.input, &options, model.as_mut(), &mut observer)?;
    if let Some(pb) = &bar {
        pb.finish_and_clear();
    }

    if quiet {
        println!("{}", result.instrumental_path.display());
        println!("{}", result.vocal_path.display());
    } else {
        eprintln!("Instrumental: {}", result.instrumental_path.display());
        eprintln!("Vocal:        {}", result.vocal_path.display());
        if let Some(mask) = &result.mask_path {
            eprintln!("Mask:         {}", mask.display());
        }
    }
    Ok(())
}

fn handle_train(args: TrainArgs, quiet: bool) -> Result<(), Box<dyn std::error::Error>> {
    if Device::from_gpu_index(args.gpu) != Device::Cpu {
        warn!(gpu = args.gpu, "the context gate trains on the CPU; ignoring --gpu");
    }

    let mut model = match &args.resume {
        Some(path) => ContextGateNet::load(path)?,
        None => ContextGateNet::new(freq_bins_for_hop(args.hop_length), args.offset),
    };

    let options = TrainOptions {
        seed: args.seed,
        sample_rate: args.sample_rate,
        hop_length: args.hop_length,
        mixture_dataset: args.mixture_dataset,
        instrumental_dataset: args.instrumental_dataset,
        validation_rate: args.validation_rate,
        learning_rate: args.learning_rate,
        lr_min: args.lr_min,
        lr_decay: args.lr_decay,
        lr_decay_interval: args.lr_decay_interval,
        batch_size: args.batch_size,
        val_batch_size: args.val_batch_size,
        cropsize: args.cropsize,
        patches: args.patches,
        val_patches: args.val_patches,
        epochs: args.epochs,
        inner_epochs: args.inner_epochs,
        oracle_rate: args.oracle_rate,
        oracle_drop_rate: args.oracle_drop_rate,
        mixup: args.mixup,
        mixup_alpha: args.mixup_alpha,
        model_dir: args.model_dir,
        log_dir: args.log_dir,
    };

    let mut observer = |progress: Progress<'_>| {
        if quiet {
            return;
        }
        match progress {
            Progress::Epoch { epoch, total } => eprintln!("# epoch {epoch}/{total}"),
            Progress::InnerEpoch {
                inner,
                train_loss,
                valid_loss,
                ..
            } => eprintln!(
                "  * inner epoch {inner}: training loss = {:.6}, validation loss = {:.6}",
                train_loss * 1000.0,
                valid_loss * 1000.0
            ),
            Progress::BestValidation { checkpoint, .. } => {
                eprintln!("    * best validation loss, saved {}", checkpoint.display())
            }
            Progress::LearningRateDecay { learning_rate } => {
                eprintln!("    * learning rate decay: {learning_rate:.6}")
            }
            Progress::Oracle { loss } => eprintln!("  * oracle loss = {loss:.6}"),
            _ => {}
        }
    };

    let state = train(options, &mut model, &mut observer)?;
    if !quiet {
        eprintln!("best validation loss = {:.6}", state.best_loss * 1000.0);
    }
    Ok(())
}
