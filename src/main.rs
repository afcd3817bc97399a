mod audio;
mod classifier;
mod config;
mod features;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cpal::traits::DeviceTrait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

use audio::{get_device, list_input_devices, load_wav, record_clip, save_wav, AudioClip};
use classifier::{ClassificationRecord, CryClassifier, LabelDecoder, LabelScore};
use config::Config;
use features::MfccExtractor;

/// Status line printed when the pipeline fails for any reason
const ERROR_STATUS: &str = "Cry classification result: error processing audio";

/// Headless CLI for offline infant cry classification
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the classifier artifact (.json)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Path to the label set (.json)
    #[arg(short, long)]
    labels: Option<PathBuf>,

    /// Write the full classification record as JSON to this path
    #[arg(long)]
    json_out: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a WAV file
    Classify {
        /// Path to the audio file
        audio: PathBuf,
    },
    /// Record a clip from an input device and classify it
    Record {
        /// Input device ID (use "default" or run list-devices)
        #[arg(short, long, default_value = "default")]
        device: String,

        /// Recording length in milliseconds
        #[arg(long)]
        duration_ms: Option<u32>,

        /// Where to save the recorded WAV
        #[arg(long)]
        keep: Option<PathBuf>,
    },
    /// List available input devices and exit
    ListDevices,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    if let Command::ListDevices = args.command {
        return list_devices_and_exit();
    }

    let config = load_config()?;

    // All pipeline failures collapse to one status line
    match run(&args, &config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Pipeline error: {:#}", e);
            println!("{}", ERROR_STATUS);
            std::process::exit(1);
        }
    }
}

fn load_config() -> Result<Config> {
    let path = Config::default_config_dir()?.join("config.json");
    let config = Config::load(&path)?;
    debug!("Config loaded from {:?}", path);
    Ok(config)
}

async fn run(args: &Args, config: &Config) -> Result<()> {
    let model_path = match &args.model {
        Some(path) => path.clone(),
        None => config.get_model_path()?,
    };
    let labels_path = match &args.labels {
        Some(path) => path.clone(),
        None => config.get_labels_path()?,
    };

    info!("Cry classification CLI starting...");
    info!("Model: {:?}", model_path);
    info!("Labels: {:?}", labels_path);

    if !model_path.exists() || !labels_path.exists() {
        let missing = if model_path.exists() {
            &labels_path
        } else {
            &model_path
        };
        error!("Artifact not found: {:?}", missing);
        eprintln!("\nArtifact not found: {:?}", missing);
        eprintln!("\nThe classifier needs two JSON artifacts exported from training:");
        eprintln!("  {} - model weights and intercepts", config::MODEL_FILENAME);
        eprintln!("  {} - class labels in training order", config::LABELS_FILENAME);
        eprintln!(
            "\nPlace them under: {:?}",
            Config::default_models_dir()?
        );
        eprintln!("Or specify custom paths with: --model / --labels");
        anyhow::bail!("missing model artifacts");
    }

    let model = CryClassifier::load(&model_path)?;
    let decoder = LabelDecoder::load(&labels_path)?;

    if model.n_classes() != decoder.len() {
        anyhow::bail!(
            "Model has {} classes but label set has {}",
            model.n_classes(),
            decoder.len()
        );
    }

    let (clip, source) = match &args.command {
        Command::Classify { audio } => {
            info!("Classifying file: {:?}", audio);
            let clip = load_wav(audio)?;
            (clip, audio.display().to_string())
        }
        Command::Record {
            device,
            duration_ms,
            keep,
        } => {
            let duration = duration_ms.unwrap_or(config.record_duration_ms);
            let keep_path = keep.clone().unwrap_or_else(|| config.recording_path.clone());
            let device_id = config
                .input_device_id
                .clone()
                .filter(|_| device == "default")
                .unwrap_or_else(|| device.clone());

            let clip = record_and_save(&device_id, duration, &keep_path).await?;
            (clip, keep_path.display().to_string())
        }
        Command::ListDevices => unreachable!("handled before pipeline setup"),
    };

    let record = classify_clip(&clip, &source, &model, &decoder)?;
    print_result(&record);

    if let Some(path) = &args.json_out {
        write_record(&record, path)?;
    }

    Ok(())
}

/// Record a clip, stoppable early with Ctrl+C, and save it as a WAV
async fn record_and_save(device_id: &str, duration_ms: u32, keep_path: &Path) -> Result<AudioClip> {
    let selector = if device_id == "default" {
        None
    } else {
        Some(device_id.to_string())
    };

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_ctrlc = stop_flag.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, stopping recording...");
        stop_flag_ctrlc.store(true, Ordering::SeqCst);
    });

    println!(
        "\nRecording for {:.1}s... Press Ctrl+C to stop early.\n",
        duration_ms as f64 / 1000.0
    );

    // The cpal stream lives entirely inside the blocking task
    let clip = tokio::task::spawn_blocking(move || {
        let device = get_device(selector.as_deref())?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio device: {}", device_name);
        record_clip(&device, duration_ms, stop_flag)
    })
    .await
    .context("Recording task panicked")??;

    save_wav(&clip, keep_path)?;
    Ok(clip)
}

/// The core pipeline: waveform -> mean MFCCs -> classifier -> label
fn classify_clip(
    clip: &AudioClip,
    source: &str,
    model: &CryClassifier,
    decoder: &LabelDecoder,
) -> Result<ClassificationRecord> {
    let extractor = MfccExtractor::with_defaults()?;

    debug!(
        "Extracting features: {} samples at {} Hz",
        clip.samples.len(),
        clip.sample_rate
    );
    let features = extractor.mean_mfcc(&clip.samples, clip.sample_rate)?;

    let prediction = model.predict(&features)?;
    let label = decoder.decode(prediction.class_index)?;

    let scores = decoder
        .labels()
        .iter()
        .zip(prediction.scores.iter())
        .map(|(label, &score)| LabelScore {
            label: label.clone(),
            score,
        })
        .collect();

    Ok(ClassificationRecord::new(
        source.to_string(),
        label.to_string(),
        prediction.confidence,
        scores,
        clip.duration_ms(),
        clip.sample_rate,
    ))
}

fn print_result(record: &ClassificationRecord) {
    println!("Cry classification result: {}", record.label);
    println!("Confidence: {:.1}%", record.confidence * 100.0);
    println!(
        "Clip: {:.1}s at {} Hz",
        record.duration_ms as f64 / 1000.0,
        record.sample_rate
    );

    println!("\n--- Class scores ---");
    for entry in &record.scores {
        println!("  {:<12} {:>8.3}", entry.label, entry.score);
    }
}

fn write_record(record: &ClassificationRecord, path: &Path) -> Result<()> {
    let content =
        serde_json::to_string_pretty(record).context("Failed to serialize record")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write record to {:?}", path))?;
    info!("Wrote classification record to {:?}", path);
    Ok(())
}

fn list_devices_and_exit() -> Result<()> {
    println!("Available input devices:\n");

    match list_input_devices() {
        Ok(devices) => {
            if devices.is_empty() {
                println!("  No input devices found.");
            } else {
                for device in devices {
                    let default_marker = if device.is_default { " (default)" } else { "" };
                    println!("  - {}{}", device.name, default_marker);
                }
            }
        }
        Err(e) => {
            error!("Failed to list devices: {}", e);
            println!("  Error: {}", e);
        }
    }

    Ok(())
}
