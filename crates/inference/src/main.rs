use clap::Parser;
use inference::{InferenceConfig, InferencePipeline, ModelHandle, checkpoint};
use std::path::PathBuf;

/// Run one prediction and print the counts as JSON.
#[derive(Parser, Debug)]
#[command(name = "inference", version)]
struct Cli {
    /// Image to run the detector on
    #[arg(long)]
    image: PathBuf,

    /// Directory holding best.onnx / last.onnx [env: WEIGHTS_DIR]
    #[arg(long)]
    weights: Option<PathBuf>,

    /// Labels file, one class per line [env: LABELS_PATH]
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Where the annotated image is written [env: OUTPUT_DIR]
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long)]
    confidence: Option<f32>,

    /// Square model input size, 0 for the model's native size
    #[arg(long)]
    input_size: Option<u32>,

    #[arg(long)]
    max_detections: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = InferenceConfig::from_env()?;

    if let Some(weights) = cli.weights {
        config.weights_dir = weights;
    }
    if let Some(labels) = cli.labels {
        config.labels_path = Some(labels);
    }
    if let Some(output) = cli.output {
        config.output_dir = output;
    }
    if let Some(confidence) = cli.confidence {
        config.detection.confidence_threshold = confidence;
    }
    if let Some(input_size) = cli.input_size {
        config.detection.input_size = input_size;
    }
    if let Some(max_detections) = cli.max_detections {
        config.detection.max_detections = max_detections;
    }
    config.validate()?;

    let _telemetry = common::init_observability(
        "inference",
        config.otel_endpoint.as_deref(),
        config.environment,
    )?;

    tracing::info!(config = ?config, "Loaded configuration");

    let checkpoint = checkpoint::resolve(&config.weights_dir)?;
    let model = ModelHandle::load(&checkpoint, config.labels_path.as_deref())?;
    let pipeline = InferencePipeline::from_config(&config);

    let outcome = pipeline.run_inference(&model, &cli.image, &config.output_dir)?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(())
}
