use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use wastesort::{
    BuiltinModel, ClassificationResult, ClipModelLoader, ModelManager, RuntimeConfig,
    WasteClassifier,
};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Sort photos of waste into disposal categories",
    long_about = None
)]
struct Args {
    /// Image files to classify
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Force a fresh download of the model files
    #[arg(short, long)]
    fresh: bool,

    /// Print results as JSON lines instead of text
    #[arg(long)]
    json: bool,

    /// Threads ONNX Runtime may use within one operator (0 lets it decide)
    #[arg(long, default_value_t = 0)]
    intra_threads: usize,
}

fn remove_cached_model() -> Result<()> {
    let manager = ModelManager::new_default().context("Failed to open model cache")?;
    let info = BuiltinModel::ClipVitBase32.get_model_info();
    info!("Fresh download requested - removing any existing model files...");
    manager.remove_download(&info.name)?;
    Ok(())
}

fn print_result(path: &Path, result: &ClassificationResult) {
    println!("\n{}", path.display());
    println!("  Category:    {}", result.category);
    println!("  Confidence:  {:.1}%", result.confidence * 100.0);
    println!("  {}", result.description);
    println!("  {}", result.category.disposal_instruction());
    println!("  Tips:");
    for tip in &result.tips {
        println!("    - {}", tip);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.fresh {
        remove_cached_model()?;
    }

    let loader = ClipModelLoader::new(BuiltinModel::ClipVitBase32)
        .with_runtime_config(RuntimeConfig::default().with_intra_threads(args.intra_threads));
    let classifier = WasteClassifier::new(loader);

    let start_time = Instant::now();
    classifier.preload().await.context("Classification unavailable: model failed to load")?;
    info!("Model ready (took {:.2?})", start_time.elapsed());

    let mut failures = 0usize;
    for path in &args.images {
        match classifier.classify_waste_image_file(path).await {
            Ok(result) if args.json => println!("{}", serde_json::to_string(&result)?),
            Ok(result) => print_result(path, &result),
            Err(e) => {
                failures += 1;
                eprintln!("Failed to classify {}: {}", path.display(), e);
            }
        }
    }

    info!("Classified {} image(s) in {:.2?}", args.images.len(), start_time.elapsed());
    if failures > 0 {
        anyhow::bail!("{} of {} image(s) could not be classified", failures, args.images.len());
    }
    Ok(())
}
