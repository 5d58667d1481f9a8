//! classify - classify local image files from the command line

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use waste_classifier::{
    BackendRegistry, ClassificationReport, ClassificationResult, ClassificationService,
    Recyclability, ServiceConfig,
};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image files to classify.
    paths: Vec<PathBuf>,
    /// Classify every image in this directory (png, jpg, jpeg, webp).
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Minimum detection confidence in [0, 1].
    #[arg(long, value_parser = parse_confidence)]
    confidence: Option<f32>,
    /// Print results as JSON.
    #[arg(long)]
    json: bool,
    /// Guess a category from keywords for unmapped object classes.
    #[arg(long)]
    keyword_fallback: bool,
    /// Stub detector script (JSON keyed by image SHA-256).
    #[arg(long, env = "WASTE_STUB_SCRIPT")]
    script: Option<PathBuf>,
    /// ONNX detection model; selects the tract backend.
    #[cfg(feature = "backend-tract")]
    #[arg(long)]
    model: Option<PathBuf>,
}

#[derive(Serialize)]
struct FileResult<'a> {
    filename: String,
    #[serde(flatten)]
    result: &'a ClassificationResult,
}

fn parse_confidence(raw: &str) -> Result<f32, String> {
    let value: f32 = raw
        .parse()
        .map_err(|_| format!("'{}' is not a number", raw))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("{} is outside [0, 1]", value));
    }
    Ok(value)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = ServiceConfig::load()?;
    if args.keyword_fallback {
        config.classifier.keyword_fallback = true;
    }
    if let Some(script) = &args.script {
        config.detector.script_path = Some(script.clone());
    }
    select_model(&args, &mut config);

    let images = collect_images(&args)?;
    if images.is_empty() {
        return Err(anyhow!("no images to classify; pass file paths or --dir"));
    }

    let registry = BackendRegistry::from_settings(&config.detector)?;
    let service = ClassificationService::from_config(&config, &registry)?;

    let mut payloads = Vec::with_capacity(images.len());
    for path in &images {
        payloads.push(fs::read(path).with_context(|| format!("read {}", path.display()))?);
    }
    let results = service.classify_batch(&payloads, args.confidence);

    if args.json {
        let entries: Vec<FileResult<'_>> = images
            .iter()
            .zip(&results)
            .map(|(path, result)| FileResult {
                filename: path.display().to_string(),
                result,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for (path, result) in images.iter().zip(&results) {
        match result {
            ClassificationResult::Success(report) => print_report(path, report),
            ClassificationResult::Error { error } => {
                println!("{}: error: {}", path.display(), error)
            }
        }
        println!();
    }
    Ok(())
}

#[cfg(feature = "backend-tract")]
fn select_model(args: &Args, config: &mut ServiceConfig) {
    if let Some(model) = &args.model {
        config.detector.backend = "tract".to_string();
        config.detector.model_path = Some(model.clone());
    }
}

#[cfg(not(feature = "backend-tract"))]
fn select_model(_args: &Args, _config: &mut ServiceConfig) {}

fn collect_images(args: &Args) -> Result<Vec<PathBuf>> {
    let mut images = args.paths.clone();
    if let Some(dir) = &args.dir {
        images.extend(images_in_dir(dir)?);
    }
    Ok(images)
}

fn images_in_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)));
        if path.is_file() && is_image {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

fn print_report(path: &Path, report: &ClassificationReport) {
    let objects = report.detected_objects();
    println!("{}: {} object(s)", path.display(), objects.len());
    for object in objects {
        println!(
            "  - {} ({:.2}): {}",
            object.detected_class, object.confidence, object.recyclability
        );
    }
    let summary = report.summary();
    let counts: Vec<String> = Recyclability::ALL
        .iter()
        .map(|v| format!("{}: {}", v, summary.count(*v)))
        .collect();
    println!("  {}", counts.join(", "));
    let assessment = report.assessment();
    println!("  {}", assessment.message);
    println!("  {}", assessment.recommendation);
}
