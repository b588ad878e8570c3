use std::{error::Error, path::PathBuf, time::Instant};

use clap::Parser;
use eastocr::{util::draw_detections, DetectionOptions, EastOCRBuilder};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

#[derive(Parser)]
#[command(name = "eastocr")]
#[command(about = "Detect text regions with EAST and read them with a CRNN recognizer")]
struct Args {
    #[arg(help = "Input image path")]
    image: PathBuf,

    #[arg(long, default_value = "models/east.onnx", help = "EAST detector model")]
    det: PathBuf,

    #[arg(long, default_value = "models/rec.onnx", help = "CRNN recognizer model")]
    rec: PathBuf,

    #[arg(long, default_value = "models/ppocr_keys_v1.txt", help = "Recognizer character list")]
    keys: PathBuf,

    #[arg(short, long, default_value = "4", help = "ONNX Runtime threads per model")]
    threads: usize,

    #[arg(long, default_value = "0.3", help = "Minimum cell score for decoding")]
    score_threshold: f32,

    #[arg(long, default_value = "0.2", help = "Minimum box score for suppression")]
    nms_score_threshold: f32,

    #[arg(long, default_value = "0.4", help = "IoU above which boxes are suppressed")]
    iou_threshold: f32,

    #[arg(
        long,
        default_value = "0",
        help = "Recognize in parallel once this many regions survive (0 = never)"
    )]
    parallel_threshold: usize,

    #[arg(short, long, help = "Write an image with the detected boxes drawn on it")]
    overlay: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let image = image::open(&args.image)?;
    let ocr = EastOCRBuilder::new()
        .det_model(&args.det)
        .rec_model(&args.rec, &args.keys)
        .threads(args.threads)
        .build()?;

    let options = DetectionOptions {
        score_threshold: args.score_threshold,
        nms_score_threshold: args.nms_score_threshold,
        iou_threshold: args.iou_threshold,
        parallel_threshold: args.parallel_threshold,
    };

    let start = Instant::now();
    let results = ocr.detect(&image, options)?;
    log::info!("Recognized {} regions in {:?}", results.len(), start.elapsed());

    for result in &results {
        let rect = result.rect;
        println!(
            "[{}, {}, {}, {}] {:.3} {}",
            rect.left, rect.top, rect.right, rect.bottom, result.confidence, result.text
        );
    }

    if let Some(path) = args.overlay {
        draw_detections(&image, &results).save(&path)?;
        log::info!("Overlay written to {}", path.display());
    }

    Ok(())
}
