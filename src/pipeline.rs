//! Post-inference decoding: raw detector outputs to recognized text regions.
//!
//! Stages run strictly in order, each consuming the previous stage's value:
//! reshape/transpose, box decoding, suppression, mapping to source pixels,
//! cropping and recognition. Only malformed tensors abort a run. A region that
//! collapses after mapping is dropped, and a region whose recognition fails
//! keeps empty text.

use std::sync::atomic::{AtomicBool, Ordering};

use image::{DynamicImage, GenericImageView};
use rayon::prelude::*;
use tracing::instrument;

use crate::{
    decode::decode,
    error::{RecognizeError, Result},
    mapper::{map_to_source, Scale},
    nms::suppress,
    tensor::{check_grid, GeometryMap, ScoreMap, Tensor},
    util::crop_region,
    Candidate, DetectionOptions, DetectionResult, TextRect,
};

/// Reads the text inside one cropped region.
pub trait TextRecognizer {
    fn recognize(&self, image: &DynamicImage) -> Result<String, RecognizeError>;
}

impl<F> TextRecognizer for F
where
    F: Fn(&DynamicImage) -> Result<String, RecognizeError>,
{
    fn recognize(&self, image: &DynamicImage) -> Result<String, RecognizeError> {
        self(image)
    }
}

/// Decodes the detector outputs for `image` and recognizes every surviving region.
pub fn run<R>(
    image: &DynamicImage,
    score: Tensor,
    geometry: Tensor,
    recognizer: &R,
    options: &DetectionOptions,
) -> Result<Vec<DetectionResult>>
where
    R: TextRecognizer + Sync + ?Sized,
{
    run_with_cancel(image, score, geometry, recognizer, options, &AtomicBool::new(false))
}

/// Like [`run`], but stops before the next recognition call once `cancel` is set
/// and returns what has been recognized so far.
#[instrument(level = "debug", skip_all)]
pub fn run_with_cancel<R>(
    image: &DynamicImage,
    score: Tensor,
    geometry: Tensor,
    recognizer: &R,
    options: &DetectionOptions,
    cancel: &AtomicBool,
) -> Result<Vec<DetectionResult>>
where
    R: TextRecognizer + Sync + ?Sized,
{
    let regions = detect_regions(image, score, geometry, options)?;

    // None once cancelled, Some(None) for a region with no pixels in the image
    let recognize = |&(rect, confidence): &(TextRect, f32)| {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        match crop_region(image, &rect) {
            Ok(crop) => Some(Some(recognize_region(rect, confidence, &crop, recognizer))),
            Err(err) => {
                log::debug!("Dropping region: {err}");
                Some(None)
            }
        }
    };

    let parallel = options.parallel_threshold > 0 && regions.len() >= options.parallel_threshold;
    let results: Vec<DetectionResult> = if parallel {
        log::debug!("Recognizing {} regions in parallel", regions.len());
        // collect keeps suppression order
        regions
            .par_iter()
            .map(recognize)
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .flatten()
            .collect()
    } else {
        regions.iter().map_while(recognize).flatten().collect()
    };

    if cancel.load(Ordering::Relaxed) {
        log::info!("Cancelled after {} of {} regions", results.len(), regions.len());
    }
    Ok(results)
}

/// Every stage up to and including the mapping to source pixels.
///
/// Returns the surviving rectangles with their confidences, in suppression order.
#[instrument(level = "debug", skip_all)]
pub fn detect_regions(
    image: &DynamicImage,
    score: Tensor,
    geometry: Tensor,
    options: &DetectionOptions,
) -> Result<Vec<(TextRect, f32)>> {
    let score = ScoreMap::from_tensor(score)?;
    let geometry = GeometryMap::from_tensor(geometry)?;
    check_grid(&score, &geometry)?;

    let candidates = decode(&score, &geometry, options.score_threshold);
    let kept = suppress(
        &candidates,
        options.nms_score_threshold,
        options.iou_threshold,
    );

    let (width, height) = image.dimensions();
    let scale = Scale::to_source(width, height);
    let regions = kept
        .into_iter()
        .map(|index| candidates[index])
        .filter_map(|Candidate { rect, confidence }| {
            match map_to_source(&rect, &scale, width, height) {
                Ok(mapped) => Some((mapped, confidence)),
                Err(err) => {
                    log::debug!("Dropping region: {err}");
                    None
                }
            }
        })
        .collect::<Vec<_>>();
    log::debug!("{} regions survive mapping", regions.len());
    Ok(regions)
}

#[instrument(level = "trace", skip(crop, recognizer))]
fn recognize_region<R>(
    rect: TextRect,
    confidence: f32,
    crop: &DynamicImage,
    recognizer: &R,
) -> DetectionResult
where
    R: TextRecognizer + ?Sized,
{
    let text = recognizer.recognize(crop).unwrap_or_else(|err| {
        log::warn!("Recognition failed for {rect:?}: {err}");
        String::new()
    });
    DetectionResult {
        rect,
        confidence,
        text,
    }
}
