//! Text detection and recognition with an EAST detector.
//!
//! The heart of the crate is the post-inference decoding in [`pipeline`]: it
//! turns the detector's dense score and RBOX geometry maps into axis-aligned
//! crop rectangles in source-image pixels and hands each crop to a
//! [`TextRecognizer`]. [`EastOCR`] wires that to ONNX Runtime models.
//!
//! Boxes are axis-aligned. The rotation encoded by the detector only shifts the
//! anchor corner of each box and is otherwise discarded.

use std::{path::PathBuf, sync::atomic::AtomicBool};

use crnn_net::CrnnNet;
use east_net::{EastIoNames, EastNet};
use image::DynamicImage;
use tracing::instrument;

mod crnn_net;
pub mod decode;
pub mod east_net;
pub mod error;
pub mod mapper;
pub mod nms;
pub mod pipeline;
mod result;
mod session;
pub mod tensor;
pub mod util;

pub use error::{EastError, RegionError, Result};
pub use pipeline::TextRecognizer;
pub use result::*;

pub use ort as runtime;

pub struct EastOCRBuilder {
    threads: usize,
    det_path: Option<PathBuf>,
    rec_paths: Option<(PathBuf, PathBuf)>,
    det_names: EastIoNames,
    mean_values: [f32; 3],
    norm_values: [f32; 3],
    execution_providers: Vec<ExecutionProvider>,
}

impl EastOCRBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn det_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.det_path = Some(path.into());
        self
    }

    pub fn rec_model(
        mut self,
        model_path: impl Into<PathBuf>,
        keys_path: impl Into<PathBuf>,
    ) -> Self {
        self.rec_paths = Some((model_path.into(), keys_path.into()));
        self
    }

    /// Input and output tensor names of the detector graph.
    pub fn det_io_names(
        mut self,
        input: impl Into<String>,
        score: impl Into<String>,
        geometry: impl Into<String>,
    ) -> Self {
        self.det_names = EastIoNames {
            input: input.into(),
            score: score.into(),
            geometry: geometry.into(),
        };
        self
    }

    /// Per-channel RGB means subtracted from 0..=255 pixels before detection.
    pub fn mean_values(mut self, mean_values: [f32; 3]) -> Self {
        self.mean_values = mean_values;
        self
    }

    /// Per-channel RGB factors applied after mean subtraction.
    pub fn norm_values(mut self, norm_values: [f32; 3]) -> Self {
        self.norm_values = norm_values;
        self
    }

    pub fn with_execution_providers(
        mut self,
        providers: impl IntoIterator<Item = ExecutionProvider>,
    ) -> Self {
        self.execution_providers = providers.into_iter().collect();
        self
    }

    #[instrument(skip(self))]
    pub fn build(self) -> Result<EastOCR> {
        let det_path = self
            .det_path
            .ok_or_else(|| EastError::Config("detector model path is not set".to_string()))?;
        let (rec_path, keys_path) = self
            .rec_paths
            .ok_or_else(|| EastError::Config("recognizer model path is not set".to_string()))?;
        Ok(EastOCR {
            det_model: EastNet::init(
                &det_path,
                self.threads,
                &self.execution_providers,
                self.det_names,
                self.mean_values,
                self.norm_values,
            )?,
            rec_model: CrnnNet::init(
                &rec_path,
                &keys_path,
                self.threads,
                &self.execution_providers,
            )?,
        })
    }
}

impl Default for EastOCRBuilder {
    fn default() -> Self {
        Self {
            threads: 4,
            det_path: None,
            rec_paths: None,
            det_names: EastIoNames::default(),
            mean_values: [0.0; 3],
            norm_values: [1.0; 3],
            execution_providers: DEFAULT_PROVIDERS.to_vec(),
        }
    }
}

pub struct EastOCR {
    det_model: EastNet,
    rec_model: CrnnNet,
}

impl EastOCR {
    #[instrument(skip(self, image))]
    pub fn detect(
        &self,
        image: &DynamicImage,
        options: DetectionOptions,
    ) -> Result<Vec<DetectionResult>> {
        self.detect_with_cancel(image, options, &AtomicBool::new(false))
    }

    /// Stops recognizing further regions once `cancel` is set.
    #[instrument(skip(self, image, cancel))]
    pub fn detect_with_cancel(
        &self,
        image: &DynamicImage,
        options: DetectionOptions,
        cancel: &AtomicBool,
    ) -> Result<Vec<DetectionResult>> {
        let (score, geometry) = self.det_model.get_raw_maps(image)?;
        pipeline::run_with_cancel(image, score, geometry, &self.rec_model, &options, cancel)
    }

    /// Detection only, without recognition.
    #[instrument(skip(self, image))]
    pub fn detect_regions(
        &self,
        image: &DynamicImage,
        options: DetectionOptions,
    ) -> Result<Vec<(TextRect, f32)>> {
        let (score, geometry) = self.det_model.get_raw_maps(image)?;
        pipeline::detect_regions(image, score, geometry, &options)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionOptions {
    /// Minimum cell confidence for box decoding.
    pub score_threshold: f32,
    /// Minimum confidence for a box to enter suppression.
    pub nms_score_threshold: f32,
    /// Boxes overlapping a kept box by more than this are removed.
    pub iou_threshold: f32,
    /// Recognize regions on the rayon pool once at least this many survive.
    /// 0 disables parallel recognition.
    pub parallel_threshold: usize,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            score_threshold: decode::DEFAULT_SCORE_THRESHOLD,
            nms_score_threshold: nms::DEFAULT_NMS_SCORE_THRESHOLD,
            iou_threshold: nms::DEFAULT_IOU_THRESHOLD,
            parallel_threshold: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    Default,
    #[cfg(feature = "coreml")]
    CoreML,
    #[cfg(feature = "cuda")]
    Cuda,
    #[cfg(feature = "directml")]
    DirectML,
}

const DEFAULT_PROVIDERS: &[ExecutionProvider] = &[
    #[cfg(feature = "coreml")]
    ExecutionProvider::CoreML,
    #[cfg(feature = "directml")]
    ExecutionProvider::DirectML,
    #[cfg(feature = "cuda")]
    ExecutionProvider::Cuda,
    ExecutionProvider::Default,
];
