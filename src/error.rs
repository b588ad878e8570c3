use std::{fmt, path::PathBuf};

use thiserror::Error;

use crate::TextRect;

/// Which of the two detector outputs a tensor error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorKind {
    Score,
    Geometry,
}

impl fmt::Display for TensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorKind::Score => write!(f, "score"),
            TensorKind::Geometry => write!(f, "geometry"),
        }
    }
}

/// Fatal errors. Any of these aborts a whole pipeline run.
#[derive(Debug, Error)]
pub enum EastError {
    #[error("{tensor} tensor has {len} values but shape {shape:?} needs {}", shape.iter().product::<usize>())]
    ShapeMismatch {
        tensor: TensorKind,
        shape: [usize; 4],
        len: usize,
    },
    #[error("{tensor} tensor shape {shape:?} has a zero-sized dimension")]
    EmptyDimension { tensor: TensorKind, shape: [usize; 4] },
    #[error("{tensor} tensor has rank {rank}, expected 4")]
    Rank { tensor: TensorKind, rank: usize },
    #[error("{tensor} tensor has batch size {batch}, only single-image batches are supported")]
    BatchSize { tensor: TensorKind, batch: usize },
    #[error("{tensor} map has {actual} channels, expected {expected}")]
    ChannelMismatch {
        tensor: TensorKind,
        expected: usize,
        actual: usize,
    },
    #[error("score grid {score:?} does not match geometry grid {geometry:?}")]
    GridMismatch {
        score: (usize, usize),
        geometry: (usize, usize),
    },
    #[error("model output `{name}` not found")]
    MissingOutput { name: String },
    #[error("model is not configured: {0}")]
    Config(String),
    #[error("inference failed: {0}")]
    Inference(#[from] ort::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("failed to read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-region failures. Recovered inside the pipeline by dropping the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegionError {
    #[error("region {rect:?} has no area")]
    Degenerate { rect: TextRect },
}

/// Error type returned by text recognizers.
pub type RecognizeError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = EastError> = std::result::Result<T, E>;
