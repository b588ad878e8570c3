//! Raw detector outputs and the channel-first maps the decoder reads.
//!
//! The inference engine hands back channel-last `[batch][row][col][channel]`
//! buffers, the decoder addresses `[batch][channel][row][col]`.

use ndarray::{Array4, ArrayView2, ArrayViewD, Axis};
use tracing::instrument;

use crate::error::{EastError, Result, TensorKind};

pub const SCORE_CHANNELS: usize = 1;
pub const GEOMETRY_CHANNELS: usize = 5;

/// A flat row-major buffer plus its declared 4-d shape, as produced by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    kind: TensorKind,
    shape: [usize; 4],
    values: Vec<f32>,
}

impl Tensor {
    pub fn new(kind: TensorKind, shape: [usize; 4], values: Vec<f32>) -> Self {
        Self {
            kind,
            shape,
            values,
        }
    }

    /// Copies an extracted output tensor, keeping its logical (row-major) order.
    pub fn from_view(kind: TensorKind, view: ArrayViewD<'_, f32>) -> Result<Self> {
        let shape: [usize; 4] = view
            .shape()
            .try_into()
            .map_err(|_| EastError::Rank {
                tensor: kind,
                rank: view.ndim(),
            })?;
        Ok(Self::new(kind, shape, view.iter().copied().collect()))
    }

    pub fn kind(&self) -> TensorKind {
        self.kind
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }
}

/// Interprets the flat buffer according to its shape.
pub fn reshape(tensor: Tensor) -> Result<Array4<f32>> {
    let Tensor {
        kind,
        shape,
        values,
    } = tensor;
    if shape.contains(&0) {
        return Err(EastError::EmptyDimension {
            tensor: kind,
            shape,
        });
    }
    let len = values.len();
    Array4::from_shape_vec(shape, values).map_err(|_| EastError::ShapeMismatch {
        tensor: kind,
        shape,
        len,
    })
}

/// `[batch][row][col][channel]` to `[batch][channel][row][col]`.
///
/// Panics if the batch size is not 1.
pub fn transpose(map: Array4<f32>) -> Array4<f32> {
    assert_eq!(map.len_of(Axis(0)), 1, "only single-image batches are supported");
    map.permuted_axes([0, 3, 1, 2])
        .as_standard_layout()
        .into_owned()
}

/// `[batch][channel][row][col]` back to `[batch][row][col][channel]`.
pub fn inverse_transpose(map: Array4<f32>) -> Array4<f32> {
    assert_eq!(map.len_of(Axis(0)), 1, "only single-image batches are supported");
    map.permuted_axes([0, 2, 3, 1])
        .as_standard_layout()
        .into_owned()
}

/// Reshape, check the batch size and move channels first.
#[instrument(level = "trace", skip(tensor), fields(kind = %tensor.kind(), shape = ?tensor.shape()))]
fn channel_first(tensor: Tensor, channels: usize) -> Result<Array4<f32>> {
    let kind = tensor.kind();
    let map = reshape(tensor)?;
    let batch = map.len_of(Axis(0));
    if batch != 1 {
        return Err(EastError::BatchSize {
            tensor: kind,
            batch,
        });
    }
    let map = transpose(map);
    check_channels(kind, &map, channels)?;
    Ok(map)
}

fn check_channels(kind: TensorKind, map: &Array4<f32>, expected: usize) -> Result<()> {
    let actual = map.len_of(Axis(1));
    if actual != expected {
        return Err(EastError::ChannelMismatch {
            tensor: kind,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Per-cell text confidence, `score[0][0][row][col]`.
#[derive(Debug, Clone)]
pub struct ScoreMap(Array4<f32>);

impl ScoreMap {
    /// Wraps an already channel-first map.
    pub fn new(map: Array4<f32>) -> Result<Self> {
        check_channels(TensorKind::Score, &map, SCORE_CHANNELS)?;
        Ok(Self(map))
    }

    pub fn from_tensor(tensor: Tensor) -> Result<Self> {
        channel_first(tensor, SCORE_CHANNELS).map(Self)
    }

    pub fn rows(&self) -> usize {
        self.0.len_of(Axis(2))
    }

    pub fn cols(&self) -> usize {
        self.0.len_of(Axis(3))
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.0.index_axis(Axis(0), 0).index_axis_move(Axis(0), 0)
    }
}

/// The RBOX encoding at one grid cell: edge distances in model-input pixels
/// and a rotation in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rbox {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
    pub angle: f32,
}

/// Five-channel geometry map, channels `{top, right, bottom, left, angle}`.
#[derive(Debug, Clone)]
pub struct GeometryMap(Array4<f32>);

impl GeometryMap {
    pub fn new(map: Array4<f32>) -> Result<Self> {
        check_channels(TensorKind::Geometry, &map, GEOMETRY_CHANNELS)?;
        Ok(Self(map))
    }

    pub fn from_tensor(tensor: Tensor) -> Result<Self> {
        channel_first(tensor, GEOMETRY_CHANNELS).map(Self)
    }

    pub fn rows(&self) -> usize {
        self.0.len_of(Axis(2))
    }

    pub fn cols(&self) -> usize {
        self.0.len_of(Axis(3))
    }

    pub fn cell(&self, row: usize, col: usize) -> Rbox {
        let at = |channel: usize| self.0[[0, channel, row, col]];
        Rbox {
            top: at(0),
            right: at(1),
            bottom: at(2),
            left: at(3),
            angle: at(4),
        }
    }
}

/// Both maps must cover the same grid.
pub fn check_grid(score: &ScoreMap, geometry: &GeometryMap) -> Result<()> {
    let score_grid = (score.rows(), score.cols());
    let geometry_grid = (geometry.rows(), geometry.cols());
    if score_grid != geometry_grid {
        return Err(EastError::GridMismatch {
            score: score_grid,
            geometry: geometry_grid,
        });
    }
    Ok(())
}
