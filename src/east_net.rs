use std::path::Path;

use image::{imageops::FilterType, DynamicImage};
use ort::{inputs, Session};
use tracing::instrument;

use crate::{
    error::{EastError, Result, TensorKind},
    mapper::MODEL_INPUT_SIZE,
    session::build_session,
    tensor::Tensor,
    util::to_nhwc_tensor,
    ExecutionProvider,
};

pub const DEFAULT_INPUT_NAME: &str = "input_images:0";
pub const DEFAULT_SCORE_OUTPUT: &str = "feature_fusion/Conv_7/Sigmoid:0";
pub const DEFAULT_GEOMETRY_OUTPUT: &str = "feature_fusion/concat_3:0";

/// Tensor names of an EAST graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EastIoNames {
    pub input: String,
    pub score: String,
    pub geometry: String,
}

impl Default for EastIoNames {
    fn default() -> Self {
        Self {
            input: DEFAULT_INPUT_NAME.to_string(),
            score: DEFAULT_SCORE_OUTPUT.to_string(),
            geometry: DEFAULT_GEOMETRY_OUTPUT.to_string(),
        }
    }
}

/// EAST text detector running on ONNX Runtime.
///
/// Takes a channel-last `[1, 320, 320, 3]` input and yields a `[1, 80, 80, 1]`
/// score map plus a `[1, 80, 80, 5]` RBOX geometry map.
pub struct EastNet {
    session: Session,
    names: EastIoNames,
    mean_values: [f32; 3],
    norm_values: [f32; 3],
}

impl EastNet {
    #[instrument(level = "debug", skip(execution_providers))]
    pub fn init(
        path: &Path,
        num_threads: usize,
        execution_providers: &[ExecutionProvider],
        names: EastIoNames,
        mean_values: [f32; 3],
        norm_values: [f32; 3],
    ) -> Result<Self> {
        let session = build_session(path, num_threads, execution_providers)?;
        Ok(Self {
            session,
            names,
            mean_values,
            norm_values,
        })
    }

    /// Runs the detector and returns the raw `(score, geometry)` outputs.
    #[instrument(level = "debug", skip(self, image))]
    pub fn get_raw_maps(&self, image: &DynamicImage) -> Result<(Tensor, Tensor)> {
        let image = image.resize_exact(MODEL_INPUT_SIZE, MODEL_INPUT_SIZE, FilterType::Triangle);
        let input_values = to_nhwc_tensor(&image, &self.mean_values, &self.norm_values);
        let outputs = self
            .session
            .run(inputs![self.names.input.as_str() => input_values]?)?;

        let extract = |name: &str, kind: TensorKind| -> Result<Tensor> {
            let value = outputs.get(name).ok_or_else(|| EastError::MissingOutput {
                name: name.to_string(),
            })?;
            let view = value.try_extract_tensor::<f32>()?;
            log::trace!("{kind} output tensor size: {:?}", view.shape());
            Tensor::from_view(kind, view)
        };

        let score = extract(self.names.score.as_str(), TensorKind::Score)?;
        let geometry = extract(self.names.geometry.as_str(), TensorKind::Geometry)?;
        Ok((score, geometry))
    }
}
