use std::path::Path;

use float_ord::FloatOrd;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{ArrayView2, Axis, Ix3};
use ort::{inputs, Session};
use tracing::instrument;

use crate::{
    error::{EastError, RecognizeError, Result},
    pipeline::TextRecognizer,
    session::build_session,
    util::subtract_mean_normalize,
    ExecutionProvider, TextLine,
};

const DEST_HEIGHT: u32 = 48;

const MEAN_VALUES: [f32; 3] = [0.5, 0.5, 0.5];
const NORM_VALUES: [f32; 3] = [2.0, 2.0, 2.0];

/// CRNN text recognizer with a CTC head. Index 0 is the blank class.
pub struct CrnnNet {
    session: Session,
    keys: Vec<String>,
}

impl CrnnNet {
    #[instrument(level = "debug", skip(execution_providers))]
    pub fn init(
        model_path: &Path,
        keys_path: &Path,
        num_threads: usize,
        execution_providers: &[ExecutionProvider],
    ) -> Result<Self> {
        let session = build_session(model_path, num_threads, execution_providers)?;
        let keys = std::fs::read_to_string(keys_path).map_err(|source| EastError::Io {
            path: keys_path.to_path_buf(),
            source,
        })?;
        Ok(Self::with_keys(session, keys.lines()))
    }

    fn with_keys<'a>(session: Session, lines: impl Iterator<Item = &'a str>) -> Self {
        let keys = ["#".to_string()]
            .into_iter()
            .chain(lines.map(|line| line.to_string()))
            .chain([" ".to_string()])
            .collect();
        Self { session, keys }
    }

    #[instrument(level = "trace", skip(self, image))]
    pub fn get_text_line(&self, image: &DynamicImage) -> Result<TextLine> {
        let scale = DEST_HEIGHT as f32 / image.height() as f32;
        let dest_width = ((image.width() as f32 * scale) as u32).clamp(1, u16::MAX as u32);
        let image = image.resize_exact(dest_width, DEST_HEIGHT, FilterType::Triangle);

        let tensor_values =
            subtract_mean_normalize(&image, &MEAN_VALUES, &NORM_VALUES).insert_axis(Axis(0));
        let outputs = self.session.run(inputs!["x" => tensor_values]?)?;
        let (_, output) = outputs
            .first_key_value()
            .ok_or_else(|| EastError::MissingOutput {
                name: "recognition logits".to_string(),
            })?;
        let output = output.try_extract_tensor::<f32>()?;
        log::trace!("Output tensor size: {:?}", output.dim());

        let output = output
            .into_dimensionality::<Ix3>()
            .map_err(|_| EastError::MissingOutput {
                name: "rank 3 recognition logits".to_string(),
            })?;
        Ok(ctc_greedy_decode(output.index_axis(Axis(0), 0), &self.keys))
    }
}

impl TextRecognizer for CrnnNet {
    fn recognize(&self, image: &DynamicImage) -> Result<String, RecognizeError> {
        Ok(self.get_text_line(image)?.text)
    }
}

/// Best class per time step, dropping blanks and repeated classes.
fn ctc_greedy_decode(data: ArrayView2<f32>, keys: &[String]) -> TextLine {
    let mut previous = 0;
    let mut text = String::new();
    let mut character_scores = Vec::new();
    for step in data.outer_iter() {
        let Some((index, score)) = step
            .indexed_iter()
            .max_by_key(|(_, value)| FloatOrd(**value))
            .map(|(index, value)| (index, *value))
        else {
            continue;
        };
        if index != 0 && index != previous && index < keys.len() {
            text.push_str(&keys[index]);
            character_scores.push(score);
        }
        previous = index;
    }
    TextLine {
        text,
        character_scores,
    }
}
