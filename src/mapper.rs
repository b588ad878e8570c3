use tracing::instrument;

use crate::{error::RegionError, TextRect};

/// Side length of the square model input.
pub const MODEL_INPUT_SIZE: u32 = 320;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub factor_x: f32,
    pub factor_y: f32,
}

impl Scale {
    /// Scale from the fixed model input back to a `width` x `height` source image.
    pub fn to_source(width: u32, height: u32) -> Self {
        let scale = Self {
            factor_x: width as f32 / MODEL_INPUT_SIZE as f32,
            factor_y: height as f32 / MODEL_INPUT_SIZE as f32,
        };
        log::debug!(
            "Model input (w: {MODEL_INPUT_SIZE}, h: {MODEL_INPUT_SIZE}) maps to (w: {width}, h: {height}) with scaling factor ({}, {}).",
            scale.factor_x,
            scale.factor_y
        );
        scale
    }
}

/// Multiplies every coordinate by its axis factor and truncates.
pub fn scale_rect(rect: &TextRect, factor_x: f32, factor_y: f32) -> TextRect {
    TextRect::new(
        (rect.left as f32 * factor_x) as i32,
        (rect.top as f32 * factor_y) as i32,
        (rect.right as f32 * factor_x) as i32,
        (rect.bottom as f32 * factor_y) as i32,
    )
}

/// Moves a model-input rectangle into source-image pixels.
///
/// Only the vertical axis is clamped. A box running past the bottom edge is
/// cut at `source_height`; otherwise a box starting above the top edge is
/// shifted down to row 0 keeping its height. Horizontal coordinates pass
/// through unclamped.
#[instrument(level = "trace")]
pub fn map_to_source(
    rect: &TextRect,
    scale: &Scale,
    source_width: u32,
    source_height: u32,
) -> Result<TextRect, RegionError> {
    let mut mapped = scale_rect(rect, scale.factor_x, scale.factor_y);
    let height = mapped.height();

    if mapped.top as i64 + height > source_height as i64 {
        mapped.bottom = source_height.min(i32::MAX as u32) as i32;
    } else if mapped.top < 0 {
        mapped.top = 0;
        mapped.bottom = height.min(i32::MAX as i64) as i32;
    }

    if mapped.is_degenerate() {
        return Err(RegionError::Degenerate { rect: mapped });
    }
    Ok(mapped)
}
