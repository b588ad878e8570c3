use tracing::instrument;

use crate::{
    tensor::{GeometryMap, ScoreMap},
    Candidate, TextRect,
};

/// Spatial downsampling between model input and the score grid.
pub const GRID_STRIDE: f32 = 4.0;

pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.3;

/// Walks the grid in raster order and turns every confident cell into a box.
///
/// Only the axis-aligned extent of each rotated box is kept: the rectangle is
/// anchored on the rotated bottom-right corner and grown by the unrotated
/// width and height. Rotation is not otherwise represented downstream.
///
/// Degenerate boxes are emitted as-is; suppression filters them. A cell whose
/// geometry does not produce finite corners decodes to an empty box at its
/// grid offset.
#[instrument(level = "debug", skip(score, geometry))]
pub fn decode(score: &ScoreMap, geometry: &GeometryMap, score_threshold: f32) -> Vec<Candidate> {
    let candidates = score
        .view()
        .indexed_iter()
        .filter(|(_, confidence)| **confidence >= score_threshold)
        .map(|((row, col), confidence)| Candidate {
            rect: decode_cell(geometry, row, col),
            confidence: *confidence,
        })
        .collect::<Vec<_>>();
    log::debug!("Decoded {} candidates", candidates.len());
    candidates
}

fn decode_cell(geometry: &GeometryMap, row: usize, col: usize) -> TextRect {
    let offset_x = col as f32 * GRID_STRIDE;
    let offset_y = row as f32 * GRID_STRIDE;

    let rbox = geometry.cell(row, col);
    let (sin, cos) = rbox.angle.sin_cos();

    let h = rbox.top + rbox.bottom;
    let w = rbox.right + rbox.left;

    // truncation, not rounding
    let end_x = offset_x + cos * rbox.right + sin * rbox.bottom;
    let end_y = offset_y - sin * rbox.right + cos * rbox.bottom;
    let start_x = (end_x as i32) as f32 - w;
    let start_y = (end_y as i32) as f32 - h;

    if ![start_x, start_y, end_x, end_y].iter().all(|it| it.is_finite()) {
        log::trace!("Non-finite geometry at ({row}, {col}): {rbox:?}");
        let (x, y) = (offset_x as i32, offset_y as i32);
        return TextRect::new(x, y, x, y);
    }
    TextRect::new(start_x as i32, start_y as i32, end_x as i32, end_y as i32)
}

#[cfg(test)]
mod tests {
    use ndarray::Array4;

    use super::*;

    fn maps(rows: usize, cols: usize) -> (Array4<f32>, Array4<f32>) {
        (
            Array4::zeros((1, 1, rows, cols)),
            Array4::zeros((1, 5, rows, cols)),
        )
    }

    fn set_cell(geometry: &mut Array4<f32>, row: usize, col: usize, rbox: [f32; 5]) {
        for (channel, value) in rbox.into_iter().enumerate() {
            geometry[[0, channel, row, col]] = value;
        }
    }

    #[test]
    fn below_threshold_decodes_nothing() {
        let (mut score, geometry) = maps(80, 80);
        score.fill(0.29);
        let candidates = decode(
            &ScoreMap::new(score).unwrap(),
            &GeometryMap::new(geometry).unwrap(),
            DEFAULT_SCORE_THRESHOLD,
        );
        assert!(candidates.is_empty());
    }

    #[test]
    fn single_unrotated_cell() {
        let (mut score, mut geometry) = maps(80, 80);
        score[[0, 0, 10, 10]] = 0.9;
        set_cell(&mut geometry, 10, 10, [10.0, 20.0, 10.0, 20.0, 0.0]);

        let candidates = decode(
            &ScoreMap::new(score).unwrap(),
            &GeometryMap::new(geometry).unwrap(),
            DEFAULT_SCORE_THRESHOLD,
        );

        // offset (40, 40): end = (40 + 20, 40 + 10), start = end - (40, 20)
        assert_eq!(
            candidates,
            vec![Candidate {
                rect: TextRect::new(20, 30, 60, 50),
                confidence: 0.9,
            }]
        );
    }

    #[test]
    fn rotated_cell_uses_sin_and_cos() {
        let (mut score, mut geometry) = maps(4, 4);
        score[[0, 0, 1, 2]] = 0.5;
        score[[0, 0, 0, 0]] = 0.5;
        set_cell(&mut geometry, 1, 2, [2.0, 6.0, 4.0, 3.0, 0.5]);
        set_cell(&mut geometry, 0, 0, [0.0, 10.0, 0.0, 0.0, 0.5]);

        let candidates = decode(
            &ScoreMap::new(score).unwrap(),
            &GeometryMap::new(geometry).unwrap(),
            DEFAULT_SCORE_THRESHOLD,
        );
        assert_eq!(candidates.len(), 2);

        // end = (0 + 8.78, 0 - 4.79), truncated towards zero
        assert_eq!(candidates[0].rect, TextRect::new(-2, -4, 8, -4));
        // end = (8 + 5.27 + 1.92, 4 - 2.88 + 3.51)
        assert_eq!(candidates[1].rect, TextRect::new(6, -2, 15, 4));
    }

    #[test]
    fn raster_order_and_degenerate_boxes_are_kept() {
        let (mut score, geometry) = maps(3, 3);
        score[[0, 0, 2, 0]] = 0.4;
        score[[0, 0, 0, 2]] = 0.8;
        score[[0, 0, 0, 1]] = 0.3;

        let candidates = decode(
            &ScoreMap::new(score).unwrap(),
            &GeometryMap::new(geometry).unwrap(),
            DEFAULT_SCORE_THRESHOLD,
        );

        let confidences = candidates.iter().map(|it| it.confidence).collect::<Vec<_>>();
        assert_eq!(confidences, vec![0.3, 0.8, 0.4]);
        // zero geometry collapses every box to a point
        assert!(candidates.iter().all(|it| it.rect.is_degenerate()));
        assert_eq!(candidates[1].rect, TextRect::new(8, 0, 8, 0));
    }

    #[test]
    fn infinite_geometry_decodes_to_empty_box() {
        let (mut score, mut geometry) = maps(80, 80);
        score[[0, 0, 10, 10]] = 0.9;
        score[[0, 0, 20, 5]] = 0.9;
        set_cell(&mut geometry, 10, 10, [10.0, f32::INFINITY, 10.0, f32::INFINITY, 0.0]);
        set_cell(&mut geometry, 20, 5, [10.0, 20.0, 10.0, 20.0, f32::NAN]);

        let candidates = decode(
            &ScoreMap::new(score).unwrap(),
            &GeometryMap::new(geometry).unwrap(),
            DEFAULT_SCORE_THRESHOLD,
        );

        assert_eq!(candidates[0].rect, TextRect::new(40, 40, 40, 40));
        assert_eq!(candidates[1].rect, TextRect::new(20, 80, 20, 80));
        assert!(candidates.iter().all(|it| it.rect.is_degenerate()));
        assert!(crate::nms::suppress(&candidates, 0.2, 0.4).is_empty());
    }

    #[test]
    fn huge_geometry_saturates_without_overflow() {
        let (mut score, mut geometry) = maps(80, 80);
        score[[0, 0, 10, 10]] = 0.9;
        set_cell(&mut geometry, 10, 10, [10.0, 1e12, 10.0, 1e12, 0.0]);

        let candidates = decode(
            &ScoreMap::new(score).unwrap(),
            &GeometryMap::new(geometry).unwrap(),
            DEFAULT_SCORE_THRESHOLD,
        );

        let rect = candidates[0].rect;
        assert_eq!(rect, TextRect::new(i32::MIN, 30, i32::MAX, 50));
        assert_eq!(rect.width(), u32::MAX as i64);
        assert_eq!(crate::nms::suppress(&candidates, 0.2, 0.4), vec![0]);
    }
}
