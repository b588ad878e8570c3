use float_ord::FloatOrd;
use geo::{coord, Area, Intersects, Rect};
use tracing::instrument;

use crate::{Candidate, TextRect};

pub const DEFAULT_NMS_SCORE_THRESHOLD: f32 = 0.2;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.4;

/// Intersection over union of two rectangles, ignoring any rotation.
pub fn iou(a: &TextRect, b: &TextRect) -> f32 {
    if a.is_degenerate() || b.is_degenerate() {
        return 0.0;
    }
    let (a, b) = (a.to_geo(), b.to_geo());
    if !a.intersects(&b) {
        return 0.0;
    }
    let overlap = Rect::new(
        coord! { x: a.min().x.max(b.min().x), y: a.min().y.max(b.min().y) },
        coord! { x: a.max().x.min(b.max().x), y: a.max().y.min(b.max().y) },
    );
    let intersection = overlap.unsigned_area();
    let union = a.unsigned_area() + b.unsigned_area() - intersection;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Greedy non-maximum suppression.
///
/// Returns indices into `candidates` of the kept boxes, highest confidence
/// first. Equal confidences keep their decode order. Candidates below
/// `score_threshold` or without area never take part.
#[instrument(level = "debug", skip(candidates), fields(candidates = candidates.len()))]
pub fn suppress(candidates: &[Candidate], score_threshold: f32, iou_threshold: f32) -> Vec<usize> {
    let mut order = candidates
        .iter()
        .enumerate()
        .filter(|(_, it)| it.confidence >= score_threshold && !it.rect.is_degenerate())
        .map(|(index, _)| index)
        .collect::<Vec<_>>();
    // stable
    order.sort_by_key(|index| std::cmp::Reverse(FloatOrd(candidates[*index].confidence)));

    let mut kept: Vec<usize> = Vec::new();
    for index in order {
        let rect = &candidates[index].rect;
        if kept
            .iter()
            .all(|&other| iou(rect, &candidates[other].rect) <= iou_threshold)
        {
            kept.push(index);
        }
    }
    log::debug!("Kept {} of {} candidates", kept.len(), candidates.len());
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(rect: (i32, i32, i32, i32), confidence: f32) -> Candidate {
        Candidate {
            rect: TextRect::new(rect.0, rect.1, rect.2, rect.3),
            confidence,
        }
    }

    #[test]
    fn iou_of_known_overlap() {
        let a = TextRect::new(0, 0, 10, 10);
        let b = TextRect::new(5, 0, 15, 10);
        // 50 / 150
        assert!((iou(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(iou(&a, &a), 1.0);
        assert_eq!(iou(&a, &TextRect::new(10, 0, 20, 10)), 0.0);
        assert_eq!(iou(&a, &TextRect::new(30, 30, 40, 40)), 0.0);
    }

    #[test]
    fn empty_input_keeps_nothing() {
        assert!(suppress(&[], 0.2, 0.4).is_empty());
    }

    #[test]
    fn overlapping_lower_confidence_is_removed() {
        // 0.5 box shares 15 of the 0.9 box's 20 columns: IoU = 150 / 250
        let candidates = [
            candidate((5, 0, 25, 10), 0.5),
            candidate((0, 0, 20, 10), 0.9),
        ];
        assert!((iou(&candidates[0].rect, &candidates[1].rect) - 0.6).abs() < 1e-6);
        assert_eq!(suppress(&candidates, 0.2, 0.4), vec![1]);
    }

    #[test]
    fn iou_at_threshold_is_kept() {
        // IoU exactly 0.25
        let candidates = [
            candidate((0, 0, 10, 10), 0.9),
            candidate((6, 0, 16, 10), 0.8),
        ];
        assert_eq!(suppress(&candidates, 0.2, 0.25), vec![0, 1]);
    }

    #[test]
    fn score_threshold_and_degenerate_filtering() {
        let candidates = [
            candidate((0, 0, 10, 10), 0.1),
            candidate((50, 50, 50, 60), 0.9),
            candidate((20, 20, 10, 30), 0.9),
            candidate((100, 100, 110, 110), 0.2),
        ];
        assert_eq!(suppress(&candidates, 0.2, 0.4), vec![3]);
    }

    #[test]
    fn extreme_corners_do_not_overflow() {
        let candidates = [
            candidate((i32::MIN, 0, i32::MAX, 10), 0.9),
            candidate((0, 0, 10, 10), 0.8),
            candidate((i32::MAX, i32::MAX, i32::MIN, i32::MIN), 0.95),
        ];
        assert!(iou(&candidates[0].rect, &candidates[1].rect) < 1e-6);
        assert_eq!(suppress(&candidates, 0.2, 0.4), vec![0, 1]);
    }

    #[test]
    fn ties_keep_decode_order() {
        let candidates = [
            candidate((0, 0, 10, 10), 0.7),
            candidate((100, 0, 110, 10), 0.9),
            candidate((200, 0, 210, 10), 0.7),
            candidate((1, 1, 11, 11), 0.7),
        ];
        // index 3 overlaps index 0 with IoU 81 / 119
        assert_eq!(suppress(&candidates, 0.2, 0.4), vec![1, 0, 2]);
    }

    #[test]
    fn kept_boxes_never_overlap_beyond_threshold() {
        let candidates = (0..40)
            .map(|i| {
                let x = (i * 7) % 60;
                let y = (i * 13) % 50;
                candidate((x, y, x + 20, y + 12), 0.2 + (i % 9) as f32 * 0.08)
            })
            .collect::<Vec<_>>();
        let kept = suppress(&candidates, 0.2, 0.4);
        assert!(kept.len() <= candidates.len());
        for (i, a) in kept.iter().enumerate() {
            for b in &kept[i + 1..] {
                assert_ne!(a, b);
                assert!(iou(&candidates[*a].rect, &candidates[*b].rect) <= 0.4);
            }
        }
        let confidences = kept.iter().map(|i| candidates[*i].confidence).collect::<Vec<_>>();
        assert!(confidences.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn suppression_is_idempotent() {
        let candidates = (0..30)
            .map(|i| {
                let x = (i * 11) % 70;
                let y = (i * 5) % 40;
                candidate((x, y, x + 18, y + 15), 0.9 - (i % 7) as f32 * 0.1)
            })
            .collect::<Vec<_>>();
        let kept = suppress(&candidates, 0.2, 0.4);
        let survivors = kept.iter().map(|i| candidates[*i]).collect::<Vec<_>>();
        let again = suppress(&survivors, 0.2, 0.4);
        assert_eq!(again, (0..survivors.len()).collect::<Vec<_>>());
    }
}
