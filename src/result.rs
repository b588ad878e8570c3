use geo::{coord, Rect};

/// Axis-aligned integer rectangle as `(left, top, right, bottom)`.
///
/// Unlike [`geo::Rect`] this does not normalize its corners, so an inverted
/// rectangle coming out of box decoding stays inverted and can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl TextRect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Widened so that extreme corners cannot overflow.
    pub fn width(&self) -> i64 {
        self.right as i64 - self.left as i64
    }

    pub fn height(&self) -> i64 {
        self.bottom as i64 - self.top as i64
    }

    /// True when the rectangle encloses no pixels.
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub(crate) fn to_geo(self) -> Rect<f32> {
        Rect::new(
            coord! { x: self.left as f32, y: self.top as f32 },
            coord! { x: self.right as f32, y: self.bottom as f32 },
        )
    }
}

/// A decoded box in model-input pixels, before suppression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub rect: TextRect,
    pub confidence: f32,
}

/// A detected region in source-image pixels and the text read from it.
///
/// `text` is empty when recognition failed for this region.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub rect: TextRect,
    pub confidence: f32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub character_scores: Vec<f32>,
}
