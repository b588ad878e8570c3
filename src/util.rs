use image::{DynamicImage, Pixel, Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use ndarray::{Array3, Array4};
use tracing::instrument;

use crate::{error::RegionError, DetectionResult, TextRect};

/// `[1, height, width, 3]` tensor of `(pixel - mean) * norm`, pixels in 0..=255.
#[instrument(level = "debug", skip(image))]
pub(crate) fn to_nhwc_tensor(
    image: &DynamicImage,
    mean_vals: &[f32; 3],
    norm_vals: &[f32; 3],
) -> Array4<f32> {
    let image = image.to_rgb32f();
    Array4::<f32>::from_shape_fn(
        (1, image.height() as usize, image.width() as usize, 3),
        |(_, y, x, ch)| {
            let pixel = image.get_pixel(x as u32, y as u32).channels()[ch] * 255.0;
            (pixel - mean_vals[ch]) * norm_vals[ch]
        },
    )
}

/// `[3, height, width]` tensor of `(pixel * norm) - (mean * norm)`, pixels in 0..=1.
#[instrument(level = "debug", skip(image))]
pub(crate) fn subtract_mean_normalize(
    image: &DynamicImage,
    mean_vals: &[f32; 3],
    norm_vals: &[f32; 3],
) -> Array3<f32> {
    let mut image = image.to_rgb32f();
    let norm = Rgb::<f32>(*norm_vals);
    let mean_vals = Rgb::<f32>(*mean_vals).map2(&norm, |c1, c2| c1 * c2);
    for pixel in image.pixels_mut() {
        *pixel = pixel
            .map2(&norm, |c1, c2| c1 * c2)
            .map2(&mean_vals, |c1, c2| c1 - c2);
    }
    Array3::<f32>::from_shape_fn(
        (3, image.height() as usize, image.width() as usize),
        |(ch, y, x)| image.get_pixel(x as u32, y as u32).channels()[ch],
    )
}

/// Cuts `rect` out of `image`.
///
/// The rectangle is intersected with the image first, so coordinates the
/// mapper left unclamped never index outside the pixel buffer.
#[instrument(level = "trace", skip(image))]
pub fn crop_region(image: &DynamicImage, rect: &TextRect) -> Result<DynamicImage, RegionError> {
    let width = image.width() as i64;
    let height = image.height() as i64;
    let left = (rect.left as i64).clamp(0, width);
    let top = (rect.top as i64).clamp(0, height);
    let right = (rect.right as i64).clamp(0, width);
    let bottom = (rect.bottom as i64).clamp(0, height);
    if right <= left || bottom <= top {
        return Err(RegionError::Degenerate { rect: *rect });
    }
    log::trace!("Slicing subimage to ({left}, {top}, {right}, {bottom})");
    Ok(image.crop_imm(
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    ))
}

/// Draws every result's rectangle in red on a copy of `image`.
pub fn draw_detections(image: &DynamicImage, results: &[DetectionResult]) -> RgbImage {
    const RED: Rgb<u8> = Rgb([255, 0, 0]);
    const STROKE: i64 = 2;
    let mut canvas = image.to_rgb8();
    let (canvas_width, canvas_height) = (canvas.width() as i64, canvas.height() as i64);
    for result in results {
        // edges pulled in from far outside stay off the canvas
        let clamp_x = |x: i32| (x as i64).clamp(-STROKE, canvas_width + STROKE);
        let clamp_y = |y: i32| (y as i64).clamp(-STROKE, canvas_height + STROKE);
        let (left, top) = (clamp_x(result.rect.left), clamp_y(result.rect.top));
        let (right, bottom) = (clamp_x(result.rect.right), clamp_y(result.rect.bottom));
        for inset in 0..STROKE {
            let (width, height) = (right - left - 2 * inset, bottom - top - 2 * inset);
            if width <= 0 || height <= 0 {
                break;
            }
            let rect = Rect::at((left + inset) as i32, (top + inset) as i32)
                .of_size(width as u32, height as u32);
            draw_hollow_rect_mut(&mut canvas, rect, RED);
        }
    }
    canvas
}
