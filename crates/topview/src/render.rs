//! Top-view rendering on `image` buffers.

use topview_calib::CalibrationResult;
use topview_core::{warp_perspective_gray, GrayImageView};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Borrow an `image::GrayImage` as a core view.
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Warp a camera frame into the top view, same size as the input.
///
/// Uses the inverse warp to look up each top-view pixel in the camera image.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(img, result), fields(width = img.width(), height = img.height()))
)]
pub fn render_top_view(img: &::image::GrayImage, result: &CalibrationResult) -> ::image::GrayImage {
    let out = warp_perspective_gray(
        &gray_view(img),
        &result.warps.inverse,
        img.width() as usize,
        img.height() as usize,
    );
    ::image::GrayImage::from_raw(out.width as u32, out.height as u32, out.data)
        .unwrap_or_else(|| ::image::GrayImage::new(img.width(), img.height()))
}
