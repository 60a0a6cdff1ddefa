use anyhow::{bail, Context, Result};
use ndarray::Array4;
use opencv::{
    core::{Mat, Size, Vec3f, CV_32FC3},
    imgproc,
    prelude::*,
};

use super::raster::RasterImage;

/// MoveNet用の入力サイズ
pub const MOVENET_INPUT_SIZE: i32 = 192;

/// RGB ラスタを MoveNet用の入力テンソルに変換
///
/// - 192x192 にリサイズ（アスペクト比は保持しない）
/// - [1, 192, 192, 3] の f32 テンソルに変換 (0.0-255.0)
pub fn preprocess_for_movenet(frame: &RasterImage) -> Result<Array4<f32>> {
    if frame.is_empty() {
        bail!("empty frame");
    }
    let (width, height) = (frame.width as i32, frame.height as i32);
    let expected = frame.width as usize * frame.height as usize * 3;
    let Some(bytes) = frame.data.get(..expected) else {
        bail!(
            "frame buffer too small: {} < {} ({}x{})",
            frame.data.len(),
            expected,
            frame.width,
            frame.height
        );
    };

    // ラスタのバイト列をそのまま 3ch の Mat として扱う
    let flat = Mat::new_rows_cols_with_data(height, width * 3, bytes)?;
    let rgb = flat.reshape(3, height)?;

    let mut resized = Mat::default();
    imgproc::resize(
        &rgb,
        &mut resized,
        Size::new(MOVENET_INPUT_SIZE, MOVENET_INPUT_SIZE),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    let mut float_mat = Mat::default();
    resized.convert_to(&mut float_mat, CV_32FC3, 1.0, 0.0)?;

    let pixels = float_mat
        .data_typed::<Vec3f>()
        .context("resized frame is not continuous")?;
    let values: Vec<f32> = pixels.iter().flat_map(|px| [px[0], px[1], px[2]]).collect();
    let size = MOVENET_INPUT_SIZE as usize;
    Ok(Array4::from_shape_vec((1, size, size, 3), values)?)
}
