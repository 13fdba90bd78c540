//! 画像の前処理
//!
//! 画像ファイルを読み込み、モデル入力サイズへリサイズして
//! (C, H, W) 順に平坦化したf32配列を作ります。

use std::path::Path;

use image::{imageops::FilterType, RgbImage};

use crate::error::{Error, Result};
use crate::model::config::Normalization;

/// ImageNetの平均
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNetの標準偏差
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 画像を読み込んでモデル入力用の配列を作成
///
/// # 引数
/// - `path`: 画像ファイルのパス
/// - `size`: モデル入力サイズ（正方形）
/// - `normalization`: 画素値の正規化方法
///
/// # 戻り値
/// - RGB画像データ (C, H, W) の順で平坦化、長さ `3 * size * size`
pub fn load_image_tensor_data(
    path: &Path,
    size: u32,
    normalization: Normalization,
) -> Result<Vec<f32>> {
    if !path.exists() {
        return Err(Error::ImageNotFound(path.to_path_buf()));
    }

    let img = image::open(path)
        .map_err(|source| Error::Image {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8();
    let (width, height) = img.dimensions();
    tracing::debug!("decoded {} ({}x{})", path.display(), width, height);

    Ok(image_to_chw(&resize_square(&img, size), normalization))
}

/// 正方形にリサイズ（最近傍補間、縦横比は保持しない）
pub fn resize_square(img: &RgbImage, size: u32) -> RgbImage {
    if img.dimensions() == (size, size) {
        return img.clone();
    }
    image::imageops::resize(img, size, size, FilterType::Nearest)
}

/// RGB画像を (C, H, W) 順のf32配列に変換
pub fn image_to_chw(img: &RgbImage, normalization: Normalization) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let mut data = Vec::with_capacity(3 * (width * height) as usize);

    for channel in 0..3 {
        for y in 0..height {
            for x in 0..width {
                let value = img.get_pixel(x, y)[channel] as f32;
                data.push(normalize(value, channel, normalization));
            }
        }
    }

    data
}

fn normalize(value: f32, channel: usize, normalization: Normalization) -> f32 {
    match normalization {
        Normalization::Raw => value,
        Normalization::UnitRange => value / 255.0,
        Normalization::ImageNet => (value / 255.0 - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_chw_layout() {
        // 2x1画像: 左が赤、右が青
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 0, 255]));

        let data = image_to_chw(&img, Normalization::Raw);
        assert_eq!(data, vec![255.0, 0.0, 0.0, 0.0, 0.0, 255.0]);
    }

    #[test]
    fn test_normalization() {
        let img = RgbImage::from_pixel(1, 1, Rgb([255, 0, 51]));

        let unit = image_to_chw(&img, Normalization::UnitRange);
        assert_eq!(unit, vec![1.0, 0.0, 0.2]);

        let imagenet = image_to_chw(&img, Normalization::ImageNet);
        assert!((imagenet[0] - (1.0 - 0.485) / 0.229).abs() < 1e-5);
        assert!((imagenet[1] - (-0.456 / 0.224)).abs() < 1e-5);
    }

    #[test]
    fn test_load_resizes_to_model_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf.png");
        RgbImage::from_pixel(40, 20, Rgb([10, 200, 30]))
            .save(&path)
            .unwrap();

        let data = load_image_tensor_data(&path, 16, Normalization::Raw).unwrap();
        assert_eq!(data.len(), 3 * 16 * 16);
        assert_eq!(data[0], 10.0);
        assert_eq!(data[16 * 16], 200.0);
        assert_eq!(data[2 * 16 * 16], 30.0);
    }

    #[test]
    fn test_missing_and_corrupt_images() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.jpg");
        assert!(matches!(
            load_image_tensor_data(&missing, 16, Normalization::Raw),
            Err(Error::ImageNotFound(_))
        ));

        let corrupt = dir.path().join("corrupt.png");
        std::fs::write(&corrupt, b"not an image").unwrap();
        assert!(matches!(
            load_image_tensor_data(&corrupt, 16, Normalization::Raw),
            Err(Error::Image { .. })
        ));
    }
}
