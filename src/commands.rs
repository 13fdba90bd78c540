//! 変換・推論コマンド
//!
//! 設定で選ばれた計算デバイスに応じてバックエンドを切り替え、
//! 変換と推論の処理を呼び出します。

use std::path::Path;

use burn::backend::NdArray;
#[cfg(feature = "wgpu")]
use burn::backend::Wgpu;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::ml::{convert_model, ConversionPhase, ConversionReport, ConversionRequest, InferenceEngine, Prediction, RankedClass};
use crate::model::DeviceType;

/// 推論結果と上位クラス
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub prediction: Prediction,
    pub top: Vec<RankedClass>,
    pub display_name: String,
    pub healthy: bool,
}

/// 学習済みモデルを軽量形式に変換（デバイス選択付き）
pub fn run_conversion(
    device_type: DeviceType,
    request: &ConversionRequest,
    on_phase: impl FnMut(ConversionPhase),
) -> Result<ConversionReport> {
    tracing::debug!("converting on {}", device_type);
    match device_type {
        DeviceType::Cpu => convert_model::<NdArray<f32>>(request, &Default::default(), on_phase),
        #[cfg(feature = "wgpu")]
        DeviceType::Wgpu => convert_model::<Wgpu>(request, &Default::default(), on_phase),
        #[cfg(not(feature = "wgpu"))]
        DeviceType::Wgpu => Err(Error::BackendUnavailable("wgpu")),
    }
}

/// 画像1枚を分類（デバイス選択付き）
pub fn classify_image_file(
    device_type: DeviceType,
    model_path: &Path,
    labels_path: &Path,
    image_path: &Path,
    top_k: usize,
) -> Result<Classification> {
    tracing::debug!("classifying on {}", device_type);
    match device_type {
        DeviceType::Cpu => classify_with::<NdArray<f32>>(model_path, labels_path, image_path, top_k),
        #[cfg(feature = "wgpu")]
        DeviceType::Wgpu => classify_with::<Wgpu>(model_path, labels_path, image_path, top_k),
        #[cfg(not(feature = "wgpu"))]
        DeviceType::Wgpu => Err(Error::BackendUnavailable("wgpu")),
    }
}

fn classify_with<B: burn::tensor::backend::Backend>(
    model_path: &Path,
    labels_path: &Path,
    image_path: &Path,
    top_k: usize,
) -> Result<Classification> {
    let engine = InferenceEngine::<B>::load(model_path, labels_path, Default::default())?;
    let prediction = engine.classify_image(image_path)?;

    let labels = &engine.config().labels;
    let label = labels
        .get(prediction.index)
        .ok_or_else(|| Error::Inference(format!("class index {} is out of range", prediction.index)))?;

    Ok(Classification {
        top: prediction.top_k(top_k, labels),
        display_name: label.display_name(),
        healthy: label.is_healthy(),
        prediction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "wgpu"))]
    #[test]
    fn test_wgpu_unavailable_without_feature() {
        let dir = tempfile::tempdir().unwrap();
        let err = classify_image_file(
            DeviceType::Wgpu,
            &dir.path().join("model.tar.gz"),
            &dir.path().join("class_names.json"),
            &dir.path().join("leaf.jpg"),
            3,
        )
        .unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable("wgpu")));
    }

    #[test]
    fn test_missing_model_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = classify_image_file(
            DeviceType::Cpu,
            &dir.path().join("model.tar.gz"),
            &dir.path().join("class_names.json"),
            &dir.path().join("leaf.jpg"),
            3,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ModelNotFound(_)));
    }
}
