//! モデルメタデータの定義と永続化
//!
//! tar.gz形式の軽量モデルに同梱するメタデータです。
//! クラス名リストをモデルと同じファイルに埋め込むことで、
//! 出力インデックスとラベルの対応を推論時に検証できるようにします。

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ml::ml_model::{ClassifierConfig, MIN_IMAGE_SIZE};
use crate::model::config::{Normalization, Precision};
use crate::model::labels::LabelList;

/// 現在のメタデータ形式バージョン
pub const FORMAT_VERSION: u32 = 1;

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// メタデータ形式バージョン
    pub format_version: u32,

    /// 全クラスラベル（モデル出力の順序）
    /// 例: ["Apple___Apple_scab", "Apple___Black_rot", ..., "Tomato___healthy"]
    pub labels: LabelList,

    /// モデル構成（推論時に同じ構成でモデルを組み立てる）
    pub architecture: ClassifierConfig,

    /// モデル入力サイズ（正方形、通常128）
    pub image_size: u32,

    /// 画素値の正規化方法
    pub normalization: Normalization,

    /// model.bin の重み精度
    pub precision: Precision,

    /// 変換元の学習済みモデルのパス
    pub source_model: String,

    /// パラメータ総数
    pub num_params: usize,

    /// 変換時刻（RFC3339形式）
    pub converted_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(
        labels: LabelList,
        architecture: ClassifierConfig,
        image_size: u32,
        normalization: Normalization,
        precision: Precision,
        source_model: String,
        num_params: usize,
    ) -> Self {
        let converted_at = chrono::Local::now().to_rfc3339();

        Self {
            format_version: FORMAT_VERSION,
            labels,
            architecture,
            image_size,
            normalization,
            precision,
            source_model,
            num_params,
            converted_at,
        }
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize metadata to JSON: {}", e)))
    }

    /// JSON文字列からメタデータを生成
    ///
    /// 形式バージョン、ラベル数、入力サイズの整合性もここで確認します。
    pub fn from_json_string(json: &str) -> std::result::Result<Self, MetadataError> {
        let metadata: Self = serde_json::from_str(json).map_err(MetadataError::Json)?;

        if metadata.format_version != FORMAT_VERSION {
            return Err(MetadataError::Version(metadata.format_version));
        }
        if metadata.labels.len() != metadata.architecture.num_classes {
            return Err(MetadataError::Inconsistent(format!(
                "{} labels for {} model outputs",
                metadata.labels.len(),
                metadata.architecture.num_classes
            )));
        }
        if (metadata.image_size as usize) < MIN_IMAGE_SIZE {
            return Err(MetadataError::Inconsistent(format!(
                "image_size {} is below the minimum of {}",
                metadata.image_size, MIN_IMAGE_SIZE
            )));
        }

        Ok(metadata)
    }
}

/// metadata.json の解析エラー（アーカイブのパスは呼び出し側で付与する）
#[derive(Debug)]
pub enum MetadataError {
    Json(serde_json::Error),
    Version(u32),
    Inconsistent(String),
}

impl MetadataError {
    pub(crate) fn at(self, path: &std::path::Path) -> Error {
        match self {
            MetadataError::Json(e) => Error::InvalidArchive {
                path: path.to_path_buf(),
                reason: format!("metadata.json: {}", e),
            },
            MetadataError::Version(found) => Error::UnsupportedFormat {
                found,
                expected: FORMAT_VERSION,
            },
            MetadataError::Inconsistent(reason) => Error::InvalidArchive {
                path: path.to_path_buf(),
                reason,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ModelMetadata {
        let labels = LabelList::new(vec![
            "Tomato___Early_blight".to_string(),
            "Tomato___healthy".to_string(),
        ])
        .unwrap();
        ModelMetadata::new(
            labels,
            ClassifierConfig::new(2).with_base_channels(8),
            64,
            Normalization::Raw,
            Precision::Half,
            "model/trained_plant_disease_model.mpk".to_string(),
            1234,
        )
    }

    #[test]
    fn test_json_roundtrip() {
        let metadata = sample();
        let json = metadata.to_json_string().unwrap();
        let restored = ModelMetadata::from_json_string(&json).unwrap();

        assert_eq!(restored.labels, metadata.labels);
        assert_eq!(restored.architecture.base_channels, 8);
        assert_eq!(restored.image_size, 64);
        assert_eq!(restored.precision, Precision::Half);
        assert_eq!(restored.converted_at, metadata.converted_at);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut metadata = sample();
        metadata.format_version = FORMAT_VERSION + 1;
        let json = metadata.to_json_string().unwrap();

        assert!(matches!(
            ModelMetadata::from_json_string(&json),
            Err(MetadataError::Version(v)) if v == FORMAT_VERSION + 1
        ));
    }

    #[test]
    fn test_rejects_label_count_mismatch() {
        let mut metadata = sample();
        metadata.architecture = ClassifierConfig::new(3);
        let json = metadata.to_json_string().unwrap();

        assert!(matches!(
            ModelMetadata::from_json_string(&json),
            Err(MetadataError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_rejects_tiny_image_size() {
        let mut metadata = sample();
        metadata.image_size = 4;
        let json = metadata.to_json_string().unwrap();

        assert!(matches!(
            ModelMetadata::from_json_string(&json),
            Err(MetadataError::Inconsistent(_))
        ));
    }
}
