//! モデルメタデータを使用した推論設定
//!
//! 保存されたモデルメタデータを読み込んで推論に必要な情報を取得します。

use std::path::Path;

use crate::error::{Error, Result};
use crate::ml::ml_model::ClassifierConfig;
use crate::model::config::{Normalization, Precision};
use crate::model::labels::{ClassLabel, LabelList};
use crate::model::model_metadata::ModelMetadata;

/// モデルメタデータから推論用情報を取得
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// 全クラスラベル（モデル出力の順序）
    pub labels: LabelList,

    /// モデル構成
    pub architecture: ClassifierConfig,

    /// モデル入力解像度
    pub image_size: u32,

    /// 画素値の正規化方法
    pub normalization: Normalization,

    /// 重み精度
    pub precision: Precision,
}

impl InferenceConfig {
    /// メタデータからInferenceConfigを作成
    pub fn from_metadata(metadata: &ModelMetadata) -> Self {
        Self {
            labels: metadata.labels.clone(),
            architecture: metadata.architecture.clone(),
            image_size: metadata.image_size,
            normalization: metadata.normalization,
            precision: metadata.precision,
        }
    }

    /// 外部のクラス名リストが埋め込みラベルと一致するか確認
    pub fn verify_labels(&self, external: &LabelList, external_path: &Path) -> Result<()> {
        if external.len() != self.num_total_classes() {
            return Err(Error::LabelMismatch {
                labels: external.len(),
                outputs: self.num_total_classes(),
            });
        }
        if external != &self.labels {
            return Err(Error::EmbeddedLabelMismatch {
                path: external_path.to_path_buf(),
            });
        }
        Ok(())
    }

    /// すべてのクラス数を取得
    pub fn num_total_classes(&self) -> usize {
        self.architecture.num_classes
    }

    /// クラスインデックスからラベルを取得
    pub fn class_index_to_label(&self, index: usize) -> Option<ClassLabel<'_>> {
        self.labels.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> InferenceConfig {
        let labels = LabelList::new(vec![
            "Peach___Bacterial_spot".to_string(),
            "Peach___healthy".to_string(),
        ])
        .unwrap();
        let metadata = ModelMetadata::new(
            labels,
            ClassifierConfig::new(2),
            128,
            Normalization::Raw,
            Precision::Full,
            "trained.mpk".to_string(),
            0,
        );
        InferenceConfig::from_metadata(&metadata)
    }

    #[test]
    fn test_index_lookup() {
        let config = config();
        assert_eq!(
            config.class_index_to_label(1).map(|l| l.as_str()),
            Some("Peach___healthy")
        );
        assert!(config.class_index_to_label(2).is_none());
    }

    #[test]
    fn test_verify_labels() {
        let config = config();
        let path = Path::new("class_names.json");

        let same = config.labels.clone();
        assert!(config.verify_labels(&same, path).is_ok());

        let shorter = LabelList::new(vec!["Peach___healthy".to_string()]).unwrap();
        assert!(matches!(
            config.verify_labels(&shorter, path),
            Err(Error::LabelMismatch { labels: 1, outputs: 2 })
        ));

        let reordered = LabelList::new(vec![
            "Peach___healthy".to_string(),
            "Peach___Bacterial_spot".to_string(),
        ])
        .unwrap();
        assert!(matches!(
            config.verify_labels(&reordered, path),
            Err(Error::EmbeddedLabelMismatch { .. })
        ));
    }
}
