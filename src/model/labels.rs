//! クラス名リスト
//!
//! JSON配列として保存されたクラス名を読み込みます。
//! リストのi番目はモデル出力ベクトルのi番目に対応します。

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// 作物名と症状名の区切り（例: `Tomato___Late_blight`）
const CROP_SEPARATOR: &str = "___";

/// 順序付きクラス名リスト
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelList(Vec<String>);

impl LabelList {
    /// 検証済みのリストを作成
    pub fn new(labels: Vec<String>) -> std::result::Result<Self, String> {
        if labels.is_empty() {
            return Err("label list is empty".to_string());
        }

        let mut seen = HashSet::new();
        for (index, label) in labels.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(format!("label at index {} is empty", index));
            }
            if !seen.insert(label.as_str()) {
                return Err(format!("duplicate label '{}' at index {}", label, index));
            }
        }

        Ok(Self(labels))
    }

    /// JSONファイルから読み込む
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::LabelsNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let labels: Vec<String> =
            serde_json::from_str(&content).map_err(|e| Error::InvalidLabels {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let list = Self::new(labels).map_err(|reason| Error::InvalidLabels {
            path: path.to_path_buf(),
            reason,
        })?;
        tracing::debug!("loaded {} labels from {}", list.len(), path.display());
        Ok(list)
    }

    /// JSONファイルに保存
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.0).map_err(|e| Error::InvalidLabels {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        fs::write(path, json).map_err(|e| Error::io(path, e))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// インデックスからラベルを取得
    pub fn get(&self, index: usize) -> Option<ClassLabel<'_>> {
        self.0.get(index).map(|name| ClassLabel(name.as_str()))
    }
}

/// 1つのクラス名
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassLabel<'a>(&'a str);

impl<'a> ClassLabel<'a> {
    /// 元のクラス名
    pub fn as_str(&self) -> &'a str {
        self.0
    }

    /// 作物名（区切りがなければクラス名全体）
    pub fn crop(&self) -> String {
        let crop = self.0.split(CROP_SEPARATOR).next().unwrap_or(self.0);
        humanize(crop)
    }

    /// 症状名（区切りがなければ None）
    pub fn condition(&self) -> Option<String> {
        self.0
            .split_once(CROP_SEPARATOR)
            .map(|(_, condition)| humanize(condition))
    }

    /// 表示用の名前
    ///
    /// `Tomato___Late_blight` → `Tomato - Late blight`
    pub fn display_name(&self) -> String {
        match self.condition() {
            Some(condition) => format!("{} - {}", self.crop(), condition),
            None => humanize(self.0),
        }
    }

    /// 健康な葉のクラスかどうか
    pub fn is_healthy(&self) -> bool {
        self.0.to_lowercase().contains("healthy")
    }
}

impl std::fmt::Display for ClassLabel<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// アンダースコアを空白に置き換え、連続する空白をまとめる
fn humanize(raw: &str) -> String {
    raw.replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> LabelList {
        LabelList::new(names.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[test]
    fn test_display_name() {
        let list = labels(&[
            "Tomato___Late_blight",
            "Corn_(maize)___Northern_Leaf_Blight",
            "Background_without_leaves",
        ]);

        assert_eq!(list.get(0).unwrap().display_name(), "Tomato - Late blight");
        assert_eq!(
            list.get(1).unwrap().display_name(),
            "Corn (maize) - Northern Leaf Blight"
        );
        assert_eq!(list.get(2).unwrap().display_name(), "Background without leaves");
        assert_eq!(list.get(2).unwrap().condition(), None);
    }

    #[test]
    fn test_is_healthy() {
        let list = labels(&["Apple___healthy", "Apple___Apple_scab", "Healthy"]);
        assert!(list.get(0).unwrap().is_healthy());
        assert!(!list.get(1).unwrap().is_healthy());
        assert!(list.get(2).unwrap().is_healthy());
    }

    #[test]
    fn test_rejects_invalid_lists() {
        assert!(LabelList::new(vec![]).is_err());
        assert!(LabelList::new(vec!["a".into(), " ".into()]).is_err());
        assert!(LabelList::new(vec!["a".into(), "b".into(), "a".into()]).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("class_names.json");
        fs::write(&path, r#"["Potato___Early_blight", "Potato___healthy"]"#).unwrap();

        let list = LabelList::load(&path).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(1).unwrap().as_str(), "Potato___healthy");
        assert!(list.get(2).is_none());
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            LabelList::load(&missing),
            Err(Error::LabelsNotFound(_))
        ));

        let not_array = dir.path().join("object.json");
        fs::write(&not_array, r#"{"0": "Tomato___healthy"}"#).unwrap();
        assert!(matches!(
            LabelList::load(&not_array),
            Err(Error::InvalidLabels { .. })
        ));
    }
}
