//! ライブラリ共通のエラー型
//!
//! 失敗の種類（ファイル未検出・形式不正・不整合・推論失敗）ごとに
//! バリアントを分け、呼び出し側が文字列を解析せずに分岐できるようにします。

use std::path::PathBuf;

use burn::record::RecorderError;
use thiserror::Error;

/// ライブラリの結果型
pub type Result<T> = std::result::Result<T, Error>;

/// エラーの大分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 入力ファイルが存在しない
    NotFound,
    /// ファイルは読めたが内容が不正
    Format,
    /// ラベルとモデル出力の対応が取れない
    Mismatch,
    /// 推論実行時の失敗
    Inference,
    /// その他の入出力エラー
    Io,
    /// 設定の不備
    Config,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("source model not found: {}", .0.display())]
    SourceModelNotFound(PathBuf),

    #[error("compact model not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("label list not found: {}", .0.display())]
    LabelsNotFound(PathBuf),

    #[error("image not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid label list {}: {reason}", path.display())]
    InvalidLabels { path: PathBuf, reason: String },

    #[error("invalid model archive {}: {reason}", path.display())]
    InvalidArchive { path: PathBuf, reason: String },

    #[error("unsupported model format version {found} (expected {expected})")]
    UnsupportedFormat { found: u32, expected: u32 },

    #[error("invalid model architecture {}: {reason}", path.display())]
    InvalidArchitecture { path: PathBuf, reason: String },

    #[error("model record error: {0}")]
    Record(#[from] RecorderError),

    #[error("failed to decode image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("label list has {labels} entries but the model produces {outputs} scores")]
    LabelMismatch { labels: usize, outputs: usize },

    #[error("label list {} does not match the labels embedded in the model", path.display())]
    EmbeddedLabelMismatch { path: PathBuf },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("backend '{0}' is not enabled in this build")]
    BackendUnavailable(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// エラーの大分類を返す
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SourceModelNotFound(_)
            | Error::ModelNotFound(_)
            | Error::LabelsNotFound(_)
            | Error::ImageNotFound(_) => ErrorKind::NotFound,
            Error::InvalidLabels { .. }
            | Error::InvalidArchive { .. }
            | Error::UnsupportedFormat { .. }
            | Error::InvalidArchitecture { .. }
            | Error::Record(_)
            | Error::Image { .. } => ErrorKind::Format,
            Error::LabelMismatch { .. } | Error::EmbeddedLabelMismatch { .. } => {
                ErrorKind::Mismatch
            }
            Error::Inference(_) => ErrorKind::Inference,
            Error::Io { .. } => ErrorKind::Io,
            Error::BackendUnavailable(_) | Error::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            Error::ImageNotFound(PathBuf::from("leaf.jpg")).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            Error::LabelMismatch { labels: 3, outputs: 4 }.kind(),
            ErrorKind::Mismatch
        );
        assert_eq!(Error::Inference("boom".into()).kind(), ErrorKind::Inference);
        assert_eq!(Error::BackendUnavailable("wgpu").kind(), ErrorKind::Config);
    }

    #[test]
    fn test_message_contains_path() {
        let err = Error::ModelNotFound(PathBuf::from("model/model.tar.gz"));
        assert!(err.to_string().contains("model/model.tar.gz"));
    }
}
