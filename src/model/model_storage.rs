//! モデルとメタデータの永続化
//!
//! Tar.gz形式でモデルとメタデータを1ファイルに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（クラス名、入力サイズ、精度など）
//! - model.bin       - モデルの重み（バイナリ）

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};

use crate::error::{Error, Result};
use crate::model::model_metadata::ModelMetadata;

const METADATA_ENTRY: &str = "metadata.json";
const MODEL_ENTRY: &str = "model.bin";

/// 保存先のパスを決定
///
/// すでに .gz で終わっている場合はそのまま、そうでなければ .tar.gz を付与します。
pub fn archive_path(output_path: &Path) -> PathBuf {
    if output_path.extension().and_then(|s| s.to_str()) == Some("gz") {
        output_path.to_path_buf()
    } else {
        output_path.with_extension("tar.gz")
    }
}

/// メタデータと共にモデルをTar.gz形式で保存
///
/// 1つのtar.gzファイルに以下を含む：
/// - metadata.json : メタデータ
/// - model.bin : モデルの重み
///
/// 実際に書き込んだパスを返します。
pub fn save_model_with_metadata(
    output_path: &Path,
    metadata: &ModelMetadata,
    model_binary: &[u8],
) -> Result<PathBuf> {
    let tar_gz_path = archive_path(output_path);

    // 親ディレクトリが存在しない場合は作成
    if let Some(parent) = tar_gz_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
    }

    let json_str = metadata.to_json_string()?;

    let tar_gz_file = File::create(&tar_gz_path).map_err(|e| Error::io(&tar_gz_path, e))?;
    let encoder = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    append_entry(&mut tar_builder, METADATA_ENTRY, json_str.as_bytes())
        .map_err(|e| Error::io(&tar_gz_path, e))?;
    append_entry(&mut tar_builder, MODEL_ENTRY, model_binary)
        .map_err(|e| Error::io(&tar_gz_path, e))?;

    // tarアーカイブを完成させ、gzipストリームを閉じる
    tar_builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(|e| Error::io(&tar_gz_path, e))?;

    tracing::debug!(
        "saved {} ({} byte model)",
        tar_gz_path.display(),
        model_binary.len()
    );
    Ok(tar_gz_path)
}

fn append_entry<W: std::io::Write>(
    builder: &mut Builder<W>,
    name: &str,
    data: &[u8],
) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, data)
}

fn open_archive(tar_gz_path: &Path) -> Result<Archive<GzDecoder<File>>> {
    if !tar_gz_path.exists() {
        return Err(Error::ModelNotFound(tar_gz_path.to_path_buf()));
    }
    let tar_gz_file = File::open(tar_gz_path).map_err(|e| Error::io(tar_gz_path, e))?;
    Ok(Archive::new(GzDecoder::new(tar_gz_file)))
}

fn invalid(path: &Path, reason: impl Into<String>) -> Error {
    Error::InvalidArchive {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Tar.gzからモデルメタデータを読み込む
pub fn load_metadata(tar_gz_path: &Path) -> Result<ModelMetadata> {
    let mut archive = open_archive(tar_gz_path)?;
    let entries = archive
        .entries()
        .map_err(|e| invalid(tar_gz_path, e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| invalid(tar_gz_path, e.to_string()))?;
        let is_metadata = entry
            .path()
            .map_err(|e| invalid(tar_gz_path, e.to_string()))?
            .to_str()
            == Some(METADATA_ENTRY);

        if is_metadata {
            let mut json_str = String::new();
            entry
                .read_to_string(&mut json_str)
                .map_err(|e| invalid(tar_gz_path, e.to_string()))?;
            return ModelMetadata::from_json_string(&json_str).map_err(|e| e.at(tar_gz_path));
        }
    }

    Err(invalid(tar_gz_path, "metadata.json not found in tar.gz archive"))
}

/// メタデータとモデルバイナリを共に読み込む
pub fn load_model_with_metadata(tar_gz_path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    let mut archive = open_archive(tar_gz_path)?;
    let entries = archive
        .entries()
        .map_err(|e| invalid(tar_gz_path, e.to_string()))?;

    let mut metadata_opt: Option<ModelMetadata> = None;
    let mut model_binary_opt: Option<Vec<u8>> = None;

    // 両方のファイルを読み込む
    for entry in entries {
        let mut entry = entry.map_err(|e| invalid(tar_gz_path, e.to_string()))?;
        let name = entry
            .path()
            .map_err(|e| invalid(tar_gz_path, e.to_string()))?
            .to_str()
            .map(str::to_owned);

        match name.as_deref() {
            Some(METADATA_ENTRY) => {
                let mut json_str = String::new();
                entry
                    .read_to_string(&mut json_str)
                    .map_err(|e| invalid(tar_gz_path, e.to_string()))?;
                metadata_opt = Some(
                    ModelMetadata::from_json_string(&json_str).map_err(|e| e.at(tar_gz_path))?,
                );
            }
            Some(MODEL_ENTRY) => {
                let mut buffer = Vec::new();
                entry
                    .read_to_end(&mut buffer)
                    .map_err(|e| invalid(tar_gz_path, e.to_string()))?;
                model_binary_opt = Some(buffer);
            }
            _ => {}
        }
    }

    match (metadata_opt, model_binary_opt) {
        (Some(metadata), Some(binary)) => Ok((metadata, binary)),
        (None, _) => Err(invalid(tar_gz_path, "metadata.json not found in tar.gz archive")),
        (_, None) => Err(invalid(tar_gz_path, "model.bin not found in tar.gz archive")),
    }
}

/// メタデータをコンソールに表示
pub fn print_metadata_info(metadata: &ModelMetadata) {
    println!("\n=== モデルメタデータ ===");
    println!("形式バージョン: {}", metadata.format_version);
    println!("クラス数: {}", metadata.labels.len());
    println!("モデル入力サイズ: {}x{}", metadata.image_size, metadata.image_size);
    println!("正規化: {:?}", metadata.normalization);
    println!("重み精度: {}", metadata.precision);
    println!("基本チャネル数: {}", metadata.architecture.base_channels);
    println!("パラメータ数: {}", metadata.num_params);
    println!("変換元: {}", metadata.source_model);
    println!("変換日時: {}", metadata.converted_at);
    println!("========================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::ml_model::ClassifierConfig;
    use crate::model::config::{Normalization, Precision};
    use crate::model::labels::LabelList;

    fn sample_metadata() -> ModelMetadata {
        let labels = LabelList::new(vec![
            "Grape___Black_rot".to_string(),
            "Grape___Esca_(Black_Measles)".to_string(),
            "Grape___healthy".to_string(),
        ])
        .unwrap();
        ModelMetadata::new(
            labels,
            ClassifierConfig::new(3),
            128,
            Normalization::Raw,
            Precision::Half,
            "trained.mpk".to_string(),
            42,
        )
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested").join("model.tar.gz");
        let binary = vec![7u8; 300];

        let written = save_model_with_metadata(&output, &sample_metadata(), &binary).unwrap();
        assert_eq!(written, output);

        let (metadata, loaded) = load_model_with_metadata(&written).unwrap();
        assert_eq!(metadata.labels.len(), 3);
        assert_eq!(loaded, binary);

        assert_eq!(load_metadata(&written).unwrap().num_params, 42);
    }

    #[test]
    fn test_archive_path_appends_extension() {
        assert_eq!(
            archive_path(Path::new("model/model")),
            PathBuf::from("model/model.tar.gz")
        );
        assert_eq!(
            archive_path(Path::new("model/model.tar.gz")),
            PathBuf::from("model/model.tar.gz")
        );
    }

    #[test]
    fn test_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("model.tar.gz");
        assert!(matches!(
            load_model_with_metadata(&missing),
            Err(Error::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_not_an_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.tar.gz");
        std::fs::write(&path, b"definitely not gzip").unwrap();

        let err = load_model_with_metadata(&path).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Format);
    }
}
