//! 学習済みモデルを軽量な推論用形式へ変換する
//!
//! フル精度の名前付きMessagePack（学習時の保存形式）を読み込み、
//! 指定精度のバイナリレコードとメタデータを tar.gz にまとめて保存します。

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{
        BinBytesRecorder, DefaultFileRecorder, FullPrecisionSettings, HalfPrecisionSettings,
        Recorder,
    },
    tensor::backend::Backend,
};

use crate::error::{Error, Result};
use crate::ml::ml_model::{ClassifierConfig, MIN_IMAGE_SIZE};
use crate::model::{save_model_with_metadata, AppConfig, LabelList, ModelMetadata, Normalization, Precision};

/// 変換の各段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionPhase {
    Load,
    Convert,
    Save,
}

impl fmt::Display for ConversionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionPhase::Load => write!(f, "Loading the trained model..."),
            ConversionPhase::Convert => write!(f, "Converting the model to the compact format..."),
            ConversionPhase::Save => write!(f, "Saving the compact model..."),
        }
    }
}

/// 変換の入力と出力
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// 学習済みモデル（.mpk）
    pub source_model: PathBuf,
    /// クラス名リスト
    pub labels: PathBuf,
    /// モデル構成ファイル（存在しなければ既定構成）
    pub architecture: PathBuf,
    /// 出力先（.tar.gz）
    pub output: PathBuf,
    pub image_size: u32,
    pub normalization: Normalization,
    pub precision: Precision,
}

impl ConversionRequest {
    /// 設定ファイルの内容から作成
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            source_model: config.paths.source_model.clone(),
            labels: config.paths.labels.clone(),
            architecture: config.paths.architecture.clone(),
            output: config.paths.compact_model.clone(),
            image_size: config.preprocessing.image_size,
            normalization: config.preprocessing.normalization,
            precision: config.converter.precision,
        }
    }
}

/// 変換結果
#[derive(Debug, Clone)]
pub struct ConversionReport {
    /// 実際に書き込んだパス
    pub output_path: PathBuf,
    pub num_params: usize,
    pub source_bytes: u64,
    pub compact_bytes: u64,
    pub metadata: ModelMetadata,
}

/// モデル構成を読み込む
///
/// ファイルがなければラベル数に合わせた既定構成を返します。
pub fn load_architecture(path: &Path, num_classes: usize) -> Result<ClassifierConfig> {
    if !path.exists() {
        tracing::debug!(
            "no architecture file at {}, using default layout",
            path.display()
        );
        return Ok(ClassifierConfig::new(num_classes));
    }

    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| Error::InvalidArchitecture {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn file_len(path: &Path) -> Result<u64> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| Error::io(path, e))
}

/// 学習済みモデルを軽量形式に変換して保存
///
/// `on_phase` は各段階の開始時に呼ばれます。
pub fn convert_model<B: Backend>(
    request: &ConversionRequest,
    device: &B::Device,
    mut on_phase: impl FnMut(ConversionPhase),
) -> Result<ConversionReport> {
    if (request.image_size as usize) < MIN_IMAGE_SIZE {
        return Err(Error::Config(format!(
            "image_size must be at least {}, got {}",
            MIN_IMAGE_SIZE, request.image_size
        )));
    }

    on_phase(ConversionPhase::Load);

    if !request.source_model.exists() {
        return Err(Error::SourceModelNotFound(request.source_model.clone()));
    }
    let labels = LabelList::load(&request.labels)?;
    let architecture = load_architecture(&request.architecture, labels.len())?;
    if architecture.num_classes != labels.len() {
        return Err(Error::LabelMismatch {
            labels: labels.len(),
            outputs: architecture.num_classes,
        });
    }

    let model = architecture.init::<B>(device);
    let declared_params = model.num_params();
    let model = model.load_file(
        request.source_model.clone(),
        &DefaultFileRecorder::<FullPrecisionSettings>::new(),
        device,
    )?;

    // 読み込んだ重みが構成どおりの形状か確認
    let num_params = model.num_params();
    if num_params != declared_params {
        return Err(Error::InvalidArchitecture {
            path: request.architecture.clone(),
            reason: format!(
                "declared layout has {} parameters but {} holds {}",
                declared_params,
                request.source_model.display(),
                num_params
            ),
        });
    }
    let source_bytes = file_len(&request.source_model)?;
    tracing::info!(
        "loaded {} ({} params, {} bytes)",
        request.source_model.display(),
        num_params,
        source_bytes
    );

    on_phase(ConversionPhase::Convert);

    // 最終層の幅がラベル数と一致するか実際に推論して確認
    let outputs = model.output_width(request.image_size as usize, device);
    if outputs != labels.len() {
        return Err(Error::LabelMismatch {
            labels: labels.len(),
            outputs,
        });
    }

    let model_binary = match request.precision {
        Precision::Half => {
            BinBytesRecorder::<HalfPrecisionSettings>::default().record(model.into_record(), ())?
        }
        Precision::Full => {
            BinBytesRecorder::<FullPrecisionSettings>::default().record(model.into_record(), ())?
        }
    };
    tracing::debug!(
        "encoded record: {} bytes ({} precision)",
        model_binary.len(),
        request.precision
    );

    on_phase(ConversionPhase::Save);

    let metadata = ModelMetadata::new(
        labels,
        architecture,
        request.image_size,
        request.normalization,
        request.precision,
        request.source_model.display().to_string(),
        num_params,
    );
    let output_path = save_model_with_metadata(&request.output, &metadata, &model_binary)?;
    let compact_bytes = file_len(&output_path)?;
    tracing::info!(
        "wrote {} ({} bytes)",
        output_path.display(),
        compact_bytes
    );

    Ok(ConversionReport {
        output_path,
        num_params,
        source_bytes,
        compact_bytes,
        metadata,
    })
}
