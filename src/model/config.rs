//! アプリケーション設定管理モジュール
//!
//! 計算デバイス、モデルファイルのパス、前処理設定などをJSON形式で保存・読み込みします。
//! 変換ツールと推論ツールは同じ設定ファイルを共有します。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::ml::ml_model::{IMAGE_SIZE, MIN_IMAGE_SIZE};

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// NdArray (CPU) バックエンド
    #[default]
    Cpu,
    /// WGPU (GPU) バックエンド
    Wgpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// 入力画素値の正規化方法
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// 0〜255の画素値をそのまま使う
    #[default]
    Raw,
    /// 0〜1に縮める
    UnitRange,
    /// ImageNetの平均と標準偏差で正規化
    ImageNet,
}

/// 軽量モデルに保存する重みの精度
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// f16（ファイルサイズ約半分）
    #[default]
    Half,
    /// f32
    Full,
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Precision::Half => write!(f, "half"),
            Precision::Full => write!(f, "full"),
        }
    }
}

impl std::str::FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "half" | "f16" => Ok(Precision::Half),
            "full" | "f32" => Ok(Precision::Full),
            other => Err(format!("unknown precision '{}', expected 'half' or 'full'", other)),
        }
    }
}

/// モデル関連ファイルのパス
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// 学習済みモデル（フル精度の名前付きMessagePack）
    pub source_model: PathBuf,
    /// 変換後の軽量モデル（tar.gz）
    pub compact_model: PathBuf,
    /// クラス名リスト（JSON配列）
    pub labels: PathBuf,
    /// モデル構成（ClassifierConfigのJSON、存在しなければラベル数から既定構成を使う）
    pub architecture: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            source_model: PathBuf::from("model/trained_plant_disease_model.mpk"),
            compact_model: PathBuf::from("model/model.tar.gz"),
            labels: PathBuf::from("model/class_names.json"),
            architecture: PathBuf::from("model/model_config.json"),
        }
    }
}

/// 前処理設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessSettings {
    /// モデル入力サイズ（正方形、ピクセル）
    pub image_size: u32,
    /// 画素値の正規化方法
    #[serde(default)]
    pub normalization: Normalization,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        Self {
            image_size: IMAGE_SIZE as u32,
            normalization: Normalization::default(),
        }
    }
}

/// 変換ツールの設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConverterSettings {
    /// 保存する重みの精度
    #[serde(default)]
    pub precision: Precision,
    /// 失敗時も終了コード0で終了する（旧スクリプト互換）
    #[serde(default)]
    pub legacy_exit_code: bool,
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 計算デバイスの種類
    #[serde(default)]
    pub device_type: DeviceType,
    /// ファイルパス
    #[serde(default)]
    pub paths: PathSettings,
    /// 前処理設定
    #[serde(default)]
    pub preprocessing: PreprocessSettings,
    /// 変換設定
    #[serde(default)]
    pub converter: ConverterSettings,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 設定を読み込む、存在しない場合はデフォルト設定を返す
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match Self::load(path) {
                Ok(config) => {
                    tracing::info!("loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "failed to load config ({}): {}; using defaults",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            }
        } else {
            tracing::debug!("no config file at {}, using defaults", path.display());
            Self::default()
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content).map_err(|e| Error::io(path, e))?;
        Ok(())
    }

    /// 設定値の整合性を検証
    pub fn validate(&self) -> Result<()> {
        if (self.preprocessing.image_size as usize) < MIN_IMAGE_SIZE {
            return Err(Error::Config(format!(
                "image_size must be at least {}, got {}",
                MIN_IMAGE_SIZE, self.preprocessing.image_size
            )));
        }
        Ok(())
    }
}
