//! 植物病害分類
//!
//! - `convert`: 学習済みモデルを軽量な推論用形式（tar.gz）に変換
//! - `predict`: 軽量モデルで画像1枚を分類し、クラス名を出力

pub mod error;
pub mod logging;
pub mod commands;
pub mod model;
pub mod ml;

pub use commands::{classify_image_file, run_conversion, Classification};
pub use error::{Error, ErrorKind, Result};
