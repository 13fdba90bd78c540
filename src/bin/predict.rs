//! 葉の画像を1枚分類し、クラス名を標準出力に出すツール
//!
//! 標準出力には結果の1行だけを書き、エラーはすべて標準エラーに出して終了コード1で終了します。

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{error::ErrorKind, Parser, ValueEnum};

use plant_disease::logging::init_tracing;
use plant_disease::model::AppConfig;
use plant_disease::{classify_image_file, Classification};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// クラス名のみ
    Text,
    /// JSONオブジェクト1行
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "predict", version, about = "Classify a leaf image with the compact model")]
struct Cli {
    /// 分類する画像ファイル
    image: PathBuf,

    /// 設定ファイル
    #[arg(long)]
    config: Option<PathBuf>,

    /// 軽量モデル（設定値を上書き）
    #[arg(long)]
    model: Option<PathBuf>,

    /// クラス名リスト（設定値を上書き）
    #[arg(long)]
    labels: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// JSON出力に含める上位クラス数
    #[arg(long, default_value_t = 3)]
    top_k: usize,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    init_tracing();

    match run(&cli) {
        Ok(line) => {
            println!("{}", line);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<String> {
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AppConfig::load_or_default(&config_path),
    };

    let model_path = cli.model.clone().unwrap_or(config.paths.compact_model.clone());
    let labels_path = cli.labels.clone().unwrap_or(config.paths.labels.clone());

    let classification = classify_image_file(
        config.device_type,
        &model_path,
        &labels_path,
        &cli.image,
        cli.top_k,
    )?;

    render(&classification, cli.format)
}

fn render(classification: &Classification, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(classification.prediction.label.clone()),
        OutputFormat::Json => {
            let value = serde_json::json!({
                "label": classification.prediction.label,
                "display_name": classification.display_name,
                "index": classification.prediction.index,
                "confidence": classification.prediction.confidence,
                "healthy": classification.healthy,
                "top": classification.top,
            });
            serde_json::to_string(&value).context("failed to serialize prediction")
        }
    }
}
