//! 学習済みモデルを軽量な推論用形式に変換するツール
//!
//! 既定では失敗時に終了コード1を返します。
//! `--legacy-exit-code` を付けると旧スクリプトと同じく常に0で終了します。

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use plant_disease::logging::init_tracing;
use plant_disease::ml::{ConversionReport, ConversionRequest};
use plant_disease::model::{load_metadata, print_metadata_info, AppConfig, Precision};
use plant_disease::run_conversion;

#[derive(Debug, Parser)]
#[command(name = "convert", version, about = "Convert a trained model into the compact inference format")]
struct Cli {
    /// 設定ファイル
    #[arg(long)]
    config: Option<PathBuf>,

    /// 学習済みモデル（.mpk）
    #[arg(long)]
    source: Option<PathBuf>,

    /// クラス名リスト
    #[arg(long)]
    labels: Option<PathBuf>,

    /// モデル構成ファイル
    #[arg(long)]
    architecture: Option<PathBuf>,

    /// 出力先（.tar.gz）
    #[arg(long)]
    output: Option<PathBuf>,

    /// 重み精度（half / full）
    #[arg(long)]
    precision: Option<Precision>,

    /// 失敗しても終了コード0で終了する
    #[arg(long)]
    legacy_exit_code: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            report_error(&e, cli.legacy_exit_code);
            return exit_code(false, cli.legacy_exit_code);
        }
    };
    let legacy = cli.legacy_exit_code || config.converter.legacy_exit_code;

    match run(&cli, &config) {
        Ok(report) => {
            println!(
                "\nSUCCESS! '{}' has been created ({} bytes, {} parameters).",
                report.output_path.display(),
                report.compact_bytes,
                report.num_params
            );
            // 書き込んだアーカイブを読み戻して内容を表示
            match load_metadata(&report.output_path) {
                Ok(metadata) => print_metadata_info(&metadata),
                Err(e) => eprintln!("warning: could not read back {}: {}", report.output_path.display(), e),
            }
            exit_code(true, legacy)
        }
        Err(e) => {
            report_error(&e, legacy);
            exit_code(false, legacy)
        }
    }
}

/// 旧スクリプト互換モードでは標準出力に出す
fn report_error(e: &anyhow::Error, legacy: bool) {
    if legacy {
        println!("\nAN ERROR OCCURRED: {:#}", e);
    } else {
        eprintln!("\nAN ERROR OCCURRED: {:#}", e);
    }
}

fn exit_code(success: bool, legacy: bool) -> ExitCode {
    if success || legacy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(AppConfig::load_or_default(AppConfig::default_path())),
    }
}

fn run(cli: &Cli, config: &AppConfig) -> Result<ConversionReport> {
    let mut request = ConversionRequest::from_config(config);
    if let Some(source) = &cli.source {
        request.source_model = source.clone();
    }
    if let Some(labels) = &cli.labels {
        request.labels = labels.clone();
    }
    if let Some(architecture) = &cli.architecture {
        request.architecture = architecture.clone();
    }
    if let Some(output) = &cli.output {
        request.output = output.clone();
    }
    if let Some(precision) = cli.precision {
        request.precision = precision;
    }

    let report = run_conversion(config.device_type, &request, |phase| println!("{}", phase))?;
    Ok(report)
}
