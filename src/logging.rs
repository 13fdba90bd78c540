//! ログ出力の初期化
//!
//! 標準出力は推論結果専用のため、ログはすべて標準エラーに出します。

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `RUST_LOG` が未設定の場合のフィルタ
const DEFAULT_FILTER: &str = "warn";

/// tracingのサブスクライバを初期化
///
/// 二重初期化はエラーにせず無視します。
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}
