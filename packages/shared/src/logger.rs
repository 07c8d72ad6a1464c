//! Logging setup utilities for the Chatline binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose log output is enabled alongside the binary itself.
const WORKSPACE_CRATES: [&str; 3] = ["chatline_shared", "chatline_client", "chatline_server"];

/// Build the default filter directive used when `RUST_LOG` is not set.
///
/// Every workspace crate and the binary get the same `default_log_level`.
/// A binary named after a workspace crate is listed once.
pub fn default_directive(binary_name: &str, default_log_level: &str) -> String {
    let binary_target = binary_name.replace('-', "_");
    let mut targets: Vec<String> = WORKSPACE_CRATES.iter().map(|c| c.to_string()).collect();
    if !targets.contains(&binary_target) {
        targets.push(binary_target);
    }
    targets
        .iter()
        .map(|target| format!("{}={}", target, default_log_level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize the tracing subscriber with the specified default log level.
///
/// The log level can be overridden using the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "chatline-server")
/// * `default_log_level` - The default log level (e.g., "debug", "info")
///
/// # Examples
///
/// ```no_run
/// use chatline_shared::logger::setup_logger;
///
/// setup_logger("chatline-client", "info");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive(binary_name, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_lists_binary_crate_once() {
        // テスト項目: ワークスペースの全クレートとバイナリにログレベルが設定される
        // given (前提条件):
        let binary_name = "chatline-client";

        // when (操作):
        let directive = default_directive(binary_name, "debug");

        // then (期待する結果):
        assert_eq!(
            directive,
            "chatline_shared=debug,chatline_client=debug,chatline_server=debug"
        );
    }

    #[test]
    fn test_default_directive_adds_other_binaries() {
        // テスト項目: ワークスペース外の名前のバイナリは末尾に追加される
        // given (前提条件):
        let binary_name = "load-tester";

        // when (操作):
        let directive = default_directive(binary_name, "info");

        // then (期待する結果):
        assert_eq!(
            directive,
            "chatline_shared=info,chatline_client=info,chatline_server=info,load_tester=info"
        );
    }
}
