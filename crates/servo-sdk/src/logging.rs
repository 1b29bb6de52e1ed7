//! 日志初始化
//!
//! 库内部只使用 `tracing` 宏；安装订阅者是应用的事。

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// 安装 fmt 订阅者（默认级别 `info`，可由 `RUST_LOG` 覆盖），并把 `log` 记录桥接到 `tracing`
///
/// 幂等：只有第一次调用生效。
pub fn init_logging() {
    init_logging_with("info");
}

/// 同 [`init_logging`]，但指定 `RUST_LOG` 未设置时的默认过滤指令
pub fn init_logging_with(default_directive: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));
        let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .finish();

        // 已有全局订阅者（例如测试框架安装的）时保持原样
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            return;
        }
        if tracing_log::LogTracer::builder()
            .with_max_level(log::LevelFilter::Trace)
            .init()
            .is_err()
        {
            tracing::debug!("log bridge already installed");
        }
    });
}
