//! 日志初始化模块
//!
//! 基于 tracing-subscriber 构建日志管线，支持人类可读与 JSON 两种输出格式。
//! 日志统一写到 stderr，CLI 的报表输出独占 stdout。

use anyhow::Result;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use super::ObservabilityConfig;

/// 本工作区的 crate，裸级别只作用于它们
const OWN_TARGETS: [&str; 2] = ["drop_engine", "drops_shared"];

/// 把配置里的日志级别展开为过滤指令
///
/// `debug` 这样的裸级别只调高本工作区 crate 的级别，依赖库（notify 等）保持 warn；
/// 已经是完整指令（含 `=` 或 `,`）的原样使用。
pub fn directive_for(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }

    let mut directive = String::from("warn");
    for target in OWN_TARGETS {
        directive.push_str(&format!(",{}={}", target, level));
    }
    directive
}

/// 构建环境过滤器：RUST_LOG 优先，其次配置中的 log_level，最后回退到 info
pub fn build_env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive_for(&config.log_level)))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 初始化 tracing 日志
///
/// 重复初始化（如测试中多次调用）会返回错误，调用方可以忽略。
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let env_filter = build_env_filter(config);

    let fmt_layer = if config.json_logs {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_level_targets_own_crates() {
        assert_eq!(
            directive_for("debug"),
            "warn,drop_engine=debug,drops_shared=debug"
        );
        assert_eq!(directive_for(" info "), "warn,drop_engine=info,drops_shared=info");
    }

    #[test]
    fn test_full_directive_is_kept() {
        assert_eq!(directive_for("notify=trace"), "notify=trace");
        assert_eq!(directive_for("info,drop_engine=trace"), "info,drop_engine=trace");
    }

    #[test]
    fn test_build_env_filter_with_invalid_level_falls_back() {
        let config = ObservabilityConfig {
            log_level: "[[not-a-directive".to_string(),
            ..Default::default()
        };
        // 不应 panic
        let _ = build_env_filter(&config);
    }
}
