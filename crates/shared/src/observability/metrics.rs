//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集。
//! 不启动 HTTP 端点，指标快照通过 `MetricsHandle::render` 获取。

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use super::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    handle: PrometheusHandle,
}

impl MetricsHandle {
    /// 渲染 Prometheus 文本格式的指标快照
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// 安装 Prometheus recorder
pub fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    // 保存到全局，供其他地方获取指标快照
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(&config.service_name);

    Ok(MetricsHandle { handle })
}

/// 注册掉落引擎的业务指标
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "drops_events_total",
        "Total number of gameplay events evaluated"
    );
    metrics::describe_counter!("drops_rewards_total", "Total number of rewards fired");
    metrics::describe_counter!(
        "drops_action_failures_total",
        "Total number of reward actions that failed to execute"
    );
    metrics::describe_counter!(
        "drops_config_reloads_total",
        "Total number of rule configuration reloads"
    );
    metrics::describe_gauge!(
        "drops_global_multiplier",
        "Currently active global probability multiplier"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一次事件评估
#[inline]
pub fn record_event(trigger: &'static str, outcome: &'static str) {
    metrics::counter!(
        "drops_events_total",
        "trigger" => trigger,
        "outcome" => outcome
    )
    .increment(1);
}

/// 记录一次奖励发放
#[inline]
pub fn record_reward(trigger: &'static str, drop_name: &str) {
    metrics::counter!(
        "drops_rewards_total",
        "trigger" => trigger,
        "drop" => drop_name.to_string()
    )
    .increment(1);
}

/// 记录动作执行失败
#[inline]
pub fn record_action_failure(kind: &'static str) {
    metrics::counter!("drops_action_failures_total", "kind" => kind).increment(1);
}

/// 记录配置重载
#[inline]
pub fn record_config_reload(status: &'static str, warnings: usize) {
    metrics::counter!("drops_config_reloads_total", "status" => status).increment(1);
    metrics::gauge!("drops_config_warnings").set(warnings as f64);
}

/// 记录全局倍率变化
#[inline]
pub fn record_global_multiplier(value: f64) {
    metrics::gauge!("drops_global_multiplier").set(value);
}
