//! 运行时配置

use servo_tools::StreamConfig;
use std::time::Duration;

/// 流式运行时配置
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// 通道建立超时
    pub connect_timeout: Duration,
    /// 单周期应答超时
    pub exchange_timeout: Duration,
    /// 停止排空超时
    pub drain_timeout: Duration,
    /// 平均周期间隔超过此值时报告退化
    pub degraded_threshold: Duration,
    /// 保留最近 N 个交换样本（0 = 关闭）
    pub trace_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            exchange_timeout: Duration::from_millis(200),
            drain_timeout: Duration::from_secs(2),
            degraded_threshold: Duration::from_millis(150),
            trace_capacity: 0,
        }
    }
}

impl From<&StreamConfig> for RuntimeConfig {
    fn from(config: &StreamConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            exchange_timeout: config.exchange_timeout(),
            drain_timeout: config.drain_timeout(),
            degraded_threshold: config.degraded_threshold(),
            trace_capacity: config.cycle.trace_capacity,
        }
    }
}
