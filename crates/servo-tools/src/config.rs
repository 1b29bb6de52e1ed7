//! # 流式控制配置
//!
//! TOML 配置文件，所有字段都有默认值（空文件合法）：
//!
//! ```toml
//! [cycle]
//! period_ms = 20
//! degraded_threshold_ms = 150
//! trace_capacity = 0
//!
//! [timeouts]
//! connect_ms = 5000
//! exchange_ms = 200
//! drain_ms = 2000
//!
//! [motion]
//! min_trajectory_execution_time_ms = 20
//! joint_velocity_rel = 0.1
//! joint_acceleration_rel = 0.1
//! # timeout_after_goal_reach_ms = 300
//! ```

use serde::{Deserialize, Serialize};
use servo_protocol::MotionProfile;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// 流式控制配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// 周期设置
    pub cycle: CycleSettings,

    /// 超时设置
    pub timeouts: TimeoutSettings,

    /// 运动参数
    pub motion: MotionSettings,
}

/// 周期设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleSettings {
    /// 目标周期（ms），仅供 `CyclePacer` 等调用方节拍使用
    pub period_ms: u64,

    /// 平均周期超过此值时报告性能退化（ms）
    pub degraded_threshold_ms: u64,

    /// 保留最近 N 个周期样本（0 = 关闭）
    pub trace_capacity: usize,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            period_ms: 20,
            degraded_threshold_ms: 150,
            trace_capacity: 0,
        }
    }
}

/// 超时设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    /// 通道建立超时（ms）
    pub connect_ms: u64,

    /// 单周期交换超时（ms）
    pub exchange_ms: u64,

    /// 停止排空超时（ms），超时后强制关闭
    pub drain_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            connect_ms: 5000,
            exchange_ms: 200,
            drain_ms: 2000,
        }
    }
}

/// 运动参数设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    pub min_trajectory_execution_time_ms: u64,
    pub joint_velocity_rel: f64,
    pub joint_acceleration_rel: f64,
    pub timeout_after_goal_reach_ms: Option<u64>,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            min_trajectory_execution_time_ms: 20,
            joint_velocity_rel: 0.1,
            joint_acceleration_rel: 0.1,
            timeout_after_goal_reach_ms: None,
        }
    }
}

impl StreamConfig {
    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: StreamConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!("Loaded stream config from {}", path.display());
        Ok(config)
    }

    /// 序列化为 TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            field: "config",
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("cycle.period_ms", self.cycle.period_ms),
            ("cycle.degraded_threshold_ms", self.cycle.degraded_threshold_ms),
            ("timeouts.connect_ms", self.timeouts.connect_ms),
            ("timeouts.exchange_ms", self.timeouts.exchange_ms),
            ("timeouts.drain_ms", self.timeouts.drain_ms),
            (
                "motion.min_trajectory_execution_time_ms",
                self.motion.min_trajectory_execution_time_ms,
            ),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        for (field, value) in [
            ("motion.joint_velocity_rel", self.motion.joint_velocity_rel),
            ("motion.joint_acceleration_rel", self.motion.joint_acceleration_rel),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{} is outside (0, 1]", value),
                });
            }
        }
        Ok(())
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.cycle.period_ms)
    }

    pub fn degraded_threshold(&self) -> Duration {
        Duration::from_millis(self.cycle.degraded_threshold_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.connect_ms)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.exchange_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.drain_ms)
    }

    /// 转换为会话运动参数
    pub fn to_profile(&self) -> MotionProfile {
        MotionProfile {
            joint_velocity_rel: self.motion.joint_velocity_rel,
            joint_acceleration_rel: self.motion.joint_acceleration_rel,
            min_trajectory_execution_time: Duration::from_millis(
                self.motion.min_trajectory_execution_time_ms,
            ),
            timeout_after_goal_reach: self
                .motion
                .timeout_after_goal_reach_ms
                .map(Duration::from_millis),
        }
    }
}
