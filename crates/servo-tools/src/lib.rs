//! # Servo Tools - 共享计时与配置
//!
//! **依赖原则**: 只依赖 `servo-protocol`，不依赖驱动层和客户端层
//!
//! ## 包含模块
//!
//! - `clock` - 单调周期时钟（纯函数 + 原子状态）
//! - `statistics` - 周期耗时统计（累积，不开窗）
//! - `config` - TOML 配置文件

pub mod clock;
pub mod config;
pub mod statistics;

pub use clock::{CycleClock, CycleSample, CycleTimestamp};
pub use config::{ConfigError, CycleSettings, MotionSettings, StreamConfig, TimeoutSettings};
pub use statistics::{CycleTrace, SampleHandle, TimingStatistics};
