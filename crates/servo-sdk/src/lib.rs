//! Servo SDK - 实时周期性运动流式控制与混合
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 设定点、控制模式参数、周期请求/应答，结构校验
//! - **工具层** (`tools`): 单调时钟、周期计时统计、TOML 配置
//! - **驱动层** (`driver`): 控制器通道抽象、取消信号、周期节拍器
//! - **客户端层** (`client`): 运动会话、流式运行时、混合协调器
//!
//! # 快速开始
//!
//! ```rust,ignore
//! use servo_sdk::prelude::*;
//!
//! servo_sdk::init_logging();
//! let runtime = StreamingRuntime::new(channel);
//! runtime.begin(MotionSession::joint([0.0; 7]).build()?)?;
//! let mut pacer = CyclePacer::new(Duration::from_millis(20));
//! loop {
//!     let report = runtime.synchronize()?;
//!     if report.reached {
//!         break;
//!     }
//!     pacer.wait();
//! }
//! runtime.stop_motion()?;
//! ```

pub use servo_client as client;
pub use servo_driver as driver;
pub use servo_protocol as protocol;
pub use servo_tools as tools;

pub mod prelude;

mod logging;

pub use logging::{init_logging, init_logging_with};

// --- 常用类型 ---

pub use servo_client::{
    BlendCoordinator, ControlModeState, CycleReport, MotionSession, RuntimeConfig, RuntimeState,
    RuntimeSummary, SessionBuilder, SessionId, SessionLifecycle, StreamError, StreamingRuntime,
};
pub use servo_driver::{CancelSignal, ControllerChannel, CyclePacer, DriverError};
pub use servo_protocol::{
    CartesianPose, ControlModeParameters, DestinationSetpoint, ImpedanceParameters, ImpedanceSpace,
    MotionKind, MotionProfile, ProtocolError, RedundancyInfo, ServoFlavor,
};
pub use servo_tools::{ConfigError, CycleClock, StreamConfig, TimingStatistics};

/// 模拟控制器（无硬件测试与演示）
#[cfg(feature = "mock")]
pub mod mock {
    pub use servo_driver::{ChannelId, Injection, SimEvent, SimulatedChannel, SimulatedController};
}
