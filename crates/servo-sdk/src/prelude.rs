//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use servo_sdk::prelude::*;
//! ```

// 客户端层
pub use servo_client::{
    BlendCoordinator, CycleReport, MotionSession, RuntimeConfig, RuntimeState, SessionLifecycle,
    StreamingRuntime,
};

// 协议层
pub use servo_protocol::{
    CartesianPose, ControlModeParameters, DestinationSetpoint, ImpedanceParameters, MotionKind,
    MotionProfile, RedundancyInfo, ServoFlavor,
};

// 驱动层
pub use servo_driver::{ControllerChannel, CyclePacer};

// 工具层
pub use servo_tools::{StreamConfig, TimingStatistics};

// 错误类型
pub use servo_client::StreamError;
pub use servo_driver::DriverError;
pub use servo_protocol::ProtocolError;
pub use servo_tools::ConfigError;
