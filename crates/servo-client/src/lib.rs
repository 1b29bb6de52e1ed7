//! # Servo Client
//!
//! 流式伺服控制的核心：
//! - [`MotionSession`]: 流什么（维度、初始设定点、运动参数、控制模式）
//! - [`ControlModeState`]: 控制模式基线与运行中更新
//! - [`StreamingRuntime`]: 周期交换状态机（`begin` / `synchronize` / `set_destination` / `stop_motion`）
//! - [`BlendCoordinator`]: 两个会话之间的无停顿交接
//!
//! # 周期循环
//!
//! 引擎不自带循环，调用方按会话的最小轨迹执行时间驱动 `synchronize()`：
//!
//! ```rust,ignore
//! runtime.begin(session)?;
//! loop {
//!     runtime.set_destination(next_target())?;
//!     let report = runtime.synchronize()?;
//!     if report.reached { break; }
//!     pacer.wait();
//! }
//! runtime.stop_motion()?;
//! ```

pub mod blend;
pub mod config;
pub mod control_mode;
pub mod error;
pub mod runtime;
pub mod session;
pub mod state;

pub use blend::BlendCoordinator;
pub use config::RuntimeConfig;
pub use control_mode::ControlModeState;
pub use error::{Result, StreamError};
pub use runtime::{CycleReport, RuntimeSummary, StreamingRuntime};
pub use session::{MotionSession, SessionBuilder, SessionId};
pub use state::{AtomicRuntimeState, AtomicSessionLifecycle, RuntimeState, SessionLifecycle};
