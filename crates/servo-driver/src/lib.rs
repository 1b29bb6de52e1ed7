//! # Servo Driver
//!
//! 控制器周期通道的抽象层：
//! - [`ControllerChannel`]: 不透明的双向周期交换（由具体传输实现）
//! - [`CancelSignal`]: 跨线程取消，`stop_motion()` 借此打断正在等待应答的 `synchronize()`
//! - [`CyclePacer`]: 绝对锚点节拍器，供需要固定周期的调用方使用
//! - `mock` feature: [`SimulatedController`]，无硬件测试用
//!
//! 大多数用户应该使用 `servo-client` 提供的 `StreamingRuntime`。

mod cancel;
mod channel;
mod error;
pub mod pacer;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use cancel::CancelSignal;
pub use channel::ControllerChannel;
pub use error::DriverError;
pub use pacer::{CyclePacer, promote_current_thread};

#[cfg(any(test, feature = "mock"))]
pub use mock::{ChannelId, Injection, SimEvent, SimulatedChannel, SimulatedController};
