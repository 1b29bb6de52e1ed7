//! 错误类型体系
//!
//! 区分本地可恢复错误和致命错误：
//!
//! - **可恢复**: `Validation`、`InvalidState`，在任何控制器写入之前检测，调用方修正输入或调用顺序后重试
//! - **致命**: `Connection`、`Communication`、`DrainTimeout`，运行时进入 Faulted，会话必须重建
//! - **仅影响混合**: `Sequencing`，本次混合失败，原运行时继续 Governing
//! - `OperationCancelled`: `stop_motion()` 打断了正在进行的 `synchronize()`
//!
//! 引擎从不自动重试失败的 `synchronize()`：过期设定点盲目重发是不安全的。

use servo_driver::DriverError;
use servo_protocol::ProtocolError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// 流式控制错误
#[derive(Debug, Error)]
pub enum StreamError {
    // ==================== Recoverable ====================
    /// 参数或设定点结构非法
    #[error("Validation failed: {0}")]
    Validation(#[from] ProtocolError),

    /// 当前状态不允许该操作
    #[error("{operation}() is not permitted in state {state}")]
    InvalidState {
        /// 被拒绝的操作
        operation: &'static str,
        /// 当时的状态
        state: String,
    },

    // ==================== Fatal ====================
    /// 通道建立失败
    #[error("Connection failed: {0}")]
    Connection(DriverError),

    /// 周期交换失败
    #[error("Communication failed: {0}")]
    Communication(DriverError),

    /// 停止排空超时，通道已被强制关闭
    #[error("Controller did not close the channel within {timeout:?}, channel force-closed")]
    DrainTimeout { timeout: Duration },

    // ==================== Blend ====================
    /// 混合顺序违例
    #[error("Blend sequencing violated: {0}")]
    Sequencing(String),

    /// 被停止请求取消
    #[error("Operation cancelled by stop request")]
    OperationCancelled,
}

impl StreamError {
    /// 创建状态错误
    pub fn invalid_state(operation: &'static str, state: impl fmt::Display) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    /// 创建混合顺序错误
    pub fn sequencing(reason: impl Into<String>) -> Self {
        Self::Sequencing(reason.into())
    }

    /// 是否为致命错误
    ///
    /// 致命错误后运行时处于 Faulted，不能再调用 `synchronize()`。
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Communication(_) | Self::DrainTimeout { .. }
        )
    }

    /// 是否可在本地恢复（修正输入或调用顺序后重试）
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidState { .. })
    }

    /// 是否为混合顺序错误
    pub fn is_sequencing(&self) -> bool {
        matches!(self, Self::Sequencing(_))
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let validation = StreamError::from(ProtocolError::ImpedanceUnavailable);
        assert!(validation.is_recoverable());
        assert!(!validation.is_fatal());

        let state = StreamError::invalid_state("update", "Created");
        assert!(state.is_recoverable());

        let comm = StreamError::Communication(DriverError::Disconnected);
        assert!(comm.is_fatal());
        assert!(!comm.is_recoverable());

        let drain = StreamError::DrainTimeout {
            timeout: Duration::from_secs(2),
        };
        assert!(drain.is_fatal());

        let seq = StreamError::sequencing("stop before arm");
        assert!(seq.is_sequencing());
        assert!(!seq.is_fatal());
        assert!(!seq.is_recoverable());

        assert!(!StreamError::OperationCancelled.is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = StreamError::invalid_state("synchronize", "Stopped");
        assert_eq!(
            format!("{}", err),
            "synchronize() is not permitted in state Stopped"
        );

        let err = StreamError::Connection(DriverError::ConnectTimeout {
            timeout: Duration::from_secs(5),
        });
        assert!(format!("{}", err).contains("5s"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StreamError>();
    }
}
