//! 驱动层错误类型定义

use servo_protocol::FaultCode;
use std::time::Duration;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// 通道建立超时
    #[error("Controller channel not established within {timeout:?}")]
    ConnectTimeout { timeout: Duration },

    /// 周期交换超时（控制器未在期限内应答）
    #[error("No controller reply for cycle {sequence} within {timeout:?}")]
    ExchangeTimeout { sequence: u64, timeout: Duration },

    /// 通道已断开
    #[error("Controller channel disconnected")]
    Disconnected,

    /// 交换被取消（另一线程发起了停止）
    #[error("Exchange cancelled")]
    Cancelled,

    /// 畸形应答
    #[error("Malformed controller response: {0}")]
    Malformed(String),

    /// 控制器报告故障
    #[error("Controller reported fault {0}")]
    ControllerFault(FaultCode),

    /// 其他传输层错误
    #[error("Transport error: {0}")]
    Transport(String),
}

impl DriverError {
    /// 是否为超时类错误
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            DriverError::ConnectTimeout { .. } | DriverError::ExchangeTimeout { .. }
        )
    }
}
