//! # Servo Protocol
//!
//! 周期性伺服流式控制的数据模型（无硬件依赖、无 IO）
//!
//! ## 模块
//!
//! - `setpoint`: 目标设定点（关节空间 / 笛卡尔空间）
//! - `control_mode`: 控制模式参数（纯位置 / 阻抗）
//! - `cycle`: 每周期请求/应答、运动参数、测量状态
//!
//! ## 校验
//!
//! 所有结构性校验（维度、符号、有限值）都在本层完成，
//! 上层在写入控制器之前调用 `validate*` 系列方法，失败时返回 [`ProtocolError`]。

pub mod control_mode;
pub mod cycle;
pub mod setpoint;

pub use control_mode::*;
pub use cycle::*;
pub use setpoint::*;

use thiserror::Error;

/// 协议层校验错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Set point kind mismatch: session streams {expected}, got {actual}")]
    KindMismatch {
        expected: MotionKind,
        actual: MotionKind,
    },

    #[error("Dimension mismatch for {field}: expected {expected}, got {actual}")]
    DimensionMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Non-finite value in {field}[{index}]")]
    NotFinite { field: &'static str, index: usize },

    #[error("Negative value in {field}[{index}]: {value}")]
    NegativeValue {
        field: &'static str,
        index: usize,
        value: f64,
    },

    #[error("Damping ratio out of range at [{index}]: {value} (allowed 0.1..=1.0)")]
    DampingOutOfRange { index: usize, value: f64 },

    #[error("Redundancy data needs more than 6 axes (manipulator has {axis_count})")]
    RedundancyNotApplicable { axis_count: usize },

    #[error("Control mode kind cannot change while streaming: {from} -> {to}")]
    ControlModeKindChanged {
        from: ControlModeKind,
        to: ControlModeKind,
    },

    #[error("Invalid motion profile value for {field}: {value}")]
    InvalidProfile { field: &'static str, value: f64 },

    #[error("Impedance control unavailable: torque model validation failed")]
    ImpedanceUnavailable,

    #[error("Malformed controller response: {0}")]
    MalformedResponse(String),
}

/// 校验向量全部为有限值（内部工具函数）
pub(crate) fn check_finite(field: &'static str, values: &[f64]) -> Result<(), ProtocolError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(ProtocolError::NotFinite { field, index }),
        None => Ok(()),
    }
}

/// 校验向量非负（同时要求有限）
pub(crate) fn check_non_negative(field: &'static str, values: &[f64]) -> Result<(), ProtocolError> {
    check_finite(field, values)?;
    match values.iter().position(|v| *v < 0.0) {
        Some(index) => Err(ProtocolError::NegativeValue {
            field,
            index,
            value: values[index],
        }),
        None => Ok(()),
    }
}

pub(crate) fn check_len(
    field: &'static str,
    values: &[f64],
    expected: usize,
) -> Result<(), ProtocolError> {
    if values.len() != expected {
        return Err(ProtocolError::DimensionMismatch {
            field,
            expected,
            actual: values.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_non_negative() {
        assert!(check_non_negative("stiffness", &[0.0, 1.0, 2.0]).is_ok());

        let err = check_non_negative("stiffness", &[1.0, -2.0]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::NegativeValue {
                field: "stiffness",
                index: 1,
                value: -2.0
            }
        );

        let err = check_non_negative("stiffness", &[f64::NAN]).unwrap_err();
        assert!(matches!(err, ProtocolError::NotFinite { index: 0, .. }));
    }

    #[test]
    fn test_error_display() {
        let err = ProtocolError::DimensionMismatch {
            field: "joints",
            expected: 7,
            actual: 8,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("joints"));
        assert!(msg.contains('7'));
        assert!(msg.contains('8'));

        let err = ProtocolError::KindMismatch {
            expected: MotionKind::Joint,
            actual: MotionKind::Cartesian,
        };
        assert!(format!("{}", err).contains("Cartesian"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProtocolError>();
    }
}
