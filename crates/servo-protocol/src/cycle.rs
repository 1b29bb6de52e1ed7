//! 周期交换数据
//!
//! 引擎与控制器之间的每周期交换被视为一个黑盒的可靠周期通道：
//! - 请求：`{命令设定点, 可选控制模式更新, 序号}`
//! - 应答：`{测量状态, 到达标志, 精插补器状态, 可选故障码}`
//!
//! 线格式和握手/心跳由通道实现负责，本模块只描述语义。

use crate::control_mode::ControlModeParameters;
use crate::setpoint::{
    CARTESIAN_DOF, CartesianPose, DestinationSetpoint, JointVector, MotionKind, RedundancyInfo,
};
use crate::{ProtocolError, check_finite};
use std::fmt;
use std::time::Duration;

/// 伺服类型
///
/// - **Direct**: 不经过控制器侧轨迹生成，设定点直接进入精插补
/// - **Smart**: 控制器按运动参数（速度/加速度比例）在线插补到最新设定点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ServoFlavor {
    Direct,
    #[default]
    Smart,
}

/// 运动参数
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotionProfile {
    /// 关节速度比例（0, 1]
    pub joint_velocity_rel: f64,
    /// 关节加速度比例（0, 1]
    pub joint_acceleration_rel: f64,
    /// 最小轨迹执行时间
    ///
    /// 调用方的 `synchronize()` 频率应与之匹配，引擎本身不做节流。
    pub min_trajectory_execution_time: Duration,
    /// 到达目标后若超过此时间仍无新设定点，控制器自行结束运动
    pub timeout_after_goal_reach: Option<Duration>,
}

impl Default for MotionProfile {
    fn default() -> Self {
        Self {
            joint_velocity_rel: 0.1,
            joint_acceleration_rel: 0.1,
            min_trajectory_execution_time: Duration::from_millis(20),
            timeout_after_goal_reach: None,
        }
    }
}

impl MotionProfile {
    pub fn validate(&self) -> Result<(), ProtocolError> {
        for (field, value) in [
            ("joint_velocity_rel", self.joint_velocity_rel),
            ("joint_acceleration_rel", self.joint_acceleration_rel),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ProtocolError::InvalidProfile { field, value });
            }
        }
        if self.min_trajectory_execution_time.is_zero() {
            return Err(ProtocolError::InvalidProfile {
                field: "min_trajectory_execution_time",
                value: 0.0,
            });
        }
        Ok(())
    }
}

/// 打开通道时发送给控制器的运动描述
#[derive(Debug, Clone, PartialEq)]
pub struct OpenRequest {
    pub kind: MotionKind,
    pub flavor: ServoFlavor,
    pub profile: MotionProfile,
    pub control_mode: ControlModeParameters,
}

/// 控制器测量状态
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeasuredState {
    /// 测量关节位置（弧度）
    pub joints: JointVector,
    /// 测量法兰/TCP 位姿
    pub pose: CartesianPose,
    /// 冗余数据（仅轴数 > 6 时存在）
    pub redundancy: Option<RedundancyInfo>,
}

impl MeasuredState {
    pub fn axis_count(&self) -> usize {
        self.joints.len()
    }

    /// 按会话维度投影为设定点
    ///
    /// 会话开始时以此作为第一个命令设定点，保证首个增量为零。
    pub fn project(&self, kind: MotionKind) -> DestinationSetpoint {
        match kind {
            MotionKind::Joint => DestinationSetpoint::Joint(self.joints.clone()),
            MotionKind::Cartesian => DestinationSetpoint::Cartesian {
                pose: self.pose,
                redundancy: if self.axis_count() > CARTESIAN_DOF {
                    self.redundancy
                } else {
                    None
                },
            },
        }
    }
}

/// 每周期请求
#[derive(Debug, Clone, PartialEq)]
pub struct CycleRequest {
    pub sequence: u64,
    pub setpoint: DestinationSetpoint,
    pub control_mode: Option<ControlModeParameters>,
}

/// 精插补器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InterpolatorStatus {
    #[default]
    Idle,
    Interpolating,
    Converged,
    Decelerating,
}

impl fmt::Display for InterpolatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InterpolatorStatus::Idle => "Idle",
            InterpolatorStatus::Interpolating => "Interpolating",
            InterpolatorStatus::Converged => "Converged",
            InterpolatorStatus::Decelerating => "Decelerating",
        };
        f.write_str(name)
    }
}

/// 控制器故障码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FaultCode(pub u16);

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// 每周期应答
#[derive(Debug, Clone, PartialEq)]
pub struct CycleResponse {
    pub sequence: u64,
    pub measured: MeasuredState,
    pub reached: bool,
    pub interpolator: InterpolatorStatus,
    pub fault: Option<FaultCode>,
}

impl CycleResponse {
    /// 检查应答是否与请求对应
    ///
    /// 序号不一致、测量维度不对或含非有限值时视为畸形应答。
    pub fn check_against(
        &self,
        request: &CycleRequest,
        axis_count: usize,
    ) -> Result<(), ProtocolError> {
        if self.sequence != request.sequence {
            return Err(ProtocolError::MalformedResponse(format!(
                "sequence mismatch: sent {}, received {}",
                request.sequence, self.sequence
            )));
        }
        if self.measured.axis_count() != axis_count {
            return Err(ProtocolError::MalformedResponse(format!(
                "measured {} axes, expected {}",
                self.measured.axis_count(),
                axis_count
            )));
        }
        check_finite("measured.joints", &self.measured.joints)
            .and_then(|_| check_finite("measured.pose", &self.measured.pose.to_array()))
            .map_err(|e| ProtocolError::MalformedResponse(e.to_string()))
    }
}
