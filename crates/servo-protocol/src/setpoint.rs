//! 目标设定点
//!
//! 每个周期由外部轨迹生产者给出一个 [`DestinationSetpoint`]，
//! 其维度必须与所属运动会话（MotionSession）构造时的维度一致。

use crate::{ProtocolError, check_finite, check_len};
use smallvec::SmallVec;
use std::fmt;

/// 笛卡尔位姿自由度（X, Y, Z, A, B, C）
pub const CARTESIAN_DOF: usize = 6;

/// 关节向量
///
/// 栈上预留 7 个位置，覆盖 6 轴和 7 轴（冗余）机械臂，避免热路径上的堆分配。
pub type JointVector = SmallVec<[f64; 7]>;

/// 运动维度类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MotionKind {
    /// 关节空间
    Joint,
    /// 笛卡尔空间
    Cartesian,
}

impl fmt::Display for MotionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionKind::Joint => write!(f, "Joint"),
            MotionKind::Cartesian => write!(f, "Cartesian"),
        }
    }
}

/// 笛卡尔位姿
///
/// - `position`: X, Y, Z（毫米）
/// - `orientation`: A, B, C 欧拉角（弧度）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CartesianPose {
    pub position: [f64; 3],
    pub orientation: [f64; 3],
}

impl CartesianPose {
    pub fn new(x: f64, y: f64, z: f64, a: f64, b: f64, c: f64) -> Self {
        Self {
            position: [x, y, z],
            orientation: [a, b, c],
        }
    }

    /// 展开为 `[x, y, z, a, b, c]`
    pub fn to_array(&self) -> [f64; CARTESIAN_DOF] {
        let [x, y, z] = self.position;
        let [a, b, c] = self.orientation;
        [x, y, z, a, b, c]
    }

    /// 平移后的位姿（姿态不变）
    pub fn translated(&self, dx: f64, dy: f64, dz: f64) -> Self {
        let [x, y, z] = self.position;
        Self {
            position: [x + dx, y + dy, z + dz],
            orientation: self.orientation,
        }
    }
}

/// 冗余解析数据（轴数 > 6 时使用）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RedundancyInfo {
    /// 肘部冗余角 E1（弧度）
    pub elbow_angle: f64,
    /// 位形状态位
    pub status: u8,
    /// 转角标志位
    pub turn: u8,
}

/// 目标设定点
///
/// 同一个会话内不允许混用关节空间和笛卡尔空间设定点。
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DestinationSetpoint {
    /// 关节空间目标（弧度），长度等于机械臂轴数
    Joint(JointVector),
    /// 笛卡尔空间目标
    Cartesian {
        pose: CartesianPose,
        redundancy: Option<RedundancyInfo>,
    },
}

impl DestinationSetpoint {
    /// 从任意迭代器构造关节设定点
    pub fn joints(values: impl IntoIterator<Item = f64>) -> Self {
        DestinationSetpoint::Joint(values.into_iter().collect())
    }

    /// 构造笛卡尔设定点（无冗余数据）
    pub fn cartesian(pose: CartesianPose) -> Self {
        DestinationSetpoint::Cartesian {
            pose,
            redundancy: None,
        }
    }

    /// 附加冗余数据
    ///
    /// 对关节设定点无效果（关节向量本身已完整描述位形）。
    pub fn with_redundancy(self, info: RedundancyInfo) -> Self {
        match self {
            DestinationSetpoint::Cartesian { pose, .. } => DestinationSetpoint::Cartesian {
                pose,
                redundancy: Some(info),
            },
            joint => joint,
        }
    }

    pub fn kind(&self) -> MotionKind {
        match self {
            DestinationSetpoint::Joint(_) => MotionKind::Joint,
            DestinationSetpoint::Cartesian { .. } => MotionKind::Cartesian,
        }
    }

    /// 设定点自由度（关节向量长度，或笛卡尔的 6）
    pub fn dimension(&self) -> usize {
        match self {
            DestinationSetpoint::Joint(values) => values.len(),
            DestinationSetpoint::Cartesian { .. } => CARTESIAN_DOF,
        }
    }

    /// 关节向量视图（笛卡尔设定点返回 `None`）
    pub fn as_joints(&self) -> Option<&[f64]> {
        match self {
            DestinationSetpoint::Joint(values) => Some(values),
            DestinationSetpoint::Cartesian { .. } => None,
        }
    }

    /// 笛卡尔位姿视图（关节设定点返回 `None`）
    pub fn as_pose(&self) -> Option<&CartesianPose> {
        match self {
            DestinationSetpoint::Cartesian { pose, .. } => Some(pose),
            DestinationSetpoint::Joint(_) => None,
        }
    }

    /// 按会话维度校验设定点
    ///
    /// # 错误
    ///
    /// - `KindMismatch`: 会话是关节空间却收到笛卡尔设定点（或反之）
    /// - `DimensionMismatch`: 关节向量长度与轴数不符
    /// - `NotFinite`: 含 NaN / Inf
    /// - `RedundancyNotApplicable`: 轴数 ≤ 6 却携带冗余数据
    pub fn validate_for(&self, kind: MotionKind, axis_count: usize) -> Result<(), ProtocolError> {
        if self.kind() != kind {
            return Err(ProtocolError::KindMismatch {
                expected: kind,
                actual: self.kind(),
            });
        }

        match self {
            DestinationSetpoint::Joint(values) => {
                check_len("joints", values, axis_count)?;
                check_finite("joints", values)
            },
            DestinationSetpoint::Cartesian { pose, redundancy } => {
                check_finite("pose", &pose.to_array())?;
                if let Some(info) = redundancy {
                    if axis_count <= CARTESIAN_DOF {
                        return Err(ProtocolError::RedundancyNotApplicable { axis_count });
                    }
                    check_finite("redundancy", &[info.elbow_angle])?;
                }
                Ok(())
            },
        }
    }
}

impl fmt::Display for DestinationSetpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationSetpoint::Joint(values) => {
                write!(f, "Joint[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:.4}", v)?;
                }
                write!(f, "]")
            },
            DestinationSetpoint::Cartesian { pose, redundancy } => {
                let [x, y, z, a, b, c] = pose.to_array();
                write!(
                    f,
                    "Cartesian[x={:.2}, y={:.2}, z={:.2}, a={:.4}, b={:.4}, c={:.4}]",
                    x, y, z, a, b, c
                )?;
                if let Some(info) = redundancy {
                    write!(f, " E1={:.4}", info.elbow_angle)?;
                }
                Ok(())
            },
        }
    }
}
