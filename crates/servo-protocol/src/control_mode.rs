//! 控制模式参数
//!
//! 控制律用带标签的枚举表示（[`ControlModeParameters`]），
//! 应用更新时对变体做穷尽匹配，不做任何运行时类型转换。
//!
//! # 阻抗空间
//!
//! 阻抗参数的自由度与设定点类型无关：关节空间的流式会话同样可以运行笛卡尔阻抗。
//! - 笛卡尔阻抗：6 个自由度（X, Y, Z 平移 + A, B, C 旋转）
//! - 关节阻抗：每轴一个自由度

use crate::setpoint::CARTESIAN_DOF;
use crate::{ProtocolError, check_finite, check_len, check_non_negative};
use smallvec::{SmallVec, smallvec};
use std::fmt;

/// 每自由度参数向量
pub type DofVector = SmallVec<[f64; 7]>;

/// 默认平移刚度（N/m）
pub const DEFAULT_TRANSLATIONAL_STIFFNESS: f64 = 1000.0;
/// 默认旋转刚度（Nm/rad）
pub const DEFAULT_ROTATIONAL_STIFFNESS: f64 = 100.0;
/// 默认零空间刚度
pub const DEFAULT_NULL_SPACE_STIFFNESS: f64 = 100.0;
/// 笛卡尔阻抗默认最大路径偏差（平移 mm / 旋转 rad，按自由度）
pub const DEFAULT_CARTESIAN_PATH_DEVIATION: f64 = 50.0;
/// 关节阻抗默认最大路径偏差（弧度）
pub const DEFAULT_JOINT_PATH_DEVIATION: f64 = 0.5;

/// 阻尼比下限
pub const MIN_DAMPING: f64 = 0.1;
/// 阻尼比上限
pub const MAX_DAMPING: f64 = 1.0;

/// 阻抗空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ImpedanceSpace {
    Cartesian,
    Joint,
}

impl ImpedanceSpace {
    /// 该空间在给定轴数下的自由度
    pub fn dof(self, axis_count: usize) -> usize {
        match self {
            ImpedanceSpace::Cartesian => CARTESIAN_DOF,
            ImpedanceSpace::Joint => axis_count,
        }
    }
}

/// 阻抗控制参数
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImpedanceParameters {
    pub space: ImpedanceSpace,
    /// 每自由度刚度（非负）
    pub stiffness: DofVector,
    /// 每自由度阻尼比（可选，0.1 ~ 1.0）
    pub damping: Option<DofVector>,
    /// 每自由度附加力/力矩偏置（可选，可为负）
    pub force_bias: Option<DofVector>,
    /// 零空间刚度（非负，仅冗余机械臂生效）
    pub null_space_stiffness: f64,
    /// 每自由度最大路径偏差（非负）
    pub max_path_deviation: DofVector,
}

impl ImpedanceParameters {
    /// 笛卡尔阻抗：平移 / 旋转刚度分别作用于 XYZ / ABC
    pub fn cartesian(translational: f64, rotational: f64) -> Self {
        Self {
            space: ImpedanceSpace::Cartesian,
            stiffness: smallvec![
                translational,
                translational,
                translational,
                rotational,
                rotational,
                rotational
            ],
            damping: None,
            force_bias: None,
            null_space_stiffness: DEFAULT_NULL_SPACE_STIFFNESS,
            max_path_deviation: smallvec![DEFAULT_CARTESIAN_PATH_DEVIATION; CARTESIAN_DOF],
        }
    }

    /// 关节阻抗：每轴一个刚度值
    pub fn joint(stiffness: impl IntoIterator<Item = f64>) -> Self {
        let stiffness: DofVector = stiffness.into_iter().collect();
        let dof = stiffness.len();
        Self {
            space: ImpedanceSpace::Joint,
            stiffness,
            damping: None,
            force_bias: None,
            null_space_stiffness: 0.0,
            max_path_deviation: smallvec![DEFAULT_JOINT_PATH_DEVIATION; dof],
        }
    }

    /// 设置平移刚度（仅笛卡尔阻抗，XYZ）
    pub fn with_translational_stiffness(mut self, value: f64) -> Self {
        if self.space == ImpedanceSpace::Cartesian {
            for s in self.stiffness.iter_mut().take(3) {
                *s = value;
            }
        }
        self
    }

    /// 设置旋转刚度（仅笛卡尔阻抗，ABC）
    pub fn with_rotational_stiffness(mut self, value: f64) -> Self {
        if self.space == ImpedanceSpace::Cartesian {
            for s in self.stiffness.iter_mut().skip(3) {
                *s = value;
            }
        }
        self
    }

    pub fn with_null_space_stiffness(mut self, value: f64) -> Self {
        self.null_space_stiffness = value;
        self
    }

    pub fn with_damping(mut self, damping: impl IntoIterator<Item = f64>) -> Self {
        self.damping = Some(damping.into_iter().collect());
        self
    }

    pub fn with_force_bias(mut self, bias: impl IntoIterator<Item = f64>) -> Self {
        self.force_bias = Some(bias.into_iter().collect());
        self
    }

    pub fn with_max_path_deviation(mut self, deviation: impl IntoIterator<Item = f64>) -> Self {
        self.max_path_deviation = deviation.into_iter().collect();
        self
    }

    pub fn dof(&self) -> usize {
        self.stiffness.len()
    }

    /// 结构性校验
    ///
    /// 不判断物理稳定性（由控制器负责），只保证参数集在写入控制器前是完整且合法的。
    pub fn validate(&self, axis_count: usize) -> Result<(), ProtocolError> {
        let expected = self.space.dof(axis_count);

        check_len("stiffness", &self.stiffness, expected)?;
        check_non_negative("stiffness", &self.stiffness)?;

        check_len("max_path_deviation", &self.max_path_deviation, expected)?;
        check_non_negative("max_path_deviation", &self.max_path_deviation)?;

        if let Some(damping) = &self.damping {
            check_len("damping", damping, expected)?;
            check_finite("damping", damping)?;
            if let Some(index) = damping
                .iter()
                .position(|d| !(MIN_DAMPING..=MAX_DAMPING).contains(d))
            {
                return Err(ProtocolError::DampingOutOfRange {
                    index,
                    value: damping[index],
                });
            }
        }

        if let Some(bias) = &self.force_bias {
            check_len("force_bias", bias, expected)?;
            check_finite("force_bias", bias)?;
        }

        check_non_negative("null_space_stiffness", &[self.null_space_stiffness])
    }
}

/// 控制模式类别（用于日志和错误信息）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControlModeKind {
    PositionOnly,
    CartesianImpedance,
    JointImpedance,
}

impl fmt::Display for ControlModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlModeKind::PositionOnly => "PositionOnly",
            ControlModeKind::CartesianImpedance => "CartesianImpedance",
            ControlModeKind::JointImpedance => "JointImpedance",
        };
        f.write_str(name)
    }
}

/// 控制模式参数
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControlModeParameters {
    /// 纯位置控制
    #[default]
    PositionOnly,
    /// 柔顺（阻抗）控制
    Impedance(ImpedanceParameters),
}

impl ControlModeParameters {
    pub fn kind(&self) -> ControlModeKind {
        match self {
            ControlModeParameters::PositionOnly => ControlModeKind::PositionOnly,
            ControlModeParameters::Impedance(p) => match p.space {
                ImpedanceSpace::Cartesian => ControlModeKind::CartesianImpedance,
                ImpedanceSpace::Joint => ControlModeKind::JointImpedance,
            },
        }
    }

    pub fn is_impedance(&self) -> bool {
        matches!(self, ControlModeParameters::Impedance(_))
    }

    pub fn impedance(&self) -> Option<&ImpedanceParameters> {
        match self {
            ControlModeParameters::Impedance(p) => Some(p),
            ControlModeParameters::PositionOnly => None,
        }
    }

    pub fn validate(&self, axis_count: usize) -> Result<(), ProtocolError> {
        match self {
            ControlModeParameters::PositionOnly => Ok(()),
            ControlModeParameters::Impedance(p) => p.validate(axis_count),
        }
    }

    /// 运行中的更新只允许修改参数，不允许切换控制律
    pub fn check_same_kind(&self, next: &ControlModeParameters) -> Result<(), ProtocolError> {
        let (from, to) = (self.kind(), next.kind());
        if from != to {
            return Err(ProtocolError::ControlModeKindChanged { from, to });
        }
        Ok(())
    }
}

impl From<ImpedanceParameters> for ControlModeParameters {
    fn from(params: ImpedanceParameters) -> Self {
        ControlModeParameters::Impedance(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cartesian_defaults() {
        let p = ImpedanceParameters::cartesian(
            DEFAULT_TRANSLATIONAL_STIFFNESS,
            DEFAULT_ROTATIONAL_STIFFNESS,
        );
        assert_eq!(p.dof(), 6);
        assert_eq!(&p.stiffness[..], &[1000.0, 1000.0, 1000.0, 100.0, 100.0, 100.0]);
        assert_eq!(p.null_space_stiffness, 100.0);
        assert!(p.validate(7).is_ok());
    }

    #[test]
    fn test_translational_rotational_setters() {
        let p = ImpedanceParameters::cartesian(1000.0, 100.0)
            .with_translational_stiffness(1500.0)
            .with_rotational_stiffness(150.0);
        assert_eq!(&p.stiffness[..], &[1500.0, 1500.0, 1500.0, 150.0, 150.0, 150.0]);

        // 关节阻抗不受影响
        let j = ImpedanceParameters::joint([10.0; 7]).with_translational_stiffness(1.0);
        assert_eq!(&j.stiffness[..], &[10.0; 7]);
    }

    #[test]
    fn test_negative_stiffness_rejected() {
        let p = ImpedanceParameters::cartesian(-1.0, 100.0);
        assert!(matches!(
            p.validate(7),
            Err(ProtocolError::NegativeValue {
                field: "stiffness",
                index: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_joint_impedance_dimension() {
        let p = ImpedanceParameters::joint([200.0; 7]);
        assert!(p.validate(7).is_ok());
        assert!(matches!(
            p.validate(6),
            Err(ProtocolError::DimensionMismatch {
                field: "stiffness",
                expected: 6,
                actual: 7
            })
        ));
    }

    #[test]
    fn test_damping_range() {
        let p = ImpedanceParameters::cartesian(1000.0, 100.0).with_damping([0.7; 6]);
        assert!(p.validate(7).is_ok());

        let p = ImpedanceParameters::cartesian(1000.0, 100.0)
            .with_damping([0.7, 0.7, 0.05, 0.7, 0.7, 0.7]);
        assert!(matches!(
            p.validate(7),
            Err(ProtocolError::DampingOutOfRange { index: 2, .. })
        ));
    }

    #[test]
    fn test_force_bias_may_be_negative() {
        let p = ImpedanceParameters::cartesian(1000.0, 100.0)
            .with_force_bias([0.0, 0.0, -5.0, 0.0, 0.0, 0.0]);
        assert!(p.validate(7).is_ok());

        let p = ImpedanceParameters::cartesian(1000.0, 100.0).with_force_bias([0.0; 3]);
        assert!(p.validate(7).is_err());
    }

    #[test]
    fn test_negative_path_deviation_rejected() {
        let p = ImpedanceParameters::cartesian(1000.0, 100.0)
            .with_max_path_deviation([50.0, 50.0, 50.0, 50.0, -1.0, 50.0]);
        assert!(matches!(
            p.validate(7),
            Err(ProtocolError::NegativeValue {
                field: "max_path_deviation",
                index: 4,
                ..
            })
        ));
    }

    #[test]
    fn test_kind_change_rejected() {
        let position = ControlModeParameters::PositionOnly;
        let cart: ControlModeParameters = ImpedanceParameters::cartesian(1000.0, 100.0).into();
        let joint: ControlModeParameters = ImpedanceParameters::joint([10.0; 7]).into();

        assert!(cart.check_same_kind(&cart.clone()).is_ok());
        assert!(position.check_same_kind(&cart).is_err());
        assert_eq!(
            cart.check_same_kind(&joint).unwrap_err(),
            ProtocolError::ControlModeKindChanged {
                from: ControlModeKind::CartesianImpedance,
                to: ControlModeKind::JointImpedance
            }
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_roundtrip() {
        let mode: ControlModeParameters = ImpedanceParameters::cartesian(800.0, 80.0).into();
        let json = serde_json::to_string(&mode).unwrap();
        let back: ControlModeParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(mode, back);
    }
}
