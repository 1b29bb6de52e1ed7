//! 运动会话
//!
//! 会话描述"流什么"：维度类型、轴数、初始设定点、运动参数、控制模式。
//! 会话由激活它的 `StreamingRuntime` 独占；混合时所有权原子地转移到后继会话，
//! 前驱变为 Superseded，此后不可再修改。

use crate::control_mode::ControlModeState;
use crate::error::{Result, StreamError};
use crate::state::{AtomicSessionLifecycle, SessionLifecycle};
use servo_protocol::{
    CartesianPose, ControlModeParameters, DestinationSetpoint, MotionKind, MotionProfile,
    ProtocolError, ServoFlavor,
};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// 会话标识（进程内唯一）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

#[derive(Debug)]
struct SessionInner {
    id: SessionId,
    kind: MotionKind,
    axis_count: usize,
    initial_setpoint: DestinationSetpoint,
    profile: MotionProfile,
    flavor: ServoFlavor,
    lifecycle: Arc<AtomicSessionLifecycle>,
    control_mode: ControlModeState,
}

/// 运动会话（廉价克隆的句柄）
#[derive(Debug, Clone)]
pub struct MotionSession {
    inner: Arc<SessionInner>,
}

impl MotionSession {
    /// 关节空间会话，轴数取初始向量长度
    pub fn joint(initial: impl IntoIterator<Item = f64>) -> SessionBuilder {
        let setpoint = DestinationSetpoint::joints(initial);
        let axis_count = setpoint.dimension();
        SessionBuilder::new(setpoint, axis_count)
    }

    /// 笛卡尔空间会话
    ///
    /// 位姿本身不携带轴数，需要显式给出（用于冗余数据和关节阻抗校验）。
    pub fn cartesian(initial: CartesianPose, axis_count: usize) -> SessionBuilder {
        SessionBuilder::new(DestinationSetpoint::cartesian(initial), axis_count)
    }

    /// 从任意设定点构造
    pub fn builder(initial: DestinationSetpoint, axis_count: usize) -> SessionBuilder {
        SessionBuilder::new(initial, axis_count)
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn kind(&self) -> MotionKind {
        self.inner.kind
    }

    pub fn axis_count(&self) -> usize {
        self.inner.axis_count
    }

    pub fn initial_setpoint(&self) -> &DestinationSetpoint {
        &self.inner.initial_setpoint
    }

    pub fn profile(&self) -> &MotionProfile {
        &self.inner.profile
    }

    pub fn flavor(&self) -> ServoFlavor {
        self.inner.flavor
    }

    pub fn lifecycle(&self) -> SessionLifecycle {
        self.inner.lifecycle.get()
    }

    /// 控制模式状态（`activate` / `update` / `current`）
    pub fn control_mode(&self) -> &ControlModeState {
        &self.inner.control_mode
    }

    /// 按会话维度校验设定点
    pub fn validate_setpoint(&self, setpoint: &DestinationSetpoint) -> Result<()> {
        setpoint.validate_for(self.inner.kind, self.inner.axis_count)?;
        Ok(())
    }

    pub(crate) fn transition(&self, from: SessionLifecycle, to: SessionLifecycle) -> bool {
        self.inner.lifecycle.compare_exchange(from, to)
    }

    pub(crate) fn set_lifecycle(&self, to: SessionLifecycle) {
        self.inner.lifecycle.set(to);
    }
}

impl fmt::Display for MotionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {:?}, {} axes, {})",
            self.inner.id,
            self.inner.kind,
            self.inner.flavor,
            self.inner.axis_count,
            self.inner.lifecycle.get()
        )
    }
}

/// 会话构造器
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    initial: DestinationSetpoint,
    axis_count: usize,
    profile: MotionProfile,
    flavor: ServoFlavor,
    control_mode: ControlModeParameters,
}

impl SessionBuilder {
    fn new(initial: DestinationSetpoint, axis_count: usize) -> Self {
        Self {
            initial,
            axis_count,
            profile: MotionProfile::default(),
            flavor: ServoFlavor::default(),
            control_mode: ControlModeParameters::PositionOnly,
        }
    }

    pub fn profile(mut self, profile: MotionProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn flavor(mut self, flavor: ServoFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    /// 初始控制模式（构造时经 `activate()` 校验）
    pub fn control_mode(mut self, params: impl Into<ControlModeParameters>) -> Self {
        self.control_mode = params.into();
        self
    }

    /// 校验并创建会话（生命周期为 Created）
    pub fn build(self) -> Result<MotionSession> {
        if self.axis_count == 0 {
            return Err(StreamError::Validation(ProtocolError::DimensionMismatch {
                field: "axis_count",
                expected: 1,
                actual: 0,
            }));
        }
        self.profile.validate()?;
        let kind = self.initial.kind();
        self.initial.validate_for(kind, self.axis_count)?;

        let lifecycle = Arc::new(AtomicSessionLifecycle::new(SessionLifecycle::Created));
        let control_mode = ControlModeState::new(lifecycle.clone(), self.axis_count);
        control_mode.activate(self.control_mode)?;

        Ok(MotionSession {
            inner: Arc::new(SessionInner {
                id: SessionId::next(),
                kind,
                axis_count: self.axis_count,
                initial_setpoint: self.initial,
                profile: self.profile,
                flavor: self.flavor,
                lifecycle,
                control_mode,
            }),
        })
    }
}
