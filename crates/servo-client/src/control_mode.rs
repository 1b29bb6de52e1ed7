//! 控制模式状态
//!
//! 活动参数集存放在 `ArcSwap` 中：读方总是拿到一个完整的快照，
//! 控制器永远不会看到写了一半的参数集。
//!
//! 运行中的更新先写入 `pending`，由下一次 `synchronize()` 取走并随周期请求下发。

use crate::error::{Result, StreamError};
use crate::state::{AtomicSessionLifecycle, SessionLifecycle};
use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::Mutex;
use servo_protocol::ControlModeParameters;
use std::sync::Arc;
use tracing::debug;

/// 控制模式状态
#[derive(Debug)]
pub struct ControlModeState {
    lifecycle: Arc<AtomicSessionLifecycle>,
    axis_count: usize,
    current: ArcSwap<ControlModeParameters>,
    pending: ArcSwapOption<ControlModeParameters>,
    /// 串行化写方（activate / update）
    write_gate: Mutex<()>,
}

impl ControlModeState {
    pub(crate) fn new(lifecycle: Arc<AtomicSessionLifecycle>, axis_count: usize) -> Self {
        Self {
            lifecycle,
            axis_count,
            current: ArcSwap::from_pointee(ControlModeParameters::PositionOnly),
            pending: ArcSwapOption::empty(),
            write_gate: Mutex::new(()),
        }
    }

    /// 设定基线参数
    ///
    /// 仅在会话为 Created 或 Commanded 时合法。
    /// 会话一旦交给运行时（Commanded），通道已按当前控制律打开，
    /// 此时只能调整参数、不能切换控制律，新基线随下一个周期下发。
    ///
    /// 结构校验（含阻抗参数维度）只在这里和 `update()` 中进行，
    /// 力矩模型校验在 `begin()` 打开通道后执行一次。
    pub fn activate(&self, params: ControlModeParameters) -> Result<()> {
        let _guard = self.write_gate.lock();
        let lifecycle = self.lifecycle.get();
        match lifecycle {
            SessionLifecycle::Created => {
                params.validate(self.axis_count)?;
                self.current.store(Arc::new(params));
            },
            SessionLifecycle::Commanded => {
                params.validate(self.axis_count)?;
                self.current.load().check_same_kind(&params)?;
                let params = Arc::new(params);
                self.current.store(params.clone());
                self.pending.store(Some(params));
            },
            other => return Err(StreamError::invalid_state("activate", other)),
        }
        debug!("Control mode baseline set: {}", self.current.load().kind());
        Ok(())
    }

    /// 运行中更新参数
    ///
    /// 仅在会话为 Governing 时合法；校验失败时 `current()` 保持原值。
    pub fn update(&self, params: ControlModeParameters) -> Result<()> {
        let _guard = self.write_gate.lock();
        let lifecycle = self.lifecycle.get();
        if lifecycle != SessionLifecycle::Governing {
            return Err(StreamError::invalid_state("update", lifecycle));
        }

        params.validate(self.axis_count)?;
        self.current.load().check_same_kind(&params)?;

        let params = Arc::new(params);
        self.current.store(params.clone());
        self.pending.store(Some(params));
        debug!("Control mode update queued for next cycle");
        Ok(())
    }

    /// 当前参数快照
    pub fn current(&self) -> Arc<ControlModeParameters> {
        self.current.load_full()
    }

    /// 是否有尚未下发的更新
    pub fn has_pending(&self) -> bool {
        self.pending.load().is_some()
    }

    /// 取走待下发的更新（由 `synchronize()` 调用）
    pub(crate) fn take_pending(&self) -> Option<Arc<ControlModeParameters>> {
        self.pending.swap(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use servo_protocol::{ImpedanceParameters, ProtocolError};

    fn state_with(lifecycle: SessionLifecycle) -> (Arc<AtomicSessionLifecycle>, ControlModeState) {
        let lifecycle = Arc::new(AtomicSessionLifecycle::new(lifecycle));
        let state = ControlModeState::new(lifecycle.clone(), 7);
        (lifecycle, state)
    }

    #[test]
    fn test_default_is_position_only() {
        let (_, state) = state_with(SessionLifecycle::Created);
        assert_eq!(*state.current(), ControlModeParameters::PositionOnly);
        assert!(!state.has_pending());
    }

    #[test]
    fn test_activate_in_created() {
        let (_, state) = state_with(SessionLifecycle::Created);
        let params = ControlModeParameters::from(ImpedanceParameters::cartesian(1000.0, 100.0));
        state.activate(params.clone()).unwrap();
        assert_eq!(*state.current(), params);
        // 基线随打开请求下发，不进入待下发队列
        assert!(!state.has_pending());
    }

    #[test]
    fn test_activate_in_commanded_keeps_kind() {
        let (lifecycle, state) = state_with(SessionLifecycle::Created);
        state
            .activate(ImpedanceParameters::cartesian(1000.0, 100.0).into())
            .unwrap();
        lifecycle.set(SessionLifecycle::Commanded);

        state
            .activate(ImpedanceParameters::cartesian(500.0, 50.0).into())
            .unwrap();
        assert!(state.has_pending());

        let err = state.activate(ControlModeParameters::PositionOnly).unwrap_err();
        assert!(matches!(
            err,
            StreamError::Validation(ProtocolError::ControlModeKindChanged { .. })
        ));
    }

    #[test]
    fn test_activate_rejected_after_governing() {
        let (_, state) = state_with(SessionLifecycle::Governing);
        let err = state.activate(ControlModeParameters::PositionOnly).unwrap_err();
        assert!(matches!(err, StreamError::InvalidState { operation: "activate", .. }));
    }

    #[test]
    fn test_update_requires_governing() {
        for lifecycle in [
            SessionLifecycle::Created,
            SessionLifecycle::Commanded,
            SessionLifecycle::Superseded,
            SessionLifecycle::Stopped,
        ] {
            let (_, state) = state_with(lifecycle);
            let err = state.update(ControlModeParameters::PositionOnly).unwrap_err();
            assert!(
                matches!(err, StreamError::InvalidState { operation: "update", .. }),
                "{:?}",
                lifecycle
            );
        }
    }

    #[test]
    fn test_update_queues_and_swaps() {
        let (lifecycle, state) = state_with(SessionLifecycle::Created);
        state
            .activate(ImpedanceParameters::cartesian(1000.0, 100.0).into())
            .unwrap();
        lifecycle.set(SessionLifecycle::Governing);

        let next = ControlModeParameters::from(ImpedanceParameters::cartesian(300.0, 100.0));
        state.update(next.clone()).unwrap();
        assert_eq!(*state.current(), next);

        let pending = state.take_pending().unwrap();
        assert_eq!(*pending, next);
        assert!(state.take_pending().is_none());
    }

    #[test]
    fn test_invalid_update_keeps_current() {
        let (lifecycle, state) = state_with(SessionLifecycle::Created);
        let baseline = ControlModeParameters::from(ImpedanceParameters::cartesian(1000.0, 100.0));
        state.activate(baseline.clone()).unwrap();
        lifecycle.set(SessionLifecycle::Governing);

        let negative =
            ImpedanceParameters::cartesian(1000.0, 100.0).with_translational_stiffness(-5.0);
        let err = state.update(negative.into()).unwrap_err();
        assert!(matches!(
            err,
            StreamError::Validation(ProtocolError::NegativeValue { field: "stiffness", .. })
        ));
        assert_eq!(*state.current(), baseline);
        assert!(!state.has_pending());

        // 不允许切换控制律
        let err = state.update(ControlModeParameters::PositionOnly).unwrap_err();
        assert!(matches!(
            err,
            StreamError::Validation(ProtocolError::ControlModeKindChanged { .. })
        ));
        assert_eq!(*state.current(), baseline);
    }

    #[test]
    fn test_joint_impedance_dimension_checked() {
        let (_, state) = state_with(SessionLifecycle::Created);
        let err = state
            .activate(ImpedanceParameters::joint([100.0; 6]).into())
            .unwrap_err();
        assert!(matches!(
            err,
            StreamError::Validation(ProtocolError::DimensionMismatch {
                expected: 7,
                actual: 6,
                ..
            })
        ));
    }
}
