//! 混合协调器
//!
//! 把一个正在执行的流式运动平滑地交给新会话，不让机械臂停下：
//!
//! 1. `arm_successor()`: 新运行时在旧运行时仍 Governing 时 `begin()`（Armed）
//! 2. 调用方驱动新运行时完成至少一个成功的 `synchronize()`（Governing）
//! 3. `hand_over()`: 对旧运行时发出停止，旧会话变为 Superseded
//!
//! 控制器负责实际的接管过渡（后继会话在前驱减速时斜坡接入），这里只保证顺序：
//! 后继未 Governing 就停止前驱是协议违例，直接返回 `Sequencing`，不产生任何控制器调用，
//! 后继留在协调器中，完成一个周期后可以重试 `hand_over()`，或由 `stop_all()` 一并停止。
//!
//! 所有操作都在同一把锁内完成，避免 arm 与 stop 在应用线程之间竞争。

use crate::error::{Result, StreamError};
use crate::runtime::StreamingRuntime;
use crate::session::MotionSession;
use crate::state::RuntimeState;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct BlendSlots {
    governing: Option<Arc<StreamingRuntime>>,
    incoming: Option<Arc<StreamingRuntime>>,
}

/// 混合协调器（每台机械臂一个）
#[derive(Debug, Default)]
pub struct BlendCoordinator {
    slots: Mutex<BlendSlots>,
}

impl BlendCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 启动第一个运动
    ///
    /// 已有活动运行时（Armed / Governing）时返回 `Sequencing`，应改用 `arm_successor()`。
    pub fn start(&self, runtime: Arc<StreamingRuntime>, session: MotionSession) -> Result<()> {
        let mut slots = self.slots.lock();
        if slots.governing.as_ref().is_some_and(|current| current.state().is_active()) {
            return Err(StreamError::sequencing(
                "a runtime is already active for this manipulator, use arm_successor()",
            ));
        }
        runtime.begin(session)?;
        slots.governing = Some(runtime);
        slots.incoming = None;
        Ok(())
    }

    /// 在旧运行时仍 Governing 时装载后继
    ///
    /// 失败时旧运行时不受影响。
    pub fn arm_successor(
        &self,
        runtime: Arc<StreamingRuntime>,
        session: MotionSession,
    ) -> Result<()> {
        let mut slots = self.slots.lock();
        match &slots.governing {
            Some(current) if current.state() == RuntimeState::Governing => {},
            Some(current) => {
                return Err(StreamError::sequencing(format!(
                    "outgoing runtime is {}, blending requires Governing",
                    current.state()
                )));
            },
            None => return Err(StreamError::sequencing("no governing runtime to blend from")),
        }
        if slots.incoming.is_some() {
            return Err(StreamError::sequencing("a successor is already armed"));
        }

        runtime.begin(session)?;
        info!(
            "Successor armed: {:?}",
            runtime.session().map(|s| s.id())
        );
        slots.incoming = Some(runtime);
        Ok(())
    }

    /// 交接：停止前驱，提升后继
    ///
    /// 后继必须已完成至少一个成功周期（Governing），否则返回 `Sequencing`：
    /// 不发出任何控制器调用，前驱保持 Governing，后继仍留在协调器中等待重试。
    ///
    /// 前驱排空失败时后继照常提升（运动已由后继接管），错误原样返回。
    pub fn hand_over(&self) -> Result<Arc<StreamingRuntime>> {
        let mut slots = self.slots.lock();
        let incoming = slots
            .incoming
            .clone()
            .ok_or_else(|| StreamError::sequencing("no successor armed"))?;
        let outgoing = match slots.governing.clone() {
            Some(outgoing) => outgoing,
            None => return Err(StreamError::sequencing("no governing runtime to hand over from")),
        };

        let incoming_state = incoming.state();
        if incoming_state != RuntimeState::Governing {
            warn!(
                "Blend rejected: successor is {}, it must complete a cycle first",
                incoming_state
            );
            return Err(StreamError::sequencing(format!(
                "successor is {}, it must complete at least one cycle \
                 before the outgoing runtime is stopped",
                incoming_state
            )));
        }

        slots.incoming = None;
        let stopped = outgoing.supersede();
        slots.governing = Some(incoming.clone());
        match &stopped {
            Ok(()) => info!(
                "Blend complete: {:?} superseded by {:?}",
                outgoing.session().map(|s| s.id()),
                incoming.session().map(|s| s.id())
            ),
            Err(e) => warn!("Blend completed with outgoing failure: {}", e),
        }
        stopped.map(|()| incoming)
    }

    /// 放弃已装载的后继（停止它），前驱不受影响
    pub fn abort_successor(&self) -> Result<()> {
        let incoming = self.slots.lock().incoming.take();
        match incoming {
            Some(runtime) => runtime.stop_motion(),
            None => Ok(()),
        }
    }

    /// 停止所有运行时（后继优先）
    pub fn stop_all(&self) -> Result<()> {
        let mut slots = self.slots.lock();
        let mut first_error = None;
        for runtime in [slots.incoming.take(), slots.governing.take()].into_iter().flatten() {
            if !runtime.state().is_active() {
                continue;
            }
            if let Err(e) = runtime.stop_motion() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// 当前主导运行时
    pub fn governing(&self) -> Option<Arc<StreamingRuntime>> {
        self.slots.lock().governing.clone()
    }

    /// 已装载但尚未交接的后继
    pub fn incoming(&self) -> Option<Arc<StreamingRuntime>> {
        self.slots.lock().incoming.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SessionLifecycle;
    use servo_driver::{SimEvent, SimulatedController};

    fn session() -> MotionSession {
        MotionSession::joint([0.0; 7]).build().unwrap()
    }

    fn governing_runtime(
        controller: &SimulatedController,
        coordinator: &BlendCoordinator,
    ) -> (Arc<StreamingRuntime>, MotionSession) {
        let runtime = StreamingRuntime::new(controller.channel()).shared();
        let s = session();
        coordinator.start(runtime.clone(), s.clone()).unwrap();
        runtime.synchronize().unwrap();
        (runtime, s)
    }

    #[test]
    fn test_start_rejects_second_active() {
        let controller = SimulatedController::seven_axis();
        let coordinator = BlendCoordinator::new();
        let _ = governing_runtime(&controller, &coordinator);

        let other = StreamingRuntime::new(controller.channel()).shared();
        let err = coordinator.start(other.clone(), session()).unwrap_err();
        assert!(err.is_sequencing());
        assert_eq!(other.state(), RuntimeState::Idle);
    }

    #[test]
    fn test_arm_requires_governing_outgoing() {
        let controller = SimulatedController::seven_axis();
        let coordinator = BlendCoordinator::new();

        let incoming = StreamingRuntime::new(controller.channel()).shared();
        assert!(
            coordinator
                .arm_successor(incoming.clone(), session())
                .unwrap_err()
                .is_sequencing()
        );

        // 前驱仅 Armed 也不行
        let outgoing = StreamingRuntime::new(controller.channel()).shared();
        coordinator.start(outgoing, session()).unwrap();
        assert!(
            coordinator
                .arm_successor(incoming.clone(), session())
                .unwrap_err()
                .is_sequencing()
        );
        assert_eq!(incoming.state(), RuntimeState::Idle);
    }

    #[test]
    fn test_successful_blend() {
        let controller = SimulatedController::seven_axis();
        let coordinator = BlendCoordinator::new();
        let (outgoing, s1) = governing_runtime(&controller, &coordinator);

        let incoming = StreamingRuntime::new(controller.channel()).shared();
        let s2 = session();
        coordinator.arm_successor(incoming.clone(), s2.clone()).unwrap();
        incoming.synchronize().unwrap();

        let promoted = coordinator.hand_over().unwrap();
        assert!(Arc::ptr_eq(&promoted, &incoming));
        assert_eq!(outgoing.state(), RuntimeState::Stopped);
        assert_eq!(s1.lifecycle(), SessionLifecycle::Superseded);
        assert_eq!(s2.lifecycle(), SessionLifecycle::Governing);
        assert!(coordinator.incoming().is_none());
        assert!(
            coordinator
                .governing()
                .is_some_and(|g| Arc::ptr_eq(&g, &incoming))
        );

        // 后继首个交换发生在前驱停止之前
        let events = controller.events();
        let first_incoming_cycle = events
            .iter()
            .position(|e| matches!(e, SimEvent::Exchanged { channel: 2, .. }))
            .unwrap();
        let outgoing_stop = events
            .iter()
            .position(|e| matches!(e, SimEvent::StopRequested { channel: 1 }))
            .unwrap();
        assert!(first_incoming_cycle < outgoing_stop);
    }

    #[test]
    fn test_hand_over_before_first_cycle_is_rejected() {
        let controller = SimulatedController::seven_axis();
        let coordinator = BlendCoordinator::new();
        let (outgoing, s1) = governing_runtime(&controller, &coordinator);

        let incoming = StreamingRuntime::new(controller.channel()).shared();
        coordinator.arm_successor(incoming.clone(), session()).unwrap();
        let events_before = controller.events().len();

        let err = coordinator.hand_over().unwrap_err();
        assert!(err.is_sequencing());
        assert_eq!(controller.events().len(), events_before);
        assert_eq!(outgoing.state(), RuntimeState::Governing);
        assert_eq!(s1.lifecycle(), SessionLifecycle::Governing);
        assert!(
            coordinator
                .incoming()
                .is_some_and(|i| Arc::ptr_eq(&i, &incoming))
        );
        assert_eq!(controller.stop_requests(), 0);

        // 完成一个周期后重试
        incoming.synchronize().unwrap();
        let promoted = coordinator.hand_over().unwrap();
        assert!(Arc::ptr_eq(&promoted, &incoming));
        assert_eq!(s1.lifecycle(), SessionLifecycle::Superseded);
    }

    #[test]
    fn test_stop_all_after_rejected_hand_over_closes_successor() {
        let controller = SimulatedController::seven_axis();
        let coordinator = BlendCoordinator::new();
        let (outgoing, _) = governing_runtime(&controller, &coordinator);

        let incoming = StreamingRuntime::new(controller.channel()).shared();
        coordinator.arm_successor(incoming.clone(), session()).unwrap();
        assert!(coordinator.hand_over().unwrap_err().is_sequencing());

        coordinator.stop_all().unwrap();
        assert_eq!(outgoing.state(), RuntimeState::Stopped);
        assert_eq!(incoming.state(), RuntimeState::Stopped);
        let events = controller.events();
        assert!(events.contains(&SimEvent::StopRequested { channel: 2 }));
        assert!(events.contains(&SimEvent::Closed { channel: 2 }));
        assert!(coordinator.incoming().is_none());
    }

    #[test]
    fn test_hand_over_without_successor() {
        let coordinator = BlendCoordinator::new();
        assert!(coordinator.hand_over().unwrap_err().is_sequencing());
    }

    #[test]
    fn test_abort_successor_and_stop_all() {
        let controller = SimulatedController::seven_axis();
        let coordinator = BlendCoordinator::new();
        let (outgoing, _) = governing_runtime(&controller, &coordinator);

        let incoming = StreamingRuntime::new(controller.channel()).shared();
        coordinator.arm_successor(incoming.clone(), session()).unwrap();
        coordinator.abort_successor().unwrap();
        assert_eq!(incoming.state(), RuntimeState::Stopped);
        assert_eq!(outgoing.state(), RuntimeState::Governing);

        coordinator.stop_all().unwrap();
        assert_eq!(outgoing.state(), RuntimeState::Stopped);
        assert!(coordinator.governing().is_none());
    }
}
