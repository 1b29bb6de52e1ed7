//! 运行时状态与会话生命周期
//!
//! 两者都以 `AtomicU8` 存储，`stop_motion()` 可以从驱动 `synchronize()`
//! 之外的线程读取和切换状态。

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// 流式运行时状态
///
/// ```text
/// Idle ──begin──▶ Armed ──首个成功周期──▶ Governing ──stop──▶ Draining ──▶ Stopped
///                   │                        │
///                   └────── 通信/校验失败 ────┴──▶ Faulted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RuntimeState {
    /// 未绑定会话
    #[default]
    Idle = 0,
    /// 会话已交付，通道已打开，尚未完成首个周期
    Armed = 1,
    /// 周期交换进行中
    Governing = 2,
    /// 已请求停止，等待控制器关闭通道
    Draining = 3,
    /// 终态：正常停止
    Stopped = 4,
    /// 终态：通信或校验失败
    Faulted = 5,
}

impl RuntimeState {
    /// 从 u8 转换
    ///
    /// 无效值视为 Faulted。
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Armed,
            2 => Self::Governing,
            3 => Self::Draining,
            4 => Self::Stopped,
            _ => Self::Faulted,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Faulted)
    }

    /// 是否持有打开的通道（Armed / Governing）
    pub fn is_active(self) -> bool {
        matches!(self, Self::Armed | Self::Governing)
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Armed => "Armed",
            Self::Governing => "Governing",
            Self::Draining => "Draining",
            Self::Stopped => "Stopped",
            Self::Faulted => "Faulted",
        };
        f.write_str(name)
    }
}

/// 运行时状态（原子版本）
#[derive(Debug)]
pub struct AtomicRuntimeState {
    inner: AtomicU8,
}

impl AtomicRuntimeState {
    pub fn new(state: RuntimeState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self) -> RuntimeState {
        RuntimeState::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn set(&self, state: RuntimeState) {
        self.inner.store(state.as_u8(), Ordering::Release);
    }

    /// 比较并交换，成功返回 true
    pub fn compare_exchange(&self, current: RuntimeState, new: RuntimeState) -> bool {
        self.inner
            .compare_exchange(current.as_u8(), new.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for AtomicRuntimeState {
    fn default() -> Self {
        Self::new(RuntimeState::Idle)
    }
}

/// 运动会话生命周期
///
/// `Created → Commanded → Governing → {Superseded | Stopped | Faulted}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SessionLifecycle {
    /// 已创建，尚未交给运行时
    #[default]
    Created = 0,
    /// 已交给运行时（Armed）
    Commanded = 1,
    /// 正在被流式执行
    Governing = 2,
    /// 被后继会话混合接管
    Superseded = 3,
    /// 显式停止
    Stopped = 4,
    /// 运行时故障
    Faulted = 5,
}

impl SessionLifecycle {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Commanded,
            2 => Self::Governing,
            3 => Self::Superseded,
            4 => Self::Stopped,
            _ => Self::Faulted,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 终态会话不可再修改
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Superseded | Self::Stopped | Self::Faulted)
    }
}

impl fmt::Display for SessionLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "Created",
            Self::Commanded => "Commanded",
            Self::Governing => "Governing",
            Self::Superseded => "Superseded",
            Self::Stopped => "Stopped",
            Self::Faulted => "Faulted",
        };
        f.write_str(name)
    }
}

/// 会话生命周期（原子版本）
#[derive(Debug)]
pub struct AtomicSessionLifecycle {
    inner: AtomicU8,
}

impl AtomicSessionLifecycle {
    pub fn new(lifecycle: SessionLifecycle) -> Self {
        Self {
            inner: AtomicU8::new(lifecycle.as_u8()),
        }
    }

    pub fn get(&self) -> SessionLifecycle {
        SessionLifecycle::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn set(&self, lifecycle: SessionLifecycle) {
        self.inner.store(lifecycle.as_u8(), Ordering::Release);
    }

    pub fn compare_exchange(&self, current: SessionLifecycle, new: SessionLifecycle) -> bool {
        self.inner
            .compare_exchange(current.as_u8(), new.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_state_conversions() {
        for state in [
            RuntimeState::Idle,
            RuntimeState::Armed,
            RuntimeState::Governing,
            RuntimeState::Draining,
            RuntimeState::Stopped,
            RuntimeState::Faulted,
        ] {
            assert_eq!(RuntimeState::from_u8(state.as_u8()), state);
        }
        assert_eq!(RuntimeState::from_u8(200), RuntimeState::Faulted);
        assert!(RuntimeState::Stopped.is_terminal());
        assert!(!RuntimeState::Draining.is_terminal());
        assert!(RuntimeState::Armed.is_active());
    }

    #[test]
    fn test_atomic_runtime_state() {
        let state = AtomicRuntimeState::default();
        assert_eq!(state.get(), RuntimeState::Idle);

        assert!(state.compare_exchange(RuntimeState::Idle, RuntimeState::Armed));
        assert_eq!(state.get(), RuntimeState::Armed);

        // 期望值不符时失败
        assert!(!state.compare_exchange(RuntimeState::Idle, RuntimeState::Governing));
        assert_eq!(state.get(), RuntimeState::Armed);

        state.set(RuntimeState::Faulted);
        assert_eq!(state.get(), RuntimeState::Faulted);
    }

    #[test]
    fn test_session_lifecycle() {
        let lifecycle = AtomicSessionLifecycle::new(SessionLifecycle::Created);
        let (created, commanded) = (SessionLifecycle::Created, SessionLifecycle::Commanded);
        assert!(lifecycle.compare_exchange(created, commanded));
        assert!(!lifecycle.compare_exchange(created, commanded));
        assert_eq!(lifecycle.get(), SessionLifecycle::Commanded);
        assert!(SessionLifecycle::Superseded.is_finished());
        assert!(!SessionLifecycle::Governing.is_finished());
        assert_eq!(format!("{}", SessionLifecycle::Superseded), "Superseded");
    }
}
