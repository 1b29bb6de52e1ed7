//! 流式运行时
//!
//! 一个 `StreamingRuntime` 独占一个控制器通道，驱动一个运动会话：
//!
//! ```text
//! Idle ──begin()──▶ Armed ──首个成功 synchronize()──▶ Governing ──stop_motion()──▶ Draining ──▶ Stopped
//! ```
//!
//! # 线程模型
//!
//! - 所有方法都是 `&self`，可以放进 `Arc` 跨线程共享
//! - `synchronize()` 是唯一的阻塞点（等待本周期应答，有超时）
//! - `set_destination()` / `update_control_mode()` 只修改缓冲区，由下一次 `synchronize()` 下发
//! - `stop_motion()` 可以从另一个线程调用：它先触发取消信号，
//!   正在等待应答的 `synchronize()` 会立即返回 `OperationCancelled`
//!
//! # 零跳变
//!
//! `begin()` 时把测量状态投影为锚点，首个周期发送的就是锚点本身，
//! 预加载的目标（或会话初始设定点）从第二个周期开始发送。

use crate::config::RuntimeConfig;
use crate::error::{Result, StreamError};
use crate::session::{MotionSession, SessionId};
use crate::state::{AtomicRuntimeState, RuntimeState, SessionLifecycle};
use parking_lot::Mutex;
use servo_driver::{CancelSignal, ControllerChannel, DriverError};
use servo_protocol::{
    CartesianPose, ControlModeKind, ControlModeParameters, CycleRequest, CycleResponse,
    DestinationSetpoint, InterpolatorStatus, JointVector, MeasuredState, MotionKind, OpenRequest,
    ProtocolError, RedundancyInfo,
};
use servo_tools::{CycleClock, CycleTimestamp, TimingStatistics};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info, trace, warn};

/// 单周期结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// 本周期序号（从 1 开始）
    pub sequence: u64,
    /// 控制器报告的到达标志
    pub reached: bool,
    /// 精插补器状态
    pub interpolator: InterpolatorStatus,
    /// 平均周期间隔是否超过退化阈值（仅告警，不影响流式控制）
    pub timing_degraded: bool,
}

/// 周期缓冲区（`begin()` 成功后才存在）
#[derive(Debug)]
struct CycleBuffers {
    /// 首个周期发送的锚点（测量状态投影），发送后清空
    anchor: Option<DestinationSetpoint>,
    /// 最新目标设定点
    commanded: DestinationSetpoint,
    last_sent: Option<DestinationSetpoint>,
    measured: MeasuredState,
    reached: Option<bool>,
    interpolator: InterpolatorStatus,
    sequence: u64,
}

#[derive(Debug)]
struct CycleTiming {
    /// 相邻两次 `synchronize()` 调用的间隔
    interval: TimingStatistics,
    /// 单次交换往返耗时
    exchange: TimingStatistics,
    last_call: Option<CycleTimestamp>,
    degraded: bool,
}

/// 流式运行时
pub struct StreamingRuntime {
    state: AtomicRuntimeState,
    session: OnceLock<MotionSession>,
    link: Mutex<Box<dyn ControllerChannel>>,
    buffers: Mutex<Option<CycleBuffers>>,
    timing: Mutex<CycleTiming>,
    cancel: CancelSignal,
    /// 串行化 stop / supersede
    stop_gate: Mutex<()>,
    config: RuntimeConfig,
}

impl StreamingRuntime {
    /// 使用默认配置创建
    pub fn new(channel: impl ControllerChannel + 'static) -> Self {
        Self::with_config(channel, RuntimeConfig::default())
    }

    pub fn with_config(channel: impl ControllerChannel + 'static, config: RuntimeConfig) -> Self {
        let clock = CycleClock::new();
        let timing = CycleTiming {
            interval: TimingStatistics::with_clock(clock.clone()),
            exchange: TimingStatistics::with_clock(clock).with_trace(config.trace_capacity),
            last_call: None,
            degraded: false,
        };
        Self {
            state: AtomicRuntimeState::new(RuntimeState::Idle),
            session: OnceLock::new(),
            link: Mutex::new(Box::new(channel)),
            buffers: Mutex::new(None),
            timing: Mutex::new(timing),
            cancel: CancelSignal::new(),
            stop_gate: Mutex::new(()),
            config,
        }
    }

    /// 包装为 `Arc`（供 `BlendCoordinator` 使用）
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    // ==================== 生命周期 ====================

    /// 绑定会话并打开控制器通道
    ///
    /// Idle → Armed。通道建立失败时进入 Faulted 并返回 `Connection`。
    ///
    /// 通道打开后还会检查：
    /// - 控制器报告的轴数必须与会话一致（否则 `Validation`，Faulted）
    /// - 阻抗控制需要力矩模型校验通过（否则 `Validation(ImpedanceUnavailable)`，Faulted）
    pub fn begin(&self, session: MotionSession) -> Result<()> {
        if !self.state.compare_exchange(RuntimeState::Idle, RuntimeState::Armed) {
            return Err(StreamError::invalid_state("begin", self.state.get()));
        }
        if !session.transition(SessionLifecycle::Created, SessionLifecycle::Commanded) {
            self.state.set(RuntimeState::Idle);
            return Err(StreamError::invalid_state("begin", session.lifecycle()));
        }
        let session = self.session.get_or_init(|| session);

        let request = OpenRequest {
            kind: session.kind(),
            flavor: session.flavor(),
            profile: *session.profile(),
            control_mode: ControlModeParameters::clone(&session.control_mode().current()),
        };
        debug!(
            "Opening controller channel for {} (timeout {:?})",
            session, self.config.connect_timeout
        );

        let mut link = self.link.lock();
        let measured = match link.open(&request, self.config.connect_timeout) {
            Ok(measured) => measured,
            Err(e) => {
                drop(link);
                self.fault("begin", &e);
                return Err(StreamError::Connection(e));
            },
        };

        if measured.axis_count() != session.axis_count() {
            link.force_close();
            drop(link);
            let err = ProtocolError::DimensionMismatch {
                field: "measured.joints",
                expected: session.axis_count(),
                actual: measured.axis_count(),
            };
            self.fault("begin", &err);
            return Err(err.into());
        }

        if request.control_mode.is_impedance() {
            match link.validate_torque_model() {
                Ok(true) => debug!("Torque model validated for {}", request.control_mode.kind()),
                Ok(false) => {
                    link.force_close();
                    drop(link);
                    let err = ProtocolError::ImpedanceUnavailable;
                    self.fault("begin", &err);
                    return Err(err.into());
                },
                Err(e) => {
                    link.force_close();
                    drop(link);
                    self.fault("begin", &e);
                    return Err(StreamError::Connection(e));
                },
            }
        }
        drop(link);

        let anchor = measured.project(session.kind());
        *self.buffers.lock() = Some(CycleBuffers {
            anchor: Some(anchor),
            commanded: session.initial_setpoint().clone(),
            last_sent: None,
            measured,
            reached: None,
            interpolator: InterpolatorStatus::Idle,
            sequence: 0,
        });

        info!(
            "Runtime armed: session {}, {} control",
            session,
            request.control_mode.kind()
        );
        Ok(())
    }

    /// 一次周期交换
    ///
    /// 发送当前设定点和待下发的控制模式更新，阻塞等待本周期应答（有超时）。
    /// 首个成功周期使运行时进入 Governing。
    ///
    /// # 错误
    ///
    /// - Idle / Stopped / Faulted: `InvalidState`
    /// - Draining，或交换过程中被 `stop_motion()` 打断: `OperationCancelled`
    /// - 超时、断开、畸形应答、控制器故障: `Communication`，运行时进入 Faulted，不会自动重试
    pub fn synchronize(&self) -> Result<CycleReport> {
        let state = self.state.get();
        match state {
            RuntimeState::Armed | RuntimeState::Governing => {},
            RuntimeState::Draining => return Err(StreamError::OperationCancelled),
            other => return Err(StreamError::invalid_state("synchronize", other)),
        }
        let session = self.bound_session("synchronize")?;
        self.mark_call();

        let request = {
            let mut guard = self.buffers.lock();
            let buffers = guard
                .as_mut()
                .ok_or_else(|| StreamError::invalid_state("synchronize", state))?;
            buffers.sequence += 1;
            let setpoint = buffers.anchor.take().unwrap_or_else(|| buffers.commanded.clone());
            CycleRequest {
                sequence: buffers.sequence,
                setpoint,
                control_mode: session.control_mode().take_pending().map(Arc::unwrap_or_clone),
            }
        };
        if request.control_mode.is_some() {
            debug!("Cycle {} carries a control mode update", request.sequence);
        }

        let handle = self.timing.lock().exchange.begin_sample();
        let result = self
            .link
            .lock()
            .exchange(&request, self.config.exchange_timeout, &self.cancel);
        self.timing.lock().exchange.end_sample(handle);

        let response = match result {
            Ok(response) => response,
            Err(DriverError::Cancelled) => {
                debug!("Cycle {} cancelled by stop request", request.sequence);
                return Err(StreamError::OperationCancelled);
            },
            Err(e) => return Err(self.cycle_failure(request.sequence, e)),
        };

        if let Err(e) = response.check_against(&request, session.axis_count()) {
            let reason = match e {
                ProtocolError::MalformedResponse(reason) => reason,
                other => other.to_string(),
            };
            return Err(self.cycle_failure(request.sequence, DriverError::Malformed(reason)));
        }
        if let Some(code) = response.fault {
            let e = DriverError::ControllerFault(code);
            return Err(self.cycle_failure(request.sequence, e));
        }

        let CycleResponse {
            sequence,
            measured,
            reached,
            interpolator,
            ..
        } = response;
        if let Some(buffers) = self.buffers.lock().as_mut() {
            buffers.measured = measured;
            buffers.reached = Some(reached);
            buffers.interpolator = interpolator;
            buffers.last_sent = Some(request.setpoint);
        }

        if self.state.compare_exchange(RuntimeState::Armed, RuntimeState::Governing) {
            session.transition(SessionLifecycle::Commanded, SessionLifecycle::Governing);
            info!("Session {} governing after first cycle", session.id());
        } else if self.stop_in_progress() {
            return Err(StreamError::OperationCancelled);
        }

        let timing_degraded = self.check_degraded();
        trace!(
            "Cycle {}: reached={}, interpolator={}",
            sequence, reached, interpolator
        );
        Ok(CycleReport {
            sequence,
            reached,
            interpolator,
            timing_degraded,
        })
    }

    /// 缓冲新的目标设定点
    ///
    /// 仅在 Armed（预加载）和 Governing 时合法；校验失败时缓冲区保持不变，
    /// 非法设定点永远不会到达控制器。
    pub fn set_destination(&self, target: DestinationSetpoint) -> Result<()> {
        let state = self.state.get();
        if !state.is_active() {
            return Err(StreamError::invalid_state("set_destination", state));
        }
        let session = self.bound_session("set_destination")?;
        session.validate_setpoint(&target)?;

        let mut guard = self.buffers.lock();
        let buffers = guard
            .as_mut()
            .ok_or_else(|| StreamError::invalid_state("set_destination", state))?;
        trace!("Destination buffered: {}", target);
        buffers.commanded = target;
        Ok(())
    }

    /// 控制器最近一次报告的到达标志
    ///
    /// 至少完成一个成功周期后才有意义，之前调用返回 `InvalidState`。
    pub fn is_destination_reached(&self) -> Result<bool> {
        self.buffers
            .lock()
            .as_ref()
            .and_then(|b| b.reached)
            .ok_or_else(|| StreamError::invalid_state("is_destination_reached", self.state.get()))
    }

    /// 运行中更新控制模式参数（下一个周期下发）
    pub fn update_control_mode(&self, params: ControlModeParameters) -> Result<()> {
        self.bound_session("update_control_mode")?
            .control_mode()
            .update(params)
    }

    /// 停止运动
    ///
    /// Governing / Armed → Draining → Stopped：触发取消信号，请求控制器减速停止，
    /// 然后在排空超时内等待通道关闭；超时后强制关闭并进入 Faulted。
    ///
    /// 对已 Stopped 的运行时是空操作；Idle / Faulted 时返回 `InvalidState`。
    pub fn stop_motion(&self) -> Result<()> {
        self.shutdown("stop_motion", SessionLifecycle::Stopped)
    }

    /// 混合交接时由 `BlendCoordinator` 调用，会话最终为 Superseded
    pub(crate) fn supersede(&self) -> Result<()> {
        self.shutdown("supersede", SessionLifecycle::Superseded)
    }

    fn shutdown(&self, operation: &'static str, outcome: SessionLifecycle) -> Result<()> {
        let _gate = self.stop_gate.lock();
        if self.state.get() == RuntimeState::Stopped {
            return Ok(());
        }
        // begin() 先切到 Armed 再绑定会话，窗口内的 stop 不能改动状态
        let session = self.bound_session(operation)?;
        loop {
            let state = self.state.get();
            match state {
                RuntimeState::Stopped => return Ok(()),
                RuntimeState::Armed | RuntimeState::Governing => {
                    if self.state.compare_exchange(state, RuntimeState::Draining) {
                        break;
                    }
                },
                other => return Err(StreamError::invalid_state(operation, other)),
            }
        }
        info!("Stopping session {} ({})", session.id(), operation);

        // 先取消，正在等待应答的 synchronize() 会立即释放通道锁
        self.cancel.cancel();
        let mut link = self.link.lock();

        if let Err(e) = link.request_stop() {
            link.force_close();
            drop(link);
            self.fault(operation, &e);
            return Err(StreamError::Communication(e));
        }

        let timeout = self.config.drain_timeout;
        match link.wait_closed(timeout) {
            Ok(true) => {
                drop(link);
                self.state.set(RuntimeState::Stopped);
                session.set_lifecycle(outcome);
                info!("Session {} {}", session.id(), outcome);
                Ok(())
            },
            Ok(false) => {
                link.force_close();
                drop(link);
                warn!(
                    "Controller did not close channel within {:?}, channel force-closed",
                    timeout
                );
                self.fault(operation, &"drain timeout");
                Err(StreamError::DrainTimeout { timeout })
            },
            Err(e) => {
                link.force_close();
                drop(link);
                self.fault(operation, &e);
                Err(StreamError::Communication(e))
            },
        }
    }

    // ==================== 只读访问 ====================

    pub fn state(&self) -> RuntimeState {
        self.state.get()
    }

    pub fn session(&self) -> Option<&MotionSession> {
        self.session.get()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// 最近一次测量状态（`begin()` 时为通道打开时的测量值）
    pub fn measured_state(&self) -> Option<MeasuredState> {
        self.buffers.lock().as_ref().map(|b| b.measured.clone())
    }

    pub fn measured_joints(&self) -> Option<JointVector> {
        self.buffers.lock().as_ref().map(|b| b.measured.joints.clone())
    }

    pub fn measured_pose(&self) -> Option<CartesianPose> {
        self.buffers.lock().as_ref().map(|b| b.measured.pose)
    }

    pub fn measured_redundancy(&self) -> Option<RedundancyInfo> {
        self.buffers.lock().as_ref().and_then(|b| b.measured.redundancy)
    }

    /// 当前缓冲的目标设定点
    pub fn commanded_destination(&self) -> Option<DestinationSetpoint> {
        self.buffers.lock().as_ref().map(|b| b.commanded.clone())
    }

    /// 最近一次实际发送给控制器的设定点
    pub fn last_sent_setpoint(&self) -> Option<DestinationSetpoint> {
        self.buffers.lock().as_ref().and_then(|b| b.last_sent.clone())
    }

    /// 已发出的周期数
    pub fn sequence(&self) -> u64 {
        self.buffers.lock().as_ref().map_or(0, |b| b.sequence)
    }

    pub fn interpolator_status(&self) -> InterpolatorStatus {
        self.buffers
            .lock()
            .as_ref()
            .map_or(InterpolatorStatus::Idle, |b| b.interpolator)
    }

    /// 周期间隔统计快照
    pub fn cycle_statistics(&self) -> TimingStatistics {
        self.timing.lock().interval.clone()
    }

    /// 交换往返耗时统计快照（含可选轨迹）
    pub fn exchange_statistics(&self) -> TimingStatistics {
        self.timing.lock().exchange.clone()
    }

    pub fn is_timing_degraded(&self) -> bool {
        self.timing.lock().degraded
    }

    /// 诊断快照
    pub fn summary(&self) -> RuntimeSummary {
        let (sequence, reached, interpolator) = self
            .buffers
            .lock()
            .as_ref()
            .map_or((0, None, InterpolatorStatus::Idle), |b| {
                (b.sequence, b.reached, b.interpolator)
            });
        let timing = self.timing.lock();
        RuntimeSummary {
            state: self.state.get(),
            session: self.session.get().map(|s| s.id()),
            kind: self.session.get().map(|s| s.kind()),
            control_mode: self.session.get().map(|s| s.control_mode().current().kind()),
            sequence,
            reached,
            interpolator,
            cycle_timing: timing.interval.clone(),
            exchange_timing: timing.exchange.clone(),
            timing_degraded: timing.degraded,
        }
    }

    // ==================== 内部 ====================

    fn bound_session(&self, operation: &'static str) -> Result<&MotionSession> {
        self.session
            .get()
            .ok_or_else(|| StreamError::invalid_state(operation, self.state.get()))
    }

    fn stop_in_progress(&self) -> bool {
        matches!(
            self.state.get(),
            RuntimeState::Draining | RuntimeState::Stopped
        )
    }

    fn mark_call(&self) {
        let mut timing = self.timing.lock();
        let now = timing.interval.clock().now();
        if let Some(last) = timing.last_call {
            timing.interval.record(now.duration_since(last));
        }
        timing.last_call = Some(now);
    }

    fn check_degraded(&self) -> bool {
        let threshold = self.config.degraded_threshold;
        let mut timing = self.timing.lock();
        let degraded = timing.interval.is_degraded(threshold);
        if degraded && !timing.degraded {
            warn!(
                "Cycle timing degraded: mean interval {:.3}ms exceeds {:?}",
                timing.interval.mean_millis(),
                threshold
            );
        } else if !degraded && timing.degraded {
            info!("Cycle timing recovered: {}", timing.interval);
        }
        timing.degraded = degraded;
        degraded
    }

    fn fault(&self, operation: &'static str, reason: &dyn fmt::Display) {
        self.state.set(RuntimeState::Faulted);
        if let Some(session) = self.session.get() {
            session.set_lifecycle(SessionLifecycle::Faulted);
        }
        error!("Runtime faulted during {}(): {}", operation, reason);
    }

    /// 周期失败：仍处于 Armed / Governing 时进入 Faulted；
    /// stop 已接管（Draining / Stopped）时只报告取消，不覆盖停止结果
    fn cycle_failure(&self, sequence: u64, e: DriverError) -> StreamError {
        let faulted = [RuntimeState::Armed, RuntimeState::Governing]
            .into_iter()
            .any(|from| self.state.compare_exchange(from, RuntimeState::Faulted));
        if !faulted {
            debug!("Cycle {} interrupted during stop: {}", sequence, e);
            return StreamError::OperationCancelled;
        }
        if let Some(session) = self.session.get() {
            session.set_lifecycle(SessionLifecycle::Faulted);
        }
        error!("Runtime faulted during synchronize(): {}", e);
        StreamError::Communication(e)
    }
}

impl Drop for StreamingRuntime {
    fn drop(&mut self) {
        let state = self.state.get();
        if !state.is_active() {
            return;
        }
        warn!("StreamingRuntime dropped while {}, closing controller channel", state);
        self.cancel.cancel();
        let link = self.link.get_mut();
        if let Err(e) = link.request_stop() {
            warn!("Stop request failed during drop: {}", e);
        }
        link.force_close();
        self.state.set(RuntimeState::Stopped);
        if let Some(session) = self.session.get() {
            session.set_lifecycle(SessionLifecycle::Stopped);
        }
    }
}

impl fmt::Debug for StreamingRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingRuntime")
            .field("state", &self.state.get())
            .field("session", &self.session.get().map(|s| s.id()))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// 运行时诊断快照
#[derive(Debug, Clone)]
pub struct RuntimeSummary {
    pub state: RuntimeState,
    pub session: Option<SessionId>,
    pub kind: Option<MotionKind>,
    pub control_mode: Option<ControlModeKind>,
    pub sequence: u64,
    pub reached: Option<bool>,
    pub interpolator: InterpolatorStatus,
    pub cycle_timing: TimingStatistics,
    pub exchange_timing: TimingStatistics,
    pub timing_degraded: bool,
}

impl fmt::Display for RuntimeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runtime {}", self.state)?;
        if let (Some(id), Some(kind)) = (self.session, self.kind) {
            write!(f, " | session {} ({}", id, kind)?;
            if let Some(mode) = self.control_mode {
                write!(f, ", {}", mode)?;
            }
            write!(f, ")")?;
        }
        let reached = match self.reached {
            Some(true) => "yes",
            Some(false) => "no",
            None => "n/a",
        };
        writeln!(
            f,
            " | cycle {} | reached: {} | interpolator: {}",
            self.sequence, reached, self.interpolator
        )?;
        writeln!(f, "  interval: {}", self.cycle_timing)?;
        write!(f, "  exchange: {}", self.exchange_timing)?;
        if self.timing_degraded {
            write!(f, "\n  WARNING: cycle timing degraded")?;
        }
        Ok(())
    }
}
