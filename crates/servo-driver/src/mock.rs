//! 模拟控制器（测试与演示用）
//!
//! 一个 [`SimulatedController`] 代表一台机械臂，可以派生多个 [`SimulatedChannel`]，
//! 所有通道共享同一份测量状态，用于复现混合（blending）时两个会话同时在线的场景。
//!
//! 动力学极其简化：每周期测量值按 `gain` 向最新设定点逼近，
//! 与设定点的最大偏差小于 `tolerance` 即视为到达。
//!
//! 所有通道操作都记录为 [`SimEvent`]，测试通过事件顺序断言协议行为。

use crate::cancel::CancelSignal;
use crate::channel::ControllerChannel;
use crate::error::DriverError;
use crossbeam_channel::select;
use parking_lot::Mutex;
use servo_protocol::{
    CARTESIAN_DOF, CartesianPose, CycleRequest, CycleResponse, DestinationSetpoint, FaultCode,
    InterpolatorStatus, JointVector, MeasuredState, OpenRequest, RedundancyInfo,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// 模拟通道编号（按创建顺序从 1 开始）
pub type ChannelId = u32;

/// 模拟控制器观察到的事件
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Opened { channel: ChannelId, request: OpenRequest },
    TorqueModelChecked { channel: ChannelId },
    Exchanged { channel: ChannelId, request: CycleRequest },
    StopRequested { channel: ChannelId },
    Closed { channel: ChannelId },
    ForceClosed { channel: ChannelId },
}

impl SimEvent {
    pub fn channel(&self) -> ChannelId {
        match self {
            SimEvent::Opened { channel, .. }
            | SimEvent::TorqueModelChecked { channel }
            | SimEvent::Exchanged { channel, .. }
            | SimEvent::StopRequested { channel }
            | SimEvent::Closed { channel }
            | SimEvent::ForceClosed { channel } => *channel,
        }
    }
}

/// 故障注入（一次性，触发后移除）
///
/// `at_cycle` 为单个通道内的交换次数（从 1 开始）。
#[derive(Debug, Clone, PartialEq)]
pub enum Injection {
    /// 下一次 `open` 等满超时后失败
    ConnectTimeout,
    /// 第 N 次交换时通道断开
    Disconnect { at_cycle: u64 },
    /// 第 N 次交换时控制器不应答
    ExchangeTimeout { at_cycle: u64 },
    /// 第 N 次交换返回错误序号
    MalformedResponse { at_cycle: u64 },
    /// 第 N 次交换报告故障码
    Fault { at_cycle: u64, code: FaultCode },
}

impl Injection {
    fn at_cycle(&self) -> Option<u64> {
        match self {
            Injection::ConnectTimeout => None,
            Injection::Disconnect { at_cycle }
            | Injection::ExchangeTimeout { at_cycle }
            | Injection::MalformedResponse { at_cycle }
            | Injection::Fault { at_cycle, .. } => Some(*at_cycle),
        }
    }
}

#[derive(Debug)]
struct SimState {
    measured: MeasuredState,
    gain: f64,
    tolerance: f64,
    latency: Duration,
    torque_model_valid: bool,
    drain_hangs: bool,
    injections: Vec<Injection>,
    events: Vec<SimEvent>,
    next_channel: ChannelId,
}

impl SimState {
    fn take_injection(&mut self, matches: impl Fn(&Injection) -> bool) -> Option<Injection> {
        let index = self.injections.iter().position(matches)?;
        Some(self.injections.remove(index))
    }

    /// 测量值向设定点逼近一步，返回是否到达
    fn step_towards(&mut self, setpoint: &DestinationSetpoint) -> bool {
        let gain = self.gain;
        match setpoint {
            DestinationSetpoint::Joint(target) => {
                let mut deviation: f64 = 0.0;
                for (current, target) in self.measured.joints.iter_mut().zip(target.iter()) {
                    *current += (target - *current) * gain;
                    deviation = deviation.max((target - *current).abs());
                }
                deviation < self.tolerance
            },
            DestinationSetpoint::Cartesian { pose, redundancy } => {
                let mut deviation: f64 = 0.0;
                let pairs = self
                    .measured
                    .pose
                    .position
                    .iter_mut()
                    .zip(pose.position.iter())
                    .chain(self.measured.pose.orientation.iter_mut().zip(pose.orientation.iter()));
                for (current, target) in pairs {
                    *current += (target - *current) * gain;
                    deviation = deviation.max((target - *current).abs());
                }
                if redundancy.is_some() {
                    self.measured.redundancy = *redundancy;
                }
                deviation < self.tolerance
            },
        }
    }
}

/// 模拟控制器（一台机械臂）
#[derive(Debug, Clone)]
pub struct SimulatedController {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedController {
    /// 以给定关节位置创建
    pub fn new(joints: impl IntoIterator<Item = f64>) -> Self {
        let joints: JointVector = joints.into_iter().collect();
        let redundancy = (joints.len() > CARTESIAN_DOF).then_some(RedundancyInfo {
            elbow_angle: 0.0,
            status: 2,
            turn: 0,
        });
        let measured = MeasuredState {
            joints,
            pose: CartesianPose::new(500.0, 0.0, 500.0, 0.0, std::f64::consts::PI, 0.0),
            redundancy,
        };
        Self {
            state: Arc::new(Mutex::new(SimState {
                measured,
                gain: 0.5,
                tolerance: 1e-4,
                latency: Duration::ZERO,
                torque_model_valid: true,
                drain_hangs: false,
                injections: Vec::new(),
                events: Vec::new(),
                next_channel: 1,
            })),
        }
    }

    /// 7 轴、全零关节位置
    pub fn seven_axis() -> Self {
        Self::new([0.0; 7])
    }

    pub fn with_pose(self, pose: CartesianPose) -> Self {
        self.state.lock().measured.pose = pose;
        self
    }

    /// 每周期应答延迟（可被取消）
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.lock().latency = latency;
        self
    }

    /// 逼近系数（0, 1] 与到达容差
    pub fn with_convergence(self, gain: f64, tolerance: f64) -> Self {
        {
            let mut state = self.state.lock();
            state.gain = gain;
            state.tolerance = tolerance;
        }
        self
    }

    pub fn with_torque_model(self, valid: bool) -> Self {
        self.state.lock().torque_model_valid = valid;
        self
    }

    /// 停止后控制器永不关闭通道
    pub fn with_drain_hang(self) -> Self {
        self.state.lock().drain_hangs = true;
        self
    }

    pub fn inject(self, injection: Injection) -> Self {
        self.state.lock().injections.push(injection);
        self
    }

    /// 派生一个新通道
    pub fn channel(&self) -> SimulatedChannel {
        let id = {
            let mut state = self.state.lock();
            let id = state.next_channel;
            state.next_channel += 1;
            id
        };
        SimulatedChannel {
            id,
            state: self.state.clone(),
            phase: ChannelPhase::Fresh,
            cycles: 0,
        }
    }

    pub fn measured(&self) -> MeasuredState {
        self.state.lock().measured.clone()
    }

    /// 外部扰动：直接改写测量关节值
    pub fn set_measured_joints(&self, joints: impl IntoIterator<Item = f64>) {
        self.state.lock().measured.joints = joints.into_iter().collect();
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.state.lock().events.clone()
    }

    /// 某通道收到的全部周期请求（按顺序）
    pub fn exchanges(&self, channel: ChannelId) -> Vec<CycleRequest> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                SimEvent::Exchanged { channel: c, request } if *c == channel => {
                    Some(request.clone())
                },
                _ => None,
            })
            .collect()
    }

    pub fn stop_requests(&self) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| matches!(e, SimEvent::StopRequested { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelPhase {
    Fresh,
    Open,
    Stopping,
    Closed,
}

/// 模拟控制器上的一个周期通道
#[derive(Debug)]
pub struct SimulatedChannel {
    id: ChannelId,
    state: Arc<Mutex<SimState>>,
    phase: ChannelPhase,
    cycles: u64,
}

impl SimulatedChannel {
    pub fn id(&self) -> ChannelId {
        self.id
    }

    fn record(&self, event: SimEvent) {
        self.state.lock().events.push(event);
    }
}

/// 可取消的等待
fn wait_cancellable(cancel: &CancelSignal, duration: Duration) -> Result<(), DriverError> {
    if duration.is_zero() {
        return Ok(());
    }
    select! {
        recv(cancel.receiver()) -> _ => Err(DriverError::Cancelled),
        default(duration) => Ok(()),
    }
}

impl ControllerChannel for SimulatedChannel {
    fn open(
        &mut self,
        request: &OpenRequest,
        timeout: Duration,
    ) -> Result<MeasuredState, DriverError> {
        if self.phase != ChannelPhase::Fresh {
            return Err(DriverError::Transport(format!("channel {} already opened", self.id)));
        }
        let injected = self
            .state
            .lock()
            .take_injection(|i| matches!(i, Injection::ConnectTimeout));
        if injected.is_some() {
            std::thread::sleep(timeout);
            return Err(DriverError::ConnectTimeout { timeout });
        }

        let measured = {
            let mut state = self.state.lock();
            state.events.push(SimEvent::Opened {
                channel: self.id,
                request: request.clone(),
            });
            state.measured.clone()
        };
        self.phase = ChannelPhase::Open;
        debug!("Simulated channel {} opened ({} motion)", self.id, request.kind);
        Ok(measured)
    }

    fn validate_torque_model(&mut self) -> Result<bool, DriverError> {
        if self.phase != ChannelPhase::Open {
            return Err(DriverError::Disconnected);
        }
        let mut state = self.state.lock();
        state.events.push(SimEvent::TorqueModelChecked { channel: self.id });
        Ok(state.torque_model_valid)
    }

    fn exchange(
        &mut self,
        request: &CycleRequest,
        timeout: Duration,
        cancel: &CancelSignal,
    ) -> Result<CycleResponse, DriverError> {
        if !matches!(self.phase, ChannelPhase::Open | ChannelPhase::Stopping) {
            return Err(DriverError::Disconnected);
        }
        if cancel.is_cancelled() {
            return Err(DriverError::Cancelled);
        }

        self.cycles += 1;
        let cycle = self.cycles;
        let (injection, latency) = {
            let mut state = self.state.lock();
            let injection = state.take_injection(|i| i.at_cycle() == Some(cycle));
            (injection, state.latency)
        };

        match injection {
            Some(Injection::Disconnect { .. }) => {
                self.phase = ChannelPhase::Closed;
                return Err(DriverError::Disconnected);
            },
            Some(Injection::ExchangeTimeout { .. }) => {
                wait_cancellable(cancel, timeout)?;
                return Err(DriverError::ExchangeTimeout {
                    sequence: request.sequence,
                    timeout,
                });
            },
            _ => {},
        }

        if latency > timeout {
            wait_cancellable(cancel, timeout)?;
            return Err(DriverError::ExchangeTimeout {
                sequence: request.sequence,
                timeout,
            });
        }
        wait_cancellable(cancel, latency)?;

        let mut state = self.state.lock();
        state.events.push(SimEvent::Exchanged {
            channel: self.id,
            request: request.clone(),
        });
        let reached = state.step_towards(&request.setpoint);
        let interpolator = if self.phase == ChannelPhase::Stopping {
            InterpolatorStatus::Decelerating
        } else if reached {
            InterpolatorStatus::Converged
        } else {
            InterpolatorStatus::Interpolating
        };
        let (sequence, fault) = match injection {
            Some(Injection::MalformedResponse { .. }) => (request.sequence.wrapping_add(1), None),
            Some(Injection::Fault { code, .. }) => (request.sequence, Some(code)),
            _ => (request.sequence, None),
        };
        trace!(
            "Simulated channel {} cycle {}: reached={}, {}",
            self.id, request.sequence, reached, interpolator
        );
        Ok(CycleResponse {
            sequence,
            measured: state.measured.clone(),
            reached,
            interpolator,
            fault,
        })
    }

    fn request_stop(&mut self) -> Result<(), DriverError> {
        match self.phase {
            ChannelPhase::Open => {
                self.phase = ChannelPhase::Stopping;
                self.record(SimEvent::StopRequested { channel: self.id });
                Ok(())
            },
            ChannelPhase::Stopping | ChannelPhase::Closed => Ok(()),
            ChannelPhase::Fresh => Err(DriverError::Disconnected),
        }
    }

    fn wait_closed(&mut self, timeout: Duration) -> Result<bool, DriverError> {
        if self.phase == ChannelPhase::Closed {
            return Ok(true);
        }
        let hangs = self.state.lock().drain_hangs;
        if hangs {
            std::thread::sleep(timeout);
            return Ok(false);
        }
        self.phase = ChannelPhase::Closed;
        self.record(SimEvent::Closed { channel: self.id });
        Ok(true)
    }

    fn force_close(&mut self) {
        self.phase = ChannelPhase::Closed;
        self.record(SimEvent::ForceClosed { channel: self.id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use servo_protocol::{ControlModeParameters, MotionKind, MotionProfile, ServoFlavor};
    use std::time::Instant;

    fn open_request(kind: MotionKind) -> OpenRequest {
        OpenRequest {
            kind,
            flavor: ServoFlavor::Smart,
            profile: MotionProfile::default(),
            control_mode: ControlModeParameters::PositionOnly,
        }
    }

    fn joint_request(sequence: u64, values: [f64; 7]) -> CycleRequest {
        CycleRequest {
            sequence,
            setpoint: DestinationSetpoint::joints(values),
            control_mode: None,
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(200);

    #[test]
    fn test_open_returns_measured_state() {
        let controller = SimulatedController::new([0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7]);
        let mut channel = controller.channel();
        let measured = channel.open(&open_request(MotionKind::Joint), TIMEOUT).unwrap();
        assert_eq!(measured.axis_count(), 7);
        assert_eq!(measured.joints[6], 0.7);
        assert!(measured.redundancy.is_some());
        assert!(matches!(controller.events()[0], SimEvent::Opened { channel: 1, .. }));
    }

    #[test]
    fn test_converges_towards_setpoint() {
        let controller = SimulatedController::seven_axis().with_convergence(1.0, 1e-6);
        let mut channel = controller.channel();
        let cancel = CancelSignal::new();
        channel.open(&open_request(MotionKind::Joint), TIMEOUT).unwrap();

        let response = channel
            .exchange(&joint_request(1, [0.1; 7]), TIMEOUT, &cancel)
            .unwrap();
        assert!(response.reached);
        assert_eq!(response.interpolator, InterpolatorStatus::Converged);
        assert_eq!(controller.measured().joints[0], 0.1);
    }

    #[test]
    fn test_partial_step_not_reached() {
        let controller = SimulatedController::seven_axis();
        let mut channel = controller.channel();
        let cancel = CancelSignal::new();
        channel.open(&open_request(MotionKind::Joint), TIMEOUT).unwrap();

        let response = channel
            .exchange(&joint_request(1, [1.0; 7]), TIMEOUT, &cancel)
            .unwrap();
        assert!(!response.reached);
        assert_eq!(response.interpolator, InterpolatorStatus::Interpolating);
        assert!((response.measured.joints[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_exchange_before_open_is_disconnected() {
        let controller = SimulatedController::seven_axis();
        let mut channel = controller.channel();
        let err = channel
            .exchange(&joint_request(1, [0.0; 7]), TIMEOUT, &CancelSignal::new())
            .unwrap_err();
        assert_eq!(err, DriverError::Disconnected);
    }

    #[test]
    fn test_injected_faults_are_one_shot() {
        let controller = SimulatedController::seven_axis()
            .inject(Injection::MalformedResponse { at_cycle: 2 })
            .inject(Injection::Fault {
                at_cycle: 3,
                code: FaultCode(0x42),
            });
        let mut channel = controller.channel();
        let cancel = CancelSignal::new();
        channel.open(&open_request(MotionKind::Joint), TIMEOUT).unwrap();

        let r1 = channel.exchange(&joint_request(1, [0.0; 7]), TIMEOUT, &cancel).unwrap();
        assert_eq!(r1.sequence, 1);
        let r2 = channel.exchange(&joint_request(2, [0.0; 7]), TIMEOUT, &cancel).unwrap();
        assert_ne!(r2.sequence, 2);
        let r3 = channel.exchange(&joint_request(3, [0.0; 7]), TIMEOUT, &cancel).unwrap();
        assert_eq!(r3.fault, Some(FaultCode(0x42)));
        let r4 = channel.exchange(&joint_request(4, [0.0; 7]), TIMEOUT, &cancel).unwrap();
        assert_eq!(r4.fault, None);
    }

    #[test]
    fn test_latency_over_timeout_times_out() {
        let controller = SimulatedController::seven_axis().with_latency(Duration::from_millis(50));
        let mut channel = controller.channel();
        channel.open(&open_request(MotionKind::Joint), TIMEOUT).unwrap();
        let err = channel
            .exchange(
                &joint_request(1, [0.0; 7]),
                Duration::from_millis(10),
                &CancelSignal::new(),
            )
            .unwrap_err();
        assert!(matches!(err, DriverError::ExchangeTimeout { sequence: 1, .. }));
    }

    #[test]
    fn test_cancel_interrupts_latency() {
        let controller = SimulatedController::seven_axis().with_latency(Duration::from_secs(2));
        let mut channel = controller.channel();
        channel.open(&open_request(MotionKind::Joint), Duration::from_secs(5)).unwrap();

        let cancel = Arc::new(CancelSignal::new());
        let canceller = {
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                cancel.cancel();
            })
        };
        let start = Instant::now();
        let err = channel
            .exchange(&joint_request(1, [0.0; 7]), Duration::from_secs(5), &cancel)
            .unwrap_err();
        canceller.join().unwrap();
        assert_eq!(err, DriverError::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_stop_and_close_sequence() {
        let controller = SimulatedController::seven_axis();
        let mut channel = controller.channel();
        channel.open(&open_request(MotionKind::Joint), TIMEOUT).unwrap();
        channel.request_stop().unwrap();
        channel.request_stop().unwrap();
        assert!(channel.wait_closed(TIMEOUT).unwrap());
        assert_eq!(controller.stop_requests(), 1);
        assert!(matches!(controller.events().last(), Some(SimEvent::Closed { channel: 1 })));
    }

    #[test]
    fn test_drain_hang_reports_not_closed() {
        let controller = SimulatedController::seven_axis().with_drain_hang();
        let mut channel = controller.channel();
        channel.open(&open_request(MotionKind::Joint), TIMEOUT).unwrap();
        channel.request_stop().unwrap();
        assert!(!channel.wait_closed(Duration::from_millis(10)).unwrap());
        channel.force_close();
        assert!(matches!(
            controller.events().last(),
            Some(SimEvent::ForceClosed { channel: 1 })
        ));
    }

    #[test]
    fn test_connect_timeout_injection() {
        let controller = SimulatedController::seven_axis().inject(Injection::ConnectTimeout);
        let mut channel = controller.channel();
        let err = channel
            .open(&open_request(MotionKind::Joint), Duration::from_millis(5))
            .unwrap_err();
        assert!(err.is_timeout());

        // 注入只生效一次
        let mut second = controller.channel();
        assert!(second.open(&open_request(MotionKind::Joint), TIMEOUT).is_ok());
        assert_eq!(second.id(), 2);
    }

    #[test]
    fn test_cartesian_step_and_redundancy() {
        let controller = SimulatedController::seven_axis().with_convergence(1.0, 1e-6);
        let mut channel = controller.channel();
        let measured = channel.open(&open_request(MotionKind::Cartesian), TIMEOUT).unwrap();
        let target = DestinationSetpoint::cartesian(measured.pose.translated(0.0, 0.0, 10.0))
            .with_redundancy(RedundancyInfo {
                elbow_angle: 0.3,
                status: 2,
                turn: 1,
            });
        let response = channel
            .exchange(
                &CycleRequest {
                    sequence: 1,
                    setpoint: target,
                    control_mode: None,
                },
                TIMEOUT,
                &CancelSignal::new(),
            )
            .unwrap();
        assert!(response.reached);
        assert_eq!(response.measured.pose.position[2], 510.0);
        assert_eq!(response.measured.redundancy.map(|r| r.turn), Some(1));
    }
}
