//! 控制器周期通道抽象
//!
//! 引擎把控制器视为一个可靠的双向周期交换通道，
//! 线格式、握手、心跳都属于通道实现自己的职责。

use crate::cancel::CancelSignal;
use crate::error::DriverError;
use servo_protocol::{CycleRequest, CycleResponse, MeasuredState, OpenRequest};
use std::time::Duration;

/// 控制器周期通道
///
/// 每个 `StreamingRuntime` 独占一个通道实例；
/// 混合（blending）时两个运行时各持有一个通道，由控制器裁决谁在实际执行。
///
/// # 阻塞语义
///
/// - `open` / `exchange` / `wait_closed` 允许阻塞，但必须在给定超时内返回
/// - `exchange` 必须同时监听 `cancel`，被取消时尽快返回 [`DriverError::Cancelled`]
/// - 其余方法不应阻塞
pub trait ControllerChannel: Send {
    /// 建立周期通道并返回当前测量状态
    fn open(
        &mut self,
        request: &OpenRequest,
        timeout: Duration,
    ) -> Result<MeasuredState, DriverError>;

    /// 校验力矩/负载模型是否允许阻抗控制
    fn validate_torque_model(&mut self) -> Result<bool, DriverError>;

    /// 一次双向交换：发送设定点，等待本周期应答
    fn exchange(
        &mut self,
        request: &CycleRequest,
        timeout: Duration,
        cancel: &CancelSignal,
    ) -> Result<CycleResponse, DriverError>;

    /// 请求控制器减速停止（不阻塞）
    fn request_stop(&mut self) -> Result<(), DriverError>;

    /// 等待控制器关闭通道
    ///
    /// 返回 `Ok(false)` 表示超时仍未关闭。
    fn wait_closed(&mut self, timeout: Duration) -> Result<bool, DriverError>;

    /// 强制关闭（排空超时后调用，不可失败）
    fn force_close(&mut self);
}

impl<C: ControllerChannel + ?Sized> ControllerChannel for Box<C> {
    fn open(
        &mut self,
        request: &OpenRequest,
        timeout: Duration,
    ) -> Result<MeasuredState, DriverError> {
        (**self).open(request, timeout)
    }

    fn validate_torque_model(&mut self) -> Result<bool, DriverError> {
        (**self).validate_torque_model()
    }

    fn exchange(
        &mut self,
        request: &CycleRequest,
        timeout: Duration,
        cancel: &CancelSignal,
    ) -> Result<CycleResponse, DriverError> {
        (**self).exchange(request, timeout, cancel)
    }

    fn request_stop(&mut self) -> Result<(), DriverError> {
        (**self).request_stop()
    }

    fn wait_closed(&mut self, timeout: Duration) -> Result<bool, DriverError> {
        (**self).wait_closed(timeout)
    }

    fn force_close(&mut self) {
        (**self).force_close()
    }
}
