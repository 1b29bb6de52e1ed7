//! 跨线程取消信号
//!
//! 发送端被丢弃后，接收端的 `recv` 会立即返回 `Disconnected`，
//! 因此通道实现可以把它放进 `select!`，在等待控制器应答的同时响应取消。

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;

/// 取消信号（一次性，不可复位）
#[derive(Debug)]
pub struct CancelSignal {
    trigger: Mutex<Option<Sender<()>>>,
    receiver: Receiver<()>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            trigger: Mutex::new(Some(tx)),
            receiver: rx,
        }
    }

    /// 触发取消（幂等）
    ///
    /// 返回 `true` 表示本次调用真正触发了取消。
    pub fn cancel(&self) -> bool {
        self.trigger.lock().take().is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.trigger.lock().is_none()
    }

    /// 用于 `select!` 的接收端，取消后立即就绪
    pub fn receiver(&self) -> &Receiver<()> {
        &self.receiver
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}
