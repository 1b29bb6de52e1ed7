//! 周期节拍器
//!
//! 引擎本身从不节流 `synchronize()`，节拍由调用方决定。
//! `CyclePacer` 给需要固定周期的调用方提供绝对锚点睡眠：
//! 每次都睡到 `anchor + k × period`，自动扣除本周期耗时操作的时间，
//! 不会像 `sleep(period)` 那样累积漂移。

use std::time::{Duration, Instant};
use tracing::warn;

/// 绝对锚点节拍器
#[derive(Debug)]
pub struct CyclePacer {
    period: Duration,
    next_tick: Instant,
    overruns: u64,
}

impl CyclePacer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_tick: Instant::now(),
            overruns: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// 睡眠到下一个锚点
    ///
    /// 返回 `false` 表示本周期超时（overrun），此时不睡眠并把锚点重置为当前时间。
    pub fn wait(&mut self) -> bool {
        self.next_tick += self.period;
        let now = Instant::now();
        if self.next_tick > now {
            spin_sleep::sleep(self.next_tick - now);
            true
        } else {
            self.overruns += 1;
            warn!(
                "Cycle overrun: {:?} behind schedule (period {:?}), resetting anchor",
                now.duration_since(self.next_tick),
                self.period
            );
            self.next_tick = now;
            false
        }
    }

    /// 以当前时间重新设定锚点
    pub fn reset(&mut self) {
        self.next_tick = Instant::now();
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}

/// 把当前线程提升为实时优先级
///
/// 需要 `realtime` feature；Linux 上通常需要 `CAP_SYS_NICE`。
/// 返回是否成功，失败只记录警告。
#[cfg(feature = "realtime")]
pub fn promote_current_thread() -> bool {
    use thread_priority::{ThreadPriority, set_current_thread_priority};

    match set_current_thread_priority(ThreadPriority::Max) {
        Ok(_) => {
            tracing::info!("Cycle thread priority set to MAX (realtime)");
            true
        },
        Err(e) => {
            warn!(
                "Failed to set cycle thread priority: {:?}. \
                 On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                e
            );
            false
        },
    }
}

#[cfg(not(feature = "realtime"))]
pub fn promote_current_thread() -> bool {
    tracing::debug!("realtime feature disabled, keeping default thread priority");
    false
}
