//! # 周期时钟
//!
//! **锚点相对时间模式**：
//! - 以时钟创建时刻为锚点的单调时间
//! - 不受系统时钟调整（NTP、手动修改）影响
//! - 以纳秒存储在 `AtomicU64` 中，可无锁读取

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 周期时间戳（相对时钟锚点的纳秒数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CycleTimestamp(u64);

impl CycleTimestamp {
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub const fn as_micros(self) -> u64 {
        self.0 / 1_000
    }

    /// 与更早时间戳的差值（饱和到零）
    pub fn duration_since(self, earlier: CycleTimestamp) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

/// 单周期采样
///
/// 不变式：`end >= start`，同一统计实例内序号严格递增。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSample {
    pub sequence: u64,
    pub start: CycleTimestamp,
    pub end: CycleTimestamp,
}

impl CycleSample {
    pub fn duration(&self) -> Duration {
        self.end.duration_since(self.start)
    }
}

/// 单调周期时钟
///
/// `now()` 返回的时间戳保证单调不减：即便底层 `Instant` 在极端平台上出现回退，
/// 也会被 `fetch_max` 钳住。
#[derive(Debug)]
pub struct CycleClock {
    origin: Instant,
    last: AtomicU64,
}

impl CycleClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last: AtomicU64::new(0),
        }
    }

    /// 当前时间戳（纳秒分辨率）
    pub fn now(&self) -> CycleTimestamp {
        let raw = self.origin.elapsed().as_nanos().min(u64::MAX as u128) as u64;
        let prev = self.last.fetch_max(raw, Ordering::AcqRel);
        CycleTimestamp(prev.max(raw))
    }

    /// 自 `t` 以来经过的时间（永不为负）
    pub fn elapsed_since(&self, t: CycleTimestamp) -> Duration {
        self.now().duration_since(t)
    }

    /// 时钟锚点
    pub fn origin(&self) -> Instant {
        self.origin
    }
}

impl Default for CycleClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for CycleClock {
    fn clone(&self) -> Self {
        Self {
            origin: self.origin,
            last: AtomicU64::new(self.last.load(Ordering::Acquire)),
        }
    }
}
