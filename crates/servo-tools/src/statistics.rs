//! # 周期耗时统计
//!
//! 累积统计：只做加法，样本一旦记录不会被移除（不开窗）。
//! 单个样本默认不保留，只有显式启用 [`CycleTrace`] 时才保存最近 N 个。
//!
//! 性能退化（均值超过阈值）只作为建议性告警返回给调用方，不会中止流式控制。

use crate::clock::{CycleClock, CycleSample, CycleTimestamp};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// 采样句柄（由 `begin_sample()` 返回，交给 `end_sample()` 结束）
#[derive(Debug)]
#[must_use = "a sample is only recorded once it is passed to end_sample()"]
pub struct SampleHandle {
    sequence: u64,
    start: CycleTimestamp,
}

impl SampleHandle {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// 有界周期轨迹（环形缓冲）
#[derive(Debug, Clone)]
pub struct CycleTrace {
    capacity: usize,
    samples: VecDeque<CycleSample>,
}

impl CycleTrace {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: CycleSample) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 从旧到新迭代
    pub fn iter(&self) -> impl Iterator<Item = &CycleSample> {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&CycleSample> {
        self.samples.back()
    }
}

/// 周期耗时统计
#[derive(Debug, Clone)]
pub struct TimingStatistics {
    clock: CycleClock,
    count: u64,
    total_nanos: u128,
    max_nanos: u64,
    min_nanos: u64,
    next_sequence: u64,
    trace: Option<CycleTrace>,
}

impl TimingStatistics {
    pub fn new() -> Self {
        Self::with_clock(CycleClock::new())
    }

    pub fn with_clock(clock: CycleClock) -> Self {
        Self {
            clock,
            count: 0,
            total_nanos: 0,
            max_nanos: 0,
            min_nanos: u64::MAX,
            next_sequence: 1,
            trace: None,
        }
    }

    /// 启用有界轨迹（`capacity == 0` 表示关闭）
    pub fn with_trace(mut self, capacity: usize) -> Self {
        self.trace = (capacity > 0).then(|| CycleTrace::new(capacity));
        self
    }

    pub fn clock(&self) -> &CycleClock {
        &self.clock
    }

    /// 开始一个采样
    pub fn begin_sample(&mut self) -> SampleHandle {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        SampleHandle {
            sequence,
            start: self.clock.now(),
        }
    }

    /// 结束采样并记录耗时
    pub fn end_sample(&mut self, handle: SampleHandle) -> CycleSample {
        let sample = CycleSample {
            sequence: handle.sequence,
            start: handle.start,
            end: self.clock.now(),
        };
        self.record(sample.duration());
        if let Some(trace) = self.trace.as_mut() {
            trace.push(sample);
        }
        sample
    }

    /// 直接记录一个耗时（例如由外部测得的周期间隔）
    pub fn record(&mut self, duration: Duration) {
        let nanos = duration.as_nanos().min(u64::MAX as u128) as u64;
        self.count += 1;
        self.total_nanos += nanos as u128;
        self.max_nanos = self.max_nanos.max(nanos);
        self.min_nanos = self.min_nanos.min(nanos);
    }

    pub fn sample_count(&self) -> u64 {
        self.count
    }

    /// 平均耗时（无样本时为 `None`）
    pub fn mean_duration(&self) -> Option<Duration> {
        if self.count == 0 {
            return None;
        }
        let mean = self.total_nanos / self.count as u128;
        Some(Duration::from_nanos(mean as u64))
    }

    /// 平均耗时（毫秒，无样本时为 NaN）
    pub fn mean_millis(&self) -> f64 {
        if self.count == 0 {
            return f64::NAN;
        }
        self.total_nanos as f64 / self.count as f64 / 1_000_000.0
    }

    /// 最大耗时（无样本时为零）
    pub fn max_duration(&self) -> Duration {
        Duration::from_nanos(self.max_nanos)
    }

    pub fn min_duration(&self) -> Option<Duration> {
        (self.count > 0).then(|| Duration::from_nanos(self.min_nanos))
    }

    /// 均值是否超过阈值（严格大于，等于阈值不算退化）
    ///
    /// 用整数比较 `Σd > threshold × N`，避免浮点除法在边界上的误差。
    pub fn is_degraded(&self, threshold: Duration) -> bool {
        if self.count == 0 {
            return false;
        }
        self.total_nanos > threshold.as_nanos() * self.count as u128
    }

    pub fn trace(&self) -> Option<&CycleTrace> {
        self.trace.as_ref()
    }
}

impl Default for TimingStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TimingStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            return write!(f, "no samples");
        }
        write!(
            f,
            "{} samples, mean {:.3}ms, min {:.3}ms, max {:.3}ms",
            self.count,
            self.mean_millis(),
            self.min_nanos as f64 / 1_000_000.0,
            self.max_nanos as f64 / 1_000_000.0
        )
    }
}
