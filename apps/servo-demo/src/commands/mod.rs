//! 示例命令

pub mod blend;
pub mod sine;

pub use blend::BlendCommand;
pub use sine::SineCommand;

use servo_sdk::TimingStatistics;
use std::time::Duration;

/// 周期循环平均耗时超过此值时提示
pub const SLOW_LOOP_THRESHOLD: Duration = Duration::from_millis(150);

/// 打印循环计时并在过慢时提示
pub fn report_loop_timing(timing: &TimingStatistics) {
    println!("⏱️  Overall loop timing: {}", timing);
    if timing.is_degraded(SLOW_LOOP_THRESHOLD) {
        println!(
            "⚠️  Mean loop time {:.1}ms exceeds {:?}, the controller will interpolate coarsely",
            timing.mean_millis(),
            SLOW_LOOP_THRESHOLD
        );
    }
}
