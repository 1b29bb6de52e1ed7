//! 混合命令
//!
//! 第一个会话驶向 `home + offset`，途中装载第二个会话（目标 `home - offset`），
//! 后继完成首个周期后交接，前驱变为 Superseded，后继运行到目标到达。

use super::report_loop_timing;
use super::sine::HOME_POSITION;
use anyhow::{Context, Result};
use clap::Args;
use servo_sdk::driver::SimulatedController;
use servo_sdk::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

/// 混合命令参数
#[derive(Args, Debug)]
pub struct BlendCommand {
    /// 交接前第一个会话运行的周期数
    #[arg(long, default_value_t = 50)]
    pub cycles_before_blend: u32,

    /// 交接后最多运行的周期数
    #[arg(long, default_value_t = 500)]
    pub cycles_after_blend: u32,

    /// 关节偏移（弧度）
    #[arg(long, default_value_t = 0.3)]
    pub offset: f64,

    /// 模拟控制器应答延迟（毫秒）
    #[arg(long, default_value_t = 0)]
    pub latency_ms: u64,
}

impl BlendCommand {
    pub fn execute(&self, config: &StreamConfig, running: &AtomicBool) -> Result<()> {
        let controller = SimulatedController::new(HOME_POSITION)
            .with_latency(Duration::from_millis(self.latency_ms));
        let coordinator = BlendCoordinator::new();

        let outcome = self.run(&controller, &coordinator, config, running);
        if let Err(e) = coordinator.stop_all() {
            warn!("Failed to stop all runtimes: {}", e);
        }
        outcome
    }

    fn run(
        &self,
        controller: &SimulatedController,
        coordinator: &BlendCoordinator,
        config: &StreamConfig,
        running: &AtomicBool,
    ) -> Result<()> {
        let runtime_config = RuntimeConfig::from(config);
        let mut pacer = CyclePacer::new(config.period());
        let mut timing = TimingStatistics::new();

        // 第一个会话
        let first =
            StreamingRuntime::with_config(controller.channel(), runtime_config.clone()).shared();
        let s1 = self.session(config, self.offset)?;
        println!("🚀 Starting {}", s1);
        coordinator.start(first.clone(), s1)?;
        for _ in 0..self.cycles_before_blend {
            if !running.load(Ordering::SeqCst) {
                println!("🛑 Interrupted before blend");
                return Ok(());
            }
            let step = timing.begin_sample();
            first.synchronize()?;
            timing.end_sample(step);
            pacer.wait();
        }
        println!("{}", first.summary());

        // 装载后继，前驱仍在 Governing
        let second = StreamingRuntime::with_config(controller.channel(), runtime_config).shared();
        let s2 = self.session(config, -self.offset)?;
        println!("🔀 Arming {}", s2);
        coordinator.arm_successor(second.clone(), s2)?;

        // 过渡周期：前驱继续下发，后继完成首个周期
        first.synchronize()?;
        second.synchronize().context("successor failed its first cycle")?;

        let governing = coordinator.hand_over().context("hand-over failed")?;
        println!("✅ Hand-over complete, outgoing is {}", first.state());

        let mut reached = false;
        for _ in 0..self.cycles_after_blend {
            if !running.load(Ordering::SeqCst) {
                println!("🛑 Interrupted after blend");
                break;
            }
            let step = timing.begin_sample();
            reached = governing.synchronize()?.reached;
            timing.end_sample(step);
            if reached {
                break;
            }
            pacer.wait();
        }

        println!("{}", governing.summary());
        println!("🎯 Destination reached: {}", reached);
        report_loop_timing(&timing);
        Ok(())
    }

    fn session(&self, config: &StreamConfig, offset: f64) -> Result<MotionSession> {
        let target = HOME_POSITION.map(|q| q + offset);
        Ok(MotionSession::joint(target).profile(config.to_profile()).build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_runs_to_completion() {
        let mut config = StreamConfig::default();
        config.cycle.period_ms = 1;
        let command = BlendCommand {
            cycles_before_blend: 5,
            cycles_after_blend: 100,
            offset: 0.3,
            latency_ms: 0,
        };
        let running = AtomicBool::new(true);
        command.execute(&config, &running).unwrap();
    }

    #[test]
    fn test_blend_interrupted() {
        let command = BlendCommand {
            cycles_before_blend: 5,
            cycles_after_blend: 5,
            offset: 0.3,
            latency_ms: 0,
        };
        let running = AtomicBool::new(false);
        command.execute(&StreamConfig::default(), &running).unwrap();
    }
}
