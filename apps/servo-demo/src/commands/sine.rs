//! 正弦轨迹命令
//!
//! 从当前位置出发叠加正弦偏移并逐周期下发，阻抗模式下每 `runs / 10` 个周期调整一次刚度。

use super::report_loop_timing;
use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use servo_sdk::driver::SimulatedController;
use servo_sdk::prelude::*;
use servo_sdk::protocol::MeasuredState;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// 模拟机械臂的起始关节位置（弧度）
pub const HOME_POSITION: [f64; 7] = [0.0, PI / 6.0, 0.0, -PI / 3.0, 0.0, PI / 2.0, 0.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Space {
    /// 所有关节同步摆动
    Joint,
    /// 工具沿 Z 轴上下运动
    Cartesian,
}

/// 正弦命令参数
#[derive(Args, Debug)]
pub struct SineCommand {
    /// 周期数
    #[arg(long, default_value_t = 600)]
    pub runs: u32,

    /// 关节摆幅（弧度）
    #[arg(long, default_value_t = 0.2)]
    pub amplitude: f64,

    /// 笛卡尔摆幅（毫米）
    #[arg(long, default_value_t = 50.0)]
    pub amplitude_mm: f64,

    /// 频率（Hz）
    #[arg(long, default_value_t = 0.1)]
    pub frequency: f64,

    /// 运动空间
    #[arg(long, value_enum, default_value_t = Space::Joint)]
    pub space: Space,

    /// 笛卡尔阻抗控制（默认仅位置控制）
    #[arg(long)]
    pub impedance: bool,

    /// Direct 流式（关闭控制器侧轨迹生成）
    #[arg(long)]
    pub direct: bool,

    /// 每周期模拟的计算耗时（毫秒）
    #[arg(long, default_value_t = 0)]
    pub compute_ms: u64,

    /// 模拟控制器应答延迟（毫秒）
    #[arg(long, default_value_t = 0)]
    pub latency_ms: u64,
}

impl SineCommand {
    pub fn execute(&self, config: &StreamConfig, running: &AtomicBool) -> Result<()> {
        if self.runs == 0 {
            bail!("--runs must be positive");
        }

        let controller = SimulatedController::new(HOME_POSITION)
            .with_latency(Duration::from_millis(self.latency_ms));
        let initial = controller.measured();
        let session = self.build_session(config, &initial)?;
        let runtime =
            StreamingRuntime::with_config(controller.channel(), RuntimeConfig::from(config));

        println!("🚀 Starting {} ({})", session, session.control_mode().current().kind());
        runtime.begin(session).context("failed to start streaming")?;

        let mut timing = TimingStatistics::new();
        let outcome = self.run_cycles(&runtime, &initial, config, running, &mut timing);

        println!("{}", runtime.summary());
        if runtime.state().is_active() {
            runtime.stop_motion().context("failed to stop motion")?;
            println!("✅ Motion stopped");
        }
        report_loop_timing(&timing);
        outcome
    }

    fn build_session(
        &self,
        config: &StreamConfig,
        initial: &MeasuredState,
    ) -> Result<MotionSession> {
        let builder = match self.space {
            Space::Joint => MotionSession::joint(initial.joints.iter().copied()),
            Space::Cartesian => MotionSession::cartesian(initial.pose, initial.axis_count()),
        };
        let mut builder = builder.profile(config.to_profile()).flavor(if self.direct {
            ServoFlavor::Direct
        } else {
            ServoFlavor::Smart
        });
        if self.impedance {
            builder = builder.control_mode(stiffness_at(0, self.runs));
        }
        Ok(builder.build()?)
    }

    fn run_cycles(
        &self,
        runtime: &StreamingRuntime,
        initial: &MeasuredState,
        config: &StreamConfig,
        running: &AtomicBool,
        timing: &mut TimingStatistics,
    ) -> Result<()> {
        let mut pacer = CyclePacer::new(config.period());
        let stiffness_interval = (self.runs / 10).max(1);
        let omega = 2.0 * PI * self.frequency;
        let start = Instant::now();

        for i in 0..self.runs {
            if !running.load(Ordering::SeqCst) {
                println!("🛑 Interrupted at cycle {}", i);
                break;
            }
            let step = timing.begin_sample();

            if self.compute_ms > 0 {
                thread::sleep(Duration::from_millis(self.compute_ms));
            }
            runtime
                .synchronize()
                .with_context(|| format!("cycle {} failed", i))?;

            let wave = (omega * start.elapsed().as_secs_f64()).sin();
            runtime.set_destination(self.destination(initial, wave))?;

            if self.impedance && i % stiffness_interval == 0 {
                runtime.update_control_mode(stiffness_at(i, self.runs).into())?;
            }
            if i % 100 == 0 {
                debug!("Step {}: {}", i, runtime.summary());
            }

            timing.end_sample(step);
            pacer.wait();
        }
        if pacer.overruns() > 0 {
            println!("⚠️  {} cycles overran the {:?} period", pacer.overruns(), pacer.period());
        }
        Ok(())
    }

    fn destination(&self, initial: &MeasuredState, wave: f64) -> DestinationSetpoint {
        match self.space {
            Space::Joint => DestinationSetpoint::joints(
                initial.joints.iter().map(|q| q + wave * self.amplitude),
            ),
            Space::Cartesian => DestinationSetpoint::cartesian(
                initial.pose.translated(0.0, 0.0, wave * self.amplitude_mm),
            ),
        }
    }
}

/// 刚度随进度线性增加
fn stiffness_at(cycle: u32, runs: u32) -> ImpedanceParameters {
    let progress = f64::from(cycle) / f64::from(runs) + 1.0;
    ImpedanceParameters::cartesian(1000.0 * progress, 150.0 * progress)
}
