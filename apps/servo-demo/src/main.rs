//! # Servo Demo
//!
//! 在模拟控制器上运行的流式控制示例：
//!
//! ```bash
//! # 关节空间正弦运动，每 runs/10 个周期调整一次笛卡尔刚度
//! servo-demo sine --runs 600 --impedance
//!
//! # 笛卡尔空间（沿 Z 轴）正弦运动
//! servo-demo sine --space cartesian
//!
//! # 两个会话之间的无停顿交接
//! servo-demo blend --cycles-before-blend 50
//!
//! # 使用配置文件
//! servo-demo --config servo.toml sine
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use servo_sdk::StreamConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;

use commands::{BlendCommand, SineCommand};

/// Servo Demo - 流式伺服控制示例
#[derive(Parser, Debug)]
#[command(name = "servo-demo")]
#[command(
    about = "Sample streaming and blending applications on a simulated controller",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// TOML 配置文件（周期、超时、运动参数）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 正弦轨迹流式控制（可选阻抗模式）
    Sine {
        #[command(flatten)]
        args: SineCommand,
    },

    /// 两个运动会话之间的混合交接
    Blend {
        #[command(flatten)]
        args: BlendCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    servo_sdk::init_logging_with("servo_demo=info,servo_client=info");

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => StreamConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => StreamConfig::default(),
    };

    // Ctrl-C 只设置标志，由周期循环在下一个周期边界退出并正常停止
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })
        .context("failed to install Ctrl-C handler")?;
    }

    if servo_sdk::driver::promote_current_thread() {
        tracing::info!("Cycle thread promoted to real-time priority");
    }

    match cli.command {
        Commands::Sine { args } => args.execute(&config, &running),
        Commands::Blend { args } => args.execute(&config, &running),
    }
}
