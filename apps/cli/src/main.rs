//! # CSI Motion CLI
//!
//! WiFi CSI 运动检测命令行工具。
//!
//! ```bash
//! # 合成数据演示（无需硬件），在 8888 端口提供遥测
//! csi-motion run --source synthetic --motion 0.5
//!
//! # 回放录制
//! csi-motion run --source replay:capture.csirec --no-telemetry
//!
//! # 订阅遥测
//! csi-motion listen --server 127.0.0.1:8888
//!
//! # 生成合成录制
//! csi-motion synth --output capture.csirec --batches 200 --motion 0.3
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{ConfigCommand, ListenCommand, RunCommand, SynthCommand};

/// 默认日志过滤
const DEFAULT_LOG_FILTER: &str = "csi_motion=info,csi_driver=info";

/// CSI Motion - WiFi 运动检测工具
#[derive(Parser, Debug)]
#[command(name = "csi-motion")]
#[command(about = "WiFi CSI motion detection and telemetry", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 启动监控与 UDP 遥测服务
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 订阅遥测并打印解码后的帧
    Listen {
        #[command(flatten)]
        args: ListenCommand,
    },

    /// 生成合成录制文件
    Synth {
        #[command(flatten)]
        args: SynthCommand,
    },

    /// 打印默认配置（TOML）
    Config {
        #[command(flatten)]
        args: ConfigCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { args } => args.execute(),
        Commands::Listen { args } => args.execute(),
        Commands::Synth { args } => args.execute(),
        Commands::Config { args } => args.execute(),
    }
}
