//! run 命令
//!
//! 启动监控和 UDP 遥测服务，定期打印运动评分，Ctrl+C 退出。

use anyhow::{Context, Result};
use clap::Args;
use crossbeam_channel::RecvTimeoutError;
use csi_driver::{DetectorConfig, MetricsSnapshot, MotionDetector};
use csi_protocol::Bandwidth;
use csi_source::{CsiSource, ReplaySource, SyntheticSource};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 采集源
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// 合成数据
    Synthetic,
    /// 回放录制文件
    Replay(PathBuf),
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "synthetic" {
            return Ok(SourceKind::Synthetic);
        }
        match s.strip_prefix("replay:") {
            Some(path) if !path.is_empty() => Ok(SourceKind::Replay(PathBuf::from(path))),
            _ => Err(format!(
                "unknown source {s:?} (expected `synthetic` or `replay:PATH`)"
            )),
        }
    }
}

/// run 命令参数
#[derive(Args, Debug)]
pub struct RunCommand {
    /// 配置文件（TOML）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 采集源：`synthetic` 或 `replay:PATH`
    #[arg(short, long, default_value = "synthetic")]
    pub source: SourceKind,

    /// 网卡接口（覆盖配置）
    #[arg(short, long)]
    pub interface: Option<String>,

    /// 采集间隔（毫秒，覆盖配置）
    #[arg(long)]
    pub interval: Option<u64>,

    /// 每次 dump 的记录数（覆盖配置）
    #[arg(long)]
    pub dump_count: Option<usize>,

    /// 无运动阈值（覆盖配置）
    #[arg(long)]
    pub min_deviation: Option<f64>,

    /// 满分区间宽度（覆盖配置）
    #[arg(long)]
    pub max_deviation: Option<f64>,

    /// 参与评分的天线（覆盖配置）
    #[arg(short, long)]
    pub antenna: Option<usize>,

    /// UDP 遥测端口（覆盖配置）
    #[arg(long)]
    pub udp_port: Option<u16>,

    /// 不启动 UDP 遥测服务
    #[arg(long)]
    pub no_telemetry: bool,

    /// 合成源的运动强度 [0, 1]
    #[arg(long, default_value_t = 0.3)]
    pub motion: f64,

    /// 回放到末尾后从头开始
    #[arg(long = "loop")]
    pub loop_replay: bool,

    /// 打印评分的间隔（毫秒）
    #[arg(long, default_value_t = 1000)]
    pub print_interval: u64,
}

impl RunCommand {
    /// 合并配置文件与命令行覆盖项
    pub fn resolve_config(&self) -> Result<DetectorConfig> {
        let mut config = match &self.config {
            Some(path) => DetectorConfig::load_from_file(path)
                .with_context(|| format!("加载配置文件失败: {}", path.display()))?,
            None => DetectorConfig::default(),
        };

        if let Some(interface) = &self.interface {
            config.interface = interface.clone();
        }
        if let Some(interval) = self.interval {
            config.interval_ms = interval;
        }
        if let Some(dump_count) = self.dump_count {
            config.dump_count = dump_count;
        }
        if let Some(min) = self.min_deviation {
            config.estimator.min_deviation = min;
        }
        if let Some(max) = self.max_deviation {
            config.estimator.max_deviation = max;
        }
        if let Some(antenna) = self.antenna {
            config.antenna_index = antenna;
        }
        if let Some(port) = self.udp_port {
            config.telemetry.port = port;
        }
        if self.no_telemetry {
            config.telemetry.enabled = false;
        }

        config.validate().context("配置无效")?;
        Ok(config)
    }

    fn open_source(&self, config: &DetectorConfig) -> Result<Arc<dyn CsiSource>> {
        let source: Arc<dyn CsiSource> = match &self.source {
            SourceKind::Synthetic => {
                let synthetic = SyntheticSource::new(Bandwidth::Bw20, config.antenna_count);
                synthetic.set_motion(self.motion);
                Arc::new(synthetic)
            },
            SourceKind::Replay(path) => Arc::new(
                ReplaySource::open(path)
                    .with_context(|| format!("打开录制文件失败: {}", path.display()))?
                    .looping(self.loop_replay),
            ),
        };
        Ok(source)
    }

    /// 执行
    pub fn execute(&self) -> Result<()> {
        let config = self.resolve_config()?;
        let source = self.open_source(&config)?;
        let detector = Arc::new(MotionDetector::new(config.clone(), source)?);

        if config.telemetry.enabled {
            let addr = detector.start_udp_server(config.telemetry.port)?;
            println!("📡 遥测服务: {addr}（客户端发送 `register` 订阅）");
        }

        detector.start_monitoring(&config.interface, config.interval_ms)?;
        println!(
            "✅ 开始监控 {}（间隔 {}ms，天线 {}），Ctrl+C 退出",
            config.interface, config.interval_ms, config.antenna_index
        );

        let shutdown = super::ctrlc_channel()?;
        let period = Duration::from_millis(self.print_interval.max(100));
        loop {
            match shutdown.recv_timeout(period) {
                Err(RecvTimeoutError::Timeout) => {
                    println!(
                        "motion: {:5.1}%  antenna: {}  clients: {}",
                        detector.get_motion(),
                        detector.get_antenna_idx(),
                        detector.udp_clients().len()
                    );
                },
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        println!("\n⏳ 正在停止...");
        detector.stop_monitoring()?;
        detector.stop_udp_server();

        let metrics = detector.metrics();
        info!(?metrics, "Detector stopped");
        println!("{}", summary_line(&metrics));
        Ok(())
    }
}

/// 退出时打印的统计
fn summary_line(metrics: &MetricsSnapshot) -> String {
    format!(
        "📊 采集 {} 次（空 {}，{:.1}%），记录 {} 条，评分 {} 次，发送 {} 帧（失败 {}）",
        metrics.capture_batches,
        metrics.null_dumps,
        metrics.null_dump_rate(),
        metrics.records_captured,
        metrics.estimations,
        metrics.frames_sent,
        metrics.send_errors
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        args: RunCommand,
    }

    fn parse(args: &[&str]) -> RunCommand {
        let mut argv = vec!["test"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().args
    }

    #[test]
    fn test_source_kind() {
        assert_eq!("synthetic".parse::<SourceKind>(), Ok(SourceKind::Synthetic));
        assert_eq!(
            "replay:/tmp/x.csirec".parse::<SourceKind>(),
            Ok(SourceKind::Replay(PathBuf::from("/tmp/x.csirec")))
        );
        assert!("replay:".parse::<SourceKind>().is_err());
        assert!("netlink".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_cli_overrides_defaults() {
        let cmd = parse(&[
            "--interface",
            "wlp3s0",
            "--interval",
            "250",
            "--min-deviation",
            "0.01",
            "--antenna",
            "2",
            "--udp-port",
            "9000",
            "--no-telemetry",
        ]);
        let config = cmd.resolve_config().unwrap();
        assert_eq!(config.interface, "wlp3s0");
        assert_eq!(config.interval_ms, 250);
        assert_eq!(config.estimator.min_deviation, 0.01);
        assert_eq!(config.estimator.max_deviation, 0.05);
        assert_eq!(config.antenna_index, 2);
        assert_eq!(config.telemetry.port, 9000);
        assert!(!config.telemetry.enabled);
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "interface = \"wlan7\"\ninterval_ms = 500\n[estimator]\nmax_deviation = 0.2").unwrap();
        file.flush().unwrap();

        let path = file.path().to_str().unwrap();
        let cmd = parse(&["--config", path, "--interval", "50"]);
        let config = cmd.resolve_config().unwrap();
        assert_eq!(config.interface, "wlan7");
        assert_eq!(config.interval_ms, 50);
        assert_eq!(config.estimator.max_deviation, 0.2);
    }

    #[test]
    fn test_summary_reports_null_dump_rate() {
        let metrics = MetricsSnapshot {
            capture_batches: 8,
            null_dumps: 2,
            records_captured: 600,
            estimations: 6,
            ..Default::default()
        };
        let line = summary_line(&metrics);
        assert!(line.contains("空 2，25.0%"), "{line}");
        assert!(line.contains("记录 600 条"), "{line}");

        let idle = summary_line(&MetricsSnapshot::default());
        assert!(idle.contains("空 0，0.0%"), "{idle}");
    }

    #[test]
    fn test_invalid_override_rejected() {
        let cmd = parse(&["--antenna", "3"]);
        assert!(cmd.resolve_config().is_err());
        let cmd = parse(&["--interval", "0"]);
        assert!(cmd.resolve_config().is_err());
    }
}
