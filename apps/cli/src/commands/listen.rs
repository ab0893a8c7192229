//! listen 命令
//!
//! 向服务端注册并打印收到的遥测帧。

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use csi_driver::REGISTER_PAYLOAD;
use csi_protocol::telemetry::now_ms;
use csi_protocol::{ByteOrder, SampleEncoding, Samples, TelemetryCodec, TelemetryFrame};
use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};
use tracing::warn;

/// 无数据时重新注册的间隔
const REREGISTER_AFTER: Duration = Duration::from_secs(5);

/// 接收超时（用于检查 Ctrl+C）
const POLL_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EncodingArg {
    Amplitude,
    Iq,
}

impl From<EncodingArg> for SampleEncoding {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::Amplitude => SampleEncoding::Amplitude,
            EncodingArg::Iq => SampleEncoding::Iq,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ByteOrderArg {
    Network,
    Little,
}

impl From<ByteOrderArg> for ByteOrder {
    fn from(arg: ByteOrderArg) -> Self {
        match arg {
            ByteOrderArg::Network => ByteOrder::Network,
            ByteOrderArg::Little => ByteOrder::Little,
        }
    }
}

/// listen 命令参数
#[derive(Args, Debug)]
pub struct ListenCommand {
    /// 遥测服务地址（HOST:PORT）
    #[arg(long)]
    pub server: String,

    /// 样本编码（需与服务端一致）
    #[arg(long, value_enum, default_value_t = EncodingArg::Amplitude)]
    pub encoding: EncodingArg,

    /// 字节序（需与服务端一致）
    #[arg(long, value_enum, default_value_t = ByteOrderArg::Network)]
    pub byte_order: ByteOrderArg,

    /// 收到指定帧数后退出（默认一直运行）
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// 每帧打印的样本数
    #[arg(long, default_value_t = 8)]
    pub show: usize,
}

impl ListenCommand {
    fn resolve_server(&self) -> Result<SocketAddr> {
        self.server
            .to_socket_addrs()
            .with_context(|| format!("无法解析服务地址: {}", self.server))?
            .next()
            .ok_or_else(|| anyhow::anyhow!("无法解析服务地址: {}", self.server))
    }

    /// 执行
    pub fn execute(&self) -> Result<()> {
        let server = self.resolve_server()?;
        let bind_addr: SocketAddr = if server.is_ipv6() {
            "[::]:0".parse()?
        } else {
            "0.0.0.0:0".parse()?
        };
        let socket = UdpSocket::bind(bind_addr).context("绑定本地 UDP 端口失败")?;
        socket.set_read_timeout(Some(POLL_TIMEOUT))?;

        let codec = TelemetryCodec::new(self.encoding.into(), self.byte_order.into());
        let shutdown = super::ctrlc_channel()?;

        socket.send_to(REGISTER_PAYLOAD, server)?;
        println!("📡 已向 {server} 注册，等待遥测数据...（Ctrl+C 退出）");

        let mut buf = vec![0u8; 65536];
        let mut received = 0usize;
        let mut last_data = Instant::now();

        while shutdown.try_recv().is_err() {
            if self.count.is_some_and(|n| received >= n) {
                break;
            }

            match socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    last_data = Instant::now();
                    match codec.decode(&buf[..len]) {
                        Ok(frame) => {
                            received += 1;
                            println!("{}", format_frame(&frame, self.show));
                        },
                        Err(e) => warn!(%from, len, "Failed to decode telemetry frame: {e}"),
                    }
                },
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if last_data.elapsed() >= REREGISTER_AFTER {
                        socket.send_to(REGISTER_PAYLOAD, server)?;
                        last_data = Instant::now();
                    }
                },
                Err(e) => return Err(e).context("接收遥测数据失败"),
            }
        }

        println!("\n共收到 {received} 帧");
        Ok(())
    }
}

/// 单行打印一帧
fn format_frame(frame: &TelemetryFrame, show: usize) -> String {
    let latency = now_ms().saturating_sub(frame.timestamp_ms);
    let preview = match &frame.samples {
        Samples::Amplitude(values) => values
            .iter()
            .take(show)
            .map(|v| format!("{v:.1}"))
            .collect::<Vec<_>>()
            .join(", "),
        Samples::Iq(pairs) => pairs
            .iter()
            .take(show)
            .map(|s| format!("({:.1},{:.1})", s.i, s.q))
            .collect::<Vec<_>>()
            .join(", "),
    };
    let more = if frame.samples.len() > show { ", ..." } else { "" };

    format!(
        "[{}] antenna={} packets={} samples={} (+{}ms) [{}{}]",
        frame.timestamp_ms,
        frame.antenna_index,
        frame.packet_count,
        frame.total_sample_count(),
        latency,
        preview,
        more
    )
}
