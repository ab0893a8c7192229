//! 监控线程主循环
//!
//! 每个周期：采集一批记录 → 按天线解析 → 选中天线评分 → 逐包发送遥测帧 → 休眠。
//! 单次迭代内的任何失败（空 dump、空解析、发送失败）只记录日志，不会终止循环；
//! 只有停止标志能结束循环。

use crate::metrics::DetectorMetrics;
use crate::registry::ClientRegistry;
use crate::server::TelemetrySender;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use csi_protocol::{AmplitudeSequence, TelemetryCodec};
use csi_source::CsiSource;
use csi_tools::{CsiParser, MotionEstimator};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// 跨线程共享的检测状态
///
/// 天线索引与运动评分由同一把锁保护，每次访问只持锁读写一个字段。
#[derive(Debug, Default)]
pub struct MonitorShared {
    inner: Mutex<Selection>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Selection {
    antenna_index: usize,
    motion: f64,
}

impl MonitorShared {
    pub fn new(antenna_index: usize) -> Self {
        Self {
            inner: Mutex::new(Selection {
                antenna_index,
                motion: 0.0,
            }),
        }
    }

    pub fn antenna_index(&self) -> usize {
        self.inner.lock().antenna_index
    }

    pub fn set_antenna_index(&self, index: usize) {
        self.inner.lock().antenna_index = index;
    }

    pub fn motion(&self) -> f64 {
        self.inner.lock().motion
    }

    pub fn set_motion(&self, score: f64) {
        self.inner.lock().motion = score;
    }
}

/// 监控循环的参数与共享句柄
pub struct MonitorContext {
    pub source: Arc<dyn CsiSource>,
    pub interface: String,
    pub interval: Duration,
    pub dump_count: usize,
    pub parser: CsiParser,
    pub estimator: MotionEstimator,
    pub codec: TelemetryCodec,
    pub shared: Arc<MonitorShared>,
    pub registry: Arc<ClientRegistry>,
    /// UDP 服务运行时为 `Some`
    pub sender: Arc<Mutex<Option<TelemetrySender>>>,
    pub metrics: Arc<DetectorMetrics>,
}

/// 监控循环
///
/// - `stop`: 每次迭代开始时检查
/// - `wake`: 休眠期间收到消息或发送端断开时立即醒来
pub fn monitor_loop(ctx: MonitorContext, stop: Arc<AtomicBool>, wake: Receiver<()>) {
    debug!(
        interface = %ctx.interface,
        interval_ms = ctx.interval.as_millis() as u64,
        source = ctx.source.name(),
        "Monitor loop started"
    );

    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }

        run_iteration(&ctx);

        match wake.recv_timeout(ctx.interval) {
            Err(RecvTimeoutError::Timeout) => {},
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                trace!("Monitor loop woken");
                if !stop.load(Ordering::Acquire) {
                    warn!("Monitor loop woken without stop request, exiting");
                }
                break;
            },
        }
    }

    debug!(interface = %ctx.interface, "Monitor loop exited");
}

/// 执行一次采集周期
pub fn run_iteration(ctx: &MonitorContext) {
    DetectorMetrics::incr(&ctx.metrics.capture_batches);

    let Some(records) = ctx.source.capture_dump(&ctx.interface, ctx.dump_count) else {
        DetectorMetrics::incr(&ctx.metrics.null_dumps);
        debug!(interface = %ctx.interface, "capture_dump returned no data");
        return;
    };
    DetectorMetrics::add(&ctx.metrics.records_captured, records.len() as u64);

    let per_antenna = ctx.parser.parse_all(Some(&records));
    estimate(ctx, &per_antenna);
    publish(ctx, &per_antenna);
}

fn estimate(ctx: &MonitorContext, per_antenna: &[Vec<AmplitudeSequence>]) {
    let antenna = ctx.shared.antenna_index();
    let sequences = match per_antenna.get(antenna) {
        Some(seqs) if !seqs.is_empty() => seqs,
        _ => {
            DetectorMetrics::incr(&ctx.metrics.empty_parses);
            debug!(antenna, "No CSI sequences for selected antenna");
            return;
        },
    };

    let result = ctx.estimator.estimate_detailed(sequences);
    ctx.shared.set_motion(result.score);
    DetectorMetrics::incr(&ctx.metrics.estimations);
    debug!(
        antenna,
        score = result.score,
        kurtosis_deviation = result.deviation,
        used = result.samples_used,
        rejected = result.samples_rejected,
        "Motion score updated"
    );
}

fn publish(ctx: &MonitorContext, per_antenna: &[Vec<AmplitudeSequence>]) {
    // 只在锁内克隆发送端和客户端列表，发送时不持有任何锁
    let Some(sender) = ctx.sender.lock().clone() else {
        return;
    };
    let clients = ctx.registry.snapshot();
    if clients.is_empty() {
        return;
    }

    for (antenna, packets) in per_antenna.iter().enumerate() {
        for packet in packets.iter().filter(|p| !p.is_empty()) {
            let frame = ctx
                .codec
                .encode(std::slice::from_ref(packet), antenna as u32);
            sender.send_frame(&frame, &clients, &ctx.metrics);
        }
    }
}
