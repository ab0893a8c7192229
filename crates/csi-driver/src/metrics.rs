//! 检测器运行指标
//!
//! 原子计数器，监控线程和监听线程写入，任意线程读取快照。

use std::sync::atomic::{AtomicU64, Ordering};

/// 检测器指标
#[derive(Debug, Default)]
pub struct DetectorMetrics {
    /// 调用 `capture_dump` 的次数
    pub capture_batches: AtomicU64,

    /// `capture_dump` 返回空（驱动暂时无数据）的次数
    pub null_dumps: AtomicU64,

    /// 解析后选中天线无序列的次数
    pub empty_parses: AtomicU64,

    /// 采集到的记录总数
    pub records_captured: AtomicU64,

    /// 完成评分的次数
    pub estimations: AtomicU64,

    /// 成功发送的遥测帧数（按客户端计）
    pub frames_sent: AtomicU64,

    /// 发送失败次数
    ///
    /// 单个客户端发送失败不影响其余客户端。
    pub send_errors: AtomicU64,

    /// 通过 `register` 报文注册的客户端数
    pub registrations: AtomicU64,
}

impl DetectorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            capture_batches: self.capture_batches.load(Ordering::Relaxed),
            null_dumps: self.null_dumps.load(Ordering::Relaxed),
            empty_parses: self.empty_parses.load(Ordering::Relaxed),
            records_captured: self.records_captured.load(Ordering::Relaxed),
            estimations: self.estimations.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub capture_batches: u64,
    pub null_dumps: u64,
    pub empty_parses: u64,
    pub records_captured: u64,
    pub estimations: u64,
    pub frames_sent: u64,
    pub send_errors: u64,
    pub registrations: u64,
}

impl MetricsSnapshot {
    /// 空 dump 占比（百分比），无采集时返回 0
    pub fn null_dump_rate(&self) -> f64 {
        if self.capture_batches == 0 {
            return 0.0;
        }
        (self.null_dumps as f64 / self.capture_batches as f64) * 100.0
    }
}
