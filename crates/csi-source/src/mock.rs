//! Mock 采集源
//!
//! 按脚本返回 dump 结果并记录调用次数，无硬件依赖。

use crate::{CaptureError, CsiSource};
use csi_protocol::CsiRecord;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::time::Duration;

/// 脚本化采集源
///
/// dump 队列为空时返回 `repeat` 设置的批次（未设置则返回 `None`）。
#[derive(Debug, Default)]
pub struct MockCsiSource {
    script: Mutex<VecDeque<Option<Vec<CsiRecord>>>>,
    repeat: Mutex<Option<Vec<CsiRecord>>>,
    dump_delay: Mutex<Duration>,
    start_status: AtomicI32,
    stop_status: AtomicI32,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    dump_calls: AtomicUsize,
    last_interface: Mutex<Option<String>>,
    last_interval_ms: Mutex<Option<u64>>,
    last_dump_count: Mutex<Option<usize>>,
}

impl MockCsiSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一次 dump 的返回值
    pub fn push_dump(&self, dump: Option<Vec<CsiRecord>>) {
        self.script.lock().push_back(dump);
    }

    /// 脚本耗尽后每次 dump 返回的批次
    pub fn set_repeat(&self, batch: Option<Vec<CsiRecord>>) {
        *self.repeat.lock() = batch;
    }

    /// 每次 dump 前阻塞的时间（模拟慢驱动）
    pub fn set_dump_delay(&self, delay: Duration) {
        *self.dump_delay.lock() = delay;
    }

    /// `capture_start` 返回的状态码（0 表示成功）
    pub fn set_start_status(&self, status: i32) {
        self.start_status.store(status, Ordering::SeqCst);
    }

    pub fn set_stop_status(&self, status: i32) {
        self.stop_status.store(status, Ordering::SeqCst);
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn dump_calls(&self) -> usize {
        self.dump_calls.load(Ordering::SeqCst)
    }

    pub fn last_interface(&self) -> Option<String> {
        self.last_interface.lock().clone()
    }

    pub fn last_interval_ms(&self) -> Option<u64> {
        *self.last_interval_ms.lock()
    }

    pub fn last_dump_count(&self) -> Option<usize> {
        *self.last_dump_count.lock()
    }

    fn status(code: i32) -> Result<(), CaptureError> {
        if code == 0 {
            Ok(())
        } else {
            Err(CaptureError::Status(code))
        }
    }
}

impl CsiSource for MockCsiSource {
    fn capture_start(&self, interface: &str, interval_ms: u64) -> Result<(), CaptureError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_interface.lock() = Some(interface.to_string());
        *self.last_interval_ms.lock() = Some(interval_ms);
        Self::status(self.start_status.load(Ordering::SeqCst))
    }

    fn capture_stop(&self, _interface: &str) -> Result<(), CaptureError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Self::status(self.stop_status.load(Ordering::SeqCst))
    }

    fn capture_dump(&self, _interface: &str, count: usize) -> Option<Vec<CsiRecord>> {
        self.dump_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_dump_count.lock() = Some(count);

        let delay = *self.dump_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        // 先取出脚本项再读 repeat，避免同时持有两把锁
        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(dump) => dump,
            None => self.repeat.lock().clone(),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
