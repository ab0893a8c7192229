//! 合成采集源
//!
//! 生成带随机扰动的 CSI 记录，运动强度可在运行时调整。
//!
//! 每条记录的振幅轮廓为 `base * (1 + ripple * 0.3 * sin(2πk/n))`，
//! `ripple = 1 + motion * U(-1, 1)`。静止时各包的变异系数几乎相同，
//! 运动强度越大，包间变异系数的离散度越大，评分越高。

use crate::{CaptureError, CsiSource};
use csi_protocol::{Bandwidth, CsiMetadata, CsiRecord, MacAddr};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use tracing::{debug, trace};

/// 振幅基线
const BASE_AMPLITUDE: f64 = 200.0;

/// 轮廓起伏幅度
const PROFILE_DEPTH: f64 = 0.3;

/// 每个 I/Q 分量的加性噪声上限
const NOISE: f64 = 1.5;

/// 合成发送端地址
const TRANSMITTER: MacAddr = MacAddr([0x02, 0x00, 0x5e, 0x10, 0x00, 0x01]);

/// 合成采集源
pub struct SyntheticSource {
    bandwidth: Bandwidth,
    antenna_count: u16,
    motion: Mutex<f64>,
    rng: Mutex<StdRng>,
    running: AtomicBool,
    packet_sn: AtomicU16,
}

impl SyntheticSource {
    /// 创建合成源（随机种子）
    pub fn new(bandwidth: Bandwidth, antenna_count: usize) -> Self {
        Self::with_rng(bandwidth, antenna_count, StdRng::from_entropy())
    }

    /// 固定种子，结果可复现
    pub fn seeded(bandwidth: Bandwidth, antenna_count: usize, seed: u64) -> Self {
        Self::with_rng(bandwidth, antenna_count, StdRng::seed_from_u64(seed))
    }

    fn with_rng(bandwidth: Bandwidth, antenna_count: usize, rng: StdRng) -> Self {
        Self {
            bandwidth,
            antenna_count: antenna_count.clamp(1, u16::MAX as usize) as u16,
            motion: Mutex::new(0.0),
            rng: Mutex::new(rng),
            running: AtomicBool::new(false),
            packet_sn: AtomicU16::new(0),
        }
    }

    /// 设置运动强度（截断到 [0, 1]）
    pub fn set_motion(&self, level: f64) {
        let level = if level.is_finite() { level.clamp(0.0, 1.0) } else { 0.0 };
        *self.motion.lock() = level;
        debug!(level, "Synthetic motion level changed");
    }

    pub fn motion(&self) -> f64 {
        *self.motion.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 生成一批记录，天线轮流出现
    ///
    /// 不检查运行状态，供录制工具直接调用。
    pub fn generate(&self, count: usize) -> Vec<CsiRecord> {
        let motion = self.motion();
        let mut rng = self.rng.lock();
        (0..count)
            .filter_map(|k| {
                let rx = (k % self.antenna_count as usize) as u16;
                self.generate_record(&mut rng, rx, motion)
            })
            .collect()
    }

    fn generate_record(&self, rng: &mut StdRng, rx: u16, motion: f64) -> Option<CsiRecord> {
        let n = self.bandwidth.subcarrier_count();
        let ripple = 1.0 + motion * rng.gen_range(-1.0..=1.0);
        let phase = rng.gen_range(0.0..2.0 * PI);

        let mut data_i = Vec::with_capacity(n);
        let mut data_q = Vec::with_capacity(n);
        for k in 0..n {
            let profile = 1.0 + ripple * PROFILE_DEPTH * (2.0 * PI * k as f64 / n as f64).sin();
            let amplitude = BASE_AMPLITUDE * profile;
            let theta = phase + k as f64 * 0.05;
            data_i.push(to_i16(
                amplitude * theta.cos() + rng.gen_range(-NOISE..=NOISE),
            ));
            data_q.push(to_i16(
                amplitude * theta.sin() + rng.gen_range(-NOISE..=NOISE),
            ));
        }

        let meta = CsiMetadata {
            rssi: -40 - rng.gen_range(0..10),
            snr: rng.gen_range(25..40),
            timestamp: rng.gen_range(0..u32::MAX),
            transmitter: TRANSMITTER,
            tx_index: 0,
            band: 1,
            primary_channel: 36,
            rx_mode: 0,
            packet_sn: self.packet_sn.fetch_add(1, Ordering::Relaxed),
        };

        CsiRecord::new(self.bandwidth, rx, data_i, data_q)
            .map(|record| record.with_metadata(meta))
            .map_err(|e| trace!("Synthetic record rejected: {e}"))
            .ok()
    }
}

fn to_i16(value: f64) -> i16 {
    value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

impl CsiSource for SyntheticSource {
    fn capture_start(&self, interface: &str, interval_ms: u64) -> Result<(), CaptureError> {
        debug!(interface, interval_ms, "Synthetic capture started");
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    fn capture_stop(&self, interface: &str) -> Result<(), CaptureError> {
        debug!(interface, "Synthetic capture stopped");
        self.running.store(false, Ordering::Release);
        Ok(())
    }

    fn capture_dump(&self, _interface: &str, count: usize) -> Option<Vec<CsiRecord>> {
        if !self.is_running() {
            return None;
        }
        Some(self.generate(count))
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_requires_start() {
        let source = SyntheticSource::seeded(Bandwidth::Bw20, 3, 1);
        assert!(source.capture_dump("wlan0", 10).is_none());

        source.capture_start("wlan0", 100).unwrap();
        let batch = source.capture_dump("wlan0", 10).unwrap();
        assert_eq!(batch.len(), 10);

        source.capture_stop("wlan0").unwrap();
        assert!(source.capture_dump("wlan0", 10).is_none());
    }

    #[test]
    fn test_antennas_round_robin() {
        let source = SyntheticSource::seeded(Bandwidth::Bw40, 3, 2);
        let batch = source.generate(7);
        let rx: Vec<u16> = batch.iter().map(CsiRecord::rx_index).collect();
        assert_eq!(rx, vec![0, 1, 2, 0, 1, 2, 0]);
        assert!(batch.iter().all(|r| r.usable_subcarriers() == 128));
    }

    #[test]
    fn test_packet_sn_increments() {
        let source = SyntheticSource::seeded(Bandwidth::Bw20, 1, 3);
        let batch = source.generate(3);
        let sn: Vec<u16> = batch.iter().map(|r| r.metadata().packet_sn).collect();
        assert_eq!(sn, vec![0, 1, 2]);
    }

    #[test]
    fn test_motion_level_clamped() {
        let source = SyntheticSource::seeded(Bandwidth::Bw20, 1, 4);
        source.set_motion(3.0);
        assert_eq!(source.motion(), 1.0);
        source.set_motion(-1.0);
        assert_eq!(source.motion(), 0.0);
        source.set_motion(f64::NAN);
        assert_eq!(source.motion(), 0.0);
    }
}
