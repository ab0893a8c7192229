//! 录制回放采集源

use crate::{CaptureError, CsiSource};
use csi_protocol::CsiRecord;
use csi_tools::recording::CsiRecording;
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info};

/// 按录制顺序逐批返回记录
///
/// 录制中的空批次回放为 `None`（与驱动暂时无数据的行为一致）。
pub struct ReplaySource {
    batches: Vec<Vec<CsiRecord>>,
    cursor: Mutex<usize>,
    looping: bool,
}

impl ReplaySource {
    pub fn new(recording: CsiRecording) -> Self {
        Self {
            batches: recording.batches,
            cursor: Mutex::new(0),
            looping: false,
        }
    }

    /// 从录制文件加载
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let recording = CsiRecording::load(path.as_ref())
            .map_err(|e| CaptureError::Recording(format!("{e:#}")))?;
        info!(
            path = %path.as_ref().display(),
            batches = recording.batch_count(),
            records = recording.record_count(),
            "Recording loaded"
        );
        Ok(Self::new(recording))
    }

    /// 回放到末尾后从头开始
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    fn next_batch(&self) -> Option<&Vec<CsiRecord>> {
        let mut cursor = self.cursor.lock();
        if *cursor >= self.batches.len() {
            if !self.looping || self.batches.is_empty() {
                return None;
            }
            debug!("Replay wrapped around");
            *cursor = 0;
        }

        let batch = self.batches.get(*cursor);
        *cursor += 1;
        batch
    }
}

impl CsiSource for ReplaySource {
    fn capture_start(&self, interface: &str, interval_ms: u64) -> Result<(), CaptureError> {
        debug!(interface, interval_ms, "Replay capture started");
        Ok(())
    }

    fn capture_stop(&self, interface: &str) -> Result<(), CaptureError> {
        debug!(interface, "Replay capture stopped");
        Ok(())
    }

    fn capture_dump(&self, _interface: &str, count: usize) -> Option<Vec<CsiRecord>> {
        let batch = self.next_batch()?;
        if batch.is_empty() {
            return None;
        }
        Some(batch.iter().take(count).cloned().collect())
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csi_protocol::Bandwidth;
    use csi_tools::recording::RecordingMetadata;

    fn recording() -> CsiRecording {
        let record = |rx| CsiRecord::new(Bandwidth::Bw20, rx, vec![1; 64], vec![2; 64]).unwrap();
        let mut rec = CsiRecording::new(RecordingMetadata::new("wlan0", 100));
        rec.add_batch(vec![record(0), record(1), record(2)]);
        rec.add_batch(Vec::new());
        rec.add_batch(vec![record(1)]);
        rec
    }

    #[test]
    fn test_replay_in_order() {
        let source = ReplaySource::new(recording());
        assert_eq!(source.batch_count(), 3);

        assert_eq!(source.capture_dump("wlan0", 100).unwrap().len(), 3);
        assert!(source.capture_dump("wlan0", 100).is_none());
        assert_eq!(source.capture_dump("wlan0", 100).unwrap()[0].rx_index(), 1);
        assert!(source.capture_dump("wlan0", 100).is_none());
    }

    #[test]
    fn test_replay_truncates_to_count() {
        let source = ReplaySource::new(recording());
        assert_eq!(source.capture_dump("wlan0", 2).unwrap().len(), 2);
    }

    #[test]
    fn test_replay_looping() {
        let source = ReplaySource::new(recording()).looping(true);
        for _ in 0..3 {
            source.capture_dump("wlan0", 100);
        }
        assert_eq!(source.capture_dump("wlan0", 100).unwrap().len(), 3);

        assert!(source.capture_dump("wlan0", 100).is_none());
    }

    #[test]
    fn test_empty_recording_looping() {
        let source =
            ReplaySource::new(CsiRecording::new(RecordingMetadata::new("wlan0", 100))).looping(true);
        assert!(source.capture_dump("wlan0", 10).is_none());
    }

    #[test]
    fn test_open_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.csirec");
        recording().save(&path).unwrap();

        let source = ReplaySource::open(&path).unwrap();
        assert_eq!(source.batch_count(), 3);

        let err = ReplaySource::open(dir.path().join("missing.csirec")).err().unwrap();
        assert!(matches!(err, CaptureError::Recording(_)));
        assert_eq!(err.status_code(), -5);
    }
}
