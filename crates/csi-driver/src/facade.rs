//! 宿主进程接口
//!
//! 以整数状态码暴露检测器操作：0 表示成功，负数为 errno 风格错误码
//! （见 [`DriverError::status_code`](crate::DriverError::status_code)）。

use crate::detector::MotionDetector;
use crate::error::status;
use crate::DriverError;
use std::sync::Arc;
use tracing::warn;

/// 状态码门面
#[derive(Clone)]
pub struct MotionDetectorFacade {
    detector: Arc<MotionDetector>,
}

fn to_status(op: &str, result: Result<(), DriverError>) -> i32 {
    match result {
        Ok(()) => status::OK,
        Err(e) => {
            let code = e.status_code();
            warn!(op, code, "{e}");
            code
        },
    }
}

impl MotionDetectorFacade {
    pub fn new(detector: Arc<MotionDetector>) -> Self {
        Self { detector }
    }

    pub fn detector(&self) -> &Arc<MotionDetector> {
        &self.detector
    }

    /// 当前运动评分（四舍五入到整数）
    pub fn get_motion(&self) -> i32 {
        self.detector.get_motion().round() as i32
    }

    /// 监控中返回 1，否则返回 0
    pub fn is_monitoring_active(&self) -> i32 {
        i32::from(self.detector.is_monitoring())
    }

    pub fn start_monitoring(&self, interface: &str, interval_ms: u32) -> i32 {
        to_status(
            "start_monitoring",
            self.detector
                .start_monitoring(interface, u64::from(interval_ms)),
        )
    }

    pub fn stop_monitoring(&self) -> i32 {
        to_status("stop_monitoring", self.detector.stop_monitoring())
    }

    pub fn set_antenna_idx(&self, index: u32) -> i32 {
        to_status(
            "set_antenna_idx",
            self.detector.set_antenna_idx(index as usize),
        )
    }

    pub fn get_antenna_idx(&self) -> u32 {
        self.detector.get_antenna_idx() as u32
    }

    pub fn start_udp_server(&self, port: u16) -> i32 {
        to_status(
            "start_udp_server",
            self.detector.start_udp_server(port).map(|_| ()),
        )
    }

    pub fn stop_udp_server(&self) -> i32 {
        self.detector.stop_udp_server();
        status::OK
    }

    pub fn add_udp_client(&self, ip: &str, port: u16) -> i32 {
        to_status(
            "add_udp_client",
            self.detector.add_udp_client(ip, port).map(|_| ()),
        )
    }

    pub fn remove_udp_client(&self, ip: &str, port: u16) -> i32 {
        to_status(
            "remove_udp_client",
            self.detector.remove_udp_client(ip, port).map(|_| ()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;
    use csi_source::MockCsiSource;

    fn facade() -> (MotionDetectorFacade, Arc<MockCsiSource>) {
        let mock = Arc::new(MockCsiSource::new());
        let detector = MotionDetector::new(DetectorConfig::default(), mock.clone()).unwrap();
        (MotionDetectorFacade::new(Arc::new(detector)), mock)
    }

    #[test]
    fn test_status_codes() {
        let (facade, mock) = facade();
        assert_eq!(facade.start_monitoring("wlan0", 0), -22);
        assert_eq!(facade.is_monitoring_active(), 0);
        assert_eq!(facade.set_antenna_idx(5), -34);
        assert_eq!(facade.set_antenna_idx(2), 0);
        assert_eq!(facade.get_antenna_idx(), 2);
        assert_eq!(facade.add_udp_client("nope", 1), -22);
        assert_eq!(facade.add_udp_client("127.0.0.1", 1), 0);
        assert_eq!(facade.remove_udp_client("127.0.0.1", 1), 0);

        mock.set_start_status(-19);
        assert_eq!(facade.start_monitoring("wlan0", 100), -19);
    }

    #[test]
    fn test_motion_rounded() {
        let (facade, _mock) = facade();
        assert_eq!(facade.get_motion(), 0);
    }

    #[test]
    fn test_start_stop_monitoring() {
        let (facade, mock) = facade();
        assert_eq!(facade.start_monitoring("wlan0", 20), 0);
        assert_eq!(facade.is_monitoring_active(), 1);
        assert_eq!(facade.stop_monitoring(), 0);
        assert_eq!(facade.is_monitoring_active(), 0);
        assert_eq!(mock.start_calls(), 1);
        assert_eq!(mock.stop_calls(), 1);
    }
}
