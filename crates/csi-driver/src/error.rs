//! 驱动层错误类型定义

use csi_protocol::ProtocolError;
use csi_source::CaptureError;
use thiserror::Error;

/// 状态码（负 errno 风格，0 表示成功）
pub mod status {
    pub const OK: i32 = 0;
    pub const EIO: i32 = -5;
    pub const EINVAL: i32 = -22;
    pub const ERANGE: i32 = -34;
    pub const EALREADY: i32 = -114;
}

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 采集源返回错误
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// 协议错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 无效参数（如采集间隔为 0、无法解析的 IP）
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 天线索引超出范围
    #[error("Antenna index {index} out of range (antenna count: {count})")]
    OutOfRange { index: usize, count: usize },

    /// UDP socket 创建/绑定失败
    #[error("Socket error: {0}")]
    Socket(#[from] std::io::Error),

    /// UDP 服务已在运行
    #[error("UDP server already running")]
    AlreadyRunning,

    /// 监控线程错误
    #[error("Monitor thread error: {0}")]
    MonitorThread(String),
}

impl DriverError {
    /// 转换为宿主进程使用的状态码
    pub fn status_code(&self) -> i32 {
        match self {
            DriverError::Capture(e) => e.status_code(),
            DriverError::Protocol(_) | DriverError::InvalidArgument(_) => status::EINVAL,
            DriverError::OutOfRange { .. } => status::ERANGE,
            DriverError::Socket(_) | DriverError::MonitorThread(_) => status::EIO,
            DriverError::AlreadyRunning => status::EALREADY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            DriverError::InvalidArgument("interval".into()).status_code(),
            -22
        );
        assert_eq!(
            DriverError::OutOfRange { index: 5, count: 3 }.status_code(),
            -34
        );
        assert_eq!(
            DriverError::Capture(CaptureError::Status(-16)).status_code(),
            -16
        );
        assert_eq!(
            DriverError::Socket(std::io::Error::other("bind")).status_code(),
            -5
        );
        assert_eq!(DriverError::AlreadyRunning.status_code(), -114);
    }

    #[test]
    fn test_driver_error_display() {
        let msg = DriverError::OutOfRange { index: 5, count: 3 }.to_string();
        assert!(msg.contains("5") && msg.contains("3"), "{msg}");

        let msg = DriverError::from(CaptureError::Status(-1)).to_string();
        assert!(msg.contains("Driver returned status -1"), "{msg}");
    }
}
