//! # CSI Source Layer
//!
//! CSI 采集源抽象层。
//!
//! 真实设备上采集由厂商驱动（netlink）完成，这里只定义核心逻辑需要的三个调用：
//! 开始采集、停止采集、取出一批记录。仓库内提供三种实现：
//!
//! - [`MockCsiSource`]: 脚本化返回值，用于测试
//! - [`SyntheticSource`]: 随机生成带运动扰动的记录，用于无硬件演示
//! - [`ReplaySource`]: 回放录制文件

use csi_protocol::CsiRecord;
use thiserror::Error;

pub mod mock;
pub mod replay;
pub mod synthetic;

pub use mock::MockCsiSource;
pub use replay::ReplaySource;
pub use synthetic::SyntheticSource;

// 重新导出 csi-protocol 中的记录类型
pub use csi_protocol::{Bandwidth, CsiMetadata};

/// 采集层统一错误类型
#[derive(Error, Debug)]
pub enum CaptureError {
    /// 驱动返回非零状态码
    #[error("Driver returned status {0}")]
    Status(i32),
    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    /// 录制文件无法加载
    #[error("Recording error: {0}")]
    Recording(String),
}

impl CaptureError {
    /// 转换为负 errno 风格的状态码
    pub fn status_code(&self) -> i32 {
        match self {
            CaptureError::Status(code) => *code,
            CaptureError::InterfaceNotFound(_) => -19, // -ENODEV
            CaptureError::Io(e) => e.raw_os_error().map_or(-5, |code| -code.abs()),
            CaptureError::Recording(_) => -5, // -EIO
        }
    }
}

/// 驱动协作方接口
///
/// 所有方法都可能被监控线程和调用方线程并发调用，实现方自行保证内部同步。
pub trait CsiSource: Send + Sync {
    /// 开始采集
    fn capture_start(&self, interface: &str, interval_ms: u64) -> Result<(), CaptureError>;

    /// 停止采集
    fn capture_stop(&self, interface: &str) -> Result<(), CaptureError>;

    /// 取出最多 `count` 条记录
    ///
    /// `None` 表示暂时无数据，不是错误。
    fn capture_dump(&self, interface: &str, count: usize) -> Option<Vec<CsiRecord>>;

    /// 源名称（日志用）
    fn name(&self) -> &'static str {
        "csi-source"
    }
}
