//! # CSI Driver
//!
//! 运动检测的编排层：
//! - 监控线程（采集 → 解析 → 评分 → 遥测）
//! - UDP 遥测服务与客户端注册表
//! - 运行指标
//! - 配置文件
//! - 整数状态码门面（供宿主进程集成）

pub mod config;
pub mod detector;
mod error;
pub mod facade;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod server;

pub use config::{ConfigError, DetectorConfig, TelemetryConfig};
pub use detector::MotionDetector;
pub use error::{DriverError, status};
pub use facade::MotionDetectorFacade;
pub use metrics::{DetectorMetrics, MetricsSnapshot};
pub use registry::{ClientRegistry, UdpClient};
pub use server::{REGISTER_PAYLOAD, TelemetrySender, TelemetryServer};

// 重新导出下层常用类型
pub use csi_protocol::{ByteOrder, SampleEncoding, TelemetryCodec, TelemetryFrame};
pub use csi_source::{CaptureError, CsiSource};
