//! # CSI Tools - 解析、统计与录制
//!
//! **依赖原则**: 只依赖 `csi-protocol`，不依赖采集源和驱动层
//!
//! ## 包含模块
//!
//! - `parser` - 原始 I/Q 记录 → 每天线振幅序列
//! - `statistics` - 运动评分（纯函数）
//! - `recording` - 采集批次录制格式

pub mod parser;
pub mod recording;
pub mod statistics;

// 重新导出常用类型
pub use parser::{CsiParser, MAX_ANTENNAS, ParserConfig};
pub use recording::{CsiRecording, RecordingMetadata};
pub use statistics::{EstimatorConfig, KURTOSIS_OUTLIER, MotionEstimate, MotionEstimator};
