//! 检测器配置
//!
//! TOML 格式，所有字段都有默认值，缺省字段按默认值补全。
//!
//! ```toml
//! interface = "wlan0"
//! interval_ms = 100
//! antenna_index = 1
//!
//! [estimator]
//! min_deviation = 0.02
//! max_deviation = 0.05
//!
//! [telemetry]
//! port = 8888
//! encoding = "amplitude"
//! byte_order = "network"
//! ```

use csi_protocol::{ByteOrder, SampleEncoding, TelemetryCodec};
use csi_tools::{EstimatorConfig, MAX_ANTENNAS, ParserConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 遥测配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// 是否启动 UDP 服务
    pub enabled: bool,
    /// UDP 端口（0 表示由系统分配）
    pub port: u16,
    pub encoding: SampleEncoding,
    pub byte_order: ByteOrder,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8888,
            encoding: SampleEncoding::Amplitude,
            byte_order: ByteOrder::Network,
        }
    }
}

impl TelemetryConfig {
    pub fn codec(&self) -> TelemetryCodec {
        TelemetryCodec::new(self.encoding, self.byte_order)
    }
}

/// 检测器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// 网卡接口名称
    pub interface: String,
    /// 采集间隔（毫秒）
    pub interval_ms: u64,
    /// 每次 dump 的记录数
    pub dump_count: usize,
    /// 接收天线数（1..=3）
    pub antenna_count: usize,
    /// 参与评分的天线
    pub antenna_index: usize,
    pub estimator: EstimatorConfig,
    pub parser: ParserConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            interface: "wlan0".to_string(),
            interval_ms: 100,
            dump_count: 100,
            antenna_count: MAX_ANTENNAS,
            antenna_index: 0,
            estimator: EstimatorConfig::default(),
            parser: ParserConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl DetectorConfig {
    /// 从 TOML 文件加载并校验
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: DetectorConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 校验取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interface.is_empty() {
            return Err(ConfigError::Invalid("interface must not be empty".into()));
        }
        if self.interval_ms == 0 {
            return Err(ConfigError::Invalid("interval_ms must be > 0".into()));
        }
        if self.dump_count == 0 {
            return Err(ConfigError::Invalid("dump_count must be > 0".into()));
        }
        if self.antenna_count == 0 || self.antenna_count > MAX_ANTENNAS {
            return Err(ConfigError::Invalid(format!(
                "antenna_count must be in 1..={MAX_ANTENNAS}, got {}",
                self.antenna_count
            )));
        }
        if self.antenna_index >= self.antenna_count {
            return Err(ConfigError::Invalid(format!(
                "antenna_index {} out of range (antenna_count {})",
                self.antenna_index, self.antenna_count
            )));
        }

        let est = &self.estimator;
        if !est.min_deviation.is_finite() || est.min_deviation < 0.0 {
            return Err(ConfigError::Invalid("min_deviation must be >= 0".into()));
        }
        if !est.max_deviation.is_finite() || est.max_deviation <= 0.0 {
            return Err(ConfigError::Invalid("max_deviation must be > 0".into()));
        }
        if !est.outlier_threshold.is_finite() || est.outlier_threshold <= 0.0 {
            return Err(ConfigError::Invalid("outlier_threshold must be > 0".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = DetectorConfig::default();
        assert_eq!(config.interface, "wlan0");
        assert_eq!(config.interval_ms, 100);
        assert_eq!(config.antenna_count, 3);
        assert_eq!(config.estimator.min_deviation, 0.02);
        assert_eq!(config.estimator.max_deviation, 0.05);
        assert_eq!(config.estimator.outlier_threshold, 1.3);
        assert!(!config.parser.normalize);
        assert!(config.parser.trim_edges);
        assert!(config.telemetry.enabled);
        assert_eq!(config.telemetry.port, 8888);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = DetectorConfig::from_toml_str(
            r#"
            interface = "wlp2s0"
            antenna_index = 2

            [estimator]
            max_deviation = 0.1

            [telemetry]
            encoding = "iq"
            byte_order = "little"
            "#,
        )
        .unwrap();

        assert_eq!(config.interface, "wlp2s0");
        assert_eq!(config.antenna_index, 2);
        assert_eq!(config.interval_ms, 100);
        assert_eq!(config.estimator.max_deviation, 0.1);
        assert_eq!(config.estimator.min_deviation, 0.02);
        assert_eq!(config.telemetry.encoding, SampleEncoding::Iq);
        assert_eq!(config.telemetry.byte_order, ByteOrder::Little);
        assert_eq!(config.telemetry.port, 8888);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            "interval_ms = 0",
            "antenna_count = 0",
            "antenna_count = 4",
            "antenna_index = 3",
            "dump_count = 0",
            "interface = \"\"",
            "[estimator]\nmax_deviation = 0.0",
            "[estimator]\nmin_deviation = -1.0",
        ];
        for toml in bad {
            let err = DetectorConfig::from_toml_str(toml).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{toml}: {err}");
        }
    }

    #[test]
    fn test_parse_error() {
        let err = DetectorConfig::from_toml_str("interval_ms = \"fast\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_toml_roundtrip_and_file() {
        let mut config = DetectorConfig::default();
        config.antenna_index = 1;
        config.telemetry.port = 9999;
        let text = config.to_toml_string().unwrap();

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file.flush().unwrap();

        let loaded = DetectorConfig::load_from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let err = DetectorConfig::load_from_file("/nonexistent/csi-motion.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
