//! # CSI Protocol
//!
//! WiFi CSI（信道状态信息）数据模型与 UDP 遥测协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - 本文件：`CsiRecord`、`Bandwidth`、`MacAddr` 等采集数据类型
//! - `telemetry`: 遥测帧的二进制编码/解码
//!
//! ## 字节序
//!
//! 遥测帧默认使用网络字节序（大端）。为兼容旧版桌面客户端，
//! 也支持主机小端字节序，见 [`telemetry::ByteOrder`]。

pub mod telemetry;

pub use telemetry::{
    ByteOrder, HEADER_LEN, IqSample, SampleEncoding, Samples, TelemetryCodec, TelemetryFrame,
};

use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt;
use thiserror::Error;

/// 单条记录允许的最大子载波数（320MHz 驱动缓冲区大小）
pub const MAX_SUBCARRIERS: usize = 1024;

/// 振幅序列（每个子载波一个实数）
///
/// 空序列是合法的，下游消费者应跳过而不是报错。
pub type AmplitudeSequence = Vec<f64>;

/// 协议层错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// I/Q 序列超过驱动缓冲区上限
    #[error("Too many subcarriers: {len} (max {max})")]
    TooManySubcarriers { len: usize, max: usize },

    /// 缓冲区长度不足以容纳帧头
    #[error("Frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    /// 帧体长度与帧头声明的样本数不一致
    #[error("Frame length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// 信道带宽
///
/// 驱动上报的原始编码为 0..=3，未知编码按 20MHz 处理（64 个子载波）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Bandwidth {
    Bw20 = 0,
    Bw40 = 1,
    Bw80 = 2,
    Bw160 = 3,
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl Bandwidth {
    /// 从驱动原始编码创建
    pub fn from_raw(code: u8) -> Self {
        Self::from_primitive(code)
    }

    /// 该带宽对应的子载波数
    pub fn subcarrier_count(&self) -> usize {
        match self {
            Bandwidth::Bw20 => 64,
            Bandwidth::Bw40 => 128,
            Bandwidth::Bw80 => 256,
            Bandwidth::Bw160 => 512,
            Bandwidth::Unknown(_) => 64,
        }
    }

    /// 带宽（MHz），未知编码返回 `None`
    pub fn mhz(&self) -> Option<u32> {
        match self {
            Bandwidth::Bw20 => Some(20),
            Bandwidth::Bw40 => Some(40),
            Bandwidth::Bw80 => Some(80),
            Bandwidth::Bw160 => Some(160),
            Bandwidth::Unknown(_) => None,
        }
    }
}

impl Default for Bandwidth {
    fn default() -> Self {
        Bandwidth::Bw20
    }
}

/// 发送端 MAC 地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MacAddr(pub [u8; 6]);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// 采集元数据
///
/// 驱动随每条 CSI 记录上报的附加信息，解析流程只读取带宽和天线索引，
/// 其余字段用于日志、录制和诊断。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CsiMetadata {
    /// 接收信号强度（dBm）
    pub rssi: i8,
    /// 信噪比
    pub snr: u8,
    /// 驱动时间戳（微秒计数器，会回绕）
    pub timestamp: u32,
    /// 发送端地址
    pub transmitter: MacAddr,
    /// 发送天线索引
    pub tx_index: u16,
    /// 频段
    pub band: u8,
    /// 主信道索引
    pub primary_channel: u8,
    /// 接收模式（HT/VHT/HE）
    pub rx_mode: u8,
    /// 包序号
    pub packet_sn: u16,
}

/// 单条 CSI 采集记录
///
/// 由驱动协作方在每次 dump 时创建，创建后不可修改。
///
/// # 示例
///
/// ```rust
/// use csi_protocol::{Bandwidth, CsiRecord};
///
/// let record = CsiRecord::new(Bandwidth::Bw20, 1, vec![3; 64], vec![4; 64]).unwrap();
/// assert_eq!(record.rx_index(), 1);
/// assert_eq!(record.usable_subcarriers(), 64);
/// ```
///
/// 反序列化同样经过 [`CsiRecord::new`] 的长度检查。
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawCsiRecord"))]
pub struct CsiRecord {
    bandwidth: Bandwidth,
    rx_index: u16,
    data_i: Vec<i16>,
    data_q: Vec<i16>,
    meta: CsiMetadata,
}

/// 未校验的记录（字段顺序与 `CsiRecord` 一致，序列化格式相同）
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RawCsiRecord {
    bandwidth: Bandwidth,
    rx_index: u16,
    data_i: Vec<i16>,
    data_q: Vec<i16>,
    meta: CsiMetadata,
}

#[cfg(feature = "serde")]
impl TryFrom<RawCsiRecord> for CsiRecord {
    type Error = ProtocolError;

    fn try_from(raw: RawCsiRecord) -> Result<Self, Self::Error> {
        Ok(CsiRecord::new(raw.bandwidth, raw.rx_index, raw.data_i, raw.data_q)?
            .with_metadata(raw.meta))
    }
}

impl CsiRecord {
    /// 创建记录
    ///
    /// # 错误
    /// - `ProtocolError::TooManySubcarriers`: I 或 Q 序列长度超过 [`MAX_SUBCARRIERS`]
    pub fn new(
        bandwidth: Bandwidth,
        rx_index: u16,
        data_i: Vec<i16>,
        data_q: Vec<i16>,
    ) -> Result<Self, ProtocolError> {
        let len = data_i.len().max(data_q.len());
        if len > MAX_SUBCARRIERS {
            return Err(ProtocolError::TooManySubcarriers {
                len,
                max: MAX_SUBCARRIERS,
            });
        }

        Ok(Self {
            bandwidth,
            rx_index,
            data_i,
            data_q,
            meta: CsiMetadata::default(),
        })
    }

    /// 附加采集元数据（构造阶段使用）
    pub fn with_metadata(mut self, meta: CsiMetadata) -> Self {
        self.meta = meta;
        self
    }

    pub fn bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    /// 接收天线索引
    pub fn rx_index(&self) -> u16 {
        self.rx_index
    }

    pub fn data_i(&self) -> &[i16] {
        &self.data_i
    }

    pub fn data_q(&self) -> &[i16] {
        &self.data_q
    }

    pub fn metadata(&self) -> &CsiMetadata {
        &self.meta
    }

    /// 可用子载波数
    ///
    /// 取带宽子载波数与 I/Q 实际长度的最小值，短记录只贡献已有的位置。
    pub fn usable_subcarriers(&self) -> usize {
        self.bandwidth
            .subcarrier_count()
            .min(self.data_i.len())
            .min(self.data_q.len())
    }

    /// 按子载波迭代 (I, Q) 对
    pub fn iq_pairs(&self) -> impl Iterator<Item = (i16, i16)> + '_ {
        self.data_i
            .iter()
            .zip(self.data_q.iter())
            .take(self.usable_subcarriers())
            .map(|(&i, &q)| (i, q))
    }
}
