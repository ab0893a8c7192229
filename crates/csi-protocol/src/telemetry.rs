//! UDP 遥测帧协议
//!
//! 每个遥测帧是一个 UDP 数据报：固定 20 字节帧头 + 平铺的样本数组。
//!
//! ```text
//! 帧头（紧凑排列）:
//!   u64 timestamp_ms        // 发送时刻（Unix 毫秒）
//!   u32 antenna_index
//!   u32 packet_count        // 本帧包含的源振幅序列数
//!   u32 total_sample_count  // 随后的样本数（按当前编码计算）
//! 帧体: total_sample_count × Sample
//!   Amplitude 编码: Sample = f64 value
//!   Iq 编码:        Sample = { f64 i; f64 q; }
//! ```
//!
//! 编码是纯函数，不做任何 IO。

use crate::{AmplitudeSequence, ProtocolError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};

/// 帧头长度（字节）
pub const HEADER_LEN: usize = 8 + 4 + 4 + 4;

/// 样本编码方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SampleEncoding {
    /// 每个样本一个实数，样本数 = 振幅值总数
    #[default]
    Amplitude,
    /// 交错的 I/Q 对，样本数 = 振幅值总数 / 2
    Iq,
}

impl SampleEncoding {
    /// 单个样本的字节数
    pub fn sample_len(&self) -> usize {
        match self {
            SampleEncoding::Amplitude => 8,
            SampleEncoding::Iq => 16,
        }
    }

    /// 给定振幅值总数时的样本数
    ///
    /// Iq 编码下奇数个值会丢弃最后一个，保证帧头与帧体一致。
    pub fn sample_count(&self, total_values: usize) -> usize {
        match self {
            SampleEncoding::Amplitude => total_values,
            SampleEncoding::Iq => total_values / 2,
        }
    }
}

/// 多字节字段的字节序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ByteOrder {
    /// 网络字节序（大端）
    #[default]
    Network,
    /// 小端（旧版客户端使用的主机字节序）
    Little,
}

/// I/Q 样本
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqSample {
    pub i: f64,
    pub q: f64,
}

/// 帧体样本
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    Amplitude(Vec<f64>),
    Iq(Vec<IqSample>),
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Samples::Amplitude(v) => v.len(),
            Samples::Iq(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn encoding(&self) -> SampleEncoding {
        match self {
            Samples::Amplitude(_) => SampleEncoding::Amplitude,
            Samples::Iq(_) => SampleEncoding::Iq,
        }
    }
}

/// 遥测帧
///
/// 每次发送时临时构造，不持久化。
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryFrame {
    pub timestamp_ms: u64,
    pub antenna_index: u32,
    pub packet_count: u32,
    pub samples: Samples,
}

impl TelemetryFrame {
    /// 帧头中的样本数
    pub fn total_sample_count(&self) -> u32 {
        saturating_u32(self.samples.len())
    }

    /// 编码后的总字节数
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.samples.len() * self.samples.encoding().sample_len()
    }

    /// 编码为字节
    ///
    /// 先按样本数确定缓冲区大小，再依次写入帧头和帧体。
    pub fn encode(&self, order: ByteOrder) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());

        put_u64(&mut buf, self.timestamp_ms, order);
        put_u32(&mut buf, self.antenna_index, order);
        put_u32(&mut buf, self.packet_count, order);
        put_u32(&mut buf, self.total_sample_count(), order);

        match &self.samples {
            Samples::Amplitude(values) => {
                for &v in values {
                    put_f64(&mut buf, v, order);
                }
            },
            Samples::Iq(pairs) => {
                for s in pairs {
                    put_f64(&mut buf, s.i, order);
                    put_f64(&mut buf, s.q, order);
                }
            },
        }

        buf.freeze()
    }

    /// 从字节解码
    ///
    /// # 错误
    /// - `ProtocolError::TooShort`: 不足一个帧头
    /// - `ProtocolError::LengthMismatch`: 帧体长度与帧头声明的样本数不一致
    pub fn decode(
        data: &[u8],
        encoding: SampleEncoding,
        order: ByteOrder,
    ) -> Result<Self, ProtocolError> {
        if data.len() < HEADER_LEN {
            return Err(ProtocolError::TooShort {
                expected: HEADER_LEN,
                actual: data.len(),
            });
        }

        let mut buf = data;
        let timestamp_ms = get_u64(&mut buf, order);
        let antenna_index = get_u32(&mut buf, order);
        let packet_count = get_u32(&mut buf, order);
        let total = get_u32(&mut buf, order) as usize;

        let expected = HEADER_LEN + total * encoding.sample_len();
        if data.len() != expected {
            return Err(ProtocolError::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }

        let samples = match encoding {
            SampleEncoding::Amplitude => {
                Samples::Amplitude((0..total).map(|_| get_f64(&mut buf, order)).collect())
            },
            SampleEncoding::Iq => Samples::Iq(
                (0..total)
                    .map(|_| IqSample {
                        i: get_f64(&mut buf, order),
                        q: get_f64(&mut buf, order),
                    })
                    .collect(),
            ),
        };

        Ok(Self {
            timestamp_ms,
            antenna_index,
            packet_count,
            samples,
        })
    }
}

/// 遥测编码器
///
/// # 示例
///
/// ```rust
/// use csi_protocol::{ByteOrder, SampleEncoding, TelemetryCodec, HEADER_LEN};
///
/// let codec = TelemetryCodec::new(SampleEncoding::Amplitude, ByteOrder::Network);
/// let bytes = codec.encode_at(&[vec![1.0, 2.0, 3.0]], 0, 1_700_000_000_000);
/// assert_eq!(bytes.len(), HEADER_LEN + 3 * 8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetryCodec {
    encoding: SampleEncoding,
    byte_order: ByteOrder,
}

impl TelemetryCodec {
    pub fn new(encoding: SampleEncoding, byte_order: ByteOrder) -> Self {
        Self {
            encoding,
            byte_order,
        }
    }

    pub fn encoding(&self) -> SampleEncoding {
        self.encoding
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// 按当前编码计算一组序列的样本总数
    pub fn sample_count(&self, packets: &[AmplitudeSequence]) -> usize {
        let total_values: usize = packets.iter().map(Vec::len).sum();
        self.encoding.sample_count(total_values)
    }

    /// 构造遥测帧（不编码）
    pub fn frame(
        &self,
        packets: &[AmplitudeSequence],
        antenna_index: u32,
        timestamp_ms: u64,
    ) -> TelemetryFrame {
        let values = packets.iter().flat_map(|p| p.iter().copied());
        let samples = match self.encoding {
            SampleEncoding::Amplitude => Samples::Amplitude(values.collect()),
            SampleEncoding::Iq => {
                let flat: Vec<f64> = values.collect();
                Samples::Iq(
                    flat.chunks_exact(2)
                        .map(|c| IqSample { i: c[0], q: c[1] })
                        .collect(),
                )
            },
        };
        debug_assert_eq!(samples.len(), self.sample_count(packets));

        TelemetryFrame {
            timestamp_ms,
            antenna_index,
            packet_count: saturating_u32(packets.len()),
            samples,
        }
    }

    /// 以当前时刻为时间戳编码
    pub fn encode(&self, packets: &[AmplitudeSequence], antenna_index: u32) -> Bytes {
        self.encode_at(packets, antenna_index, now_ms())
    }

    /// 以指定时间戳编码
    pub fn encode_at(
        &self,
        packets: &[AmplitudeSequence],
        antenna_index: u32,
        timestamp_ms: u64,
    ) -> Bytes {
        self.frame(packets, antenna_index, timestamp_ms)
            .encode(self.byte_order)
    }

    /// 解码（与 `encode` 使用相同的编码与字节序）
    pub fn decode(&self, data: &[u8]) -> Result<TelemetryFrame, ProtocolError> {
        TelemetryFrame::decode(data, self.encoding, self.byte_order)
    }
}

/// 当前 Unix 时间（毫秒）
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn put_u64(buf: &mut BytesMut, v: u64, order: ByteOrder) {
    match order {
        ByteOrder::Network => buf.put_u64(v),
        ByteOrder::Little => buf.put_u64_le(v),
    }
}

fn put_u32(buf: &mut BytesMut, v: u32, order: ByteOrder) {
    match order {
        ByteOrder::Network => buf.put_u32(v),
        ByteOrder::Little => buf.put_u32_le(v),
    }
}

fn put_f64(buf: &mut BytesMut, v: f64, order: ByteOrder) {
    match order {
        ByteOrder::Network => buf.put_f64(v),
        ByteOrder::Little => buf.put_f64_le(v),
    }
}

fn get_u64(buf: &mut &[u8], order: ByteOrder) -> u64 {
    match order {
        ByteOrder::Network => buf.get_u64(),
        ByteOrder::Little => buf.get_u64_le(),
    }
}

fn get_u32(buf: &mut &[u8], order: ByteOrder) -> u32 {
    match order {
        ByteOrder::Network => buf.get_u32(),
        ByteOrder::Little => buf.get_u32_le(),
    }
}

fn get_f64(buf: &mut &[u8], order: ByteOrder) -> f64 {
    match order {
        ByteOrder::Network => buf.get_f64(),
        ByteOrder::Little => buf.get_f64_le(),
    }
}
