//! # 录制格式定义
//!
//! 将 `capture_dump` 的批次原样保存，供离线回放和算法调试使用。

use anyhow::{Context, Result};
use csi_protocol::CsiRecord;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// 录制文件魔数
pub const MAGIC: &[u8; 8] = b"CSIREC1\0";

/// 当前格式版本
pub const FORMAT_VERSION: u8 = 1;

/// 魔数 + 版本号
const HEADER_LEN: usize = 9;

/// CSI 录制文件 v1
///
/// ```text
/// [MAGIC: 8 bytes]
/// [Version: 1 byte]
/// [Data: bincode serialized CsiRecording]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsiRecording {
    /// 格式版本
    pub version: u8,

    /// 元数据
    pub metadata: RecordingMetadata,

    /// 每次 dump 的记录批次（空批次表示该次 dump 返回空）
    pub batches: Vec<Vec<CsiRecord>>,
}

impl CsiRecording {
    pub fn new(metadata: RecordingMetadata) -> Self {
        Self {
            version: FORMAT_VERSION,
            metadata,
            batches: Vec::new(),
        }
    }

    /// 追加一个批次
    pub fn add_batch(&mut self, batch: Vec<CsiRecord>) {
        self.batches.push(batch);
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// 所有批次的记录总数
    pub fn record_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    /// 只保留指定接收天线的记录
    pub fn filter_by_antenna(&self, rx_index: u16) -> CsiRecording {
        let mut filtered = CsiRecording::new(self.metadata.clone());

        for batch in &self.batches {
            filtered.add_batch(
                batch
                    .iter()
                    .filter(|r| r.rx_index() == rx_index)
                    .cloned()
                    .collect(),
            );
        }

        filtered
    }

    /// 写入任意输出流
    pub fn write_to<W: Write>(&self, mut out: W) -> Result<()> {
        let mut header = [0u8; HEADER_LEN];
        header[..MAGIC.len()].copy_from_slice(MAGIC);
        header[MAGIC.len()] = self.version;
        out.write_all(&header).context("写入文件头失败")?;

        bincode::serialize_into(&mut out, self).context("序列化录制失败")?;
        out.flush().context("刷新输出失败")?;
        Ok(())
    }

    /// 从任意输入流读取
    pub fn read_from<R: Read>(mut input: R) -> Result<Self> {
        let mut header = [0u8; HEADER_LEN];
        input
            .read_exact(&mut header)
            .context("文件过短，缺少文件头")?;

        let (magic, version) = header.split_at(MAGIC.len());
        if magic != MAGIC.as_slice() {
            anyhow::bail!("不是 CSI 录制文件（魔数不匹配）");
        }
        if version[0] != FORMAT_VERSION {
            anyhow::bail!("录制文件版本 {} 不受支持（当前 {FORMAT_VERSION}）", version[0]);
        }

        bincode::deserialize_from(input).context("录制数据损坏")
    }

    /// 保存到文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file =
            File::create(path).with_context(|| format!("无法创建 {}", path.display()))?;
        self.write_to(BufWriter::new(file))
    }

    /// 从文件加载
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("无法打开 {}", path.display()))?;
        Self::read_from(BufReader::new(file))
    }
}

/// 录制元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    /// 开始时间（Unix 秒）
    pub start_time: u64,

    /// 网卡接口名称
    pub interface: String,

    /// 采集间隔（毫秒）
    pub interval_ms: u64,

    /// 平台信息
    pub platform: String,

    /// 备注
    pub notes: String,
}

impl RecordingMetadata {
    pub fn new(interface: impl Into<String>, interval_ms: u64) -> Self {
        let start_time = std::time::UNIX_EPOCH
            .elapsed()
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            start_time,
            interface: interface.into(),
            interval_ms,
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            notes: String::new(),
        }
    }
}
