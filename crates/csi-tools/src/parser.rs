//! # CSI 解析
//!
//! 将一批原始 CSI 记录转换为按天线划分的振幅序列（"每包子载波振幅"）。
//!
//! 处理步骤：
//! 1. 按记录带宽确定子载波数（20→64, 40→128, 80→256, 160→512，未知→64）
//! 2. 按接收天线索引写入复数表（所有天线的记录都写入）
//! 3. 对目标天线的记录取模，去掉直流附近和末尾的子载波
//! 4. 可选地归一化到 [0, 100]

use csi_protocol::{AmplitudeSequence, CsiRecord};
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// 支持的最大接收天线数
pub const MAX_ANTENNAS: usize = 3;

/// 复数表每行的容量（最大带宽的子载波数）
const TABLE_WIDTH: usize = 512;

/// 解析配置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// 是否将振幅按窗口最大值归一化到 [0, 100]
    pub normalize: bool,
    /// 是否去掉前 1~2 个和最后 1 个子载波（直流偏置伪影）
    pub trim_edges: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            normalize: false,
            trim_edges: true,
        }
    }
}

/// 按天线索引的复数表
///
/// 固定行数，越界的天线索引通过 `row_mut` 返回 `None`，不会越界写入。
struct AntennaTable {
    rows: Vec<Vec<Complex<f64>>>,
}

impl AntennaTable {
    fn new(antenna_count: usize) -> Self {
        Self {
            rows: vec![vec![Complex::new(0.0, 0.0); TABLE_WIDTH]; antenna_count],
        }
    }

    fn row_mut(&mut self, antenna: usize) -> Option<&mut [Complex<f64>]> {
        self.rows.get_mut(antenna).map(Vec::as_mut_slice)
    }
}

/// CSI 解析器
#[derive(Debug, Clone)]
pub struct CsiParser {
    config: ParserConfig,
    antenna_count: usize,
}

impl Default for CsiParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

impl CsiParser {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            antenna_count: MAX_ANTENNAS,
        }
    }

    /// 设置天线数（上限 [`MAX_ANTENNAS`]）
    pub fn with_antenna_count(mut self, antenna_count: usize) -> Self {
        self.antenna_count = antenna_count.min(MAX_ANTENNAS);
        self
    }

    pub fn antenna_count(&self) -> usize {
        self.antenna_count
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// 解析一批记录，返回目标天线的振幅序列
    ///
    /// `records` 为 `None`（驱动暂时无数据）时返回空结果，不视为错误。
    ///
    /// # 示例
    ///
    /// ```rust
    /// use csi_protocol::{Bandwidth, CsiRecord};
    /// use csi_tools::parser::CsiParser;
    ///
    /// let records = vec![
    ///     CsiRecord::new(Bandwidth::Bw20, 0, vec![3; 64], vec![4; 64]).unwrap(),
    ///     CsiRecord::new(Bandwidth::Bw20, 1, vec![6; 64], vec![8; 64]).unwrap(),
    /// ];
    /// let parser = CsiParser::default();
    /// let out = parser.parse(Some(&records), 1);
    /// assert_eq!(out.len(), 1);
    /// assert_eq!(out[0].len(), 61); // 64 - 2 - 1
    /// assert_eq!(out[0][0], 10.0);
    /// ```
    pub fn parse(
        &self,
        records: Option<&[CsiRecord]>,
        antenna_index: usize,
    ) -> Vec<AmplitudeSequence> {
        let mut out = Vec::new();
        if antenna_index >= self.antenna_count {
            trace!(antenna_index, "Antenna index out of range, nothing to parse");
            return out;
        }

        self.walk(records, |rx, amplitudes| {
            if rx == antenna_index {
                out.push(amplitudes);
            }
        });
        out
    }

    /// 一次遍历解析所有天线
    ///
    /// 返回值长度等于天线数，下标即天线索引。
    pub fn parse_all(&self, records: Option<&[CsiRecord]>) -> Vec<Vec<AmplitudeSequence>> {
        let mut out = vec![Vec::new(); self.antenna_count];
        self.walk(records, |rx, amplitudes| {
            if let Some(slot) = out.get_mut(rx) {
                slot.push(amplitudes);
            }
        });
        out
    }

    fn walk(&self, records: Option<&[CsiRecord]>, mut emit: impl FnMut(usize, AmplitudeSequence)) {
        let Some(records) = records else {
            return;
        };

        let mut table = AntennaTable::new(self.antenna_count);
        for record in records {
            let rx = record.rx_index() as usize;
            let Some(row) = table.row_mut(rx) else {
                trace!(rx, "Ignoring CSI record from unsupported antenna");
                continue;
            };

            let count = record.usable_subcarriers().min(row.len());
            for (slot, (i, q)) in row.iter_mut().zip(record.iq_pairs()).take(count) {
                *slot = Complex::new(f64::from(i), f64::from(q));
            }

            emit(rx, self.amplitudes(&row[..count]));
        }
    }

    /// 取模 → 去边 → 归一化
    fn amplitudes(&self, row: &[Complex<f64>]) -> AmplitudeSequence {
        let mut values: Vec<f64> = row.iter().map(|c| c.norm()).collect();

        if self.config.trim_edges {
            values = trim_edges(values);
        }
        if self.config.normalize {
            normalize(&mut values);
        }
        values
    }
}

/// 去掉直流附近和末尾的子载波
///
/// 长度 >= 64 时去掉前 2 个，否则去掉前 1 个；总是去掉最后 1 个。
pub fn trim_edges(mut values: Vec<f64>) -> Vec<f64> {
    let head = if values.len() >= 64 { 2 } else { 1 };
    if values.len() <= head + 1 {
        values.clear();
        return values;
    }

    values.pop();
    values.drain(..head);
    values
}

/// 按最大值归一化到 [0, 100]，最大值为 0 时保持不变
pub fn normalize(values: &mut [f64]) {
    let max = values.iter().copied().fold(0.0_f64, f64::max);
    if max > 0.0 {
        for v in values.iter_mut() {
            *v = *v / max * 100.0;
        }
    }
}
