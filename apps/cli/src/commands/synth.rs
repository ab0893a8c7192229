//! synth 命令
//!
//! 用合成采集源生成录制文件，供 `run --source replay:PATH` 回放。

use anyhow::{Context, Result};
use clap::Args;
use csi_protocol::Bandwidth;
use csi_source::SyntheticSource;
use csi_tools::{CsiRecording, RecordingMetadata};
use std::path::PathBuf;
use tracing::info;

/// synth 命令参数
#[derive(Args, Debug)]
pub struct SynthCommand {
    /// 输出文件
    #[arg(short, long)]
    pub output: PathBuf,

    /// 批次数
    #[arg(short, long, default_value_t = 100)]
    pub batches: usize,

    /// 运动强度 [0, 1]
    #[arg(short, long, default_value_t = 0.5)]
    pub motion: f64,

    /// 每批记录数
    #[arg(long, default_value_t = 100)]
    pub dump_count: usize,

    /// 天线数
    #[arg(long, default_value_t = 3)]
    pub antenna_count: usize,

    /// 带宽编码（0=20MHz, 1=40MHz, 2=80MHz, 3=160MHz）
    #[arg(long, default_value_t = 0)]
    pub bandwidth: u8,

    /// 随机种子
    #[arg(long)]
    pub seed: Option<u64>,

    /// 写入元数据的接口名
    #[arg(long, default_value = "synthetic")]
    pub interface: String,

    /// 写入元数据的采集间隔（毫秒）
    #[arg(long, default_value_t = 100)]
    pub interval_ms: u64,
}

impl SynthCommand {
    /// 生成录制（不写文件）
    pub fn build_recording(&self) -> CsiRecording {
        let bandwidth = Bandwidth::from_raw(self.bandwidth);
        let source = match self.seed {
            Some(seed) => SyntheticSource::seeded(bandwidth, self.antenna_count, seed),
            None => SyntheticSource::new(bandwidth, self.antenna_count),
        };
        source.set_motion(self.motion);

        let mut metadata = RecordingMetadata::new(&self.interface, self.interval_ms);
        metadata.notes = format!(
            "synthetic motion={:.2} bandwidth={bandwidth:?} antennas={}",
            source.motion(),
            self.antenna_count
        );

        let mut recording = CsiRecording::new(metadata);
        for _ in 0..self.batches {
            recording.add_batch(source.generate(self.dump_count));
        }
        recording
    }

    /// 执行
    pub fn execute(&self) -> Result<()> {
        let recording = self.build_recording();
        recording
            .save(&self.output)
            .with_context(|| format!("写入录制文件失败: {}", self.output.display()))?;

        info!(
            path = %self.output.display(),
            batches = recording.batch_count(),
            records = recording.record_count(),
            "Synthetic recording written"
        );
        println!(
            "💾 已写入 {}（{} 批，{} 条记录）",
            self.output.display(),
            recording.batch_count(),
            recording.record_count()
        );
        Ok(())
    }
}
