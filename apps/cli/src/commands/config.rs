//! config 命令
//!
//! 打印默认配置，或检查已有配置文件。

use anyhow::{Context, Result};
use clap::Args;
use csi_driver::DetectorConfig;
use std::fs;
use std::path::PathBuf;

/// config 命令参数
#[derive(Args, Debug)]
pub struct ConfigCommand {
    /// 写入文件而不是打印到标准输出
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 加载并校验配置文件，打印合并默认值后的结果
    #[arg(long, conflicts_with = "output")]
    pub check: Option<PathBuf>,
}

impl ConfigCommand {
    fn render(&self) -> Result<String> {
        let config = match &self.check {
            Some(path) => DetectorConfig::load_from_file(path)
                .with_context(|| format!("加载配置文件失败: {}", path.display()))?,
            None => DetectorConfig::default(),
        };
        Ok(config.to_toml_string()?)
    }

    /// 执行
    pub fn execute(&self) -> Result<()> {
        let text = self.render()?;

        match &self.output {
            Some(path) => {
                fs::write(path, &text)
                    .with_context(|| format!("写入配置文件失败: {}", path.display()))?;
                println!("✅ 默认配置已写入 {}", path.display());
            },
            None => print!("{text}"),
        }
        Ok(())
    }
}
