//! 命令定义和实现

pub mod config;
pub mod listen;
pub mod run;
pub mod synth;

pub use config::ConfigCommand;
pub use listen::ListenCommand;
pub use run::RunCommand;
pub use synth::SynthCommand;

use crossbeam_channel::Receiver;

/// 安装 Ctrl+C 处理器，收到信号时向通道发送一次通知
pub fn ctrlc_channel() -> anyhow::Result<Receiver<()>> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })?;
    Ok(rx)
}
