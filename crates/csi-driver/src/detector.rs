//! 运动检测器
//!
//! 进程内唯一的检测上下文：持有采集源、监控线程、UDP 服务和所有共享状态。
//! 由启动代码显式创建一次，通过 `Arc` 传给需要它的调用方。
//!
//! # 状态机
//!
//! - 监控：`Idle` ⇄ `Monitoring`，`start_monitoring` 在运行中调用时先停止再启动
//! - UDP 服务：`Stopped` ⇄ `Running`，与监控状态相互独立
//!
//! `stop_monitoring` / `stop_udp_server` 返回时，对应线程已经完全退出。

use crate::config::DetectorConfig;
use crate::metrics::{DetectorMetrics, MetricsSnapshot};
use crate::pipeline::{MonitorContext, MonitorShared, monitor_loop};
use crate::registry::{ClientRegistry, UdpClient};
use crate::server::{TelemetryServer, TelemetrySender};
use crate::DriverError;
use crossbeam_channel::Sender;
use csi_source::CsiSource;
use csi_tools::{CsiParser, MotionEstimator};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// 运行中的监控线程
struct MonitorWorker {
    interface: String,
    started_at: Instant,
    stop: Arc<AtomicBool>,
    wake: Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct MonitorSlot {
    worker: Option<MonitorWorker>,
    /// 最近一次启动使用的接口（停止后仍保留，用于幂等 stop）
    last_interface: Option<String>,
}

/// 运动检测器
pub struct MotionDetector {
    config: DetectorConfig,
    source: Arc<dyn CsiSource>,
    shared: Arc<MonitorShared>,
    registry: Arc<ClientRegistry>,
    metrics: Arc<DetectorMetrics>,
    sender: Arc<Mutex<Option<TelemetrySender>>>,
    monitor: Mutex<MonitorSlot>,
    server: Mutex<Option<TelemetryServer>>,
}

impl MotionDetector {
    /// 创建检测器
    ///
    /// # 错误
    /// - `DriverError::InvalidArgument`: 配置校验失败
    pub fn new(config: DetectorConfig, source: Arc<dyn CsiSource>) -> Result<Self, DriverError> {
        config
            .validate()
            .map_err(|e| DriverError::InvalidArgument(e.to_string()))?;

        Ok(Self {
            shared: Arc::new(MonitorShared::new(config.antenna_index)),
            config,
            source,
            registry: Arc::new(ClientRegistry::new()),
            metrics: Arc::new(DetectorMetrics::new()),
            sender: Arc::new(Mutex::new(None)),
            monitor: Mutex::new(MonitorSlot::default()),
            server: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// 开始监控
    ///
    /// 已在监控时先执行一次停止（重启语义），之后才校验参数；
    /// 参数无效或采集源启动失败时保持 `Idle`。
    ///
    /// # 错误
    /// - `DriverError::InvalidArgument`: `interval_ms` 为 0 或接口名为空
    /// - `DriverError::Capture`: 采集源启动失败
    /// - `DriverError::MonitorThread`: 线程创建失败
    pub fn start_monitoring(&self, interface: &str, interval_ms: u64) -> Result<(), DriverError> {
        let mut slot = self.monitor.lock();
        if slot.worker.is_some() {
            info!("Monitoring already active, restarting");
            if let Err(e) = self.stop_locked(&mut slot) {
                warn!("Stop before restart reported an error: {e}");
            }
        }

        // 参数校验在停止旧循环之后：无效参数的重启会停在 Idle
        if interval_ms == 0 {
            return Err(DriverError::InvalidArgument(
                "interval must be greater than 0".into(),
            ));
        }
        if interface.is_empty() {
            return Err(DriverError::InvalidArgument(
                "interface must not be empty".into(),
            ));
        }

        self.source.capture_start(interface, interval_ms)?;

        let stop = Arc::new(AtomicBool::new(false));
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        let ctx = MonitorContext {
            source: self.source.clone(),
            interface: interface.to_string(),
            interval: Duration::from_millis(interval_ms),
            dump_count: self.config.dump_count,
            parser: CsiParser::new(self.config.parser).with_antenna_count(self.config.antenna_count),
            estimator: MotionEstimator::new(self.config.estimator),
            codec: self.config.telemetry.codec(),
            shared: self.shared.clone(),
            registry: self.registry.clone(),
            sender: self.sender.clone(),
            metrics: self.metrics.clone(),
        };

        let handle = {
            let stop = stop.clone();
            std::thread::Builder::new()
                .name("csi-monitor".into())
                .spawn(move || monitor_loop(ctx, stop, wake_rx))
        };
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to spawn monitor thread: {e}");
                if let Err(stop_err) = self.source.capture_stop(interface) {
                    warn!("capture_stop after spawn failure: {stop_err}");
                }
                return Err(DriverError::MonitorThread(e.to_string()));
            },
        };

        slot.worker = Some(MonitorWorker {
            interface: interface.to_string(),
            started_at: Instant::now(),
            stop,
            wake: wake_tx,
            handle,
        });
        slot.last_interface = Some(interface.to_string());

        info!(interface, interval_ms, source = self.source.name(), "Monitoring started");
        Ok(())
    }

    /// 停止监控
    ///
    /// 阻塞到监控线程退出后再调用采集源的停止。已停止时调用是安全的，
    /// 采集源的停止仍会执行并返回其结果。
    pub fn stop_monitoring(&self) -> Result<(), DriverError> {
        let mut slot = self.monitor.lock();
        self.stop_locked(&mut slot)
    }

    fn stop_locked(&self, slot: &mut MonitorSlot) -> Result<(), DriverError> {
        let interface = match slot.worker.take() {
            Some(worker) => {
                worker.stop.store(true, Ordering::Release);
                // 唤醒休眠中的监控线程；通道已满说明已有唤醒信号
                let _ = worker.wake.try_send(());
                drop(worker.wake);

                if worker.handle.join().is_err() {
                    error!("Monitor thread panicked");
                }
                info!(
                    interface = %worker.interface,
                    uptime_ms = worker.started_at.elapsed().as_millis() as u64,
                    "Monitoring stopped"
                );
                worker.interface
            },
            None => slot
                .last_interface
                .clone()
                .unwrap_or_else(|| self.config.interface.clone()),
        };

        self.source.capture_stop(&interface)?;
        Ok(())
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.lock().worker.is_some()
    }

    /// 当前监控的接口
    pub fn interface(&self) -> Option<String> {
        self.monitor
            .lock()
            .worker
            .as_ref()
            .map(|w| w.interface.clone())
    }

    /// 最近一次计算的运动评分（从未评分时为 0）
    pub fn get_motion(&self) -> f64 {
        self.shared.motion()
    }

    /// 选择参与评分的天线
    ///
    /// # 错误
    /// - `DriverError::OutOfRange`: `index >= antenna_count`，状态不变
    pub fn set_antenna_idx(&self, index: usize) -> Result<(), DriverError> {
        let count = self.config.antenna_count;
        if index >= count {
            return Err(DriverError::OutOfRange { index, count });
        }
        self.shared.set_antenna_index(index);
        info!(antenna = index, "Antenna selected");
        Ok(())
    }

    pub fn get_antenna_idx(&self) -> usize {
        self.shared.antenna_index()
    }

    pub fn antenna_count(&self) -> usize {
        self.config.antenna_count
    }

    /// 启动 UDP 遥测服务，返回实际绑定的地址
    ///
    /// # 错误
    /// - `DriverError::AlreadyRunning`: 服务已在运行
    /// - `DriverError::Socket`: 创建或绑定失败，服务保持停止
    pub fn start_udp_server(&self, port: u16) -> Result<SocketAddr, DriverError> {
        let mut server = self.server.lock();
        if server.is_some() {
            return Err(DriverError::AlreadyRunning);
        }

        let started = TelemetryServer::start(port, self.registry.clone(), self.metrics.clone())?;
        let addr = started.local_addr();
        *self.sender.lock() = Some(started.sender());
        *server = Some(started);
        Ok(addr)
    }

    /// 停止 UDP 遥测服务并清空注册表
    ///
    /// 服务未运行时直接返回。
    pub fn stop_udp_server(&self) {
        let Some(server) = self.server.lock().take() else {
            return;
        };
        *self.sender.lock() = None;
        server.stop();
    }

    pub fn is_udp_server_running(&self) -> bool {
        self.server.lock().is_some()
    }

    pub fn udp_server_addr(&self) -> Option<SocketAddr> {
        self.server.lock().as_ref().map(TelemetryServer::local_addr)
    }

    /// 手动添加遥测客户端，返回是否新增
    pub fn add_udp_client(&self, ip: &str, port: u16) -> Result<bool, DriverError> {
        let added = self.registry.add_str(ip, port)?;
        if added {
            info!(ip, port, "Telemetry client added");
        }
        Ok(added)
    }

    /// 移除遥测客户端，返回是否移除
    pub fn remove_udp_client(&self, ip: &str, port: u16) -> Result<bool, DriverError> {
        let removed = self.registry.remove_str(ip, port)?;
        if removed {
            info!(ip, port, "Telemetry client removed");
        }
        Ok(removed)
    }

    pub fn udp_clients(&self) -> Vec<UdpClient> {
        self.registry.snapshot()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Drop for MotionDetector {
    fn drop(&mut self) {
        if self.is_monitoring()
            && let Err(e) = self.stop_monitoring()
        {
            warn!("Failed to stop monitoring on drop: {e}");
        }
        self.stop_udp_server();
    }
}
