//! UDP 遥测服务
//!
//! 监听线程接收 `register` 报文并把发送方加入注册表；
//! 监控线程通过 [`TelemetrySender`] 复用同一个 socket 向所有客户端发送遥测帧。
//!
//! 停止时先 `shutdown(SHUT_RDWR)` 唤醒阻塞中的 `recv_from`，再 join 监听线程。
//! 读超时（200ms）作为兜底，保证不支持 shutdown 唤醒的平台也能退出。

use crate::metrics::DetectorMetrics;
use crate::registry::{ClientRegistry, UdpClient};
use crate::DriverError;
use bytes::Bytes;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 注册报文内容
pub const REGISTER_PAYLOAD: &[u8] = b"register";

/// 监听线程读超时
const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// 接收缓冲区大小（注册报文很短，超长报文会被截断后忽略）
const RECV_BUF_LEN: usize = 64;

/// 创建 UDP socket 并绑定到 `0.0.0.0:port`（启用 SO_REUSEADDR）
#[cfg(unix)]
fn bind_reuse(port: u16) -> io::Result<UdpSocket> {
    use std::os::fd::FromRawFd;

    // SAFETY: socket 返回的 fd 立即交给 UdpSocket 持有，后续出错时由 Drop 关闭
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let socket = unsafe { UdpSocket::from_raw_fd(fd) };

    let one: libc::c_int = 1;
    // SAFETY: 传入的指针和长度指向有效的 c_int
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &one as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: sockaddr_in 全零是合法值
    let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    addr.sin_family = libc::AF_INET as libc::sa_family_t;
    addr.sin_port = port.to_be();
    addr.sin_addr = libc::in_addr {
        s_addr: libc::INADDR_ANY.to_be(),
    };
    // SAFETY: addr 是完整初始化的 sockaddr_in，长度与类型一致
    let ret = unsafe {
        libc::bind(
            fd,
            &addr as *const libc::sockaddr_in as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(socket)
}

#[cfg(not(unix))]
fn bind_reuse(port: u16) -> io::Result<UdpSocket> {
    UdpSocket::bind(("0.0.0.0", port))
}

/// 关闭 socket 的收发方向，唤醒阻塞的 `recv_from`
#[cfg(unix)]
fn shutdown_socket(socket: &UdpSocket) {
    use std::os::fd::AsRawFd;

    // SAFETY: fd 在 socket 生命周期内有效
    let ret = unsafe { libc::shutdown(socket.as_raw_fd(), libc::SHUT_RDWR) };
    if ret < 0 {
        let err = io::Error::last_os_error();
        // 未连接的 UDP socket 在 Linux 上返回 ENOTCONN，但仍会唤醒接收方
        if err.raw_os_error() != Some(libc::ENOTCONN) {
            warn!("UDP socket shutdown failed: {err}");
        }
    }
}

#[cfg(not(unix))]
fn shutdown_socket(_socket: &UdpSocket) {}

/// 遥测发送端（可克隆，共享服务 socket）
#[derive(Debug, Clone)]
pub struct TelemetrySender {
    socket: Arc<UdpSocket>,
}

impl TelemetrySender {
    /// 向每个客户端发送一帧，返回成功发送的客户端数
    ///
    /// 单个客户端失败只记录日志，继续发送其余客户端。
    pub fn send_frame(
        &self,
        frame: &Bytes,
        clients: &[UdpClient],
        metrics: &DetectorMetrics,
    ) -> usize {
        let mut sent = 0;
        for client in clients {
            match self.socket.send_to(frame, client.addr()) {
                Ok(_) => {
                    sent += 1;
                    DetectorMetrics::incr(&metrics.frames_sent);
                },
                Err(e) => {
                    DetectorMetrics::incr(&metrics.send_errors);
                    warn!(client = %client, "Telemetry send failed: {e}");
                },
            }
        }
        trace!(bytes = frame.len(), sent, "Telemetry frame sent");
        sent
    }
}

/// UDP 遥测服务
pub struct TelemetryServer {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    listener: Option<JoinHandle<()>>,
    registry: Arc<ClientRegistry>,
}

impl TelemetryServer {
    /// 绑定端口并启动监听线程
    ///
    /// `port` 为 0 时由系统分配，实际端口见 [`local_addr`](Self::local_addr)。
    pub fn start(
        port: u16,
        registry: Arc<ClientRegistry>,
        metrics: Arc<DetectorMetrics>,
    ) -> Result<Self, DriverError> {
        let socket = bind_reuse(port).map_err(|e| {
            error!(port, "Failed to bind UDP telemetry socket: {e}");
            DriverError::Socket(e)
        })?;
        socket.set_read_timeout(Some(READ_TIMEOUT))?;
        let local_addr = socket.local_addr()?;

        let socket = Arc::new(socket);
        let running = Arc::new(AtomicBool::new(true));

        let listener = {
            let socket = socket.clone();
            let running = running.clone();
            let registry = registry.clone();
            std::thread::Builder::new()
                .name("csi-udp-listener".into())
                .spawn(move || listener_loop(&socket, &running, &registry, &metrics))
                .map_err(DriverError::Socket)?
        };

        info!(addr = %local_addr, "UDP telemetry server started");
        Ok(Self {
            socket,
            local_addr,
            running,
            listener: Some(listener),
            registry,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn sender(&self) -> TelemetrySender {
        TelemetrySender {
            socket: self.socket.clone(),
        }
    }

    /// 停止服务：唤醒并等待监听线程退出，清空注册表
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.listener.take() else {
            return;
        };

        self.running.store(false, Ordering::Release);
        shutdown_socket(&self.socket);

        if handle.join().is_err() {
            error!("UDP listener thread panicked");
        }
        self.registry.clear();
        info!(addr = %self.local_addr, "UDP telemetry server stopped");
    }
}

impl Drop for TelemetryServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn listener_loop(
    socket: &UdpSocket,
    running: &AtomicBool,
    registry: &ClientRegistry,
    metrics: &DetectorMetrics,
) {
    let mut buf = [0u8; RECV_BUF_LEN];

    while running.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                handle_datagram(&buf[..len], from, registry, metrics);
            },
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue;
            },
            Err(e) => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                warn!("UDP receive failed: {e}");
                std::thread::sleep(Duration::from_millis(10));
            },
        }
    }

    debug!("UDP listener thread exited");
}

fn handle_datagram(
    payload: &[u8],
    from: SocketAddr,
    registry: &ClientRegistry,
    metrics: &DetectorMetrics,
) {
    // 允许 netcat 等工具附带的换行
    if payload.trim_ascii_end() != REGISTER_PAYLOAD {
        trace!(client = %from, len = payload.len(), "Ignoring datagram");
        return;
    }

    if registry.add(UdpClient::from(from)) {
        DetectorMetrics::incr(&metrics.registrations);
        info!(client = %from, "Telemetry client registered");
    } else {
        debug!(client = %from, "Telemetry client already registered");
    }
}
