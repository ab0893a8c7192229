//! 遥测客户端注册表
//!
//! 按 (IP, 端口) 去重的订阅者集合。发送方通过 `snapshot` 复制列表后立即释放锁，
//! 注册表修改不会阻塞正在进行的发送。

use crate::DriverError;
use parking_lot::Mutex;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// 遥测客户端地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UdpClient(SocketAddr);

impl UdpClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    /// 从 IP 字符串和端口创建
    ///
    /// # 错误
    /// - `DriverError::InvalidArgument`: IP 无法解析
    pub fn parse(ip: &str, port: u16) -> Result<Self, DriverError> {
        let ip: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| DriverError::InvalidArgument(format!("invalid IP address: {ip:?}")))?;
        Ok(Self(SocketAddr::new(ip, port)))
    }

    pub fn addr(&self) -> SocketAddr {
        self.0
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }
}

impl From<SocketAddr> for UdpClient {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for UdpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 客户端注册表（保持注册顺序）
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<Vec<UdpClient>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加客户端，已存在时不做任何事
    ///
    /// 返回是否新增。
    pub fn add(&self, client: UdpClient) -> bool {
        let mut clients = self.clients.lock();
        if clients.contains(&client) {
            return false;
        }
        clients.push(client);
        true
    }

    /// 按 IP 字符串和端口添加
    pub fn add_str(&self, ip: &str, port: u16) -> Result<bool, DriverError> {
        Ok(self.add(UdpClient::parse(ip, port)?))
    }

    /// 移除客户端，不存在时不做任何事
    ///
    /// 返回是否移除。
    pub fn remove(&self, client: &UdpClient) -> bool {
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|c| c != client);
        clients.len() != before
    }

    pub fn remove_str(&self, ip: &str, port: u16) -> Result<bool, DriverError> {
        Ok(self.remove(&UdpClient::parse(ip, port)?))
    }

    pub fn contains(&self, client: &UdpClient) -> bool {
        self.clients.lock().contains(client)
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    /// 复制当前客户端列表
    pub fn snapshot(&self) -> Vec<UdpClient> {
        self.clients.lock().clone()
    }

    pub fn clear(&self) {
        self.clients.lock().clear();
    }
}
