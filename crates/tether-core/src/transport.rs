use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::endpoint::Endpoint;
use crate::error::TransportError;

/// 表示半关闭的方向。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownDirection {
    /// 关闭写半部。
    Write,
    /// 关闭读半部。
    Read,
    /// 同时关闭读写半部。
    Both,
}

impl From<ShutdownDirection> for std::net::Shutdown {
    fn from(value: ShutdownDirection) -> Self {
        match value {
            ShutdownDirection::Write => std::net::Shutdown::Write,
            ShutdownDirection::Read => std::net::Shutdown::Read,
            ShutdownDirection::Both => std::net::Shutdown::Both,
        }
    }
}

/// 传输能力接口：明文 TCP、TLS 与带固定对端的 UDP 共用的读写契约。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 上层（连接池、流适配层、协议实现）只依赖本接口，不关心底层是
///   明文、加密还是数据报；
/// - 以组合取代特化层次：三种实现各自独立满足本契约，互不继承。
///
/// ## 契约（What）
/// - `read`：读取至多 `buf.len()` 字节；非空缓冲的成功返回值至少为 1，
///   对端有序关闭映射为 [`ErrorKind::PeerClosed`](crate::error::ErrorKind)
///   错误而非零长返回；短读不是错误；
/// - `write`：阻塞语义下内部循环直到写尽全部字节，从不静默截断；
///   非阻塞语义下单次尝试，无法推进时返回瞬态 would-block；
/// - `has_data`：亚毫秒级有界就绪探测，真值表示随后的读取可立即返回；
/// - `set_nonblocking`：切换读写语义；底层套接字始终处于事件驱动
///   模式，本开关只改变接口层的等待行为；
/// - `close`：幂等，句柄恰好释放一次；关闭后任何读写以
///   [`ErrorKind::InvalidHandle`](crate::error::ErrorKind) 确定性失败，
///   不再触碰句柄；另一任务中阻塞的调用会在一个轮询间隔内以致命
///   错误返回；
/// - `peer_addr`/`local_addr`：返回构造时缓存的地址元数据，不回查 OS。
///
/// ## 注意事项（Trade-offs）
/// - 同一通道上的并发读或并发写不受支持，需由调用方串行化；实现内部
///   的互斥锁只保证不发生数据竞争，不保证字节流交错有意义。
#[async_trait]
pub trait Transport: Send + Sync {
    /// 稳定的通道标识，用于日志与池内诊断。
    fn id(&self) -> Cow<'_, str>;

    /// 对端地址元数据。
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// 本地地址元数据。
    fn local_addr(&self) -> Option<SocketAddr>;

    /// 通道是否已关闭。
    fn is_closed(&self) -> bool;

    /// 切换阻塞/非阻塞读写语义。
    fn set_nonblocking(&self, enabled: bool);

    /// 读取数据到缓冲区，返回实际读取的字节数。
    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// 写入缓冲区，返回实际写入的字节数。
    async fn write(&self, buf: &[u8]) -> Result<usize, TransportError>;

    /// 有界探测是否有数据可读。
    async fn has_data(&self) -> Result<bool, TransportError>;

    /// 按方向执行半关闭。
    async fn shutdown(&self, direction: ShutdownDirection) -> Result<(), TransportError>;

    /// 幂等关闭并释放句柄。
    async fn close(&self) -> Result<(), TransportError>;
}

/// [`Transport`] 的便捷扩展：单字节读写与地址格式化。
#[async_trait]
pub trait TransportExt: Transport {
    /// 读取单个字节。
    async fn read_byte(&self) -> Result<u8, TransportError> {
        let mut byte = [0u8; 1];
        let read = self.read(&mut byte).await?;
        debug_assert_eq!(read, 1);
        Ok(byte[0])
    }

    /// 写入单个字节。
    async fn write_byte(&self, byte: u8) -> Result<(), TransportError> {
        self.write(&[byte]).await.map(|_| ())
    }

    /// 格式化缓存的端地址；`remote` 选择对端或本地侧。
    fn format_addr(&self, remote: bool, include_port: bool) -> String {
        let addr = if remote {
            self.peer_addr()
        } else {
            self.local_addr()
        };
        match addr {
            Some(addr) => Endpoint::from(addr).format(include_port),
            None => "<unbound>".to_string(),
        }
    }
}

impl<T: Transport + ?Sized> TransportExt for T {}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    fn id(&self) -> Cow<'_, str> {
        (**self).id()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        (**self).peer_addr()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        (**self).local_addr()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn set_nonblocking(&self, enabled: bool) {
        (**self).set_nonblocking(enabled);
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).read(buf).await
    }

    async fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        (**self).write(buf).await
    }

    async fn has_data(&self) -> Result<bool, TransportError> {
        (**self).has_data().await
    }

    async fn shutdown(&self, direction: ShutdownDirection) -> Result<(), TransportError> {
        (**self).shutdown(direction).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        (**self).close().await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn id(&self) -> Cow<'_, str> {
        (**self).id()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        (**self).peer_addr()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        (**self).local_addr()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn set_nonblocking(&self, enabled: bool) {
        (**self).set_nonblocking(enabled);
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).read(buf).await
    }

    async fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        (**self).write(buf).await
    }

    async fn has_data(&self) -> Result<bool, TransportError> {
        (**self).has_data().await
    }

    async fn shutdown(&self, direction: ShutdownDirection) -> Result<(), TransportError> {
        (**self).shutdown(direction).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        (**self).close().await
    }
}
