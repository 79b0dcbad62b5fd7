use std::borrow::Cow;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use socket2::SockRef;
use tether_core::error::TransportError;
use tether_core::prelude::*;
use tether_core::resolver;
use tether_core::frame;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream as TokioTcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, trace};

use crate::error::{self, map_io_error};
use crate::util::{CloseFlag, run_io};

/// `has_data` 探测窗口：亚毫秒级，保证探测本身不构成阻塞点。
const PROBE_WINDOW: Duration = Duration::from_micros(500);

#[derive(Debug)]
struct TcpChannelInner {
    stream: AsyncMutex<Option<TokioTcpStream>>,
    closed: CloseFlag,
    nonblocking: AtomicBool,
    timeout: Duration,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
}

/// TCP 通道：单条连接的读写、半关闭与生命周期管理。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 为上层提供对单个 TCP 连接的直接控制，同时贯彻配置的截止时间
///   与关闭语义；
/// - 作为 TLS 通道的底层载体，支持握手阶段整体拆出裸流。
///
/// ## 逻辑（How）
/// - 内部以 `tokio::sync::Mutex` 包裹 `Option<TcpStream>`，`None` 即
///   “句柄已释放”；多任务调用 `&self` 方法时由锁保证互斥；
/// - 阻塞读写经内部工具函数注入截止时间与关闭信号；非阻塞读写走
///   `try_read`/`try_write` 单次尝试路径；
/// - 地址元数据在构造时缓存，之后从不回查 OS。
///
/// ## 契约（What）
/// - `connect`：解析端点并在配置的截止时间内建连，随后应用套接字
///   选项；
/// - `adopt_std`：收养一个已打开的标准库句柄（监听器接受之外的
///   第三来源），地址经 OS 内省补全；
/// - `read`/`write`/`has_data`/`shutdown`/`close`：见
///   [`Transport`] 契约；
/// - `try_into_parts`：唯一持有者可拆出裸流交由 TLS 握手驱动。
///
/// ## 注意事项（Trade-offs）
/// - 锁序列化读写，无法与 `TcpStream::split` 一样实现真正的全双工；
/// - 非阻塞路径在锁竞争时同样返回 would-block，调用方按瞬态处理。
#[derive(Clone, Debug)]
pub struct TcpChannel {
    inner: Arc<TcpChannelInner>,
}

/// 将通道拆解为裸 `TcpStream` 与地址元数据的结果结构。
///
/// 所有权完全转移至该结构体，由上层（通常是 TLS 握手）决定后续处理。
#[derive(Debug)]
pub struct TcpChannelParts {
    pub stream: TokioTcpStream,
    pub local_addr: SocketAddr,
    pub peer_addr: SocketAddr,
}

impl TcpChannel {
    pub(crate) fn from_parts(
        stream: TokioTcpStream,
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
        config: &SocketConfig,
    ) -> Self {
        Self {
            inner: Arc::new(TcpChannelInner {
                stream: AsyncMutex::new(Some(stream)),
                closed: CloseFlag::new(),
                nonblocking: AtomicBool::new(!config.blocking()),
                timeout: config.timeout(),
                peer_addr,
                local_addr,
            }),
        }
    }

    /// 解析端点并在配置的截止时间内建立连接。
    pub async fn connect(
        endpoint: &Endpoint,
        config: &SocketConfig,
    ) -> Result<Self, TransportError> {
        let addr = resolver::resolve(endpoint)
            .await
            .map_err(|err| err.with_frame(frame!("tcp connect")))?;
        let closing = CloseFlag::new();
        let stream = run_io(
            error::CONNECT,
            config.timeout(),
            &closing,
            TokioTcpStream::connect(addr),
        )
        .await?;
        apply_config(&stream, config).map_err(|err| map_io_error(error::CONFIGURE, err))?;
        let local_addr = stream
            .local_addr()
            .map_err(|err| map_io_error(error::CONNECT, err))?;
        let peer_addr = stream
            .peer_addr()
            .map_err(|err| map_io_error(error::CONNECT, err))?;
        debug!(target: "tether::tcp", local = %local_addr, peer = %peer_addr, "connected");
        Ok(Self::from_parts(stream, local_addr, peer_addr, config))
    }

    /// 收养一个已打开的标准库句柄，地址经 OS 内省补全。
    ///
    /// # 契约说明
    /// - **前置条件**：调用方位于 Tokio 运行时中，且句柄处于已连接
    ///   状态；
    /// - **后置条件**：句柄的所有权转移至返回的通道，配置的套接字
    ///   选项已应用。
    pub fn adopt_std(
        stream: std::net::TcpStream,
        config: &SocketConfig,
    ) -> Result<Self, TransportError> {
        stream
            .set_nonblocking(true)
            .map_err(|err| map_io_error(error::CONFIGURE, err))?;
        let stream = TokioTcpStream::from_std(stream)
            .map_err(|err| map_io_error(error::CONFIGURE, err))?;
        apply_config(&stream, config).map_err(|err| map_io_error(error::CONFIGURE, err))?;
        let local_addr = stream
            .local_addr()
            .map_err(|err| map_io_error(error::CONFIGURE, err))?;
        let peer_addr = stream
            .peer_addr()
            .map_err(|err| map_io_error(error::CONFIGURE, err))?;
        Ok(Self::from_parts(stream, local_addr, peer_addr, config))
    }

    /// 将通道尝试拆解为 [`TcpChannelParts`]。
    ///
    /// # 契约说明
    /// - 返回 `Ok(parts)` 表示拆解成功，原通道不再可用；
    /// - 返回 `Err(self)` 表示仍有其他克隆持有者或通道已关闭，调用方
    ///   可继续以原样使用或放弃；
    /// - **前置条件**：调用方必须确保没有未完成的读写操作。
    pub fn try_into_parts(self) -> Result<TcpChannelParts, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => match inner.stream.get_mut().take() {
                Some(stream) => Ok(TcpChannelParts {
                    stream,
                    local_addr: inner.local_addr,
                    peer_addr: inner.peer_addr,
                }),
                None => Err(Self {
                    inner: Arc::new(inner),
                }),
            },
            Err(inner) => Err(Self { inner }),
        }
    }

    /// 读取数据到缓冲区。
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.inner.closed.is_set() {
            return Err(error::invalid_handle(error::READ));
        }
        if self.inner.nonblocking.load(Ordering::Relaxed) {
            return self.try_read_once(buf);
        }
        let read = run_io(error::READ, self.inner.timeout, &self.inner.closed, async {
            let mut guard = self.inner.stream.lock().await;
            match guard.as_mut() {
                Some(stream) => stream.read(buf).await,
                None => Err(io::Error::from(io::ErrorKind::NotConnected)),
            }
        })
        .await?;
        if read == 0 {
            return Err(error::peer_closed(error::READ));
        }
        Ok(read)
    }

    /// 将整个缓冲区写入套接字；阻塞语义下从不截断。
    pub async fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.inner.closed.is_set() {
            return Err(error::invalid_handle(error::WRITE));
        }
        if self.inner.nonblocking.load(Ordering::Relaxed) {
            return self.try_write_once(buf);
        }
        let len = buf.len();
        run_io(error::WRITE, self.inner.timeout, &self.inner.closed, async {
            let mut guard = self.inner.stream.lock().await;
            match guard.as_mut() {
                Some(stream) => stream.write_all(buf).await.map(|_| len),
                None => Err(io::Error::from(io::ErrorKind::NotConnected)),
            }
        })
        .await
    }

    /// 有界探测是否有数据可读；已关闭的通道恒为假。
    pub async fn has_data(&self) -> Result<bool, TransportError> {
        if self.inner.closed.is_set() {
            return Ok(false);
        }
        let guard = self.inner.stream.lock().await;
        let Some(stream) = guard.as_ref() else {
            return Ok(false);
        };
        match tokio::time::timeout(PROBE_WINDOW, stream.readable()).await {
            Ok(Ok(())) => Ok(true),
            Ok(Err(err)) => Err(map_io_error(error::PROBE, err)),
            Err(_elapsed) => Ok(false),
        }
    }

    /// 根据方向执行半关闭。
    pub async fn shutdown(&self, direction: ShutdownDirection) -> Result<(), TransportError> {
        if self.inner.closed.is_set() {
            return Err(error::invalid_handle(error::SHUTDOWN));
        }
        run_io(
            error::SHUTDOWN,
            self.inner.timeout,
            &self.inner.closed,
            async {
                let mut guard = self.inner.stream.lock().await;
                let Some(stream) = guard.as_mut() else {
                    return Err(io::Error::from(io::ErrorKind::NotConnected));
                };
                match direction {
                    ShutdownDirection::Write => AsyncWriteExt::shutdown(stream).await,
                    ShutdownDirection::Read => sync_shutdown(stream, std::net::Shutdown::Read),
                    ShutdownDirection::Both => {
                        AsyncWriteExt::shutdown(stream).await?;
                        sync_shutdown(stream, std::net::Shutdown::Read)
                    }
                }
            },
        )
        .await
    }

    /// 幂等关闭：置位关闭信号，待在途操作退出后释放句柄恰好一次。
    pub async fn close(&self) -> Result<(), TransportError> {
        if self.inner.closed.set() {
            return Ok(());
        }
        let mut guard = self.inner.stream.lock().await;
        if guard.take().is_some() {
            trace!(target: "tether::tcp", peer = %self.inner.peer_addr, "handle released");
        }
        Ok(())
    }

    /// 通道是否已关闭。
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_set()
    }

    /// 切换阻塞/非阻塞读写语义。
    pub fn set_nonblocking(&self, enabled: bool) {
        self.inner.nonblocking.store(enabled, Ordering::Relaxed);
    }

    /// 对端地址。
    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.peer_addr
    }

    /// 本地地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    fn try_read_once(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let guard = match self.inner.stream.try_lock() {
            Ok(guard) => guard,
            Err(_) => return Err(error::would_block(error::READ)),
        };
        let Some(stream) = guard.as_ref() else {
            return Err(error::invalid_handle(error::READ));
        };
        match stream.try_read(buf) {
            Ok(0) => Err(error::peer_closed(error::READ)),
            Ok(read) => Ok(read),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                Err(error::would_block(error::READ))
            }
            Err(err) => Err(map_io_error(error::READ, err)),
        }
    }

    fn try_write_once(&self, buf: &[u8]) -> Result<usize, TransportError> {
        let guard = match self.inner.stream.try_lock() {
            Ok(guard) => guard,
            Err(_) => return Err(error::would_block(error::WRITE)),
        };
        let Some(stream) = guard.as_ref() else {
            return Err(error::invalid_handle(error::WRITE));
        };
        match stream.try_write(buf) {
            Ok(0) => Err(error::would_block(error::WRITE)),
            Ok(written) => Ok(written),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                Err(error::would_block(error::WRITE))
            }
            Err(err) => Err(map_io_error(error::WRITE, err)),
        }
    }
}

#[async_trait]
impl Transport for TcpChannel {
    fn id(&self) -> Cow<'_, str> {
        Cow::Owned(format!(
            "tcp:{}->{}",
            self.inner.local_addr, self.inner.peer_addr
        ))
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.inner.peer_addr)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.inner.local_addr)
    }

    fn is_closed(&self) -> bool {
        TcpChannel::is_closed(self)
    }

    fn set_nonblocking(&self, enabled: bool) {
        TcpChannel::set_nonblocking(self, enabled);
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        TcpChannel::read(self, buf).await
    }

    async fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        TcpChannel::write(self, buf).await
    }

    async fn has_data(&self) -> Result<bool, TransportError> {
        TcpChannel::has_data(self).await
    }

    async fn shutdown(&self, direction: ShutdownDirection) -> Result<(), TransportError> {
        TcpChannel::shutdown(self, direction).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        TcpChannel::close(self).await
    }
}

/// 将配置应用到已建立的流；Tokio 未覆盖的选项走 `SockRef`。
pub(crate) fn apply_config(stream: &TokioTcpStream, config: &SocketConfig) -> io::Result<()> {
    stream.set_nodelay(config.no_delay())?;
    stream.set_linger(config.linger())?;
    let sock = SockRef::from(stream);
    sock.set_send_buffer_size(config.send_buffer_size())?;
    sock.set_recv_buffer_size(config.recv_buffer_size())?;
    sock.set_keepalive(config.keep_alive())?;
    Ok(())
}

fn sync_shutdown(stream: &TokioTcpStream, direction: std::net::Shutdown) -> io::Result<()> {
    let sock = SockRef::from(stream);
    sock.shutdown(direction)
}
