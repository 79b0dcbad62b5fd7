use std::borrow::Cow;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rustls_pki_types::ServerName;
use tether_core::error::TransportError;
use tether_core::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream as TokioTcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio_rustls::{TlsConnector as TokioTlsConnector, TlsStream};
use tracing::{debug, trace};

use crate::error::{self, map_io_error};
use crate::util::{CloseFlag, run_io};

const PROBE_WINDOW: Duration = Duration::from_micros(500);
/// `close_notify` 的尽力发送窗口；超时不阻碍句柄释放。
const CLOSE_NOTIFY_WINDOW: Duration = Duration::from_millis(250);

/// 会话状态：客户端可以带着未握手的裸流存在，首次读写时补齐握手。
enum TlsState {
    PendingClient {
        stream: TokioTcpStream,
        connector: TokioTlsConnector,
        server_name: ServerName<'static>,
    },
    Ready(Box<TlsStream<TokioTcpStream>>),
    Released,
}

impl fmt::Debug for TlsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsState::PendingClient { .. } => f.write_str("PendingClient"),
            TlsState::Ready(_) => f.write_str("Ready"),
            TlsState::Released => f.write_str("Released"),
        }
    }
}

#[derive(Debug)]
struct TlsChannelInner {
    state: AsyncMutex<TlsState>,
    handshake_done: AtomicBool,
    closed: CloseFlag,
    nonblocking: AtomicBool,
    timeout: Duration,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
}

/// TLS 通道：握手完成后与明文通道同形的加密读写能力。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 调用方无须区分明文与加密：读写、探测、关闭的外形与
///   `TcpChannel` 完全一致；
/// - 客户端握手可以推迟到第一次读写，连接池预热等场景得以把握手
///   成本摊到真正使用时。
///
/// ## 逻辑（How）
/// - 状态机三态：`PendingClient`（裸流待握手）、`Ready`（加密流）、
///   `Released`（句柄已释放）；
/// - 任何读写先经 [`ensure_handshake`](Self::handshake) 驱动到
///   `Ready`；握手失败即弃置状态，后续操作以句柄失效返回；
/// - `handshake_done` 原子标志为只读查询提供无锁路径。
///
/// ## 契约（What）
/// - [`is_handshake_complete`](Self::is_handshake_complete)：rustls
///   握手完成前恒为假；
/// - 应用字节绝不先于握手完成上线（由 rustls 会话层保证）；
/// - `close` 幂等，尽力发送 `close_notify` 后释放句柄恰好一次。
///
/// ## 注意事项（Trade-offs）
/// - `has_data` 只看底层 TCP 可读性，不含会话内已解密的残留字节；
/// - 非阻塞读以“探测 + 快速读”近似，延迟敏感场景请使用阻塞语义。
#[derive(Clone, Debug)]
pub struct TlsChannel {
    inner: Arc<TlsChannelInner>,
}

impl TlsChannel {
    pub(crate) fn ready(
        stream: TlsStream<TokioTcpStream>,
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
        config: &SocketConfig,
    ) -> Self {
        Self {
            inner: Arc::new(TlsChannelInner {
                state: AsyncMutex::new(TlsState::Ready(Box::new(stream))),
                handshake_done: AtomicBool::new(true),
                closed: CloseFlag::new(),
                nonblocking: AtomicBool::new(!config.blocking()),
                timeout: config.timeout(),
                peer_addr,
                local_addr,
            }),
        }
    }

    pub(crate) fn pending_client(
        stream: TokioTcpStream,
        connector: TokioTlsConnector,
        server_name: ServerName<'static>,
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
        config: &SocketConfig,
    ) -> Self {
        Self {
            inner: Arc::new(TlsChannelInner {
                state: AsyncMutex::new(TlsState::PendingClient {
                    stream,
                    connector,
                    server_name,
                }),
                handshake_done: AtomicBool::new(false),
                closed: CloseFlag::new(),
                nonblocking: AtomicBool::new(!config.blocking()),
                timeout: config.timeout(),
                peer_addr,
                local_addr,
            }),
        }
    }

    /// 握手是否已经完成。
    pub fn is_handshake_complete(&self) -> bool {
        self.inner.handshake_done.load(Ordering::Acquire)
    }

    /// 显式驱动握手到完成；已完成时为空操作。
    ///
    /// # 契约说明
    /// - 失败即弃置会话，后续操作以句柄失效返回；不存在半握手状态；
    /// - 并发调用安全：后到者观察到 `Ready` 后直接返回。
    pub async fn handshake(&self) -> Result<(), TransportError> {
        if self.is_handshake_complete() {
            return Ok(());
        }
        if self.inner.closed.is_set() {
            return Err(error::invalid_handle(error::HANDSHAKE));
        }
        run_io(
            error::HANDSHAKE,
            self.inner.timeout,
            &self.inner.closed,
            async {
                let mut guard = self.inner.state.lock().await;
                match std::mem::replace(&mut *guard, TlsState::Released) {
                    TlsState::Ready(stream) => {
                        *guard = TlsState::Ready(stream);
                        Ok(())
                    }
                    TlsState::PendingClient {
                        stream,
                        connector,
                        server_name,
                    } => {
                        let tls = connector.connect(server_name, stream).await?;
                        *guard = TlsState::Ready(Box::new(tls.into()));
                        Ok(())
                    }
                    TlsState::Released => Err(io::Error::from(io::ErrorKind::NotConnected)),
                }
            },
            map_io_error,
        )
        .await?;
        self.inner.handshake_done.store(true, Ordering::Release);
        debug!(target: "tether::tls", peer = %self.inner.peer_addr, "handshake complete");
        Ok(())
    }

    /// 读取解密后的明文数据；未握手时先驱动握手。
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.inner.closed.is_set() {
            return Err(error::invalid_handle(error::READ));
        }
        self.handshake().await?;
        if self.inner.nonblocking.load(Ordering::Relaxed) && !self.has_data().await? {
            return Err(error::would_block(error::READ));
        }
        let read = run_io(
            error::READ,
            self.inner.timeout,
            &self.inner.closed,
            async {
                let mut guard = self.inner.state.lock().await;
                match &mut *guard {
                    TlsState::Ready(stream) => stream.read(buf).await,
                    _ => Err(io::Error::from(io::ErrorKind::NotConnected)),
                }
            },
            map_io_error,
        )
        .await?;
        if read == 0 {
            return Err(error::peer_closed(error::READ));
        }
        Ok(read)
    }

    /// 写入明文并由会话层加密；未握手时先驱动握手，从不截断。
    pub async fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.inner.closed.is_set() {
            return Err(error::invalid_handle(error::WRITE));
        }
        self.handshake().await?;
        let len = buf.len();
        run_io(
            error::WRITE,
            self.inner.timeout,
            &self.inner.closed,
            async {
                let mut guard = self.inner.state.lock().await;
                match &mut *guard {
                    TlsState::Ready(stream) => stream.write_all(buf).await.map(|_| len),
                    _ => Err(io::Error::from(io::ErrorKind::NotConnected)),
                }
            },
            map_io_error,
        )
        .await
    }

    /// 有界探测底层连接是否可读；握手未完成时恒为假。
    pub async fn has_data(&self) -> Result<bool, TransportError> {
        if self.inner.closed.is_set() {
            return Ok(false);
        }
        let guard = self.inner.state.lock().await;
        match &*guard {
            TlsState::Ready(stream) => {
                let (tcp, _session) = stream.get_ref();
                match tokio::time::timeout(PROBE_WINDOW, tcp.readable()).await {
                    Ok(Ok(())) => Ok(true),
                    Ok(Err(err)) => Err(map_io_error(error::PROBE, err)),
                    Err(_elapsed) => Ok(false),
                }
            }
            // 未握手或已释放的通道不存在应用数据。
            TlsState::PendingClient { .. } | TlsState::Released => Ok(false),
        }
    }

    /// 按方向执行半关闭；写方向发送 `close_notify`。
    pub async fn shutdown(&self, direction: ShutdownDirection) -> Result<(), TransportError> {
        if self.inner.closed.is_set() {
            return Err(error::invalid_handle(error::SHUTDOWN));
        }
        match direction {
            ShutdownDirection::Read => Ok(()),
            ShutdownDirection::Write | ShutdownDirection::Both => {
                run_io(
                    error::SHUTDOWN,
                    self.inner.timeout,
                    &self.inner.closed,
                    async {
                        let mut guard = self.inner.state.lock().await;
                        match &mut *guard {
                            TlsState::Ready(stream) => {
                                AsyncWriteExt::shutdown(stream.as_mut()).await
                            }
                            _ => Err(io::Error::from(io::ErrorKind::NotConnected)),
                        }
                    },
                    map_io_error,
                )
                .await
            }
        }
    }

    /// 幂等关闭：尽力发送 `close_notify`，句柄恰好释放一次。
    pub async fn close(&self) -> Result<(), TransportError> {
        if self.inner.closed.set() {
            return Ok(());
        }
        let mut guard = self.inner.state.lock().await;
        if let TlsState::Ready(mut stream) = std::mem::replace(&mut *guard, TlsState::Released) {
            let _ = tokio::time::timeout(
                CLOSE_NOTIFY_WINDOW,
                AsyncWriteExt::shutdown(stream.as_mut()),
            )
            .await;
            trace!(target: "tether::tls", peer = %self.inner.peer_addr, "handle released");
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
}

#[async_trait]
impl Transport for TlsChannel {
    fn id(&self) -> Cow<'_, str> {
        Cow::Owned(format!(
            "tls:{}->{}",
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
        TlsChannel::is_closed(self)
    }

    fn set_nonblocking(&self, enabled: bool) {
        TlsChannel::set_nonblocking(self, enabled);
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        TlsChannel::read(self, buf).await
    }

    async fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        TlsChannel::write(self, buf).await
    }

    async fn has_data(&self) -> Result<bool, TransportError> {
        TlsChannel::has_data(self).await
    }

    async fn shutdown(&self, direction: ShutdownDirection) -> Result<(), TransportError> {
        TlsChannel::shutdown(self, direction).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        TlsChannel::close(self).await
    }
}
