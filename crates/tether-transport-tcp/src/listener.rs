use std::io;
use std::net::SocketAddr;

use futures_util::FutureExt;
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tether_core::error::TransportError;
use tether_core::frame;
use tether_core::prelude::*;
use tether_core::resolver;
use tokio::net::TcpListener as TokioTcpListener;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::TcpChannel;
use crate::channel::apply_config;
use crate::error::{self, map_io_error};
use crate::util::{CloseFlag, run_io};

/// TCP 监听器：绑定、接受连接与可立即重绑的关闭序列。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 在不暴露 Tokio 具体类型的前提下提供“监听、接受连接”的最小能力；
/// - 把地址复用的生效窗口限制在绑定动作本身，避免后续接受的连接
///   继承复用语义造成静默双绑。
///
/// ## 逻辑（How）
/// - `bind`：经 `socket2` 依次执行“临时启用 SO_REUSEADDR、绑定、
///   监听、按配置收回复用”，再移交给 Tokio 监听器；
/// - `accept`：阻塞配置下在截止时间内等待；非阻塞配置下单次轮询，
///   无等待连接时返回瞬态 would-block；
/// - `close`：释放句柄前重新打开地址复用，使重启后的进程可以立即
///   重绑同一端口，无需等待内核的连接拆除宽限期。
///
/// ## 契约（What）
/// - 接受失败不会使监听器失效，后续 `accept` 仍可继续；
/// - 接受返回的通道已应用监听器持有的配置；
/// - `close` 幂等。
#[derive(Debug)]
pub struct TcpListener {
    inner: AsyncMutex<Option<TokioTcpListener>>,
    closed: CloseFlag,
    local_addr: SocketAddr,
    config: SocketConfig,
}

impl TcpListener {
    /// 绑定到端点并开始监听。
    pub async fn bind(endpoint: &Endpoint, config: &SocketConfig) -> Result<Self, TransportError> {
        let addr = resolver::resolve(endpoint)
            .await
            .map_err(|err| err.with_frame(frame!("tcp bind")))?;
        let listener = bind_with_reuse_window(addr, config)
            .map_err(|err| map_io_error(error::BIND, err))?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| map_io_error(error::BIND, err))?;
        debug!(target: "tether::tcp", local = %local_addr, backlog = config.backlog(), "listening");
        Ok(Self {
            inner: AsyncMutex::new(Some(listener)),
            closed: CloseFlag::new(),
            local_addr,
            config: config.clone(),
        })
    }

    /// 监听器实际绑定的地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 接受一个入站连接。
    ///
    /// # 契约说明
    /// - 阻塞配置：在配置的截止时间内等待，超时返回
    ///   [`ErrorKind::Timeout`](tether_core::ErrorKind)；
    /// - 非阻塞配置：单次轮询，无等待连接时返回瞬态 would-block；
    /// - 两种配置下监听器在错误后都保持可用。
    pub async fn accept(&self) -> Result<TcpChannel, TransportError> {
        if self.closed.is_set() {
            return Err(error::invalid_handle(error::ACCEPT));
        }
        if !self.config.blocking() {
            return self.try_accept_once().await;
        }
        let (stream, peer_addr) = run_io(
            error::ACCEPT,
            self.config.timeout(),
            &self.closed,
            async {
                let guard = self.inner.lock().await;
                match guard.as_ref() {
                    Some(listener) => listener.accept().await,
                    None => Err(io::Error::from(io::ErrorKind::NotConnected)),
                }
            },
        )
        .await?;
        self.wrap_accepted(stream, peer_addr)
    }

    /// 幂等关闭；释放句柄前重新打开地址复用。
    pub async fn close(&self) -> Result<(), TransportError> {
        if self.closed.set() {
            return Ok(());
        }
        let mut guard = self.inner.lock().await;
        if let Some(listener) = guard.take() {
            let sock = SockRef::from(&listener);
            // 释放前恢复复用，重启的进程才能立即重绑。
            let _ = sock.set_reuse_address(true);
            drop(listener);
            debug!(target: "tether::tcp", local = %self.local_addr, "listener closed");
        }
        Ok(())
    }

    /// 监听器是否已关闭。
    pub fn is_closed(&self) -> bool {
        self.closed.is_set()
    }

    async fn try_accept_once(&self) -> Result<TcpChannel, TransportError> {
        let guard = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(_) => return Err(error::would_block(error::ACCEPT)),
        };
        let Some(listener) = guard.as_ref() else {
            return Err(error::invalid_handle(error::ACCEPT));
        };
        match listener.accept().now_or_never() {
            Some(Ok((stream, peer_addr))) => {
                drop(guard);
                self.wrap_accepted(stream, peer_addr)
            }
            Some(Err(err)) => Err(map_io_error(error::ACCEPT, err)),
            None => Err(error::would_block(error::ACCEPT)),
        }
    }

    fn wrap_accepted(
        &self,
        stream: tokio::net::TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<TcpChannel, TransportError> {
        apply_config(&stream, &self.config).map_err(|err| map_io_error(error::CONFIGURE, err))?;
        let local_addr = stream
            .local_addr()
            .map_err(|err| map_io_error(error::ACCEPT, err))?;
        debug!(target: "tether::tcp", local = %local_addr, peer = %peer_addr, "accepted");
        Ok(TcpChannel::from_parts(
            stream,
            local_addr,
            peer_addr,
            &self.config,
        ))
    }
}

/// 绑定序列：复用窗口仅覆盖“绑定、监听”，随后按配置收回。
fn bind_with_reuse_window(
    addr: SocketAddr,
    config: &SocketConfig,
) -> io::Result<TokioTcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(config.backlog() as i32)?;
    socket.set_reuse_address(config.reuse_addr())?;
    socket.set_nonblocking(true)?;
    TokioTcpListener::from_std(socket.into())
}
