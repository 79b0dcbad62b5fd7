#![doc = r#"
# tether-transport-udp

## 模块使命（Why）
- **统一数据报通路**：围绕 Tokio `UdpSocket` 提供轻量封装，使上层能以
  与流式传输一致的配置与错误语义使用无连接传输。
- **固定对端模式**：`connect_peer` 之后端点满足
  [`Transport`](tether_core::Transport) 能力契约，可被连接池与流适配层
  当作普通传输持有。

## 核心契约（What）
- [`UdpEndpoint`] 负责套接字生命周期管理，提供 `send_to`/`recv_from`
  的显式寻址接口与固定对端后的 `read`/`write`；
- 数据报语义差异：空数据报是合法的零长读取，不映射为对端关闭；
  对端关闭在无连接传输中本就不可观测；
- `shutdown` 在数据报语义下没有对应操作，作为已文档化的空操作存在。

## 实现策略（How）
- 绑定与收发直接委托 Tokio `UdpSocket`；Tokio 未暴露的缓冲选项经
  `socket2::SockRef` 应用；
- 阻塞语义经内部工具注入截止时间与关闭信号，非阻塞语义走
  `try_send`/`try_recv` 单次尝试路径。

## 风险与考量（Trade-offs）
- 单把互斥锁序列化收发，吞吐敏感的场景应为收发两侧各建端点；
- 关闭信号采用定时轮询，取消响应存在毫秒级延迟。
"#]

#[cfg(feature = "runtime-tokio")]
mod runtime_impl {
    use std::borrow::Cow;
    use std::future::Future;
    use std::io;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use socket2::SockRef;
    use tether_core::error::{ErrorKind, TransportError, describe_io_kind};
    use tether_core::frame;
    use tether_core::prelude::*;
    use tether_core::resolver;
    use tokio::net::UdpSocket;
    use tokio::sync::Mutex as AsyncMutex;
    use tracing::debug;

    const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(5);
    const PROBE_WINDOW: Duration = Duration::from_micros(500);

    /// 描述一次底层操作对应的稳定错误码、默认文案与兜底种类。
    #[derive(Clone, Copy)]
    struct OperationKind {
        code: &'static str,
        message: &'static str,
        fallback: ErrorKind,
    }

    const BIND: OperationKind = OperationKind {
        code: "tether.transport.udp.bind_failed",
        message: "udp bind",
        fallback: ErrorKind::Bind,
    };
    const CONNECT: OperationKind = OperationKind {
        code: "tether.transport.udp.connect_failed",
        message: "udp connect",
        fallback: ErrorKind::Connect,
    };
    const SEND: OperationKind = OperationKind {
        code: "tether.transport.udp.send_failed",
        message: "udp send",
        fallback: ErrorKind::Other,
    };
    const RECV: OperationKind = OperationKind {
        code: "tether.transport.udp.recv_failed",
        message: "udp recv",
        fallback: ErrorKind::Other,
    };
    const PROBE: OperationKind = OperationKind {
        code: "tether.transport.udp.probe_failed",
        message: "udp probe",
        fallback: ErrorKind::Other,
    };
    const CONFIGURE: OperationKind = OperationKind {
        code: "tether.transport.udp.configure_failed",
        message: "udp configure",
        fallback: ErrorKind::Other,
    };

    fn map_io_error(op: OperationKind, error: io::Error) -> TransportError {
        use io::ErrorKind as K;
        let kind = match error.kind() {
            K::WouldBlock | K::Interrupted => ErrorKind::WouldBlock,
            K::TimedOut => ErrorKind::Timeout,
            K::ConnectionReset | K::ConnectionAborted => ErrorKind::PeerReset,
            K::NotConnected => ErrorKind::InvalidHandle,
            _ => op.fallback,
        };
        TransportError::new(
            op.code,
            format!("{}: {}", op.message, describe_io_kind(error.kind())),
        )
        .with_kind(kind)
        .with_cause(error)
    }

    fn timeout_error(op: OperationKind) -> TransportError {
        TransportError::new(
            "tether.transport.udp.timeout",
            format!("{} timed out", op.message),
        )
        .with_kind(ErrorKind::Timeout)
    }

    fn closed_error(op: OperationKind) -> TransportError {
        TransportError::new(
            "tether.transport.udp.closed",
            format!("{} aborted by concurrent close", op.message),
        )
        .with_kind(ErrorKind::Cancelled)
    }

    fn would_block(op: OperationKind) -> TransportError {
        TransportError::new(
            "tether.transport.udp.would_block",
            format!("{} would block", op.message),
        )
        .with_kind(ErrorKind::WouldBlock)
    }

    fn invalid_handle(op: OperationKind) -> TransportError {
        TransportError::new(
            "tether.transport.udp.invalid_handle",
            format!("{} on a closed socket", op.message),
        )
        .with_kind(ErrorKind::InvalidHandle)
    }

    fn no_peer_error() -> TransportError {
        TransportError::new(
            "tether.transport.udp.no_peer",
            "stream-style io needs a fixed peer; call connect_peer first",
        )
        .with_kind(ErrorKind::InvalidHandle)
    }

    #[derive(Debug, Default)]
    struct CloseFlag {
        flag: AtomicBool,
    }

    impl CloseFlag {
        fn new() -> Self {
            Self {
                flag: AtomicBool::new(false),
            }
        }

        fn set(&self) -> bool {
            self.flag.swap(true, Ordering::SeqCst)
        }

        fn is_set(&self) -> bool {
            self.flag.load(Ordering::SeqCst)
        }

        async fn wait(&self) {
            while !self.is_set() {
                tokio::time::sleep(CLOSE_POLL_INTERVAL).await;
            }
        }
    }

    async fn run_io<F, T>(
        op: OperationKind,
        timeout: Duration,
        closed: &CloseFlag,
        future: F,
    ) -> Result<T, TransportError>
    where
        F: Future<Output = io::Result<T>>,
    {
        if closed.is_set() {
            return Err(invalid_handle(op));
        }
        let cancel = closed.wait();
        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(cancel);
        tokio::pin!(sleep);
        tokio::pin!(future);
        tokio::select! {
            biased;
            _ = &mut cancel => Err(closed_error(op)),
            _ = &mut sleep => Err(timeout_error(op)),
            result = &mut future => result.map_err(|err| map_io_error(op, err)),
        }
    }

    #[derive(Debug)]
    struct UdpEndpointInner {
        sock: AsyncMutex<Option<UdpSocket>>,
        closed: CloseFlag,
        nonblocking: AtomicBool,
        timeout: Duration,
        local_addr: SocketAddr,
        peer: StdMutex<Option<SocketAddr>>,
    }

    /// UDP 端点：显式寻址收发，固定对端后升级为流式能力。
    ///
    /// # 教案级注释
    ///
    /// ## 意图（Why）
    /// - 为无连接传输提供与流式通道一致的配置、错误与生命周期语义；
    /// - 固定对端后可被只认 [`Transport`] 的上层（连接池、流适配层）
    ///   直接持有。
    ///
    /// ## 契约（What）
    /// - `send_to`/`recv_from`：显式寻址的数据报收发；
    /// - `connect_peer`：固定对端，此后 `read`/`write` 只与该对端交换
    ///   数据；
    /// - 空数据报是合法的零长读取，不表示对端关闭；
    /// - `close` 幂等，阻塞中的收发在一个轮询间隔内以致命错误返回。
    #[derive(Clone, Debug)]
    pub struct UdpEndpoint {
        inner: Arc<UdpEndpointInner>,
    }

    impl UdpEndpoint {
        /// 绑定到端点并应用缓冲配置。
        pub async fn bind(
            endpoint: &Endpoint,
            config: &SocketConfig,
        ) -> Result<Self, TransportError> {
            let addr = resolver::resolve(endpoint)
                .await
                .map_err(|err| err.with_frame(frame!("udp bind")))?;
            let sock = UdpSocket::bind(addr)
                .await
                .map_err(|err| map_io_error(BIND, err))?;
            apply_config(&sock, config).map_err(|err| map_io_error(CONFIGURE, err))?;
            let local_addr = sock
                .local_addr()
                .map_err(|err| map_io_error(BIND, err))?;
            debug!(target: "tether::udp", local = %local_addr, "bound");
            Ok(Self {
                inner: Arc::new(UdpEndpointInner {
                    sock: AsyncMutex::new(Some(sock)),
                    closed: CloseFlag::new(),
                    nonblocking: AtomicBool::new(!config.blocking()),
                    timeout: config.timeout(),
                    local_addr,
                    peer: StdMutex::new(None),
                }),
            })
        }

        /// 固定对端；此后流式读写只与该对端交换数据。
        pub async fn connect_peer(&self, endpoint: &Endpoint) -> Result<(), TransportError> {
            let addr = resolver::resolve(endpoint)
                .await
                .map_err(|err| err.with_frame(frame!("udp connect")))?;
            run_io(CONNECT, self.inner.timeout, &self.inner.closed, async {
                let guard = self.inner.sock.lock().await;
                match guard.as_ref() {
                    Some(sock) => sock.connect(addr).await,
                    None => Err(io::Error::from(io::ErrorKind::NotConnected)),
                }
            })
            .await?;
            match self.inner.peer.lock() {
                Ok(mut guard) => *guard = Some(addr),
                Err(poisoned) => *poisoned.into_inner() = Some(addr),
            }
            debug!(target: "tether::udp", peer = %addr, "peer fixed");
            Ok(())
        }

        /// 向指定端点发送一个数据报。
        pub async fn send_to(
            &self,
            buf: &[u8],
            target: &Endpoint,
        ) -> Result<usize, TransportError> {
            let addr = resolver::resolve(target)
                .await
                .map_err(|err| err.with_frame(frame!("udp send")))?;
            run_io(SEND, self.inner.timeout, &self.inner.closed, async {
                let guard = self.inner.sock.lock().await;
                match guard.as_ref() {
                    Some(sock) => sock.send_to(buf, addr).await,
                    None => Err(io::Error::from(io::ErrorKind::NotConnected)),
                }
            })
            .await
        }

        /// 接收一个数据报，返回长度与来源地址。
        pub async fn recv_from(
            &self,
            buf: &mut [u8],
        ) -> Result<(usize, SocketAddr), TransportError> {
            run_io(RECV, self.inner.timeout, &self.inner.closed, async {
                let guard = self.inner.sock.lock().await;
                match guard.as_ref() {
                    Some(sock) => sock.recv_from(buf).await,
                    None => Err(io::Error::from(io::ErrorKind::NotConnected)),
                }
            })
            .await
        }

        /// 固定的对端地址（若有）。
        pub fn peer(&self) -> Option<SocketAddr> {
            match self.inner.peer.lock() {
                Ok(guard) => *guard,
                Err(poisoned) => *poisoned.into_inner(),
            }
        }

        /// 本地地址。
        pub fn local_addr(&self) -> SocketAddr {
            self.inner.local_addr
        }

        /// 端点是否已关闭。
        pub fn is_closed(&self) -> bool {
            self.inner.closed.is_set()
        }

        /// 切换阻塞/非阻塞收发语义。
        pub fn set_nonblocking(&self, enabled: bool) {
            self.inner.nonblocking.store(enabled, Ordering::Relaxed);
        }

        /// 幂等关闭并释放句柄。
        pub async fn close(&self) -> Result<(), TransportError> {
            if self.inner.closed.set() {
                return Ok(());
            }
            let mut guard = self.inner.sock.lock().await;
            guard.take();
            Ok(())
        }

        /// 有界探测是否有数据报待收。
        pub async fn has_data(&self) -> Result<bool, TransportError> {
            if self.inner.closed.is_set() {
                return Ok(false);
            }
            let guard = self.inner.sock.lock().await;
            let Some(sock) = guard.as_ref() else {
                return Ok(false);
            };
            match tokio::time::timeout(PROBE_WINDOW, sock.readable()).await {
                Ok(Ok(())) => Ok(true),
                Ok(Err(err)) => Err(map_io_error(PROBE, err)),
                Err(_elapsed) => Ok(false),
            }
        }

        fn require_peer(&self) -> Result<(), TransportError> {
            if self.peer().is_none() {
                return Err(no_peer_error());
            }
            Ok(())
        }

        async fn read_connected(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
            if self.inner.closed.is_set() {
                return Err(invalid_handle(RECV));
            }
            self.require_peer()?;
            if self.inner.nonblocking.load(Ordering::Relaxed) {
                let guard = match self.inner.sock.try_lock() {
                    Ok(guard) => guard,
                    Err(_) => return Err(would_block(RECV)),
                };
                let Some(sock) = guard.as_ref() else {
                    return Err(invalid_handle(RECV));
                };
                return match sock.try_recv(buf) {
                    Ok(read) => Ok(read),
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                        Err(would_block(RECV))
                    }
                    Err(err) => Err(map_io_error(RECV, err)),
                };
            }
            run_io(RECV, self.inner.timeout, &self.inner.closed, async {
                let guard = self.inner.sock.lock().await;
                match guard.as_ref() {
                    Some(sock) => sock.recv(buf).await,
                    None => Err(io::Error::from(io::ErrorKind::NotConnected)),
                }
            })
            .await
        }

        async fn write_connected(&self, buf: &[u8]) -> Result<usize, TransportError> {
            if self.inner.closed.is_set() {
                return Err(invalid_handle(SEND));
            }
            self.require_peer()?;
            if self.inner.nonblocking.load(Ordering::Relaxed) {
                let guard = match self.inner.sock.try_lock() {
                    Ok(guard) => guard,
                    Err(_) => return Err(would_block(SEND)),
                };
                let Some(sock) = guard.as_ref() else {
                    return Err(invalid_handle(SEND));
                };
                return match sock.try_send(buf) {
                    Ok(written) => Ok(written),
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                        Err(would_block(SEND))
                    }
                    Err(err) => Err(map_io_error(SEND, err)),
                };
            }
            run_io(SEND, self.inner.timeout, &self.inner.closed, async {
                let guard = self.inner.sock.lock().await;
                match guard.as_ref() {
                    Some(sock) => sock.send(buf).await,
                    None => Err(io::Error::from(io::ErrorKind::NotConnected)),
                }
            })
            .await
        }
    }

    #[async_trait]
    impl Transport for UdpEndpoint {
        fn id(&self) -> Cow<'_, str> {
            match self.peer() {
                Some(peer) => Cow::Owned(format!("udp:{}->{}", self.inner.local_addr, peer)),
                None => Cow::Owned(format!("udp:{}", self.inner.local_addr)),
            }
        }

        fn peer_addr(&self) -> Option<SocketAddr> {
            self.peer()
        }

        fn local_addr(&self) -> Option<SocketAddr> {
            Some(self.inner.local_addr)
        }

        fn is_closed(&self) -> bool {
            UdpEndpoint::is_closed(self)
        }

        fn set_nonblocking(&self, enabled: bool) {
            UdpEndpoint::set_nonblocking(self, enabled);
        }

        async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
            self.read_connected(buf).await
        }

        async fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
            self.write_connected(buf).await
        }

        async fn has_data(&self) -> Result<bool, TransportError> {
            UdpEndpoint::has_data(self).await
        }

        /// 数据报语义下没有半关闭，作为已文档化的空操作存在。
        async fn shutdown(&self, _direction: ShutdownDirection) -> Result<(), TransportError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), TransportError> {
            UdpEndpoint::close(self).await
        }
    }

    fn apply_config(sock: &UdpSocket, config: &SocketConfig) -> io::Result<()> {
        let sref = SockRef::from(sock);
        sref.set_send_buffer_size(config.send_buffer_size())?;
        sref.set_recv_buffer_size(config.recv_buffer_size())?;
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use tether_core::transport::TransportExt;

        fn loopback() -> Endpoint {
            Endpoint::new("127.0.0.1", 0)
        }

        fn test_config() -> SocketConfig {
            SocketConfig::builder()
                .with_timeout(Duration::from_secs(5))
                .build()
        }

        /// 显式寻址的收发闭环：长度、内容与来源地址都不得失真。
        #[tokio::test(flavor = "multi_thread")]
        async fn send_to_recv_from_round_trip() {
            let config = test_config();
            let left = UdpEndpoint::bind(&loopback(), &config).await.expect("bind left");
            let right = UdpEndpoint::bind(&loopback(), &config).await.expect("bind right");

            let target = Endpoint::from(right.local_addr());
            let written = left.send_to(b"datagram", &target).await.expect("send");
            assert_eq!(written, 8);

            let mut buf = [0u8; 32];
            let (read, from) = right.recv_from(&mut buf).await.expect("recv");
            assert_eq!(&buf[..read], b"datagram");
            assert_eq!(from, left.local_addr());
        }

        /// 固定对端后，端点以流式能力收发。
        #[tokio::test(flavor = "multi_thread")]
        async fn fixed_peer_enables_stream_io() {
            let config = test_config();
            let left = UdpEndpoint::bind(&loopback(), &config).await.expect("bind left");
            let right = UdpEndpoint::bind(&loopback(), &config).await.expect("bind right");

            left.connect_peer(&Endpoint::from(right.local_addr()))
                .await
                .expect("fix left peer");
            right
                .connect_peer(&Endpoint::from(left.local_addr()))
                .await
                .expect("fix right peer");

            left.write(b"ping").await.expect("write");
            let mut buf = [0u8; 16];
            let read = right.read(&mut buf).await.expect("read");
            assert_eq!(&buf[..read], b"ping");

            // 单字节扩展接口同样可用。
            right.write_byte(0x7f).await.expect("write byte");
            assert_eq!(left.read_byte().await.expect("read byte"), 0x7f);
        }

        /// 未固定对端时流式读写被拒绝。
        #[tokio::test(flavor = "multi_thread")]
        async fn stream_io_without_peer_is_rejected() {
            let config = test_config();
            let endpoint = UdpEndpoint::bind(&loopback(), &config).await.expect("bind");
            let err = endpoint.write(b"x").await.expect_err("no peer");
            assert_eq!(err.kind(), ErrorKind::InvalidHandle);
        }

        /// 静默端点探测为假，对端发包后在轮询窗口内变真。
        #[tokio::test(flavor = "multi_thread")]
        async fn has_data_tracks_datagrams() {
            let config = test_config();
            let left = UdpEndpoint::bind(&loopback(), &config).await.expect("bind left");
            let right = UdpEndpoint::bind(&loopback(), &config).await.expect("bind right");

            assert!(!right.has_data().await.expect("probe idle"));
            left.send_to(&[1], &Endpoint::from(right.local_addr()))
                .await
                .expect("send");
            let mut observed = false;
            for _ in 0..100 {
                if right.has_data().await.expect("probe") {
                    observed = true;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert!(observed, "probe must observe the pending datagram");
        }

        /// 关闭幂等，关闭后的收发以句柄失效返回。
        #[tokio::test(flavor = "multi_thread")]
        async fn close_is_idempotent() {
            let config = test_config();
            let endpoint = UdpEndpoint::bind(&loopback(), &config).await.expect("bind");
            endpoint.close().await.expect("first close");
            endpoint.close().await.expect("second close is a no-op");

            let mut buf = [0u8; 4];
            let err = endpoint.recv_from(&mut buf).await.expect_err("recv after close");
            assert_eq!(err.kind(), ErrorKind::InvalidHandle);
        }
    }
}

#[cfg(feature = "runtime-tokio")]
pub use runtime_impl::UdpEndpoint;
