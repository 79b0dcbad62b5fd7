use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use rustls::ServerConfig;
use tether_core::error::TransportError;
use tether_core::prelude::*;
use tether_transport_tcp::TcpChannel;
use tokio_rustls::TlsAcceptor as TokioTlsAcceptor;
use tracing::debug;

use crate::channel::TlsChannel;
use crate::error::{self, map_io_error};
use crate::material;
use crate::util::{CloseFlag, run_io};

/// TLS 服务端握手入口。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 在 TCP 层接受连接后执行握手并生成 [`TlsChannel`]；
/// - 通过 [`ArcSwap`] 支持运行中原子替换 [`ServerConfig`]，满足证书
///   轮换需求而不中断既有连接。
///
/// ## 逻辑（How）
/// 1. 从 PEM 路径加载证书链与私钥并装配配置；任一失败即整体失败，
///    不存在以未配置状态继续监听的路径；
/// 2. `accept` 先拆解明文通道取得裸流，再在截止时间内驱动握手；
/// 3. 握手产物连同原地址元数据包装为 [`TlsChannel`]。
///
/// ## 契约（What）
/// - `from_pem_files`：材料加载失败返回安全类致命错误；
/// - `accept`：要求对传入通道的独占所有权；
/// - `replace_config` / `config_snapshot`：原子替换与快照读取。
///
/// ## 注意事项（Trade-offs）
/// - 配置替换只影响其后的握手；已建立的会话保持原配置直至关闭。
#[derive(Clone, Debug)]
pub struct TlsAcceptor {
    config: Arc<ArcSwap<ServerConfig>>,
}

impl TlsAcceptor {
    /// 从 PEM 证书链与私钥路径装配握手器。
    pub fn from_pem_files(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<Self, TransportError> {
        crate::ensure_crypto_provider();
        let config = material::load_server_config(cert_path.as_ref(), key_path.as_ref())
            .map_err(error::material_error)?;
        Ok(Self::with_config(Arc::new(config)))
    }

    /// 使用调用方装配好的服务端配置。
    pub fn with_config(config: Arc<ServerConfig>) -> Self {
        crate::ensure_crypto_provider();
        Self {
            config: Arc::new(ArcSwap::new(config)),
        }
    }

    /// 原子替换服务端配置，通常用于证书轮换。
    pub fn replace_config(&self, config: Arc<ServerConfig>) {
        self.config.store(config);
    }

    /// 获取当前配置的快照。
    pub fn config_snapshot(&self) -> Arc<ServerConfig> {
        self.config.load_full()
    }

    /// 对单个已接受的明文通道执行握手。
    pub async fn accept(
        &self,
        channel: TcpChannel,
        config: &SocketConfig,
    ) -> Result<TlsChannel, TransportError> {
        let parts = channel
            .try_into_parts()
            .map_err(|_| error::exclusive_channel_error())?;
        let acceptor = TokioTlsAcceptor::from(self.config.load_full());
        let closing = CloseFlag::new();
        let stream = run_io(
            error::HANDSHAKE,
            config.timeout(),
            &closing,
            acceptor.accept(parts.stream),
            map_io_error,
        )
        .await?;
        debug!(target: "tether::tls", peer = %parts.peer_addr, "server handshake complete");
        Ok(TlsChannel::ready(
            stream.into(),
            parts.local_addr,
            parts.peer_addr,
            config,
        ))
    }
}
