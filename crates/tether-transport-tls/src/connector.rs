use std::path::Path;
use std::sync::Arc;

use rustls::ClientConfig;
use rustls_pki_types::ServerName;
use tether_core::error::TransportError;
use tether_core::frame;
use tether_core::prelude::*;
use tokio_rustls::TlsConnector as TokioTlsConnector;
use tracing::debug;

use crate::channel::TlsChannel;
use crate::error::{self, map_io_error};
use crate::material;
use crate::util::{CloseFlag, run_io};

/// TLS 客户端握手入口。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把信任根装配与握手驱动集中在一个可复用对象中，同一配置可以
///   发起任意数量的加密连接；
/// - 提供立即与惰性两条握手路径：前者在建连时完成协商，后者把裸流
///   托管给 [`TlsChannel`]，首次读写时补齐。
///
/// ## 契约（What）
/// - `from_ca_file`：信任根即文件内全部证书，任何解析失败都是致命
///   构造错误；
/// - `connect`：建连、握手一步到位；SNI 取目标端点的主机侧；
/// - `upgrade` / `upgrade_lazy`：装饰一条既有明文通道；要求对通道的
///   独占所有权，共享时以结构化错误拒绝。
///
/// ## 注意事项（Trade-offs）
/// - 不提供跳过证书校验的入口；测试场景应自建 CA 并走正常信任链。
#[derive(Clone, Debug)]
pub struct TlsConnector {
    config: Arc<ClientConfig>,
}

impl TlsConnector {
    /// 从 CA 文件装配信任根并构造连接器。
    pub fn from_ca_file(ca_path: impl AsRef<Path>) -> Result<Self, TransportError> {
        crate::ensure_crypto_provider();
        let config = material::load_client_config(ca_path.as_ref())
            .map_err(error::material_error)?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// 使用调用方装配好的客户端配置。
    pub fn with_config(config: Arc<ClientConfig>) -> Self {
        crate::ensure_crypto_provider();
        Self { config }
    }

    /// 建连并立即完成握手。
    pub async fn connect(
        &self,
        endpoint: &Endpoint,
        config: &SocketConfig,
    ) -> Result<TlsChannel, TransportError> {
        let channel = tether_transport_tcp::TcpChannel::connect(endpoint, config)
            .await
            .map_err(|err| err.with_frame(frame!("tls connect")))?;
        let host = sni_host(endpoint);
        self.upgrade(channel, &host, config).await
    }

    /// 装饰既有明文通道并立即完成握手。
    pub async fn upgrade(
        &self,
        channel: tether_transport_tcp::TcpChannel,
        server_name: &str,
        config: &SocketConfig,
    ) -> Result<TlsChannel, TransportError> {
        let (parts, name) = self.prepare(channel, server_name)?;
        let connector = TokioTlsConnector::from(self.config.clone());
        let closing = CloseFlag::new();
        let stream = run_io(
            error::HANDSHAKE,
            config.timeout(),
            &closing,
            connector.connect(name, parts.stream),
            map_io_error,
        )
        .await?;
        debug!(target: "tether::tls", peer = %parts.peer_addr, "client handshake complete");
        Ok(TlsChannel::ready(
            stream.into(),
            parts.local_addr,
            parts.peer_addr,
            config,
        ))
    }

    /// 装饰既有明文通道，握手推迟到首次读写。
    pub fn upgrade_lazy(
        &self,
        channel: tether_transport_tcp::TcpChannel,
        server_name: &str,
        config: &SocketConfig,
    ) -> Result<TlsChannel, TransportError> {
        let (parts, name) = self.prepare(channel, server_name)?;
        let connector = TokioTlsConnector::from(self.config.clone());
        Ok(TlsChannel::pending_client(
            parts.stream,
            connector,
            name,
            parts.local_addr,
            parts.peer_addr,
            config,
        ))
    }

    fn prepare(
        &self,
        channel: tether_transport_tcp::TcpChannel,
        server_name: &str,
    ) -> Result<(tether_transport_tcp::TcpChannelParts, ServerName<'static>), TransportError> {
        let parts = channel
            .try_into_parts()
            .map_err(|_| error::exclusive_channel_error())?;
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|_| error::server_name_error(server_name))?;
        Ok((parts, name))
    }
}

/// SNI 取端点主机侧的裸形式：域名原样，IP 不带方括号。
fn sni_host(endpoint: &Endpoint) -> String {
    match endpoint.host() {
        HostSpec::Ip(ip) => ip.to_string(),
        HostSpec::Name(name) => name.clone(),
    }
}

/// 为连接池提供开连能力：每次开连都是“建连 + 立即握手”。
#[cfg(feature = "pool")]
#[async_trait::async_trait]
impl tether_pool::Connector for TlsConnector {
    async fn open(
        &self,
        endpoint: &Endpoint,
        config: &SocketConfig,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let channel = self.connect(endpoint, config).await?;
        Ok(Box::new(channel))
    }
}
