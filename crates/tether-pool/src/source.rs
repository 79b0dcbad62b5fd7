use async_trait::async_trait;
use tether_core::error::TransportError;
use tether_core::frame;
use tether_core::prelude::*;
use tether_transport_tcp::TcpChannel;

use crate::pool::PooledConnection;

/// 开连能力：把“建立一条到端点的可用传输”抽象为可替换的策略。
///
/// 池本身不关心传输介质；明文、加密或任何满足 [`Transport`] 的实现
/// 都可以通过各自的开连器接入。
#[async_trait]
pub trait Connector: Send + Sync {
    /// 建立一条到端点的可用传输。
    async fn open(
        &self,
        endpoint: &Endpoint,
        config: &SocketConfig,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// 明文 TCP 开连器。
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn open(
        &self,
        endpoint: &Endpoint,
        config: &SocketConfig,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let channel = TcpChannel::connect(endpoint, config)
            .await
            .map_err(|err| err.with_frame(frame!("pool open")))?;
        Ok(Box::new(channel))
    }
}

/// 取得可用客户端连接的能力契约。
///
/// # 契约说明
/// - `get`：面向实现配置的默认目标；
/// - `get_host`：覆盖主机、沿用默认端口；
/// - `get_to`：完全显式的目标；
/// - 调用方用毕必须 `release` 归还（而非自行关闭），观察到致命传输
///   错误时改用 `discard`。
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    /// 取得一条到默认目标的连接。
    async fn get(&self) -> Result<PooledConnection, TransportError>;

    /// 取得一条到 `host` 与默认端口的连接。
    async fn get_host(&self, host: &str) -> Result<PooledConnection, TransportError>;

    /// 取得一条到显式端点的连接。
    async fn get_to(&self, endpoint: &Endpoint) -> Result<PooledConnection, TransportError>;

    /// 归还连接；健康的连接转入空闲集供后续复用。
    async fn release(&self, conn: PooledConnection);

    /// 关闭并弃置连接，腾出其占用的容量。
    async fn discard(&self, conn: PooledConnection);
}

/// 直连实现：每次取用都开新连接，归还即关闭。
///
/// 服务于不值得池化的低频场景，让上层无须为“池化与否”分支。
#[derive(Debug)]
pub struct DirectSource<C: Connector> {
    connector: C,
    target: Endpoint,
    socket: SocketConfig,
}

impl<C: Connector> DirectSource<C> {
    /// 以开连器、默认目标与套接字配置构造直连源。
    pub fn new(connector: C, target: Endpoint, socket: SocketConfig) -> Self {
        Self {
            connector,
            target,
            socket,
        }
    }
}

#[async_trait]
impl<C: Connector> ConnectionSource for DirectSource<C> {
    async fn get(&self) -> Result<PooledConnection, TransportError> {
        let target = self.target.clone();
        self.get_to(&target).await
    }

    async fn get_host(&self, host: &str) -> Result<PooledConnection, TransportError> {
        self.get_to(&Endpoint::new(host, self.target.port())).await
    }

    async fn get_to(&self, endpoint: &Endpoint) -> Result<PooledConnection, TransportError> {
        let transport = self.connector.open(endpoint, &self.socket).await?;
        Ok(PooledConnection::detached(transport, endpoint.clone()))
    }

    async fn release(&self, conn: PooledConnection) {
        conn.close_detached().await;
    }

    async fn discard(&self, conn: PooledConnection) {
        conn.close_detached().await;
    }
}
