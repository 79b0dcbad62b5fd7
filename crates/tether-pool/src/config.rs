use std::time::Duration;

use tether_core::prelude::*;

/// 连接池配置：目标端点、容量与等待策略的一次性声明。
///
/// # 契约说明
/// - `target`：`get` 的默认目标；`get_host`/`get_to` 可按调用覆盖；
/// - `capacity`：空闲与出借连接的总量上限，默认 16；
/// - `blocking`：耗尽时挂起调用方（默认）还是立即以池耗尽返回；
///   这是池级配置，不随单次调用切换；
/// - `acquire_timeout`：阻塞取用的等待上限，默认与套接字截止一致
///   （60 秒）；
/// - `idle_timeout`：空闲连接的保留时长，默认 60 秒，超时项在取用
///   路径上顺带清扫；
/// - `socket`：开新连接时使用的套接字配置。
#[derive(Clone, Debug)]
pub struct PoolConfig {
    target: Endpoint,
    capacity: usize,
    blocking: bool,
    acquire_timeout: Duration,
    idle_timeout: Duration,
    socket: SocketConfig,
}

impl PoolConfig {
    /// 以默认值与给定目标构建配置。
    pub fn new(target: Endpoint) -> Self {
        Self::builder(target).build()
    }

    /// 进入 Builder 以覆盖个别字段。
    pub fn builder(target: Endpoint) -> PoolConfigBuilder {
        PoolConfigBuilder::new(target)
    }

    /// 默认目标端点。
    pub fn target(&self) -> &Endpoint {
        &self.target
    }

    /// 容量上限。
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 耗尽时是否阻塞调用方。
    pub fn blocking(&self) -> bool {
        self.blocking
    }

    /// 阻塞取用的等待上限。
    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    /// 空闲连接的保留时长。
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// 开新连接时使用的套接字配置。
    pub fn socket(&self) -> &SocketConfig {
        &self.socket
    }
}

/// [`PoolConfig`] 的逐步建造器。
#[derive(Clone, Debug)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// 以文档化的默认值起步。
    pub fn new(target: Endpoint) -> Self {
        Self {
            config: PoolConfig {
                target,
                capacity: 16,
                blocking: true,
                acquire_timeout: Duration::from_millis(60_000),
                idle_timeout: Duration::from_millis(60_000),
                socket: SocketConfig::new(),
            },
        }
    }

    /// 覆盖容量上限；容量至少为 1。
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity.max(1);
        self
    }

    /// 切换耗尽时的等待策略。
    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.config.blocking = blocking;
        self
    }

    /// 覆盖阻塞取用的等待上限。
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquire_timeout = timeout;
        self
    }

    /// 覆盖空闲连接的保留时长。
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// 覆盖开新连接时的套接字配置。
    pub fn with_socket(mut self, socket: SocketConfig) -> Self {
        self.config.socket = socket;
        self
    }

    /// 产出不可变配置。
    pub fn build(self) -> PoolConfig {
        self.config
    }
}
