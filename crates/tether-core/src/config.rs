use std::time::Duration;

/// 套接字配置：一次构建的不可变值，可为任意数量的套接字播种。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把分散的 `setsockopt` 开关收敛为一个显式默认值的值对象，避免在
///   每个建连点重复指定；
/// - 同一份配置同时服务监听端与建连端，保证两侧语义对齐。
///
/// ## 契约（What）
/// - `backlog`：监听队列上限，默认 32；
/// - `send_buffer_size` / `recv_buffer_size`：收发缓冲字节数，默认 4096；
/// - `keep_alive`：SO_KEEPALIVE，默认关闭；
/// - `linger`：关闭时等待待发数据的时长，`None` 表示关闭，默认关闭；
/// - `reuse_addr`：绑定完成后是否保留 SO_REUSEADDR，默认关闭（绑定
///   动作本身总是临时启用，见 TCP 监听器实现）；
/// - `timeout`：建连与阻塞读写的截止时长，默认 60 秒；
/// - `no_delay`：TCP_NODELAY，默认关闭；
/// - `blocking`：通道是否以阻塞语义执行读写，默认开启；监听端常用的
///   非阻塞预设见 [`SocketConfig::server_default`]。
///
/// ## 注意事项（Trade-offs）
/// - 缓冲大小只表达请求值，内核可能向上取整；读取方不应假设精确回读。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketConfig {
    backlog: u32,
    send_buffer_size: usize,
    recv_buffer_size: usize,
    keep_alive: bool,
    linger: Option<Duration>,
    reuse_addr: bool,
    timeout: Duration,
    no_delay: bool,
    blocking: bool,
}

impl SocketConfig {
    /// 以全部默认值构建配置。
    pub fn new() -> Self {
        SocketConfigBuilder::new().build()
    }

    /// 监听端预设：与默认值一致，但通道以非阻塞语义工作。
    pub fn server_default() -> Self {
        SocketConfigBuilder::new().with_blocking(false).build()
    }

    /// 进入 Builder 以覆盖个别字段。
    pub fn builder() -> SocketConfigBuilder {
        SocketConfigBuilder::new()
    }

    /// 监听队列上限。
    pub fn backlog(&self) -> u32 {
        self.backlog
    }

    /// 发送缓冲字节数。
    pub fn send_buffer_size(&self) -> usize {
        self.send_buffer_size
    }

    /// 接收缓冲字节数。
    pub fn recv_buffer_size(&self) -> usize {
        self.recv_buffer_size
    }

    /// 是否启用 SO_KEEPALIVE。
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// 关闭时的 linger 时长，`None` 表示关闭。
    pub fn linger(&self) -> Option<Duration> {
        self.linger
    }

    /// 绑定完成后是否保留地址复用。
    pub fn reuse_addr(&self) -> bool {
        self.reuse_addr
    }

    /// 建连与阻塞读写的截止时长。
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 是否禁用 Nagle 批量发送。
    pub fn no_delay(&self) -> bool {
        self.no_delay
    }

    /// 通道是否以阻塞语义执行读写。
    pub fn blocking(&self) -> bool {
        self.blocking
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// [`SocketConfig`] 的逐步建造器，默认值在 [`new`](Self::new) 中集中声明。
#[derive(Clone, Debug)]
pub struct SocketConfigBuilder {
    config: SocketConfig,
}

impl SocketConfigBuilder {
    /// 以文档化的默认值起步。
    pub fn new() -> Self {
        Self {
            config: SocketConfig {
                backlog: 32,
                send_buffer_size: 4096,
                recv_buffer_size: 4096,
                keep_alive: false,
                linger: None,
                reuse_addr: false,
                timeout: Duration::from_millis(60_000),
                no_delay: false,
                blocking: true,
            },
        }
    }

    /// 覆盖监听队列上限。
    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.config.backlog = backlog;
        self
    }

    /// 覆盖发送缓冲字节数。
    pub fn with_send_buffer_size(mut self, bytes: usize) -> Self {
        self.config.send_buffer_size = bytes;
        self
    }

    /// 覆盖接收缓冲字节数。
    pub fn with_recv_buffer_size(mut self, bytes: usize) -> Self {
        self.config.recv_buffer_size = bytes;
        self
    }

    /// 启用或关闭 SO_KEEPALIVE。
    pub fn with_keep_alive(mut self, enabled: bool) -> Self {
        self.config.keep_alive = enabled;
        self
    }

    /// 设置关闭时的 linger 时长；`None` 关闭该选项。
    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.config.linger = linger;
        self
    }

    /// 绑定完成后是否保留地址复用。
    pub fn with_reuse_addr(mut self, enabled: bool) -> Self {
        self.config.reuse_addr = enabled;
        self
    }

    /// 覆盖建连与阻塞读写的截止时长。
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// 启用或关闭 TCP_NODELAY。
    pub fn with_no_delay(mut self, enabled: bool) -> Self {
        self.config.no_delay = enabled;
        self
    }

    /// 切换阻塞/非阻塞读写语义。
    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.config.blocking = blocking;
        self
    }

    /// 产出不可变配置。
    pub fn build(self) -> SocketConfig {
        self.config
    }
}

impl Default for SocketConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 默认值必须与文档一致，后续调整需要同步改文档。
    #[test]
    fn documented_defaults_hold() {
        let config = SocketConfig::new();
        assert_eq!(config.backlog(), 32);
        assert_eq!(config.send_buffer_size(), 4096);
        assert_eq!(config.recv_buffer_size(), 4096);
        assert!(!config.keep_alive());
        assert_eq!(config.linger(), None);
        assert!(!config.reuse_addr());
        assert_eq!(config.timeout(), Duration::from_millis(60_000));
        assert!(!config.no_delay());
        assert!(config.blocking());
    }

    #[test]
    fn builder_overrides_single_fields() {
        let config = SocketConfig::builder()
            .with_backlog(16)
            .with_no_delay(true)
            .with_timeout(Duration::from_secs(5))
            .build();
        assert_eq!(config.backlog(), 16);
        assert!(config.no_delay());
        assert_eq!(config.timeout(), Duration::from_secs(5));
        // 未触碰的字段保持默认。
        assert_eq!(config.recv_buffer_size(), 4096);
    }

    #[test]
    fn server_default_is_nonblocking() {
        assert!(!SocketConfig::server_default().blocking());
    }
}
