use std::borrow::Cow;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tether_core::error::{ErrorKind, TransportError};
use tether_core::frame;
use tether_core::prelude::*;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::error;
use crate::source::{ConnectionSource, Connector};

/// 阻塞等待的切片长度：以有界轮询规避释放事件的唤醒竞争。
const WAIT_SLICE: Duration = Duration::from_millis(100);

struct IdleEntry {
    transport: Box<dyn Transport>,
    target: Endpoint,
    released_at: Instant,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<IdleEntry>,
    in_use: HashMap<u64, Endpoint>,
    next_slot: u64,
}

impl PoolState {
    /// 在锁内预留一个出借配额并返回其槽号。
    fn allocate_slot(&mut self, target: &Endpoint) -> u64 {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.in_use.insert(slot, target.clone());
        slot
    }

    fn total(&self) -> usize {
        self.idle.len() + self.in_use.len()
    }
}

pub(crate) struct PoolShared {
    state: StdMutex<PoolState>,
    released: Notify,
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// 从连接源取得的连接：对上满足 [`Transport`]，对下记着自己的槽位。
///
/// # 契约说明
/// - 用毕交还给来源（`release`/`discard`），而不是自行关闭；池化
///   连接的生命周期由池治理；
/// - 忘记归还时析构兜底：槽位被回收、句柄随析构释放，池以日志告警；
///   这是对调用方缺陷的防御，不是受支持的用法。
pub struct PooledConnection {
    transport: Option<Box<dyn Transport>>,
    slot: u64,
    target: Endpoint,
    shared: Option<Arc<PoolShared>>,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("slot", &self.slot)
            .field("target", &self.target)
            .field("pooled", &self.shared.is_some())
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    fn checked_out(
        transport: Box<dyn Transport>,
        slot: u64,
        target: Endpoint,
        shared: Arc<PoolShared>,
    ) -> Self {
        Self {
            transport: Some(transport),
            slot,
            target,
            shared: Some(shared),
        }
    }

    /// 不归属任何池的直连连接。
    pub(crate) fn detached(transport: Box<dyn Transport>, target: Endpoint) -> Self {
        Self {
            transport: Some(transport),
            slot: 0,
            target,
            shared: None,
        }
    }

    /// 该连接的目标端点。
    pub fn target(&self) -> &Endpoint {
        &self.target
    }

    pub(crate) async fn close_detached(mut self) {
        if let Some(transport) = self.transport.take() {
            let _ = transport.close().await;
        }
    }

    fn released_error() -> TransportError {
        TransportError::new(
            "tether.pool.connection_released",
            "connection already returned to its source",
        )
        .with_kind(ErrorKind::InvalidHandle)
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.transport.is_none() {
            return;
        }
        if let Some(shared) = &self.shared {
            let mut state = shared.lock();
            state.in_use.remove(&self.slot);
            drop(state);
            shared.released.notify_one();
            warn!(
                target: "tether::pool",
                endpoint = %self.target,
                "connection dropped without release; slot reclaimed"
            );
        }
        // 句柄随 transport 的析构释放。
    }
}

#[async_trait]
impl Transport for PooledConnection {
    fn id(&self) -> Cow<'_, str> {
        match &self.transport {
            Some(transport) => transport.id(),
            None => Cow::Borrowed("pooled:<released>"),
        }
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.transport.as_ref().and_then(|t| t.peer_addr())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.as_ref().and_then(|t| t.local_addr())
    }

    fn is_closed(&self) -> bool {
        match &self.transport {
            Some(transport) => transport.is_closed(),
            None => true,
        }
    }

    fn set_nonblocking(&self, enabled: bool) {
        if let Some(transport) = &self.transport {
            transport.set_nonblocking(enabled);
        }
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match &self.transport {
            Some(transport) => transport.read(buf).await,
            None => Err(Self::released_error()),
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        match &self.transport {
            Some(transport) => transport.write(buf).await,
            None => Err(Self::released_error()),
        }
    }

    async fn has_data(&self) -> Result<bool, TransportError> {
        match &self.transport {
            Some(transport) => transport.has_data().await,
            None => Ok(false),
        }
    }

    async fn shutdown(&self, direction: ShutdownDirection) -> Result<(), TransportError> {
        match &self.transport {
            Some(transport) => transport.shutdown(direction).await,
            None => Err(Self::released_error()),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        match &self.transport {
            Some(transport) => transport.close().await,
            None => Ok(()),
        }
    }
}

enum Plan {
    Reuse { transport: Box<dyn Transport>, slot: u64 },
    Open { slot: u64 },
    Evict { victim: Box<dyn Transport>, slot: u64 },
    Wait,
}

/// 固定容量连接池。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 在重复请求间复用连接，把建连（乃至握手）成本摊薄；
/// - 容量有上限，负载尖峰不会演化为无界的句柄消耗。
///
/// ## 逻辑（How）
/// 取用按序尝试四条路径，全部成员迁移在同一把锁内完成：
/// 1. 命中同目标的空闲连接则直接复用（O(容量) 线性扫描）；
/// 2. 总量未达上限则在锁内预留配额，锁外开新连接；开连失败退还
///    配额并唤醒等待者；
/// 3. 已达上限但存在空闲连接时，逐出最久空闲者并在其位置开新连接；
/// 4. 全部出借时，阻塞池在取得截止内等待释放事件，非阻塞池立即以
///    池耗尽返回。
/// 空闲超时项在每次取用路径上顺带清扫，关闭动作一律发生在锁外。
///
/// ## 契约（What）
/// - `空闲数 + 出借数 ≤ 容量` 恒成立；
/// - 出借排他：两个并发取用绝不会拿到同一条连接；
/// - 归还的死连接（已关闭）不回空闲集，容量随之腾出。
///
/// ## 注意事项（Trade-offs）
/// - 等待路径以 100ms 切片轮询释放事件，最坏情况下多一个切片的
///   唤醒延迟，换取无锁等待队列的实现简单；
/// - 槽号单调递增，不复用；u64 的寿命远超任何现实进程。
pub struct FixedConnectionPool {
    shared: Arc<PoolShared>,
    connector: Arc<dyn Connector>,
    config: PoolConfig,
}

impl FixedConnectionPool {
    /// 以开连器与配置构造连接池。
    pub fn new(connector: impl Connector + 'static, config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                state: StdMutex::new(PoolState::default()),
                released: Notify::new(),
            }),
            connector: Arc::new(connector),
            config,
        }
    }

    /// 当前空闲连接数（诊断用）。
    pub fn idle_count(&self) -> usize {
        self.shared.lock().idle.len()
    }

    /// 当前出借连接数（诊断用）。
    pub fn in_use_count(&self) -> usize {
        self.shared.lock().in_use.len()
    }

    /// 取得一条到目标端点的连接。
    pub async fn acquire(&self, target: &Endpoint) -> Result<PooledConnection, TransportError> {
        let capacity = self.config.capacity();
        let deadline = Instant::now() + self.config.acquire_timeout();
        loop {
            let mut swept: Vec<Box<dyn Transport>> = Vec::new();
            let plan = {
                let mut state = self.shared.lock();
                sweep_expired(
                    &mut state,
                    self.config.idle_timeout(),
                    Instant::now(),
                    &mut swept,
                );
                if let Some(pos) = state.idle.iter().position(|entry| &entry.target == target) {
                    let entry = state.idle.remove(pos);
                    let slot = state.allocate_slot(target);
                    Plan::Reuse {
                        transport: entry.transport,
                        slot,
                    }
                } else if state.total() < capacity {
                    Plan::Open {
                        slot: state.allocate_slot(target),
                    }
                } else if !state.idle.is_empty() {
                    let mut oldest = 0;
                    for (index, entry) in state.idle.iter().enumerate() {
                        if entry.released_at < state.idle[oldest].released_at {
                            oldest = index;
                        }
                    }
                    let victim = state.idle.remove(oldest);
                    let slot = state.allocate_slot(target);
                    Plan::Evict {
                        victim: victim.transport,
                        slot,
                    }
                } else {
                    Plan::Wait
                }
            };

            for transport in swept {
                let _ = transport.close().await;
            }

            match plan {
                Plan::Reuse { transport, slot } => {
                    debug!(target: "tether::pool", endpoint = %target, "idle connection reused");
                    return Ok(PooledConnection::checked_out(
                        transport,
                        slot,
                        target.clone(),
                        self.shared.clone(),
                    ));
                }
                Plan::Open { slot } => return self.open_slot(slot, target).await,
                Plan::Evict { victim, slot } => {
                    let _ = victim.close().await;
                    debug!(target: "tether::pool", endpoint = %target, "longest-idle connection evicted");
                    return self.open_slot(slot, target).await;
                }
                Plan::Wait => {
                    if !self.config.blocking() {
                        return Err(error::exhausted(capacity));
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(error::acquire_timed_out(capacity));
                    }
                    let slice = WAIT_SLICE.min(deadline - now);
                    let _ = tokio::time::timeout(slice, self.shared.released.notified()).await;
                }
            }
        }
    }

    async fn open_slot(
        &self,
        slot: u64,
        target: &Endpoint,
    ) -> Result<PooledConnection, TransportError> {
        match self.connector.open(target, self.config.socket()).await {
            Ok(transport) => {
                debug!(target: "tether::pool", endpoint = %target, "new connection opened");
                Ok(PooledConnection::checked_out(
                    transport,
                    slot,
                    target.clone(),
                    self.shared.clone(),
                ))
            }
            Err(err) => {
                {
                    let mut state = self.shared.lock();
                    state.in_use.remove(&slot);
                }
                self.shared.released.notify_one();
                Err(err.with_frame(frame!("pool acquire")))
            }
        }
    }
}

#[async_trait]
impl ConnectionSource for FixedConnectionPool {
    async fn get(&self) -> Result<PooledConnection, TransportError> {
        let target = self.config.target().clone();
        self.acquire(&target).await
    }

    async fn get_host(&self, host: &str) -> Result<PooledConnection, TransportError> {
        self.acquire(&Endpoint::new(host, self.config.target().port()))
            .await
    }

    async fn get_to(&self, endpoint: &Endpoint) -> Result<PooledConnection, TransportError> {
        self.acquire(endpoint).await
    }

    async fn release(&self, mut conn: PooledConnection) {
        let Some(transport) = conn.transport.take() else {
            return;
        };
        let slot = conn.slot;
        let target = conn.target.clone();
        let mut to_close: Option<Box<dyn Transport>> = None;
        {
            let mut state = self.shared.lock();
            let known = state.in_use.remove(&slot).is_some();
            if known && !transport.is_closed() {
                state.idle.push(IdleEntry {
                    transport,
                    target,
                    released_at: Instant::now(),
                });
            } else {
                to_close = Some(transport);
            }
        }
        self.shared.released.notify_one();
        if let Some(transport) = to_close {
            // 死连接或陌生连接不回池，直接关闭。
            let _ = transport.close().await;
        }
    }

    async fn discard(&self, mut conn: PooledConnection) {
        let Some(transport) = conn.transport.take() else {
            return;
        };
        {
            let mut state = self.shared.lock();
            state.in_use.remove(&conn.slot);
        }
        self.shared.released.notify_one();
        let _ = transport.close().await;
        debug!(target: "tether::pool", endpoint = %conn.target, "connection discarded");
    }
}

/// 清扫空闲超时项；被清扫的传输交由调用方在锁外关闭。
fn sweep_expired(
    state: &mut PoolState,
    idle_timeout: Duration,
    now: Instant,
    drained: &mut Vec<Box<dyn Transport>>,
) {
    let mut kept = Vec::with_capacity(state.idle.len());
    for entry in state.idle.drain(..) {
        if now.duration_since(entry.released_at) >= idle_timeout {
            drained.push(entry.transport);
        } else {
            kept.push(entry);
        }
    }
    state.idle = kept;
}
