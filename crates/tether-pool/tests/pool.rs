//! 固定连接池的端到端契约测试：真实 TCP 监听器上的成员不变量、
//! 排他出借与逐出策略。

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tether_core::prelude::*;
use tether_pool::{ConnectionSource, DirectSource, FixedConnectionPool, PoolConfig, TcpConnector};
use tether_transport_tcp::TcpListener;

/// 计数监听器：持有已接受的连接，统计接受总数。
async fn spawn_server() -> (Endpoint, Arc<AtomicUsize>) {
    let listener = TcpListener::bind(&Endpoint::new("127.0.0.1", 0), &SocketConfig::new())
        .await
        .expect("bind counting listener");
    let endpoint = Endpoint::from(listener.local_addr());
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            match listener.accept().await {
                Ok(channel) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    held.push(channel);
                }
                // 接受超时后监听器依旧可用，继续等待。
                Err(_) => continue,
            }
        }
    });
    (endpoint, accepted)
}

fn pool_config(target: Endpoint) -> PoolConfig {
    PoolConfig::builder(target)
        .with_socket(
            SocketConfig::builder()
                .with_timeout(Duration::from_secs(5))
                .build(),
        )
        .with_acquire_timeout(Duration::from_secs(5))
        .build()
}

/// 归还后的空闲连接被复用，而不是开新连接。
#[tokio::test(flavor = "multi_thread")]
async fn released_connection_is_reused() {
    let (target, accepted) = spawn_server().await;
    let pool = FixedConnectionPool::new(TcpConnector, pool_config(target));

    let conn = pool.get().await.expect("first get");
    assert_eq!(pool.in_use_count(), 1);
    pool.release(conn).await;
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(pool.in_use_count(), 0);

    let conn = pool.get().await.expect("second get");
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(pool.in_use_count(), 1);
    assert_eq!(
        accepted.load(Ordering::SeqCst),
        1,
        "second get must reuse the idle connection instead of dialing"
    );
    pool.release(conn).await;
}

/// 成员不变量：任意取用/归还序列之后，空闲数加出借数不超过容量。
#[tokio::test(flavor = "multi_thread")]
async fn membership_never_exceeds_capacity() {
    let (target, _accepted) = spawn_server().await;
    let config = PoolConfig::builder(target)
        .with_capacity(2)
        .with_blocking(false)
        .with_acquire_timeout(Duration::from_secs(5))
        .build();
    let pool = FixedConnectionPool::new(TcpConnector, config);

    let first = pool.get().await.expect("first slot");
    let second = pool.get().await.expect("second slot");
    assert_eq!(pool.in_use_count() + pool.idle_count(), 2);

    let err = pool.get().await.expect_err("third get must fail fast");
    assert_eq!(err.kind(), ErrorKind::PoolExhausted);
    assert_eq!(err.category(), ErrorCategory::ResourceExhausted);
    assert_eq!(pool.in_use_count() + pool.idle_count(), 2);

    pool.release(first).await;
    pool.release(second).await;
    assert_eq!(pool.idle_count(), 2);
    assert_eq!(pool.in_use_count(), 0);
}

/// 容量 2、三个目标：被逐出的必须是最久空闲者，而非任意一个。
#[tokio::test(flavor = "multi_thread")]
async fn eviction_prefers_longest_idle() {
    let (target_a, accepted_a) = spawn_server().await;
    let (target_b, accepted_b) = spawn_server().await;
    let (target_c, accepted_c) = spawn_server().await;

    let config = PoolConfig::builder(target_a.clone())
        .with_capacity(2)
        .with_acquire_timeout(Duration::from_secs(5))
        .build();
    let pool = FixedConnectionPool::new(TcpConnector, config);

    // A 先归还，成为最久空闲者；B 随后归还。
    let conn_a = pool.get_to(&target_a).await.expect("open a");
    pool.release(conn_a).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    let conn_b = pool.get_to(&target_b).await.expect("open b");
    pool.release(conn_b).await;
    assert_eq!(pool.idle_count(), 2);

    // C 需要容量：A 被逐出，B 保留。
    let conn_c = pool.get_to(&target_c).await.expect("open c evicting a");
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(pool.in_use_count(), 1);
    pool.release(conn_c).await;

    // 再取 B：若 B 仍在池中则无须新建连接。
    let conn_b = pool.get_to(&target_b).await.expect("reuse b");
    assert_eq!(
        accepted_b.load(Ordering::SeqCst),
        1,
        "b must have survived the eviction"
    );
    pool.release(conn_b).await;

    // 再取 A：A 已被逐出，必然重新建连。
    let conn_a = pool.get_to(&target_a).await.expect("redial a");
    assert_eq!(
        accepted_a.load(Ordering::SeqCst),
        2,
        "a must have been the eviction victim"
    );
    pool.release(conn_a).await;

    assert_eq!(accepted_c.load(Ordering::SeqCst), 1);
}

/// 阻塞池：耗尽时挂起取用方，另一任务归还后立即放行。
#[tokio::test(flavor = "multi_thread")]
async fn blocking_get_resumes_on_release() {
    let (target, _accepted) = spawn_server().await;
    let config = PoolConfig::builder(target)
        .with_capacity(1)
        .with_blocking(true)
        .with_acquire_timeout(Duration::from_secs(5))
        .build();
    let pool = Arc::new(FixedConnectionPool::new(TcpConnector, config));

    let held = pool.get().await.expect("occupy the only slot");

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.get().await })
    };
    // 等待方此刻必须仍被挂起。
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!waiter.is_finished(), "waiter must block while exhausted");

    pool.release(held).await;
    let conn = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter must resume after release")
        .expect("waiter task must not panic")
        .expect("waiter get succeeds");
    pool.release(conn).await;
}

/// 排他出借：并发取用绝不会拿到同一条底层连接。
#[tokio::test(flavor = "multi_thread")]
async fn checkout_is_exclusive_under_concurrency() {
    let (target, _accepted) = spawn_server().await;
    let config = PoolConfig::builder(target)
        .with_capacity(4)
        .with_acquire_timeout(Duration::from_secs(10))
        .with_socket(
            SocketConfig::builder()
                .with_timeout(Duration::from_secs(5))
                .build(),
        )
        .build();
    let pool = Arc::new(FixedConnectionPool::new(TcpConnector, config));
    let live_ids = Arc::new(std::sync::Mutex::new(HashSet::<String>::new()));

    let mut workers = Vec::new();
    for _ in 0..16 {
        let pool = pool.clone();
        let live_ids = live_ids.clone();
        workers.push(tokio::spawn(async move {
            for _ in 0..8 {
                let conn = pool.get().await.expect("concurrent get");
                let id = conn.id().to_string();
                {
                    let mut live = live_ids.lock().expect("ids lock");
                    assert!(
                        live.insert(id.clone()),
                        "connection {id} was handed to two callers at once"
                    );
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
                {
                    let mut live = live_ids.lock().expect("ids lock");
                    live.remove(&id);
                }
                pool.release(conn).await;
            }
        }));
    }
    for worker in workers {
        worker.await.expect("worker must not panic");
    }
    assert!(pool.in_use_count() <= 4);
}

/// 弃置关闭连接并腾出容量，下一次取用重新建连。
#[tokio::test(flavor = "multi_thread")]
async fn discard_frees_the_slot() {
    let (target, accepted) = spawn_server().await;
    let config = PoolConfig::builder(target)
        .with_capacity(1)
        .with_acquire_timeout(Duration::from_secs(5))
        .build();
    let pool = FixedConnectionPool::new(TcpConnector, config);

    let conn = pool.get().await.expect("first get");
    pool.discard(conn).await;
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(pool.in_use_count(), 0);

    let conn = pool.get().await.expect("get after discard");
    assert_eq!(
        accepted.load(Ordering::SeqCst),
        2,
        "discard must not leave a reusable connection behind"
    );
    pool.release(conn).await;
}

/// 忘记归还：析构兜底回收槽位，池不会因此永久缩水。
#[tokio::test(flavor = "multi_thread")]
async fn dropped_connection_reclaims_its_slot() {
    let (target, _accepted) = spawn_server().await;
    let config = PoolConfig::builder(target)
        .with_capacity(1)
        .with_acquire_timeout(Duration::from_secs(5))
        .build();
    let pool = FixedConnectionPool::new(TcpConnector, config);

    let conn = pool.get().await.expect("occupy the only slot");
    drop(conn);
    assert_eq!(pool.in_use_count(), 0, "drop must reclaim the slot");

    let conn = pool.get().await.expect("slot must be usable again");
    pool.release(conn).await;
}

/// 直连源：每次取用都建新连接，归还即关闭。
#[tokio::test(flavor = "multi_thread")]
async fn direct_source_dials_per_request() {
    let (target, accepted) = spawn_server().await;
    let source = DirectSource::new(
        TcpConnector,
        target,
        SocketConfig::builder()
            .with_timeout(Duration::from_secs(5))
            .build(),
    );

    let first = source.get().await.expect("first direct get");
    let second = source.get().await.expect("second direct get");
    assert_eq!(
        accepted.load(Ordering::SeqCst),
        2,
        "a direct source must dial per request"
    );
    source.release(first).await;
    source.release(second).await;
}

/// 归还已死的连接不得回到空闲集。
#[tokio::test(flavor = "multi_thread")]
async fn dead_connection_is_not_pooled() {
    let (target, _accepted) = spawn_server().await;
    let pool = FixedConnectionPool::new(TcpConnector, pool_config(target));

    let conn = pool.get().await.expect("get");
    conn.close().await.expect("caller closes the transport");
    pool.release(conn).await;
    assert_eq!(
        pool.idle_count(),
        0,
        "a closed connection must not be offered for reuse"
    );
}
