use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tether_core::error::TransportError;

use crate::error::{self, OperationKind};

const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// 单向关闭信号；语义与 TCP 层一致，此处独立持有以保证本 crate
/// 不触碰底层实现细节。
#[derive(Debug, Default)]
pub(crate) struct CloseFlag {
    flag: AtomicBool,
}

impl CloseFlag {
    pub(crate) fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
        }
    }

    pub(crate) fn set(&self) -> bool {
        self.flag.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait(&self) {
        while !self.is_set() {
            tokio::time::sleep(CLOSE_POLL_INTERVAL).await;
        }
    }
}

/// 在保留截止时间与关闭语义的前提下执行 IO Future。
///
/// 与 TCP 层的同名工具相比多出 `map_error` 参数：rustls 把握手失败
/// 折叠进 `io::Error`，握手与读写需要各自的映射策略。
pub(crate) async fn run_io<F, T, M>(
    op: OperationKind,
    timeout: Duration,
    closed: &CloseFlag,
    future: F,
    map_error: M,
) -> Result<T, TransportError>
where
    F: Future<Output = io::Result<T>>,
    M: Fn(OperationKind, io::Error) -> TransportError,
{
    if closed.is_set() {
        return Err(error::invalid_handle(op));
    }

    let cancel = closed.wait();
    let sleep = tokio::time::sleep(timeout);
    tokio::pin!(cancel);
    tokio::pin!(sleep);
    tokio::pin!(future);

    tokio::select! {
        biased;
        _ = &mut cancel => Err(error::closed_error(op)),
        _ = &mut sleep => Err(error::timeout_error(op)),
        result = &mut future => result.map_err(|err| map_error(op, err)),
    }
}
