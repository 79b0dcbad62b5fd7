use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tether_core::error::TransportError;

use crate::error::{self, OperationKind};

const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// 进程内共享的关闭信号。
///
/// 设计为可被任意任务置位的单向标志：一旦置位便不可复原，等待方以
/// 固定间隔轮询，保证阻塞中的 IO 在一个间隔内察觉关闭。
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

    /// 置位并返回先前的值，便于调用方实现幂等关闭。
    pub(crate) fn set(&self) -> bool {
        self.flag.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// 挂起直到标志被置位。
    pub(crate) async fn wait(&self) {
        while !self.is_set() {
            tokio::time::sleep(CLOSE_POLL_INTERVAL).await;
        }
    }
}

/// 在保留截止时间与关闭语义的前提下执行 IO Future。
///
/// # 契约说明
/// - 关闭信号已置位时立即以句柄失效错误返回，不触碰 IO；
/// - 截止时间先到返回超时错误；关闭信号先到返回取消错误并丢弃
///   未完成的 IO Future（Tokio 套接字操作对此是取消安全的）；
/// - IO 正常完成时，失败值经由 [`error::map_io_error`] 映射。
pub(crate) async fn run_io<F, T>(
    op: OperationKind,
    timeout: Duration,
    closed: &CloseFlag,
    future: F,
) -> Result<T, TransportError>
where
    F: Future<Output = io::Result<T>>,
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
        result = &mut future => result.map_err(|err| error::map_io_error(op, err)),
    }
}
