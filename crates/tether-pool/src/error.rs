use tether_core::error::{ErrorKind, TransportError};

const EXHAUSTED_CODE: &str = "tether.pool.exhausted";
const ACQUIRE_TIMEOUT_CODE: &str = "tether.pool.acquire_timed_out";

/// 非阻塞池耗尽：负载下的预期可恢复条件，以普通结果返回。
pub(crate) fn exhausted(capacity: usize) -> TransportError {
    TransportError::new(
        EXHAUSTED_CODE,
        format!("all {capacity} slots are checked out"),
    )
    .with_kind(ErrorKind::PoolExhausted)
}

/// 阻塞池等待释放直至取得截止仍未果。
pub(crate) fn acquire_timed_out(capacity: usize) -> TransportError {
    TransportError::new(
        ACQUIRE_TIMEOUT_CODE,
        format!("no slot released within the acquire deadline (capacity {capacity})"),
    )
    .with_kind(ErrorKind::Timeout)
}
