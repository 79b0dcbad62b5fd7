use std::io;

use tether_core::error::{ErrorKind, TransportError, describe_io_kind};

/// 描述一次底层操作对应的稳定错误码、默认文案与兜底种类。
#[derive(Clone, Copy)]
pub(crate) struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
    pub fallback: ErrorKind,
}

pub(crate) const RESOLVE: OperationKind = OperationKind {
    code: "tether.transport.tcp.resolve_failed",
    message: "tcp resolve",
    fallback: ErrorKind::Resolution,
};
pub(crate) const BIND: OperationKind = OperationKind {
    code: "tether.transport.tcp.bind_failed",
    message: "tcp bind",
    fallback: ErrorKind::Bind,
};
pub(crate) const ACCEPT: OperationKind = OperationKind {
    code: "tether.transport.tcp.accept_failed",
    message: "tcp accept",
    fallback: ErrorKind::Connect,
};
pub(crate) const CONNECT: OperationKind = OperationKind {
    code: "tether.transport.tcp.connect_failed",
    message: "tcp connect",
    fallback: ErrorKind::Connect,
};
pub(crate) const READ: OperationKind = OperationKind {
    code: "tether.transport.tcp.read_failed",
    message: "tcp read",
    fallback: ErrorKind::Other,
};
pub(crate) const WRITE: OperationKind = OperationKind {
    code: "tether.transport.tcp.write_failed",
    message: "tcp write",
    fallback: ErrorKind::Other,
};
pub(crate) const SHUTDOWN: OperationKind = OperationKind {
    code: "tether.transport.tcp.shutdown_failed",
    message: "tcp shutdown",
    fallback: ErrorKind::Other,
};
pub(crate) const CONFIGURE: OperationKind = OperationKind {
    code: "tether.transport.tcp.configure_failed",
    message: "tcp configure",
    fallback: ErrorKind::Other,
};
pub(crate) const PROBE: OperationKind = OperationKind {
    code: "tether.transport.tcp.probe_failed",
    message: "tcp probe",
    fallback: ErrorKind::Other,
};

const TIMEOUT_CODE: &str = "tether.transport.tcp.timeout";
const CLOSED_CODE: &str = "tether.transport.tcp.closed";
const WOULD_BLOCK_CODE: &str = "tether.transport.tcp.would_block";
const PEER_CLOSED_CODE: &str = "tether.transport.tcp.peer_closed";
const INVALID_HANDLE_CODE: &str = "tether.transport.tcp.invalid_handle";

/// 将 IO 错误映射为结构化 [`TransportError`]，并按 errno 归类错误种类。
pub(crate) fn map_io_error(op: OperationKind, error: io::Error) -> TransportError {
    let kind = classify_io_error(op, &error);
    TransportError::new(
        op.code,
        format!("{}: {}", op.message, describe_io_kind(error.kind())),
    )
    .with_kind(kind)
    .with_cause(error)
}

/// 构造截止时间错误。
pub(crate) fn timeout_error(op: OperationKind) -> TransportError {
    TransportError::new(TIMEOUT_CODE, format!("{} timed out", op.message))
        .with_kind(ErrorKind::Timeout)
}

/// 构造“操作被并发关闭打断”错误。
pub(crate) fn closed_error(op: OperationKind) -> TransportError {
    TransportError::new(
        CLOSED_CODE,
        format!("{} aborted by concurrent close", op.message),
    )
    .with_kind(ErrorKind::Cancelled)
}

/// 构造瞬态 would-block 错误。
pub(crate) fn would_block(op: OperationKind) -> TransportError {
    TransportError::new(
        WOULD_BLOCK_CODE,
        format!("{} would block", op.message),
    )
    .with_kind(ErrorKind::WouldBlock)
}

/// 构造对端有序关闭错误。
pub(crate) fn peer_closed(op: OperationKind) -> TransportError {
    TransportError::new(
        PEER_CLOSED_CODE,
        format!("{}: peer closed the stream", op.message),
    )
    .with_kind(ErrorKind::PeerClosed)
}

/// 构造句柄失效错误，用于已关闭通道上的任何操作。
pub(crate) fn invalid_handle(op: OperationKind) -> TransportError {
    TransportError::new(
        INVALID_HANDLE_CODE,
        format!("{} on a closed socket", op.message),
    )
    .with_kind(ErrorKind::InvalidHandle)
}

fn classify_io_error(op: OperationKind, error: &io::Error) -> ErrorKind {
    use io::ErrorKind as K;
    match error.kind() {
        K::WouldBlock | K::Interrupted => ErrorKind::WouldBlock,
        K::TimedOut => ErrorKind::Timeout,
        K::ConnectionReset | K::ConnectionAborted => ErrorKind::PeerReset,
        K::BrokenPipe => ErrorKind::BrokenPipe,
        K::NotConnected => ErrorKind::InvalidHandle,
        _ => op.fallback,
    }
}
