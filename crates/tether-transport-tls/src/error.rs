use std::io;

use tether_core::error::{ErrorCategory, ErrorKind, TransportError, describe_io_kind};

use crate::material::MaterialError;

/// 描述一次底层操作对应的稳定错误码、默认文案与兜底种类。
#[derive(Clone, Copy)]
pub(crate) struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
    pub fallback: ErrorKind,
}

pub(crate) const HANDSHAKE: OperationKind = OperationKind {
    code: "tether.transport.tls.handshake_failed",
    message: "tls handshake",
    fallback: ErrorKind::Handshake,
};
pub(crate) const READ: OperationKind = OperationKind {
    code: "tether.transport.tls.read_failed",
    message: "tls read",
    fallback: ErrorKind::Other,
};
pub(crate) const WRITE: OperationKind = OperationKind {
    code: "tether.transport.tls.write_failed",
    message: "tls write",
    fallback: ErrorKind::Other,
};
pub(crate) const SHUTDOWN: OperationKind = OperationKind {
    code: "tether.transport.tls.shutdown_failed",
    message: "tls shutdown",
    fallback: ErrorKind::Other,
};
pub(crate) const PROBE: OperationKind = OperationKind {
    code: "tether.transport.tls.probe_failed",
    message: "tls probe",
    fallback: ErrorKind::Other,
};

const TIMEOUT_CODE: &str = "tether.transport.tls.timeout";
const CLOSED_CODE: &str = "tether.transport.tls.closed";
const WOULD_BLOCK_CODE: &str = "tether.transport.tls.would_block";
const PEER_CLOSED_CODE: &str = "tether.transport.tls.peer_closed";
const INVALID_HANDLE_CODE: &str = "tether.transport.tls.invalid_handle";
const MATERIAL_CODE: &str = "tether.transport.tls.material_rejected";
const SHARED_CODE: &str = "tether.transport.tls.channel_shared";
const NAME_CODE: &str = "tether.transport.tls.server_name_invalid";

/// 将 IO 错误映射为结构化 [`TransportError`]。
///
/// rustls 把握手与校验失败折叠进 `io::Error`，因此握手阶段的任何
/// 底层失败都保持 `Handshake` 兜底种类。
pub(crate) fn map_io_error(op: OperationKind, error: io::Error) -> TransportError {
    use io::ErrorKind as K;
    let kind = match error.kind() {
        K::WouldBlock | K::Interrupted => ErrorKind::WouldBlock,
        K::TimedOut => ErrorKind::Timeout,
        K::ConnectionReset | K::ConnectionAborted => ErrorKind::PeerReset,
        K::BrokenPipe => ErrorKind::BrokenPipe,
        K::NotConnected => ErrorKind::InvalidHandle,
        K::UnexpectedEof => ErrorKind::PeerClosed,
        _ => op.fallback,
    };
    TransportError::new(
        op.code,
        format!("{}: {}", op.message, describe_io_kind(error.kind())),
    )
    .with_kind(kind)
    .with_cause(error)
}

pub(crate) fn timeout_error(op: OperationKind) -> TransportError {
    TransportError::new(TIMEOUT_CODE, format!("{} timed out", op.message))
        .with_kind(ErrorKind::Timeout)
}

pub(crate) fn closed_error(op: OperationKind) -> TransportError {
    TransportError::new(
        CLOSED_CODE,
        format!("{} aborted by concurrent close", op.message),
    )
    .with_kind(ErrorKind::Cancelled)
}

pub(crate) fn would_block(op: OperationKind) -> TransportError {
    TransportError::new(WOULD_BLOCK_CODE, format!("{} would block", op.message))
        .with_kind(ErrorKind::WouldBlock)
}

pub(crate) fn peer_closed(op: OperationKind) -> TransportError {
    TransportError::new(
        PEER_CLOSED_CODE,
        format!("{}: peer closed the stream", op.message),
    )
    .with_kind(ErrorKind::PeerClosed)
}

pub(crate) fn invalid_handle(op: OperationKind) -> TransportError {
    TransportError::new(
        INVALID_HANDLE_CODE,
        format!("{} on a closed channel", op.message),
    )
    .with_kind(ErrorKind::InvalidHandle)
}

/// 证书或私钥材料不可用：致命的构造错误，禁止降级继续。
pub(crate) fn material_error(error: MaterialError) -> TransportError {
    TransportError::new(MATERIAL_CODE, error.to_string())
        .with_kind(ErrorKind::Handshake)
        .with_category(ErrorCategory::Security)
        .with_cause(error)
}

/// 通道仍被其他克隆持有，无法独占拆解出裸流。
pub(crate) fn exclusive_channel_error() -> TransportError {
    TransportError::new(
        SHARED_CODE,
        "tcp channel is shared; handshake needs exclusive ownership",
    )
    .with_kind(ErrorKind::Other)
}

/// SNI 名称非法。
pub(crate) fn server_name_error(name: &str) -> TransportError {
    TransportError::new(NAME_CODE, format!("invalid server name `{name}`"))
        .with_kind(ErrorKind::Handshake)
        .with_category(ErrorCategory::Security)
}
