use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

/// 对象安全的底层原因类型。
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// `TransportError` 是传输层所有可观察错误的最终形态。
///
/// # 教案级注释
///
/// ## 设计背景（Why）
/// - 套接字失败横跨解析、建连、握手、读写与池化多个阶段，各阶段需要
///   合流为统一的错误码与种类，日志与自动化治理才能精确分流；
/// - 瞬态条件（would-block、池耗尽）是高负载下的常态，必须以普通
///   返回值表达并可被调用方廉价识别，而非作为硬失败抛出。
///
/// ## 契约说明（What）
/// - `code`：稳定的 `'static` 字符串，遵循 `<域>.<语义>` 命名约定；
/// - `message`：面向排障人员的可读描述，由固定的 OS 错误查表文案与
///   操作名组合而成，不包含敏感信息；
/// - `kind`：[`ErrorKind`] 错误种类，驱动“重试还是弃用连接”的决策；
/// - `category`：[`ErrorCategory`] 处置分类，未显式设置时按种类推导；
/// - `frames`：错误向上传播途中累积的 `{file, line, message}` 帧链，
///   顶层处理器无需重新抛出即可还原完整因果路径；
/// - `cause`：可选的底层原因，保留原始错误供 `source()` 链式访问。
///
/// ## 执行逻辑（How）
/// - 以 Builder 风格方法（`with_kind`/`with_category`/`with_cause`/
///   `with_frame`）叠加上下文，构造后除显式调用外不会追加信息；
/// - [`category()`](Self::category) 优先返回显式分类，否则根据种类
///   查默认矩阵，未知种类回退为不可重试。
///
/// ## 风险与权衡（Trade-offs）
/// - 帧链使用 `Vec` 存储，深层传播会产生少量堆分配；换来的是顶层
///   日志一次性输出完整路径，省去跨层反复包装的样板。
#[derive(Debug)]
pub struct TransportError {
    code: &'static str,
    message: Cow<'static, str>,
    kind: ErrorKind,
    category: Option<ErrorCategory>,
    cause: Option<BoxError>,
    frames: Vec<ErrorFrame>,
}

impl TransportError {
    /// 构造传输错误，种类默认为 [`ErrorKind::Other`]。
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            kind: ErrorKind::Other,
            category: None,
            cause: None,
            frames: Vec::new(),
        }
    }

    /// 标记错误种类。
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// 显式覆盖处置分类。
    ///
    /// # 契约说明
    /// - 应与错误种类语义一致，避免把致命错误标记为可重试；
    /// - 未调用时由 [`category()`](Self::category) 按种类推导。
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// 附带底层原因。
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// 在帧链末尾追加一帧传播位置。
    ///
    /// 通常经由 [`frame!`](crate::frame) 宏在 `?` 传播点调用：
    ///
    /// ```rust
    /// use tether_core::{TransportError, frame};
    /// use tether_core::error::codes;
    ///
    /// let err = TransportError::new(codes::RESOLVE_FAILED, "no address records")
    ///     .with_frame(frame!("resolving pool target"));
    /// assert_eq!(err.frames().len(), 1);
    /// ```
    pub fn with_frame(mut self, frame: ErrorFrame) -> Self {
        self.frames.push(frame);
        self
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取可读描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 获取错误种类。
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取处置分类；未显式设置时按种类推导默认值。
    pub fn category(&self) -> ErrorCategory {
        self.category
            .clone()
            .unwrap_or_else(|| self.kind.default_category())
    }

    /// 该错误是否为瞬态条件，调用方可在原地重试。
    pub fn is_transient(&self) -> bool {
        matches!(self.category(), ErrorCategory::Retryable(_))
    }

    /// 获取底层原因。
    pub fn cause(&self) -> Option<&BoxError> {
        self.cause.as_ref()
    }

    /// 获取传播帧链，顺序为“由深到浅”。
    pub fn frames(&self) -> &[ErrorFrame] {
        &self.frames
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        for frame in &self.frames {
            write!(f, "\n    at {}:{} ({})", frame.file, frame.line, frame.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// 错误种类，回答“这类失败应当如何处置”。
///
/// # 设计动机（Why）
/// - 调用方关心的是“重试、弃用连接还是终止构造”，而非具体 errno；
///   种类把这一判定从字符串解析中解放出来。
///
/// # 契约说明（What）
/// - 瞬态种类（`WouldBlock`、`PoolExhausted`）由最近的调用方捕获重试；
/// - 致命种类（`PeerReset`、`BrokenPipe`、`Bind`、`Handshake`、
///   `InvalidHandle`）必须传播到能够重建连接的层次，不得静默吞掉。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 主机名无法解析到任何地址。
    Resolution,
    /// 端口绑定失败（占用、权限不足）。
    Bind,
    /// 建连失败或被拒绝。
    Connect,
    /// 非阻塞操作暂时无法推进。
    WouldBlock,
    /// 对端重置了连接。
    PeerReset,
    /// 对端有序关闭，不再有数据可读。
    PeerClosed,
    /// 写入已关闭的管道。
    BrokenPipe,
    /// TLS 握手失败或证书材料非法。
    Handshake,
    /// 连接池满且无空闲项可用。
    PoolExhausted,
    /// 句柄已失效（套接字已关闭）。
    InvalidHandle,
    /// 配置的截止时间先于操作完成到达。
    Timeout,
    /// 操作被并发的关闭动作中断。
    Cancelled,
    /// 未归类的其他失败。
    Other,
}

impl ErrorKind {
    /// 按种类推导默认处置分类。
    pub fn default_category(self) -> ErrorCategory {
        match self {
            ErrorKind::WouldBlock => {
                ErrorCategory::Retryable(RetryAdvice::after(Duration::from_millis(5)))
            }
            ErrorKind::PoolExhausted => ErrorCategory::ResourceExhausted,
            ErrorKind::Timeout => ErrorCategory::Timeout,
            ErrorKind::Cancelled => ErrorCategory::Cancelled,
            ErrorKind::Handshake => ErrorCategory::Security,
            ErrorKind::Resolution
            | ErrorKind::Bind
            | ErrorKind::Connect
            | ErrorKind::PeerReset
            | ErrorKind::PeerClosed
            | ErrorKind::BrokenPipe
            | ErrorKind::InvalidHandle
            | ErrorKind::Other => ErrorCategory::NonRetryable,
        }
    }
}

/// 结构化处置分类，驱动自动化容错策略。
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// 可在建议的退避之后原地重试。
    Retryable(RetryAdvice),
    /// 不可重试，连接应被弃用或操作应被放弃。
    NonRetryable,
    /// 截止时间已到。
    Timeout,
    /// 操作被取消或被关闭动作打断。
    Cancelled,
    /// 安全相关失败，禁止降级继续。
    Security,
    /// 有界资源耗尽，属于负载下的预期可恢复条件。
    ResourceExhausted,
}

/// 重试建议，附带推荐的退避时长。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryAdvice {
    after: Duration,
}

impl RetryAdvice {
    /// 建议在给定时长之后重试。
    pub fn after(after: Duration) -> Self {
        Self { after }
    }

    /// 推荐的退避时长。
    pub fn delay(&self) -> Duration {
        self.after
    }
}

/// 错误传播链上的一帧：记录传播位置与该层补充的语境。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorFrame {
    /// 源文件路径，由 `file!()` 生成。
    pub file: &'static str,
    /// 行号，由 `line!()` 生成。
    pub line: u32,
    /// 该层补充的语境描述。
    pub message: Cow<'static, str>,
}

impl ErrorFrame {
    /// 构造一帧传播记录。
    pub fn new(file: &'static str, line: u32, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            file,
            line,
            message: message.into(),
        }
    }
}

/// 在当前源码位置构造一帧 [`ErrorFrame`]。
#[macro_export]
macro_rules! frame {
    ($msg:expr) => {
        $crate::error::ErrorFrame::new(file!(), line!(), $msg)
    };
}

/// `tether-core` 自身使用的稳定错误码。
///
/// 各传输 crate 在本地 `error` 模块中定义自己的 `<域>.<语义>` 码值，
/// 此处仅收录跨 crate 共享的条目。
pub mod codes {
    /// 主机名解析失败。
    pub const RESOLVE_FAILED: &str = "tether.core.resolve_failed";
    /// 端点字面量解析失败。
    pub const ENDPOINT_PARSE_FAILED: &str = "tether.core.endpoint_parse_failed";
}

/// 将 `io::ErrorKind` 映射为固定的人类可读文案。
///
/// # 契约说明
/// - 查表结果是稳定的静态文案，适合直接拼接进错误消息；
/// - 未收录的种类回退为 `"io error"`，提醒后续补充表项。
pub fn describe_io_kind(kind: std::io::ErrorKind) -> &'static str {
    use std::io::ErrorKind as K;
    match kind {
        K::AddrInUse => "address already in use",
        K::AddrNotAvailable => "address not available",
        K::BrokenPipe => "broken pipe",
        K::ConnectionAborted => "connection aborted",
        K::ConnectionRefused => "connection refused",
        K::ConnectionReset => "connection reset by peer",
        K::Interrupted => "interrupted by signal",
        K::InvalidInput => "invalid argument",
        K::NotConnected => "socket not connected",
        K::PermissionDenied => "permission denied",
        K::TimedOut => "operation timed out",
        K::UnexpectedEof => "unexpected end of stream",
        K::WouldBlock => "operation would block",
        K::WriteZero => "write returned zero bytes",
        _ => "io error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 未显式分类时应按种类推导默认处置。
    #[test]
    fn category_defaults_follow_kind() {
        let err = TransportError::new("tether.test.would_block", "try again")
            .with_kind(ErrorKind::WouldBlock);
        assert!(err.is_transient());

        let err = TransportError::new("tether.test.reset", "gone")
            .with_kind(ErrorKind::PeerReset);
        assert_eq!(err.category(), ErrorCategory::NonRetryable);
        assert!(!err.is_transient());
    }

    /// 显式分类覆盖默认推导。
    #[test]
    fn explicit_category_wins() {
        let err = TransportError::new("tether.test.custom", "custom")
            .with_kind(ErrorKind::PeerReset)
            .with_category(ErrorCategory::Retryable(RetryAdvice::after(
                Duration::from_millis(50),
            )));
        assert!(err.is_transient());
    }

    /// 帧链按追加顺序保留，Display 输出包含传播位置。
    #[test]
    fn frames_accumulate_in_order() {
        let err = TransportError::new(codes::RESOLVE_FAILED, "no records")
            .with_frame(frame!("resolving target"))
            .with_frame(frame!("opening pool slot"));
        assert_eq!(err.frames().len(), 2);
        assert_eq!(err.frames()[0].message, "resolving target");
        let rendered = err.to_string();
        assert!(rendered.contains("no records"));
        assert!(rendered.contains("opening pool slot"));
    }

    /// 底层原因通过 `source()` 链式可见。
    #[test]
    fn cause_is_exposed_via_source() {
        use std::error::Error as _;
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "rst");
        let err = TransportError::new("tether.test.reset", "reset")
            .with_kind(ErrorKind::PeerReset)
            .with_cause(io);
        assert!(err.source().is_some());
    }

    /// 查表文案对常见 errno 稳定可读。
    #[test]
    fn io_kind_table_is_stable() {
        assert_eq!(
            describe_io_kind(std::io::ErrorKind::ConnectionReset),
            "connection reset by peer"
        );
        assert_eq!(
            describe_io_kind(std::io::ErrorKind::WouldBlock),
            "operation would block"
        );
    }
}
