use bytes::BytesMut;
use tether_core::error::{ErrorKind, TransportError};
use tether_core::frame;
use tether_core::prelude::*;
use tracing::trace;

use crate::error::decode_error;

/// 每次补充读取的目标块长，与默认的套接字缓冲一致。
const FILL_CHUNK: usize = 4096;

/// 传输之上的行与定长缓冲适配层。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 按行对话的协议需要“读一行、写一段”的粒度，而传输层只提供
///   字节块；本类型把聚合逻辑集中在一处；
/// - 池化连接的生命周期属于连接池，流绝不能顺手关闭它；所有权由
///   构造入口显式声明，没有隐式引用计数。
///
/// ## 契约（What）
/// - [`owned`](Self::owned)：流关闭时连同传输一起关闭；
/// - [`leased`](Self::leased)：流关闭是空操作，传输经
///   [`into_inner`](Self::into_inner) 原样交还（通常是归还连接池）；
/// - `read_line`：`\r\n` 与 `\n` 等价，行尾的 `\r` 被剥除；对端在
///   新行开始前关闭返回 `Ok(None)`，行中关闭返回已到达的残行；
/// - `read_exact`：不足请求长度即对端关闭视为错误而非短读；
/// - `write_all`：内部循环直到全部写出，从不截断。
///
/// ## 注意事项（Trade-offs）
/// - 读缓冲无上限约束，超长行由上层协议自行设防；本层服务的协议
///   （邮件指令、SIP 头）行长天然有界。
#[derive(Debug)]
pub struct TransportStream<T: Transport> {
    inner: T,
    buffer: BytesMut,
    owns_transport: bool,
}

impl<T: Transport> TransportStream<T> {
    /// 拥有传输：流关闭时连同传输一起关闭。
    pub fn owned(inner: T) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
            owns_transport: true,
        }
    }

    /// 借用传输：流关闭是空操作，传输的生命周期由别处治理。
    pub fn leased(inner: T) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
            owns_transport: false,
        }
    }

    /// 底层传输的只读访问。
    pub fn transport(&self) -> &T {
        &self.inner
    }

    /// 流是否拥有底层传输。
    pub fn owns_transport(&self) -> bool {
        self.owns_transport
    }

    /// 拆出底层传输；内部缓冲中尚未消费的字节一并丢弃。
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// 读取一行：至 `\n` 为止，行尾 `\r` 剥除。
    pub async fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let mut frame = self.buffer.split_to(pos + 1);
                frame.truncate(pos);
                return decode_line(frame.to_vec()).map(Some);
            }
            match self.fill().await {
                Ok(_) => continue,
                Err(err) if err.kind() == ErrorKind::PeerClosed => {
                    if self.buffer.is_empty() {
                        return Ok(None);
                    }
                    // 对端在行中关闭：把已到达的残行交给调用方。
                    let frame = self.buffer.split_to(self.buffer.len());
                    return decode_line(frame.to_vec()).map(Some);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// 读取恰好 `len` 字节。
    pub async fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        while self.buffer.len() < len {
            self.fill()
                .await
                .map_err(|err| err.with_frame(frame!("exact-length read")))?;
        }
        Ok(self.buffer.split_to(len).to_vec())
    }

    /// 写出整个缓冲区，内部循环直到全部写出。
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        let mut offset = 0;
        while offset < buf.len() {
            let written = self.inner.write(&buf[offset..]).await?;
            offset += written;
        }
        Ok(())
    }

    /// 内部缓冲或底层传输中是否有数据可读。
    pub async fn has_data(&self) -> Result<bool, TransportError> {
        if !self.buffer.is_empty() {
            return Ok(true);
        }
        self.inner.has_data().await
    }

    /// 关闭流；仅当流拥有底层传输时才关闭它。
    pub async fn close(&mut self) -> Result<(), TransportError> {
        if self.owns_transport {
            self.inner.close().await?;
        } else {
            trace!(target: "tether::stream", "leased transport left open on stream close");
        }
        Ok(())
    }

    async fn fill(&mut self) -> Result<usize, TransportError> {
        let mut chunk = [0u8; FILL_CHUNK];
        let read = self.inner.read(&mut chunk).await?;
        self.buffer.extend_from_slice(&chunk[..read]);
        Ok(read)
    }
}

fn decode_line(mut raw: Vec<u8>) -> Result<String, TransportError> {
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
    String::from_utf8(raw).map_err(decode_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use std::collections::VecDeque;
    use std::net::SocketAddr;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use tether_core::transport::ShutdownDirection;

    /// 脚本化的内存传输：按预置块序列供数据，写入全部收集。
    ///
    /// # 教案说明
    /// - **Why**：行切分与所有权语义与具体介质无关，在内存传输上
    ///   验证可以精确控制块边界与对端关闭时机；
    /// - **How**：读取一次最多消费一个块，制造跨块的行；块耗尽即
    ///   模拟对端有序关闭；
    /// - **What**：满足 [`Transport`]，可直接交给被测流。
    #[derive(Default)]
    struct ScriptedTransport {
        chunks: StdMutex<VecDeque<Vec<u8>>>,
        written: StdMutex<Vec<u8>>,
        closed: AtomicBool,
    }

    impl ScriptedTransport {
        fn with_chunks(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: StdMutex::new(chunks.iter().map(|c| c.to_vec()).collect()),
                ..Self::default()
            }
        }

        fn written(&self) -> Vec<u8> {
            self.written.lock().expect("written lock").clone()
        }

        fn peer_closed_error() -> TransportError {
            TransportError::new("tether.stream.test.peer_closed", "scripted peer close")
                .with_kind(ErrorKind::PeerClosed)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn id(&self) -> Cow<'_, str> {
            Cow::Borrowed("scripted")
        }

        fn peer_addr(&self) -> Option<SocketAddr> {
            None
        }

        fn local_addr(&self) -> Option<SocketAddr> {
            None
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        fn set_nonblocking(&self, _enabled: bool) {}

        async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
            let mut chunks = self.chunks.lock().expect("chunks lock");
            let Some(mut chunk) = chunks.pop_front() else {
                return Err(Self::peer_closed_error());
            };
            let take = chunk.len().min(buf.len());
            buf[..take].copy_from_slice(&chunk[..take]);
            if take < chunk.len() {
                chunks.push_front(chunk.split_off(take));
            }
            Ok(take)
        }

        async fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
            self.written
                .lock()
                .expect("written lock")
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        async fn has_data(&self) -> Result<bool, TransportError> {
            Ok(!self.chunks.lock().expect("chunks lock").is_empty())
        }

        async fn shutdown(&self, _direction: ShutdownDirection) -> Result<(), TransportError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), TransportError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// 行可以横跨任意块边界，`\r\n` 归一为不带行尾的文本。
    #[tokio::test]
    async fn lines_span_chunk_boundaries() {
        let transport = ScriptedTransport::with_chunks(&[
            b"he".as_slice(),
            b"llo\r\nwo".as_slice(),
            b"rld\n".as_slice(),
            b"tail".as_slice(),
        ]);
        let mut stream = TransportStream::owned(transport);

        assert_eq!(stream.read_line().await.expect("first line").as_deref(), Some("hello"));
        assert_eq!(stream.read_line().await.expect("second line").as_deref(), Some("world"));
        // 对端在行中关闭：残行原样返回。
        assert_eq!(stream.read_line().await.expect("partial line").as_deref(), Some("tail"));
        // 其后不再有数据。
        assert_eq!(stream.read_line().await.expect("end"), None);
    }

    /// 对端在新行开始前关闭时返回 `None` 而非错误。
    #[tokio::test]
    async fn clean_close_yields_none() {
        let transport = ScriptedTransport::with_chunks(&[b"only\n".as_slice()]);
        let mut stream = TransportStream::owned(transport);
        assert_eq!(stream.read_line().await.expect("line").as_deref(), Some("only"));
        assert_eq!(stream.read_line().await.expect("end"), None);
    }

    /// 定长读取跨块补齐，剩余字节留在缓冲内供后续消费。
    #[tokio::test]
    async fn exact_reads_span_chunks() {
        let transport = ScriptedTransport::with_chunks(&[b"abc".as_slice(), b"defg".as_slice()]);
        let mut stream = TransportStream::owned(transport);

        assert_eq!(stream.read_exact(5).await.expect("first"), b"abcde");
        assert_eq!(stream.read_exact(2).await.expect("rest"), b"fg");
    }

    /// 不足定长即对端关闭是错误，不是短读。
    #[tokio::test]
    async fn exact_read_cut_short_is_an_error() {
        let transport = ScriptedTransport::with_chunks(&[b"ab".as_slice()]);
        let mut stream = TransportStream::owned(transport);
        let err = stream.read_exact(4).await.expect_err("cut short");
        assert_eq!(err.kind(), ErrorKind::PeerClosed);
    }

    /// 写出定长缓冲不丢字节。
    #[tokio::test]
    async fn write_all_delivers_every_byte() {
        let transport = ScriptedTransport::with_chunks(&[]);
        let mut stream = TransportStream::owned(transport);
        stream.write_all(b"MAIL FROM:<a@b>\r\n").await.expect("write");
        assert_eq!(stream.transport().written(), b"MAIL FROM:<a@b>\r\n");
    }

    /// 缓冲内的未消费字节计入 `has_data`。
    #[tokio::test]
    async fn buffered_bytes_count_as_data() {
        let transport = ScriptedTransport::with_chunks(&[b"ab\ncd".as_slice()]);
        let mut stream = TransportStream::owned(transport);
        assert_eq!(stream.read_line().await.expect("line").as_deref(), Some("ab"));
        // 脚本块已耗尽，但缓冲内还有 "cd"。
        assert!(stream.has_data().await.expect("probe"));
    }

    /// 所有权语义：拥有则关闭传输，借用则原样留存。
    #[tokio::test]
    async fn ownership_controls_close() {
        let mut owned = TransportStream::owned(ScriptedTransport::default());
        owned.close().await.expect("close owned");
        assert!(owned.transport().is_closed());

        let mut leased = TransportStream::leased(ScriptedTransport::default());
        leased.close().await.expect("close leased");
        assert!(
            !leased.transport().is_closed(),
            "a leased transport must survive stream close"
        );
        let inner = leased.into_inner();
        assert!(!inner.is_closed());
    }
}
