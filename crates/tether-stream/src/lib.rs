#![doc = r#"
# tether-stream

## 设计动机（Why）
- **定位**：把任意 [`Transport`](tether_core::Transport) 适配为行与
  定长缓冲两种访问粒度，供邮件、SIP 一类按行对话的协议层消费。
- **所有权显式化**：流对底层传输的所有权由构造入口决定；池化连接
  必须归还连接池而非被流顺手关闭，借用模式正是为此存在。

## 核心契约（What）
- `read_line`：读取至 `\n`，回车换行归一（`\r` 剥除）；对端在新行
  开始前关闭返回 `None`，行中关闭返回已到达的残行；
- `read_exact` / `write_all`：定长语义，内部循环补齐，从不截断；
- `close`：仅当流拥有传输时才关闭它；借用模式下关闭流是空操作，
  传输原样交还（`into_inner`）。

## 实现策略（How）
- 内部以 `BytesMut` 聚合读取，行扫描在缓冲内完成，不逐字节触达
  套接字；
- 对端关闭复用传输层的独立错误种类，流层只决定“残行返回还是
  `None`”，不重新定义流结束语义。
"#]

mod error;
mod stream;

pub use stream::TransportStream;
