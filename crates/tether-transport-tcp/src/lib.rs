#![doc = r#"
# tether-transport-tcp

## 设计动机（Why）
- **定位**：该 crate 提供 Tether 在 Tokio 运行时上的 TCP 通道与监听器
  实现，封装建连、监听、读写、半关闭与句柄生命周期等底层细节。
- **架构角色**：作为传输实现层的基础积木，满足 `tether-core` 的
  [`Transport`](tether_core::Transport) 能力契约，并为 TLS 实现提供
  可拆解的底层通道。
- **设计理念**：阻塞语义即“在配置的截止时间内等待”，非阻塞语义即
  “单次尝试并以瞬态错误返回”；两者共用同一实现，由
  [`SocketConfig`](tether_core::SocketConfig) 的 `blocking` 开关切换。

## 核心契约（What）
- **输入条件**：调用方必须在 Tokio 运行时中使用本实现；
- **输出保障**：建连、接受、读写与关闭均返回语义化结果，出错时附带
  稳定错误码与 [`ErrorKind`](tether_core::ErrorKind)；
- **关闭语义**：`close` 幂等且恰好释放一次句柄；另一任务中阻塞的
  读写会在一个轮询间隔内以致命错误返回，不会悬挂。

## 实现策略（How）
- 读写路径通过内部工具函数注入截止时间与关闭信号，以
  `tokio::select!` 组合 IO Future；
- 监听器经由 `socket2` 走“临时启用地址复用、绑定、立即收回”的
  序列，关闭时重新打开复用以便重启后立即重绑；
- Tokio 未暴露的套接字选项（收发缓冲、SO_KEEPALIVE）通过
  `socket2::SockRef` 应用。

## 风险与考量（Trade-offs）
- 以互斥锁序列化读写，无法做到真正的全双工；上层若需并发收发，
  应自行拆分任务并串行化对通道的访问；
- 关闭信号采用定时轮询，取消响应存在毫秒级延迟。
"#]

mod channel;
mod error;
mod listener;
mod util;

pub use channel::{TcpChannel, TcpChannelParts};
pub use listener::TcpListener;
