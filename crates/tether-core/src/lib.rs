#![doc = r#"
# tether-core

## 设计动机（Why）
- **定位**：该 crate 定义 Tether 传输层的共享契约，包括端点表示、
  套接字配置、统一错误域与传输能力接口。
- **架构角色**：作为所有传输实现（TCP/TLS/UDP）、连接池与流适配层的
  公共依赖，保证上层在替换传输介质时无需重新编译或分支判断。
- **设计理念**：以“能力接口 + 组合”取代继承层次，任何满足
  [`Transport`](transport::Transport) 的实现都可以被池化、被流包装、
  被上层协议直接消费。

## 核心契约（What）
- **端点**：[`Endpoint`](endpoint::Endpoint) 承载主机与端口的不可变组合，
  解析动作集中在 [`resolver`] 模块；
- **错误**：[`TransportError`](error::TransportError) 携带稳定错误码、
  错误种类（[`ErrorKind`](error::ErrorKind)）、结构化分类
  （[`ErrorCategory`](error::ErrorCategory)）与传播帧链，瞬态与致命
  条件通过种类区分而非异常控制流；
- **配置**：[`SocketConfig`](config::SocketConfig) 一次构建、多处复用，
  默认值与字段语义在类型层面显式化；
- **能力**：[`Transport`](transport::Transport) 统一读、写、探测、
  半关闭与幂等关闭。

## 实现策略（How）
- 错误域不依赖具体 IO 类型，`io::ErrorKind` 到种类/分类的映射由各
  传输 crate 在边界处完成；
- 解析器依赖 Tokio 的 `lookup_host`，通过 `runtime-tokio` 特性开关隔离，
  关闭特性时仅保留纯类型；
- 能力接口使用 `async-trait` 保持对象安全，连接池与流适配层以
  `dyn Transport` 持有任意实现。

## 风险与考量（Trade-offs）
- 对象安全接口意味着每次调用有一次堆分配的 Future 装箱开销；对本层
  以系统调用为主的操作而言可以忽略；
- 错误分类的默认映射偏保守，未知 IO 错误一律视为不可重试，调用方
  可显式覆盖分类。
"#]

pub mod config;
pub mod endpoint;
pub mod error;
#[cfg(feature = "runtime-tokio")]
pub mod resolver;
pub mod transport;
pub mod wire;

pub use config::{SocketConfig, SocketConfigBuilder};
pub use endpoint::{Endpoint, HostSpec};
pub use error::{ErrorCategory, ErrorFrame, ErrorKind, RetryAdvice, TransportError};
pub use transport::{ShutdownDirection, Transport, TransportExt};

/// 常用契约的一站式导入入口。
pub mod prelude {
    pub use crate::config::{SocketConfig, SocketConfigBuilder};
    pub use crate::endpoint::{Endpoint, HostSpec};
    pub use crate::error::{ErrorCategory, ErrorFrame, ErrorKind, RetryAdvice, TransportError};
    pub use crate::transport::{ShutdownDirection, Transport, TransportExt};
}
