#![doc = r#"
# tether-transport-tls

## 设计动机（Why）
- **定位**：在 TCP 通道之上以 `rustls` 提供加密读写能力，调用方视角
  与明文通道完全一致，上层无须为传输安全分支。
- **架构角色**：消费 `tether-transport-tcp` 的可拆解通道，产出同样
  满足 [`Transport`](tether_core::Transport) 契约的 [`TlsChannel`]。
- **设计理念**：握手是状态而非构造前提。客户端可选择在建连时立即
  完成握手，或推迟到第一次读写；两种路径都保证应用字节绝不先于
  握手完成上线。

## 核心契约（What）
- [`TlsAcceptor`]：从 PEM 路径加载证书与私钥；任一材料加载失败都是
  致命的构造错误，不存在降级为明文的回退路径；
- [`TlsConnector`]：从 CA 文件构建信任根，提供立即与惰性两种握手
  入口；
- [`TlsChannel`]：`is_handshake_complete` 在 rustls 握手完成前恒为假；
  未完成握手时的读写先驱动握手，失败则以握手错误返回。

## 实现策略（How）
- 握手与读写经内部工具函数注入截止时间与关闭信号；
- 服务端配置放入 `ArcSwap`，支持运行中原子替换（证书轮换）；
- 进程级 rustls 加密后端安装由 `OnceLock` 保证恰好一次，任何构造
  入口都会先行触发。

## 风险与考量（Trade-offs）
- `has_data` 只探测底层 TCP 可读性，rustls 会话内已解密未读取的
  残留数据不计入探测结果；逐字节消费的调用方不受影响；
- 非阻塞读写以就绪探测近似，批量吞吐场景应使用阻塞语义。
"#]

mod acceptor;
mod channel;
mod connector;
mod error;
mod material;
mod util;

pub use acceptor::TlsAcceptor;
pub use channel::TlsChannel;
pub use connector::TlsConnector;

use std::sync::OnceLock;

/// 进程级 rustls 加密后端安装：幂等，首个构造入口触发。
///
/// 某些平台的套接字子系统需要一次性的进程级初始化；在本实现中唯一
/// 真实存在的此类初始化就是加密后端的注册，集中在此统一治理。
pub(crate) fn ensure_crypto_provider() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        // 多个依赖方竞争安装时以先到者为准，失败仅意味着已有后端。
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
