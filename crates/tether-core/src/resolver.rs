//! 名字解析：把 [`Endpoint`] 规范化为可直连的 `SocketAddr`。
//!
//! # 教案式说明
//! - **Why**：解析是建连前的叶子步骤，集中在一处可以保证 TCP/TLS/UDP
//!   三种传输对同一端点得到一致的地址选择；
//! - **How**：IP 字面量直接组装，域名委托 Tokio 的 `lookup_host`；
//! - **What**：[`resolve`] 返回首个可用地址，[`resolve_all`] 返回全部
//!   候选，失败统一映射为 [`ErrorKind::Resolution`]。

use std::net::SocketAddr;

use tokio::net::lookup_host;

use crate::endpoint::{Endpoint, HostSpec};
use crate::error::{ErrorKind, TransportError, codes};

/// 解析端点并返回首个候选地址。
///
/// # 契约说明
/// - **前置条件**：调用方运行在 Tokio 运行时中；
/// - **返回值**：首个解析结果；空结果集同样视为解析失败；
/// - **错误语义**：携带 [`ErrorKind::Resolution`] 与底层原因。
pub async fn resolve(endpoint: &Endpoint) -> Result<SocketAddr, TransportError> {
    match endpoint.host() {
        HostSpec::Ip(ip) => Ok(SocketAddr::new(*ip, endpoint.port())),
        HostSpec::Name(name) => {
            let mut candidates = lookup_host((name.as_str(), endpoint.port()))
                .await
                .map_err(|err| resolution_error(endpoint, err))?;
            candidates
                .next()
                .ok_or_else(|| empty_result_error(endpoint))
        }
    }
}

/// 解析端点并返回全部候选地址，顺序与系统解析器一致。
pub async fn resolve_all(endpoint: &Endpoint) -> Result<Vec<SocketAddr>, TransportError> {
    match endpoint.host() {
        HostSpec::Ip(ip) => Ok(vec![SocketAddr::new(*ip, endpoint.port())]),
        HostSpec::Name(name) => {
            let candidates: Vec<SocketAddr> = lookup_host((name.as_str(), endpoint.port()))
                .await
                .map_err(|err| resolution_error(endpoint, err))?
                .collect();
            if candidates.is_empty() {
                return Err(empty_result_error(endpoint));
            }
            Ok(candidates)
        }
    }
}

fn resolution_error(endpoint: &Endpoint, err: std::io::Error) -> TransportError {
    TransportError::new(
        codes::RESOLVE_FAILED,
        format!("resolve {}: {}", endpoint.format(true), err),
    )
    .with_kind(ErrorKind::Resolution)
    .with_cause(err)
}

fn empty_result_error(endpoint: &Endpoint) -> TransportError {
    TransportError::new(
        codes::RESOLVE_FAILED,
        format!("resolve {}: no address records", endpoint.format(true)),
    )
    .with_kind(ErrorKind::Resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    /// IP 字面量不经过系统解析器，结果必须逐字一致。
    #[tokio::test(flavor = "multi_thread")]
    async fn ip_literal_bypasses_lookup() {
        let ep = Endpoint::from_ip(IpAddr::V4(Ipv4Addr::LOCALHOST), 7000);
        let addr = resolve(&ep).await.expect("literal resolves");
        assert_eq!(addr, "127.0.0.1:7000".parse().expect("addr"));
    }

    /// `localhost` 在任何测试环境都应可解析。
    #[tokio::test(flavor = "multi_thread")]
    async fn localhost_resolves() {
        let ep = Endpoint::new("localhost", 80);
        let addr = resolve(&ep).await.expect("localhost resolves");
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 80);
    }
}
