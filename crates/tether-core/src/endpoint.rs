use std::fmt;
use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

use crate::error::{ErrorKind, TransportError, codes};

/// 端点主机侧的两种表达：字面 IP 或待解析的域名。
///
/// # 设计动机（Why）
/// - 字面 IP 无需解析即可直连，域名则必须经过 [`crate::resolver`]；
///   在类型层面区分两者，避免在每个调用点重复判断字符串形态。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HostSpec {
    /// 字面 IPv4/IPv6 地址。
    Ip(IpAddr),
    /// 需要经过名字解析的主机名。
    Name(String),
}

impl HostSpec {
    /// 从任意字符串构造：能解析为 IP 字面量则取 `Ip`，否则视为域名。
    pub fn from_str_lossy(raw: &str) -> Self {
        match raw.parse::<IpAddr>() {
            Ok(ip) => HostSpec::Ip(ip),
            Err(_) => HostSpec::Name(raw.to_string()),
        }
    }
}

impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostSpec::Ip(IpAddr::V6(ip)) => write!(f, "[{ip}]"),
            HostSpec::Ip(IpAddr::V4(ip)) => write!(f, "{ip}"),
            HostSpec::Name(name) => f.write_str(name),
        }
    }
}

/// `Endpoint` 是一次连接某一侧的不可变 `(host, port)` 组合。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 统一本地与远端两侧的地址表达，使监听、建连与池化键值共用同一
///   类型；
/// - 构造后不可变，保证池内按端点聚合空闲连接时键值稳定。
///
/// ## 契约（What）
/// - `host`：[`HostSpec`]，IP 字面量或域名；
/// - `port`：0 到 65535 的端口号，`0` 在监听场景表示由内核分配；
/// - `Display` 与 [`format`](Self::format) 仅格式化存储值，从不触发
///   OS 查询或名字解析。
///
/// ## 注意事项（Trade-offs）
/// - 不在构造时校验域名语法，保持轻量；非法域名会在解析阶段以
///   [`ErrorKind::Resolution`] 失败。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: HostSpec,
    port: u16,
}

impl Endpoint {
    /// 以主机字符串与端口构造端点。
    pub fn new(host: impl AsRef<str>, port: u16) -> Self {
        Self {
            host: HostSpec::from_str_lossy(host.as_ref()),
            port,
        }
    }

    /// 以已知 IP 构造端点。
    pub fn from_ip(ip: IpAddr, port: u16) -> Self {
        Self {
            host: HostSpec::Ip(ip),
            port,
        }
    }

    /// 解析 `host:port` 字面量，支持 `[v6]:port` 方括号形式。
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        parse_literal(raw).map_err(|err| {
            TransportError::new(codes::ENDPOINT_PARSE_FAILED, err.to_string())
                .with_kind(ErrorKind::Resolution)
                .with_cause(err)
        })
    }

    /// 主机侧表达。
    pub fn host(&self) -> &HostSpec {
        &self.host
    }

    /// 端口号。
    pub fn port(&self) -> u16 {
        self.port
    }

    /// 格式化存储的端点；`include_port` 为假时仅输出主机侧。
    pub fn format(&self, include_port: bool) -> String {
        if include_port {
            self.to_string()
        } else {
            self.host.to_string()
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: HostSpec::Ip(addr.ip()),
            port: addr.port(),
        }
    }
}

/// 端点字面量的叶子解析错误，在 [`Endpoint::parse`] 边界映射为
/// [`TransportError`]。
#[derive(Debug, Error)]
enum ParseError {
    #[error("endpoint literal `{0}` is missing a `:port` suffix")]
    MissingPort(String),
    #[error("endpoint literal `{0}` has an invalid port")]
    InvalidPort(String),
    #[error("endpoint literal `{0}` has an unterminated `[` bracket")]
    UnterminatedBracket(String),
}

fn parse_literal(raw: &str) -> Result<Endpoint, ParseError> {
    if let Some(rest) = raw.strip_prefix('[') {
        // [v6]:port 形式。
        let Some((host, tail)) = rest.split_once(']') else {
            return Err(ParseError::UnterminatedBracket(raw.to_string()));
        };
        let Some(port_text) = tail.strip_prefix(':') else {
            return Err(ParseError::MissingPort(raw.to_string()));
        };
        let port = port_text
            .parse::<u16>()
            .map_err(|_| ParseError::InvalidPort(raw.to_string()))?;
        return Ok(Endpoint::new(host, port));
    }

    let Some((host, port_text)) = raw.rsplit_once(':') else {
        return Err(ParseError::MissingPort(raw.to_string()));
    };
    if host.contains(':') {
        // 无方括号的裸 v6 字面量无法与端口歧义区分。
        return Err(ParseError::MissingPort(raw.to_string()));
    }
    let port = port_text
        .parse::<u16>()
        .map_err(|_| ParseError::InvalidPort(raw.to_string()))?;
    Ok(Endpoint::new(host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn parse_accepts_name_and_ip_literals() {
        let ep = Endpoint::parse("example.org:5060").expect("name literal");
        assert_eq!(ep.host(), &HostSpec::Name("example.org".to_string()));
        assert_eq!(ep.port(), 5060);

        let ep = Endpoint::parse("127.0.0.1:80").expect("v4 literal");
        assert!(matches!(ep.host(), HostSpec::Ip(IpAddr::V4(_))));
    }

    #[test]
    fn parse_accepts_bracketed_v6() {
        let ep = Endpoint::parse("[::1]:8080").expect("v6 literal");
        assert_eq!(
            ep.host(),
            &HostSpec::Ip(IpAddr::V6(Ipv6Addr::LOCALHOST))
        );
        assert_eq!(ep.port(), 8080);
    }

    #[test]
    fn parse_rejects_missing_or_bad_port() {
        assert!(Endpoint::parse("no-port").is_err());
        assert!(Endpoint::parse("host:99999").is_err());
        assert!(Endpoint::parse("[::1").is_err());
        let err = Endpoint::parse("no-port").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resolution);
    }

    #[test]
    fn format_respects_port_switch() {
        let ep = Endpoint::new("::1", 443);
        assert_eq!(ep.format(true), "[::1]:443");
        assert_eq!(ep.format(false), "[::1]");

        let ep = Endpoint::new("mail.example", 25);
        assert_eq!(ep.format(true), "mail.example:25");
        assert_eq!(ep.format(false), "mail.example");
    }
}
