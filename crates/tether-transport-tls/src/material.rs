//! PEM 证书与私钥材料的加载与装配。
//!
//! # 教案式说明
//! - **Why**：监听端的安全材料只接受文件路径输入；集中加载逻辑使
//!   “任一材料失败即整体失败”的语义有单一实现点；
//! - **How**：经 `rustls-pki-types` 的 PEM 读取接口逐张解析证书链并
//!   读取首个私钥，再交由 `rustls` 完成配置装配；
//! - **What**：叶子错误以 `thiserror` 建模，在 crate 边界统一映射为
//!   安全类传输错误。

use std::path::Path;

use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_pki_types::pem::{Error as PemError, PemObject};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;

/// 材料加载与装配阶段的叶子错误。
#[derive(Debug, Error)]
pub(crate) enum MaterialError {
    #[error("read certificate chain from `{path}`: {source}")]
    CertificateFile {
        path: String,
        #[source]
        source: PemError,
    },
    #[error("certificate chain `{path}` contains no certificates")]
    EmptyChain { path: String },
    #[error("read private key from `{path}`: {source}")]
    KeyFile {
        path: String,
        #[source]
        source: PemError,
    },
    #[error("assemble server config: {source}")]
    ServerAssembly {
        #[source]
        source: rustls::Error,
    },
    #[error("trust anchor from `{path}` rejected: {source}")]
    TrustAnchor {
        path: String,
        #[source]
        source: rustls::Error,
    },
}

/// 从 PEM 路径装配服务端配置；证书与私钥缺一不可。
pub(crate) fn load_server_config(
    cert_path: &Path,
    key_path: &Path,
) -> Result<ServerConfig, MaterialError> {
    let certs = load_cert_chain(cert_path)?;
    let key = PrivateKeyDer::from_pem_file(key_path).map_err(|source| MaterialError::KeyFile {
        path: key_path.display().to_string(),
        source,
    })?;
    ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|source| MaterialError::ServerAssembly { source })
}

/// 从 CA 文件装配客户端配置，信任根即该文件内的全部证书。
pub(crate) fn load_client_config(ca_path: &Path) -> Result<ClientConfig, MaterialError> {
    let mut roots = RootCertStore::empty();
    for cert in load_cert_chain(ca_path)? {
        roots
            .add(cert)
            .map_err(|source| MaterialError::TrustAnchor {
                path: ca_path.display().to_string(),
                source,
            })?;
    }
    Ok(ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth())
}

fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>, MaterialError> {
    let iter =
        CertificateDer::pem_file_iter(path).map_err(|source| MaterialError::CertificateFile {
            path: path.display().to_string(),
            source,
        })?;
    let certs: Vec<CertificateDer<'static>> =
        iter.collect::<Result<_, _>>()
            .map_err(|source| MaterialError::CertificateFile {
                path: path.display().to_string(),
                source,
            })?;
    if certs.is_empty() {
        return Err(MaterialError::EmptyChain {
            path: path.display().to_string(),
        });
    }
    Ok(certs)
}
