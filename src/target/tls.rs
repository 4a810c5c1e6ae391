//! TLS 参数解析与证书加载
//!
//! 目标地址带 `tls=true` 时，从查询参数里取 `caPath`、`certPath`、`certKeyPath`。
//! 解析阶段只检查文件是否存在，真正读取内容在构建后端客户端时进行。

use std::collections::HashMap;
use std::io::ErrorKind;

use crate::error::{DriverError, Result};

pub const TLS_PARAM: &str = "tls";
pub const CA_PATH_PARAM: &str = "caPath";
pub const CERT_PATH_PARAM: &str = "certPath";
pub const CERT_KEY_PATH_PARAM: &str = "certKeyPath";

const PEM_CERT_MARKER: &str = "-----BEGIN CERTIFICATE-----";

/// TLS 文件路径配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TlsConfig {
    pub ca_path: String,
    /// 双向认证时的客户端证书，可为空
    pub cert_path: String,
    /// 双向认证时的客户端私钥，可为空
    pub cert_key_path: String,
}

/// 已读入内存的 TLS 材料
#[derive(Clone)]
pub struct TlsMaterial {
    pub ca_pem: Vec<u8>,
    /// (cert, key)
    pub identity: Option<(Vec<u8>, Vec<u8>)>,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("ca_pem_len", &self.ca_pem.len())
            .field("identity", &self.identity.is_some())
            .finish()
    }
}

/// 只有 `tls` 参数严格等于 `"true"` 时才启用 TLS
pub fn is_tls_enabled(query: &HashMap<String, String>) -> bool {
    query.get(TLS_PARAM).map(String::as_str) == Some("true")
}

/// 从查询参数解析 TLS 配置
///
/// `caPath` 必填；`certPath` 为空时直接返回，`certKeyPath` 只在 `certPath` 存在时才检查。
pub fn parse_tls_config(query: &HashMap<String, String>) -> Result<TlsConfig> {
    let mut config = TlsConfig::default();

    let ca_path = query.get(CA_PATH_PARAM).cloned().unwrap_or_default();
    check_file(&ca_path, "ca")?;
    config.ca_path = ca_path;

    let cert_path = query.get(CERT_PATH_PARAM).cloned().unwrap_or_default();
    if cert_path.is_empty() {
        return Ok(config);
    }
    check_file(&cert_path, "cert")?;
    config.cert_path = cert_path;

    let cert_key_path = query.get(CERT_KEY_PATH_PARAM).cloned().unwrap_or_default();
    if cert_key_path.is_empty() {
        return Ok(config);
    }
    check_file(&cert_key_path, "key")?;
    config.cert_key_path = cert_key_path;

    Ok(config)
}

fn check_file(path: &str, kind: &str) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound || path.is_empty() => {
            Err(DriverError::tls(path, format!("{} file not found", kind)))
        }
        Err(e) => Err(DriverError::tls(
            path,
            format!("read {} file failed, check your permission: {}", kind, e),
        )),
    }
}

async fn read_file(path: &str, kind: &str) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            DriverError::tls(path, format!("{} file not found", kind))
        } else {
            DriverError::tls(
                path,
                format!("read {} file failed, check your permission: {}", kind, e),
            )
        }
    })
}

impl TlsConfig {
    /// 读取 CA 以及（可选的）客户端证书和私钥
    pub async fn load(&self) -> Result<TlsMaterial> {
        if self.ca_path.is_empty() {
            return Err(DriverError::tls("", "tls enabled but caPath is empty"));
        }
        let ca_pem = read_file(&self.ca_path, "ca").await?;
        if !String::from_utf8_lossy(&ca_pem).contains(PEM_CERT_MARKER) {
            return Err(DriverError::tls(
                &self.ca_path,
                "no PEM certificate found in ca file",
            ));
        }

        let identity = if !self.cert_path.is_empty() && !self.cert_key_path.is_empty() {
            let cert = read_file(&self.cert_path, "cert").await?;
            let key = read_file(&self.cert_key_path, "key").await?;
            Some((cert, key))
        } else {
            None
        };

        Ok(TlsMaterial { ca_pem, identity })
    }
}

impl TlsMaterial {
    /// etcd 客户端的 TLS 选项
    pub fn etcd_options(&self) -> etcd_client::TlsOptions {
        let mut options = etcd_client::TlsOptions::new()
            .ca_certificate(etcd_client::Certificate::from_pem(&self.ca_pem));
        if let Some((cert, key)) = &self.identity {
            options = options.identity(etcd_client::Identity::from_pem(cert, key));
        }
        options
    }

    /// 为 HTTP 客户端（Consul / Nacos）装配根证书和客户端身份
    pub fn apply_to_http(
        &self,
        mut builder: reqwest::ClientBuilder,
    ) -> Result<reqwest::ClientBuilder> {
        let ca = reqwest::Certificate::from_pem(&self.ca_pem)
            .map_err(|e| DriverError::tls("ca", format!("invalid ca certificate: {}", e)))?;
        builder = builder.add_root_certificate(ca);

        if let Some((cert, key)) = &self.identity {
            // rustls 要求私钥和证书在同一个 PEM 里
            let mut pem = key.clone();
            pem.push(b'\n');
            pem.extend_from_slice(cert);
            let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
                DriverError::tls("cert", format!("load x509 key pair failed: {}", e))
            })?;
            builder = builder.identity(identity);
        }
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn tls_flag_is_literal_true() {
        assert!(is_tls_enabled(&query(&[("tls", "true")])));
        assert!(!is_tls_enabled(&query(&[("tls", "TRUE")])));
        assert!(!is_tls_enabled(&query(&[("tls", "1")])));
        assert!(!is_tls_enabled(&query(&[])));
    }

    #[test]
    fn missing_ca_path_is_not_found() {
        let err = parse_tls_config(&query(&[("tls", "true")])).unwrap_err();
        match err {
            DriverError::TlsConfig { reason, .. } => assert_eq!(reason, "ca file not found"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
