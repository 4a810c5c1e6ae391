//! 目标地址解析
//!
//! 目标地址形如 `etcd://host1:2379,host2:2379/serviceName?tls=true&caPath=...`。
//! authority 部分可以包含逗号分隔的多个 `host:port`，这不是标准 URL 能表达的，
//! 因此 scheme / authority / path / query 由这里手工切分，查询参数交给
//! `url::form_urlencoded` 解码。

pub mod tls;

use percent_encoding::percent_decode_str;
use std::collections::HashMap;

use crate::discovery::config::BackendType;
use crate::error::{DriverError, Result};

pub use tls::{TlsConfig, TlsMaterial};

pub const NAMESPACE_ID_PARAM: &str = "namespaceId";
pub const TIMEOUT_MS_PARAM: &str = "timeoutMs";
pub const NOT_LOAD_CACHE_AT_START_PARAM: &str = "notLoadCacheAtStart";

pub const DEFAULT_NACOS_NAMESPACE: &str = "public";
pub const DEFAULT_NACOS_TIMEOUT_MS: u64 = 5000;

/// 解析后的目标地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTarget {
    /// 原始 scheme（区分大小写）
    pub scheme: String,
    pub backend: BackendType,
    /// authority 原文，例如 `host1:2379,host2:2379`
    pub host: String,
    pub hosts: Vec<String>,
    pub service_name: String,
    pub query: HashMap<String, String>,
    pub tls: Option<TlsConfig>,
    /// 仅 nacos scheme 有值
    pub nacos: Option<NacosParams>,
}

/// Nacos 连接参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NacosParams {
    pub servers: Vec<NacosServer>,
    pub namespace_id: String,
    pub timeout_ms: u64,
    pub not_load_cache_at_start: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NacosServer {
    pub ip: String,
    pub port: u16,
}

impl NacosServer {
    pub fn base_url(&self, secure: bool) -> String {
        let scheme = if secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.ip, self.port)
    }
}

impl ParsedTarget {
    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }
}

/// 去掉配置里可能带入的换行符（支持多行书写）
pub fn normalize_target(target: &str) -> String {
    target.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

/// 解析目标地址
pub fn parse_target(target: &str) -> Result<ParsedTarget> {
    let normalized = normalize_target(target);

    let Some((scheme, rest)) = normalized.split_once("://") else {
        // `scheme:opaque` 形式：scheme 合法但不被支持时报告 scheme
        if let Some((scheme, _)) = normalized.split_once(':') {
            if validate_scheme(&normalized, scheme).is_ok()
                && BackendType::from_scheme(scheme).is_none()
            {
                return Err(DriverError::UnsupportedScheme(scheme.to_string()));
            }
        }
        return Err(DriverError::malformed_url(&normalized, "missing '://'"));
    };
    validate_scheme(&normalized, scheme)?;

    if rest.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(DriverError::malformed_url(
            &normalized,
            "contains whitespace or control characters",
        ));
    }

    // fragment 对目标地址没有意义，直接丢弃
    let rest = rest.split('#').next().unwrap_or_default();
    let (authority_and_path, raw_query) = rest.split_once('?').unwrap_or((rest, ""));
    let (authority, path) = match authority_and_path.find('/') {
        Some(idx) => authority_and_path.split_at(idx),
        None => (authority_and_path, ""),
    };
    validate_escapes(&normalized, path)?;
    validate_escapes(&normalized, raw_query)?;

    // userinfo 不参与后端选择
    let host = authority.rsplit('@').next().unwrap_or_default().to_string();
    let hosts: Vec<String> = host
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect();

    let mut query = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(raw_query.as_bytes()) {
        query
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }

    let backend = BackendType::from_scheme(scheme)
        .ok_or_else(|| DriverError::UnsupportedScheme(scheme.to_string()))?;

    let tls = if tls::is_tls_enabled(&query) {
        Some(tls::parse_tls_config(&query)?)
    } else {
        None
    };

    let nacos = match backend {
        BackendType::Nacos => Some(parse_nacos_params(&normalized, &host, &query)?),
        _ => None,
    };

    let service_name = percent_decode_str(path.strip_prefix('/').unwrap_or(path))
        .decode_utf8()
        .map_err(|_| DriverError::malformed_url(&normalized, "path is not valid UTF-8"))?
        .into_owned();

    Ok(ParsedTarget {
        scheme: scheme.to_string(),
        backend,
        service_name,
        host,
        hosts,
        query,
        tls,
        nacos,
    })
}

fn validate_scheme(url: &str, scheme: &str) -> Result<()> {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        Some(_) => {
            return Err(DriverError::malformed_url(
                url,
                "scheme must start with a letter",
            ));
        }
        None => return Err(DriverError::malformed_url(url, "missing protocol scheme")),
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        Ok(())
    } else {
        Err(DriverError::malformed_url(url, "invalid character in scheme"))
    }
}

fn validate_escapes(url: &str, part: &str) -> Result<()> {
    let bytes = part.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return Err(DriverError::malformed_url(url, "invalid URL escape"));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}

fn parse_nacos_params(
    url: &str,
    host: &str,
    query: &HashMap<String, String>,
) -> Result<NacosParams> {
    let servers = host
        .split(',')
        .map(|addr| {
            let parts: Vec<&str> = addr.split(':').collect();
            if parts.len() != 2 {
                return Err(DriverError::NacosHostFormat(addr.to_string()));
            }
            let port = parts[1]
                .parse::<u16>()
                .map_err(|_| DriverError::NacosHostFormat(addr.to_string()))?;
            Ok(NacosServer {
                ip: parts[0].to_string(),
                port,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let namespace_id = query
        .get(NAMESPACE_ID_PARAM)
        .filter(|ns| !ns.is_empty())
        .cloned()
        .unwrap_or_else(|| DEFAULT_NACOS_NAMESPACE.to_string());

    let timeout_ms = match query.get(TIMEOUT_MS_PARAM) {
        Some(raw) if !raw.is_empty() => raw.parse::<u64>().map_err(|e| {
            DriverError::malformed_url(url, format!("invalid {}: {}", TIMEOUT_MS_PARAM, e))
        })?,
        _ => DEFAULT_NACOS_TIMEOUT_MS,
    };

    let not_load_cache_at_start = query
        .get(NOT_LOAD_CACHE_AT_START_PARAM)
        .map(|v| v.to_lowercase() != "false")
        .unwrap_or(true);

    Ok(NacosParams {
        servers,
        namespace_id,
        timeout_ms,
        not_load_cache_at_start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_line_breaks() {
        assert_eq!(
            normalize_target("etcd://a:2379,\r\nb:2379/svc"),
            "etcd://a:2379,b:2379/svc"
        );
    }

    #[test]
    fn rejects_bad_escapes() {
        assert!(validate_escapes("x", "/a%2").is_err());
        assert!(validate_escapes("x", "/a%zz").is_err());
        assert!(validate_escapes("x", "/a%2Fb").is_ok());
    }
}
