//! RPC 地址拆分
//!
//! 把 `svc/method` 或 `scheme://host/svc/method` 拆成 server 与 method 两部分。

use url::{Position, Url};

use crate::error::{DriverError, Result};

/// 拆分 RPC 地址
///
/// - 不含 `//`：按第一个 `/` 拆分，method 保留开头的 `/`
/// - 含 `//`：按 URL 解析，server 为 `scheme://host[:port]` 加上第一段 path，
///   method 为剩余 path；path 只有一段时 server 不带 path，method 为整段 path
///
/// URL 无法解析或 path 为空时返回 [`DriverError::BadUrl`]。
pub fn parse_server_method(uri: &str) -> Result<(String, String)> {
    if !uri.contains("//") {
        let sep = uri
            .find('/')
            .ok_or_else(|| DriverError::bad_url(uri, "no '/' found"))?;
        return Ok((uri[..sep].to_string(), uri[sep..].to_string()));
    }

    let url = Url::parse(uri).map_err(|e| DriverError::bad_url(uri, e.to_string()))?;
    let path = url.path();
    if path.is_empty() || path == "/" {
        return Err(DriverError::bad_url(uri, "no method path found"));
    }

    let index = path[1..].find('/').map(|i| i + 1).unwrap_or(0);
    let authority = &url[Position::BeforeHost..Position::AfterPort];
    let server = format!("{}://{}{}", url.scheme(), authority, &path[..index]);
    Ok((server, path[index..].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_single_segment_path() {
        let (server, method) = parse_server_method("discovery://ns/svc").unwrap();
        assert_eq!(server, "discovery://ns");
        assert_eq!(method, "/svc");
    }
}
