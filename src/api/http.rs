//! Blocking HTTPS transport built on `ureq`.

use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;

use crate::api::connection::{Connection, Method};
use crate::error::HttpError;

/// `Connection` backed by a `ureq` agent with HTTP basic authentication.
pub struct HttpConnection {
    host: String,
    base_url: String,
    agent: ureq::Agent,
    authorization: Option<String>,
}

impl HttpConnection {
    /// `host` may be a bare name (`https` is assumed) or a full base URL.
    pub fn new(host: &str, timeout: Duration) -> Self {
        let base_url = if host.contains("://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", host)
        };
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            host: host.to_string(),
            base_url,
            agent,
            authorization: None,
        }
    }

    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        let token = general_purpose::STANDARD.encode(format!("{}:{}", username, password));
        self.authorization = Some(format!("Basic {}", token));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn decode(body: &str) -> Result<Value, HttpError> {
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(body).map_err(|e| HttpError::Decode(e.to_string()))
    }
}

impl Connection for HttpConnection {
    fn host(&self) -> &str {
        &self.host
    }

    fn json_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        params: &[(String, String)],
    ) -> Result<Value, HttpError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .agent
            .request(method.as_str(), &url)
            .set("Accept", "application/json");
        if let Some(auth) = &self.authorization {
            request = request.set("Authorization", auth);
        }
        for (k, v) in params {
            request = request.query(k, v);
        }

        log::debug!("HTTP_REQUEST method={} path={}", method, path);
        let response = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };

        match response {
            Ok(resp) => {
                let text = resp
                    .into_string()
                    .map_err(|e| HttpError::Decode(e.to_string()))?;
                Self::decode(&text)
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                log::debug!("HTTP_STATUS method={} path={} code={}", method, path, code);
                Err(HttpError::Status { code, body })
            }
            Err(e) => Err(HttpError::Transport(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let conn = HttpConnection::new("np.example.com", Duration::from_secs(5));
        assert_eq!(conn.base_url(), "https://np.example.com");
        assert_eq!(conn.host(), "np.example.com");

        let conn = HttpConnection::new("http://127.0.0.1:8080/", Duration::from_secs(5));
        assert_eq!(conn.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_basic_auth_header() {
        let conn = HttpConnection::new("np", Duration::from_secs(5)).with_basic_auth("admin", "admin");
        assert_eq!(conn.authorization.as_deref(), Some("Basic YWRtaW46YWRtaW4="));
    }

    #[test]
    fn test_decode_empty_and_invalid() {
        assert_eq!(HttpConnection::decode("").unwrap(), Value::Null);
        assert_eq!(HttpConnection::decode("{\"id\": 1}").unwrap()["id"], 1);
        assert!(matches!(HttpConnection::decode("<html>"), Err(HttpError::Decode(_))));
    }
}
