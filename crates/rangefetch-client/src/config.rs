use std::time::Duration;

use rangefetch_core::AppError;
use url::Url;

pub const DEFAULT_ENDPOINT: &str =
    "https://ys.endata.cn/enlib-api/api/cinema/getcinema_baseinfo_byid.do";

/// Request shape and timeouts for [`ApiFetcher`](crate::ApiFetcher).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    /// Budget for establishing the connection.
    pub connect_timeout: Duration,
    /// Budget for the whole request, connection included.
    pub timeout: Duration,
    pub origin: Option<String>,
    pub referer: Option<String>,
    pub accept_language: String,
    /// Form field carrying the identifier.
    pub id_field: String,
    /// Form field carrying the random cache-busting nonce.
    pub nonce_field: String,
    /// Key under `data` holding the result rows.
    pub table_key: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: Duration::from_millis(3050),
            timeout: Duration::from_secs(30),
            origin: Some("https://ys.endata.cn".to_string()),
            referer: Some("https://ys.endata.cn/Details/Cinema".to_string()),
            accept_language: "zh-CN,zh;q=0.9".to_string(),
            id_field: "cinemaid".to_string(),
            nonce_field: "r".to_string(),
            table_key: "table0".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, total: Duration) -> Self {
        self.connect_timeout = connect;
        self.timeout = total;
        self
    }

    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_referer(mut self, referer: Option<String>) -> Self {
        self.referer = referer;
        self
    }

    pub fn with_fields(
        mut self,
        id_field: impl Into<String>,
        nonce_field: impl Into<String>,
        table_key: impl Into<String>,
    ) -> Self {
        self.id_field = id_field.into();
        self.nonce_field = nonce_field.into();
        self.table_key = table_key.into();
        self
    }

    /// Parse the endpoint and check the timeouts make sense.
    pub fn validate(&self) -> Result<Url, AppError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| AppError::ConfigError(format!("Invalid endpoint URL: {e}")))?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(AppError::ConfigError(format!(
                    "Endpoint scheme '{scheme}' is not allowed (only http/https)"
                )));
            }
        }

        if self.connect_timeout.is_zero() || self.timeout.is_zero() {
            return Err(AppError::ConfigError("timeouts must be positive".into()));
        }
        if self.connect_timeout > self.timeout {
            return Err(AppError::ConfigError(format!(
                "connect timeout {:?} exceeds total timeout {:?}",
                self.connect_timeout, self.timeout
            )));
        }

        Ok(url)
    }
}
