use std::sync::Arc;

use rangefetch_core::error::AppError;
use rangefetch_core::models::{FetchOutcome, Identifier, SuccessRecord};
use rangefetch_core::traits::RecordFetcher;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER, USER_AGENT};
use serde_json::Value;
use url::Url;

use crate::config::ClientConfig;
use crate::headers;

/// Record client for a form-POST lookup API.
///
/// Each request carries a freshly drawn User-Agent and a random nonce.
/// Responses are classified into [`FetchOutcome`]s:
///
/// | Response | Outcome |
/// |----------|---------|
/// | transport error, timeout, non-2xx | `Transient` |
/// | body is not JSON, table is not a list | `Fatal` |
/// | `status != 1`, missing or empty table, blank first row | `Empty` |
/// | first table row | `Success` |
///
/// Pacing is not applied here; wrap the client in
/// [`PacedFetcher`](rangefetch_core::pacing::PacedFetcher).
#[derive(Clone)]
pub struct ApiFetcher {
    client: Client,
    endpoint: Url,
    config: Arc<ClientConfig>,
}

impl ApiFetcher {
    pub fn new(config: ClientConfig) -> Result<Self, AppError> {
        let endpoint = config.validate()?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            config: Arc::new(config),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// One request, no retries. `Ok(None)` means the API has no row for `id`.
    pub async fn fetch_record(&self, id: Identifier) -> Result<Option<Value>, AppError> {
        let id_value = id.to_string();
        let nonce = headers::nonce();
        let form = [
            (self.config.id_field.as_str(), id_value.as_str()),
            (self.config.nonce_field.as_str(), nonce.as_str()),
        ];

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(USER_AGENT, headers::random_user_agent())
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(ACCEPT_LANGUAGE, self.config.accept_language.as_str())
            .form(&form);
        if let Some(origin) = &self.config.origin {
            request = request.header(ORIGIN, origin.as_str());
        }
        if let Some(referer) = &self.config.referer {
            request = request.header(REFERER, referer.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.config.timeout.as_secs_f64())
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} for id {id}",
                status.as_u16()
            )));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.config.timeout.as_secs_f64())
            } else {
                AppError::NetworkError(format!("Failed to read response body: {e}"))
            }
        })?;

        parse_body(&body, &self.config.table_key)
    }
}

impl RecordFetcher for ApiFetcher {
    async fn fetch(&self, id: Identifier) -> FetchOutcome {
        match self.fetch_record(id).await {
            Ok(Some(row)) => FetchOutcome::Success(SuccessRecord::new(id, row)),
            Ok(None) => FetchOutcome::Empty,
            Err(e) => {
                tracing::debug!(%id, error = %e, retryable = e.is_retryable(), "Request failed");
                FetchOutcome::from_error(e)
            }
        }
    }
}

/// Extract the first row of `data.<table_key>` from a response body.
fn parse_body(body: &str, table_key: &str) -> Result<Option<Value>, AppError> {
    let json: Value = serde_json::from_str(body).map_err(|e| {
        AppError::MalformedResponse(format!("Response is not JSON: {e}"))
    })?;

    if json.get("status").and_then(Value::as_i64) != Some(1) {
        return Ok(None);
    }

    match json.get("data").and_then(|data| data.get(table_key)) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(rows)) => Ok(rows.first().filter(|row| !is_blank(row)).cloned()),
        Some(other) => Err(AppError::MalformedResponse(format!(
            "Expected '{table_key}' to be a list, got {}",
            type_name(other)
        ))),
    }
}

/// A `null` or `{}` row carries no record.
fn is_blank(row: &Value) -> bool {
    match row {
        Value::Null => true,
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_row_is_returned() {
        let body = r#"{"status": 1, "data": {"table0": [{"CinemaID": 7}, {"CinemaID": 8}]}}"#;
        let row = parse_body(body, "table0").unwrap().unwrap();
        assert_eq!(row["CinemaID"], 7);
    }

    #[test]
    fn test_no_data_markers_are_empty() {
        for body in [
            r#"{"status": 0, "data": {"table0": [{"a": 1}]}}"#,
            r#"{"status": 1, "data": {"table0": []}}"#,
            r#"{"status": 1, "data": {}}"#,
            r#"{"status": 1}"#,
            r#"{"status": 1, "data": {"table0": null}}"#,
            r#"{"data": {"table0": [{"a": 1}]}}"#,
            r#"{"status": 1, "data": {"table0": [null]}}"#,
            r#"{"status": 1, "data": {"table0": [{}]}}"#,
            r#"{"status": 1, "data": {"table0": [{}, {"a": 1}]}}"#,
        ] {
            assert!(parse_body(body, "table0").unwrap().is_none(), "{body}");
        }
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = parse_body("<html>busy</html>", "table0").unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_non_list_table_is_malformed() {
        let err = parse_body(r#"{"status": 1, "data": {"table0": {"a": 1}}}"#, "table0")
            .unwrap_err();
        assert!(err.to_string().contains("object"));
    }

    #[test]
    fn test_custom_table_key() {
        let body = r#"{"status": 1, "data": {"rows": [{"x": true}]}}"#;
        assert!(parse_body(body, "rows").unwrap().is_some());
        assert!(parse_body(body, "table0").unwrap().is_none());
    }

    #[test]
    fn test_new_rejects_invalid_endpoint() {
        assert!(ApiFetcher::new(ClientConfig::new("::nope")).is_err());
    }
}
