//! Google Sheets v4 `spreadsheets.values` REST backend.

use std::time::Duration;

use kpisync_common::{A1Range, CellValue};
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::store::{GridStore, InputMode, Rows, StoreError, ValueRender};

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct ValueRangeResponse {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRangeBody<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: Vec<Vec<Value>>,
}

/// Blocking client for the values endpoints, authorised with an OAuth bearer
/// token.
///
/// Non-success responses surface as `googleapi: Error <status>: <body>` so
/// the default transient pattern recognises rate limiting.
#[derive(Debug, Clone)]
pub struct SheetsStore {
    client: Client,
    token: String,
    base: Url,
}

impl SheetsStore {
    pub fn new(token: impl Into<String>) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::new(format!("cannot build HTTP client: {e}")))?;
        let base = Url::parse(DEFAULT_BASE_URL)
            .map_err(|e| StoreError::new(format!("bad base url: {e}")))?;
        Ok(Self {
            client,
            token: token.into(),
            base,
        })
    }

    /// Read the bearer token from the environment variable `var`.
    pub fn from_env(var: &str) -> Result<Self, StoreError> {
        let token = std::env::var(var)
            .map_err(|_| StoreError::new(format!("environment variable {var} is not set")))?;
        if token.trim().is_empty() {
            return Err(StoreError::new(format!("environment variable {var} is empty")));
        }
        Self::new(token.trim())
    }

    /// Point the client at another API root (e.g. a local emulator).
    pub fn with_base_url(mut self, base: &str) -> Result<Self, StoreError> {
        let mut base = Url::parse(base).map_err(|e| StoreError::new(format!("bad base url: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        self.base = base;
        Ok(self)
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> Result<Url, StoreError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::new("base url cannot carry a path"))?
            .pop_if_empty()
            .push(spreadsheet_id)
            .push("values")
            .push(range);
        Ok(url)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request.bearer_auth(&self.token).send().map_err(|e| {
            if e.is_timeout() {
                StoreError::new(format!("request timeout: {e}"))
            } else {
                StoreError::new(format!("request failed: {e}"))
            }
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(StoreError::with_status(
            status.as_u16(),
            format!("googleapi: Error {}: {}", status.as_u16(), body.trim()),
        ))
    }
}

impl GridStore for SheetsStore {
    fn get_range(
        &mut self,
        spreadsheet_id: &str,
        range: &A1Range,
        render: ValueRender,
    ) -> Result<Rows, StoreError> {
        let range = range.to_string();
        let url = self.values_url(spreadsheet_id, &range)?;
        debug!(%range, render = render.as_api_str(), "values.get");
        let request = self
            .client
            .get(url)
            .query(&[("valueRenderOption", render.as_api_str())]);
        let body: ValueRangeResponse = self
            .send(request)?
            .json()
            .map_err(|e| StoreError::new(format!("cannot decode values of {range}: {e}")))?;
        Ok(body
            .values
            .iter()
            .map(|row| row.iter().map(CellValue::from_json).collect())
            .collect())
    }

    fn update_range(
        &mut self,
        spreadsheet_id: &str,
        range: &A1Range,
        rows: &[Vec<CellValue>],
        mode: InputMode,
    ) -> Result<(), StoreError> {
        let range = range.to_string();
        let url = self.values_url(spreadsheet_id, &range)?;
        debug!(%range, mode = mode.as_api_str(), rows = rows.len(), "values.update");
        let body = ValueRangeBody {
            range: &range,
            major_dimension: "ROWS",
            values: rows
                .iter()
                .map(|row| row.iter().map(CellValue::to_json).collect())
                .collect(),
        };
        let request = self
            .client
            .put(url)
            .query(&[("valueInputOption", mode.as_api_str())])
            .json(&body);
        self.send(request).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_url_escapes_range() {
        let store = SheetsStore::new("token").unwrap();
        let url = store.values_url("abc", "'Weekly KPIs'!B5:B").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc/values/'Weekly%20KPIs'!B5:B"
        );
    }

    #[test]
    fn base_url_override_keeps_prefix() {
        let store = SheetsStore::new("token")
            .unwrap()
            .with_base_url("http://127.0.0.1:9000/v4/spreadsheets")
            .unwrap();
        let url = store.values_url("abc", "S!A1:A1").unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9000/v4/spreadsheets/abc/values/S!A1:A1"
        );
    }
}
