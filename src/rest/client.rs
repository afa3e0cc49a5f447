use std::time::Duration;

use reqwest::header;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::RestConfig;
use crate::error::{AdmissionsError, Result};

/// Thin client for `{url}/rest/v1/<table>` endpoints.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    page_size: usize,
}

impl RestClient {
    pub fn new(config: &RestConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert("apikey", header_value(&config.api_key)?);
        headers.insert(
            header::AUTHORIZATION,
            header_value(&format!("Bearer {}", config.api_key))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent("admissions-lite")
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            page_size: config.page_size.max(1),
        })
    }

    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// `GET /rest/v1/<table>` with PostgREST query parameters.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let rows = self
            .client
            .get(self.table_url(table))
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(rows)
    }

    /// Every row matching `query`, read in `limit`/`offset` pages.
    ///
    /// The server may return fewer rows than asked for (PostgREST `max-rows`),
    /// so paging ends at the first empty page rather than the first short one.
    pub async fn select_all<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let limit = self.page_size.to_string();
        let mut rows = Vec::new();
        loop {
            let offset = rows.len().to_string();
            let mut params = query.to_vec();
            params.push(("limit", limit.as_str()));
            params.push(("offset", offset.as_str()));

            let page: Vec<T> = self.select(table, &params).await?;
            if page.is_empty() {
                return Ok(rows);
            }
            rows.extend(page);
        }
    }

    /// `POST /rest/v1/<table>` with the rows as a JSON array.
    pub async fn insert<T: Serialize>(&self, table: &str, rows: &[T]) -> Result<()> {
        self.client
            .post(self.table_url(table))
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Insert-or-update keyed on `on_conflict`.
    pub async fn upsert<T: Serialize>(&self, table: &str, rows: &[T], on_conflict: &str) -> Result<()> {
        self.client
            .post(self.table_url(table))
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// `PATCH /rest/v1/<table>` on the rows matching `query`, returning them as stored.
    pub async fn update<B, T>(&self, table: &str, query: &[(&str, &str)], body: &B) -> Result<Vec<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let rows = self
            .client
            .patch(self.table_url(table))
            .query(query)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(rows)
    }
}

fn header_value(value: &str) -> Result<header::HeaderValue> {
    header::HeaderValue::from_str(value)
        .map_err(|e| AdmissionsError::InvalidConfig(format!("invalid API key header: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_url_strips_trailing_slash() {
        let client = RestClient::new(&RestConfig::new("https://demo.example.co/", "anon")).unwrap();
        assert_eq!(
            client.table_url("leads"),
            "https://demo.example.co/rest/v1/leads"
        );
    }

    #[test]
    fn key_with_newline_is_rejected() {
        let result = RestClient::new(&RestConfig::new("https://demo.example.co", "bad\nkey"));
        assert!(matches!(result, Err(AdmissionsError::InvalidConfig(_))));
    }
}
