// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of VoltION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use crate::errors::{TeslaError, TeslaResult};
use crate::types::{CommandResponse, EnergySite, LiveStatus, OwnerApiResponse, SiteInfo};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use voltion_types::OperationMode;

/// Production Owner API endpoint
pub const OWNER_API_BASE: &str = "https://owner-api.teslamotors.com";

/// Tesla Owner API REST client
///
/// Token acquisition and refresh live outside this crate; the client is
/// handed a ready-to-use access token.
#[derive(Clone)]
pub struct TeslaClient {
    base_url: String,
    token: String,
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl std::fmt::Debug for TeslaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeslaClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TeslaClient {
    /// Create a new client with a custom base URL (tests, proxies)
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> TeslaResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("TeslaApp/4.10.0")
            .build()
            .map_err(|e| TeslaError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into(),
            token: token.into(),
            client,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        })
    }

    /// Create a client against the production Owner API
    pub fn owner_api(token: impl Into<String>) -> TeslaResult<Self> {
        info!("Initializing Tesla client against the Owner API");
        Self::new(OWNER_API_BASE, token)
    }

    /// Create a client from the `TESLA_ACCESS_TOKEN` environment variable
    pub fn from_env() -> TeslaResult<Self> {
        let token = std::env::var("TESLA_ACCESS_TOKEN").map_err(|_| {
            TeslaError::ConfigError("TESLA_ACCESS_TOKEN environment variable not set".to_string())
        })?;
        Self::owner_api(token)
    }

    /// Set custom retry configuration
    pub fn with_retry_config(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Discover the first battery product on the account
    pub async fn find_battery_site(&self) -> TeslaResult<EnergySite> {
        let products: OwnerApiResponse<Vec<Value>> = self.get_json("api/1/products").await?;

        let battery = products
            .response
            .into_iter()
            .find(|p| p.get("resource_type").and_then(Value::as_str) == Some("battery"))
            .ok_or(TeslaError::NoBatterySite)?;

        let site: EnergySite = serde_json::from_value(battery)?;
        info!(
            "Found battery site {} ({})",
            site.energy_site_id,
            site.site_name.as_deref().unwrap_or("unnamed")
        );
        Ok(site)
    }

    /// Get site configuration (mode, reserve, grid interaction switches)
    pub async fn site_info(&self, site_id: u64) -> TeslaResult<SiteInfo> {
        let info: OwnerApiResponse<SiteInfo> = self
            .get_json(&format!("api/1/energy_sites/{}/site_info", site_id))
            .await?;
        Ok(info.response)
    }

    /// Get live site status (state of charge)
    pub async fn live_status(&self, site_id: u64) -> TeslaResult<LiveStatus> {
        let status: OwnerApiResponse<LiveStatus> = self
            .get_json(&format!("api/1/energy_sites/{}/live_status", site_id))
            .await?;
        debug!(
            "Live status: {:.2}% charged at {:?}",
            status.response.percentage_charged, status.response.timestamp
        );
        Ok(status.response)
    }

    /// Set the site operating mode
    pub async fn set_operation_mode(
        &self,
        site_id: u64,
        mode: OperationMode,
    ) -> TeslaResult<Option<String>> {
        info!("Setting operation mode: {}", mode.api_value());
        let ack: OwnerApiResponse<CommandResponse> = self
            .post_json(
                &format!("api/1/energy_sites/{}/operation", site_id),
                json!({ "default_real_mode": mode.api_value() }),
            )
            .await?;
        Ok(ack.response.message)
    }

    /// Set the backup reserve percentage
    pub async fn set_backup_reserve(
        &self,
        site_id: u64,
        percent: f32,
    ) -> TeslaResult<Option<String>> {
        info!("Setting backup reserve: {:.0}%", percent);
        let ack: OwnerApiResponse<CommandResponse> = self
            .post_json(
                &format!("api/1/energy_sites/{}/backup", site_id),
                json!({ "backup_reserve_percent": percent.round() as i64 }),
            )
            .await?;
        Ok(ack.response.message)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> TeslaResult<T> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {}", path);

        let response = self
            .retry_request(|| async { self.client.get(&url).bearer_auth(&self.token).send().await })
            .await?;

        Self::decode(path, response).await
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: Value) -> TeslaResult<T> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("POST {}", path);

        let response = self
            .retry_request(|| async {
                self.client
                    .post(&url)
                    .bearer_auth(&self.token)
                    .json(&body)
                    .send()
                    .await
            })
            .await?;

        Self::decode(path, response).await
    }

    async fn decode<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> TeslaResult<T> {
        match response.status() {
            StatusCode::OK => Ok(response.json::<T>().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("Authentication failed for {}", path);
                Err(TeslaError::AuthenticationFailed)
            }
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("Rate limited on {}", path);
                Err(TeslaError::RateLimited)
            }
            status => {
                let message = response.text().await.unwrap_or_default();
                error!("Owner API error on {}: {} {}", path, status, message);
                Err(TeslaError::ApiError {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    /// Retry a request with exponential backoff
    async fn retry_request<F, Fut>(&self, mut request_fn: F) -> TeslaResult<reqwest::Response>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut attempts = 0;
        let mut delay = self.retry_delay;

        loop {
            attempts += 1;
            match request_fn().await {
                Ok(response) => return Ok(response),
                Err(e) if attempts >= self.max_retries => {
                    error!("Request failed after {} attempts: {}", attempts, e);
                    if e.is_timeout() {
                        return Err(TeslaError::Timeout);
                    }
                    return Err(TeslaError::HttpError(e));
                }
                Err(e) => {
                    warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempts, self.max_retries, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2; // Exponential backoff
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn client_for(server: &Server) -> TeslaClient {
        TeslaClient::new(server.url(), "test_token").unwrap()
    }

    #[tokio::test]
    async fn test_find_battery_site_filters_vehicles() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/1/products")
            .match_header("authorization", "Bearer test_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "response": [
                        { "id": 1, "vin": "5YJ3...", "display_name": "Car" },
                        {
                            "energy_site_id": 123456,
                            "resource_type": "battery",
                            "site_name": "Home"
                        }
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let site = client_for(&server).find_battery_site().await.unwrap();
        assert_eq!(site.energy_site_id, 123456);
        assert_eq!(site.site_name.as_deref(), Some("Home"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_find_battery_site_none_on_account() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/1/products")
            .with_status(200)
            .with_body(json!({ "response": [] }).to_string())
            .create_async()
            .await;

        let result = client_for(&server).find_battery_site().await;
        assert!(matches!(result, Err(TeslaError::NoBatterySite)));
    }

    #[tokio::test]
    async fn test_live_status_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/1/energy_sites/123/live_status")
            .with_status(200)
            .with_body(
                json!({
                    "response": {
                        "percentage_charged": 86.25,
                        "timestamp": "2025-03-10T09:00:00Z"
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let status = client_for(&server).live_status(123).await.unwrap();
        assert_eq!(status.percentage_charged, 86.25);
        assert!(status.timestamp.is_some());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/1/energy_sites/123/live_status")
            .with_status(401)
            .create_async()
            .await;

        let result = client_for(&server).live_status(123).await;
        assert!(matches!(result, Err(TeslaError::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_rate_limited() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/1/energy_sites/123/live_status")
            .with_status(429)
            .create_async()
            .await;

        let result = client_for(&server).live_status(123).await;
        assert!(matches!(result, Err(TeslaError::RateLimited)));
    }

    #[tokio::test]
    async fn test_set_operation_mode_posts_wire_value() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/1/energy_sites/123/operation")
            .match_body(Matcher::Json(json!({ "default_real_mode": "backup" })))
            .with_status(200)
            .with_body(json!({ "response": { "message": "Updated" } }).to_string())
            .create_async()
            .await;

        let ack = client_for(&server)
            .set_operation_mode(123, OperationMode::Backup)
            .await
            .unwrap();
        assert_eq!(ack.as_deref(), Some("Updated"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_backup_reserve_rounds_to_integer() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/1/energy_sites/123/backup")
            .match_body(Matcher::Json(json!({ "backup_reserve_percent": 80 })))
            .with_status(200)
            .with_body(json!({ "response": { "message": "Updated" } }).to_string())
            .create_async()
            .await;

        client_for(&server)
            .set_backup_reserve(123, 80.4)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_site_info_parses_components() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/1/energy_sites/123/site_info")
            .with_status(200)
            .with_body(
                json!({
                    "response": {
                        "site_name": "Home",
                        "backup_reserve_percent": 35.0,
                        "default_real_mode": "self_consumption",
                        "components": {
                            "customer_preferred_export_rule": "battery_ok",
                            "disallow_charge_from_grid_with_solar_installed": false
                        }
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let info = client_for(&server).site_info(123).await.unwrap();
        assert_eq!(info.default_real_mode.as_deref(), Some("self_consumption"));
        assert_eq!(
            info.components.customer_preferred_export_rule.as_deref(),
            Some("battery_ok")
        );
        assert!(!info.components.disallow_charge_from_grid_with_solar_installed);
    }
}
