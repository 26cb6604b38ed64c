//! REST client for the Sadaqah backend.
//!
//! [`Backend`] is the seam the controller depends on; [`HttpBackend`] is the
//! reqwest implementation. Every call maps transport failures into
//! [`LiveError`] so callers never see reqwest types.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use sadaqah_protocol::{
    error_detail, ActivityEvent, CompleteResponse, CurrentKhatma, DailyWird, DuaMessage,
    JuzContent, JuzRequest, KhatmaHistory, NewDua, ProfileStats, ReminderList, ReserveResponse, Stats,
    TasbeehCounter, TasbeehIncrement,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::LiveConfig;
use crate::error::{LiveError, Result};

#[async_trait]
pub trait Backend: Send + Sync {
    async fn current_khatma(&self) -> Result<CurrentKhatma>;
    async fn stats(&self) -> Result<Stats>;
    async fn tasbeeh(&self) -> Result<Vec<TasbeehCounter>>;
    async fn activity_feed(&self, limit: u32) -> Result<Vec<ActivityEvent>>;
    async fn dua_wall(&self) -> Result<Vec<DuaMessage>>;
    async fn khatma_history(&self, limit: u32) -> Result<KhatmaHistory>;
    async fn daily_wird(&self) -> Result<DailyWird>;
    async fn profile_stats(&self, name: &str) -> Result<ProfileStats>;
    async fn reminders(&self, name: &str) -> Result<ReminderList>;
    async fn juz_content(&self, juz_number: u32) -> Result<JuzContent>;

    async fn reserve_juz(&self, request: &JuzRequest) -> Result<ReserveResponse>;
    async fn complete_juz(&self, request: &JuzRequest) -> Result<CompleteResponse>;
    async fn increment_tasbeeh(&self, request: &TasbeehIncrement) -> Result<TasbeehCounter>;
    async fn create_dua(&self, request: &NewDua) -> Result<DuaMessage>;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| LiveError::Network {
                endpoint: base_url.to_string(),
                details: err.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &LiveConfig) -> Result<Self> {
        Self::new(&config.api_base_url, config.request_timeout())
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, String)]) -> Result<T> {
        let request = self.client.get(self.url(endpoint)).query(query);
        self.send(endpoint, request).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        let request = self.client.post(self.url(endpoint)).json(body);
        self.send(endpoint, request).await
    }

    async fn send<T: DeserializeOwned>(&self, endpoint: &str, request: RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|err| transport_error(endpoint, err))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| transport_error(endpoint, err))?;
        debug!(endpoint, status = status.as_u16(), bytes = bytes.len(), "Backend response");

        if !status.is_success() {
            let detail = serde_json::from_slice::<serde_json::Value>(&bytes)
                .ok()
                .and_then(|body| error_detail(&body))
                .or_else(|| {
                    let text = String::from_utf8_lossy(&bytes).trim().to_string();
                    (!text.is_empty() && text.len() <= 300).then_some(text)
                });
            return Err(LiveError::Api {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                detail,
            });
        }

        serde_json::from_slice(&bytes).map_err(|err| LiveError::Decode {
            endpoint: endpoint.to_string(),
            details: err.to_string(),
        })
    }
}

fn transport_error(endpoint: &str, err: reqwest::Error) -> LiveError {
    if err.is_timeout() {
        LiveError::Timeout {
            endpoint: endpoint.to_string(),
        }
    } else if err.is_decode() {
        LiveError::Decode {
            endpoint: endpoint.to_string(),
            details: err.to_string(),
        }
    } else {
        LiveError::Network {
            endpoint: endpoint.to_string(),
            details: err.to_string(),
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn current_khatma(&self) -> Result<CurrentKhatma> {
        self.get("/current-khatma/", &[]).await
    }

    async fn stats(&self) -> Result<Stats> {
        self.get("/stats/", &[]).await
    }

    async fn tasbeeh(&self) -> Result<Vec<TasbeehCounter>> {
        self.get("/tasbeeh/", &[]).await
    }

    async fn activity_feed(&self, limit: u32) -> Result<Vec<ActivityEvent>> {
        self.get("/activity/", &[("limit", limit.to_string())]).await
    }

    async fn dua_wall(&self) -> Result<Vec<DuaMessage>> {
        self.get("/dua-wall/", &[]).await
    }

    async fn khatma_history(&self, limit: u32) -> Result<KhatmaHistory> {
        self.get("/khatma-history/", &[("limit", limit.to_string())])
            .await
    }

    async fn daily_wird(&self) -> Result<DailyWird> {
        self.get("/daily-wird/", &[]).await
    }

    async fn profile_stats(&self, name: &str) -> Result<ProfileStats> {
        self.get("/profile-stats/", &[("name", name.to_string())])
            .await
    }

    async fn reminders(&self, name: &str) -> Result<ReminderList> {
        self.get("/reminders/", &[("name", name.to_string())]).await
    }

    async fn juz_content(&self, juz_number: u32) -> Result<JuzContent> {
        self.get(&format!("/juz/{juz_number}/"), &[]).await
    }

    async fn reserve_juz(&self, request: &JuzRequest) -> Result<ReserveResponse> {
        self.post("/reserve/", request).await
    }

    async fn complete_juz(&self, request: &JuzRequest) -> Result<CompleteResponse> {
        self.post("/complete-juz/", request).await
    }

    async fn increment_tasbeeh(&self, request: &TasbeehIncrement) -> Result<TasbeehCounter> {
        self.post("/tasbeeh/", request).await
    }

    async fn create_dua(&self, request: &NewDua) -> Result<DuaMessage> {
        self.post("/dua-wall/", request).await
    }
}
