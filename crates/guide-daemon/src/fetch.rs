//! Catalog fetch collaborator: a black-box source of per-channel program
//! catalogs, delivering exactly one success or failure per call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guide_proto::catalog::{Airing, AiringFlag, Catalog, Channel};
use guide_proto::config::CatalogConfig;
use guide_proto::error::GuideError;
use serde::Deserialize;
use tracing::debug;

#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn fetch_catalog(
        &self,
        channel: Channel,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Catalog, GuideError>;

    /// Connectivity precondition.  When false the engine surfaces
    /// `NoNetwork` immediately instead of issuing fetches.
    fn network_available(&self) -> bool {
        true
    }
}

/// Wire shape of one airing in the schedule API response.
#[derive(Debug, Deserialize)]
struct WireAiring {
    content_id: String,
    title: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    #[serde(default)]
    image_url_template: String,
    #[serde(default)]
    playback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireSchedule {
    airings: Vec<WireAiring>,
}

impl From<WireAiring> for Airing {
    fn from(w: WireAiring) -> Self {
        Airing {
            content_id: w.content_id,
            title: w.title,
            start_time: w.start_time,
            end_time: w.end_time,
            image_url_template: w.image_url_template,
            playback_url: w.playback_url,
            flag: AiringFlag::None,
        }
    }
}

pub fn decode_schedule(channel: Channel, body: &str) -> Result<Catalog, GuideError> {
    let wire: WireSchedule =
        serde_json::from_str(body).map_err(|e| GuideError::CatalogFetch {
            channel,
            message: format!("malformed schedule payload: {e}"),
        })?;
    Ok(Catalog::new(
        channel,
        wire.airings.into_iter().map(Airing::from).collect(),
    ))
}

pub struct HttpCatalogClient {
    http: reqwest::Client,
    config: CatalogConfig,
}

impl HttpCatalogClient {
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn fetch_catalog(
        &self,
        channel: Channel,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Catalog, GuideError> {
        let url = format!(
            "{}/schedule/{}",
            self.config.base_url.trim_end_matches('/'),
            channel.slug()
        );
        debug!("fetching catalog: {} [{} .. {}]", url, start, end);

        let response = self
            .http
            .get(&url)
            .query(&[("start", start.to_rfc3339()), ("end", end.to_rfc3339())])
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    GuideError::NoNetwork
                } else {
                    GuideError::CatalogFetch {
                        channel,
                        message: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            return Err(GuideError::CatalogFetch {
                channel,
                message: format!("HTTP {}", response.status()),
            });
        }

        let body = response.text().await.map_err(|e| GuideError::CatalogFetch {
            channel,
            message: e.to_string(),
        })?;
        decode_schedule(channel, &body)
    }
}
