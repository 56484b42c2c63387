//! Batched IP geolocation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{FetchConfig, GeoConfig};
use crate::error::{CollectorError, Result};
use crate::models::GeoInfo;

/// Resolves addresses to locations. Addresses missing from the returned map
/// are of unknown location.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, ips: &[String]) -> HashMap<String, GeoInfo>;
}

#[derive(Debug, Serialize)]
struct GeoQuery<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeoAnswer {
    #[serde(default)]
    status: String,
    #[serde(default)]
    query: String,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
    #[serde(default)]
    country: String,
    #[serde(default)]
    country_code: String,
    #[serde(default)]
    city: String,
}

/// Client for an ip-api.com style batch endpoint.
pub struct IpApiGeolocator {
    http: reqwest::Client,
    url: String,
    batch_size: usize,
    pace: Duration,
}

impl IpApiGeolocator {
    pub fn new(geo: &GeoConfig, fetch: &FetchConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(fetch.request_timeout())
            .build()?;
        Ok(Self {
            http,
            url: geo.url.clone(),
            batch_size: geo.batch_size.max(1),
            pace: Duration::from_millis(geo.pace_ms),
        })
    }

    async fn lookup(&self, batch: &[String]) -> Result<Vec<GeoAnswer>> {
        let body: Vec<GeoQuery> = batch.iter().map(|ip| GeoQuery { query: ip }).collect();
        let response = self.http.post(&self.url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectorError::Http {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| CollectorError::Decode(format!("geo batch: {}", e)))
    }
}

#[async_trait]
impl GeoResolver for IpApiGeolocator {
    async fn resolve(&self, ips: &[String]) -> HashMap<String, GeoInfo> {
        let mut located = HashMap::new();
        let batches = ips.chunks(self.batch_size).count();

        for (index, batch) in ips.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.pace.is_zero() {
                tokio::time::sleep(self.pace).await;
            }
            match self.lookup(batch).await {
                Ok(answers) => {
                    for answer in answers.into_iter().filter(|a| a.status == "success") {
                        located.insert(
                            answer.query,
                            GeoInfo {
                                lat: answer.lat,
                                lng: answer.lon,
                                country: answer.country,
                                country_code: answer.country_code,
                                city: answer.city,
                            },
                        );
                    }
                    debug!("geo batch {}/{} done", index + 1, batches);
                }
                Err(e) => warn!("Geo batch {}/{} failed: {}", index + 1, batches, e),
            }
        }

        info!("Geolocated {}/{} addresses", located.len(), ips.len());
        located
    }
}
