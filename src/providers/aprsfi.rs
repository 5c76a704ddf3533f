//! Position lookup for a callsign via the aprs.fi API.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use super::{ProviderError, ProviderResult};

#[derive(Debug, Clone)]
pub struct Position {
    pub callsign: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: Option<f64>,
    pub last_heard: Option<DateTime<Utc>>,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    result: String,
    #[serde(default)]
    entries: Vec<ApiEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiEntry {
    name: String,
    lat: String,
    lng: String,
    #[serde(default)]
    altitude: Option<f64>,
    #[serde(default)]
    lasttime: Option<String>,
    #[serde(default)]
    comment: Option<String>,
}

pub struct AprsFiClient {
    client: reqwest::Client,
    api_key: String,
}

impl AprsFiClient {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }

    /// Last known position of the callsign. Falls back to the base call
    /// (SSID stripped) when the exact identifier is unknown.
    pub async fn position_with_fallback(&self, callsign: &str) -> ProviderResult<Position> {
        match self.position(callsign).await {
            Err(ProviderError::NotFound) => {
                let base = callsign.split('-').next().unwrap_or(callsign);
                if base != callsign {
                    self.position(base).await
                } else {
                    Err(ProviderError::NotFound)
                }
            }
            other => other,
        }
    }

    pub async fn position(&self, callsign: &str) -> ProviderResult<Position> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Disabled);
        }
        let url = format!(
            "https://api.aprs.fi/api/get?name={}&what=loc&apikey={}&format=json",
            callsign, self.api_key
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "aprs.fi returned {}",
                response.status()
            )));
        }
        let body: ApiResponse = response.json().await?;
        if body.result != "ok" {
            return Err(ProviderError::Unavailable(format!(
                "aprs.fi result '{}'",
                body.result
            )));
        }
        let entry = body.entries.into_iter().next().ok_or(ProviderError::NotFound)?;

        let latitude: f64 = entry
            .lat
            .parse()
            .map_err(|_| ProviderError::Internal("bad latitude from aprs.fi".into()))?;
        let longitude: f64 = entry
            .lng
            .parse()
            .map_err(|_| ProviderError::Internal("bad longitude from aprs.fi".into()))?;
        let last_heard = entry
            .lasttime
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        Ok(Position {
            callsign: entry.name.to_uppercase(),
            latitude,
            longitude,
            altitude_m: entry.altitude,
            last_heard,
            comment: entry.comment,
        })
    }
}
