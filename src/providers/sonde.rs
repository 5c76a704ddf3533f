//! Radiosonde landing prediction. The probe's current state comes from
//! the position-lookup provider (the probe beacons its telemetry as an
//! APRS comment); the descent trajectory is computed by the Tawhiri
//! prediction service.

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::Deserialize;

use super::aprsfi::Position;
use super::{ProviderError, ProviderResult};

const TAWHIRI_URL: &str = "https://api.v2.sondehub.org/tawhiri";

/// Default rates when the probe comment carries no climb value.
const DEFAULT_ASCENT_RATE: f64 = 5.0;
const DEFAULT_DESCENT_RATE: f64 = 5.0;
const DEFAULT_BURST_ALTITUDE: f64 = 30_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightPhase {
    Ascent,
    Descent,
}

#[derive(Debug, Clone)]
pub struct LandingPrediction {
    pub latitude: f64,
    pub longitude: f64,
    pub time: Option<DateTime<Utc>>,
    pub phase: FlightPhase,
}

/// Extract the climb rate (m/s) from a probe comment like
/// `Clb=-10.3m/s t=-42.1C ...`.
pub fn climb_from_comment(comment: &str) -> Option<f64> {
    let re = Regex::new(r"(?i)clb=(-?[0-9]+(?:\.[0-9]+)?)").unwrap();
    re.captures(comment)?.get(1)?.as_str().parse().ok()
}

/// Phase and burst altitude derived from climb and current altitude: a
/// falling probe has burst already, a climbing one gets its expected
/// burst pinned slightly above its current height once it passes the
/// default ceiling.
pub fn flight_profile(climb: Option<f64>, altitude: f64) -> (FlightPhase, f64, f64) {
    let climb = climb.unwrap_or(DEFAULT_ASCENT_RATE);
    if climb < 0.0 {
        (FlightPhase::Descent, altitude + 1.0, climb.abs())
    } else {
        let burst = if altitude >= DEFAULT_BURST_ALTITUDE {
            altitude + 500.0
        } else {
            DEFAULT_BURST_ALTITUDE
        };
        (FlightPhase::Ascent, burst, DEFAULT_DESCENT_RATE)
    }
}

#[derive(Debug, Deserialize)]
struct TawhiriResponse {
    #[serde(default)]
    prediction: Vec<TawhiriStage>,
}

#[derive(Debug, Deserialize)]
struct TawhiriStage {
    stage: String,
    #[serde(default)]
    trajectory: Vec<TawhiriPoint>,
}

#[derive(Debug, Deserialize)]
struct TawhiriPoint {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    datetime: Option<String>,
}

pub struct SondeClient {
    client: reqwest::Client,
}

impl SondeClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Landing prediction for a probe whose position was just looked up.
    pub async fn predict_landing(&self, probe: &Position) -> ProviderResult<LandingPrediction> {
        let altitude = probe.altitude_m.unwrap_or(0.0);
        let climb = probe.comment.as_deref().and_then(climb_from_comment);
        let (phase, burst_altitude, descent_rate) = flight_profile(climb, altitude);

        let launch_time = probe
            .last_heard
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let response = self
            .client
            .get(TAWHIRI_URL)
            .query(&[
                ("launch_latitude", probe.latitude.to_string()),
                // Tawhiri wants longitudes in 0..360.
                ("launch_longitude", (probe.longitude.rem_euclid(360.0)).to_string()),
                ("launch_altitude", altitude.to_string()),
                ("launch_datetime", launch_time),
                ("ascent_rate", DEFAULT_ASCENT_RATE.to_string()),
                ("burst_altitude", burst_altitude.to_string()),
                ("descent_rate", descent_rate.to_string()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "tawhiri returned {}",
                response.status()
            )));
        }
        let body: TawhiriResponse = response.json().await?;

        let landing = body
            .prediction
            .iter()
            .find(|s| s.stage == "descent")
            .and_then(|s| s.trajectory.last())
            .or_else(|| {
                body.prediction
                    .last()
                    .and_then(|s| s.trajectory.last())
            })
            .ok_or(ProviderError::Empty)?;

        let mut longitude = landing.longitude;
        if longitude > 180.0 {
            longitude -= 360.0;
        }

        Ok(LandingPrediction {
            latitude: landing.latitude,
            longitude,
            time: landing
                .datetime
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc)),
            phase,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn climb_rate_extraction() {
        assert_eq!(
            climb_from_comment("Clb=-10.3m/s t=-42.1C h=78.2% 404.002MHz"),
            Some(-10.3)
        );
        assert_eq!(climb_from_comment("clb=4.8m/s"), Some(4.8));
        assert_eq!(climb_from_comment("no telemetry here"), None);
    }

    #[test]
    fn descending_probe_bursts_immediately() {
        let (phase, burst, descent) = flight_profile(Some(-12.0), 8_000.0);
        assert_eq!(phase, FlightPhase::Descent);
        assert!((burst - 8_001.0).abs() < f64::EPSILON);
        assert!((descent - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ascending_probe_keeps_default_ceiling() {
        let (phase, burst, _) = flight_profile(Some(4.0), 12_000.0);
        assert_eq!(phase, FlightPhase::Ascent);
        assert!((burst - 30_000.0).abs() < f64::EPSILON);

        // Already above the default ceiling: pin burst just above.
        let (_, burst, _) = flight_profile(Some(4.0), 31_000.0);
        assert!((burst - 31_500.0).abs() < f64::EPSILON);
    }
}
