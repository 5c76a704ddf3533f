//! Repeater directory from repeatermap.de. The raw JSON is enriched at
//! parse time: band names are derived from the RX frequency, missing
//! coordinates are recovered from the Maidenhead locator (and vice
//! versa), and MMDVM hotspots are dropped.

use std::cmp::Ordering;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::command::parser::normalize_repeater_mode;
use crate::geo;

pub const DOWNLOAD_URL: &str = "https://www.repeatermap.de/api.php";

#[derive(Debug, Clone)]
pub struct Repeater {
    pub callsign: String,
    pub qth: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Normalized lowercase mode (fm, c4fm, dstar, dmr, ...).
    pub mode: Option<String>,
    pub rx_mhz: Option<f64>,
    pub tx_mhz: Option<f64>,
    pub band: Option<String>,
    pub elevation: Option<f64>,
    pub remarks: String,
    pub locator: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDirectory {
    #[serde(default)]
    relais: Vec<RawRepeater>,
}

#[derive(Debug, Deserialize)]
struct RawRepeater {
    #[serde(default)]
    call: Option<String>,
    #[serde(default)]
    qth: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    rx: Option<f64>,
    #[serde(default)]
    tx: Option<f64>,
    #[serde(default)]
    el: Option<f64>,
    #[serde(default)]
    remarks: Option<String>,
    #[serde(default)]
    locator: Option<String>,
}

#[derive(Debug, Default)]
pub struct RepeaterIndex {
    repeaters: Vec<Repeater>,
}

/// One search hit with its geometry relative to the requester.
#[derive(Debug, Clone)]
pub struct RepeaterHit<'a> {
    pub repeater: &'a Repeater,
    pub distance_km: f64,
    pub bearing_deg: f64,
}

impl RepeaterIndex {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(raw_json: &str) -> Result<Self> {
        let raw: RawDirectory =
            serde_json::from_str(raw_json).context("repeatermap JSON is malformed")?;

        let mut repeaters = Vec::new();
        for entry in raw.relais {
            let remarks = entry.remarks.unwrap_or_default();
            let lowered = remarks.to_lowercase();
            if lowered.contains("mmdvm") || lowered.contains("hotspot") {
                continue;
            }

            let mut latitude = entry.lat;
            let mut longitude = entry.lon;
            let mut locator = entry.locator.filter(|l| !l.is_empty());
            if latitude.is_none() || longitude.is_none() {
                if let Some(loc) = &locator {
                    if let Some((lat, lon)) = geo::maidenhead_to_latlon(loc) {
                        latitude = Some(lat);
                        longitude = Some(lon);
                    }
                }
            }
            let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
                continue;
            };
            if locator.is_none() {
                locator = Some(geo::latlon_to_maidenhead(latitude, longitude));
            }

            repeaters.push(Repeater {
                callsign: entry.call.unwrap_or_default().to_uppercase(),
                qth: entry.qth.unwrap_or_default(),
                latitude,
                longitude,
                mode: entry.mode.map(|m| normalize_repeater_mode(&m)),
                rx_mhz: entry.rx,
                tx_mhz: entry.tx,
                band: entry.rx.and_then(band_for_frequency).map(str::to_string),
                elevation: entry.el,
                remarks,
                locator,
            });
        }

        tracing::info!("Repeater index holds {} entries", repeaters.len());
        Ok(Self { repeaters })
    }

    /// Nearest repeaters matching the optional band/mode filters,
    /// ordered by distance.
    pub fn nearest(
        &self,
        lat: f64,
        lon: f64,
        band: Option<&str>,
        mode: Option<&str>,
        limit: usize,
    ) -> Vec<RepeaterHit<'_>> {
        let mode = mode.map(normalize_repeater_mode);
        let mut hits: Vec<RepeaterHit<'_>> = self
            .repeaters
            .iter()
            .filter(|r| match &band {
                Some(band) => r.band.as_deref() == Some(*band),
                None => true,
            })
            .filter(|r| match &mode {
                Some(mode) => r.mode.as_deref() == Some(mode.as_str()),
                None => true,
            })
            .map(|repeater| RepeaterHit {
                repeater,
                distance_km: geo::distance_km(lat, lon, repeater.latitude, repeater.longitude),
                bearing_deg: geo::bearing_deg(lat, lon, repeater.latitude, repeater.longitude),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(Ordering::Equal)
        });
        hits.truncate(limit.max(1));
        hits
    }

    pub fn len(&self) -> usize {
        self.repeaters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repeaters.is_empty()
    }
}

/// Guess the amateur band name for a frequency in MHz. ITU regional
/// differences are disregarded, exactly like the data source does.
pub fn band_for_frequency(mhz: f64) -> Option<&'static str> {
    const BANDS: &[(&str, f64, f64)] = &[
        ("2200m", 0.13, 0.14),
        ("630m", 0.47, 0.48),
        ("160m", 1.8, 2.0),
        ("80m", 3.5, 4.0),
        ("60m", 5.0, 5.9),
        ("40m", 7.0, 7.3),
        ("30m", 10.0, 10.2),
        ("20m", 14.0, 14.4),
        ("17m", 18.0, 18.2),
        ("15m", 21.0, 22.0),
        ("12m", 24.0, 25.0),
        ("10m", 28.0, 30.0),
        ("6m", 50.0, 54.0),
        ("4m", 70.0, 71.0),
        ("2m", 144.0, 148.0),
        ("1.25m", 219.0, 225.0),
        ("70cm", 420.0, 450.0),
        ("33cm", 900.0, 930.0),
        ("23cm", 1200.0, 1300.0),
        ("13cm", 2300.0, 2500.0),
        ("9cm", 3300.0, 3500.0),
        ("6cm", 5600.0, 5900.0),
        ("5cm", 5600.0, 6000.0),
        ("3cm", 10000.0, 10500.0),
        ("2cm", 24000.0, 24300.0),
        ("6mm", 47000.0, 47200.0),
        ("4mm", 76000.0, 78200.0),
        ("2.5mm", 122000.0, 123000.0),
        ("2mm", 134000.0, 141000.0),
        ("1.2mm", 241000.0, 250000.0),
    ];
    BANDS
        .iter()
        .find(|(_, from, to)| (*from..=*to).contains(&mhz))
        .map(|(name, _, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "relais": [
            {"call": "DB0XYZ", "qth": "Holzminden", "lat": 51.83, "lon": 9.45,
             "mode": "C4FM", "rx": 439.9875, "tx": 430.9875, "el": 120,
             "remarks": "", "locator": "JO41uu"},
            {"call": "DB0ABC", "qth": "Hoexter", "lat": 51.77, "lon": 9.38,
             "mode": "FM", "rx": 145.725, "tx": 145.125, "remarks": ""},
            {"call": "DB0HOT", "qth": "Somewhere", "lat": 51.8, "lon": 9.4,
             "mode": "DMR", "rx": 439.5, "tx": 431.9,
             "remarks": "MMDVM hotspot, please ignore"},
            {"call": "DB0LOC", "qth": "Gridonly", "mode": "DSTAR",
             "rx": 439.525, "tx": 430.925, "remarks": "", "locator": "JO41du"}
        ]
    }"#;

    #[test]
    fn parses_and_enriches() {
        let index = RepeaterIndex::parse(SAMPLE).unwrap();
        // The hotspot entry is dropped.
        assert_eq!(index.len(), 3);

        let hits = index.nearest(51.82, 9.46, None, None, 10);
        let first = hits.first().unwrap().repeater;
        assert_eq!(first.callsign, "DB0XYZ");
        assert_eq!(first.band.as_deref(), Some("70cm"));
        assert_eq!(first.mode.as_deref(), Some("c4fm"));
    }

    #[test]
    fn locator_recovers_missing_coordinates() {
        let index = RepeaterIndex::parse(SAMPLE).unwrap();
        let hits = index.nearest(51.8, 8.3, None, Some("dstar"), 1);
        assert_eq!(hits.len(), 1);
        let repeater = hits[0].repeater;
        assert_eq!(repeater.callsign, "DB0LOC");
        // JO41du decodes to roughly 51.8N 8.3E
        assert!((repeater.latitude - 51.8).abs() < 0.2);
        assert!((repeater.longitude - 8.3).abs() < 0.3);
    }

    #[test]
    fn band_and_mode_filters() {
        let index = RepeaterIndex::parse(SAMPLE).unwrap();
        let hits = index.nearest(51.82, 9.46, Some("2m"), None, 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].repeater.callsign, "DB0ABC");

        let hits = index.nearest(51.82, 9.46, Some("70cm"), Some("ysf"), 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].repeater.callsign, "DB0XYZ");

        let hits = index.nearest(51.82, 9.46, Some("23cm"), None, 5);
        assert!(hits.is_empty());
    }

    #[test]
    fn band_table() {
        assert_eq!(band_for_frequency(145.6), Some("2m"));
        assert_eq!(band_for_frequency(439.9875), Some("70cm"));
        assert_eq!(band_for_frequency(1296.0), Some("23cm"));
        assert_eq!(band_for_frequency(300.0), None);
    }
}
