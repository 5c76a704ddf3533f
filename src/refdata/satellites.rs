//! Satellite reference data: the Celestrak amateur TLE set plus the
//! community frequency table (CSV). Names are normalized to the dashed
//! uppercase form; `ZARYA` folds into `ISS`. Lookup tries exact keys
//! first and falls back to Jaro-Winkler fuzzy matching.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use strsim::jaro_winkler;

use crate::command::parser::normalize_satellite_name;

pub const TLE_URL: &str = "https://celestrak.org/NORAD/elements/gp.php?GROUP=amateur&FORMAT=tle";
pub const FREQUENCY_URL: &str =
    "https://raw.githubusercontent.com/palewire/amateur-satellite-database/main/data/satellites.csv";

/// Minimum similarity for a fuzzy name hit.
const FUZZY_THRESHOLD: f64 = 0.85;

#[derive(Debug, Clone, Default)]
pub struct Transponder {
    pub uplink: Option<String>,
    pub downlink: Option<String>,
    pub beacon: Option<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Satellite {
    /// Normalized lookup key, e.g. `AO-91`.
    pub name: String,
    /// Name as it appeared in the TLE set.
    pub display_name: String,
    pub tle_line1: String,
    pub tle_line2: String,
    pub norad_id: Option<u64>,
    pub transponders: Vec<Transponder>,
}

#[derive(Debug, Deserialize)]
struct FrequencyCsvRow {
    #[serde(default)]
    name: String,
    #[serde(default)]
    norad_id: Option<u64>,
    #[serde(default)]
    uplink: Option<String>,
    #[serde(default)]
    downlink: Option<String>,
    #[serde(default)]
    beacon: Option<String>,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Debug, Default)]
pub struct SatelliteIndex {
    satellites: HashMap<String, Satellite>,
}

impl SatelliteIndex {
    pub fn load(tle_path: &Path, frequency_path: &Path) -> Result<Self> {
        let tle_content = std::fs::read_to_string(tle_path)
            .with_context(|| format!("cannot read {}", tle_path.display()))?;
        let mut index = Self::from_tle(&tle_content);
        if let Ok(csv_content) = std::fs::read_to_string(frequency_path) {
            index.attach_frequencies(&csv_content);
        }
        Ok(index)
    }

    /// Parse the 3-line TLE groups. The key is the parenthesized short
    /// name where present (`FOX-1D (AO-92)` keys as `AO-92`), else the
    /// dash-joined full name.
    pub fn from_tle(content: &str) -> Self {
        let mut satellites = HashMap::new();
        let lines: Vec<&str> = content.lines().map(str::trim_end).collect();

        let mut i = 0;
        loop {
            let Some(chunk) = lines.get(i..i + 3) else {
                break;
            };
            let (name_line, line1, line2) = (chunk[0], chunk[1], chunk[2]);
            if !line1.starts_with("1 ") || !line2.starts_with("2 ") {
                i += 1;
                continue;
            }
            let display_name = name_line.trim().to_string();
            let key = match (display_name.rfind('('), display_name.rfind(')')) {
                (Some(open), Some(close)) if open < close => {
                    normalize_satellite_name(&display_name[open + 1..close])
                }
                _ => normalize_satellite_name(&display_name),
            };
            let norad_id = line1
                .get(2..7)
                .and_then(|s| s.trim().parse::<u64>().ok());

            satellites.insert(
                key.clone(),
                Satellite {
                    name: key,
                    display_name,
                    tle_line1: line1.to_string(),
                    tle_line2: line2.to_string(),
                    norad_id,
                    transponders: Vec::new(),
                },
            );
            i += 3;
        }

        tracing::info!("Satellite index holds {} TLE sets", satellites.len());
        Self { satellites }
    }

    /// Merge the frequency table into the TLE index, matching by NORAD
    /// id first and by normalized name second.
    pub fn attach_frequencies(&mut self, csv_content: &str) {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(csv_content.as_bytes());

        let mut attached = 0usize;
        for row in reader.deserialize::<FrequencyCsvRow>() {
            let Ok(row) = row else { continue };
            let transponder = Transponder {
                uplink: row.uplink.filter(|s| !s.is_empty()),
                downlink: row.downlink.filter(|s| !s.is_empty()),
                beacon: row.beacon.filter(|s| !s.is_empty()),
                mode: row.mode.filter(|s| !s.is_empty()),
            };
            if transponder.uplink.is_none()
                && transponder.downlink.is_none()
                && transponder.beacon.is_none()
            {
                continue;
            }

            let key = self
                .satellites
                .values()
                .find(|s| row.norad_id.is_some() && s.norad_id == row.norad_id)
                .map(|s| s.name.clone())
                .or_else(|| {
                    let name_key = normalize_satellite_name(&row.name);
                    self.satellites.contains_key(&name_key).then_some(name_key)
                });
            if let Some(key) = key {
                if let Some(satellite) = self.satellites.get_mut(&key) {
                    satellite.transponders.push(transponder);
                    attached += 1;
                }
            }
        }
        tracing::debug!("Attached {} transponder rows", attached);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.satellites
            .contains_key(&normalize_satellite_name(name))
    }

    /// Exact lookup, then fuzzy fallback over keys and display names.
    pub fn find(&self, name: &str) -> Option<&Satellite> {
        let key = normalize_satellite_name(name);
        if let Some(satellite) = self.satellites.get(&key) {
            return Some(satellite);
        }

        self.satellites
            .values()
            .map(|satellite| {
                let score = jaro_winkler(&key, &satellite.name).max(jaro_winkler(
                    &key,
                    &normalize_satellite_name(&satellite.display_name),
                ));
                (score, satellite)
            })
            .filter(|(score, _)| *score >= FUZZY_THRESHOLD)
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(_, satellite)| satellite)
    }

    pub fn len(&self) -> usize {
        self.satellites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.satellites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TLE: &str = "\
ISS (ZARYA)
1 25544U 98067A   21016.23437500  .00001000  00000-0  26441-4 0  9990
2 25544  51.6440 211.3340 0002340  13.0000 100.0000 15.49000000 12345
FOX-1D (AO-92)
1 43137U 18004AC  21016.50000000  .00000500  00000-0  33000-4 0  9991
2 43137  97.7000  80.0000 0010000 200.0000 160.0000 14.80000000 23456
";

    const SAMPLE_CSV: &str = "\
name,norad_id,uplink,downlink,beacon,mode
AO-92,43137,435.350,145.880,,FM
ISS,25544,145.990,145.800,,FM APRS
Unknown Sat,99999,144.000,430.000,,FM
";

    #[test]
    fn tle_names_are_normalized() {
        let index = SatelliteIndex::from_tle(SAMPLE_TLE);
        assert_eq!(index.len(), 2);
        // The parenthesized short name is the key; ZARYA folds to ISS.
        assert!(index.contains("iss"));
        assert!(index.contains("zarya"));
        assert!(index.contains("AO-92"));
        assert!(!index.contains("AO-91"));
    }

    #[test]
    fn frequencies_attach_by_norad_id() {
        let mut index = SatelliteIndex::from_tle(SAMPLE_TLE);
        index.attach_frequencies(SAMPLE_CSV);

        let ao92 = index.find("ao-92").unwrap();
        assert_eq!(ao92.transponders.len(), 1);
        assert_eq!(ao92.transponders[0].uplink.as_deref(), Some("435.350"));

        let iss = index.find("iss").unwrap();
        assert_eq!(iss.transponders.len(), 1);
    }

    #[test]
    fn fuzzy_lookup_recovers_small_typos() {
        let index = SatelliteIndex::from_tle(SAMPLE_TLE);
        assert!(index.find("ao92").is_some());
        assert!(index.find("completely-wrong").is_none());
    }

    #[test]
    fn multi_word_names_are_dash_joined() {
        assert_eq!(normalize_satellite_name("fox 1d"), "FOX-1D");
        assert_eq!(normalize_satellite_name("zarya"), "ISS");
    }
}
