//! Airport catalog built from the NOAA/UCAR `stations.txt` fixed-width
//! table: ICAO and IATA codes, coordinates and whether the station
//! publishes METAR reports.

use std::collections::HashMap;
use std::path::Path;

use crate::geo;

pub const DOWNLOAD_URL: &str = "https://weather.ral.ucar.edu/surface/stations.txt";

#[derive(Debug, thiserror::Error)]
pub enum AirportError {
    #[error("airport catalog not found at {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct Airport {
    pub icao: String,
    pub iata: Option<String>,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub metar_capable: bool,
}

#[derive(Debug, Default)]
pub struct AirportIndex {
    by_icao: HashMap<String, Airport>,
    iata_to_icao: HashMap<String, String>,
}

impl AirportIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, AirportError> {
        if !path.exists() {
            return Err(AirportError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_content(&content))
    }

    pub fn from_content(content: &str) -> Self {
        let mut index = Self::new();
        for line in content.lines() {
            if let Some(airport) = parse_station_line(line) {
                if let Some(iata) = &airport.iata {
                    index.iata_to_icao.insert(iata.clone(), airport.icao.clone());
                }
                index.by_icao.insert(airport.icao.clone(), airport);
            }
        }
        tracing::info!("Airport index holds {} stations", index.by_icao.len());
        index
    }

    pub fn get(&self, icao: &str) -> Option<&Airport> {
        self.by_icao.get(&icao.to_uppercase())
    }

    pub fn by_iata(&self, iata: &str) -> Option<&Airport> {
        self.iata_to_icao
            .get(&iata.to_uppercase())
            .and_then(|icao| self.by_icao.get(icao))
    }

    /// Nearest METAR-capable station to the coordinates.
    pub fn nearest_metar(&self, lat: f64, lon: f64) -> Option<&Airport> {
        self.by_icao
            .values()
            .filter(|airport| airport.metar_capable)
            .min_by(|a, b| {
                let da = geo::distance_km(lat, lon, a.latitude, a.longitude);
                let db = geo::distance_km(lat, lon, b.latitude, b.longitude);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    pub fn len(&self) -> usize {
        self.by_icao.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_icao.is_empty()
    }
}

/// Parse one fixed-width station line. Data rows are at least 63 chars,
/// never start with `!` and are not the repeating column header.
fn parse_station_line(line: &str) -> Option<Airport> {
    let line = line.trim_end();
    if line.len() < 63 || line.starts_with('!') || line.starts_with("CD  STATION") {
        return None;
    }

    let icao = line.get(20..24)?.trim();
    if icao.is_empty() {
        return None;
    }
    let iata = line.get(26..29)?.trim();
    let name = line.get(3..19)?.trim();

    let lat_deg: f64 = line.get(39..41)?.trim().parse().ok()?;
    let lat_min: f64 = line.get(42..44)?.trim().parse().ok()?;
    let lat_hemisphere = line.get(44..45)?;
    let lon_deg: f64 = line.get(47..50)?.trim().parse().ok()?;
    let lon_min: f64 = line.get(51..53)?.trim().parse().ok()?;
    let lon_hemisphere = line.get(53..54)?;

    let mut latitude = lat_deg + lat_min / 60.0;
    if lat_hemisphere == "S" {
        latitude = -latitude;
    }
    let mut longitude = lon_deg + lon_min / 60.0;
    if lon_hemisphere == "W" {
        longitude = -longitude;
    }

    let metar_flag = line.get(62..63).unwrap_or(" ");

    Some(Airport {
        icao: icao.to_uppercase(),
        iata: if iata.is_empty() {
            None
        } else {
            Some(iata.to_uppercase())
        },
        name: name.to_string(),
        latitude,
        longitude,
        metar_capable: metar_flag == "X" || metar_flag == "Z",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Columns: name 3..19, ICAO 20..24, IATA 26..29, lat 39..45,
    // lon 47..54, METAR flag at 62.
    const SAMPLE: &str = "\
!comment line that must be skipped
CD  STATION         ICAO  IATA   SYNOP   LAT     LON    ELEV  M
HE FRANKFURT MAIN   EDDF  FRA          50 02N  008 34E        X 5
HE SMALLFIELD       EDXX               51 49N  009 27E          5
short line
";

    #[test]
    fn parses_stations_and_metar_flag() {
        let index = AirportIndex::from_content(SAMPLE);
        assert_eq!(index.len(), 2);

        let eddf = index.get("eddf").unwrap();
        assert_eq!(eddf.iata.as_deref(), Some("FRA"));
        assert_eq!(eddf.name, "FRANKFURT MAIN");
        assert!(eddf.metar_capable);
        assert!((eddf.latitude - 50.0333).abs() < 0.001);
        assert!((eddf.longitude - 8.5667).abs() < 0.001);

        let edxx = index.get("EDXX").unwrap();
        assert!(edxx.iata.is_none());
        assert!(!edxx.metar_capable);
    }

    #[test]
    fn iata_lookup_maps_to_icao() {
        let index = AirportIndex::from_content(SAMPLE);
        assert_eq!(index.by_iata("fra").unwrap().icao, "EDDF");
        assert!(index.by_iata("xxx").is_none());
    }

    #[test]
    fn nearest_metar_skips_non_metar_stations() {
        let index = AirportIndex::from_content(SAMPLE);
        // EDXX is closer to its own coordinates but not METAR capable.
        let nearest = index.nearest_metar(51.81, 9.45).unwrap();
        assert_eq!(nearest.icao, "EDDF");
    }
}
