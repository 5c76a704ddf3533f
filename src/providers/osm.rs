//! "Nearest <category>" search via Nominatim special phrases, bounded
//! to a viewbox around the requester's position.

use serde::Deserialize;

use crate::geo;
use crate::response::Response;

use super::{ProviderError, ProviderResult};

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
/// Half-width of the search viewbox in degrees (roughly 20 km).
const SEARCH_SPAN_DEG: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct OsmHit {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    display_name: String,
    lat: String,
    lon: String,
}

pub struct OsmClient {
    client: reqwest::Client,
}

impl OsmClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn nearby(
        &self,
        category: &str,
        lat: f64,
        lon: f64,
        limit: u8,
    ) -> ProviderResult<Vec<OsmHit>> {
        let viewbox = format!(
            "{},{},{},{}",
            lon - SEARCH_SPAN_DEG,
            lat + SEARCH_SPAN_DEG,
            lon + SEARCH_SPAN_DEG,
            lat - SEARCH_SPAN_DEG
        );
        let response = self
            .client
            .get(NOMINATIM_URL)
            .query(&[
                ("format", "json".to_string()),
                ("q", format!("[{}]", category)),
                ("viewbox", viewbox),
                ("bounded", "1".to_string()),
                ("limit", limit.max(1).to_string()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "nominatim returned {}",
                response.status()
            )));
        }
        let results: Vec<SearchResult> = response.json().await?;

        let mut hits: Vec<OsmHit> = results
            .into_iter()
            .filter_map(|r| {
                let latitude = r.lat.parse().ok()?;
                let longitude = r.lon.parse().ok()?;
                Some(OsmHit {
                    // The display name is a comma-joined address; the
                    // leading segment is the POI name.
                    name: r
                        .display_name
                        .split(',')
                        .next()
                        .unwrap_or(&r.display_name)
                        .trim()
                        .to_string(),
                    latitude,
                    longitude,
                })
            })
            .collect();
        if hits.is_empty() {
            return Err(ProviderError::Empty);
        }
        hits.sort_by(|a, b| {
            let da = geo::distance_km(lat, lon, a.latitude, a.longitude);
            let db = geo::distance_km(lat, lon, b.latitude, b.longitude);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(hits)
    }
}

/// Render hits as `#1 <name> <dist> km <brg> deg <dir> #2 …`; distance
/// and bearing relate to the requester's position.
pub fn format_hits(hits: &[OsmHit], category: &str, lat: f64, lon: f64, imperial: bool) -> Response {
    let mut response = Response::new();
    response.push(format!("Nearest {}", category));
    for (n, hit) in hits.iter().enumerate() {
        let distance_km = geo::distance_km(lat, lon, hit.latitude, hit.longitude);
        let bearing = geo::bearing_deg(lat, lon, hit.latitude, hit.longitude);
        let (distance, uom) = if imperial {
            (geo::km_to_miles(distance_km), "mi")
        } else {
            (distance_km, "km")
        };
        if hits.len() > 1 {
            response.push(format!("#{}", n + 1));
        }
        response.push(hit.name.clone());
        response.push(format!("{:.1} {}", distance, uom));
        response.push(format!(
            "{} deg {}",
            bearing.round() as i64,
            geo::direction_for(bearing)
        ));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment;

    #[test]
    fn hits_are_numbered_when_multiple() {
        let hits = vec![
            OsmHit {
                name: "Revier Mitte".to_string(),
                latitude: 52.53,
                longitude: 13.41,
            },
            OsmHit {
                name: "Revier Nord".to_string(),
                latitude: 52.55,
                longitude: 13.38,
            },
        ];
        let fragments =
            fragment::render(&format_hits(&hits, "police", 52.52, 13.405, false), false);
        let all = fragments.join(" ");
        assert!(all.starts_with("Nearest police #1 Revier Mitte"));
        assert!(all.contains("#2 Revier Nord"));
        assert!(all.contains("km"));
    }

    #[test]
    fn single_hit_is_not_numbered() {
        let hits = vec![OsmHit {
            name: "Apotheke".to_string(),
            latitude: 52.53,
            longitude: 13.41,
        }];
        let all = fragment::render(&format_hits(&hits, "pharmacy", 52.52, 13.405, false), false)
            .join(" ");
        assert!(all.starts_with("Nearest pharmacy Apotheke"));
        assert!(!all.contains("#1"));
    }
}
