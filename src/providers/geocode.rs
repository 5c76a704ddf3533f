//! Forward and reverse geocoding against Nominatim, plus the compact
//! human-readable address header used at the start of most replies.

use serde::Deserialize;

use super::{ProviderError, ProviderResult};

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

/// ISO 3166-1 alpha-2 codes accepted for address queries.
const COUNTRY_CODES: &[&str] = &[
    "ad", "ae", "af", "ag", "ai", "al", "am", "ao", "aq", "ar", "as", "at", "au", "aw", "ax",
    "az", "ba", "bb", "bd", "be", "bf", "bg", "bh", "bi", "bj", "bl", "bm", "bn", "bo", "bq",
    "br", "bs", "bt", "bv", "bw", "by", "bz", "ca", "cc", "cd", "cf", "cg", "ch", "ci", "ck",
    "cl", "cm", "cn", "co", "cr", "cu", "cv", "cw", "cx", "cy", "cz", "de", "dj", "dk", "dm",
    "do", "dz", "ec", "ee", "eg", "eh", "er", "es", "et", "fi", "fj", "fk", "fm", "fo", "fr",
    "ga", "gb", "gd", "ge", "gf", "gg", "gh", "gi", "gl", "gm", "gn", "gp", "gq", "gr", "gs",
    "gt", "gu", "gw", "gy", "hk", "hm", "hn", "hr", "ht", "hu", "id", "ie", "il", "im", "in",
    "io", "iq", "ir", "is", "it", "je", "jm", "jo", "jp", "ke", "kg", "kh", "ki", "km", "kn",
    "kp", "kr", "kw", "ky", "kz", "la", "lb", "lc", "li", "lk", "lr", "ls", "lt", "lu", "lv",
    "ly", "ma", "mc", "md", "me", "mf", "mg", "mh", "mk", "ml", "mm", "mn", "mo", "mp", "mq",
    "mr", "ms", "mt", "mu", "mv", "mw", "mx", "my", "mz", "na", "nc", "ne", "nf", "ng", "ni",
    "nl", "no", "np", "nr", "nu", "nz", "om", "pa", "pe", "pf", "pg", "ph", "pk", "pl", "pm",
    "pn", "pr", "ps", "pt", "pw", "py", "qa", "re", "ro", "rs", "ru", "rw", "sa", "sb", "sc",
    "sd", "se", "sg", "sh", "si", "sj", "sk", "sl", "sm", "sn", "so", "sr", "ss", "st", "sv",
    "sx", "sy", "sz", "tc", "td", "tf", "tg", "th", "tj", "tk", "tl", "tm", "tn", "to", "tr",
    "tt", "tv", "tw", "tz", "ua", "ug", "um", "us", "uy", "uz", "va", "vc", "ve", "vg", "vi",
    "vn", "vu", "wf", "ws", "ye", "yt", "za", "zm", "zw",
];

pub fn validate_country(code: &str) -> bool {
    COUNTRY_CODES.contains(&code.to_lowercase().as_str())
}

/// Structured query for forward geocoding.
#[derive(Debug, Clone, Default)]
pub struct AddressQuery {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postalcode: Option<String>,
}

/// Reverse-geocoded address fields; every field may be absent.
#[derive(Debug, Clone, Default)]
pub struct Address {
    pub city: Option<String>,
    pub state: Option<String>,
    pub county: Option<String>,
    pub country: Option<String>,
    pub zipcode: Option<String>,
    pub street: Option<String>,
    pub street_number: Option<String>,
}

impl Address {
    /// Compact reply header: `city,state,zip;country`. State only shows
    /// for US addresses (other countries rarely abbreviate usefully).
    pub fn human_readable(&self) -> String {
        let mut text = String::new();
        if let Some(city) = &self.city {
            text.push_str(city);
            if self.country.as_deref() == Some("US") {
                if let Some(state) = &self.state {
                    text.push(',');
                    text.push_str(state);
                }
            }
            if let Some(zipcode) = &self.zipcode {
                text.push(',');
                text.push_str(zipcode);
            }
        } else if let Some(county) = &self.county {
            text.push_str(county);
        }
        if let Some(country) = &self.country {
            text.push(';');
            text.push_str(country);
        }
        text
    }
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    lat: String,
    lon: String,
}

#[derive(Debug, Deserialize)]
struct ReverseResult {
    #[serde(default)]
    address: ReverseAddress,
}

#[derive(Debug, Default, Deserialize)]
struct ReverseAddress {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    town: Option<String>,
    #[serde(default)]
    village: Option<String>,
    #[serde(default)]
    hamlet: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    county: Option<String>,
    #[serde(default)]
    postcode: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    road: Option<String>,
    #[serde(default)]
    house_number: Option<String>,
    #[serde(rename = "ISO3166-2-lvl4", default)]
    iso_state: Option<String>,
}

pub struct GeocodeClient {
    client: reqwest::Client,
}

impl GeocodeClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Resolve an address query to coordinates.
    pub async fn forward(&self, query: &AddressQuery) -> ProviderResult<(f64, f64)> {
        let mut params: Vec<(&str, String)> = vec![
            ("format", "json".to_string()),
            ("limit", "1".to_string()),
        ];
        if let Some(city) = &query.city {
            params.push(("city", city.clone()));
        }
        if let Some(state) = &query.state {
            params.push(("state", state.clone()));
        }
        if let Some(country) = &query.country {
            params.push(("country", country.clone()));
        }
        if let Some(postalcode) = &query.postalcode {
            params.push(("postalcode", postalcode.clone()));
        }

        let response = self
            .client
            .get(format!("{}/search", NOMINATIM_URL))
            .query(&params)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "nominatim returned {}",
                response.status()
            )));
        }
        let results: Vec<SearchResult> = response.json().await?;
        let first = results.into_iter().next().ok_or(ProviderError::NotFound)?;
        let lat = first.lat.parse().map_err(|_| ProviderError::NotFound)?;
        let lon = first.lon.parse().map_err(|_| ProviderError::NotFound)?;
        Ok((lat, lon))
    }

    /// Resolve coordinates to an address. Missing fields stay `None`.
    pub async fn reverse(&self, lat: f64, lon: f64, language: &str) -> ProviderResult<Address> {
        let response = self
            .client
            .get(format!("{}/reverse", NOMINATIM_URL))
            .query(&[
                ("format", "json".to_string()),
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("accept-language", language.to_string()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "nominatim returned {}",
                response.status()
            )));
        }
        let result: ReverseResult = response.json().await?;
        let a = result.address;

        // US states arrive as full names; the ISO subdivision code gives
        // the two-letter abbreviation used in the reply header.
        let state_abbrev = a
            .iso_state
            .as_deref()
            .and_then(|code| code.split('-').nth(1))
            .map(str::to_string)
            .or(a.state.clone());

        Ok(Address {
            city: a.city.or(a.town).or(a.village).or(a.hamlet),
            state: state_abbrev,
            county: a.county,
            country: a.country_code.map(|c| c.to_uppercase()),
            zipcode: a.postcode,
            street: a.road,
            street_number: a.house_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_validation() {
        assert!(validate_country("de"));
        assert!(validate_country("US"));
        assert!(!validate_country("zz"));
        assert!(!validate_country("usa"));
    }

    #[test]
    fn human_readable_us_address() {
        let address = Address {
            city: Some("Mountain View".to_string()),
            state: Some("CA".to_string()),
            zipcode: Some("94043".to_string()),
            country: Some("US".to_string()),
            ..Default::default()
        };
        assert_eq!(address.human_readable(), "Mountain View,CA,94043;US");
    }

    #[test]
    fn human_readable_non_us_skips_state() {
        let address = Address {
            city: Some("Holzminden".to_string()),
            state: Some("Niedersachsen".to_string()),
            zipcode: None,
            country: Some("DE".to_string()),
            ..Default::default()
        };
        assert_eq!(address.human_readable(), "Holzminden;DE");
    }

    #[test]
    fn human_readable_falls_back_to_county() {
        let address = Address {
            county: Some("Holzminden".to_string()),
            country: Some("DE".to_string()),
            ..Default::default()
        };
        assert_eq!(address.human_readable(), "Holzminden;DE");
    }
}
