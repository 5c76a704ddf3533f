//! Raw METAR/TAF text from the aviationweather.gov data API. The text
//! is opaque to the daemon and forwarded as-is; the combined report
//! separates METAR and TAF with a literal `##`.

use super::{ProviderError, ProviderResult};

const API_URL: &str = "https://aviationweather.gov/api/data";

pub struct MetarClient {
    client: reqwest::Client,
}

impl MetarClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn metar(&self, icao: &str) -> ProviderResult<String> {
        self.fetch("metar", icao).await
    }

    pub async fn taf(&self, icao: &str) -> ProviderResult<String> {
        self.fetch("taf", icao).await
    }

    /// METAR and TAF joined with the `##` separator. A missing TAF
    /// degrades to the METAR alone.
    pub async fn metar_and_taf(&self, icao: &str) -> ProviderResult<String> {
        let metar = self.metar(icao).await?;
        match self.taf(icao).await {
            Ok(taf) => Ok(format!("{} ## {}", metar, taf)),
            Err(ProviderError::Empty) => Ok(metar),
            Err(e) => Err(e),
        }
    }

    async fn fetch(&self, kind: &str, icao: &str) -> ProviderResult<String> {
        let url = format!("{}/{}?ids={}&format=raw", API_URL, kind, icao.to_uppercase());
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "aviationweather returned {}",
                response.status()
            )));
        }
        let body = response.text().await?;
        let text = normalize_report(&body);
        if text.is_empty() {
            Err(ProviderError::Empty)
        } else {
            Ok(text)
        }
    }
}

/// Reports come back line-wrapped; collapse to single-space tokens.
fn normalize_report(body: &str) -> String {
    body.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_whitespace_is_collapsed() {
        let raw = "EDDF 161150Z 24008KT 9999\n  BKN014 02/01 Q1024\n";
        assert_eq!(
            normalize_report(raw),
            "EDDF 161150Z 24008KT 9999 BKN014 02/01 Q1024"
        );
        assert_eq!(normalize_report("  \n "), "");
    }
}
