//! Citizen Weather Observer Program reports from findu.com. The
//! upstream speaks HTML; the observation table is scraped and the first
//! data row parsed into a typed report.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use scraper::{Html, Selector};

use crate::command::Units;
use crate::response::Response;

use super::{ProviderError, ProviderResult};

#[derive(Debug, Clone)]
pub struct CwopReport {
    pub cwop_id: String,
    pub time: Option<DateTime<Utc>>,
    pub temp: Option<String>,
    pub temp_uom: String,
    pub wind_direction: Option<String>,
    pub wind_speed: Option<String>,
    pub wind_gust: Option<String>,
    pub speedgust_uom: String,
    pub rain_1h: Option<String>,
    pub rain_24h: Option<String>,
    pub rain_mn: Option<String>,
    pub rain_uom: String,
    pub humidity: Option<String>,
    pub air_pressure: Option<String>,
}

pub struct CwopClient {
    client: reqwest::Client,
}

impl CwopClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Latest observation of a specific CWOP station.
    pub async fn by_id(&self, cwop_id: &str, units: Units) -> ProviderResult<CwopReport> {
        let url = format!(
            "http://www.findu.com/cgi-bin/wx.cgi?call={}&last=1&units={}",
            cwop_id.to_uppercase(),
            units.as_str()
        );
        let body = self.fetch(&url).await?;
        parse_wx_table(&body, cwop_id, units).ok_or(ProviderError::Empty)
    }

    /// Latest observation of the station nearest to the coordinates.
    pub async fn nearest(&self, lat: f64, lon: f64, units: Units) -> ProviderResult<CwopReport> {
        let url = format!(
            "http://www.findu.com/cgi-bin/wxnear.cgi?lat={}&lon={}&noold=1&limits=1",
            lat, lon
        );
        let body = self.fetch(&url).await?;
        // wxnear lists the station callsign in the first data column.
        let station = parse_nearest_station(&body).ok_or(ProviderError::Empty)?;
        self.by_id(&station, units).await
    }

    async fn fetch(&self, url: &str) -> ProviderResult<String> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "findu returned {}",
                response.status()
            )));
        }
        Ok(response.text().await?)
    }
}

/// Extract the first observation row of findu's wx table. Column order:
/// time, temp, wind dir, wind speed, gust, rain 1h/24h/midnight,
/// humidity, pressure.
fn parse_wx_table(body: &str, cwop_id: &str, units: Units) -> Option<CwopReport> {
    let document = Html::parse_document(body);
    if document
        .root_element()
        .text()
        .any(|t| t.contains("Sorry, no weather reports found"))
    {
        return None;
    }

    let row_selector = Selector::parse("table tr").ok()?;
    let cell_selector = Selector::parse("td").ok()?;

    let mut rows = document.select(&row_selector);
    let _header = rows.next()?;
    let data_row = rows.next()?;
    let cells: Vec<String> = data_row
        .select(&cell_selector)
        .map(|c| c.text().collect::<String>().trim().to_string())
        .collect();
    if cells.len() < 10 {
        return None;
    }

    let (temp_uom, speedgust_uom, rain_uom) = match units {
        Units::Imperial => ("F", "mph", "in"),
        Units::Metric => ("C", "km/h", "cm"),
    };

    Some(CwopReport {
        cwop_id: cwop_id.to_uppercase(),
        time: parse_obs_timestamp(&cells[0]),
        temp: non_empty(&cells[1]),
        temp_uom: temp_uom.to_string(),
        wind_direction: non_empty(&cells[2]),
        wind_speed: non_empty(&cells[3]),
        wind_gust: non_empty(&cells[4]),
        speedgust_uom: speedgust_uom.to_string(),
        rain_1h: non_empty(&cells[5]).map(shorten_zero),
        rain_24h: non_empty(&cells[6]).map(shorten_zero),
        rain_mn: non_empty(&cells[7]).map(shorten_zero),
        rain_uom: rain_uom.to_string(),
        humidity: non_empty(&cells[8]),
        air_pressure: non_empty(&cells[9]),
    })
}

fn parse_nearest_station(body: &str) -> Option<String> {
    let document = Html::parse_document(body);
    let row_selector = Selector::parse("table tr").ok()?;
    let cell_selector = Selector::parse("td").ok()?;

    let mut rows = document.select(&row_selector);
    let _header = rows.next()?;
    let data_row = rows.next()?;
    let first = data_row
        .select(&cell_selector)
        .next()?
        .text()
        .collect::<String>();
    let station = first.trim().to_uppercase();
    if station.is_empty() {
        None
    } else {
        Some(station)
    }
}

/// Observation timestamps come as `yyyymmddhhmmss`.
fn parse_obs_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y%m%d%H%M%S").ok()?;
    Utc.from_utc_datetime(&naive).into()
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn shorten_zero(s: String) -> String {
    if s == "0.00" {
        "0.0".to_string()
    } else {
        s
    }
}

/// Render the report: station id, date, temperature, wind, humidity,
/// pressure and the rain triple glued into one token group.
pub fn format_report(report: &CwopReport) -> Response {
    let mut response = Response::new();
    response.push(format!("CWOP {}", report.cwop_id));
    if let Some(time) = report.time {
        response.push(time.format("%d-%b-%y").to_string());
    }
    if let Some(temp) = &report.temp {
        response.push(format!("{}{}", temp, report.temp_uom));
    }
    if let Some(direction) = &report.wind_direction {
        response.push(format!("{}deg", direction));
    }
    if let Some(speed) = &report.wind_speed {
        response.push(format!("Spd {}{}", speed, report.speedgust_uom));
    }
    if let Some(gust) = &report.wind_gust {
        response.push(format!("Gust {}{}", gust, report.speedgust_uom));
    }
    if let Some(humidity) = &report.humidity {
        response.push(format!("Hum {}%", humidity));
    }
    if let Some(pressure) = &report.air_pressure {
        response.push(format!("Pres {}mb", pressure));
    }
    if let Some(rain_1h) = &report.rain_1h {
        response.push(format!("Rain({}) 1h={}", report.rain_uom, rain_1h));
        if let Some(rain_24h) = &report.rain_24h {
            response.push_glued(format!(", 24h={}", rain_24h));
        }
        if let Some(rain_mn) = &report.rain_mn {
            response.push_glued(format!(", mn={}", rain_mn));
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment;

    const SAMPLE: &str = r#"
        <html><body><table>
        <tr><th>Time</th><th>Temp</th><th>Dir</th><th>Speed</th><th>Gust</th>
            <th>1h</th><th>24h</th><th>mn</th><th>Hum</th><th>Baro</th></tr>
        <tr><td>20210116114500</td><td>-2.3</td><td>240</td><td>12</td><td>19</td>
            <td>0.00</td><td>0.30</td><td>0.00</td><td>86</td><td>1024.1</td></tr>
        </table></body></html>"#;

    #[test]
    fn parses_observation_row() {
        let report = parse_wx_table(SAMPLE, "dw1234", Units::Metric).unwrap();
        assert_eq!(report.cwop_id, "DW1234");
        assert_eq!(report.temp.as_deref(), Some("-2.3"));
        assert_eq!(report.wind_direction.as_deref(), Some("240"));
        assert_eq!(report.rain_1h.as_deref(), Some("0.0"));
        assert_eq!(report.rain_24h.as_deref(), Some("0.30"));
        assert_eq!(report.humidity.as_deref(), Some("86"));
        let time = report.time.unwrap();
        assert_eq!(time.format("%Y-%m-%d %H:%M").to_string(), "2021-01-16 11:45");
    }

    #[test]
    fn missing_station_yields_none() {
        let body = "<html><body>Sorry, no weather reports found</body></html>";
        assert!(parse_wx_table(body, "DW1234", Units::Metric).is_none());
    }

    #[test]
    fn formatted_report_keeps_rain_group_together() {
        let report = parse_wx_table(SAMPLE, "DW1234", Units::Metric).unwrap();
        let fragments = fragment::render(&format_report(&report), false);
        assert!(fragments[0].starts_with("CWOP DW1234 16-Jan-21 -2.3C 240deg"));
        let all = fragments.join(" ");
        assert!(all.contains("Rain(cm) 1h=0.0, 24h=0.30, mn=0.0"));
    }
}
