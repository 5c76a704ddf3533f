//! OpenWeatherMap One Call client and the forecast formatter. The
//! requested date selects an entry of the daily (or hourly) grid; the
//! daytime window selects which of the per-window temperatures are
//! echoed back. All other values pass through in the provider's unit
//! system, so no local conversion happens here.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;

use crate::command::{Command, DateOffset, Daytime, Units};
use crate::response::Response;

use super::{ProviderError, ProviderResult};

#[derive(Debug, Deserialize)]
pub struct OneCall {
    #[serde(default)]
    pub timezone_offset: i64,
    #[serde(default)]
    pub current: Option<HourlyWx>,
    #[serde(default)]
    pub hourly: Vec<HourlyWx>,
    #[serde(default)]
    pub daily: Vec<DailyWx>,
}

#[derive(Debug, Deserialize)]
pub struct HourlyWx {
    pub dt: i64,
    #[serde(default)]
    pub temp: Option<f64>,
    #[serde(default)]
    pub pressure: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub dew_point: Option<f64>,
    #[serde(default)]
    pub uvi: Option<f64>,
    #[serde(default)]
    pub clouds: Option<f64>,
    #[serde(default)]
    pub visibility: Option<f64>,
    #[serde(default)]
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub wind_deg: Option<f64>,
    #[serde(default)]
    pub weather: Vec<WeatherDesc>,
    #[serde(default)]
    pub rain: Option<Precipitation>,
    #[serde(default)]
    pub snow: Option<Precipitation>,
}

#[derive(Debug, Deserialize)]
pub struct DailyWx {
    pub dt: i64,
    #[serde(default)]
    pub sunrise: Option<i64>,
    #[serde(default)]
    pub sunset: Option<i64>,
    #[serde(default)]
    pub temp: Option<DailyTemp>,
    #[serde(default)]
    pub pressure: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub dew_point: Option<f64>,
    #[serde(default)]
    pub uvi: Option<f64>,
    #[serde(default)]
    pub clouds: Option<f64>,
    #[serde(default)]
    pub visibility: Option<f64>,
    #[serde(default)]
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub wind_deg: Option<f64>,
    #[serde(default)]
    pub weather: Vec<WeatherDesc>,
    #[serde(default)]
    pub rain: Option<f64>,
    #[serde(default)]
    pub snow: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct DailyTemp {
    #[serde(default)]
    pub morn: Option<f64>,
    #[serde(default)]
    pub day: Option<f64>,
    #[serde(default)]
    pub eve: Option<f64>,
    #[serde(default)]
    pub night: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct WeatherDesc {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct Precipitation {
    #[serde(rename = "1h", default)]
    pub one_hour: Option<f64>,
}

pub struct WxClient {
    client: reqwest::Client,
    api_key: String,
}

impl WxClient {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }

    pub async fn one_call(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
        language: &str,
    ) -> ProviderResult<OneCall> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Disabled);
        }
        let url = format!(
            "https://api.openweathermap.org/data/2.5/onecall?lat={}&lon={}&units={}&exclude=alerts,minutely&lang={}&appid={}",
            lat, lon, units.as_str(), language, self.api_key
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "openweathermap returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

/// Render the forecast for the requested date/daytime window. The reply
/// opens with the forecast date and the resolved location header, then
/// flows description, temperatures and the remaining observables.
pub fn format_forecast(
    forecast: &OneCall,
    command: &Command,
    location_header: &str,
) -> ProviderResult<Response> {
    let mut response = Response::new();

    let (temp_uom, speed_uom) = match command.units {
        Units::Imperial => ("f", "mph"),
        Units::Metric => ("c", "m/s"),
    };

    match command.date {
        DateOffset::Hours(offset) => {
            let hour = forecast
                .hourly
                .get(offset as usize)
                .or(forecast.current.as_ref())
                .ok_or(ProviderError::Empty)?;
            response.push(format!(
                "{} {}",
                format_local_date(hour.dt, forecast.timezone_offset),
                location_header
            ));
            if let Some(desc) = hour.weather.first() {
                if !desc.description.is_empty() {
                    response.push(desc.description.clone());
                }
            }
            if let Some(temp) = hour.temp {
                response.push(format!("temp:{}{}", temp.round() as i64, temp_uom));
            }
            if let Some(rain) = hour.rain.as_ref().and_then(|r| r.one_hour) {
                response.push(format!("rain:{}mm", rain.ceil() as i64));
            }
            if let Some(snow) = hour.snow.as_ref().and_then(|s| s.one_hour) {
                response.push(format!("snow:{}mm", snow.ceil() as i64));
            }
            push_observables(
                &mut response,
                hour.clouds,
                hour.uvi,
                hour.pressure,
                hour.humidity,
                hour.dew_point,
                hour.wind_speed,
                hour.wind_deg,
                hour.visibility,
                temp_uom,
                speed_uom,
            );
        }
        DateOffset::Days(offset) => {
            let day = forecast
                .daily
                .get(offset as usize)
                .ok_or(ProviderError::Empty)?;
            response.push(format!(
                "{} {}",
                format_local_date(day.dt, forecast.timezone_offset),
                location_header
            ));
            if let Some(desc) = day.weather.first() {
                if !desc.description.is_empty() {
                    response.push(desc.description.clone());
                }
            }
            if let Some(temps) = &day.temp {
                let window = command.daytime;
                if let Some(morn) = temps.morn {
                    if matches!(window, Daytime::Full | Daytime::Morning) {
                        response.push(format!("morn:{}{}", morn.round() as i64, temp_uom));
                    }
                }
                if let Some(daytemp) = temps.day {
                    if matches!(window, Daytime::Full | Daytime::Day) {
                        response.push(format!("day:{}{}", daytemp.round() as i64, temp_uom));
                    }
                }
                if let Some(eve) = temps.eve {
                    if matches!(window, Daytime::Full | Daytime::Evening) {
                        response.push(format!("eve:{}{}", eve.round() as i64, temp_uom));
                    }
                }
                if let Some(night) = temps.night {
                    if matches!(window, Daytime::Full | Daytime::Night) {
                        response.push(format!("nite:{}{}", night.round() as i64, temp_uom));
                    }
                }
            }
            if let (Some(sunrise), Some(sunset)) = (day.sunrise, day.sunset) {
                let rise = Utc.timestamp_opt(sunrise, 0).single();
                let set = Utc.timestamp_opt(sunset, 0).single();
                if let (Some(rise), Some(set)) = (rise, set) {
                    response.push(format!(
                        "sunrise/set {}/{}UTC",
                        rise.format("%H:%M"),
                        set.format("%H:%M")
                    ));
                }
            }
            if let Some(rain) = day.rain {
                response.push(format!("rain:{}mm", rain.ceil() as i64));
            }
            if let Some(snow) = day.snow {
                response.push(format!("snow:{}mm", snow.ceil() as i64));
            }
            push_observables(
                &mut response,
                day.clouds,
                day.uvi,
                day.pressure,
                day.humidity,
                day.dew_point,
                day.wind_speed,
                day.wind_deg,
                day.visibility,
                temp_uom,
                speed_uom,
            );
        }
    }

    Ok(response)
}

#[allow(clippy::too_many_arguments)]
fn push_observables(
    response: &mut Response,
    clouds: Option<f64>,
    uvi: Option<f64>,
    pressure: Option<f64>,
    humidity: Option<f64>,
    dew_point: Option<f64>,
    wind_speed: Option<f64>,
    wind_deg: Option<f64>,
    visibility: Option<f64>,
    temp_uom: &str,
    speed_uom: &str,
) {
    if let Some(clouds) = clouds {
        response.push(format!("clouds:{}%", clouds.round() as i64));
    }
    if let Some(uvi) = uvi {
        response.push(format!("uvi:{:.1}", uvi));
    }
    if let Some(pressure) = pressure {
        response.push(format!("hPa:{}", pressure.round() as i64));
    }
    if let Some(humidity) = humidity {
        response.push(format!("hum:{}%", humidity.round() as i64));
    }
    if let Some(dew_point) = dew_point {
        response.push(format!("dewpt:{}{}", dew_point.ceil() as i64, temp_uom));
    }
    if let Some(wind_speed) = wind_speed {
        response.push(format!("wndspd:{}{}", wind_speed.ceil() as i64, speed_uom));
    }
    if let Some(wind_deg) = wind_deg {
        response.push(format!("wnddeg:{}", wind_deg.round() as i64));
    }
    if let Some(visibility) = visibility {
        response.push(format!("vis:{}m", visibility.round() as i64));
    }
}

/// Forecast timestamps are displayed as dates local to the target
/// coordinates, using the provider's zone offset.
fn format_local_date(unix: i64, timezone_offset: i64) -> String {
    let utc: DateTime<Utc> = Utc
        .timestamp_opt(unix, 0)
        .single()
        .unwrap_or_else(Utc::now);
    (utc + Duration::seconds(timezone_offset))
        .format("%d-%b-%y")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Action, Target};
    use crate::fragment;

    fn command(date: DateOffset, daytime: Daytime, units: Units) -> Command {
        Command {
            action: Action::Wx,
            target: Target::UserPosition,
            date,
            daytime,
            units,
            language: "de".to_string(),
            top_n: 1,
            force_unicode: false,
            payload: None,
            error: None,
        }
    }

    fn sample_forecast() -> OneCall {
        // 2021-01-16 12:00 UTC
        let noon: i64 = 1_610_798_400;
        OneCall {
            timezone_offset: 3600,
            current: None,
            hourly: vec![],
            daily: vec![DailyWx {
                dt: noon,
                sunrise: Some(noon - 16_200),
                sunset: Some(noon + 16_200),
                temp: Some(DailyTemp {
                    morn: Some(-3.2),
                    day: Some(-1.4),
                    eve: Some(-2.0),
                    night: Some(-2.4),
                }),
                pressure: Some(1024.0),
                humidity: Some(86.0),
                dew_point: Some(-4.0),
                uvi: Some(0.4),
                clouds: Some(100.0),
                visibility: None,
                wind_speed: Some(3.2),
                wind_deg: Some(256.0),
                weather: vec![WeatherDesc {
                    description: "Bedeckt".to_string(),
                }],
                rain: None,
                snow: Some(1.2),
            }],
        }
    }

    #[test]
    fn formats_daily_forecast_header_and_windows() {
        let forecast = sample_forecast();
        let cmd = command(DateOffset::Days(0), Daytime::Full, Units::Metric);
        let response = format_forecast(&forecast, &cmd, "Holzminden;DE").unwrap();
        let fragments = fragment::render(&response, false);

        assert!(
            fragments[0].starts_with("16-Jan-21 Holzminden;DE Bedeckt morn:-3c day:-1c eve:-2c"),
            "first fragment was {:?}",
            fragments[0]
        );
        let all = fragments.join(" ");
        assert!(all.contains("nite:-2c"));
        assert!(all.contains("sunrise/set"));
        assert!(all.contains("hPa:1024"));
        assert!(all.contains("hum:86%"));
        assert!(all.contains("wndspd:4m/s"));
        assert!(all.contains("wnddeg:256"));
        assert!(all.contains("snow:2mm"));
    }

    #[test]
    fn night_window_shows_only_night_temperature() {
        let forecast = sample_forecast();
        let cmd = command(DateOffset::Days(0), Daytime::Night, Units::Metric);
        let response = format_forecast(&forecast, &cmd, "Holzminden;DE").unwrap();
        let all = fragment::render(&response, false).join(" ");
        assert!(all.contains("nite:-2c"));
        assert!(!all.contains("morn:"));
        assert!(!all.contains("day:-1c"));
    }

    #[test]
    fn tokens_are_never_torn() {
        let forecast = sample_forecast();
        let cmd = command(DateOffset::Days(0), Daytime::Full, Units::Metric);
        let response = format_forecast(&forecast, &cmd, "Holzminden;DE").unwrap();
        let fragments = fragment::render(&response, false);
        for key in ["hPa:", "hum:", "dewpt:", "wndspd:", "wnddeg:", "uvi:"] {
            assert!(
                fragments.iter().any(|f| f.contains(key)),
                "{} torn across fragments: {:?}",
                key,
                fragments
            );
        }
    }

    #[test]
    fn missing_forecast_day_is_empty_result() {
        let forecast = sample_forecast();
        let cmd = command(DateOffset::Days(5), Daytime::Full, Units::Metric);
        assert!(matches!(
            format_forecast(&forecast, &cmd, "x"),
            Err(ProviderError::Empty)
        ));
    }

    #[test]
    fn imperial_units_change_suffixes() {
        let forecast = sample_forecast();
        let cmd = command(DateOffset::Days(0), Daytime::Full, Units::Imperial);
        let response = format_forecast(&forecast, &cmd, "Mountain View,94043;US").unwrap();
        let all = fragment::render(&response, false).join(" ");
        assert!(all.contains("morn:-3f"));
        assert!(all.contains("mph"));
    }
}
