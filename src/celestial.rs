//! Celestial collaborator: sun and moon rise/set times, topocentric
//! look angles and satellite pass prediction. Everything here is a pure
//! function of its inputs; orbit propagation itself is delegated to the
//! SGP4 implementation.
//!
//! Accuracy targets are message-display grade (a minute or two), not
//! ephemeris grade: rise/set events are found by scanning the altitude
//! curve and interpolating the horizon crossing.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};

/// Standard refraction-corrected horizon for the solar disk.
const SUN_HORIZON_DEG: f64 = -0.833;
/// Moon horizon including mean parallax and semi-diameter.
const MOON_HORIZON_DEG: f64 = 0.125;
/// Observer sky must be at least this dark for a visible pass.
const TWILIGHT_SUN_ELEVATION_DEG: f64 = -6.0;

const EARTH_RADIUS_KM: f64 = 6378.137;
const EARTH_FLATTENING: f64 = 1.0 / 298.257_223_563;

#[derive(Debug, Clone, Copy)]
pub struct Observer {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
}

/// Julian date for a UTC instant.
fn julian_date(t: DateTime<Utc>) -> f64 {
    let (y, m, d) = (t.year() as f64, t.month() as f64, t.day() as f64);
    let frac = (t.hour() as f64 + t.minute() as f64 / 60.0 + t.second() as f64 / 3600.0) / 24.0;
    let (y, m) = if m <= 2.0 { (y - 1.0, m + 12.0) } else { (y, m) };
    let a = (y / 100.0).floor();
    let b = 2.0 - a + (a / 4.0).floor();
    (365.25 * (y + 4716.0)).floor() + (30.6001 * (m + 1.0)).floor() + d + frac + b - 1524.5
}

/// Greenwich mean sidereal time in degrees.
pub fn gmst_deg(t: DateTime<Utc>) -> f64 {
    let d = julian_date(t) - 2_451_545.0;
    let gmst = 280.460_618_37 + 360.985_647_366_29 * d;
    gmst.rem_euclid(360.0)
}

/// Geocentric equatorial direction of the sun (unit vector) plus its
/// right ascension/declination, low-precision series.
fn sun_ra_dec(t: DateTime<Utc>) -> (f64, f64) {
    let d = julian_date(t) - 2_451_545.0;
    let g = (357.529 + 0.985_600_28 * d).to_radians();
    let q = 280.459 + 0.985_647_36 * d;
    let lambda = (q + 1.915 * g.sin() + 0.020 * (2.0 * g).sin()).to_radians();
    let epsilon = (23.439 - 0.000_000_36 * d).to_radians();

    let ra = (epsilon.cos() * lambda.sin()).atan2(lambda.cos());
    let dec = (epsilon.sin() * lambda.sin()).asin();
    (ra.to_degrees().rem_euclid(360.0), dec.to_degrees())
}

/// Unit vector towards the sun in the equatorial frame.
fn sun_unit_vector(t: DateTime<Utc>) -> [f64; 3] {
    let (ra, dec) = sun_ra_dec(t);
    let (ra, dec) = (ra.to_radians(), dec.to_radians());
    [dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin()]
}

/// Topocentric altitude of the sun in degrees.
pub fn sun_altitude_deg(latitude: f64, longitude: f64, t: DateTime<Utc>) -> f64 {
    let (ra, dec) = sun_ra_dec(t);
    altitude_from_ra_dec(latitude, longitude, t, ra, dec)
}

/// Topocentric altitude of the moon in degrees (truncated lunar theory,
/// good to a few arc minutes).
pub fn moon_altitude_deg(latitude: f64, longitude: f64, t: DateTime<Utc>) -> f64 {
    let t_c = (julian_date(t) - 2_451_545.0) / 36525.0;

    let lp = 218.316_4477 + 481_267.881_234_21 * t_c; // mean longitude
    let d = (297.850_1921 + 445_267.111_4034 * t_c).to_radians(); // elongation
    let m = (357.529_1092 + 35_999.050_2909 * t_c).to_radians(); // sun anomaly
    let mp = (134.963_3964 + 477_198.867_5055 * t_c).to_radians(); // moon anomaly
    let f = (93.272_0950 + 483_202.017_5233 * t_c).to_radians(); // argument of latitude

    let lon = (lp
        + 6.288_774 * mp.sin()
        + 1.274_027 * (2.0 * d - mp).sin()
        + 0.658_314 * (2.0 * d).sin()
        + 0.213_618 * (2.0 * mp).sin()
        - 0.185_116 * m.sin()
        - 0.114_332 * (2.0 * f).sin())
    .to_radians();
    let lat = (5.128_122 * f.sin()
        + 0.280_602 * (mp + f).sin()
        + 0.277_693 * (mp - f).sin()
        + 0.173_237 * (2.0 * d - f).sin())
    .to_radians();

    let epsilon = (23.439 - 0.013 * t_c).to_radians();
    let ra = (lon.sin() * epsilon.cos() - lat.tan() * epsilon.sin())
        .atan2(lon.cos())
        .to_degrees()
        .rem_euclid(360.0);
    let dec = (lat.sin() * epsilon.cos() + lat.cos() * epsilon.sin() * lon.sin())
        .asin()
        .to_degrees();

    altitude_from_ra_dec(latitude, longitude, t, ra, dec)
}

fn altitude_from_ra_dec(latitude: f64, longitude: f64, t: DateTime<Utc>, ra: f64, dec: f64) -> f64 {
    let lst = (gmst_deg(t) + longitude).rem_euclid(360.0);
    let hour_angle = (lst - ra).to_radians();
    let (phi, dec) = (latitude.to_radians(), dec.to_radians());
    (phi.sin() * dec.sin() + phi.cos() * dec.cos() * hour_angle.cos())
        .asin()
        .to_degrees()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiseSet {
    pub rise: Option<DateTime<Utc>>,
    pub set: Option<DateTime<Utc>>,
}

pub fn sun_rise_set(latitude: f64, longitude: f64, date: NaiveDate) -> RiseSet {
    rise_set_for(date, SUN_HORIZON_DEG, |t| {
        sun_altitude_deg(latitude, longitude, t)
    })
}

pub fn moon_rise_set(latitude: f64, longitude: f64, date: NaiveDate) -> RiseSet {
    rise_set_for(date, MOON_HORIZON_DEG, |t| {
        moon_altitude_deg(latitude, longitude, t)
    })
}

/// Scan the altitude curve across the UTC day in 5-minute steps and
/// linearly interpolate the horizon crossings. Bodies that stay up or
/// down all day yield `None` for the corresponding event.
fn rise_set_for<F: Fn(DateTime<Utc>) -> f64>(date: NaiveDate, horizon: f64, altitude: F) -> RiseSet {
    let start = Utc
        .from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight exists"));
    let step = chrono::Duration::minutes(5);

    let mut rise = None;
    let mut set = None;
    let mut prev_t = start;
    let mut prev_alt = altitude(start);

    for i in 1..=(24 * 12) {
        let t = start + step * i;
        let alt = altitude(t);
        if prev_alt <= horizon && alt > horizon && rise.is_none() {
            rise = Some(interpolate_crossing(prev_t, prev_alt, t, alt, horizon));
        }
        if prev_alt > horizon && alt <= horizon && set.is_none() {
            set = Some(interpolate_crossing(prev_t, prev_alt, t, alt, horizon));
        }
        prev_t = t;
        prev_alt = alt;
    }

    RiseSet { rise, set }
}

fn interpolate_crossing(
    t0: DateTime<Utc>,
    alt0: f64,
    t1: DateTime<Utc>,
    alt1: f64,
    horizon: f64,
) -> DateTime<Utc> {
    let span = (t1 - t0).num_seconds() as f64;
    let fraction = ((horizon - alt0) / (alt1 - alt0)).clamp(0.0, 1.0);
    t0 + chrono::Duration::seconds((span * fraction) as i64)
}

/// Observer position in the earth-fixed frame (km).
fn observer_ecef(observer: &Observer) -> [f64; 3] {
    let phi = observer.latitude.to_radians();
    let lambda = observer.longitude.to_radians();
    let e2 = EARTH_FLATTENING * (2.0 - EARTH_FLATTENING);
    let n = EARTH_RADIUS_KM / (1.0 - e2 * phi.sin().powi(2)).sqrt();
    let alt_km = observer.altitude_m / 1000.0;
    [
        (n + alt_km) * phi.cos() * lambda.cos(),
        (n + alt_km) * phi.cos() * lambda.sin(),
        (n * (1.0 - e2) + alt_km) * phi.sin(),
    ]
}

/// Rotate an inertial (TEME) position into the earth-fixed frame.
fn teme_to_ecef(position: [f64; 3], t: DateTime<Utc>) -> [f64; 3] {
    let theta = gmst_deg(t).to_radians();
    let (sin_t, cos_t) = (theta.sin(), theta.cos());
    [
        position[0] * cos_t + position[1] * sin_t,
        -position[0] * sin_t + position[1] * cos_t,
        position[2],
    ]
}

/// Azimuth/elevation of an earth-fixed satellite position as seen by the
/// observer.
pub fn look_angles(observer: &Observer, sat_ecef: [f64; 3]) -> (f64, f64) {
    let obs = observer_ecef(observer);
    let range = [
        sat_ecef[0] - obs[0],
        sat_ecef[1] - obs[1],
        sat_ecef[2] - obs[2],
    ];

    let phi = observer.latitude.to_radians();
    let lambda = observer.longitude.to_radians();
    let (sin_phi, cos_phi) = (phi.sin(), phi.cos());
    let (sin_lambda, cos_lambda) = (lambda.sin(), lambda.cos());

    // ENU components
    let east = -sin_lambda * range[0] + cos_lambda * range[1];
    let north = -sin_phi * cos_lambda * range[0] - sin_phi * sin_lambda * range[1]
        + cos_phi * range[2];
    let up = cos_phi * cos_lambda * range[0] + cos_phi * sin_lambda * range[1]
        + sin_phi * range[2];

    let azimuth = east.atan2(north).to_degrees().rem_euclid(360.0);
    let elevation = (up / (east * east + north * north + up * up).sqrt())
        .asin()
        .to_degrees();
    (azimuth, elevation)
}

/// True when the satellite at the given inertial position is lit by the
/// sun (outside the cylindrical earth shadow).
fn satellite_illuminated(sat_teme: [f64; 3], t: DateTime<Utc>) -> bool {
    let sun = sun_unit_vector(t);
    let along = sat_teme[0] * sun[0] + sat_teme[1] * sun[1] + sat_teme[2] * sun[2];
    if along >= 0.0 {
        return true;
    }
    let perp = [
        sat_teme[0] - along * sun[0],
        sat_teme[1] - along * sun[1],
        sat_teme[2] - along * sun[2],
    ];
    (perp[0] * perp[0] + perp[1] * perp[1] + perp[2] * perp[2]).sqrt() > EARTH_RADIUS_KM
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassEvent {
    pub aos: DateTime<Utc>,
    pub aos_azimuth: f64,
    pub tca: DateTime<Utc>,
    pub max_elevation: f64,
    pub los: DateTime<Utc>,
    pub los_azimuth: f64,
    pub visible: bool,
}

const PASS_SEARCH_DAYS: i64 = 3;
const PASS_STEP_SECONDS: i64 = 30;

/// Find the next pass of the satellite over the observer after `start`.
/// A pass begins when the elevation climbs above `min_elevation_deg` and
/// ends when it drops back below. With `require_visible`, passes that
/// are not optically visible (satellite in shadow or observer sky too
/// bright) are skipped.
pub fn next_pass(
    tle_line1: &str,
    tle_line2: &str,
    observer: &Observer,
    start: DateTime<Utc>,
    min_elevation_deg: f64,
    require_visible: bool,
) -> Result<Option<PassEvent>> {
    let elements = sgp4::Elements::from_tle(
        None,
        tle_line1.as_bytes(),
        tle_line2.as_bytes(),
    )
    .map_err(|e| anyhow!("cannot parse TLE: {}", e))?;
    let constants = sgp4::Constants::from_elements(&elements)
        .map_err(|e| anyhow!("cannot initialize propagator: {}", e))?;
    let epoch = Utc.from_utc_datetime(&elements.datetime);

    let state_at = |t: DateTime<Utc>| -> Result<([f64; 3], f64, f64)> {
        let minutes = (t - epoch).num_milliseconds() as f64 / 60_000.0;
        let prediction = constants
            .propagate(sgp4::MinutesSinceEpoch(minutes))
            .map_err(|e| anyhow!("propagation failed: {}", e))?;
        let teme = prediction.position;
        let ecef = teme_to_ecef(teme, t);
        let (azimuth, elevation) = look_angles(observer, ecef);
        Ok((teme, azimuth, elevation))
    };

    let step = chrono::Duration::seconds(PASS_STEP_SECONDS);
    let end = start + chrono::Duration::days(PASS_SEARCH_DAYS);

    let mut t = start;
    let mut in_pass = false;
    let mut aos = start;
    let mut aos_azimuth = 0.0;
    let mut max_elevation = f64::MIN;
    let mut tca = start;
    let mut tca_teme = [0.0; 3];

    while t <= end {
        let (teme, azimuth, elevation) = state_at(t)?;

        if !in_pass && elevation >= min_elevation_deg {
            in_pass = true;
            aos = t;
            aos_azimuth = azimuth;
            max_elevation = f64::MIN;
        }
        if in_pass {
            if elevation > max_elevation {
                max_elevation = elevation;
                tca = t;
                tca_teme = teme;
            }
            if elevation < min_elevation_deg {
                let visible = satellite_illuminated(tca_teme, tca)
                    && sun_altitude_deg(observer.latitude, observer.longitude, tca)
                        < TWILIGHT_SUN_ELEVATION_DEG;
                if !require_visible || visible {
                    return Ok(Some(PassEvent {
                        aos,
                        aos_azimuth,
                        tca,
                        max_elevation,
                        los: t,
                        los_azimuth: azimuth,
                        visible,
                    }));
                }
                in_pass = false;
            }
        }
        t += step;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn gmst_reference_epoch() {
        // GMST at J2000.0 is roughly 280.46 degrees.
        let gmst = gmst_deg(utc(2000, 1, 1, 12, 0));
        assert!((gmst - 280.46).abs() < 0.1, "gmst {}", gmst);
    }

    #[test]
    fn equinox_sunrise_on_the_equator() {
        let rs = sun_rise_set(0.0, 0.0, NaiveDate::from_ymd_opt(2021, 3, 20).unwrap());
        let rise = rs.rise.expect("sunrise");
        let set = rs.set.expect("sunset");
        // Around 06:00/18:00 UTC give or take the equation of time.
        let rise_minutes = rise.hour() * 60 + rise.minute();
        let set_minutes = set.hour() * 60 + set.minute();
        assert!((340..=385).contains(&rise_minutes), "rise {}", rise);
        assert!((1060..=1105).contains(&set_minutes), "set {}", set);
    }

    #[test]
    fn polar_night_has_no_sunrise() {
        let rs = sun_rise_set(78.0, 15.0, NaiveDate::from_ymd_opt(2021, 1, 5).unwrap());
        assert!(rs.rise.is_none());
        assert!(rs.set.is_none());
    }

    #[test]
    fn moon_events_exist_at_mid_latitudes() {
        let rs = moon_rise_set(51.8, 8.3, NaiveDate::from_ymd_opt(2021, 1, 16).unwrap());
        assert!(rs.rise.is_some() || rs.set.is_some());
    }

    #[test]
    fn overhead_satellite_has_ninety_degrees_elevation() {
        let observer = Observer {
            latitude: 0.0,
            longitude: 0.0,
            altitude_m: 0.0,
        };
        let (_, elevation) = look_angles(&observer, [EARTH_RADIUS_KM + 400.0, 0.0, 0.0]);
        assert!((elevation - 90.0).abs() < 0.5, "elevation {}", elevation);
    }

    #[test]
    fn eastern_satellite_bears_east() {
        let observer = Observer {
            latitude: 0.0,
            longitude: 0.0,
            altitude_m: 0.0,
        };
        // Slightly east of the observer at orbital height.
        let lon = 10.0_f64.to_radians();
        let r = EARTH_RADIUS_KM + 400.0;
        let (azimuth, elevation) = look_angles(&observer, [r * lon.cos(), r * lon.sin(), 0.0]);
        assert!((azimuth - 90.0).abs() < 1.0, "azimuth {}", azimuth);
        assert!(elevation > 0.0);
    }

    #[test]
    fn sun_direction_is_a_unit_vector() {
        let v = sun_unit_vector(utc(2021, 6, 1, 0, 0));
        let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }
}
