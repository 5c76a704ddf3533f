//! Geodesic primitives: great-circle distance and bearing, Maidenhead,
//! DMS, UTM and MGRS conversions. Pure functions over WGS84; the rest of
//! the daemon treats this module as a black box.

const EARTH_RADIUS_KM: f64 = 6371.0;

// WGS84 ellipsoid
const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const UTM_K0: f64 = 0.9996;

pub fn km_to_miles(km: f64) -> f64 {
    km * 0.621_371_192
}

/// Great-circle distance in kilometers (haversine).
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Initial great-circle bearing in degrees, 0..360.
pub fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let y = dlambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// 16-wind compass direction for a bearing.
pub fn direction_for(bearing: f64) -> &'static str {
    const DIRECTIONS: [&str; 16] = [
        "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW",
        "NW", "NNW",
    ];
    let index = ((bearing % 360.0) / 22.5).round() as usize % 16;
    DIRECTIONS[index]
}

/// Encode coordinates as a 6-character Maidenhead locator.
pub fn latlon_to_maidenhead(lat: f64, lon: f64) -> String {
    let lon = lon + 180.0;
    let lat = lat + 90.0;

    let field_lon = (lon / 20.0).floor() as u8;
    let field_lat = (lat / 10.0).floor() as u8;
    let square_lon = ((lon % 20.0) / 2.0).floor() as u8;
    let square_lat = (lat % 10.0).floor() as u8;
    let sub_lon = ((lon % 2.0) * 12.0).floor() as u8;
    let sub_lat = ((lat % 1.0) * 24.0).floor() as u8;

    let mut locator = String::with_capacity(6);
    locator.push((b'A' + field_lon.min(17)) as char);
    locator.push((b'A' + field_lat.min(17)) as char);
    locator.push((b'0' + square_lon) as char);
    locator.push((b'0' + square_lat) as char);
    locator.push((b'a' + sub_lon) as char);
    locator.push((b'a' + sub_lat) as char);
    locator
}

/// Decode a 4- or 6-character Maidenhead locator to the center of its
/// cell. Returns `None` on malformed input.
pub fn maidenhead_to_latlon(locator: &str) -> Option<(f64, f64)> {
    let chars: Vec<char> = locator.to_uppercase().chars().collect();
    if chars.len() != 4 && chars.len() != 6 {
        return None;
    }

    let field_lon = (chars[0] as i32) - ('A' as i32);
    let field_lat = (chars[1] as i32) - ('A' as i32);
    let square_lon = chars[2].to_digit(10)? as i32;
    let square_lat = chars[3].to_digit(10)? as i32;
    if !(0..18).contains(&field_lon) || !(0..18).contains(&field_lat) {
        return None;
    }

    let mut lon = field_lon as f64 * 20.0 + square_lon as f64 * 2.0 - 180.0;
    let mut lat = field_lat as f64 * 10.0 + square_lat as f64 - 90.0;

    if chars.len() == 6 {
        let sub_lon = (chars[4] as i32) - ('A' as i32);
        let sub_lat = (chars[5] as i32) - ('A' as i32);
        if !(0..24).contains(&sub_lon) || !(0..24).contains(&sub_lat) {
            return None;
        }
        lon += sub_lon as f64 * (2.0 / 24.0) + 1.0 / 24.0;
        lat += sub_lat as f64 * (1.0 / 24.0) + 0.5 / 24.0;
    } else {
        lon += 1.0;
        lat += 0.5;
    }
    Some((lat, lon))
}

/// Degrees/minutes/seconds plus hemisphere letter for one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dms {
    pub degrees: u32,
    pub minutes: u32,
    pub seconds: f64,
    pub hemisphere: char,
}

pub fn latlon_to_dms(lat: f64, lon: f64) -> (Dms, Dms) {
    (to_dms(lat, 'N', 'S'), to_dms(lon, 'E', 'W'))
}

fn to_dms(value: f64, positive: char, negative: char) -> Dms {
    let hemisphere = if value < 0.0 { negative } else { positive };
    let value = value.abs();
    let degrees = value.floor();
    let minutes = ((value - degrees) * 60.0).floor();
    let seconds = (value - degrees - minutes / 60.0) * 3600.0;
    Dms {
        degrees: degrees as u32,
        minutes: minutes as u32,
        seconds,
        hemisphere,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utm {
    pub zone_number: u8,
    pub zone_letter: char,
    pub easting: f64,
    pub northing: f64,
}

/// Convert to UTM (WGS84, transverse Mercator series).
pub fn latlon_to_utm(lat: f64, lon: f64) -> Utm {
    let zone_number = (((lon + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60) as u8;
    let zone_letter = utm_zone_letter(lat);
    let lon0 = (zone_number as f64 - 1.0) * 6.0 - 180.0 + 3.0;

    let e2 = WGS84_F * (2.0 - WGS84_F);
    let ep2 = e2 / (1.0 - e2);

    let phi = lat.to_radians();
    let dlambda = (lon - lon0).to_radians();

    let n = WGS84_A / (1.0 - e2 * phi.sin().powi(2)).sqrt();
    let t = phi.tan().powi(2);
    let c = ep2 * phi.cos().powi(2);
    let a = phi.cos() * dlambda;

    // Meridional arc
    let m = WGS84_A
        * ((1.0 - e2 / 4.0 - 3.0 * e2.powi(2) / 64.0 - 5.0 * e2.powi(3) / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e2.powi(2) / 32.0 + 45.0 * e2.powi(3) / 1024.0)
                * (2.0 * phi).sin()
            + (15.0 * e2.powi(2) / 256.0 + 45.0 * e2.powi(3) / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e2.powi(3) / 3072.0) * (6.0 * phi).sin());

    let easting = UTM_K0
        * n
        * (a + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t.powi(2) + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
        + 500_000.0;

    let mut northing = UTM_K0
        * (m + n
            * phi.tan()
            * (a.powi(2) / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c.powi(2)) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t.powi(2) + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));
    if lat < 0.0 {
        northing += 10_000_000.0;
    }

    Utm {
        zone_number,
        zone_letter,
        easting,
        northing,
    }
}

fn utm_zone_letter(lat: f64) -> char {
    const LETTERS: &[u8] = b"CDEFGHJKLMNPQRSTUVWX";
    if !(-80.0..=84.0).contains(&lat) {
        return 'Z';
    }
    let index = (((lat + 80.0) / 8.0).floor() as usize).min(LETTERS.len() - 1);
    LETTERS[index] as char
}

/// MGRS reference with 1-meter resolution, e.g. `17TPJ3008433438`.
pub fn latlon_to_mgrs(lat: f64, lon: f64) -> String {
    let utm = latlon_to_utm(lat, lon);

    const COLUMN_SETS: [&[u8]; 3] = [b"STUVWXYZ", b"ABCDEFGH", b"JKLMNPQR"];
    const ROW_LETTERS: &[u8] = b"ABCDEFGHJKLMNPQRSTUV";

    let column_set = COLUMN_SETS[(utm.zone_number % 3) as usize];
    let column_index = ((utm.easting / 100_000.0).floor() as usize).saturating_sub(1) % 8;
    let column = column_set[column_index] as char;

    let mut row_index = (utm.northing / 100_000.0).floor() as usize % 20;
    // Even zones shift the row cycle by five letters.
    if utm.zone_number % 2 == 0 {
        row_index = (row_index + 5) % 20;
    }
    let row = ROW_LETTERS[row_index] as char;

    let easting_rem = (utm.easting % 100_000.0).floor() as u32;
    let northing_rem = (utm.northing % 100_000.0).floor() as u32;

    format!(
        "{}{}{}{}{:05}{:05}",
        utm.zone_number, utm.zone_letter, column, row, easting_rem, northing_rem
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const BERLIN: (f64, f64) = (52.52, 13.405);
    const PARIS: (f64, f64) = (48.8566, 2.3522);

    #[test]
    fn distance_berlin_paris() {
        let d = distance_km(BERLIN.0, BERLIN.1, PARIS.0, PARIS.1);
        assert!((d - 878.0).abs() < 10.0, "distance was {}", d);
    }

    #[test]
    fn bearing_berlin_paris_is_southwest() {
        let b = bearing_deg(BERLIN.0, BERLIN.1, PARIS.0, PARIS.1);
        assert!((240.0..255.0).contains(&b), "bearing was {}", b);
        assert_eq!(direction_for(b), "WSW");
    }

    #[test]
    fn compass_directions() {
        assert_eq!(direction_for(0.0), "N");
        assert_eq!(direction_for(359.0), "N");
        assert_eq!(direction_for(45.0), "NE");
        assert_eq!(direction_for(90.0), "E");
        assert_eq!(direction_for(180.0), "S");
        assert_eq!(direction_for(270.0), "W");
    }

    #[test]
    fn maidenhead_berlin() {
        assert_eq!(latlon_to_maidenhead(BERLIN.0, BERLIN.1), "JO62qm");
    }

    #[test]
    fn maidenhead_round_trip() {
        let (lat, lon) = maidenhead_to_latlon("JO62qm").unwrap();
        assert!((lat - BERLIN.0).abs() < 0.05, "lat {}", lat);
        assert!((lon - BERLIN.1).abs() < 0.1, "lon {}", lon);

        let (lat, lon) = maidenhead_to_latlon("JO62").unwrap();
        assert!((lat - 52.5).abs() < 0.5);
        assert!((lon - 13.0).abs() < 1.0);
    }

    #[test]
    fn maidenhead_rejects_garbage() {
        assert!(maidenhead_to_latlon("XX99xx9").is_none());
        assert!(maidenhead_to_latlon("1234").is_none());
        assert!(maidenhead_to_latlon("ZZ00").is_none());
    }

    #[test]
    fn dms_conversion() {
        let (lat, lon) = latlon_to_dms(52.52, -13.405);
        assert_eq!(lat.degrees, 52);
        assert_eq!(lat.minutes, 31);
        assert_eq!(lat.hemisphere, 'N');
        assert_eq!(lon.degrees, 13);
        assert_eq!(lon.minutes, 24);
        assert_eq!(lon.hemisphere, 'W');
    }

    #[test]
    fn utm_cn_tower() {
        // Canonical example: CN Tower, Toronto -> 17T 630084 4833439
        let utm = latlon_to_utm(43.642567, -79.387139);
        assert_eq!(utm.zone_number, 17);
        assert_eq!(utm.zone_letter, 'T');
        assert!((utm.easting - 630_084.0).abs() < 5.0, "easting {}", utm.easting);
        assert!(
            (utm.northing - 4_833_439.0).abs() < 5.0,
            "northing {}",
            utm.northing
        );
    }

    #[test]
    fn utm_southern_hemisphere_offset() {
        let utm = latlon_to_utm(-33.8688, 151.2093);
        assert_eq!(utm.zone_letter, 'H');
        assert!(utm.northing > 6_000_000.0);
    }

    #[test]
    fn mgrs_cn_tower() {
        let mgrs = latlon_to_mgrs(43.642567, -79.387139);
        assert!(mgrs.starts_with("17TPJ"), "mgrs was {}", mgrs);
    }

    #[test]
    fn km_to_miles_conversion() {
        assert!((km_to_miles(100.0) - 62.137).abs() < 0.01);
    }
}
