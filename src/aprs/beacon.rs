//! Beacon and bulletin frame builders. Position beacons carry the
//! configured fixed-width coordinates, symbol and altitude; bulletins go
//! out to the BLN0..BLNn recipients in configured order.

use std::collections::HashMap;

use crate::config::StationConfig;

use super::frame::{format_message_frame, format_plain_frame};

/// Position beacon plus status line, in send order.
pub fn beacon_frames(station: &StationConfig, version: &str) -> Vec<String> {
    let position = format!(
        "={}{}{}{}{} {} /A={:06}",
        station.latitude,
        station.symbol_table,
        station.longitude,
        station.symbol,
        station.alias,
        version,
        station.altitude_ft,
    );
    let status = format!(">{} {} - APRS message bot, msg 'help' for usage", station.alias, version);
    vec![
        format_plain_frame(&station.alias, &station.tocall, &position),
        format_plain_frame(&station.alias, &station.tocall, &status),
    ]
}

/// The BLN0..BLNn cycle in order, followed by any configured regional
/// broadcast lines (sorted by recipient for a stable cycle).
pub fn bulletin_frames(
    station: &StationConfig,
    texts: &[String],
    regional: &HashMap<String, String>,
) -> Vec<String> {
    let mut frames: Vec<String> = texts
        .iter()
        .enumerate()
        .map(|(n, text)| {
            format_message_frame(&station.alias, &station.tocall, &format!("BLN{}", n), text)
        })
        .collect();

    let mut regions: Vec<(&String, &String)> = regional.iter().collect();
    regions.sort();
    for (recipient, text) in regions {
        frames.push(format_message_frame(
            &station.alias,
            &station.tocall,
            recipient,
            text,
        ));
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StationConfig;

    #[test]
    fn beacon_contains_position_and_altitude() {
        let station = StationConfig::default();
        let frames = beacon_frames(&station, "0.3.1");
        assert_eq!(frames.len(), 2);
        assert!(frames[0].starts_with("OSKAR>APRS:=5150.33N/00819.60E?"));
        assert!(frames[0].contains("/A=000460"));
        assert!(frames[1].contains(">OSKAR"));
    }

    #[test]
    fn bulletins_are_ordered() {
        let station = StationConfig::default();
        let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let frames = bulletin_frames(&station, &texts, &HashMap::new());
        assert_eq!(frames.len(), 3);
        assert!(frames[0].contains("::BLN0     :one"));
        assert!(frames[1].contains("::BLN1     :two"));
        assert!(frames[2].contains("::BLN2     :three"));
    }

    #[test]
    fn regional_broadcasts_follow_the_cycle() {
        let station = StationConfig::default();
        let texts = vec!["one".to_string()];
        let mut regional = HashMap::new();
        regional.insert("BLNWX".to_string(), "Severe wx info for region".to_string());
        let frames = bulletin_frames(&station, &texts, &regional);
        assert_eq!(frames.len(), 2);
        assert!(frames[1].contains("::BLNWX    :Severe wx info"));
    }
}
