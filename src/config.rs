use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Sentinel callsign that switches the affected subsystem into
/// "configured but disabled" mode. For the station itself it means
/// read-only operation (nothing is written to the socket).
pub const NOCALL: &str = "N0CALL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub station: StationConfig,

    #[serde(default)]
    pub keys: ApiKeys,

    #[serde(default)]
    pub dapnet: DapnetConfig,

    #[serde(default)]
    pub mail: MailConfig,

    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub osm: OsmConfig,

    #[serde(default)]
    pub satpass: SatpassConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub bulletins: BulletinConfig,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    /// APRS-IS login callsign. N0CALL keeps the daemon in read-only mode.
    #[serde(default = "default_callsign")]
    pub callsign: String,

    /// Identifier used as the source of everything we transmit.
    #[serde(default = "default_alias")]
    pub alias: String,

    /// APRS destination ("tocall") for all outgoing frames.
    #[serde(default = "default_tocall")]
    pub tocall: String,

    /// Fixed-width APRS latitude, ddmm.mmN/S (8 chars).
    #[serde(default = "default_latitude")]
    pub latitude: String,

    /// Fixed-width APRS longitude, dddmm.mmE/W (9 chars).
    #[serde(default = "default_longitude")]
    pub longitude: String,

    /// Station altitude in feet, beaconed as /A=nnnnnn.
    #[serde(default = "default_altitude_ft")]
    pub altitude_ft: u32,

    #[serde(default = "default_symbol_table")]
    pub symbol_table: String,

    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Secondary addressee filter: messages to any of these identifiers
    /// are processed, everything else is dropped.
    #[serde(default = "default_addressees")]
    pub addressees: Vec<String>,

    #[serde(default = "default_server")]
    pub server: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Server-side filter expression sent with the login line.
    #[serde(default = "default_server_filter")]
    pub server_filter: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(default)]
    pub openweathermap: String,

    #[serde(default)]
    pub aprsfi: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DapnetConfig {
    #[serde(default = "default_nocall")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_dapnet_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailConfig {
    /// Empty account disables the position-mail feature.
    #[serde(default)]
    pub account: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub smtp_server: String,

    #[serde(default)]
    pub imap_server: String,

    /// Retention for the account's "Sent" folder in days. The prune job
    /// is destructive, so this has no default: a configuration with a
    /// mail account but no retention value is rejected.
    pub sent_retention_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_dedup_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_dedup_entries")]
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_beacon_minutes")]
    pub beacon_minutes: u64,

    #[serde(default = "default_bulletin_minutes")]
    pub bulletin_minutes: u64,

    /// Minimum delay between two message-payload writes.
    #[serde(default = "default_msg_delay")]
    pub msg_delay_secs: f64,

    /// Minimum delay before ack/beacon/bulletin writes.
    #[serde(default = "default_ack_delay")]
    pub ack_delay_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_refresh_satellites")]
    pub satellites_days: u64,

    #[serde(default = "default_refresh_repeaters")]
    pub repeaters_days: u64,

    #[serde(default = "default_refresh_airports")]
    pub airports_days: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// When false, every outgoing payload is reduced to 7-bit ASCII.
    #[serde(default)]
    pub force_unicode: bool,

    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsmConfig {
    /// Allow-listed OSM special-phrase categories accepted as bare keywords.
    #[serde(default = "default_osm_categories")]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatpassConfig {
    /// Passes peaking below this elevation are not reported.
    #[serde(default = "default_min_elevation")]
    pub min_elevation_deg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulletinConfig {
    /// Texts for BLN0..BLN2, sent in order every bulletin cycle.
    #[serde(default = "default_bulletin_texts")]
    pub texts: Vec<String>,

    /// Optional regional severe-weather broadcast mapping: bulletin
    /// recipient (e.g. "BLNWX") to a static regional announcement.
    #[serde(default)]
    pub regional: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_callsign() -> String {
    NOCALL.to_string()
}

fn default_alias() -> String {
    "OSKAR".to_string()
}

fn default_tocall() -> String {
    "APRS".to_string()
}

fn default_latitude() -> String {
    "5150.33N".to_string()
}

fn default_longitude() -> String {
    "00819.60E".to_string()
}

fn default_altitude_ft() -> u32 {
    460
}

fn default_symbol_table() -> String {
    "/".to_string()
}

fn default_symbol() -> String {
    "?".to_string()
}

fn default_addressees() -> Vec<String> {
    vec!["OSKAR".to_string(), "OSKR".to_string()]
}

fn default_server() -> String {
    "euro.aprs2.net".to_string()
}

fn default_port() -> u16 {
    14580
}

fn default_server_filter() -> String {
    "g/OSKAR/OSKR".to_string()
}

fn default_nocall() -> String {
    NOCALL.to_string()
}

fn default_dapnet_url() -> String {
    "http://www.hampager.de/api/calls".to_string()
}

fn default_dedup_ttl() -> u64 {
    3600
}

fn default_dedup_entries() -> usize {
    2160
}

fn default_beacon_minutes() -> u64 {
    30
}

fn default_bulletin_minutes() -> u64 {
    240
}

fn default_msg_delay() -> f64 {
    6.0
}

fn default_ack_delay() -> f64 {
    6.0
}

fn default_refresh_satellites() -> u64 {
    2
}

fn default_refresh_repeaters() -> u64 {
    7
}

fn default_refresh_airports() -> u64 {
    30
}

fn default_language() -> String {
    "en".to_string()
}

fn default_osm_categories() -> Vec<String> {
    [
        "atm", "bank", "bakery", "fuel", "hospital", "hotel", "pharmacy",
        "police", "post_office", "restaurant", "supermarket",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_min_elevation() -> f64 {
    10.0
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_bulletin_texts() -> Vec<String> {
    vec![
        format!(
            "{} {} Multi-Purpose APRS Bot",
            default_alias(),
            env!("CARGO_PKG_VERSION")
        ),
        "Send me a message with 'help' or 'info' for a short".to_string(),
        "summary of everything I can look up for you. 73".to_string(),
    ]
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            callsign: default_callsign(),
            alias: default_alias(),
            tocall: default_tocall(),
            latitude: default_latitude(),
            longitude: default_longitude(),
            altitude_ft: default_altitude_ft(),
            symbol_table: default_symbol_table(),
            symbol: default_symbol(),
            addressees: default_addressees(),
            server: default_server(),
            port: default_port(),
            server_filter: default_server_filter(),
        }
    }
}

impl Default for DapnetConfig {
    fn default() -> Self {
        Self {
            user: default_nocall(),
            password: String::new(),
            api_url: default_dapnet_url(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_dedup_ttl(),
            max_entries: default_dedup_entries(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            beacon_minutes: default_beacon_minutes(),
            bulletin_minutes: default_bulletin_minutes(),
            msg_delay_secs: default_msg_delay(),
            ack_delay_secs: default_ack_delay(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            satellites_days: default_refresh_satellites(),
            repeaters_days: default_refresh_repeaters(),
            airports_days: default_refresh_airports(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            force_unicode: false,
            language: default_language(),
        }
    }
}

impl Default for OsmConfig {
    fn default() -> Self {
        Self {
            categories: default_osm_categories(),
        }
    }
}

impl Default for SatpassConfig {
    fn default() -> Self {
        Self {
            min_elevation_deg: default_min_elevation(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_dir: default_log_dir(),
        }
    }
}

impl Default for BulletinConfig {
    fn default() -> Self {
        Self {
            texts: default_bulletin_texts(),
            regional: HashMap::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            station: StationConfig::default(),
            keys: ApiKeys::default(),
            dapnet: DapnetConfig::default(),
            mail: MailConfig::default(),
            dedup: DedupConfig::default(),
            timing: TimingConfig::default(),
            refresh: RefreshConfig::default(),
            output: OutputConfig::default(),
            osm: OsmConfig::default(),
            satpass: SatpassConfig::default(),
            paths: PathsConfig::default(),
            bulletins: BulletinConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("cannot parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the daemon cannot safely run with.
    pub fn validate(&self) -> Result<()> {
        let lat_re = regex::Regex::new(r"^\d{4}\.\d{2}[NS]$").unwrap();
        if !lat_re.is_match(&self.station.latitude) {
            bail!(
                "station.latitude '{}' is not in ddmm.mmN/S format",
                self.station.latitude
            );
        }
        let lon_re = regex::Regex::new(r"^\d{5}\.\d{2}[EW]$").unwrap();
        if !lon_re.is_match(&self.station.longitude) {
            bail!(
                "station.longitude '{}' is not in dddmm.mmE/W format",
                self.station.longitude
            );
        }
        if self.station.addressees.is_empty() {
            bail!("station.addressees must contain at least one identifier");
        }
        if self.bulletins.texts.len() > 10 {
            bail!("at most 10 bulletin texts are supported (BLN0..BLN9)");
        }
        for (n, text) in self.bulletins.texts.iter().enumerate() {
            if text.len() > 67 {
                bail!("bulletin text BLN{} exceeds 67 bytes", n);
            }
        }
        if self.mail_enabled() && self.mail.sent_retention_days.is_none() {
            bail!("mail.sent_retention_days is mandatory when a mail account is configured");
        }
        if let Some(days) = self.mail.sent_retention_days {
            if days == 0 {
                bail!("mail.sent_retention_days must be at least 1");
            }
        }
        if self.dedup.max_entries == 0 {
            bail!("dedup.max_entries must be non-zero");
        }
        if self.timing.beacon_minutes == 0 || self.timing.bulletin_minutes == 0 {
            bail!("beacon and bulletin intervals must be non-zero");
        }
        Ok(())
    }

    /// True when the daemon observes the network without transmitting.
    pub fn read_only(&self) -> bool {
        self.station.callsign.eq_ignore_ascii_case(NOCALL)
    }

    pub fn dapnet_enabled(&self) -> bool {
        !self.dapnet.user.eq_ignore_ascii_case(NOCALL) && !self.dapnet.user.is_empty()
    }

    pub fn mail_enabled(&self) -> bool {
        !self.mail.account.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_read_only() {
        let config = Config::default();
        assert!(config.read_only());
        assert!(!config.dapnet_enabled());
        assert!(!config.mail_enabled());
        config.validate().unwrap();
    }

    #[test]
    fn bad_latitude_is_rejected() {
        let mut config = Config::default();
        config.station.latitude = "51.8388N".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn mail_requires_retention() {
        let mut config = Config::default();
        config.mail.account = "bot@example.com".to_string();
        assert!(config.validate().is_err());
        config.mail.sent_retention_days = Some(1);
        config.validate().unwrap();
    }

    #[test]
    fn parses_partial_file() {
        let config: Config = toml::from_str(
            r#"
            [station]
            callsign = "DL1ABC"
            addressees = ["OSKAR"]

            [timing]
            beacon_minutes = 15
            "#,
        )
        .unwrap();
        assert_eq!(config.station.callsign, "DL1ABC");
        assert_eq!(config.timing.beacon_minutes, 15);
        assert_eq!(config.timing.bulletin_minutes, 240);
        assert!(!config.read_only());
    }
}
