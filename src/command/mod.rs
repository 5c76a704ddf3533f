//! The structured command record produced by the parser. A free-text
//! message body is resolved into exactly one [`Action`], a tagged
//! [`Target`] and a set of typed modifiers; the dispatcher matches on
//! these exhaustively.

pub mod parser;

pub use parser::{parse, ParserDefaults, TargetCatalog};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Wx,
    Metar,
    Taf,
    MetarTafFull,
    Cwop,
    WhereIs,
    WhereAmI,
    RiseSet,
    SatPass,
    VisPass,
    SatFreq,
    Repeater,
    OsmCategory,
    Dapnet,
    DapnetHighPri,
    PosMsg,
    Fortune,
    Sonde,
    Help,
    Unknown,
}

/// Symbolic request target. Resolution to coordinates happens in the
/// dispatcher; the parser only records what the user referred to.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// The sender's own last known position.
    UserPosition,
    OtherCallsign(String),
    LatLon(f64, f64),
    Grid(String),
    Zip {
        code: String,
        country: Option<String>,
    },
    CityCountry {
        city: String,
        state: Option<String>,
        country: Option<String>,
    },
    Icao(String),
    Iata(String),
    Satellite(String),
    CwopStation(String),
    OsmPhrase(String),
    Email(String),
    DapnetUser(String),
    RepeaterFilter {
        band: Option<String>,
        mode: Option<String>,
    },
}

/// Date selector relative to "now": whole days (0 = today) or an hour
/// offset into the hourly forecast grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOffset {
    Days(u8),
    Hours(u8),
}

impl DateOffset {
    pub fn is_today(&self) -> bool {
        matches!(self, DateOffset::Days(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Daytime {
    Full,
    Morning,
    Day,
    Evening,
    Night,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    Metric,
    Imperial,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub action: Action,
    pub target: Target,
    pub date: DateOffset,
    pub daytime: Daytime,
    pub units: Units,
    pub language: String,
    pub top_n: u8,
    pub force_unicode: bool,
    /// Free-text tail for actions that carry one (pager messages).
    pub payload: Option<String>,
    /// Error text shown to the user when the action is Unknown.
    pub error: Option<String>,
}

impl Command {
    /// Canonical textual form of the record. Re-parsing this string
    /// yields an equivalent record (round-trip law of the grammar).
    pub fn canonical_string(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        match self.action {
            Action::Wx => parts.push("wx".into()),
            Action::Metar => parts.push("metar".into()),
            Action::Taf => parts.push("taf".into()),
            Action::MetarTafFull => parts.push("metar".into()),
            Action::Cwop => parts.push("cwop".into()),
            Action::WhereIs => parts.push("whereis".into()),
            Action::WhereAmI => parts.push("whereami".into()),
            Action::RiseSet => parts.push("riseset".into()),
            Action::SatPass => parts.push("satpass".into()),
            Action::VisPass => parts.push("vispass".into()),
            Action::SatFreq => parts.push("satfreq".into()),
            Action::Repeater => parts.push("repeater".into()),
            Action::OsmCategory => parts.push("osm".into()),
            Action::Dapnet => parts.push("dapnet".into()),
            Action::DapnetHighPri => parts.push("dapnethp".into()),
            Action::PosMsg => parts.push("posmsg".into()),
            Action::Fortune => parts.push("fortuneteller".into()),
            Action::Sonde => parts.push("sonde".into()),
            Action::Help => parts.push("help".into()),
            Action::Unknown => {}
        }
        match &self.target {
            Target::UserPosition => {}
            Target::OtherCallsign(call) => parts.push(call.to_lowercase()),
            Target::LatLon(lat, lon) => parts.push(format!("{}/{}", lat, lon)),
            Target::Grid(grid) => parts.push(format!("grid {}", grid.to_lowercase())),
            Target::Zip { code, country } => match country {
                Some(country) => parts.push(format!("zip {};{}", code, country.to_lowercase())),
                None => parts.push(format!("zip {}", code)),
            },
            Target::CityCountry {
                city,
                state,
                country,
            } => {
                let mut s = city.to_lowercase();
                if let Some(state) = state {
                    s.push(',');
                    s.push_str(&state.to_lowercase());
                }
                if let Some(country) = country {
                    s.push(';');
                    s.push_str(&country.to_lowercase());
                }
                parts.push(s);
            }
            Target::Icao(code) => parts.push(format!("icao {}", code.to_lowercase())),
            Target::Iata(code) => parts.push(format!("iata {}", code.to_lowercase())),
            Target::Satellite(name) => parts.push(name.to_lowercase()),
            Target::CwopStation(id) => parts.push(id.to_lowercase()),
            Target::OsmPhrase(phrase) => parts.push(phrase.to_lowercase()),
            Target::Email(addr) => parts.push(addr.to_lowercase()),
            Target::DapnetUser(user) => parts.push(user.to_lowercase()),
            Target::RepeaterFilter { band, mode } => {
                if let Some(mode) = mode {
                    parts.push(mode.to_lowercase());
                }
                if let Some(band) = band {
                    parts.push(band.to_lowercase());
                }
            }
        }
        // Payload-carrying actions consume the rest of the line, so no
        // modifier may follow the payload.
        if let Some(payload) = &self.payload {
            parts.push(payload.clone());
            return parts.join(" ");
        }
        match self.date {
            DateOffset::Days(0) => {}
            DateOffset::Days(d) => parts.push(format!("{}d", d)),
            DateOffset::Hours(h) => parts.push(format!("{}h", h)),
        }
        match self.daytime {
            Daytime::Full => {}
            Daytime::Morning => parts.push("morning".into()),
            Daytime::Day => parts.push("daytime".into()),
            Daytime::Evening => parts.push("evening".into()),
            Daytime::Night => parts.push("night".into()),
        }
        match self.units {
            Units::Metric => parts.push("metric".into()),
            Units::Imperial => parts.push("imperial".into()),
        }
        if self.language != "en" {
            parts.push(format!("lang {}", self.language));
        }
        if self.top_n > 1 {
            parts.push(format!("top{}", self.top_n));
        }
        if self.force_unicode {
            parts.push("unicode".into());
        }
        if self.action == Action::MetarTafFull {
            parts.push("full".into());
        }
        parts.join(" ")
    }
}
