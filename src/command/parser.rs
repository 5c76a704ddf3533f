//! Deterministic, priority-ordered command parser. The free-text body
//! is examined in three passes: explicit action keywords first, then
//! bare-form targets, then modifier tokens in any position. Every match
//! is excised from the working copy so later passes cannot trip over it.
//! The priority order is the user-visible contract; colliding bare
//! tokens (a pub named like an IATA code) lose to the earlier category
//! and must be disambiguated with the explicit keyword.
//!
//! The parser is pure: it performs no network calls. Symbolic targets
//! are resolved to coordinates by the dispatcher.

use chrono::{Datelike, Local, Weekday};
use regex::Regex;

use super::{Action, Command, DateOffset, Daytime, Target, Units};

/// Local catalogs the parser consults to decide whether a bare token is
/// an airport code or a satellite name. Backed by the reference-data
/// indices at runtime.
pub trait TargetCatalog {
    fn is_icao(&self, code: &str) -> bool;
    fn is_iata(&self, code: &str) -> bool;
    fn is_satellite(&self, name: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct ParserDefaults {
    pub language: String,
    pub force_unicode: bool,
    pub osm_categories: Vec<String>,
}

const ERR_CANNOT_GROK: &str = "Cannot grok command";
const ERR_NO_SATELLITE: &str = "No satellite specified";
const ERR_NO_OSM_CATEGORY: &str = "Unknown OSM category";

/// Languages the weather provider understands; anything else silently
/// falls back to English.
const SUPPORTED_LANGUAGES: &[&str] = &[
    "af", "al", "ar", "az", "bg", "ca", "cz", "da", "de", "el", "en", "es", "eu", "fa", "fi",
    "fr", "gl", "he", "hi", "hr", "hu", "id", "it", "ja", "kr", "la", "lt", "mk", "nl", "no",
    "pl", "pt", "ro", "ru", "se", "sk", "sl", "sq", "sr", "th", "tr", "ua", "vi", "zh", "zu",
];

pub fn parse(
    text: &str,
    sender: &str,
    catalog: &dyn TargetCatalog,
    defaults: &ParserDefaults,
) -> Command {
    parse_with_today(text, sender, catalog, defaults, Local::now().date_naive().weekday())
}

struct ParseState {
    working: String,
    action: Option<Action>,
    target: Option<Target>,
    date: Option<DateOffset>,
    daytime: Option<Daytime>,
    units: Units,
    language: String,
    top_n: u8,
    force_unicode: bool,
    payload: Option<String>,
    error: Option<String>,
}

pub fn parse_with_today(
    text: &str,
    sender: &str,
    catalog: &dyn TargetCatalog,
    defaults: &ParserDefaults,
    today: Weekday,
) -> Command {
    let mut state = ParseState {
        working: normalize_whitespace(text),
        action: None,
        target: None,
        date: None,
        daytime: None,
        units: default_units_for(sender),
        language: defaults.language.clone(),
        top_n: 1,
        force_unicode: defaults.force_unicode,
        payload: None,
        error: None,
    };

    scan_action_keywords(&mut state, defaults);
    if state.error.is_none() {
        scan_language(&mut state);
        scan_bare_targets(&mut state, catalog, defaults);
        scan_modifiers(&mut state, today);
    }

    finalize(state)
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// US plus Liberia/Myanmar prefixes imply the imperial system; keyword
/// modifiers override this later.
fn default_units_for(sender: &str) -> Units {
    let us = Regex::new(r"(?i)^[AKNW][A-Z]{0,2}[0-9][A-Z]{1,3}").unwrap();
    let imperial_others = Regex::new(r"(?i)^(A8|D5|EL|5L|5M|6Z|XY|XZ)").unwrap();
    if us.is_match(sender) || imperial_others.is_match(sender) {
        Units::Imperial
    } else {
        Units::Metric
    }
}

/// Excise a regex match from the working copy, keeping a single space so
/// word boundaries survive.
fn excise(working: &mut String, re: &Regex) {
    *working = normalize_whitespace(&re.replace(working, " "));
}

fn scan_action_keywords(state: &mut ParseState, defaults: &ParserDefaults) {
    // Pager messages consume the rest of the line as payload.
    let re = Regex::new(r"(?i)\b(dapnethp|dapnet)\s+([A-Za-z0-9-]+)\s+(.+)$").unwrap();
    if state.action.is_none() {
        if let Some(caps) = re.captures(&state.working.clone()) {
            state.action = Some(if caps[1].eq_ignore_ascii_case("dapnethp") {
                Action::DapnetHighPri
            } else {
                Action::Dapnet
            });
            state.target = Some(Target::DapnetUser(caps[2].to_lowercase()));
            state.payload = Some(caps[3].to_string());
            excise(&mut state.working, &re);
            return;
        }
    }

    let re = Regex::new(r"(?i)\b(?:posmsg|posrpt)\s+(\S+@\S+\.\w+)").unwrap();
    if state.action.is_none() {
        if let Some(caps) = re.captures(&state.working.clone()) {
            state.action = Some(Action::PosMsg);
            state.target = Some(Target::Email(caps[1].to_lowercase()));
            excise(&mut state.working, &re);
        }
    }

    let re = Regex::new(r"(?i)\bsonde\s+([A-Za-z0-9-]+)").unwrap();
    if state.action.is_none() {
        if let Some(caps) = re.captures(&state.working.clone()) {
            state.action = Some(Action::Sonde);
            state.target = Some(Target::OtherCallsign(caps[1].to_uppercase()));
            excise(&mut state.working, &re);
        }
    }

    let re = Regex::new(r"(?i)\b(satpass|vispass|satfreq)(?:\s+([A-Za-z0-9-]+))?\b").unwrap();
    if state.action.is_none() {
        if let Some(caps) = re.captures(&state.working.clone()) {
            match caps.get(2) {
                Some(name) => {
                    state.action = Some(match caps[1].to_lowercase().as_str() {
                        "satpass" => Action::SatPass,
                        "vispass" => Action::VisPass,
                        _ => Action::SatFreq,
                    });
                    state.target = Some(Target::Satellite(normalize_satellite_name(name.as_str())));
                }
                // Keyword without a satellite: report the error instead of
                // letting the wx default kick in.
                None => {
                    state.action = Some(Action::Unknown);
                    state.error = Some(ERR_NO_SATELLITE.to_string());
                }
            }
            excise(&mut state.working, &re);
            if state.error.is_some() {
                return;
            }
        }
    }

    let re = Regex::new(r"(?i)\bcwop\s+([A-Za-z0-9-]+)\b").unwrap();
    if state.action.is_none() {
        if let Some(caps) = re.captures(&state.working.clone()) {
            state.action = Some(Action::Cwop);
            let arg = caps[1].to_uppercase();
            state.target = Some(if arg.contains('-') {
                Target::OtherCallsign(arg)
            } else {
                Target::CwopStation(arg)
            });
            excise(&mut state.working, &re);
        }
    }
    let re = Regex::new(r"(?i)\bcwop\b").unwrap();
    if state.action.is_none() && re.is_match(&state.working) {
        state.action = Some(Action::Cwop);
        excise(&mut state.working, &re);
    }

    // metar/taf, optionally bound to another station's position
    let re = Regex::new(
        r"(?i)\b(metar|taf)\s+([A-Za-z0-9]{1,3}[0-9][A-Za-z0-9]{0,3}(?:-[A-Za-z0-9]{1,2})?)\b",
    )
    .unwrap();
    if state.action.is_none() {
        if let Some(caps) = re.captures(&state.working.clone()) {
            if !caps[2].chars().all(|c| c.is_ascii_digit()) {
                state.action = Some(if caps[1].eq_ignore_ascii_case("taf") {
                    Action::Taf
                } else {
                    Action::Metar
                });
                state.target = Some(Target::OtherCallsign(caps[2].to_uppercase()));
                excise(&mut state.working, &re);
            }
        }
    }
    let re = Regex::new(r"(?i)\b(metar|taf)\b").unwrap();
    if state.action.is_none() {
        if let Some(caps) = re.captures(&state.working.clone()) {
            state.action = Some(if caps[1].eq_ignore_ascii_case("taf") {
                Action::Taf
            } else {
                Action::Metar
            });
            excise(&mut state.working, &re);
        }
    }

    let re = Regex::new(r"(?i)\bicao\s*([A-Za-z0-9]{4})\b").unwrap();
    if state.target.is_none() {
        if let Some(caps) = re.captures(&state.working.clone()) {
            state.target = Some(Target::Icao(caps[1].to_uppercase()));
            if state.action.is_none() {
                state.action = Some(Action::Metar);
            }
            excise(&mut state.working, &re);
        }
    }

    let re = Regex::new(r"(?i)\biata\s*([A-Za-z0-9]{3})\b").unwrap();
    if state.target.is_none() {
        if let Some(caps) = re.captures(&state.working.clone()) {
            state.target = Some(Target::Iata(caps[1].to_uppercase()));
            if state.action.is_none() {
                state.action = Some(Action::Metar);
            }
            excise(&mut state.working, &re);
        }
    }

    let re = Regex::new(r"(?i)\bwhereis\s+([A-Za-z0-9-]+)\b").unwrap();
    if state.action.is_none() {
        if let Some(caps) = re.captures(&state.working.clone()) {
            state.action = Some(Action::WhereIs);
            state.target = Some(Target::OtherCallsign(caps[1].to_uppercase()));
            excise(&mut state.working, &re);
        }
    }
    let re = Regex::new(r"(?i)\bwhereis\b").unwrap();
    if state.action.is_none() && re.is_match(&state.working) {
        state.action = Some(Action::WhereIs);
        excise(&mut state.working, &re);
    }

    let re = Regex::new(r"(?i)\bwhereami\b").unwrap();
    if state.action.is_none() && re.is_match(&state.working) {
        state.action = Some(Action::WhereAmI);
        excise(&mut state.working, &re);
    }

    let re = Regex::new(
        r"(?i)\briseset\s+([A-Za-z0-9]{1,3}[0-9][A-Za-z0-9]{0,3}(?:-[A-Za-z0-9]{1,2})?)\b",
    )
    .unwrap();
    if state.action.is_none() {
        if let Some(caps) = re.captures(&state.working.clone()) {
            if !caps[1].chars().all(|c| c.is_ascii_digit()) {
                state.action = Some(Action::RiseSet);
                state.target = Some(Target::OtherCallsign(caps[1].to_uppercase()));
                excise(&mut state.working, &re);
            }
        }
    }
    let re = Regex::new(r"(?i)\briseset\b").unwrap();
    if state.action.is_none() && re.is_match(&state.working) {
        state.action = Some(Action::RiseSet);
        excise(&mut state.working, &re);
    }

    scan_repeater(state);

    let re = Regex::new(r"(?i)\bosm\s+([a-z_]+)\b").unwrap();
    if state.action.is_none() {
        if let Some(caps) = re.captures(&state.working.clone()) {
            let phrase = caps[1].to_lowercase();
            if defaults.osm_categories.contains(&phrase) {
                state.action = Some(Action::OsmCategory);
                state.target = Some(Target::OsmPhrase(phrase));
            } else {
                state.action = Some(Action::Unknown);
                state.error = Some(format!("{}: '{}'", ERR_NO_OSM_CATEGORY, phrase));
            }
            excise(&mut state.working, &re);
            if state.error.is_some() {
                return;
            }
        }
    }

    let re = Regex::new(r"(?i)\b(fortuneteller|magic8ball|magic8|m8b)\b").unwrap();
    if state.action.is_none() && re.is_match(&state.working) {
        state.action = Some(Action::Fortune);
        excise(&mut state.working, &re);
    }

    let re = Regex::new(r"(?i)\b(help|info)\b").unwrap();
    if state.action.is_none() && re.is_match(&state.working) {
        state.action = Some(Action::Help);
        excise(&mut state.working, &re);
    }

    let re = Regex::new(r"(?i)\b(?:grid|mh)\s*([A-Za-z]{2}[0-9]{2}[A-Za-z]{0,2})\b").unwrap();
    if state.target.is_none() {
        if let Some(caps) = re.captures(&state.working.clone()) {
            state.target = Some(Target::Grid(caps[1].to_lowercase()));
            excise(&mut state.working, &re);
        }
    }

    // zip with country, then the bare 5-digit US form
    let re = Regex::new(r"(?i)\bzip\s*([A-Za-z0-9][A-Za-z0-9- ]{2,9});\s*([A-Za-z]{2})\b").unwrap();
    if state.target.is_none() {
        if let Some(caps) = re.captures(&state.working.clone()) {
            state.target = Some(Target::Zip {
                code: caps[1].trim().to_uppercase(),
                country: Some(caps[2].to_uppercase()),
            });
            excise(&mut state.working, &re);
        }
    }
    let re = Regex::new(r"(?i)\bzip\s*([0-9]{5})\b").unwrap();
    if state.target.is_none() {
        if let Some(caps) = re.captures(&state.working.clone()) {
            state.target = Some(Target::Zip {
                code: caps[1].to_string(),
                country: None,
            });
            excise(&mut state.working, &re);
        }
    }

    let re = Regex::new(
        r"(?i)\b(?:wx|forecast)\s+([A-Za-z0-9]{1,3}[0-9][A-Za-z0-9]{0,3}(?:-[A-Za-z0-9]{1,2})?)\b",
    )
    .unwrap();
    if state.action.is_none() {
        if let Some(caps) = re.captures(&state.working.clone()) {
            // All-digit arguments are zip codes, not callsigns.
            if !caps[1].chars().all(|c| c.is_ascii_digit()) {
                state.action = Some(Action::Wx);
                state.target = Some(Target::OtherCallsign(caps[1].to_uppercase()));
                excise(&mut state.working, &re);
            }
        }
    }
    let re = Regex::new(r"(?i)\b(?:wx|forecast)\b").unwrap();
    if state.action.is_none() && re.is_match(&state.working) {
        state.action = Some(Action::Wx);
        excise(&mut state.working, &re);
    }
}

/// The repeater keyword accepts band and mode filters in either order.
fn scan_repeater(state: &mut ParseState) {
    if state.action.is_some() {
        return;
    }
    const MODES: &str = "fm|dstar|d-star|dmr|c4fm|ysf|tetra|atv";
    const BAND: &str = r"\d+(?:[.,]\d+)?(?:cm|mm|m)";

    let patterns = [
        format!(r"(?i)\brepeater\s+({MODES})\s+({BAND})\b"),
        format!(r"(?i)\brepeater\s+({BAND})\s+({MODES})\b"),
        format!(r"(?i)\brepeater\s+({MODES})\b"),
        format!(r"(?i)\brepeater\s+({BAND})\b"),
        r"(?i)\brepeater\b".to_string(),
    ];

    for (n, pattern) in patterns.iter().enumerate() {
        let re = Regex::new(pattern).unwrap();
        let working = state.working.clone();
        let Some(caps) = re.captures(&working) else {
            continue;
        };
        let (mode, band) = match n {
            0 => (Some(caps[1].to_string()), Some(caps[2].to_string())),
            1 => (Some(caps[2].to_string()), Some(caps[1].to_string())),
            2 => (Some(caps[1].to_string()), None),
            3 => (None, Some(caps[1].to_string())),
            _ => (None, None),
        };
        state.action = Some(Action::Repeater);
        state.target = Some(Target::RepeaterFilter {
            band: band.map(|b| b.to_lowercase()),
            mode: mode.map(|m| normalize_repeater_mode(&m)),
        });
        excise(&mut state.working, &re);
        return;
    }
}

pub fn normalize_repeater_mode(mode: &str) -> String {
    match mode.to_lowercase().as_str() {
        "ysf" => "c4fm".to_string(),
        "d-star" => "dstar".to_string(),
        other => other.to_string(),
    }
}

pub fn normalize_satellite_name(name: &str) -> String {
    let dashed = name.trim().replace(' ', "-").to_uppercase();
    if dashed == "ZARYA" {
        "ISS".to_string()
    } else {
        dashed
    }
}

fn scan_language(state: &mut ParseState) {
    let re = Regex::new(r"(?i)\b(?:lang|lng)\s+([A-Za-z]{2})\b").unwrap();
    if let Some(caps) = re.captures(&state.working.clone()) {
        let code = caps[1].to_lowercase();
        if SUPPORTED_LANGUAGES.contains(&code.as_str()) {
            state.language = code;
        }
        excise(&mut state.working, &re);
    }
}

fn scan_bare_targets(state: &mut ParseState, catalog: &dyn TargetCatalog, defaults: &ParserDefaults) {
    // Multi-word address forms first: city,state;country / city,state /
    // city;country. The city class is deliberately broad (non-digits), so
    // umlauts and dots survive.
    if state.target.is_none() {
        let re = Regex::new(r"(?i)([^\d,;]+),\s*([A-Za-z]+);\s*([A-Za-z]{2})\b").unwrap();
        if let Some(caps) = re.captures(&state.working.clone()) {
            state.target = Some(Target::CityCountry {
                city: capwords(caps[1].trim()),
                state: Some(caps[2].to_uppercase()),
                country: Some(caps[3].to_uppercase()),
            });
            excise(&mut state.working, &re);
        }
    }
    if state.target.is_none() {
        let re = Regex::new(r"(?i)([^\d,;]+);\s*([A-Za-z]{2})\b").unwrap();
        if let Some(caps) = re.captures(&state.working.clone()) {
            state.target = Some(Target::CityCountry {
                city: capwords(caps[1].trim()),
                state: None,
                country: Some(caps[2].to_uppercase()),
            });
            excise(&mut state.working, &re);
        }
    }
    if state.target.is_none() {
        let re = Regex::new(r"(?i)([^\d,;]+),\s*([A-Za-z]{2})\b").unwrap();
        if let Some(caps) = re.captures(&state.working.clone()) {
            // Two-letter suffix without a country is read as a US state.
            state.target = Some(Target::CityCountry {
                city: capwords(caps[1].trim()),
                state: Some(caps[2].to_uppercase()),
                country: Some("US".to_string()),
            });
            excise(&mut state.working, &re);
        }
    }

    if state.target.is_none() {
        let re = Regex::new(r"(-?[0-9]+(?:\.[0-9]+)?)/(-?[0-9]+(?:\.[0-9]+)?)").unwrap();
        if let Some(caps) = re.captures(&state.working.clone()) {
            if let (Ok(lat), Ok(lon)) = (caps[1].parse::<f64>(), caps[2].parse::<f64>()) {
                state.target = Some(Target::LatLon(lat, lon));
                excise(&mut state.working, &re);
            }
        }
    }

    // Single-word targets, scanned in contract order.
    let words: Vec<String> = state.working.split_whitespace().map(str::to_string).collect();
    let mut consumed: Option<String> = None;

    for word in &words {
        if state.target.is_some() {
            break;
        }
        let lower = word.to_lowercase();

        if Regex::new(r"^[0-9]{5}$").unwrap().is_match(&lower) {
            state.target = Some(Target::Zip {
                code: lower.clone(),
                country: None,
            });
            consumed = Some(word.clone());
            break;
        }
        if Regex::new(r"^[a-z0-9]{4}$").unwrap().is_match(&lower) && catalog.is_icao(&lower) {
            state.target = Some(Target::Icao(lower.to_uppercase()));
            if state.action.is_none() {
                state.action = Some(Action::Metar);
            }
            consumed = Some(word.clone());
            break;
        }
        if Regex::new(r"^[a-z0-9]{3}$").unwrap().is_match(&lower) && catalog.is_iata(&lower) {
            state.target = Some(Target::Iata(lower.to_uppercase()));
            if state.action.is_none() {
                state.action = Some(Action::Metar);
            }
            consumed = Some(word.clone());
            break;
        }
        if Regex::new(r"^[a-z]{2}[0-9]{2}[a-z]{0,2}$").unwrap().is_match(&lower) {
            state.target = Some(Target::Grid(lower.clone()));
            consumed = Some(word.clone());
            break;
        }
        if defaults.osm_categories.contains(&lower) {
            state.target = Some(Target::OsmPhrase(lower.clone()));
            if state.action.is_none() {
                state.action = Some(Action::OsmCategory);
            }
            consumed = Some(word.clone());
            break;
        }
        if catalog.is_satellite(&normalize_satellite_name(&lower)) {
            state.target = Some(Target::Satellite(normalize_satellite_name(&lower)));
            if state.action.is_none() {
                state.action = Some(Action::SatPass);
            }
            consumed = Some(word.clone());
            break;
        }
        if Regex::new(r"^[a-z0-9]{1,3}[0-9][a-z0-9]{0,3}-[0-9]{1,2}$")
            .unwrap()
            .is_match(&lower)
            || (is_modifier_free_callsign(&lower)
                && Regex::new(r"^[a-z0-9]{1,3}[0-9][a-z0-9]{0,3}$").unwrap().is_match(&lower))
        {
            state.target = Some(Target::OtherCallsign(lower.to_uppercase()));
            consumed = Some(word.clone());
            break;
        }
    }

    if let Some(consumed) = consumed {
        let remaining: Vec<String> = state
            .working
            .split_whitespace()
            .map(str::to_string)
            .filter({
                let mut skipped = false;
                move |w| {
                    if !skipped && *w == consumed {
                        skipped = true;
                        false
                    } else {
                        true
                    }
                }
            })
            .collect();
        state.working = remaining.join(" ");
    }
}

/// A short alphanumeric word only counts as a bare callsign when it is
/// not one of the modifier keywords scanned later (e.g. "top3", "12h").
fn is_modifier_free_callsign(word: &str) -> bool {
    let modifier = Regex::new(r"^(?:top[2-5]|[0-9]{1,2}[hd]|m8b)$").unwrap();
    !modifier.is_match(word)
}

fn scan_modifiers(state: &mut ParseState, today: Weekday) {
    let words: Vec<String> = state.working.split_whitespace().map(str::to_string).collect();

    for word in &words {
        let lower = word.to_lowercase();

        if state.date.is_none() {
            if let Some(date) = parse_when(&lower, today) {
                state.date = Some(date);
            }
        }
        if state.daytime.is_none() {
            if let Some(daytime) = parse_when_daytime(&lower) {
                state.daytime = Some(daytime);
                // tonight with no other day given means today.
                if daytime == Daytime::Night && state.date.is_none() {
                    state.date = Some(DateOffset::Days(0));
                }
            }
        }
        match lower.as_str() {
            "mtr" | "metric" => state.units = Units::Metric,
            "imp" | "imperial" => state.units = Units::Imperial,
            "unicode" => state.force_unicode = true,
            "full" => {
                if matches!(state.action, Some(Action::Metar)) {
                    state.action = Some(Action::MetarTafFull);
                } else if state.daytime.is_none() {
                    state.daytime = Some(Daytime::Full);
                }
            }
            _ => {}
        }
        if let Some(caps) = Regex::new(r"^top([2-5])$").unwrap().captures(&lower) {
            state.top_n = caps[1].parse().unwrap_or(1);
        }
    }
}

fn parse_when(word: &str, today: Weekday) -> Option<DateOffset> {
    match word {
        "today" | "current" | "now" | "nite" | "night" | "tonite" | "tonight" => {
            Some(DateOffset::Days(0))
        }
        "tomorrow" => Some(DateOffset::Days(1)),
        _ => {
            if let Some(weekday) = parse_weekday(word) {
                return Some(DateOffset::Days(days_until(weekday, today)));
            }
            if let Some(caps) = Regex::new(r"^([0-9]{1,2})h$").unwrap().captures(word) {
                let hours: u8 = caps[1].parse().ok()?;
                if (1..=47).contains(&hours) {
                    return Some(DateOffset::Hours(hours));
                }
            }
            if let Some(caps) = Regex::new(r"^([0-9])d$").unwrap().captures(word) {
                let days: u8 = caps[1].parse().ok()?;
                if (1..=7).contains(&days) {
                    return Some(DateOffset::Days(days));
                }
            }
            None
        }
    }
}

fn parse_weekday(word: &str) -> Option<Weekday> {
    match word {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Days from today until the requested weekday; the same weekday refers
/// to next week, never to today.
fn days_until(target: Weekday, today: Weekday) -> u8 {
    let diff = (target.num_days_from_monday() + 7 - today.num_days_from_monday()) % 7;
    if diff == 0 {
        7
    } else {
        diff as u8
    }
}

fn parse_when_daytime(word: &str) -> Option<Daytime> {
    match word {
        "full" => Some(Daytime::Full),
        "morn" | "morning" => Some(Daytime::Morning),
        "day" | "daytime" | "noon" => Some(Daytime::Day),
        "eve" | "evening" => Some(Daytime::Evening),
        "nite" | "night" | "tonite" | "tonight" => Some(Daytime::Night),
        _ => None,
    }
}

fn capwords(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn finalize(state: ParseState) -> Command {
    let found_anything = state.action.is_some()
        || state.target.is_some()
        || state.date.is_some()
        || state.daytime.is_some();

    let (action, error) = match state.action {
        Some(action) => (action, state.error),
        None if found_anything => (Action::Wx, None),
        None => (Action::Unknown, Some(ERR_CANNOT_GROK.to_string())),
    };

    Command {
        action,
        target: state.target.unwrap_or(Target::UserPosition),
        date: state.date.unwrap_or(DateOffset::Days(0)),
        daytime: state.daytime.unwrap_or(Daytime::Full),
        units: state.units,
        language: state.language,
        top_n: state.top_n,
        force_unicode: state.force_unicode,
        payload: state.payload,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubCatalog {
        icaos: Vec<&'static str>,
        iatas: Vec<&'static str>,
        satellites: Vec<&'static str>,
    }

    impl Default for StubCatalog {
        fn default() -> Self {
            Self {
                icaos: vec!["eddf", "kjfk", "egll"],
                iatas: vec!["fra", "jfk", "pub"],
                satellites: vec!["ISS", "AO-91", "SO-50"],
            }
        }
    }

    impl TargetCatalog for StubCatalog {
        fn is_icao(&self, code: &str) -> bool {
            self.icaos.contains(&code.to_lowercase().as_str())
        }
        fn is_iata(&self, code: &str) -> bool {
            self.iatas.contains(&code.to_lowercase().as_str())
        }
        fn is_satellite(&self, name: &str) -> bool {
            self.satellites.contains(&name.to_uppercase().as_str())
        }
    }

    fn defaults() -> ParserDefaults {
        ParserDefaults {
            language: "en".to_string(),
            force_unicode: false,
            osm_categories: vec!["police".to_string(), "pharmacy".to_string()],
        }
    }

    fn parse_de(text: &str) -> Command {
        parse_with_today(text, "DF1JSL-8", &StubCatalog::default(), &defaults(), Weekday::Fri)
    }

    fn parse_us(text: &str) -> Command {
        parse_with_today(text, "KD2ABC", &StubCatalog::default(), &defaults(), Weekday::Fri)
    }

    #[test]
    fn city_country_with_date_and_language() {
        let cmd = parse_de("Holzminden;de tomorrow lang de");
        assert_eq!(cmd.action, Action::Wx);
        assert_eq!(
            cmd.target,
            Target::CityCountry {
                city: "Holzminden".to_string(),
                state: None,
                country: Some("DE".to_string()),
            }
        );
        assert_eq!(cmd.date, DateOffset::Days(1));
        assert_eq!(cmd.language, "de");
        assert_eq!(cmd.units, Units::Metric);
    }

    #[test]
    fn bare_zip_is_us_weather() {
        let cmd = parse_de("94043");
        assert_eq!(cmd.action, Action::Wx);
        assert_eq!(
            cmd.target,
            Target::Zip {
                code: "94043".to_string(),
                country: None,
            }
        );
        assert_eq!(cmd.date, DateOffset::Days(0));
    }

    #[test]
    fn whereis_callsign() {
        let cmd = parse_de("whereis df1jsl-8");
        assert_eq!(cmd.action, Action::WhereIs);
        assert_eq!(cmd.target, Target::OtherCallsign("DF1JSL-8".to_string()));
    }

    #[test]
    fn repeater_filters_in_either_order() {
        let cmd = parse_de("repeater c4fm 70cm");
        assert_eq!(cmd.action, Action::Repeater);
        assert_eq!(
            cmd.target,
            Target::RepeaterFilter {
                band: Some("70cm".to_string()),
                mode: Some("c4fm".to_string()),
            }
        );

        let cmd = parse_de("repeater 70cm c4fm");
        assert_eq!(
            cmd.target,
            Target::RepeaterFilter {
                band: Some("70cm".to_string()),
                mode: Some("c4fm".to_string()),
            }
        );

        let cmd = parse_de("repeater");
        assert_eq!(
            cmd.target,
            Target::RepeaterFilter {
                band: None,
                mode: None,
            }
        );
    }

    #[test]
    fn ysf_and_dstar_aliases() {
        let cmd = parse_de("repeater ysf");
        assert_eq!(
            cmd.target,
            Target::RepeaterFilter {
                band: None,
                mode: Some("c4fm".to_string()),
            }
        );
        let cmd = parse_de("repeater d-star");
        assert_eq!(
            cmd.target,
            Target::RepeaterFilter {
                band: None,
                mode: Some("dstar".to_string()),
            }
        );
    }

    #[test]
    fn metar_full_selects_combined_report() {
        let cmd = parse_de("metar full");
        assert_eq!(cmd.action, Action::MetarTafFull);
        assert_eq!(cmd.target, Target::UserPosition);
    }

    #[test]
    fn bare_icao_and_iata_resolve_via_catalog() {
        let cmd = parse_de("eddf");
        assert_eq!(cmd.action, Action::Metar);
        assert_eq!(cmd.target, Target::Icao("EDDF".to_string()));

        let cmd = parse_de("jfk");
        assert_eq!(cmd.action, Action::Metar);
        assert_eq!(cmd.target, Target::Iata("JFK".to_string()));

        // Not in the catalog: 4 letters fall through to the grid check,
        // which does not match either, so this is not a target.
        let cmd = parse_de("zzzz");
        assert_eq!(cmd.action, Action::Unknown);
    }

    #[test]
    fn iata_wins_over_osm_phrase() {
        // "pub" collides with the IATA code PUB; the earlier category
        // wins per the documented priority order.
        let cmd = parse_de("pub");
        assert_eq!(cmd.action, Action::Metar);
        assert_eq!(cmd.target, Target::Iata("PUB".to_string()));
    }

    #[test]
    fn bare_osm_category() {
        let cmd = parse_de("police");
        assert_eq!(cmd.action, Action::OsmCategory);
        assert_eq!(cmd.target, Target::OsmPhrase("police".to_string()));
    }

    #[test]
    fn bare_satellite_name() {
        let cmd = parse_de("iss");
        assert_eq!(cmd.action, Action::SatPass);
        assert_eq!(cmd.target, Target::Satellite("ISS".to_string()));
    }

    #[test]
    fn zarya_aliases_iss() {
        let cmd = parse_de("satpass zarya");
        assert_eq!(cmd.action, Action::SatPass);
        assert_eq!(cmd.target, Target::Satellite("ISS".to_string()));
    }

    #[test]
    fn satpass_without_name_is_an_error() {
        let cmd = parse_de("satpass");
        assert_eq!(cmd.action, Action::Unknown);
        assert!(cmd.error.unwrap().contains("No satellite"));
    }

    #[test]
    fn grid_keyword_and_bare_grid() {
        let cmd = parse_de("grid jo41du");
        assert_eq!(cmd.action, Action::Wx);
        assert_eq!(cmd.target, Target::Grid("jo41du".to_string()));

        let cmd = parse_de("jo41du");
        assert_eq!(cmd.target, Target::Grid("jo41du".to_string()));
    }

    #[test]
    fn latlon_pair() {
        let cmd = parse_de("51.83/-8.33");
        assert_eq!(cmd.target, Target::LatLon(51.83, -8.33));
        assert_eq!(cmd.action, Action::Wx);
    }

    #[test]
    fn weekday_equal_to_today_means_next_week() {
        let cmd = parse_de("wx friday");
        assert_eq!(cmd.date, DateOffset::Days(7));
        let cmd = parse_de("wx sat");
        assert_eq!(cmd.date, DateOffset::Days(1));
        let cmd = parse_de("wx mon");
        assert_eq!(cmd.date, DateOffset::Days(3));
    }

    #[test]
    fn hour_and_day_offsets() {
        let cmd = parse_de("wx 12h");
        assert_eq!(cmd.date, DateOffset::Hours(12));
        let cmd = parse_de("wx 47h");
        assert_eq!(cmd.date, DateOffset::Hours(47));
        let cmd = parse_de("wx 3d");
        assert_eq!(cmd.date, DateOffset::Days(3));
        // out of range: ignored
        let cmd = parse_de("wx 48h");
        assert_eq!(cmd.date, DateOffset::Days(0));
    }

    #[test]
    fn tonight_forces_today_and_night() {
        let cmd = parse_de("wx tonight");
        assert_eq!(cmd.date, DateOffset::Days(0));
        assert_eq!(cmd.daytime, Daytime::Night);

        // an explicit day sticks
        let cmd = parse_de("wx monday night");
        assert_eq!(cmd.date, DateOffset::Days(3));
        assert_eq!(cmd.daytime, Daytime::Night);
    }

    #[test]
    fn units_default_and_override() {
        assert_eq!(parse_us("wx").units, Units::Imperial);
        assert_eq!(parse_de("wx").units, Units::Metric);
        assert_eq!(parse_us("wx metric").units, Units::Metric);
        assert_eq!(parse_de("wx imp").units, Units::Imperial);
        // Liberia prefix
        let cmd = parse_with_today("wx", "EL2BG", &StubCatalog::default(), &defaults(), Weekday::Fri);
        assert_eq!(cmd.units, Units::Imperial);
    }

    #[test]
    fn unknown_language_falls_back_silently() {
        let cmd = parse_de("wx lang xx");
        assert_eq!(cmd.language, "en");
    }

    #[test]
    fn top_n_and_unicode() {
        let cmd = parse_de("repeater top3 unicode");
        assert_eq!(cmd.top_n, 3);
        assert!(cmd.force_unicode);
    }

    #[test]
    fn dapnet_with_payload() {
        let cmd = parse_de("dapnet dl1abc Hello out there");
        assert_eq!(cmd.action, Action::Dapnet);
        assert_eq!(cmd.target, Target::DapnetUser("dl1abc".to_string()));
        assert_eq!(cmd.payload.as_deref(), Some("Hello out there"));

        let cmd = parse_de("dapnethp dl1abc Emergency");
        assert_eq!(cmd.action, Action::DapnetHighPri);
    }

    #[test]
    fn posmsg_email() {
        let cmd = parse_de("posmsg someone@example.com");
        assert_eq!(cmd.action, Action::PosMsg);
        assert_eq!(cmd.target, Target::Email("someone@example.com".to_string()));
    }

    #[test]
    fn empty_message_is_unknown() {
        let cmd = parse_de("xyzzy plugh");
        assert_eq!(cmd.action, Action::Unknown);
        assert!(cmd.error.is_some());
    }

    #[test]
    fn sole_date_defaults_to_wx_at_user_position() {
        let cmd = parse_de("tomorrow");
        assert_eq!(cmd.action, Action::Wx);
        assert_eq!(cmd.target, Target::UserPosition);
        assert_eq!(cmd.date, DateOffset::Days(1));
    }

    #[test]
    fn canonical_round_trip() {
        let samples = [
            "wx df1jsl-8 tomorrow night metric lang de",
            "repeater c4fm 70cm top3 metric",
            "satpass iss metric",
            "whereis df1jsl-8 metric",
            "cwop dw1234 imperial",
            "metar eddf metric full",
            "osm police top2 metric unicode",
            "help metric",
            "dapnet dl1abc Hello out there",
        ];
        let catalog = StubCatalog::default();
        for sample in samples {
            let first = parse_with_today(sample, "DF1JSL-8", &catalog, &defaults(), Weekday::Fri);
            let canonical = first.canonical_string();
            let second =
                parse_with_today(&canonical, "DF1JSL-8", &catalog, &defaults(), Weekday::Fri);
            assert_eq!(first, second, "round trip failed for {:?} -> {:?}", sample, canonical);
        }
    }
}
