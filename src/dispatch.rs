//! Maps a parsed command onto provider calls and renders the semantic
//! response. This is the only place where symbolic targets become
//! coordinates and where provider failures are translated into the
//! canned user-visible texts. Requests are handled strictly one at a
//! time, in arrival order.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Datelike, Duration, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::ack::{with_msg_id, MessageIdAllocator};
use crate::aprs::frame::format_message_frame;
use crate::aprs::{OutCategory, OutboundBatch};
use crate::celestial::{self, Observer};
use crate::command::parser::{self, ParserDefaults, TargetCatalog};
use crate::command::{Action, Command, DateOffset, Daytime, Target, Units};
use crate::config::Config;
use crate::fragment;
use crate::geo;
use crate::ingress::InboundRequest;
use crate::providers::aprsfi::AprsFiClient;
use crate::providers::cwop::{self, CwopClient};
use crate::providers::dapnet::DapnetClient;
use crate::providers::fortune;
use crate::providers::geocode::{validate_country, Address, AddressQuery, GeocodeClient};
use crate::providers::mail::MailAccount;
use crate::providers::metar::MetarClient;
use crate::providers::osm::{self, OsmClient};
use crate::providers::sonde::{FlightPhase, SondeClient};
use crate::providers::wx::{self, WxClient};
use crate::providers::{retry_once, ProviderError, ProviderResult};
use crate::refdata::airports::AirportIndex;
use crate::refdata::repeaters::RepeaterIndex;
use crate::refdata::satellites::SatelliteIndex;
use crate::response::Response;

const HELP_TEXT: [&str; 4] = [
    "(default=wx for pos of sending callsign). Position commands:",
    "city,state;country OR city,state OR city;country OR zip;country OR",
    "zip with/wo country OR grid|mh+4..6 char OR lat/lon OR callsign",
    "time: mon..sun(day),today,tomorrow.Extra: mtr|metric imp|imperial",
];

const CANNOT_PARSE_TEXT: [&str; 2] = [
    "Sorry, I am unable to parse your request. Send 'help' for a short",
    "command overview. I have logged your message for my author. Thank you",
];

/// Parser catalog view over the live reference-data indices.
pub struct RefdataCatalog {
    pub airports: Arc<RwLock<AirportIndex>>,
    pub satellites: Arc<RwLock<SatelliteIndex>>,
}

impl TargetCatalog for RefdataCatalog {
    fn is_icao(&self, code: &str) -> bool {
        self.airports.read().unwrap().get(code).is_some()
    }

    fn is_iata(&self, code: &str) -> bool {
        self.airports.read().unwrap().by_iata(code).is_some()
    }

    fn is_satellite(&self, name: &str) -> bool {
        self.satellites.read().unwrap().contains(name)
    }
}

/// A resolved request location: coordinates plus the pretty header the
/// reply opens with.
#[derive(Debug, Clone)]
struct ResolvedLocation {
    latitude: f64,
    longitude: f64,
    altitude_m: Option<f64>,
    header: String,
    address: Option<Address>,
    last_heard: Option<DateTime<Utc>>,
    callsign: Option<String>,
}

pub struct Dispatcher {
    config: Arc<Config>,
    geocode: GeocodeClient,
    aprsfi: AprsFiClient,
    wx: WxClient,
    metar: MetarClient,
    cwop: CwopClient,
    osm: OsmClient,
    dapnet: DapnetClient,
    sonde: SondeClient,
    mail: MailAccount,
    airports: Arc<RwLock<AirportIndex>>,
    repeaters: Arc<RwLock<RepeaterIndex>>,
    satellites: Arc<RwLock<SatelliteIndex>>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        client: reqwest::Client,
        airports: Arc<RwLock<AirportIndex>>,
        repeaters: Arc<RwLock<RepeaterIndex>>,
        satellites: Arc<RwLock<SatelliteIndex>>,
    ) -> Self {
        let dapnet_enabled = config.dapnet_enabled();
        let mail_enabled = config.mail_enabled();
        Self {
            geocode: GeocodeClient::new(client.clone()),
            aprsfi: AprsFiClient::new(client.clone(), config.keys.aprsfi.clone()),
            wx: WxClient::new(client.clone(), config.keys.openweathermap.clone()),
            metar: MetarClient::new(client.clone()),
            cwop: CwopClient::new(client.clone()),
            osm: OsmClient::new(client.clone()),
            dapnet: DapnetClient::new(
                client.clone(),
                config.dapnet.api_url.clone(),
                config.dapnet.user.clone(),
                config.dapnet.password.clone(),
                dapnet_enabled,
            ),
            sonde: SondeClient::new(client),
            mail: MailAccount::new(config.mail.clone(), mail_enabled),
            airports,
            repeaters,
            satellites,
            config,
        }
    }

    /// Produce the response for one admitted request. Never fails: all
    /// provider errors are mapped onto their canned reply texts.
    pub async fn dispatch(&self, request: &InboundRequest, command: &Command) -> Response {
        match self.run(request, command).await {
            Ok(response) => response,
            Err(e) => {
                debug!("Request '{}' failed: {}", request.text, e);
                error_response(&e)
            }
        }
    }

    async fn run(
        &self,
        request: &InboundRequest,
        command: &Command,
    ) -> ProviderResult<Response> {
        match command.action {
            Action::Wx => self.action_wx(request, command).await,
            Action::Metar | Action::Taf | Action::MetarTafFull => {
                self.action_metar(request, command).await
            }
            Action::Cwop => self.action_cwop(request, command).await,
            Action::WhereIs | Action::WhereAmI => self.action_whereis(request, command).await,
            Action::RiseSet => self.action_riseset(request, command).await,
            Action::SatPass | Action::VisPass => self.action_satpass(request, command).await,
            Action::SatFreq => self.action_satfreq(command),
            Action::Repeater => self.action_repeater(request, command).await,
            Action::OsmCategory => self.action_osm(request, command).await,
            Action::Dapnet | Action::DapnetHighPri => self.action_dapnet(command).await,
            Action::PosMsg => self.action_posmsg(request, command).await,
            Action::Fortune => Ok(Response::from_text(fortune::tell_fortune())),
            Action::Sonde => self.action_sonde(command).await,
            Action::Help => {
                let mut response = Response::new();
                for line in HELP_TEXT {
                    response.push(line);
                }
                Ok(response)
            }
            Action::Unknown => {
                let mut response = Response::new();
                match &command.error {
                    Some(error) => {
                        response.push(error.clone());
                    }
                    None => {
                        for line in CANNOT_PARSE_TEXT {
                            response.push(line);
                        }
                    }
                }
                Ok(response)
            }
        }
    }

    /// Resolve the symbolic target to coordinates and a reply header.
    async fn resolve(
        &self,
        sender: &str,
        command: &Command,
    ) -> ProviderResult<ResolvedLocation> {
        match &command.target {
            Target::UserPosition
            | Target::Satellite(_)
            | Target::OsmPhrase(_)
            | Target::Email(_)
            | Target::RepeaterFilter { .. } => self.resolve_callsign(sender, command).await,
            Target::OtherCallsign(callsign) => self.resolve_callsign(callsign, command).await,
            Target::CwopStation(_) | Target::DapnetUser(_) => {
                // No coordinates involved; should not be asked for.
                Err(ProviderError::Internal(
                    "target carries no location".to_string(),
                ))
            }
            Target::LatLon(lat, lon) => {
                let address = self.reverse_best_effort(*lat, *lon, &command.language).await;
                let header = address
                    .as_ref()
                    .map(|a| a.human_readable())
                    .filter(|h| !h.is_empty())
                    .unwrap_or_else(|| format!("lat {}/lon {}", lat, lon));
                Ok(ResolvedLocation {
                    latitude: *lat,
                    longitude: *lon,
                    altitude_m: None,
                    header,
                    address,
                    last_heard: None,
                    callsign: None,
                })
            }
            Target::Grid(grid) => {
                let (lat, lon) =
                    geo::maidenhead_to_latlon(grid).ok_or(ProviderError::NotFound)?;
                Ok(ResolvedLocation {
                    latitude: lat,
                    longitude: lon,
                    altitude_m: None,
                    header: grid.clone(),
                    address: None,
                    last_heard: None,
                    callsign: None,
                })
            }
            Target::Zip { code, country } => {
                let country = country.clone().unwrap_or_else(|| "US".to_string());
                if !validate_country(&country) {
                    return Err(ProviderError::NotFound);
                }
                let query = AddressQuery {
                    postalcode: Some(code.clone()),
                    country: Some(country.clone()),
                    ..Default::default()
                };
                let (lat, lon) = retry_once(|| self.geocode.forward(&query)).await?;
                let address = self.reverse_best_effort(lat, lon, &command.language).await;
                let header = address
                    .as_ref()
                    .map(|a| a.human_readable())
                    .filter(|h| !h.is_empty())
                    .unwrap_or_else(|| format!("Zip {};{}", code, country));
                Ok(ResolvedLocation {
                    latitude: lat,
                    longitude: lon,
                    altitude_m: None,
                    header,
                    address,
                    last_heard: None,
                    callsign: None,
                })
            }
            Target::CityCountry {
                city,
                state,
                country,
            } => {
                if let Some(country) = country {
                    if !validate_country(country) {
                        return Err(ProviderError::NotFound);
                    }
                }
                let query = AddressQuery {
                    city: Some(city.clone()),
                    state: state.clone(),
                    country: country.clone(),
                    ..Default::default()
                };
                let (lat, lon) = retry_once(|| self.geocode.forward(&query)).await?;
                let mut header = city.clone();
                match country.as_deref() {
                    Some("US") | None => {
                        if let Some(state) = state {
                            header.push(',');
                            header.push_str(state);
                        }
                    }
                    Some(country) => {
                        header.push(';');
                        header.push_str(country);
                    }
                }
                Ok(ResolvedLocation {
                    latitude: lat,
                    longitude: lon,
                    altitude_m: None,
                    header,
                    address: None,
                    last_heard: None,
                    callsign: None,
                })
            }
            Target::Icao(code) => self.resolve_airport(code, false),
            Target::Iata(code) => self.resolve_airport(code, true),
        }
    }

    async fn resolve_callsign(
        &self,
        callsign: &str,
        command: &Command,
    ) -> ProviderResult<ResolvedLocation> {
        let position = retry_once(|| self.aprsfi.position_with_fallback(callsign)).await?;
        let address = self
            .reverse_best_effort(position.latitude, position.longitude, &command.language)
            .await;
        let header = address
            .as_ref()
            .map(|a| a.human_readable())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| position.callsign.clone());
        Ok(ResolvedLocation {
            latitude: position.latitude,
            longitude: position.longitude,
            altitude_m: position.altitude_m,
            header,
            address,
            last_heard: position.last_heard,
            callsign: Some(position.callsign),
        })
    }

    fn resolve_airport(&self, code: &str, is_iata: bool) -> ProviderResult<ResolvedLocation> {
        let airports = self.airports.read().unwrap();
        let airport = if is_iata {
            airports.by_iata(code)
        } else {
            airports.get(code)
        }
        .ok_or(ProviderError::NotFound)?;
        Ok(ResolvedLocation {
            latitude: airport.latitude,
            longitude: airport.longitude,
            altitude_m: None,
            header: airport.icao.clone(),
            address: None,
            last_heard: None,
            callsign: None,
        })
    }

    async fn reverse_best_effort(&self, lat: f64, lon: f64, language: &str) -> Option<Address> {
        match self.geocode.reverse(lat, lon, language).await {
            Ok(address) => Some(address),
            Err(e) => {
                debug!("Reverse lookup for {}/{} failed: {}", lat, lon, e);
                None
            }
        }
    }

    async fn action_wx(
        &self,
        request: &InboundRequest,
        command: &Command,
    ) -> ProviderResult<Response> {
        let location = self.resolve(&request.sender, command).await?;
        let forecast = retry_once(|| {
            self.wx.one_call(
                location.latitude,
                location.longitude,
                command.units,
                &command.language,
            )
        })
        .await?;
        wx::format_forecast(&forecast, command, &location.header)
    }

    async fn action_metar(
        &self,
        request: &InboundRequest,
        command: &Command,
    ) -> ProviderResult<Response> {
        // Resolve the airport: directly for ICAO/IATA targets, via the
        // nearest METAR-capable station otherwise.
        let (icao, metar_capable, latitude, longitude) = {
            match &command.target {
                Target::Icao(code) | Target::Iata(code) => {
                    let airports = self.airports.read().unwrap();
                    let airport = if matches!(command.target, Target::Iata(_)) {
                        airports.by_iata(code)
                    } else {
                        airports.get(code)
                    }
                    .ok_or(ProviderError::NotFound)?;
                    (
                        airport.icao.clone(),
                        airport.metar_capable,
                        airport.latitude,
                        airport.longitude,
                    )
                }
                _ => {
                    let location = self.resolve(&request.sender, command).await?;
                    let airports = self.airports.read().unwrap();
                    let airport = airports
                        .nearest_metar(location.latitude, location.longitude)
                        .ok_or(ProviderError::Empty)?;
                    (
                        airport.icao.clone(),
                        airport.metar_capable,
                        airport.latitude,
                        airport.longitude,
                    )
                }
            }
        };

        // An airport without METAR service degrades to a wx report for
        // its coordinates.
        if !metar_capable {
            let forecast = retry_once(|| {
                self.wx
                    .one_call(latitude, longitude, command.units, &command.language)
            })
            .await?;
            return wx::format_forecast(&forecast, command, &format!("Wx for '{}'", icao));
        }

        let text = match command.action {
            Action::Taf => retry_once(|| self.metar.taf(&icao)).await,
            Action::MetarTafFull => retry_once(|| self.metar.metar_and_taf(&icao)).await,
            _ => retry_once(|| self.metar.metar(&icao)).await,
        };
        match text {
            Ok(text) => Ok(Response::from_text(text)),
            Err(ProviderError::Empty) => Ok(Response::from_text(format!(
                "No METAR data present for {}",
                icao
            ))),
            Err(e) => Err(e),
        }
    }

    async fn action_cwop(
        &self,
        request: &InboundRequest,
        command: &Command,
    ) -> ProviderResult<Response> {
        let report = match &command.target {
            Target::CwopStation(id) => {
                retry_once(|| self.cwop.by_id(id, command.units)).await?
            }
            _ => {
                let location = self.resolve(&request.sender, command).await?;
                retry_once(|| {
                    self.cwop
                        .nearest(location.latitude, location.longitude, command.units)
                })
                .await?
            }
        };
        Ok(cwop::format_report(&report))
    }

    async fn action_whereis(
        &self,
        request: &InboundRequest,
        command: &Command,
    ) -> ProviderResult<Response> {
        let location = self.resolve(&request.sender, command).await?;
        let target_call = location
            .callsign
            .clone()
            .unwrap_or_else(|| request.sender.clone());

        let mut response = Response::new();
        response.push(format!("Pos {}", target_call));
        response.push(format!(
            "Grid {}",
            geo::latlon_to_maidenhead(location.latitude, location.longitude)
        ));

        let (lat_dms, lon_dms) = geo::latlon_to_dms(location.latitude, location.longitude);
        response.push(format!(
            "DMS {}{:02}.{:02}'{:02}, {}{:03}.{:02}'{:02}",
            lat_dms.hemisphere,
            lat_dms.degrees,
            lat_dms.minutes,
            lat_dms.seconds.round() as u32,
            lon_dms.hemisphere,
            lon_dms.degrees,
            lon_dms.minutes,
            lon_dms.seconds.round() as u32,
        ));

        // Distance and bearing against the sender's own position, only
        // meaningful when asking about someone else.
        if command.action == Action::WhereIs
            && !target_call.eq_ignore_ascii_case(&request.sender)
        {
            if let Ok(own) = self.aprsfi.position_with_fallback(&request.sender).await {
                let distance_km = geo::distance_km(
                    own.latitude,
                    own.longitude,
                    location.latitude,
                    location.longitude,
                );
                let bearing = geo::bearing_deg(
                    own.latitude,
                    own.longitude,
                    location.latitude,
                    location.longitude,
                );
                let (distance, uom) = match command.units {
                    Units::Imperial => (geo::km_to_miles(distance_km), "mi"),
                    Units::Metric => (distance_km, "km"),
                };
                response.push(format!("Dst {:.0} {}", distance, uom));
                response.push(format!("Brg {} deg", bearing.round() as i64));
            }
        }

        let utm = geo::latlon_to_utm(location.latitude, location.longitude);
        response.push(format!(
            "UTM {}{} {:.0} {:.0}",
            utm.zone_number, utm.zone_letter, utm.easting, utm.northing
        ));
        response.push(format!(
            "MGRS {}",
            geo::latlon_to_mgrs(location.latitude, location.longitude)
        ));
        response.push(format!(
            "LatLon {:.5}/{:.5}",
            location.latitude, location.longitude
        ));
        if let Some(address) = &location.address {
            let text = address.human_readable();
            if !text.is_empty() {
                response.push(text);
            }
            if let Some(street) = &address.street {
                let mut street_text = street.clone();
                if let Some(number) = &address.street_number {
                    street_text.push(' ');
                    street_text.push_str(number);
                }
                response.push(street_text);
            }
        }
        if let Some(altitude) = location.altitude_m {
            response.push(format!("Alt {:.0}m", altitude));
        }
        if let Some(last_heard) = location.last_heard {
            response.push(format!(
                "Last heard {}",
                last_heard.format("%Y-%m-%dT%H:%M:%SZ")
            ));
        }
        Ok(response)
    }

    async fn action_riseset(
        &self,
        request: &InboundRequest,
        command: &Command,
    ) -> ProviderResult<Response> {
        let location = self.resolve(&request.sender, command).await?;
        let days = match command.date {
            DateOffset::Days(days) => days as i64,
            DateOffset::Hours(_) => 0,
        };
        let date = (Utc::now() + Duration::days(days)).date_naive();

        let sun = celestial::sun_rise_set(location.latitude, location.longitude, date);
        let moon = celestial::moon_rise_set(location.latitude, location.longitude, date);

        let fmt = |t: Option<DateTime<Utc>>| {
            t.map(|t| t.format("%H:%M").to_string())
                .unwrap_or_else(|| "--:--".to_string())
        };

        let mut response = Response::new();
        response.push(format!("RiseSet {}", location.header));
        response.push(format!("{:02}-{}", date.day(), date.format("%b")));
        response.push("GMT sun_rs");
        response.push(fmt(sun.rise));
        response.push_glued(format!("-{}", fmt(sun.set)));
        response.push("mn_sr");
        response.push(fmt(moon.set));
        response.push_glued(format!("-{}", fmt(moon.rise)));
        Ok(response)
    }

    async fn action_satpass(
        &self,
        request: &InboundRequest,
        command: &Command,
    ) -> ProviderResult<Response> {
        let Target::Satellite(name) = &command.target else {
            return Err(ProviderError::Internal("satpass without satellite".into()));
        };
        let (sat_name, line1, line2) = {
            let satellites = self.satellites.read().unwrap();
            let satellite = satellites.find(name).ok_or(ProviderError::NotFound)?;
            (
                satellite.name.clone(),
                satellite.tle_line1.clone(),
                satellite.tle_line2.clone(),
            )
        };

        let location = self.resolve(&request.sender, command).await?;
        let observer = Observer {
            latitude: location.latitude,
            longitude: location.longitude,
            altitude_m: location.altitude_m.unwrap_or(0.0),
        };
        let start = start_instant(command.date, command.daytime);
        let require_visible = command.action == Action::VisPass;

        let pass = celestial::next_pass(
            &line1,
            &line2,
            &observer,
            start,
            self.config.satpass.min_elevation_deg,
            require_visible,
        )
        .map_err(|e| ProviderError::Internal(e.to_string()))?
        .ok_or(ProviderError::Empty)?;

        let mut response = Response::new();
        let label = if require_visible { "VisPass" } else { "SatPass" };
        response.push(format!("{} {}", label, sat_name));
        response.push(format!("AOS {}Z", pass.aos.format("%d-%b %H:%M")));
        response.push(format!("Az {}", pass.aos_azimuth.round() as i64));
        response.push(format!("MaxEl {:.0}", pass.max_elevation));
        response.push(format!("LOS {}Z", pass.los.format("%H:%M")));
        response.push(format!("Az {}", pass.los_azimuth.round() as i64));
        if pass.visible {
            response.push("visible");
        }
        Ok(response)
    }

    fn action_satfreq(&self, command: &Command) -> ProviderResult<Response> {
        let Target::Satellite(name) = &command.target else {
            return Err(ProviderError::Internal("satfreq without satellite".into()));
        };
        let satellites = self.satellites.read().unwrap();
        let satellite = satellites.find(name).ok_or(ProviderError::NotFound)?;
        if satellite.transponders.is_empty() {
            return Err(ProviderError::Empty);
        }

        let mut response = Response::new();
        response.push(format!("SatFreq {}", satellite.name));
        for transponder in satellite.transponders.iter().take(3) {
            if let Some(uplink) = &transponder.uplink {
                response.push(format!("Up {}", uplink));
            }
            if let Some(downlink) = &transponder.downlink {
                response.push(format!("Dn {}", downlink));
            }
            if let Some(beacon) = &transponder.beacon {
                response.push(format!("Bcn {}", beacon));
            }
            if let Some(mode) = &transponder.mode {
                response.push(mode.clone());
            }
        }
        Ok(response)
    }

    async fn action_repeater(
        &self,
        request: &InboundRequest,
        command: &Command,
    ) -> ProviderResult<Response> {
        let Target::RepeaterFilter { band, mode } = &command.target else {
            return Err(ProviderError::Internal("repeater without filter".into()));
        };
        let location = self.resolve(&request.sender, command).await?;

        let repeaters = self.repeaters.read().unwrap();
        let hits = repeaters.nearest(
            location.latitude,
            location.longitude,
            band.as_deref(),
            mode.as_deref(),
            command.top_n as usize,
        );
        if hits.is_empty() {
            return Err(ProviderError::Empty);
        }

        let mut response = Response::new();
        response.push("Nearest repeater");
        for (n, hit) in hits.iter().enumerate() {
            let repeater = hit.repeater;
            if hits.len() > 1 {
                response.push(format!("#{}", n + 1));
            }
            response.push(repeater.qth.clone());
            let (distance, uom) = match command.units {
                Units::Imperial => (geo::km_to_miles(hit.distance_km), "mi"),
                Units::Metric => (hit.distance_km, "km"),
            };
            response.push(format!("{:.0} {}", distance, uom));
            response.push(format!(
                "{} deg {}",
                hit.bearing_deg.round() as i64,
                geo::direction_for(hit.bearing_deg)
            ));
            if let Some(rx) = repeater.rx_mhz {
                response.push(format!("Rx {}", rx));
            }
            if let Some(tx) = repeater.tx_mhz {
                response.push(format!("Tx {}", tx));
            }
            // Items beyond the first stay terse.
            if n == 0 && !repeater.remarks.is_empty() {
                response.push(repeater.remarks.clone());
            }
            // Echo suppression: filters the user supplied are not
            // repeated back.
            if mode.is_none() {
                if let Some(repeater_mode) = &repeater.mode {
                    response.push(repeater_mode.to_uppercase());
                }
            }
            if band.is_none() {
                if let Some(repeater_band) = &repeater.band {
                    response.push(repeater_band.clone());
                }
            }
            if n == 0 {
                if let Some(locator) = &repeater.locator {
                    response.push(locator.clone());
                }
            }
        }
        Ok(response)
    }

    async fn action_osm(
        &self,
        request: &InboundRequest,
        command: &Command,
    ) -> ProviderResult<Response> {
        let Target::OsmPhrase(category) = &command.target else {
            return Err(ProviderError::Internal("osm without category".into()));
        };
        let location = self.resolve(&request.sender, command).await?;
        let hits = retry_once(|| {
            self.osm.nearby(
                category,
                location.latitude,
                location.longitude,
                command.top_n,
            )
        })
        .await?;
        let hits: Vec<_> = hits.into_iter().take(command.top_n as usize).collect();
        Ok(osm::format_hits(
            &hits,
            category,
            location.latitude,
            location.longitude,
            command.units == Units::Imperial,
        ))
    }

    async fn action_dapnet(&self, command: &Command) -> ProviderResult<Response> {
        let Target::DapnetUser(user) = &command.target else {
            return Err(ProviderError::Internal("dapnet without user".into()));
        };
        let message = command
            .payload
            .as_deref()
            .ok_or(ProviderError::Internal("dapnet without message".into()))?;
        let high_priority = command.action == Action::DapnetHighPri;
        retry_once(|| self.dapnet.send(user, message, high_priority)).await?;
        Ok(Response::from_text(format!(
            "DAPNET message sent to {}",
            user.to_uppercase()
        )))
    }

    async fn action_posmsg(
        &self,
        request: &InboundRequest,
        command: &Command,
    ) -> ProviderResult<Response> {
        let Target::Email(recipient) = &command.target else {
            return Err(ProviderError::Internal("posmsg without address".into()));
        };
        let location = self.resolve(&request.sender, command).await?;
        let address_text = location
            .address
            .as_ref()
            .map(|a| a.human_readable())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| location.header.clone());
        self.mail
            .send_position_report(
                recipient,
                &request.sender,
                &address_text,
                location.latitude,
                location.longitude,
            )
            .await?;
        Ok(Response::from_text(format!(
            "Position report sent to {}",
            recipient
        )))
    }

    async fn action_sonde(&self, command: &Command) -> ProviderResult<Response> {
        let Target::OtherCallsign(probe) = &command.target else {
            return Err(ProviderError::Internal("sonde without probe".into()));
        };
        let position = retry_once(|| self.aprsfi.position(probe)).await?;
        let prediction = retry_once(|| self.sonde.predict_landing(&position)).await?;

        let mut response = Response::new();
        response.push(format!("Sonde {}", position.callsign));
        response.push(match prediction.phase {
            FlightPhase::Ascent => "ascending",
            FlightPhase::Descent => "descending",
        });
        response.push(format!(
            "Landing {:.4}/{:.4}",
            prediction.latitude, prediction.longitude
        ));
        response.push(format!(
            "Grid {}",
            geo::latlon_to_maidenhead(prediction.latitude, prediction.longitude)
        ));
        if let Some(time) = prediction.time {
            response.push(format!("at {}Z", time.format("%H:%M")));
        }
        Ok(response)
    }
}

/// The requested date/daytime marks where the pass search starts, not a
/// filter on its results.
fn start_instant(date: DateOffset, daytime: Daytime) -> DateTime<Utc> {
    let now = Utc::now();
    match date {
        DateOffset::Hours(hours) => now + Duration::hours(hours as i64),
        DateOffset::Days(0) if daytime == Daytime::Full => now,
        DateOffset::Days(days) => {
            let hour = match daytime {
                Daytime::Night => 0,
                Daytime::Morning => 6,
                Daytime::Full | Daytime::Day => 12,
                Daytime::Evening => 18,
            };
            let base = (now + Duration::days(days as i64)).date_naive();
            base.and_hms_opt(hour, 0, 0)
                .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
                .unwrap_or(now)
        }
    }
}

fn error_response(error: &ProviderError) -> Response {
    match error {
        ProviderError::Unavailable(_) => {
            Response::from_text("Service unavailable, please try again later")
        }
        ProviderError::NotFound => Response::from_text("Location not found"),
        ProviderError::Empty => Response::from_text("No match found"),
        ProviderError::Disabled => Response::from_text("Feature disabled by configuration"),
        ProviderError::Internal(_) => {
            Response::from_text("Something went wrong, please try again later")
        }
    }
}

/// Sequential request loop: parse, dispatch, fragment and enqueue the
/// response. Requests are strictly FIFO; further inbound frames keep
/// being admitted and acked while a response is being computed.
pub async fn run_loop(
    dispatcher: Dispatcher,
    catalog: RefdataCatalog,
    defaults: ParserDefaults,
    config: Arc<Config>,
    mut requests: mpsc::Receiver<InboundRequest>,
    outbound: mpsc::Sender<OutboundBatch>,
    mut msg_ids: MessageIdAllocator,
) {
    while let Some(request) = requests.recv().await {
        let command = parser::parse(&request.text, &request.sender, &catalog, &defaults);
        info!(
            "Request from {}: '{}' -> {:?}",
            request.sender, request.text, command.action
        );

        let response = dispatcher.dispatch(&request, &command).await;
        if response.is_empty() {
            error!("Empty response for '{}', dropping", request.text);
            continue;
        }
        let payloads = fragment::render(&response, command.force_unicode);

        let frames: Vec<String> = payloads
            .iter()
            .map(|payload| {
                let payload = match &request.msg_no {
                    Some(origin) => {
                        let out_id = msg_ids.next();
                        let reply_ack = request.reply_ack.then_some(origin.as_str());
                        with_msg_id(payload, &out_id, reply_ack)
                    }
                    None => payload.clone(),
                };
                format_message_frame(
                    &config.station.alias,
                    &config.station.tocall,
                    &request.sender,
                    &payload,
                )
            })
            .collect();

        let batch = OutboundBatch {
            category: OutCategory::Message,
            frames,
        };
        if outbound.send(batch).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn error_texts_fit_one_fragment() {
        for error in [
            ProviderError::Unavailable("x".into()),
            ProviderError::NotFound,
            ProviderError::Empty,
            ProviderError::Disabled,
            ProviderError::Internal("x".into()),
        ] {
            let fragments = fragment::render(&error_response(&error), false);
            assert_eq!(fragments.len(), 1);
            assert!(fragments[0].len() <= 67);
        }
    }

    #[test]
    fn help_text_lines_fit_the_ceiling() {
        for line in HELP_TEXT.iter().chain(CANNOT_PARSE_TEXT.iter()) {
            assert!(line.len() <= 67, "{:?} is {} bytes", line, line.len());
        }
    }

    #[test]
    fn pass_search_start_honors_daytime() {
        let start = start_instant(DateOffset::Days(2), Daytime::Night);
        assert_eq!(start.time().hour(), 0);
        let start = start_instant(DateOffset::Days(1), Daytime::Evening);
        assert_eq!(start.time().hour(), 18);
        // "now" start for today/full
        let start = start_instant(DateOffset::Days(0), Daytime::Full);
        assert!((Utc::now() - start).num_seconds() < 5);
    }
}
