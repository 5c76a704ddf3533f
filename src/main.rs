use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use oskar::ack::MessageIdAllocator;
use oskar::aprs::{AprsIsSession, SessionSettings};
use oskar::command::ParserDefaults;
use oskar::config::Config;
use oskar::dispatch::{self, Dispatcher, RefdataCatalog};
use oskar::ingress::Ingress;
use oskar::providers;
use oskar::refdata::airports::AirportIndex;
use oskar::refdata::repeaters::RepeaterIndex;
use oskar::refdata::satellites::SatelliteIndex;
use oskar::providers::mail::MailAccount;
use oskar::scheduler::Scheduler;
use oskar::{logging, AGENT_NAME, AGENT_VERSION};

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-purpose APRS bot", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "oskar.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match Config::from_file(&args.config) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    let _logging_guard = logging::init_logging(&config.paths.log_dir, AGENT_NAME, &config.log_level);
    info!("{} {} starting", AGENT_NAME, AGENT_VERSION);
    if config.read_only() {
        info!("Callsign is the no-call sentinel: running in read-only mode");
    }

    std::fs::create_dir_all(&config.paths.data_dir)?;

    // Load whatever reference data is already on disk; the refresh jobs
    // fill in missing or stale datasets right after startup.
    let airports = Arc::new(RwLock::new(
        AirportIndex::load(&config.paths.data_dir.join("airport_stations.txt"))
            .unwrap_or_else(|e| {
                warn!("No local airport catalog yet: {}", e);
                AirportIndex::new()
            }),
    ));
    let repeaters = Arc::new(RwLock::new(
        RepeaterIndex::load(&config.paths.data_dir.join("repeatermap.json")).unwrap_or_else(
            |e| {
                warn!("No local repeater directory yet: {:#}", e);
                RepeaterIndex::default()
            },
        ),
    ));
    let satellites = Arc::new(RwLock::new(
        SatelliteIndex::load(
            &config.paths.data_dir.join("amateur_satellites.tle"),
            &config.paths.data_dir.join("satellite_frequencies.csv"),
        )
        .unwrap_or_else(|e| {
            warn!("No local satellite data yet: {:#}", e);
            SatelliteIndex::default()
        }),
    ));

    let client = providers::http_client();

    // Channel plumbing: session -> ingress -> dispatcher -> session.
    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let (request_tx, request_rx) = mpsc::channel(64);
    let (outbound_tx, outbound_rx) = mpsc::channel(64);

    let session = AprsIsSession::new(
        SessionSettings {
            server: config.station.server.clone(),
            port: config.station.port,
            callsign: config.station.callsign.clone(),
            server_filter: config.station.server_filter.clone(),
            agent: AGENT_NAME.to_string(),
            version: AGENT_VERSION.to_string(),
            msg_delay: Duration::from_secs_f64(config.timing.msg_delay_secs),
            ack_delay: Duration::from_secs_f64(config.timing.ack_delay_secs),
            read_only: config.read_only(),
        },
        inbound_tx,
        outbound_rx,
    );
    let session_handle = tokio::spawn(session.run());

    let ingress = Ingress::new(
        &config.station.addressees,
        &config.station.alias,
        &config.station.tocall,
        Duration::from_secs(config.dedup.ttl_secs),
        config.dedup.max_entries,
        outbound_tx.clone(),
        request_tx,
    );
    let ingress_handle = tokio::spawn(ingress.run(inbound_rx));

    let dispatcher = Dispatcher::new(
        config.clone(),
        client.clone(),
        airports.clone(),
        repeaters.clone(),
        satellites.clone(),
    );
    let catalog = RefdataCatalog {
        airports: airports.clone(),
        satellites: satellites.clone(),
    };
    let defaults = ParserDefaults {
        language: config.output.language.clone(),
        force_unicode: config.output.force_unicode,
        osm_categories: config.osm.categories.clone(),
    };
    let msg_ids = MessageIdAllocator::load(config.paths.data_dir.join("served.dat"));
    let dispatch_handle = tokio::spawn(dispatch::run_loop(
        dispatcher,
        catalog,
        defaults,
        config.clone(),
        request_rx,
        outbound_tx.clone(),
        msg_ids,
    ));

    let mail = MailAccount::new(config.mail.clone(), config.mail_enabled());
    let scheduler = Scheduler::new(
        config.clone(),
        client,
        outbound_tx,
        airports,
        repeaters,
        satellites,
        mail,
    );
    let scheduled_handles = scheduler.start_all();

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }

    for handle in scheduled_handles {
        handle.abort();
    }
    dispatch_handle.abort();
    ingress_handle.abort();
    session_handle.abort();
    info!("Shutdown complete");

    Ok(())
}
