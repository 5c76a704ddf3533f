//! Scheduled producers: the position beacon, the bulletin cycle, the
//! reference-data refresh jobs and mail housekeeping. Every job is an
//! explicit ticker task; refresh jobs carry the "run at startup, then
//! on interval" attribute and skip work while the on-disk copy is still
//! fresh. Downloaded files are committed by rename, and the rebuilt
//! index is swapped in whole, so the dispatcher never sees a partial
//! dataset.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::aprs::beacon::{beacon_frames, bulletin_frames};
use crate::aprs::{OutCategory, OutboundBatch};
use crate::config::Config;
use crate::providers::mail::MailAccount;
use crate::refdata;
use crate::refdata::airports::AirportIndex;
use crate::refdata::repeaters::RepeaterIndex;
use crate::refdata::satellites::SatelliteIndex;

/// How often refresh jobs re-check their dataset's staleness.
const REFRESH_CHECK_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
const MAIL_PRUNE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct Scheduler {
    config: Arc<Config>,
    client: reqwest::Client,
    outbound: mpsc::Sender<OutboundBatch>,
    airports: Arc<RwLock<AirportIndex>>,
    repeaters: Arc<RwLock<RepeaterIndex>>,
    satellites: Arc<RwLock<SatelliteIndex>>,
    mail: MailAccount,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        client: reqwest::Client,
        outbound: mpsc::Sender<OutboundBatch>,
        airports: Arc<RwLock<AirportIndex>>,
        repeaters: Arc<RwLock<RepeaterIndex>>,
        satellites: Arc<RwLock<SatelliteIndex>>,
        mail: MailAccount,
    ) -> Self {
        Self {
            config,
            client,
            outbound,
            airports,
            repeaters,
            satellites,
            mail,
        }
    }

    /// Spawn every scheduled producer and hand back the task handles.
    pub fn start_all(self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        handles.push(self.spawn_beacon_task());
        handles.push(self.spawn_bulletin_task());
        handles.push(self.spawn_airport_refresh());
        handles.push(self.spawn_repeater_refresh());
        handles.push(self.spawn_satellite_refresh());
        if self.mail.enabled() {
            handles.push(self.spawn_mail_prune());
        }
        info!("Started {} scheduled tasks", handles.len());
        handles
    }

    /// Position beacon plus status text, first one right after startup.
    fn spawn_beacon_task(&self) -> JoinHandle<()> {
        let config = self.config.clone();
        let outbound = self.outbound.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(
                config.timing.beacon_minutes * 60,
            ));
            loop {
                ticker.tick().await;
                debug!("Beacon interval reached, sending beacons");
                let batch = OutboundBatch {
                    category: OutCategory::Beacon,
                    frames: beacon_frames(&config.station, crate::AGENT_VERSION),
                };
                if outbound.send(batch).await.is_err() {
                    return;
                }
            }
        })
    }

    /// The BLN0..BLNn cycle. Unlike the beacon there is no startup
    /// emission; the first cycle runs after one full interval.
    fn spawn_bulletin_task(&self) -> JoinHandle<()> {
        let config = self.config.clone();
        let outbound = self.outbound.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(
                config.timing.bulletin_minutes * 60,
            ));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                debug!("Bulletin interval reached, sending bulletins");
                let batch = OutboundBatch {
                    category: OutCategory::Bulletin,
                    frames: bulletin_frames(
                        &config.station,
                        &config.bulletins.texts,
                        &config.bulletins.regional,
                    ),
                };
                if outbound.send(batch).await.is_err() {
                    return;
                }
            }
        })
    }

    fn spawn_airport_refresh(&self) -> JoinHandle<()> {
        let client = self.client.clone();
        let index = self.airports.clone();
        let path = self.config.paths.data_dir.join("airport_stations.txt");
        let max_age = ChronoDuration::days(self.config.refresh.airports_days as i64);
        tokio::spawn(async move {
            loop {
                if refdata::is_stale(&path, max_age).await {
                    match refresh_airports(&client, &path).await {
                        Ok(new_index) => {
                            *index.write().unwrap() = new_index;
                        }
                        Err(e) => error!("Airport refresh failed: {:#}", e),
                    }
                }
                tokio::time::sleep(REFRESH_CHECK_INTERVAL).await;
            }
        })
    }

    fn spawn_repeater_refresh(&self) -> JoinHandle<()> {
        let client = self.client.clone();
        let index = self.repeaters.clone();
        let path = self.config.paths.data_dir.join("repeatermap.json");
        let max_age = ChronoDuration::days(self.config.refresh.repeaters_days as i64);
        tokio::spawn(async move {
            loop {
                if refdata::is_stale(&path, max_age).await {
                    match refresh_repeaters(&client, &path).await {
                        Ok(new_index) => {
                            *index.write().unwrap() = new_index;
                        }
                        Err(e) => error!("Repeater refresh failed: {:#}", e),
                    }
                }
                tokio::time::sleep(REFRESH_CHECK_INTERVAL).await;
            }
        })
    }

    fn spawn_satellite_refresh(&self) -> JoinHandle<()> {
        let client = self.client.clone();
        let index = self.satellites.clone();
        let tle_path = self.config.paths.data_dir.join("amateur_satellites.tle");
        let freq_path = self.config.paths.data_dir.join("satellite_frequencies.csv");
        let max_age = ChronoDuration::days(self.config.refresh.satellites_days as i64);
        tokio::spawn(async move {
            loop {
                if refdata::is_stale(&tle_path, max_age).await
                    || refdata::is_stale(&freq_path, max_age).await
                {
                    match refresh_satellites(&client, &tle_path, &freq_path).await {
                        Ok(new_index) => {
                            *index.write().unwrap() = new_index;
                        }
                        Err(e) => error!("Satellite refresh failed: {:#}", e),
                    }
                }
                tokio::time::sleep(REFRESH_CHECK_INTERVAL).await;
            }
        })
    }

    /// Daily prune of the mail account's "Sent" folder.
    fn spawn_mail_prune(&self) -> JoinHandle<()> {
        let mail = self.mail.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(MAIL_PRUNE_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = mail.prune_sent_folder().await {
                    error!("Sent-folder prune failed: {:#}", e);
                }
            }
        })
    }
}

/// Download + parse + index in one step, so a failed download leaves
/// the previous index untouched.
async fn refresh_airports(
    client: &reqwest::Client,
    path: &PathBuf,
) -> anyhow::Result<AirportIndex> {
    refdata::download_to(client, crate::refdata::airports::DOWNLOAD_URL, path).await?;
    let path = path.clone();
    tokio::task::spawn_blocking(move || AirportIndex::load(&path).map_err(anyhow::Error::from))
        .await?
}

async fn refresh_repeaters(
    client: &reqwest::Client,
    path: &PathBuf,
) -> anyhow::Result<RepeaterIndex> {
    refdata::download_to(client, crate::refdata::repeaters::DOWNLOAD_URL, path).await?;
    let path = path.clone();
    tokio::task::spawn_blocking(move || RepeaterIndex::load(&path)).await?
}

async fn refresh_satellites(
    client: &reqwest::Client,
    tle_path: &PathBuf,
    freq_path: &PathBuf,
) -> anyhow::Result<SatelliteIndex> {
    refdata::download_to(client, crate::refdata::satellites::TLE_URL, tle_path).await?;
    if let Err(e) =
        refdata::download_to(client, crate::refdata::satellites::FREQUENCY_URL, freq_path).await
    {
        // Pass data works without frequencies; keep whatever we have.
        error!("Frequency table download failed: {:#}", e);
    }
    let tle_path = tle_path.clone();
    let freq_path = freq_path.clone();
    tokio::task::spawn_blocking(move || SatelliteIndex::load(&tle_path, &freq_path)).await?
}
