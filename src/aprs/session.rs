//! APRS-IS session: the single TCP text connection, the login
//! handshake and the paced writer. This is the only place that writes
//! to the socket; every other component hands it fully rendered frames
//! through a channel. Reconnects transparently with exponential backoff
//! while dedup state and outbound counters live elsewhere and survive.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, trace, warn};

use super::frame::{parse_tnc2, InboundFrame};

const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BACKOFF_SECS: u64 = 60;

/// Outbound traffic class; selects the pacing delay and keeps the
/// fragments of one logical unit contiguous on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutCategory {
    Message,
    Ack,
    Beacon,
    Bulletin,
}

/// One atomic unit of outbound traffic: all frames of a single response,
/// one ack, or one beacon/bulletin cycle. Frames are written in order
/// with the category's pacing delay between writes and never interleave
/// with another batch.
#[derive(Debug, Clone)]
pub struct OutboundBatch {
    pub category: OutCategory,
    pub frames: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub server: String,
    pub port: u16,
    pub callsign: String,
    pub server_filter: String,
    pub agent: String,
    pub version: String,
    pub msg_delay: Duration,
    pub ack_delay: Duration,
    /// Divert outbound frames to the log instead of the socket.
    pub read_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Disconnected,
    Connecting,
    LoggedIn,
    Running,
    Reconnecting,
}

/// Compute the APRS-IS passcode for a callsign: XOR hash over the first
/// ten uppercased characters of the base call, seeded with 0x73E2 and
/// masked to 15 bits. The N0CALL sentinel maps to -1 (receive-only).
pub fn passcode_for(callsign: &str) -> i32 {
    let base = callsign.split('-').next().unwrap_or(callsign);
    if base.eq_ignore_ascii_case(crate::config::NOCALL) {
        return -1;
    }
    let upper: String = base
        .chars()
        .take(10)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let bytes = upper.as_bytes();

    let mut hash: u16 = 0x73e2;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= (bytes[i] as u16) << 8;
        if i + 1 < bytes.len() {
            hash ^= bytes[i + 1] as u16;
        }
        i += 2;
    }
    (hash & 0x7fff) as i32
}

pub struct AprsIsSession {
    settings: SessionSettings,
    inbound: mpsc::Sender<InboundFrame>,
    outbound: mpsc::Receiver<OutboundBatch>,
    state: SessionState,
}

impl AprsIsSession {
    pub fn new(
        settings: SessionSettings,
        inbound: mpsc::Sender<InboundFrame>,
        outbound: mpsc::Receiver<OutboundBatch>,
    ) -> Self {
        Self {
            settings,
            inbound,
            outbound,
            state: SessionState::Disconnected,
        }
    }

    /// Run the session until process shutdown, reconnecting on loss.
    pub async fn run(mut self) {
        let mut backoff_secs: u64 = 1;
        loop {
            self.set_state(SessionState::Connecting);
            match self.run_connection().await {
                Ok(()) => {
                    // run_connection only returns on channel shutdown
                    info!("Session shut down");
                    return;
                }
                Err(e) => {
                    warn!("APRS-IS connection lost: {:#}", e);
                }
            }
            // A connection that reached the running state resets the
            // backoff; repeated connect/login failures double it.
            if self.state == SessionState::Running {
                backoff_secs = 1;
            }
            self.set_state(SessionState::Reconnecting);
            debug!("Reconnecting in {}s", backoff_secs);
            sleep(Duration::from_secs(backoff_secs)).await;
            backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
            self.set_state(SessionState::Disconnected);
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("Session state: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    async fn run_connection(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.settings.server, self.settings.port);
        info!("Connecting to APRS-IS at {}", addr);
        let stream = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("cannot connect to {}", addr))?;
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        self.login(&mut write_half, &mut lines).await?;
        self.set_state(SessionState::Running);

        // Pacing is measured from the last completed write; a fresh
        // connection starts with an open window.
        let mut last_write: Option<Instant> = None;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line.context("read from APRS-IS failed")? {
                        None => bail!("server closed the connection"),
                        Some(line) => {
                            if line.starts_with('#') {
                                trace!("server: {}", line);
                            } else if let Some(frame) = parse_tnc2(&line) {
                                // Never block the writer on a full ingress
                                // queue; the sender retransmits on timeout.
                                match self.inbound.try_send(frame) {
                                    Ok(()) => {}
                                    Err(mpsc::error::TrySendError::Full(_)) => {
                                        warn!("Ingress queue full, dropping frame");
                                    }
                                    Err(mpsc::error::TrySendError::Closed(_)) => {
                                        return Ok(());
                                    }
                                }
                            }
                        }
                    }
                }
                batch = self.outbound.recv() => {
                    let Some(batch) = batch else { return Ok(()) };
                    write_batch(&self.settings, &mut write_half, &mut last_write, batch).await?;
                }
            }
        }
    }

    async fn login(
        &mut self,
        write_half: &mut OwnedWriteHalf,
        lines: &mut tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
    ) -> Result<()> {
        let passcode = passcode_for(&self.settings.callsign);
        let login_line = format!(
            "user {} pass {} vers {} {} filter {}\r\n",
            self.settings.callsign,
            passcode,
            self.settings.agent,
            self.settings.version,
            self.settings.server_filter,
        );
        write_half
            .write_all(login_line.as_bytes())
            .await
            .context("cannot send login line")?;
        debug!(
            "Sent login for {} (filter: {})",
            self.settings.callsign, self.settings.server_filter
        );

        // The server answers with comment lines; the logresp line closes
        // the handshake.
        let deadline = timeout(LOGIN_TIMEOUT, async {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        trace!("server: {}", line);
                        if line.starts_with("# logresp") {
                            return Ok(line);
                        }
                    }
                    Ok(None) => bail!("server closed connection during login"),
                    Err(e) => bail!("read error during login: {}", e),
                }
            }
        })
        .await;

        match deadline {
            Ok(Ok(line)) => {
                info!("Logged in: {}", line.trim_start_matches("# ").trim());
                self.set_state(SessionState::LoggedIn);
                if self.settings.read_only {
                    info!("Read-only mode: outbound frames go to the log only");
                }
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => bail!("login timed out after {:?}", LOGIN_TIMEOUT),
        }
    }
}

/// Write all frames of one batch, enforcing the per-category minimum
/// delay since the last completed write.
async fn write_batch(
    settings: &SessionSettings,
    write_half: &mut OwnedWriteHalf,
    last_write: &mut Option<Instant>,
    batch: OutboundBatch,
) -> Result<()> {
    let delay = match batch.category {
        OutCategory::Message => settings.msg_delay,
        OutCategory::Ack | OutCategory::Beacon | OutCategory::Bulletin => settings.ack_delay,
    };

    for frame in batch.frames {
        if let Some(last_write) = *last_write {
            tokio::time::sleep_until(last_write + delay).await;
        }
        if settings.read_only {
            info!("[simulated send] {}", frame);
        } else {
            debug!("[send] {}", frame);
            write_half
                .write_all(frame.as_bytes())
                .await
                .context("write to APRS-IS failed")?;
            write_half
                .write_all(b"\r\n")
                .await
                .context("write to APRS-IS failed")?;
        }
        *last_write = Some(Instant::now());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passcode_matches_reference_values() {
        // XOR hash over "DF1JSL", seed 0x73E2: 0x55A2 & 0x7FFF.
        assert_eq!(passcode_for("DF1JSL"), 21922);
        assert_eq!(passcode_for("df1jsl-8"), 21922);
        assert_eq!(passcode_for("N0CALL"), -1);
        assert_eq!(passcode_for("n0call-5"), -1);
    }
}
