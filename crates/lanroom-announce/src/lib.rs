//! Public directory announcer.
//!
//! On a fixed interval the announcer reads the latest [`RoomSnapshot`]
//! from the controller's watch channel and publishes it to the external
//! directory service, recording the verification token the service
//! returns. A failed announce is logged and retried on the next tick; a
//! directory outage only costs public discoverability, never in-room
//! connectivity. When the room empties the listing is withdrawn once,
//! best-effort, and when the room closes the announcer task exits.
//!
//! Each request carries its own timeout so a hung directory cannot pile
//! up outstanding calls, and a small random jitter keeps a fleet of
//! servers from announcing in lockstep.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;

use lanroom_protocol::GameInfo;
use lanroom_room::{RoomSnapshot, RoomState};

/// Maximum random delay added to each announce tick.
const JITTER_MS: u64 = 500;

/// Settings for the announcer, from the configuration store.
#[derive(Debug, Clone)]
pub struct AnnounceConfig {
    /// Directory service endpoint.
    pub url: String,
    /// How often to announce.
    pub interval: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// The address clients should connect to, as published.
    pub public_addr: String,
}

/// Errors from a single announce attempt.
#[derive(Debug, thiserror::Error)]
pub enum AnnounceError {
    /// The request never completed (connect failure, timeout, bad URL).
    #[error("directory request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The directory answered with a non-success status.
    #[error("directory returned {0}")]
    Status(reqwest::StatusCode),
}

/// The JSON body sent to the directory. Its exact schema belongs to the
/// directory service, not to this server.
#[derive(Debug, Serialize)]
struct AnnouncePayload<'a> {
    name: &'a str,
    game: &'a GameInfo,
    members: usize,
    capacity: usize,
    address: &'a str,
    has_password: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct AnnounceResponse {
    token: String,
}

/// Periodically publishes the room to the directory service.
pub struct DirectoryAnnouncer {
    client: reqwest::Client,
    config: AnnounceConfig,
    snapshots: tokio::sync::watch::Receiver<RoomSnapshot>,
    token: Option<String>,
    listed: bool,
}

impl DirectoryAnnouncer {
    /// Creates an announcer reading snapshots from the room's watch
    /// channel.
    pub fn new(
        config: AnnounceConfig,
        snapshots: tokio::sync::watch::Receiver<RoomSnapshot>,
    ) -> Result<Self, AnnounceError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            config,
            snapshots,
            token: None,
            listed: false,
        })
    }

    /// The verification token most recently issued by the directory.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Runs the announce loop until the room closes.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            url = %self.config.url,
            interval = ?self.config.interval,
            "directory announcer started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let jitter = rand::rng().random_range(0..JITTER_MS);
                    tokio::time::sleep(Duration::from_millis(jitter)).await;

                    let snapshot = self.snapshots.borrow().clone();
                    match snapshot.state {
                        RoomState::Active if snapshot.members > 0 => {
                            if let Err(e) = self.announce_once(&snapshot).await {
                                tracing::warn!(
                                    error = %e,
                                    "announce failed; retrying next interval"
                                );
                            }
                        }
                        RoomState::Closing => {
                            self.delist().await;
                            break;
                        }
                        _ => self.delist().await,
                    }
                }

                changed = self.snapshots.changed() => {
                    // React to closing promptly instead of waiting out the
                    // interval. A dropped channel means the controller is
                    // gone, which is the same thing.
                    if changed.is_err()
                        || self.snapshots.borrow_and_update().state == RoomState::Closing
                    {
                        self.delist().await;
                        break;
                    }
                }
            }
        }

        tracing::info!("directory announcer stopped");
    }

    /// One announce attempt. On success the returned token replaces the
    /// stored one and is echoed on subsequent announces.
    pub async fn announce_once(&mut self, snapshot: &RoomSnapshot) -> Result<(), AnnounceError> {
        let payload = AnnouncePayload {
            name: &snapshot.name,
            game: &snapshot.game,
            members: snapshot.members,
            capacity: snapshot.max_members,
            address: &self.config.public_addr,
            has_password: snapshot.has_password,
            token: self.token.as_deref(),
        };

        let response = self
            .client
            .post(&self.config.url)
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AnnounceError::Status(response.status()));
        }

        let body: AnnounceResponse = response.json().await?;
        tracing::debug!("room announced to directory");
        self.token = Some(body.token);
        self.listed = true;
        Ok(())
    }

    /// Withdraws the listing, once, best-effort. Never retried; the
    /// directory expires stale listings on its own.
    async fn delist(&mut self) {
        if !self.listed {
            return;
        }
        self.listed = false;

        let mut request = self.client.delete(&self.config.url);
        if let Some(token) = &self.token {
            request = request.query(&[("token", token.as_str())]);
        }
        match request.send().await {
            Ok(_) => tracing::info!("room delisted from directory"),
            Err(e) => tracing::debug!(error = %e, "delist failed; listing will expire"),
        }
    }
}
