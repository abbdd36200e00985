//! The polling engine: fetch the feed on a fixed cadence, decode it, run
//! the delay estimator, publish a fresh snapshot, prune dead state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::decoder::{decode_positions, parse_feed};
use crate::estimator::{Tuning, observe};
use crate::fetch::{HttpClient, fetch_bytes};
use crate::gtfs_rt::FeedMessage;
use crate::snapshot::{ConnectionStatus, Published, Snapshot};
use crate::store::{RETENTION_SECS, TrackingStore};

/// Fetches taking longer than this are worth a warning; at the default
/// cadence they eat the whole polling interval.
const SLOW_FETCH_SECS: u64 = 15;

#[derive(Debug)]
enum Command {
    Pause,
    Resume,
}

/// Remote control for a running [`Poller`]. Cheap to clone; the poller
/// shuts down once every handle is dropped.
#[derive(Clone)]
pub struct PollerHandle {
    commands: mpsc::Sender<Command>,
}

impl PollerHandle {
    /// Stops fetching until [`resume`](Self::resume). Already-published
    /// snapshots stay served.
    pub async fn pause(&self) -> Result<()> {
        self.commands
            .send(Command::Pause)
            .await
            .map_err(|_| anyhow!("poller has shut down"))
    }

    /// Restarts fetching. The first cycle runs immediately rather than
    /// waiting out the interval.
    pub async fn resume(&self) -> Result<()> {
        self.commands
            .send(Command::Resume)
            .await
            .map_err(|_| anyhow!("poller has shut down"))
    }
}

/// Owns the vehicle tracking state and the publish side of the snapshot
/// channel. Everything mutable lives inside; the rest of the system sees
/// only [`Published`] values and a [`PollerHandle`].
pub struct Poller<C> {
    client: C,
    feed_url: String,
    interval: Duration,
    tuning: Tuning,
    store: TrackingStore,
    publisher: watch::Sender<Published>,
    commands: mpsc::Receiver<Command>,
    paused: bool,
}

impl<C: HttpClient> Poller<C> {
    pub fn new(
        client: C,
        feed_url: String,
        interval: Duration,
        tuning: Tuning,
    ) -> (Self, PollerHandle, watch::Receiver<Published>) {
        let (publisher, published) = watch::channel(Published::default());
        let (commands_tx, commands_rx) = mpsc::channel(8);

        let poller = Self {
            client,
            feed_url,
            interval,
            tuning,
            store: TrackingStore::new(),
            publisher,
            commands: commands_rx,
            paused: false,
        };

        (
            poller,
            PollerHandle {
                commands: commands_tx,
            },
            published,
        )
    }

    /// Drives the poll loop until every [`PollerHandle`] is gone. The first
    /// cycle runs immediately; later ones follow the configured interval.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            url = %self.feed_url,
            interval_secs = self.interval.as_secs(),
            "Poller started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.paused {
                        self.cycle().await;
                    }
                }
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Pause) => {
                            if !self.paused {
                                info!("Polling paused");
                            }
                            self.paused = true;
                        }
                        Some(Command::Resume) => {
                            if self.paused {
                                info!("Polling resumed");
                                self.paused = false;
                                ticker.reset();
                                self.cycle().await;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        info!("Poller stopped");
    }

    /// One fetch-decode-publish round. A failed fetch or parse flips the
    /// published connection status to degraded and leaves the previous
    /// snapshot in place.
    #[tracing::instrument(skip(self), fields(url = %self.feed_url))]
    async fn cycle(&mut self) {
        let fetch_start = std::time::Instant::now();

        let bytes = match fetch_bytes(&self.client, &self.feed_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "Feed fetch failed");
                self.publish_degraded();
                return;
            }
        };

        let elapsed = fetch_start.elapsed();
        if elapsed.as_secs() > SLOW_FETCH_SECS {
            warn!(elapsed_secs = elapsed.as_secs(), "Feed fetch was slow");
        }
        debug!(bytes = bytes.len(), "Feed bytes received, parsing");

        let feed = match parse_feed(&bytes) {
            Ok(feed) => feed,
            Err(e) => {
                error!(error = %e, "Feed parse failed");
                self.publish_degraded();
                return;
            }
        };

        let entities = feed.entity.len();
        let snapshot = self.ingest(&feed, Utc::now());
        info!(
            entities,
            vehicles = snapshot.vehicles.len(),
            tracked = self.store.len(),
            elapsed_ms = fetch_start.elapsed().as_millis() as u64,
            "Feed processed"
        );

        self.publisher.send_replace(Published {
            snapshot: Arc::new(snapshot),
            connection: ConnectionStatus::Ok,
        });
    }

    /// The synchronous core of a cycle: decode the feed, run every
    /// observation through the estimator, prune state not seen within the
    /// retention horizon, and assemble the snapshot.
    pub fn ingest(&mut self, feed: &FeedMessage, now: DateTime<Utc>) -> Snapshot {
        let observations = decode_positions(feed, now);
        let mut vehicles = Vec::with_capacity(observations.len());

        for obs in observations {
            let delay = observe(&self.tuning, &mut self.store, &obs, now);
            vehicles.push(obs.into_record(delay));
        }

        let dropped = self
            .store
            .prune_older_than(now, chrono::Duration::seconds(RETENTION_SECS));
        if dropped > 0 {
            debug!(dropped, "Pruned vehicles not seen within retention");
        }

        Snapshot {
            vehicles,
            last_update: Some(now),
        }
    }

    fn publish_degraded(&self) {
        self.publisher
            .send_modify(|published| published.connection = ConnectionStatus::Degraded);
    }
}
