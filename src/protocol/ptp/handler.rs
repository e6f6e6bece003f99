//! Async driver for the follower.
//!
//! Owns the two channels (event port 319, general port 320), feeds every
//! datagram into the [`SyncEngine`], performs the sends it asks for and
//! runs the lock timer. Everything happens on one task, so the engine
//! sees packets strictly one at a time.

use std::io;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use tokio::sync::{RwLock, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{PtpError, Result};
use crate::net::{PtpChannel, UdpChannel};
use crate::state::{EventBus, SyncEvent};
use crate::types::{ClientConfig, ClientSettings};

use super::clock::LocalClock;
use super::codec::ProtocolCodec;
use super::engine::{EngineAction, MasterRecord, SyncEngine};
use super::message::{DomainId, Filter, PtpCodec};
use super::timestamp::ClockTime;

/// Shared engine state, readable while the driver task runs.
pub type SharedSyncEngine<C> = Arc<RwLock<SyncEngine<C>>>;

/// Receive buffer size; larger than any PTP message the follower reads.
const RECV_BUF_SIZE: usize = 512;

type PendingSend = BoxFuture<'static, (u16, io::Result<()>)>;

enum Channels {
    Bind,
    Provided {
        event: Arc<dyn PtpChannel>,
        general: Arc<dyn PtpChannel>,
    },
}

/// A running PTP follower.
///
/// Dropping the client stops its task; use [`PtpClient::shutdown`] to also
/// get the final unlocked notification.
pub struct PtpClient<C: PtpCodec = ProtocolCodec> {
    engine: SharedSyncEngine<C>,
    events: EventBus,
    settings: ClientSettings,
    first_subscriber: Mutex<Option<broadcast::Receiver<SyncEvent>>>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PtpClient<ProtocolCodec> {
    /// Validate `config` and start following.
    ///
    /// Configuration errors fail here. Bind and multicast failures happen
    /// on the driver task and are reported as
    /// [`SyncEvent::TransportError`]; the client then stays constructed
    /// but idle. The first [`PtpClient::subscribe`] call sees them however
    /// late it happens, as long as fewer than 100 events went by.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the validation error for an invalid interface or subdomain.
    pub fn start(config: &ClientConfig) -> Result<Self> {
        let settings = config.validate()?;
        let codec = ProtocolCodec::for_filter(settings.filter);
        Ok(Self::spawn(codec, settings, LocalClock::system(), Channels::Bind))
    }
}

impl<C: PtpCodec> PtpClient<C> {
    /// Start over already bound channels, e.g. a custom transport.
    ///
    /// The channels are expected to have joined the codec's multicast
    /// group already.
    pub fn with_channels(
        codec: C,
        settings: ClientSettings,
        clock: LocalClock,
        event: Arc<dyn PtpChannel>,
        general: Arc<dyn PtpChannel>,
    ) -> Self {
        Self::spawn(codec, settings, clock, Channels::Provided { event, general })
    }

    fn spawn(codec: C, settings: ClientSettings, clock: LocalClock, channels: Channels) -> Self {
        let events = EventBus::new();
        let engine = SyncEngine::new(
            codec,
            clock,
            settings.min_sync_interval,
            settings.event_port,
            events.clone(),
        );
        let engine = Arc::new(RwLock::new(engine));
        let (shutdown, shutdown_rx) = watch::channel(false);
        // Taken before the task exists so nothing it emits can be missed.
        let first_subscriber = Mutex::new(Some(events.subscribe()));

        tracing::info!(
            filter = %settings.filter,
            interface = %settings.interface,
            min_sync_interval = ?settings.min_sync_interval,
            "PTP follower starting"
        );
        let task = tokio::spawn(run(
            engine.clone(),
            events.clone(),
            settings,
            channels,
            shutdown_rx,
        ));

        Self {
            engine,
            events,
            settings,
            first_subscriber,
            shutdown,
            task: Some(task),
        }
    }

    /// Subscribe to follower events.
    ///
    /// The first call returns a receiver that has been queueing since the
    /// client started, so transport readiness and bind failures are never
    /// lost to a race with the driver task. Later calls only see events
    /// emitted after they subscribe.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.first_subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_else(|| self.events.subscribe())
    }

    /// The event bus, for filtered subscriptions.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Get a handle to the shared engine.
    #[must_use]
    pub fn engine(&self) -> SharedSyncEngine<C> {
        self.engine.clone()
    }

    /// Validated settings.
    #[must_use]
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Whether the follower is locked to a master.
    pub async fn is_locked(&self) -> bool {
        self.engine.read().await.is_locked()
    }

    /// Current master.
    pub async fn master(&self) -> Option<MasterRecord> {
        self.engine.read().await.master().cloned()
    }

    /// Corrected time of the last completed exchange, in Unix milliseconds.
    pub async fn last_sync_epoch_ms(&self) -> Option<i64> {
        self.engine
            .read()
            .await
            .last_sync()
            .map(|last| last.time.to_millis())
    }

    /// Corrected time.
    pub async fn now(&self) -> ClockTime {
        self.engine.read().await.now()
    }

    /// Corrected time in nanoseconds.
    pub async fn now_nanos(&self) -> i128 {
        self.engine.read().await.now_nanos()
    }

    /// Accumulated offset.
    pub async fn offset(&self) -> ClockTime {
        self.engine.read().await.offset()
    }

    /// Configured filter.
    pub async fn filter(&self) -> Filter {
        self.engine.read().await.filter()
    }

    /// Every domain/subdomain seen on the wire.
    pub async fn observed_domains(&self) -> Vec<DomainId> {
        self.engine.read().await.observed_domains()
    }

    /// Stop the driver, release both channels and report unlocked.
    ///
    /// [`SyncEvent::LockChanged`] with `locked: false` is emitted even if
    /// the lock had already been lost.
    pub async fn shutdown(mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let already_stopped = task.is_finished();
        let _ = self.shutdown.send(true);
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "PTP follower task failed");
        }
        if already_stopped {
            // The driver never reached its own teardown.
            self.engine.write().await.shutdown();
        }
    }
}

impl<C: PtpCodec> Drop for PtpClient<C> {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn bind_channels(
    settings: &ClientSettings,
    group: Ipv4Addr,
) -> Result<(Arc<dyn PtpChannel>, Arc<dyn PtpChannel>)> {
    let event = bind_channel(settings, settings.event_port, group).await?;
    let general = bind_channel(settings, settings.general_port, group).await?;
    Ok((Arc::new(event), Arc::new(general)))
}

async fn bind_channel(settings: &ClientSettings, port: u16, group: Ipv4Addr) -> Result<UdpChannel> {
    let channel = UdpChannel::bind(settings.interface, port)
        .await
        .map_err(|source| PtpError::Bind {
            interface: settings.interface,
            port,
            source,
        })?;
    channel
        .join_multicast_v4(group, settings.interface)
        .map_err(|source| PtpError::Multicast { group, source })?;
    tracing::info!(port, %group, "PTP: channel bound");
    Ok(channel)
}

fn dispatch(channel: Arc<dyn PtpChannel>, action: EngineAction) -> PendingSend {
    match action {
        EngineAction::SendDelayRequest {
            sequence,
            packet,
            destination,
        } => Box::pin(async move {
            tracing::trace!(seq = sequence, %destination, "PTP: sending Delay_Req");
            let result = channel.send_to(&packet, destination).await.map(|_| ());
            (sequence, result)
        }),
    }
}

async fn run<C: PtpCodec>(
    engine: SharedSyncEngine<C>,
    events: EventBus,
    settings: ClientSettings,
    channels: Channels,
    mut shutdown: watch::Receiver<bool>,
) {
    let (event, general) = match channels {
        Channels::Provided { event, general } => (event, general),
        Channels::Bind => {
            let group = engine.read().await.codec().multicast_group();
            match bind_channels(&settings, group).await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "PTP: transport setup failed");
                    events.emit(SyncEvent::TransportError {
                        message: e.to_string(),
                    });
                    return;
                }
            }
        }
    };
    for channel in [&event, &general] {
        if let Ok(port) = channel.local_port() {
            events.emit(SyncEvent::TransportReady { port });
        }
    }

    let mut event_buf = vec![0u8; RECV_BUF_SIZE];
    let mut general_buf = vec![0u8; RECV_BUF_SIZE];
    let mut pending: FuturesUnordered<PendingSend> = FuturesUnordered::new();

    loop {
        let deadline = engine.read().await.lock_deadline();

        tokio::select! {
            biased;

            // Send completions first: t2 must be captured before any
            // Delay_Resp for the same request is looked at.
            Some((sequence, result)) = pending.next(), if !pending.is_empty() => {
                engine.write().await.delay_request_sent(sequence, result);
            }

            () = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            } => {
                engine.write().await.poll_lock_timeout(Instant::now());
            }

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("PTP follower shutting down");
                    break;
                }
            }

            result = event.recv_from(&mut event_buf) => match result {
                Ok((len, src)) => {
                    let action = engine.write().await.handle_event(&event_buf[..len], src.ip(), Instant::now());
                    if let Some(action) = action {
                        pending.push(dispatch(event.clone(), action));
                    }
                }
                Err(e) => {
                    if report_recv_error(&events, "event", &e) {
                        break;
                    }
                }
            },

            result = general.recv_from(&mut general_buf) => match result {
                Ok((len, src)) => {
                    let action = engine.write().await.handle_general(&general_buf[..len], src.ip(), Instant::now());
                    if let Some(action) = action {
                        pending.push(dispatch(event.clone(), action));
                    }
                }
                Err(e) => {
                    if report_recv_error(&events, "general", &e) {
                        break;
                    }
                }
            },
        }
    }

    drop(pending);
    drop(event);
    drop(general);
    engine.write().await.shutdown();
    events.emit(SyncEvent::TransportClosed);
}

/// Report a receive error; returns whether the channel is gone for good.
fn report_recv_error(events: &EventBus, channel: &str, e: &io::Error) -> bool {
    let closed = is_channel_closed(e);
    if closed {
        tracing::warn!(channel, error = %e, "PTP: receive failed, closing");
    } else {
        tracing::warn!(channel, error = %e, "PTP: receive failed, continuing");
    }
    events.emit(SyncEvent::TransportError {
        message: format!("{channel} channel receive failed: {e}"),
    });
    closed
}

/// Errors that concern one datagram (an ICMP reset, a signal) leave the
/// socket usable. Everything else ends the driver.
fn is_channel_closed(e: &io::Error) -> bool {
    !matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

