//! Session management for one NEX device.
//!
//! A [`Session`] owns the transport handle, connects and subscribes with
//! bounded retries, and turns the asynchronous notification stream into a
//! request/response call through a single pending-response slot.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::DeviceConfig;
use crate::error::{Error, Result};
use crate::event::{Event, EventDispatcher, Subscription};
use crate::protocol::{
    Completion, Fragment, LengthTable, MessageReassembler, StatusLayout, classify_fragment,
    parse_status,
};
use crate::transport::{NOTIFY_CHARACTERISTIC, Transport, TransportProvider, WRITE_CHARACTERISTIC};
use crate::types::{ConnectionState, DeviceReading, StatusResponse};

/// Capacity of the fragment queue between transport and reassembler.
const FRAGMENT_QUEUE: usize = 64;

/// Capacity of the event broadcast channel.
const EVENT_CAPACITY: usize = 64;

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// A caller waiting for the next status message.
struct PendingResponse {
    token: u64,
    reply: oneshot::Sender<DeviceReading>,
}

/// State shared between command callers and the notification task.
struct ProtocolState {
    assembler: MessageReassembler,
    pending: Option<PendingResponse>,
    /// Token of the pending request when the latest header arrived.
    header_token: u64,
    last_reading: Option<DeviceReading>,
}

struct Shared {
    protocol: Mutex<ProtocolState>,
    lengths: LengthTable,
    layout: StatusLayout,
    rated_power: AtomicU32,
    dispatcher: EventDispatcher,
    state_tx: watch::Sender<ConnectionState>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) -> ConnectionState {
        self.state_tx.send_replace(state)
    }

    async fn handle_fragment(&self, fragment: &[u8]) {
        let mut protocol = self.protocol.lock().await;

        if let Ok(Fragment::Header { .. }) = classify_fragment(fragment, &self.lengths) {
            protocol.header_token = protocol.pending.as_ref().map_or(0, |p| p.token);
        }

        let malformed = protocol.assembler.malformed_headers();
        let completion = protocol.assembler.feed(fragment);
        if protocol.assembler.malformed_headers() != malformed {
            self.dispatcher.dispatch(Event::MalformedHeader);
        }

        match completion {
            None => {}
            Some(Completion::Status(payload)) => {
                let watts = self.rated_power.load(Ordering::Relaxed);
                let reading = match parse_status(&payload, watts, &self.layout) {
                    Ok(reading) => reading,
                    Err(e) => {
                        tracing::warn!("failed to parse status: {}", e);
                        return;
                    }
                };

                protocol.last_reading = Some(reading);
                let header_token = protocol.header_token;
                if let Some(pending) = protocol.pending.take_if(|p| p.token == header_token) {
                    // Waiter may have just timed out
                    let _ = pending.reply.send(reading);
                } else if protocol.pending.is_some() {
                    tracing::debug!("status started before the pending request, not answering it");
                }
                drop(protocol);

                tracing::debug!(
                    "status: state {} current {} target {}",
                    reading.state_code,
                    reading.current_temp,
                    reading.target_temp
                );
                self.dispatcher.dispatch(Event::Reading(reading));
            }
            Some(Completion::Other(kind)) => {
                tracing::trace!("{:?} message complete", kind);
                self.dispatcher.dispatch(Event::Message(kind));
            }
        }
    }
}

/// Drains one notification subscription into the reassembler.
async fn run_notify_loop(shared: Arc<Shared>, mut fragments: mpsc::Receiver<Bytes>) {
    shared.protocol.lock().await.assembler.reset();

    while let Some(fragment) = fragments.recv().await {
        tracing::trace!("received fragment: {}", hex::encode(&fragment));
        shared.handle_fragment(&fragment).await;
    }

    tracing::info!("notification stream closed: {}", Error::TransportLost);
    shared.protocol.lock().await.assembler.reset();
    if shared.set_state(ConnectionState::Disconnected) != ConnectionState::Disconnected {
        shared.dispatcher.dispatch(Event::Disconnected);
    }
}

/// Transport handle and everything tied to its lifetime.
struct Link<T> {
    transport: Option<T>,
    notify_task: Option<JoinHandle<()>>,
    last_outcome: Option<Result<()>>,
}

/// One connect-through-disconnect session with a NEX device.
pub struct Session<P: TransportProvider> {
    config: DeviceConfig,
    provider: Arc<P>,
    link: Mutex<Link<P::Transport>>,
    sequences: AtomicU64,
    next_token: AtomicU64,
    shared: Arc<Shared>,
}

impl<P: TransportProvider> Session<P> {
    /// Creates a session; nothing is connected until the first call needs it.
    #[must_use]
    pub fn new(provider: Arc<P>, config: DeviceConfig) -> Self {
        let profile = config.profile;
        let assembler = MessageReassembler::new(profile.lengths)
            .drop_repeated_fragments(profile.drop_repeated_fragments);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        let shared = Arc::new(Shared {
            protocol: Mutex::new(ProtocolState {
                assembler,
                pending: None,
                header_token: 0,
                last_reading: None,
            }),
            lengths: profile.lengths,
            layout: profile.layout,
            rated_power: AtomicU32::new(config.rated_power_watts),
            dispatcher: EventDispatcher::new(EVENT_CAPACITY),
            state_tx,
        });

        Self {
            config,
            provider,
            link: Mutex::new(Link {
                transport: None,
                notify_task: None,
                last_outcome: None,
            }),
            sequences: AtomicU64::new(0),
            next_token: AtomicU64::new(1),
            shared,
        }
    }

    /// Returns the device address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.config.address
    }

    /// Returns the session configuration.
    #[must_use]
    pub const fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Watches connection state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.shared.dispatcher.subscribe()
    }

    /// Returns the rated power used for energy readings.
    #[must_use]
    pub fn rated_power(&self) -> u32 {
        self.shared.rated_power.load(Ordering::Relaxed)
    }

    /// Changes the rated power used for subsequent readings.
    pub fn set_rated_power(&self, watts: u32) {
        self.shared.rated_power.store(watts, Ordering::Relaxed);
    }

    /// Returns the most recent decoded reading.
    pub async fn last_reading(&self) -> Option<DeviceReading> {
        self.shared.protocol.lock().await.last_reading
    }

    /// Connects and subscribes to notifications unless already done.
    ///
    /// Concurrent callers queue on one lock; a caller that waited behind a
    /// failed sequence receives that failure instead of starting another.
    pub async fn ensure_connected(&self) -> Result<()> {
        let seen = self.sequences.load(Ordering::SeqCst);
        let mut link = self.link.lock().await;

        if self.sequences.load(Ordering::SeqCst) != seen {
            if let Some(Err(e)) = &link.last_outcome {
                tracing::debug!("sharing result of concurrent connect: {}", e);
                return Err(e.clone());
            }
        }

        let result = self.establish(&mut link).await;
        link.last_outcome = Some(result.clone());
        self.sequences.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn establish(&self, link: &mut Link<P::Transport>) -> Result<()> {
        let open = link.transport.as_ref().is_some_and(|t| t.is_connected());

        if open {
            let listening = link
                .notify_task
                .as_ref()
                .is_some_and(|task| !task.is_finished());
            if listening && self.connection_state().is_ready() {
                tracing::debug!("connection reused");
                return Ok(());
            }
        } else {
            if link.transport.is_some() {
                tracing::info!("{} from {}, reconnecting", Error::TransportLost, self.address());
                self.teardown(link).await;
            }
            self.connect_with_retry(link).await?;
        }

        self.subscribe_with_retry(link).await
    }

    async fn connect_with_retry(&self, link: &mut Link<P::Transport>) -> Result<()> {
        let budget = self.config.connect;
        let mut last_error = Error::NotConnected;

        for attempt in 1..=budget.max_attempts {
            self.shared.set_state(ConnectionState::Connecting);
            match self.try_connect(budget.per_attempt_timeout).await {
                Ok(transport) => {
                    tracing::info!("connected to {} after {} attempts", self.address(), attempt);
                    link.transport = Some(transport);
                    self.shared.set_state(ConnectionState::Connected);
                    self.shared.dispatcher.dispatch(Event::Connected);
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!("error on connect {}, attempt {}", e, attempt);
                    last_error = e;
                }
            }
        }

        tracing::debug!("abandoning connection to {}", self.address());
        self.shared.set_state(ConnectionState::Disconnected);
        Err(Error::ConnectFailed {
            attempts: budget.max_attempts,
            source: Box::new(last_error),
        })
    }

    async fn try_connect(&self, timeout: Duration) -> Result<P::Transport> {
        let mut transport = self
            .provider
            .find_transport_by_address(self.address())
            .ok_or_else(|| Error::DeviceNotFound {
                address: self.config.address.clone(),
            })?;

        let outcome = tokio::time::timeout(timeout, transport.connect(timeout)).await;
        let error = match outcome {
            Ok(Ok(())) => return Ok(transport),
            Ok(Err(e)) => e,
            Err(_) => Error::ConnectTimeout {
                timeout_ms: millis(timeout),
            },
        };

        // Never leave a half-open handle behind
        if let Err(e) = transport.disconnect().await {
            tracing::debug!("error releasing failed connection: {}", e);
        }
        Err(error)
    }

    async fn subscribe_with_retry(&self, link: &mut Link<P::Transport>) -> Result<()> {
        let budget = self.config.notify;
        if let Some(task) = link.notify_task.take() {
            task.abort();
        }
        let transport = link.transport.as_mut().ok_or(Error::NotConnected)?;
        let mut last_error = Error::NotConnected;

        for attempt in 1..=budget.max_attempts {
            let (tx, rx) = mpsc::channel(FRAGMENT_QUEUE);
            let subscribe = transport.subscribe_notify(NOTIFY_CHARACTERISTIC, tx);
            let outcome = tokio::time::timeout(budget.per_attempt_timeout, subscribe).await;

            match outcome {
                Ok(Ok(())) => {
                    let shared = Arc::clone(&self.shared);
                    link.notify_task = Some(tokio::spawn(run_notify_loop(shared, rx)));
                    self.shared.set_state(ConnectionState::NotifySubscribed);
                    tracing::debug!("notifications started after {} attempts", attempt);
                    return Ok(());
                }
                Ok(Err(e)) => last_error = e,
                Err(_) => {
                    last_error = Error::transport(format!(
                        "subscribe timed out after {}ms",
                        millis(budget.per_attempt_timeout)
                    ));
                }
            }

            tracing::debug!("error setting up notify {}, attempt {}", last_error, attempt);
            if attempt < budget.max_attempts {
                tokio::time::sleep(self.config.notify_retry_delay).await;
            }
        }

        Err(Error::NotifySubscribeFailed {
            attempts: budget.max_attempts,
            source: Box::new(last_error),
        })
    }

    async fn teardown(&self, link: &mut Link<P::Transport>) {
        if let Some(task) = link.notify_task.take() {
            task.abort();
        }
        if let Some(mut transport) = link.transport.take() {
            if let Err(e) = transport.disconnect().await {
                tracing::debug!("error during disconnect: {}", e);
            }
        }
        self.shared.protocol.lock().await.assembler.reset();
        if self.shared.set_state(ConnectionState::Disconnected) != ConnectionState::Disconnected {
            self.shared.dispatcher.dispatch(Event::Disconnected);
        }
    }

    /// Disconnects from the device.
    pub async fn disconnect(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        if link.transport.is_some() {
            tracing::info!("disconnecting from {}", self.address());
        }
        self.teardown(&mut link).await;
        link.last_outcome = None;
        Ok(())
    }

    /// Writes a frame without waiting for any response.
    ///
    /// A write that does not finish within the configured write timeout is
    /// abandoned and reported as a transport error.
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        let limit = self.config.write_timeout;
        tokio::time::timeout(limit, self.write_frame(frame))
            .await
            .map_err(|_| Error::transport(format!("write timed out after {}ms", millis(limit))))?
    }

    async fn write_frame(&self, frame: Bytes) -> Result<()> {
        let mut link = self.link.lock().await;
        let transport = link.transport.as_mut().ok_or(Error::NotConnected)?;
        if !transport.is_connected() {
            return Err(Error::TransportLost);
        }

        tracing::trace!("sending frame: {}", hex::encode(&frame));
        transport.write(WRITE_CHARACTERISTIC, frame).await
    }

    /// Writes a frame and waits for the next status message.
    ///
    /// Only a status message whose header arrives after this call has
    /// registered can answer it. `timeout` covers the write as well. On
    /// timeout, or when a newer request takes the slot, the last known
    /// reading is returned as
    /// [`StatusResponse::Stale`], or [`StatusResponse::NoData`] if there is
    /// none.
    pub async fn send_and_await(&self, frame: Bytes, timeout: Duration) -> Result<StatusResponse> {
        let deadline = tokio::time::Instant::now() + timeout;
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let (reply, response) = oneshot::channel();

        {
            let mut protocol = self.shared.protocol.lock().await;
            if protocol
                .pending
                .replace(PendingResponse { token, reply })
                .is_some()
            {
                tracing::debug!("request {} replaces an unanswered request", token);
            }
        }

        match tokio::time::timeout_at(deadline, self.write_frame(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.clear_pending(token).await;
                return Err(e);
            }
            Err(_) => {
                self.clear_pending(token).await;
                tracing::debug!("request {} write still pending after {}ms", token, millis(timeout));
                return Ok(self.fallback().await);
            }
        }

        match tokio::time::timeout_at(deadline, response).await {
            Ok(Ok(reading)) => Ok(StatusResponse::Fresh(reading)),
            Ok(Err(_)) => {
                tracing::debug!("request {} superseded before a status arrived", token);
                Ok(self.fallback().await)
            }
            Err(_) => {
                self.clear_pending(token).await;
                tracing::debug!(
                    "{}",
                    Error::ResponseTimeout {
                        timeout_ms: millis(timeout)
                    }
                );
                Ok(self.fallback().await)
            }
        }
    }

    async fn clear_pending(&self, token: u64) {
        let mut protocol = self.shared.protocol.lock().await;
        protocol.pending.take_if(|p| p.token == token);
    }

    async fn fallback(&self) -> StatusResponse {
        match self.last_reading().await {
            Some(reading) => StatusResponse::Stale(reading),
            None => StatusResponse::NoData,
        }
    }
}

impl<P: TransportProvider> Drop for Session<P> {
    fn drop(&mut self) {
        if let Some(task) = self.link.get_mut().notify_task.take() {
            task.abort();
        }
    }
}
