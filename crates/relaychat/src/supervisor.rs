//! `Supervisor` builder and session lifecycle.
//!
//! The supervisor is the entry point for running a relay. It binds the
//! configured transport, wires it to a [`Router`], and owns the tasks that
//! keep it fed:
//!
//! - the receive loop (one per transport; the stream transport fans its
//!   per-connection readers into that one loop),
//! - the optional expiry sweep that evicts silent peers.
//!
//! `start` and `stop` take the same lock, so only one transition is ever
//! in flight and a second caller sees the settled result.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use relaychat_protocol::{ChatMessage, Codec, JsonCodec};
use relaychat_transport::{AnyTransport, Delivery, Transport};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::{ChatEvent, EventReceiver, EventSink, RelayConfig, RelayError, Router, SessionState};

/// How often the expiry task looks for silent peers.
const EXPIRY_SWEEP: Duration = Duration::from_secs(1);

/// Builder for a [`Supervisor`].
///
/// # Example
///
/// ```rust,no_run
/// use relaychat::{RelayConfig, Supervisor};
///
/// # async fn run() -> Result<(), relaychat::RelayError> {
/// let (relay, mut events) = Supervisor::builder().build();
/// relay.start(RelayConfig::default()).await?;
/// while let Some(event) = events.recv().await {
///     println!("{event:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct SupervisorBuilder<C: Codec> {
    codec: C,
}

impl SupervisorBuilder<JsonCodec> {
    /// Creates a builder using the default JSON wire format.
    pub fn new() -> Self {
        Self { codec: JsonCodec }
    }
}

impl Default for SupervisorBuilder<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec + Clone> SupervisorBuilder<C> {
    /// Replaces the wire codec. Every peer must use the same one.
    pub fn codec<D: Codec + Clone>(self, codec: D) -> SupervisorBuilder<D> {
        SupervisorBuilder { codec }
    }

    /// Builds a stopped supervisor and the receiving end of its event feed.
    pub fn build(self) -> (Supervisor<C>, EventReceiver) {
        let (events, rx) = EventSink::channel();
        let (state, _) = watch::channel(SessionState::Stopped);
        let inner = Arc::new(Inner {
            codec: self.codec,
            events,
            state,
            session: Mutex::new(None),
            generation: std::sync::atomic::AtomicU64::new(0),
        });
        (Supervisor { inner }, rx)
    }
}

/// Owns the relay's lifecycle. Cheap to clone; clones share one session.
pub struct Supervisor<C: Codec = JsonCodec> {
    inner: Arc<Inner<C>>,
}

impl<C: Codec> Clone for Supervisor<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<C: Codec> {
    codec: C,
    events: EventSink,
    state: watch::Sender<SessionState>,
    /// `Some` while running. Also the start/stop serialization lock.
    session: Mutex<Option<Session<C>>>,
    generation: std::sync::atomic::AtomicU64,
}

/// Everything that exists only while running.
struct Session<C: Codec> {
    generation: u64,
    config: RelayConfig,
    transport: Arc<AnyTransport>,
    router: Arc<Router<AnyTransport, C>>,
    local_addr: SocketAddr,
    receive_task: JoinHandle<()>,
    expiry_task: Option<JoinHandle<()>>,
}

impl Supervisor<JsonCodec> {
    pub fn builder() -> SupervisorBuilder<JsonCodec> {
        SupervisorBuilder::new()
    }
}

impl<C: Codec + Clone> Supervisor<C> {
    /// The current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// The bound local address while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.session.lock().await.as_ref().map(|s| s.local_addr)
    }

    /// Registered nicknames in join order. Empty while stopped.
    pub async fn roster(&self) -> Vec<String> {
        match self.router().await {
            Some(router) => router.roster().await,
            None => Vec::new(),
        }
    }

    /// Binds the configured transport and starts routing.
    ///
    /// On a bind failure the error is reported on the event feed and
    /// returned, and the supervisor stays `Stopped`.
    ///
    /// # Errors
    /// - [`RelayError::AlreadyRunning`] if a session is active
    /// - [`RelayError::InvalidConfig`] / [`RelayError::Transport`] if the
    ///   config is rejected or the transport cannot bind or open
    pub async fn start(&self, config: RelayConfig) -> Result<(), RelayError> {
        let mut session = self.inner.session.lock().await;
        if session.is_some() {
            return Err(RelayError::AlreadyRunning);
        }

        self.inner.set_state(SessionState::Starting, None);
        match self.inner.launch(config).await {
            Ok(started) => {
                let detail = format!("{} on {}", started.config.transport.mode(), started.local_addr);
                tracing::info!(
                    nickname = %started.config.nickname,
                    local_addr = %started.local_addr,
                    mode = started.config.transport.mode(),
                    "relay running"
                );
                *session = Some(started);
                self.inner.set_state(SessionState::Running, Some(detail));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "relay failed to start");
                self.inner.set_state(SessionState::Stopped, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Stops routing, closes the transport, and forgets every peer.
    ///
    /// Peers are not told about the roster change: they are being cut off
    /// anyway. Idempotent.
    pub async fn stop(&self) {
        self.inner.shutdown(None, None).await;
    }

    /// Sends a chat line from the local participant.
    ///
    /// # Errors
    /// [`RelayError::NotRunning`] while stopped, plus anything
    /// [`Router::originate`] reports.
    pub async fn send_text(
        &self,
        target: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), RelayError> {
        let router = self.router().await.ok_or(RelayError::NotRunning)?;
        let msg = ChatMessage::text(router.nickname(), target, text);
        router.originate(msg).await
    }

    /// Sends a file from the local participant.
    ///
    /// # Errors
    /// [`RelayError::FrameTooLarge`] if the encoded frame would exceed
    /// `max_frame_len`; otherwise as for [`send_text`](Self::send_text).
    pub async fn send_file(
        &self,
        target: impl Into<String>,
        filename: impl Into<String>,
        payload: Vec<u8>,
    ) -> Result<(), RelayError> {
        let router = self.router().await.ok_or(RelayError::NotRunning)?;
        let msg = ChatMessage::file(router.nickname(), target, filename, payload);
        router.originate(msg).await
    }

    async fn router(&self) -> Option<Arc<Router<AnyTransport, C>>> {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .map(|s| Arc::clone(&s.router))
    }
}

impl<C: Codec + Clone> Inner<C> {
    fn set_state(&self, state: SessionState, detail: Option<String>) {
        self.state.send_replace(state);
        self.events.status(state, detail);
    }

    /// Binds, opens, and spawns the session's tasks. Leaves nothing
    /// behind on failure.
    async fn launch(self: &Arc<Self>, config: RelayConfig) -> Result<Session<C>, RelayError> {
        config.validate()?;

        let transport = Arc::new(AnyTransport::bind(&config.transport, config.max_frame_len).await?);
        let local_addr = transport.local_addr()?;
        if let Err(e) = transport.open().await {
            let _ = transport.close().await;
            return Err(e.into());
        }

        let router = Arc::new(Router::new(
            Arc::clone(&transport),
            self.codec.clone(),
            config.nickname.clone(),
            config.max_frame_len,
            self.events.clone(),
        ));

        if transport.delivery() == Delivery::Multicast {
            if let Err(e) = router.originate(ChatMessage::hello(config.nickname.as_str())).await {
                tracing::warn!(error = %e, "group HELLO failed");
            }
        }

        let generation = self
            .generation
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;
        let receive_task = tokio::spawn(receive_loop(
            Arc::clone(&transport),
            Arc::clone(&router),
            Arc::downgrade(self),
            generation,
        ));
        let expiry_task = config
            .peer_ttl
            .map(|ttl| tokio::spawn(expiry_loop(Arc::clone(&router), ttl)));

        Ok(Session {
            generation,
            config,
            transport,
            router,
            local_addr,
            receive_task,
            expiry_task,
        })
    }

    /// Tears the session down. With `only` set, does nothing unless that
    /// generation is still the one running, so a late forced stop cannot
    /// take down a newer session.
    async fn shutdown(&self, only: Option<u64>, reason: Option<String>) {
        let mut guard = self.session.lock().await;
        let Some(session) = guard.take_if(|s| only.is_none_or(|g| g == s.generation)) else {
            return;
        };

        self.set_state(SessionState::Stopping, reason);

        if session.transport.delivery() == Delivery::Multicast {
            let bye = ChatMessage::bye(session.config.nickname.as_str());
            if let Err(e) = session.router.originate(bye).await {
                tracing::debug!(error = %e, "group BYE failed");
            }
        }

        if let Some(task) = session.expiry_task {
            task.abort();
        }
        if let Err(e) = session.transport.close().await {
            tracing::debug!(error = %e, "transport close failed");
        }
        if let Err(e) = session.receive_task.await {
            if !e.is_cancelled() {
                tracing::error!(error = %e, "receive loop panicked");
            }
        }

        session.router.clear().await;
        self.events.emit(ChatEvent::RosterChanged(Vec::new()));

        tracing::info!(nickname = %session.config.nickname, "relay stopped");
        self.set_state(SessionState::Stopped, None);
    }
}

/// Feeds every transport event to the router until the transport closes.
///
/// An unexpected receive error ends the loop and forces a stop. The stop
/// runs in its own task because it waits for this one to finish.
async fn receive_loop<C: Codec + Clone>(
    transport: Arc<AnyTransport>,
    router: Arc<Router<AnyTransport, C>>,
    supervisor: Weak<Inner<C>>,
    generation: u64,
) {
    loop {
        match transport.recv().await {
            Ok(incoming) => router.handle(incoming).await,
            Err(e) if e.is_shutdown() => {
                tracing::debug!("receive loop stopped");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "receive loop failed");
                if let Some(inner) = supervisor.upgrade() {
                    let reason = e.to_string();
                    tokio::spawn(async move { inner.shutdown(Some(generation), Some(reason)).await });
                }
                return;
            }
        }
    }
}

/// Evicts peers that have been silent for `ttl`, checking once a second.
async fn expiry_loop<C: Codec + Clone>(router: Arc<Router<AnyTransport, C>>, ttl: Duration) {
    let mut interval = tokio::time::interval(EXPIRY_SWEEP);
    loop {
        interval.tick().await;
        let evicted = router.expire(ttl).await;
        if !evicted.is_empty() {
            tracing::debug!(removed = evicted.len(), "expired silent peers");
        }
    }
}
