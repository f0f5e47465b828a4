//! Routing: one inbound frame in, zero or more sends out.
//!
//! The router owns the [`PeerRegistry`] and is written against the
//! [`Transport`] trait only. Per frame the flow is:
//!   1. Decode. Undecodable frames are dropped.
//!   2. Self-filter (multicast only): our own frames come back to us.
//!   3. HELLO joins, BYE leaves. Either may publish a new roster.
//!   4. Anything else refreshes the sender, then is delivered: to every
//!      peer but the origin for `ALL`, to the resolved peer otherwise.
//!
//! On a multicast transport the network has already delivered the frame
//! to every member, so step 4 only decides whether to surface it.

use std::sync::Arc;
use std::time::Duration;

use relaychat_protocol::{ChatMessage, Codec, MessageKind};
use relaychat_registry::{Peer, PeerRegistry};
use relaychat_transport::{Delivery, Endpoint, Incoming, Transport};
use tokio::sync::Mutex;

use crate::{ChatEvent, EventSink, RelayError};

/// Routes chat messages between the peers of one transport.
pub struct Router<T: Transport, C: Codec> {
    transport: Arc<T>,
    codec: C,
    registry: Mutex<PeerRegistry>,
    /// Held from a roster mutation until its broadcast has been handed to
    /// the transport, so peers see rosters in mutation order. The registry
    /// lock itself is never held across a send.
    roster_order: Mutex<()>,
    nickname: String,
    max_frame_len: usize,
    events: EventSink,
}

impl<T: Transport, C: Codec> Router<T, C> {
    pub fn new(
        transport: Arc<T>,
        codec: C,
        nickname: impl Into<String>,
        max_frame_len: usize,
        events: EventSink,
    ) -> Self {
        Self {
            transport,
            codec,
            registry: Mutex::new(PeerRegistry::new()),
            roster_order: Mutex::new(()),
            nickname: nickname.into(),
            max_frame_len,
            events,
        }
    }

    /// The local participant's nickname.
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Current nicknames in join order.
    pub async fn roster(&self) -> Vec<String> {
        self.registry.lock().await.snapshot()
    }

    fn is_multicast(&self) -> bool {
        self.transport.delivery() == Delivery::Multicast
    }

    /// Handles one event from the transport's receive loop.
    pub async fn handle(&self, incoming: Incoming) {
        match incoming {
            Incoming::Frame { from, data } => match self.codec.decode_message(&data) {
                Ok(msg) => self.route(msg, from).await,
                Err(e) => {
                    tracing::debug!(%from, len = data.len(), error = %e, "dropping undecodable frame");
                }
            },
            Incoming::Closed { endpoint } => self.disconnected(&endpoint).await,
        }
    }

    /// Routes one decoded message that arrived from `origin`.
    pub async fn route(&self, msg: ChatMessage, origin: Endpoint) {
        if self.is_multicast() && msg.sender() == self.nickname {
            tracing::trace!(target_nick = msg.target(), "discarding own multicast frame");
            return;
        }

        if msg.is_hello() {
            self.join(msg.sender(), origin).await;
            return;
        }
        if msg.is_bye() {
            self.leave(msg.sender()).await;
            return;
        }
        if msg.kind() == MessageKind::RosterUpdate {
            tracing::debug!(sender = msg.sender(), "ignoring roster update from a peer");
            return;
        }

        self.refresh(msg.sender(), origin).await;

        if self.is_multicast() {
            if msg.is_addressed_to(&self.nickname) {
                self.events.emit(ChatEvent::Message(msg));
            } else {
                tracing::debug!(
                    sender = msg.sender(),
                    target_nick = msg.target(),
                    "group message not addressed to us"
                );
            }
            return;
        }

        if msg.target() == self.nickname {
            self.events.emit(ChatEvent::Message(msg));
            return;
        }

        self.events.emit(ChatEvent::Message(msg.clone()));
        let sender = msg.sender().to_string();
        if let Err(e) = self.deliver(&msg, Some((&origin, &sender))).await {
            tracing::warn!(%sender, target_nick = msg.target(), error = %e, "relay failed");
        }
    }

    /// Sends a message that originates at the local participant.
    ///
    /// Unlike [`route`](Self::route), nobody is excluded from a broadcast.
    ///
    /// # Errors
    /// [`RelayError::FrameTooLarge`] if the encoded frame exceeds the
    /// limit, [`RelayError::Protocol`] if it cannot be encoded, and on a
    /// multicast transport [`RelayError::Transport`] if the single group
    /// send fails.
    pub async fn originate(&self, msg: ChatMessage) -> Result<(), RelayError> {
        if msg.target() == self.nickname {
            self.events.emit(ChatEvent::Message(msg));
            return Ok(());
        }
        self.deliver(&msg, None).await.map(|_| ())
    }

    /// Encodes `msg` once and sends it to every recipient. Returns how
    /// many sends succeeded.
    ///
    /// `exclude` is the origin of a relayed broadcast: its endpoint and
    /// its nickname never get the frame back.
    async fn deliver(
        &self,
        msg: &ChatMessage,
        exclude: Option<(&Endpoint, &str)>,
    ) -> Result<usize, RelayError> {
        let frame = self.encode(msg)?;

        if self.is_multicast() {
            self.transport.send(&Endpoint::Group, &frame).await?;
            return Ok(1);
        }

        let recipients: Vec<Peer> = {
            let registry = self.registry.lock().await;
            if msg.is_broadcast() {
                registry
                    .peers()
                    .into_iter()
                    .filter(|peer| match exclude {
                        Some((endpoint, nickname)) => {
                            peer.endpoint != *endpoint && peer.nickname != nickname
                        }
                        None => true,
                    })
                    .collect()
            } else {
                match registry.resolve(msg.target()) {
                    Ok(peer) => vec![peer],
                    Err(e) => {
                        tracing::warn!(
                            sender = msg.sender(),
                            target_nick = msg.target(),
                            error = %e,
                            "dropping message for unknown target"
                        );
                        self.events.emit(ChatEvent::TargetNotFound {
                            sender: msg.sender().to_string(),
                            target: msg.target().to_string(),
                        });
                        return Ok(0);
                    }
                }
            }
        };

        let mut delivered = 0;
        for peer in &recipients {
            if self.send_to(peer, &frame).await {
                delivered += 1;
            }
        }
        tracing::debug!(
            sender = msg.sender(),
            target_nick = msg.target(),
            delivered,
            recipients = recipients.len(),
            "message routed"
        );
        Ok(delivered)
    }

    /// Sends one frame to one peer. A failure is logged and concerns that
    /// peer only.
    async fn send_to(&self, peer: &Peer, frame: &[u8]) -> bool {
        match self.transport.send(&peer.endpoint, frame).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    nickname = %peer.nickname,
                    endpoint = %peer.endpoint,
                    error = %e,
                    "send failed"
                );
                false
            }
        }
    }

    fn encode(&self, msg: &ChatMessage) -> Result<Vec<u8>, RelayError> {
        let frame = self.codec.encode_message(msg)?;
        if frame.len() > self.max_frame_len {
            return Err(RelayError::FrameTooLarge {
                len: frame.len(),
                max: self.max_frame_len,
            });
        }
        Ok(frame)
    }

    // -- Roster ---------------------------------------------------------

    async fn join(&self, nickname: &str, origin: Endpoint) {
        let _order = self.roster_order.lock().await;
        let changed = {
            let mut registry = self.registry.lock().await;
            let (_, presence) = registry.register_or_update(nickname, origin);
            presence.is_join().then(|| RosterView::of(&registry))
        };
        if let Some(view) = changed {
            self.publish_roster(view).await;
        }
    }

    async fn leave(&self, nickname: &str) {
        let _order = self.roster_order.lock().await;
        let changed = {
            let mut registry = self.registry.lock().await;
            registry.remove(nickname).map(|_| RosterView::of(&registry))
        };
        if let Some(view) = changed {
            self.publish_roster(view).await;
        }
    }

    /// Refreshes a known sender. On a connectionless transport the first
    /// frame from an unknown nickname also registers it.
    async fn refresh(&self, nickname: &str, origin: Endpoint) {
        let _order = self.roster_order.lock().await;
        let changed = {
            let mut registry = self.registry.lock().await;
            if registry.touch(nickname, origin) {
                return;
            }
            if !matches!(origin, Endpoint::Addr(_)) {
                tracing::debug!(nickname, %origin, "frame from a peer that never sent HELLO");
                return;
            }
            registry.register_or_update(nickname, origin);
            RosterView::of(&registry)
        };
        self.publish_roster(changed).await;
    }

    async fn disconnected(&self, endpoint: &Endpoint) {
        let _order = self.roster_order.lock().await;
        let changed = {
            let mut registry = self.registry.lock().await;
            let gone = registry.remove_endpoint(endpoint);
            if gone.is_empty() {
                tracing::debug!(%endpoint, "unregistered connection closed");
                return;
            }
            tracing::info!(%endpoint, ?gone, "connection closed, peers removed");
            RosterView::of(&registry)
        };
        self.publish_roster(changed).await;
    }

    /// Evicts peers silent for at least `ttl` and returns who was evicted.
    pub async fn expire(&self, ttl: Duration) -> Vec<String> {
        let _order = self.roster_order.lock().await;
        let (evicted, view) = {
            let mut registry = self.registry.lock().await;
            let evicted = registry.expire_silent(ttl);
            let view = RosterView::of(&registry);
            (evicted, view)
        };
        if !evicted.is_empty() {
            self.publish_roster(view).await;
        }
        evicted
    }

    /// Forgets every peer without telling anyone.
    pub async fn clear(&self) {
        self.registry.lock().await.clear();
    }

    /// Surfaces the roster locally and, on a unicast transport, sends it
    /// to every registered peer, the newest one included.
    async fn publish_roster(&self, view: RosterView) {
        let RosterView { names, peers } = view;
        self.events.emit(ChatEvent::RosterChanged(names.clone()));
        if self.is_multicast() {
            return;
        }

        let msg = ChatMessage::roster(self.nickname.as_str(), &names);
        let frame = match self.encode(&msg) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "cannot encode roster update");
                return;
            }
        };
        for peer in &peers {
            self.send_to(peer, &frame).await;
        }
        tracing::debug!(roster = ?names, "roster published");
    }
}

/// The roster as it stood right after a mutation: names in join order
/// and the peers to tell.
struct RosterView {
    names: Vec<String>,
    peers: Vec<Peer>,
}

impl RosterView {
    fn of(registry: &PeerRegistry) -> Self {
        Self {
            names: registry.snapshot(),
            peers: registry.peers(),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Router tests run against an in-memory transport that records every
    //! send, so each test can assert the exact set of deliveries.

    use std::collections::HashSet;
    use std::net::SocketAddr;

    use relaychat_protocol::{BROADCAST, JsonCodec};
    use relaychat_transport::{ConnectionId, TransportError};

    use super::*;
    use crate::EventReceiver;

    // -- Helpers ----------------------------------------------------------

    struct MemoryTransport {
        delivery: Delivery,
        sent: std::sync::Mutex<Vec<(Endpoint, Vec<u8>)>>,
        unreachable: HashSet<Endpoint>,
    }

    impl MemoryTransport {
        fn new(delivery: Delivery) -> Self {
            Self {
                delivery,
                sent: std::sync::Mutex::new(Vec::new()),
                unreachable: HashSet::new(),
            }
        }

        /// Drains and decodes everything sent so far.
        fn take_sent(&self) -> Vec<(Endpoint, ChatMessage)> {
            self.sent
                .lock()
                .unwrap()
                .drain(..)
                .map(|(to, data)| (to, JsonCodec.decode_message(&data).unwrap()))
                .collect()
        }
    }

    impl Transport for MemoryTransport {
        fn delivery(&self) -> Delivery {
            self.delivery
        }

        fn local_addr(&self) -> Result<SocketAddr, TransportError> {
            Ok("127.0.0.1:9999".parse().unwrap())
        }

        async fn open(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send(&self, to: &Endpoint, data: &[u8]) -> Result<(), TransportError> {
            if self.unreachable.contains(to) {
                return Err(TransportError::ConnectionClosed(*to));
            }
            self.sent.lock().unwrap().push((*to, data.to_vec()));
            Ok(())
        }

        async fn recv(&self) -> Result<Incoming, TransportError> {
            Err(TransportError::Shutdown)
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    type TestRouter = Router<MemoryTransport, JsonCodec>;

    fn router(delivery: Delivery) -> (TestRouter, Arc<MemoryTransport>, EventReceiver) {
        router_with(MemoryTransport::new(delivery))
    }

    fn router_with(transport: MemoryTransport) -> (TestRouter, Arc<MemoryTransport>, EventReceiver) {
        let transport = Arc::new(transport);
        let (events, rx) = EventSink::channel();
        let router = Router::new(Arc::clone(&transport), JsonCodec, "Server", 65_535, events);
        (router, transport, rx)
    }

    fn conn(id: u64) -> Endpoint {
        Endpoint::Connection(ConnectionId::new(id))
    }

    fn addr(port: u16) -> Endpoint {
        Endpoint::Addr(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    fn frame(msg: &ChatMessage, from: Endpoint) -> Incoming {
        Incoming::Frame {
            from,
            data: JsonCodec.encode_message(msg).unwrap(),
        }
    }

    fn drain(rx: &mut EventReceiver) -> Vec<ChatEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn roster_events(events: &[ChatEvent]) -> Vec<Vec<String>> {
        events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::RosterChanged(names) => Some(names.clone()),
                _ => None,
            })
            .collect()
    }

    // =====================================================================
    // Joins and the roster
    // =====================================================================

    #[tokio::test]
    async fn test_route_alice_and_bob_join_then_broadcast_excludes_origin() {
        let (router, transport, mut rx) = router(Delivery::Unicast);

        router.handle(frame(&ChatMessage::hello("Alice"), conn(1))).await;
        router.handle(frame(&ChatMessage::hello("Bob"), conn(2))).await;

        assert_eq!(
            roster_events(&drain(&mut rx)),
            vec![vec!["Alice".to_string()], vec!["Alice".to_string(), "Bob".to_string()]]
        );
        assert_eq!(router.roster().await, vec!["Alice", "Bob"]);

        // Roster frames: Alice after her join, then both after Bob's.
        let sent = transport.take_sent();
        let rosters: Vec<_> = sent
            .iter()
            .map(|(to, m)| (*to, m.roster_names().unwrap()))
            .collect();
        assert_eq!(
            rosters,
            vec![
                (conn(1), vec!["Alice".to_string()]),
                (conn(1), vec!["Alice".to_string(), "Bob".to_string()]),
                (conn(2), vec!["Alice".to_string(), "Bob".to_string()]),
            ]
        );
        assert!(sent.iter().all(|(_, m)| m.sender() == "Server"));

        router
            .handle(frame(&ChatMessage::text("Alice", BROADCAST, "hi"), conn(1)))
            .await;

        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, conn(2), "Bob receives it, Alice does not");
        assert_eq!(sent[0].1.body_text(), Some("hi"));
    }

    #[tokio::test]
    async fn test_route_broadcast_reaches_every_other_peer_exactly_once() {
        let (router, transport, _rx) = router(Delivery::Unicast);
        for (i, nick) in ["a", "b", "c", "d"].iter().enumerate() {
            router.route(ChatMessage::hello(*nick), conn(i as u64)).await;
        }
        transport.take_sent();

        router.route(ChatMessage::text("c", BROADCAST, "x"), conn(2)).await;

        let mut targets: Vec<_> = transport.take_sent().into_iter().map(|(to, _)| to).collect();
        targets.sort_by_key(|e| e.to_string());
        assert_eq!(targets, vec![conn(0), conn(1), conn(3)]);
    }

    #[tokio::test]
    async fn test_route_duplicate_hello_is_silent_refresh() {
        let (router, transport, mut rx) = router(Delivery::Unicast);
        router.route(ChatMessage::hello("Alice"), conn(1)).await;
        drain(&mut rx);
        transport.take_sent();

        router.route(ChatMessage::hello("Alice"), conn(1)).await;

        assert!(roster_events(&drain(&mut rx)).is_empty());
        assert!(transport.take_sent().is_empty());
    }

    #[tokio::test]
    async fn test_route_rejoin_from_new_endpoint_rebinds_without_duplicate() {
        let (router, transport, _rx) = router(Delivery::Unicast);
        router.route(ChatMessage::hello("Alice"), addr(5000)).await;
        router.route(ChatMessage::hello("Bob"), addr(6000)).await;
        router.route(ChatMessage::hello("Alice"), addr(5001)).await;
        transport.take_sent();

        assert_eq!(router.roster().await, vec!["Alice", "Bob"]);

        router.route(ChatMessage::text("Bob", "Alice", "where are you?"), addr(6000)).await;
        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, addr(5001));
    }

    #[tokio::test]
    async fn test_route_first_datagram_frame_registers_sender() {
        let (router, transport, mut rx) = router(Delivery::Unicast);

        router.route(ChatMessage::text("Carol", BROADCAST, "anyone?"), addr(7000)).await;

        assert_eq!(router.roster().await, vec!["Carol"]);
        assert_eq!(roster_events(&drain(&mut rx)), vec![vec!["Carol".to_string()]]);
        // Only the roster frame goes out: Carol is the origin of the broadcast.
        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.kind(), MessageKind::RosterUpdate);
    }

    #[tokio::test]
    async fn test_route_datagram_frame_refreshes_endpoint() {
        let (router, transport, _rx) = router(Delivery::Unicast);
        router.route(ChatMessage::hello("Alice"), addr(5000)).await;
        router.route(ChatMessage::hello("Bob"), addr(6000)).await;
        router.route(ChatMessage::text("Alice", "Bob", "moved"), addr(5002)).await;
        transport.take_sent();

        router.route(ChatMessage::text("Bob", "Alice", "ack"), addr(6000)).await;

        assert_eq!(transport.take_sent()[0].0, addr(5002));
    }

    // =====================================================================
    // Leaves
    // =====================================================================

    #[tokio::test]
    async fn test_route_bye_removes_sender_and_publishes_roster() {
        let (router, transport, mut rx) = router(Delivery::Unicast);
        router.route(ChatMessage::hello("Alice"), conn(1)).await;
        router.route(ChatMessage::hello("Bob"), conn(2)).await;
        drain(&mut rx);
        transport.take_sent();

        router.route(ChatMessage::bye("Alice"), conn(1)).await;

        assert_eq!(router.roster().await, vec!["Bob"]);
        assert_eq!(roster_events(&drain(&mut rx)), vec![vec!["Bob".to_string()]]);
        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, conn(2));
    }

    #[tokio::test]
    async fn test_route_bye_from_unknown_is_noop() {
        let (router, transport, mut rx) = router(Delivery::Unicast);

        router.route(ChatMessage::bye("Ghost"), conn(1)).await;

        assert!(drain(&mut rx).is_empty());
        assert!(transport.take_sent().is_empty());
    }

    #[tokio::test]
    async fn test_handle_closed_removes_bound_peers() {
        let (router, transport, mut rx) = router(Delivery::Unicast);
        router.route(ChatMessage::hello("Alice"), conn(1)).await;
        router.route(ChatMessage::hello("Bob"), conn(2)).await;
        drain(&mut rx);
        transport.take_sent();

        router.handle(Incoming::Closed { endpoint: conn(1) }).await;

        assert_eq!(router.roster().await, vec!["Bob"]);
        assert_eq!(roster_events(&drain(&mut rx)), vec![vec!["Bob".to_string()]]);
        assert_eq!(transport.take_sent().len(), 1);
    }

    #[tokio::test]
    async fn test_expire_zero_ttl_evicts_and_publishes_empty_roster() {
        let (router, _transport, mut rx) = router(Delivery::Unicast);
        router.route(ChatMessage::hello("Alice"), addr(5000)).await;
        drain(&mut rx);

        let evicted = router.expire(Duration::ZERO).await;

        assert_eq!(evicted, vec!["Alice"]);
        assert_eq!(roster_events(&drain(&mut rx)), vec![Vec::<String>::new()]);
    }

    // =====================================================================
    // Unicast targets
    // =====================================================================

    #[tokio::test]
    async fn test_route_unknown_target_zero_sends_and_one_event() {
        let (router, transport, mut rx) = router(Delivery::Unicast);
        router.route(ChatMessage::hello("Alice"), conn(1)).await;
        drain(&mut rx);
        transport.take_sent();

        router.route(ChatMessage::text("Alice", "Bob", "hello?"), conn(1)).await;

        assert!(transport.take_sent().is_empty());
        let not_found: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, ChatEvent::TargetNotFound { .. }))
            .collect();
        assert_eq!(
            not_found,
            vec![ChatEvent::TargetNotFound {
                sender: "Alice".into(),
                target: "Bob".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_route_direct_message_reaches_only_target() {
        let (router, transport, _rx) = router(Delivery::Unicast);
        router.route(ChatMessage::hello("Alice"), conn(1)).await;
        router.route(ChatMessage::hello("Bob"), conn(2)).await;
        router.route(ChatMessage::hello("Carol"), conn(3)).await;
        transport.take_sent();

        router.route(ChatMessage::text("Alice", "Carol", "psst"), conn(1)).await;

        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, conn(3));
    }

    #[tokio::test]
    async fn test_route_empty_file_is_still_delivered() {
        let (router, transport, _rx) = router(Delivery::Unicast);
        router.route(ChatMessage::hello("Alice"), conn(1)).await;
        router.route(ChatMessage::hello("Bob"), conn(2)).await;
        transport.take_sent();

        router
            .route(ChatMessage::file("Alice", "Bob", "empty.txt", Vec::new()), conn(1))
            .await;

        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.payload(), Some(&[][..]));
    }

    #[tokio::test]
    async fn test_route_message_to_local_nickname_is_surfaced_not_relayed() {
        let (router, transport, mut rx) = router(Delivery::Unicast);
        router.route(ChatMessage::hello("Alice"), conn(1)).await;
        drain(&mut rx);
        transport.take_sent();

        let msg = ChatMessage::text("Alice", "Server", "hi server");
        router.route(msg.clone(), conn(1)).await;

        assert!(transport.take_sent().is_empty());
        assert_eq!(drain(&mut rx), vec![ChatEvent::Message(msg)]);
    }

    #[tokio::test]
    async fn test_route_send_failure_does_not_block_other_recipients() {
        let mut transport = MemoryTransport::new(Delivery::Unicast);
        transport.unreachable.insert(conn(2));
        let (router, transport, _rx) = router_with(transport);
        router.route(ChatMessage::hello("Alice"), conn(1)).await;
        router.route(ChatMessage::hello("Bob"), conn(2)).await;
        router.route(ChatMessage::hello("Carol"), conn(3)).await;
        transport.take_sent();

        router.route(ChatMessage::text("Alice", BROADCAST, "hi"), conn(1)).await;

        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, conn(3));
    }

    #[tokio::test]
    async fn test_handle_garbage_frame_is_dropped() {
        let (router, transport, mut rx) = router(Delivery::Unicast);

        router
            .handle(Incoming::Frame { from: conn(1), data: b"not a frame".to_vec() })
            .await;

        assert!(drain(&mut rx).is_empty());
        assert!(transport.take_sent().is_empty());
    }

    #[tokio::test]
    async fn test_route_roster_update_from_peer_is_ignored() {
        let (router, transport, mut rx) = router(Delivery::Unicast);

        router.route(ChatMessage::roster("Mallory", &["x", "y"]), conn(1)).await;

        assert!(router.roster().await.is_empty());
        assert!(drain(&mut rx).is_empty());
        assert!(transport.take_sent().is_empty());
    }

    // =====================================================================
    // Local participant
    // =====================================================================

    #[tokio::test]
    async fn test_originate_broadcast_reaches_every_peer() {
        let (router, transport, _rx) = router(Delivery::Unicast);
        router.route(ChatMessage::hello("Alice"), conn(1)).await;
        router.route(ChatMessage::hello("Bob"), conn(2)).await;
        transport.take_sent();

        router
            .originate(ChatMessage::text("Server", BROADCAST, "maintenance at noon"))
            .await
            .unwrap();

        let targets: Vec<_> = transport.take_sent().into_iter().map(|(to, _)| to).collect();
        assert_eq!(targets, vec![conn(1), conn(2)]);
    }

    #[tokio::test]
    async fn test_originate_oversized_file_is_rejected_before_sending() {
        let transport = Arc::new(MemoryTransport::new(Delivery::Unicast));
        let (events, _rx) = EventSink::channel();
        let router = Router::new(Arc::clone(&transport), JsonCodec, "Server", 256, events);
        router.route(ChatMessage::hello("Alice"), conn(1)).await;
        transport.take_sent();

        let result = router
            .originate(ChatMessage::file("Server", "Alice", "big.png", vec![0xAB; 1024]))
            .await;

        assert!(matches!(result, Err(RelayError::FrameTooLarge { max: 256, .. })));
        assert!(transport.take_sent().is_empty());
    }

    // =====================================================================
    // Multicast
    // =====================================================================

    #[tokio::test]
    async fn test_route_group_own_frame_is_self_filtered() {
        let (router, transport, mut rx) = router(Delivery::Multicast);

        router
            .handle(frame(&ChatMessage::text("Server", BROADCAST, "echo"), addr(4446)))
            .await;
        router.handle(frame(&ChatMessage::hello("Server"), addr(4446))).await;

        assert!(drain(&mut rx).is_empty(), "own frames never reach the feed");
        assert!(router.roster().await.is_empty());
        assert!(transport.take_sent().is_empty());
    }

    #[tokio::test]
    async fn test_route_group_hello_updates_roster_locally_only() {
        let (router, transport, mut rx) = router(Delivery::Multicast);

        router.route(ChatMessage::hello("Alice"), addr(4446)).await;

        assert_eq!(roster_events(&drain(&mut rx)), vec![vec!["Alice".to_string()]]);
        assert!(transport.take_sent().is_empty(), "rosters are not transmitted");
    }

    #[tokio::test]
    async fn test_route_group_surfaces_only_messages_for_us() {
        let (router, transport, mut rx) = router(Delivery::Multicast);
        router.route(ChatMessage::hello("Alice"), addr(4446)).await;
        drain(&mut rx);

        let for_all = ChatMessage::text("Alice", BROADCAST, "hi all");
        let for_us = ChatMessage::text("Alice", "Server", "hi you");
        let for_bob = ChatMessage::text("Alice", "Bob", "hi bob");
        router.route(for_all.clone(), addr(4446)).await;
        router.route(for_us.clone(), addr(4446)).await;
        router.route(for_bob, addr(4446)).await;

        assert_eq!(
            drain(&mut rx),
            vec![ChatEvent::Message(for_all), ChatEvent::Message(for_us)]
        );
        assert!(transport.take_sent().is_empty(), "the network already delivered it");
    }

    #[tokio::test]
    async fn test_originate_group_sends_once_to_group() {
        let (router, transport, _rx) = router(Delivery::Multicast);
        router.route(ChatMessage::hello("Alice"), addr(4446)).await;
        router.route(ChatMessage::hello("Bob"), addr(4446)).await;

        router
            .originate(ChatMessage::text("Server", BROADCAST, "one frame"))
            .await
            .unwrap();

        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Endpoint::Group);
    }
}
