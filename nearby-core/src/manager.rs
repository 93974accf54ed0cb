//! Network manager: turns the connection-oriented byte transport into correlated
//! request/response exchanges, answers peers' requests from the content store, and
//! pulls feeds from connected peers on a fixed interval.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::content::{Access, ContentId, ContentItem, ContentPayload, DetailLevel, FeedItem};
use crate::error::{SyncError, SyncResult};
use crate::event::SyncEvent;
use crate::identity::{now_millis, MessageId, PeerId};
use crate::pending::{PendingRequests, Unresolved};
use crate::protocol::{
    ContentRequest, ContentResponse, DataAck, DataShare, Empty, ErrorCode, ErrorPayload,
    FeedRequest, FeedResponse, Message, MessageType, Payload,
};
use crate::session::{PeerSession, SessionTable};
use crate::store::ContentStore;
use crate::transport::{Transport, TransportEvent};
use crate::wire::{self, DecodeError};

struct Inner {
    local: PeerId,
    transport: Arc<dyn Transport>,
    store: Arc<ContentStore>,
    config: SyncConfig,
    sessions: SessionTable,
    pending: PendingRequests,
    events: broadcast::Sender<SyncEvent>,
}

/// Cheap to clone; clones share sessions, pending requests and the event channel.
#[derive(Clone)]
pub struct NetworkManager {
    inner: Arc<Inner>,
}

/// Outcome of [`NetworkManager::share_content`].
#[derive(Debug)]
pub struct ShareReport {
    pub content_id: ContentId,
    pub acked: Vec<PeerId>,
    pub failed: Vec<(PeerId, SyncError)>,
}

/// Outcome of one round of feed pulls.
#[derive(Debug, Default)]
pub struct PullSummary {
    /// Peers pulled successfully, with the number of items each returned.
    pub pulled: Vec<(PeerId, usize)>,
    pub failed: Vec<(PeerId, SyncError)>,
}

/// Background tasks started by [`NetworkManager::start`].
pub struct SyncHandle {
    inbound: JoinHandle<()>,
    sync: JoinHandle<()>,
}

impl SyncHandle {
    pub fn shutdown(self) {
        self.inbound.abort();
        self.sync.abort();
    }
}

impl NetworkManager {
    pub fn new(
        local: PeerId,
        transport: Arc<dyn Transport>,
        store: Arc<ContentStore>,
        config: SyncConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        info!(peer = %local, "creating network manager");
        Self {
            inner: Arc::new(Inner {
                local,
                transport,
                store,
                config,
                sessions: SessionTable::default(),
                pending: PendingRequests::default(),
                events,
            }),
        }
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.inner.local
    }

    pub fn store(&self) -> &Arc<ContentStore> {
        &self.inner.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Subscribe to events. Only events emitted after subscribing are delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn sessions(&self) -> Vec<PeerSession> {
        self.inner.sessions.snapshot()
    }

    pub fn session(&self, peer: &PeerId) -> Option<PeerSession> {
        self.inner.sessions.get(peer)
    }

    /// Requests still waiting for a response.
    pub fn in_flight(&self) -> usize {
        self.inner.pending.len()
    }

    /// Spawn the inbound loop over `inbound` and the periodic sync loop, then emit `Initialized`.
    pub fn start(&self, inbound: mpsc::UnboundedReceiver<TransportEvent>) -> SyncHandle {
        let inbound = tokio::spawn(self.clone().run_inbound(inbound));
        let sync = tokio::spawn(self.clone().run_sync_loop());
        self.emit(SyncEvent::Initialized {
            local: self.inner.local.clone(),
        });
        SyncHandle { inbound, sync }
    }

    /// Consume transport events until the channel closes. Connection changes are applied
    /// in order; each received chunk is handled on its own task.
    pub async fn run_inbound(self, mut inbound: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = inbound.recv().await {
            match event {
                TransportEvent::Connected(peer) => self.on_peer_connected(&peer),
                TransportEvent::Disconnected(peer) => self.on_peer_disconnected(&peer),
                TransportEvent::Received(peer, bytes) => {
                    let manager = self.clone();
                    tokio::spawn(async move { manager.on_bytes(&peer, &bytes).await });
                }
            }
        }
        debug!("transport event channel closed");
    }

    pub fn on_peer_connected(&self, peer: &PeerId) {
        if self.inner.sessions.open(peer) {
            info!(peer = %peer, "peer connected");
            self.emit(SyncEvent::PeerConnected(peer.clone()));
        }
    }

    /// Retire the session and fail requests still waiting on `peer`.
    pub fn on_peer_disconnected(&self, peer: &PeerId) {
        let abandoned = self.inner.pending.abandon_peer(peer);
        if self.inner.sessions.remove(peer).is_some() {
            info!(peer = %peer, abandoned, "peer disconnected");
            self.emit(SyncEvent::PeerDisconnected(peer.clone()));
        }
    }

    /// Handle one inbound chunk. Never fails: decode errors become a `ProtocolError`
    /// event and, when the sender is owed a reply, an ERROR back.
    /// Refreshes the sender's session but never opens one; only connection events do.
    pub async fn on_bytes(&self, peer: &PeerId, bytes: &[u8]) {
        self.inner.sessions.touch(peer);
        let err = match wire::decode(bytes) {
            Ok(msg) => return self.dispatch(peer, msg).await,
            Err(err) => err,
        };
        warn!(peer = %peer, error = %err, "dropping undecodable message");
        self.emit(SyncEvent::ProtocolError {
            peer: peer.clone(),
            message: err.to_string(),
        });
        let code = match &err {
            DecodeError::UnknownMessageType { .. } => Some(ErrorCode::UnknownMessageType),
            DecodeError::PayloadSchemaError { kind, .. } if kind.expects_reply() => {
                Some(ErrorCode::MalformedRequest)
            }
            _ => None,
        };
        if let (Some(code), Some(id)) = (code, err.message_id()) {
            self.reply(peer, id.clone(), Payload::error(code, err.to_string()))
                .await;
        }
    }

    async fn dispatch(&self, peer: &PeerId, msg: Message) {
        let kind = msg.message_type();
        if !kind.expects_reply() {
            return self.on_response(peer, msg);
        }
        let id = msg.id;
        match msg.payload {
            Payload::Ping(_) => self.reply(peer, id, Payload::Pong(Empty {})).await,
            Payload::FeedRequest(req) => {
                let limit = self.inner.config.clamp_feed_limit(req.limit);
                let items =
                    self.inner
                        .store
                        .feed_for(peer, req.since, req.categories.as_deref(), limit);
                debug!(peer = %peer, items = items.len(), since = ?req.since, "serving feed");
                self.reply(peer, id, Payload::FeedResponse(FeedResponse { items }))
                    .await
            }
            Payload::ContentRequest(req) => {
                let payload =
                    match self
                        .inner
                        .store
                        .fetch_for(peer, &req.content_id, req.detail_level)
                    {
                        Ok(data) => Payload::ContentResponse(ContentResponse {
                            content_id: req.content_id,
                            detail_level: req.detail_level,
                            data: Some(data),
                        }),
                        Err(e) => {
                            debug!(peer = %peer, error = %e, "refusing content request");
                            // Unknown and hidden ids get the same answer.
                            Payload::error(
                                ErrorCode::ContentNotAvailable,
                                format!("content {} not available", req.content_id),
                            )
                        }
                    };
                self.reply(peer, id, payload).await
            }
            Payload::DataShare(share) => {
                let received = self.inner.store.ingest(peer, share);
                info!(peer = %peer, content = %received.id, category = %received.category, "content received");
                let ack = Payload::DataAck(DataAck {
                    message_id: id.clone(),
                });
                self.reply(peer, id, ack).await;
                self.emit(SyncEvent::ContentReceived {
                    peer: peer.clone(),
                    content_id: received.id,
                });
            }
            Payload::Pong(_)
            | Payload::FeedResponse(_)
            | Payload::ContentResponse(_)
            | Payload::DataAck(_)
            | Payload::Error(_) => {}
        }
    }

    fn on_response(&self, peer: &PeerId, msg: Message) {
        let id = msg.id.clone();
        let kind = msg.message_type();
        let error = match &msg.payload {
            Payload::Error(e) => Some(e.clone()),
            _ => None,
        };
        if self.inner.pending.resolve(peer, msg) {
            return;
        }
        match error {
            Some(e) => {
                warn!(peer = %peer, code = %e.code, "uncorrelated error from peer: {}", e.message);
                self.emit(SyncEvent::PeerError {
                    peer: peer.clone(),
                    message: format!("{}: {}", e.code, e.message),
                });
            }
            None => debug!(peer = %peer, id = %id, kind = %kind, "no pending request; response dropped"),
        }
    }

    /// Send a reply. Failures are logged; nobody is waiting on them.
    async fn reply(&self, peer: &PeerId, request_id: MessageId, payload: Payload) {
        let msg = Message::reply(request_id, payload);
        let bytes = match wire::encode(&msg) {
            Ok(b) => b,
            Err(e) => {
                warn!(peer = %peer, error = %e, "failed to encode reply");
                return;
            }
        };
        if let Err(e) = self.inner.transport.send(peer, bytes).await {
            warn!(peer = %peer, kind = %msg.message_type(), error = %e, "failed to send reply");
        }
    }

    /// Send a request and wait for the correlated response, bounded by the request timeout.
    async fn exchange(&self, peer: &PeerId, payload: Payload) -> SyncResult<Message> {
        let msg = Message::new(payload);
        let kind = msg.message_type();
        let bytes = wire::encode(&msg)?;
        // Register before sending: the response can arrive before `send` returns.
        let slot = self.inner.pending.register(msg.id.clone(), peer.clone());
        debug!(peer = %peer, id = %slot.id(), kind = %kind, "sending request");
        if let Err(e) = self.inner.transport.send(peer, bytes).await {
            warn!(peer = %peer, kind = %kind, error = %e, "send failed");
            return Err(e.into());
        }
        let timeout = self.inner.config.request_timeout;
        match slot.wait(timeout).await {
            Ok(response) => Ok(response),
            Err(Unresolved::TimedOut) => {
                warn!(peer = %peer, id = %msg.id, kind = %kind, "request timed out");
                Err(SyncError::Timeout {
                    peer: peer.clone(),
                    after: timeout,
                })
            }
            Err(Unresolved::Abandoned) => Err(SyncError::Disconnected(peer.clone())),
        }
    }

    /// Round-trip time of a PING/PONG exchange.
    pub async fn ping(&self, peer: &PeerId) -> SyncResult<Duration> {
        let started = Instant::now();
        let response = self.exchange(peer, Payload::Ping(Empty {})).await?;
        match response.payload {
            Payload::Pong(_) => Ok(started.elapsed()),
            other => Err(unexpected(MessageType::Pong, other)),
        }
    }

    /// Pull `peer`'s feed newer than `since`. Results are merged into the cached feed of
    /// `peer` and returned newest first, unique by id.
    pub async fn request_feed(
        &self,
        peer: &PeerId,
        since: Option<i64>,
        limit: u32,
    ) -> SyncResult<Vec<FeedItem>> {
        self.pull_feed(
            peer,
            FeedRequest {
                since,
                categories: None,
                limit,
            },
        )
        .await
    }

    /// Like [`request_feed`](Self::request_feed) with a full request, e.g. a category filter.
    /// Only unfiltered pulls advance the peer's feed cursor: a category-filtered
    /// result says nothing about items in other categories.
    pub async fn pull_feed(&self, peer: &PeerId, request: FeedRequest) -> SyncResult<Vec<FeedItem>> {
        let unfiltered = request.categories.is_none();
        let response = self.exchange(peer, Payload::FeedRequest(request)).await?;
        let mut items = match response.payload {
            Payload::FeedResponse(r) => r.items,
            other => return Err(unexpected(MessageType::FeedResponse, other)),
        };
        let mut seen = HashSet::new();
        items.retain(|item| seen.insert(item.id.clone()));
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));

        let added = self.inner.store.merge_feed(peer, &items);
        let newest = items.iter().map(|i| i.timestamp).max().filter(|_| unfiltered);
        self.inner.sessions.record_sync(peer, newest);
        info!(peer = %peer, received = items.len(), added, "feed updated");
        self.emit(SyncEvent::FeedUpdated {
            peer: peer.clone(),
            count: added,
        });
        Ok(items)
    }

    /// Fetch one item from `peer`. A CONTENT_NOT_AVAILABLE refusal is `AccessDenied`.
    pub async fn fetch_content(
        &self,
        peer: &PeerId,
        content_id: &ContentId,
        detail_level: DetailLevel,
    ) -> SyncResult<ContentPayload> {
        let request = Payload::ContentRequest(ContentRequest {
            content_id: content_id.clone(),
            detail_level,
        });
        let response = self.exchange(peer, request).await?;
        match response.payload {
            Payload::ContentResponse(r) => r
                .data
                .ok_or_else(|| SyncError::NotFound(content_id.clone())),
            Payload::Error(e) if e.code == ErrorCode::ContentNotAvailable => {
                Err(SyncError::AccessDenied(content_id.clone()))
            }
            other => Err(unexpected(MessageType::ContentResponse, other)),
        }
    }

    /// Publish `item` locally and push it to each of `peers`, waiting for their acks
    /// concurrently. Addressed peers are added to an allow-list `access`. Missing acks
    /// are reported in the result and as `ShareUnacknowledged`; nothing is retried.
    pub async fn share_content(
        &self,
        item: ContentItem,
        access: Access,
        peers: &[PeerId],
    ) -> ShareReport {
        let access = match access {
            Access::All => Access::All,
            Access::Peers(mut allowed) => {
                allowed.extend(peers.iter().cloned());
                Access::Peers(allowed)
            }
        };
        let share = DataShare {
            data_type: item.category.clone(),
            data: item.data.clone(),
            metadata: item.metadata.clone(),
            content_id: Some(item.id.clone()),
            created_at: Some(item.created_at),
        };
        let content_id = self.inner.store.publish(item, access);

        let deliveries = peers.iter().map(|peer| {
            let share = share.clone();
            async move { (peer.clone(), self.deliver_share(peer, share).await) }
        });
        let mut report = ShareReport {
            content_id: content_id.clone(),
            acked: Vec::new(),
            failed: Vec::new(),
        };
        for (peer, result) in join_all(deliveries).await {
            match result {
                Ok(()) => report.acked.push(peer),
                Err(e) => {
                    warn!(peer = %peer, content = %content_id, error = %e, "share not acknowledged");
                    self.emit(SyncEvent::ShareUnacknowledged {
                        peer: peer.clone(),
                        content_id: content_id.clone(),
                        reason: e.to_string(),
                    });
                    report.failed.push((peer, e));
                }
            }
        }
        report
    }

    async fn deliver_share(&self, peer: &PeerId, share: DataShare) -> SyncResult<()> {
        let response = self.exchange(peer, Payload::DataShare(share)).await?;
        match response.payload {
            Payload::DataAck(_) => Ok(()),
            other => Err(unexpected(MessageType::DataAck, other)),
        }
    }

    /// Pull every connected peer's feed once, each from its own cursor. Pulls run
    /// concurrently and a failing peer does not affect the others.
    pub async fn sync_once(&self) -> PullSummary {
        let peers = self.inner.transport.connected_peers().await;
        let limit = self.inner.config.default_feed_limit;
        let pulls = peers.iter().map(|peer| async move {
            let since = self.inner.sessions.feed_cursor(peer);
            (peer.clone(), self.request_feed(peer, since, limit).await)
        });
        let mut summary = PullSummary::default();
        for (peer, result) in join_all(pulls).await {
            match result {
                Ok(items) => summary.pulled.push((peer, items.len())),
                Err(e) => {
                    warn!(peer = %peer, error = %e, "feed pull failed");
                    self.emit(SyncEvent::PeerError {
                        peer: peer.clone(),
                        message: format!("feed pull failed: {}", e),
                    });
                    summary.failed.push((peer, e));
                }
            }
        }
        summary
    }

    /// Every `feed_pull_interval`: pull all connected peers, then sweep content older
    /// than `content_max_age`. The first round runs one interval after start.
    pub async fn run_sync_loop(self) {
        let period = self.inner.config.feed_pull_interval.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;
        loop {
            interval.tick().await;
            let summary = self.sync_once().await;
            debug!(
                pulled = summary.pulled.len(),
                failed = summary.failed.len(),
                "periodic feed pull done"
            );
            let max_age = i64::try_from(self.inner.config.content_max_age.as_millis())
                .unwrap_or(i64::MAX);
            let swept = self.inner.store.sweep(now_millis().saturating_sub(max_age));
            if swept.total() > 0 {
                info!(
                    local = swept.local,
                    received = swept.received,
                    feed_items = swept.feed_items,
                    "swept expired content"
                );
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        // Err only means nobody is subscribed.
        let _ = self.inner.events.send(event);
    }
}

fn unexpected(expected: MessageType, got: Payload) -> SyncError {
    match got {
        Payload::Error(ErrorPayload { code, message }) => SyncError::Remote { code, message },
        other => SyncError::UnexpectedResponse {
            expected,
            got: other.message_type(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHub;
    use serde_json::json;

    fn test_config() -> SyncConfig {
        SyncConfig {
            request_timeout: Duration::from_secs(2),
            feed_pull_interval: Duration::from_secs(3600),
            ..SyncConfig::default()
        }
    }

    fn manager(hub: &MemoryHub, name: &str) -> (NetworkManager, mpsc::UnboundedReceiver<TransportEvent>) {
        let (transport, rx) = hub.join(name);
        let mgr = NetworkManager::new(
            PeerId::new(name),
            Arc::new(transport),
            Arc::new(ContentStore::new()),
            test_config(),
        );
        (mgr, rx)
    }

    async fn next_reply(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> Message {
        loop {
            match rx.recv().await {
                Some(TransportEvent::Received(_, bytes)) => return wire::decode(&bytes).unwrap(),
                Some(_) => continue,
                None => panic!("transport closed"),
            }
        }
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong_echoing_id() {
        let hub = MemoryHub::new();
        let (b, _b_rx) = manager(&hub, "b");
        let (_remote, mut remote_rx) = hub.join("remote");
        let remote = PeerId::new("remote");
        b.on_peer_connected(&remote);
        let seen_before = b.session(&remote).unwrap().last_seen;
        let ping = Message::new(Payload::Ping(Empty {}));
        b.on_bytes(&remote, &wire::encode(&ping).unwrap()).await;
        let pong = next_reply(&mut remote_rx).await;
        assert_eq!(pong.id, ping.id);
        assert_eq!(pong.message_type(), MessageType::Pong);
        assert!(b.session(&remote).unwrap().last_seen >= seen_before);
    }

    #[tokio::test]
    async fn unknown_type_gets_error_reply() {
        let hub = MemoryHub::new();
        let (b, _b_rx) = manager(&hub, "b");
        let (_remote, mut remote_rx) = hub.join("remote");
        let mut events = b.subscribe();
        b.on_bytes(
            &PeerId::new("remote"),
            br#"{"id":"q1","type":"GOSSIP","payload":{}}"#,
        )
        .await;
        let reply = next_reply(&mut remote_rx).await;
        assert_eq!(reply.id, MessageId::from("q1"));
        assert!(matches!(
            reply.payload,
            Payload::Error(ErrorPayload { code: ErrorCode::UnknownMessageType, .. })
        ));
        loop {
            if let SyncEvent::ProtocolError { peer, .. } = events.recv().await.unwrap() {
                assert_eq!(peer, PeerId::new("remote"));
                break;
            }
        }
    }

    #[tokio::test]
    async fn garbage_is_dropped_without_reply() {
        let hub = MemoryHub::new();
        let (b, _b_rx) = manager(&hub, "b");
        let (_remote, mut remote_rx) = hub.join("remote");
        b.on_bytes(&PeerId::new("remote"), b"\x00\x01garbage").await;
        // Only the join notification is queued.
        assert!(matches!(
            remote_rx.try_recv(),
            Ok(TransportEvent::Connected(_))
        ));
        assert!(remote_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn data_share_is_ingested_and_acked() {
        let hub = MemoryHub::new();
        let (b, _b_rx) = manager(&hub, "b");
        let (_remote, mut remote_rx) = hub.join("remote");
        let mut events = b.subscribe();
        let share = Message::new(Payload::DataShare(DataShare {
            data_type: "mood".into(),
            data: json!({"score": 4}),
            metadata: Default::default(),
            content_id: Some(ContentId::new("mood-1")),
            created_at: Some(5),
        }));
        b.on_bytes(&PeerId::new("remote"), &wire::encode(&share).unwrap())
            .await;
        let ack = next_reply(&mut remote_rx).await;
        assert_eq!(ack.id, share.id);
        assert_eq!(
            ack.payload,
            Payload::DataAck(DataAck {
                message_id: share.id.clone()
            })
        );
        assert_eq!(b.store().received_from(&PeerId::new("remote")).len(), 1);
        assert_eq!(
            events.recv().await.unwrap(),
            SyncEvent::ContentReceived {
                peer: PeerId::new("remote"),
                content_id: ContentId::new("mood-1"),
            }
        );
    }

    #[tokio::test]
    async fn uncorrelated_error_becomes_peer_error_event() {
        let hub = MemoryHub::new();
        let (b, _b_rx) = manager(&hub, "b");
        let mut events = b.subscribe();
        let err = Message::new(Payload::error(ErrorCode::Internal, "boom"));
        b.on_bytes(&PeerId::new("c"), &wire::encode(&err).unwrap()).await;
        loop {
            if let SyncEvent::PeerError { peer, message } = events.recv().await.unwrap() {
                assert_eq!(peer, PeerId::new("c"));
                assert!(message.contains("boom"));
                break;
            }
        }
    }

    #[tokio::test]
    async fn send_failure_fails_only_that_exchange() {
        let hub = MemoryHub::new();
        let (a, _a_rx) = manager(&hub, "a");
        let nobody = PeerId::new("nobody");
        let err = a.ping(&nobody).await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
        assert_eq!(a.in_flight(), 0);
        assert!(a.session(&nobody).is_none());
        assert!(a.sessions().is_empty());
    }

    #[tokio::test]
    async fn late_chunk_does_not_revive_retired_session() {
        let hub = MemoryHub::new();
        let (a, _a_rx) = manager(&hub, "a");
        let (_b, _b_rx) = hub.join("b");
        let b = PeerId::new("b");
        let mut events = a.subscribe();

        a.on_peer_connected(&b);
        a.on_peer_disconnected(&b);
        let ping = Message::new(Payload::Ping(Empty {}));
        a.on_bytes(&b, &wire::encode(&ping).unwrap()).await;

        assert!(a.session(&b).is_none());
        assert_eq!(events.try_recv().unwrap(), SyncEvent::PeerConnected(b.clone()));
        assert_eq!(events.try_recv().unwrap(), SyncEvent::PeerDisconnected(b.clone()));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_abandons_pending_requests() {
        let hub = MemoryHub::new();
        let (a, _a_rx) = manager(&hub, "a");
        let (_b, _b_rx) = hub.join("b");
        let b = PeerId::new("b");
        a.on_peer_connected(&b);
        let waiter = {
            let a = a.clone();
            let b = b.clone();
            tokio::spawn(async move { a.ping(&b).await })
        };
        while a.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        a.on_peer_disconnected(&b);
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(SyncError::Disconnected(_))));
        assert!(a.session(&b).is_none());
    }
}
