//! Dispatch Core
//!
//! Owns the engine registry, the pending-request table and the heartbeat
//! monitor, and is the only thing that mutates them. Every inbound event is
//! handled to completion before the next one; sends go out through the
//! `Outbound` transport without waiting.

use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};

use super::protocol::*;
use crate::config::ControllerSettings;
use crate::error::{BrokerError, BrokerResult};
use crate::heartbeat::monitor::HeartMonitor;
use crate::message::session::Session;
use crate::message::types::{Header, Identity, Message, MsgId};
use crate::registry::engines::EngineRegistry;
use crate::registry::pending::PendingTable;
use crate::registry::types::{EngineId, PendingRequest, Targets};
use crate::scheduler::task::TaskScheduler;
use crate::transport::Outbound;
use crate::transport::types::Channel;

/// A message handler, looked up by message type.
pub type Handler<T> = fn(&mut Controller<T>, &Identity, &Message) -> BrokerResult<()>;

pub struct Controller<T: Outbound> {
    settings: ControllerSettings,
    session: Session,
    registry: EngineRegistry,
    pending: PendingTable,
    hearts: HeartMonitor,
    scheduler: TaskScheduler,
    outbound: T,
    registration_handlers: HashMap<&'static str, Handler<T>>,
    client_handlers: HashMap<&'static str, Handler<T>>,
}

impl<T: Outbound> Controller<T> {
    /// Creates a controller with an entropy-seeded task scheduler.
    ///
    /// # Arguments
    /// * `settings` - Advertised addresses and failure policy.
    /// * `outbound` - Transport every reply and notification goes through.
    pub fn new(settings: ControllerSettings, outbound: T) -> Self {
        Self::with_scheduler(settings, outbound, TaskScheduler::new())
    }

    /// Creates a controller with a caller-supplied scheduler, e.g. a seeded one.
    pub fn with_scheduler(settings: ControllerSettings, outbound: T, scheduler: TaskScheduler) -> Self {
        let mut registration_handlers: HashMap<&'static str, Handler<T>> = HashMap::new();
        registration_handlers.insert(REGISTRATION_REQUEST, Self::handle_registration_request);
        registration_handlers.insert(UNREGISTRATION_REQUEST, Self::handle_unregistration_request);

        let mut client_handlers: HashMap<&'static str, Handler<T>> = HashMap::new();
        client_handlers.insert(RELAY_REQUEST, Self::relay_request);
        client_handlers.insert(TASK_REQUEST, Self::task_request);
        client_handlers.insert(CONNECTION_REQUEST, Self::connection_request);
        client_handlers.insert(QUEUE_STATUS, Self::queue_status);

        tracing::info!("Controller created");

        Self {
            session: Session::new(settings.username.clone()),
            hearts: HeartMonitor::new(settings.heartbeat_max_misses),
            settings,
            registry: EngineRegistry::new(),
            pending: PendingTable::new(),
            scheduler,
            outbound,
            registration_handlers,
            client_handlers,
        }
    }

    /// Read-only view of the engine registry.
    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    /// Read-only view of the outstanding requests.
    pub fn pending(&self) -> &PendingTable {
        &self.pending
    }

    /// Read-only view of heartbeat state.
    pub fn hearts(&self) -> &HeartMonitor {
        &self.hearts
    }

    /// The transport the controller sends through.
    pub fn outbound(&self) -> &T {
        &self.outbound
    }

    /// Mutable access to the transport, e.g. to drain a recording one.
    pub fn outbound_mut(&mut self) -> &mut T {
        &mut self.outbound
    }

    // ============================================================
    // Event dispatch
    // ============================================================

    /// Handles one event from the loop. Never panics on bad input.
    pub fn handle(&mut self, event: Inbound) {
        match event {
            Inbound::Frame {
                channel,
                identity,
                payload,
            } => self.handle_frame(channel, &identity, &payload),
            Inbound::Heartbeat { heart, beat } => self.handle_heartbeat(&heart, beat),
            Inbound::Query(query, reply) => {
                if reply.send(self.answer(query)).is_err() {
                    tracing::debug!("Status query {:?} abandoned", query);
                }
            }
        }
    }

    /// Unpacks and dispatches one raw frame by the channel it arrived on.
    ///
    /// Frames from notification subscribers are ignored.
    pub fn handle_frame(&mut self, channel: Channel, identity: &Identity, payload: &str) {
        match channel {
            Channel::Registration => self.recv_registration(identity, payload),
            Channel::Client => self.recv_client(identity, payload),
            Channel::Queue => self.recv_engine(identity, payload),
            Channel::Monitor => self.recv_monitor(identity, payload),
            Channel::Notification => {
                tracing::debug!("Ignoring frame from notification subscriber {}", identity);
            }
        }
    }

    fn recv_registration(&mut self, identity: &Identity, payload: &str) {
        let msg = match Message::unpack(payload) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::error!("registration::bad message from {}: {}", identity, e);
                return;
            }
        };

        let result = match self.registration_handlers.get(msg.msg_type()).copied() {
            Some(handler) => handler(self, identity, &msg),
            None => Err(BrokerError::UnhandledMessageType(msg.msg_type().to_string())),
        };

        if let Err(e) = result {
            tracing::error!("registration::dropping message from {}: {}", identity, e);
        }
    }

    fn recv_client(&mut self, identity: &Identity, payload: &str) {
        let msg = match Message::unpack(payload) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::error!("client::bad message from {}: {}", identity, e);
                self.send_error(identity, &e, None);
                return;
            }
        };

        let result = match self.client_handlers.get(msg.msg_type()).copied() {
            Some(handler) => handler(self, identity, &msg),
            None => Err(BrokerError::UnhandledMessageType(msg.msg_type().to_string())),
        };

        if let Err(e) = result {
            tracing::warn!("client::{} from {} failed: {}", msg.msg_type(), identity, e);
            self.send_error(identity, &e, Some(&msg.header));
        }
    }

    fn recv_engine(&mut self, identity: &Identity, payload: &str) {
        let result = Message::unpack(payload)
            .and_then(|msg| self.handle_queue(Direction::Out, None, identity, &msg));

        if let Err(e) = result {
            tracing::warn!("engine::dropping message from {}: {}", identity, e);
        }
    }

    fn recv_monitor(&mut self, identity: &Identity, payload: &str) {
        let result = serde_json::from_str::<MonitorRecord>(payload)
            .map_err(|e| BrokerError::MalformedMessage(e.to_string()))
            .and_then(|record| {
                self.handle_queue(
                    record.direction,
                    Some(&record.client),
                    &record.queue,
                    &record.message,
                )
            });

        if let Err(e) = result {
            tracing::warn!("monitor::dropping record from {}: {}", identity, e);
        }
    }

    // ============================================================
    // Registration handlers
    // ============================================================

    fn handle_registration_request(&mut self, identity: &Identity, msg: &Message) -> BrokerResult<()> {
        let request: RegistrationRequest = parse_content(msg)?;
        let id = self.register_engine(request)?;

        let reply = RegistrationReply {
            status: "ok".to_string(),
            id,
            queue_addr: self.settings.queue_addr.clone(),
            heartbeat_addr: self.settings.heartbeat_addr.clone(),
            task_addr: Some(self.settings.queue_addr.clone()),
        };
        let reply = self.session.reply(REGISTRATION_REPLY, to_content(&reply), &msg.header);
        self.outbound.send(Channel::Registration, identity, &reply);

        Ok(())
    }

    fn handle_unregistration_request(&mut self, identity: &Identity, msg: &Message) -> BrokerResult<()> {
        let request: UnregistrationRequest = parse_content(msg)?;
        tracing::info!("registration::{} unregistering engine {}", identity, request.id);
        self.unregister_engine(request.id)
    }

    /// Registers an engine and starts watching its heart.
    pub fn register_engine(&mut self, request: RegistrationRequest) -> BrokerResult<EngineId> {
        if self.registry.lookup_by_queue_identity(&request.queue).is_some() {
            return Err(BrokerError::DuplicateQueue(request.queue));
        }
        if let Some(heart) = &request.heartbeat
            && self.registry.lookup_by_heartbeat_identity(heart).is_some()
        {
            return Err(BrokerError::MalformedMessage(format!(
                "heartbeat identity already registered: {heart}"
            )));
        }

        let uuid = request
            .uuid
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let id = self
            .registry
            .register(uuid, request.queue.clone(), request.heartbeat.clone());

        if let Some(heart) = request.heartbeat {
            self.hearts.track(heart);
        }

        let notice = RegistrationNotification {
            id,
            queue: request.queue,
        };
        let notice = self.session.msg(
            REGISTRATION_NOTIFICATION,
            to_content(&notice),
            None,
            Map::new(),
        );
        self.outbound.publish(Channel::Notification, &notice);

        Ok(id)
    }

    /// Removes an engine and reconciles the requests it still owed.
    ///
    /// Waiting clients get an `EngineFailure` error unless
    /// `notify_on_engine_failure` is off, in which case their requests are
    /// dropped silently.
    pub fn unregister_engine(&mut self, id: EngineId) -> BrokerResult<()> {
        let engine = self.registry.unregister(id)?;

        if let Some(heart) = &engine.heartbeat {
            self.hearts.untrack(heart);
        }

        let abandoned = self.pending.remove_all(engine.pending.iter());
        if !abandoned.is_empty() {
            tracing::warn!(
                "Engine {} left {} request(s) unanswered",
                id,
                abandoned.len()
            );
        }

        if self.settings.notify_on_engine_failure {
            for request in abandoned.iter().filter(|r| r.relayed) {
                let error = ErrorReply::new(
                    ENGINE_FAILURE,
                    format!("engine {} went away before replying to {}", id, request.request_id),
                );
                let reply = self
                    .session
                    .reply(ERROR, to_content(&error), &request.original_header);
                self.outbound.send(Channel::Client, &request.client, &reply);
            }
        }

        let notice = UnregistrationNotification { id };
        let notice = self.session.msg(
            UNREGISTRATION_NOTIFICATION,
            to_content(&notice),
            None,
            Map::new(),
        );
        self.outbound.publish(Channel::Notification, &notice);

        Ok(())
    }

    // ============================================================
    // Client handlers
    // ============================================================

    fn relay_request(&mut self, identity: &Identity, msg: &Message) -> BrokerResult<()> {
        let request = RelayRequest::from_header(&msg.header)?;
        let engines = self.registry.resolve_targets(&request.targets)?;

        let mut relay_ids = Vec::with_capacity(engines.len());
        for engine in engines {
            let relay_id = self.forward(engine, identity, msg, &request.submsg_type)?;
            relay_ids.push(relay_id);
        }

        tracing::info!(
            "client::relayed {} from {} as {} request(s)",
            msg.msg_id(),
            identity,
            relay_ids.len()
        );

        let reply = self.session.reply(
            RELAY_SUCCESS,
            to_content(&RelaySuccess { relay_ids }),
            &msg.header,
        );
        self.outbound.send(Channel::Client, identity, &reply);

        Ok(())
    }

    fn task_request(&mut self, identity: &Identity, msg: &Message) -> BrokerResult<()> {
        let request = TaskRequest::from_header(&msg.header)?;

        let loads = self.registry.loads();
        if loads.is_empty() {
            return Err(BrokerError::NoEnginesRegistered);
        }
        let engine = self
            .scheduler
            .pick(&loads)
            .map_err(|_| BrokerError::NoEnginesRegistered)?;

        let task_id = self.forward(engine, identity, msg, &request.submsg_type)?;

        tracing::info!("client::task {} scheduled on engine {}", msg.msg_id(), engine);

        let reply = self.session.reply(
            TASK_SUCCESS,
            to_content(&TaskSuccess { task_id, engine }),
            &msg.header,
        );
        self.outbound.send(Channel::Client, identity, &reply);

        Ok(())
    }

    fn connection_request(&mut self, identity: &Identity, msg: &Message) -> BrokerResult<()> {
        let engines: BTreeMap<EngineId, Identity> = self
            .registry
            .iter()
            .map(|engine| (engine.id, engine.queue.clone()))
            .collect();

        let reply = ConnectionReply {
            status: "ok".to_string(),
            queue: self.settings.queue_addr.clone(),
            task: Some(self.settings.queue_addr.clone()),
            notification: self.settings.notification_addr.clone(),
            engines,
        };
        let reply = self.session.reply(CONNECTION_REPLY, to_content(&reply), &msg.header);
        self.outbound.send(Channel::Client, identity, &reply);

        Ok(())
    }

    fn queue_status(&mut self, identity: &Identity, msg: &Message) -> BrokerResult<()> {
        let status = match status_targets(&msg.header)? {
            Targets::All => self.queue_status_for(&self.registry.ids()),
            targets => {
                let ids = self.registry.resolve_targets(&targets)?;
                self.queue_status_for(&ids)
            }
        };

        let reply = self.session.reply(QUEUE_STATUS_REPLY, to_content(&status), &msg.header);
        self.outbound.send(Channel::Client, identity, &reply);

        Ok(())
    }

    fn queue_status_for(&self, ids: &[EngineId]) -> BTreeMap<EngineId, QueueStatusEntry> {
        ids.iter()
            .filter_map(|id| self.registry.get(*id))
            .map(|engine| {
                (
                    engine.id,
                    QueueStatusEntry {
                        queue: engine.pending.len(),
                    },
                )
            })
            .collect()
    }

    /// Sends a sub-request for `msg` to one engine and records it as pending.
    fn forward(
        &mut self,
        engine: EngineId,
        client: &Identity,
        msg: &Message,
        submsg_type: &str,
    ) -> BrokerResult<MsgId> {
        let queue = self
            .registry
            .get(engine)
            .map(|e| e.queue.clone())
            .ok_or_else(|| BrokerError::UnknownEngine(vec![engine]))?;

        let outgoing = self
            .session
            .msg(submsg_type, msg.content.clone(), Some(&msg.header), Map::new());
        let relay_id = outgoing.msg_id().clone();

        self.track_request(PendingRequest {
            request_id: relay_id.clone(),
            client: client.clone(),
            original_header: msg.header.clone(),
            engine,
            relayed: true,
        })?;

        self.outbound.send(Channel::Queue, &queue, &outgoing);

        Ok(relay_id)
    }

    fn track_request(&mut self, request: PendingRequest) -> BrokerResult<()> {
        if !self.registry.contains(request.engine) {
            return Err(BrokerError::UnknownEngine(vec![request.engine]));
        }

        // same id seen twice; the older owner no longer owes it
        if let Some(previous) = self.pending.remove(&request.request_id) {
            self.registry
                .remove_pending(previous.engine, &previous.request_id);
            tracing::warn!("Request {} recorded twice", previous.request_id);
        }

        self.registry
            .add_pending(request.engine, request.request_id.clone())?;
        self.pending.insert(request);
        Ok(())
    }

    // ============================================================
    // Engine queue
    // ============================================================

    /// Handles traffic on an engine queue.
    ///
    /// `In` records a request passing through a proxy, `Out` completes a
    /// pending request. `client` is only known for proxied traffic.
    pub fn handle_queue(
        &mut self,
        direction: Direction,
        client: Option<&Identity>,
        queue: &Identity,
        msg: &Message,
    ) -> BrokerResult<()> {
        let engine = self
            .registry
            .lookup_by_queue_identity(queue)
            .ok_or_else(|| BrokerError::MalformedMessage(format!("invalid engine identity {queue}")))?;

        match direction {
            Direction::In => {
                let client = client.ok_or_else(|| {
                    BrokerError::MalformedMessage("proxied request without client".into())
                })?;
                self.track_request(PendingRequest {
                    request_id: msg.msg_id().clone(),
                    client: client.clone(),
                    original_header: msg.header.clone(),
                    engine,
                    relayed: false,
                })?;
                tracing::debug!(
                    "queue::{} from {} passing through to engine {}",
                    msg.msg_id(),
                    client,
                    engine
                );
                Ok(())
            }
            Direction::Out => self.complete_request(engine, msg),
        }
    }

    fn complete_request(&mut self, engine: EngineId, msg: &Message) -> BrokerResult<()> {
        let parent = msg
            .parent_id()
            .ok_or_else(|| BrokerError::MalformedMessage("reply without parent_header".into()))?;

        let request = self
            .pending
            .remove(parent)
            .ok_or_else(|| BrokerError::UnroutableReply(parent.clone()))?;
        self.registry.remove_pending(request.engine, parent);

        if request.engine != engine {
            tracing::warn!(
                "Reply to {} came from engine {} but was sent to engine {}",
                parent,
                engine,
                request.engine
            );
        }

        if !request.relayed {
            tracing::debug!("queue::proxied reply to {} completed", parent);
            return Ok(());
        }

        tracing::info!(
            "job {} succeeded on engine {}, relaying result to {}",
            request.original_header.msg_id,
            engine,
            request.client
        );

        let mut subheader = Map::new();
        subheader.insert("engine".to_string(), json!(engine));
        subheader.insert("relay_id".to_string(), json!(parent));
        subheader.insert("reply_type".to_string(), json!(msg.msg_type()));

        let result = self.session.msg(
            RELAY_RESULT,
            msg.content.clone(),
            Some(&request.original_header),
            subheader,
        );
        self.outbound.send(Channel::Client, &request.client, &result);

        Ok(())
    }

    // ============================================================
    // Heartbeats
    // ============================================================

    /// Records a heart's answer for round `beat`.
    pub fn handle_heartbeat(&mut self, heart: &Identity, beat: u64) {
        self.hearts.beat(heart, beat);
    }

    /// Closes the current heartbeat round: unregisters engines whose hearts
    /// died and pings the rest.
    pub fn heartbeat_tick(&mut self) {
        let tick = self.hearts.tick();

        for heart in &tick.failed {
            self.handle_heart_failure(heart);
        }

        for heart in &tick.pings {
            self.outbound.ping(heart, tick.beat);
        }
    }

    /// Unregisters the engine behind a dead heart.
    pub fn handle_heart_failure(&mut self, heart: &Identity) {
        match self.registry.lookup_by_heartbeat_identity(heart) {
            Some(id) => {
                tracing::warn!("heartbeat::engine {} failed", id);
                if let Err(e) = self.unregister_engine(id) {
                    tracing::error!("heartbeat::failed to unregister engine {}: {}", id, e);
                }
            }
            None => {
                tracing::info!("heartbeat::ignoring heart failure {}", heart);
                self.hearts.untrack(heart);
            }
        }
    }

    // ============================================================
    // Status
    // ============================================================

    /// Answers a status query from the current state.
    pub fn answer(&self, query: Query) -> QueryReply {
        match query {
            Query::Engines => QueryReply::Engines(
                self.registry
                    .iter()
                    .map(|engine| EngineSummary {
                        id: engine.id,
                        uuid: engine.uuid.clone(),
                        queue: engine.queue.clone(),
                        heartbeat: engine.heartbeat.clone(),
                        state: engine
                            .heartbeat
                            .as_ref()
                            .and_then(|heart| self.hearts.state(heart)),
                        pending: engine.pending.len(),
                    })
                    .collect(),
            ),
            Query::QueueStatus => QueryReply::QueueStatus(self.queue_status_for(&self.registry.ids())),
        }
    }

    /// Logs engine and outstanding request counts.
    pub fn log_stats(&self) {
        tracing::info!(
            "Controller stats: {} engine(s), {} outstanding request(s), heartbeat round {}",
            self.registry.len(),
            self.pending.len(),
            self.hearts.current_beat()
        );
        for engine in self.registry.iter() {
            tracing::debug!(
                "  - engine {} queue={} pending={}",
                engine.id,
                engine.queue,
                engine.pending.len()
            );
        }
    }

    fn send_error(&mut self, identity: &Identity, error: &BrokerError, parent: Option<&Header>) {
        let content = to_content(&ErrorReply::from(error));
        let reply = self.session.msg(ERROR, content, parent, Map::new());
        self.outbound.send(Channel::Client, identity, &reply);
    }
}

fn to_content<S: Serialize>(value: &S) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::error!("Failed to encode content: {}", e);
        Value::Null
    })
}
