//! Controller Module Tests
//!
//! ## Test Scopes
//! - **Registration**: replies, notifications, id reuse and duplicate queues.
//! - **Relaying**: fan-out, correlation of engine replies and client errors.
//! - **Failure reconciliation**: unregistration and heart failure both clean up pending requests.
//! - **Scheduling & status**: task placement, connection and queue status.
//! - **Monitor channel**: pass-through bookkeeping.
//! - **Event loop**: end-to-end over an in-memory transport.

#[cfg(test)]
mod tests {
    use crate::config::ControllerSettings;
    use crate::controller::controller::Controller;
    use crate::controller::event_loop::EventLoop;
    use crate::controller::protocol::*;
    use crate::message::session::Session;
    use crate::message::types::{Identity, Message};
    use crate::registry::types::EngineId;
    use crate::scheduler::task::TaskScheduler;
    use crate::transport::memory::MemoryOutbound;
    use crate::transport::types::Channel;
    use serde_json::{Map, Value, json};
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};

    fn controller() -> Controller<MemoryOutbound> {
        controller_with(ControllerSettings::default())
    }

    fn controller_with(settings: ControllerSettings) -> Controller<MemoryOutbound> {
        Controller::with_scheduler(settings, MemoryOutbound::new(), TaskScheduler::with_seed(42))
    }

    fn client() -> Identity {
        Identity::new("client-1")
    }

    fn queue(name: &str) -> Identity {
        Identity::new(format!("queue-{name}"))
    }

    fn heart(name: &str) -> Identity {
        Identity::new(format!("heart-{name}"))
    }

    fn request(msg_type: &str, content: Value, subheader: Value) -> Message {
        let subheader: Map<String, Value> = match subheader {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Session::new("client").msg(msg_type, content, None, subheader)
    }

    fn send_frame(
        controller: &mut Controller<MemoryOutbound>,
        channel: Channel,
        from: &Identity,
        msg: &Message,
    ) {
        let payload = msg.pack().unwrap();
        controller.handle_frame(channel, from, &payload);
    }

    fn register(controller: &mut Controller<MemoryOutbound>, name: &str) -> EngineId {
        let msg = request(
            REGISTRATION_REQUEST,
            json!({"queue": queue(name), "heartbeat": heart(name)}),
            Value::Null,
        );
        send_frame(controller, Channel::Registration, &Identity::new(name), &msg);

        let replies = controller
            .outbound()
            .direct_to(Channel::Registration, &Identity::new(name));
        let reply: RegistrationReply =
            serde_json::from_value(replies.last().unwrap().content.clone()).unwrap();
        controller.outbound_mut().take();
        reply.id
    }

    fn relay(controller: &mut Controller<MemoryOutbound>, targets: Value) -> Message {
        let msg = request(
            RELAY_REQUEST,
            json!({"code": "a = 1"}),
            json!({"targets": targets, "submsg_type": "execute_request"}),
        );
        send_frame(controller, Channel::Client, &client(), &msg);
        msg
    }

    /// What the controller sent to an engine's queue, in order.
    fn queued(controller: &Controller<MemoryOutbound>, name: &str) -> Vec<Message> {
        controller
            .outbound()
            .direct_to(Channel::Queue, &queue(name))
            .into_iter()
            .cloned()
            .collect()
    }

    fn client_replies(controller: &Controller<MemoryOutbound>) -> Vec<Message> {
        controller
            .outbound()
            .direct_to(Channel::Client, &client())
            .into_iter()
            .cloned()
            .collect()
    }

    fn engine_reply(controller: &mut Controller<MemoryOutbound>, name: &str, to: &Message) {
        let reply = Session::new(name).reply(
            "execute_reply",
            json!({"status": "ok", "engine": name}),
            &to.header,
        );
        send_frame(controller, Channel::Queue, &queue(name), &reply);
    }

    fn error_content(msg: &Message) -> ErrorReply {
        assert_eq!(msg.msg_type(), ERROR);
        serde_json::from_value(msg.content.clone()).unwrap()
    }

    /// Ticks until every tracked heart that stays silent is declared dead.
    fn starve_hearts(controller: &mut Controller<MemoryOutbound>, max_misses: u32) {
        for _ in 0..=max_misses {
            controller.heartbeat_tick();
        }
    }

    // ============================================================
    // REGISTRATION TESTS
    // ============================================================

    #[test]
    fn test_registration_reply_and_notification() {
        // ARRANGE
        let mut controller = controller();
        let msg = request(
            REGISTRATION_REQUEST,
            json!({"queue": "queue-a", "heartbeat": "heart-a", "uuid": "u-a"}),
            Value::Null,
        );

        // ACT
        send_frame(&mut controller, Channel::Registration, &Identity::new("a"), &msg);

        // ASSERT
        let replies = controller
            .outbound()
            .direct_to(Channel::Registration, &Identity::new("a"));
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].msg_type(), REGISTRATION_REPLY);
        assert_eq!(replies[0].parent_id(), Some(msg.msg_id()));

        let reply: RegistrationReply = serde_json::from_value(replies[0].content.clone()).unwrap();
        assert_eq!(reply.status, "ok");
        assert_eq!(reply.id, EngineId(0));
        assert_eq!(reply.queue_addr, "127.0.0.1:10111");
        assert_eq!(reply.heartbeat_addr, "127.0.0.1:10102");

        let notices = controller.outbound().published(Channel::Notification);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].msg_type(), REGISTRATION_NOTIFICATION);
        assert_eq!(notices[0].content, json!({"id": 0, "queue": "queue-a"}));

        let engine = controller.registry().get(EngineId(0)).unwrap();
        assert_eq!(engine.uuid, "u-a");
        assert_eq!(controller.hearts().len(), 1);
    }

    #[test]
    fn test_registration_reuses_lowest_free_id() {
        let mut controller = controller();
        let a = register(&mut controller, "a");
        let b = register(&mut controller, "b");
        register(&mut controller, "c");

        controller.unregister_engine(b).unwrap();

        assert_eq!(a, EngineId(0));
        assert_eq!(register(&mut controller, "d"), EngineId(1));
        assert_eq!(register(&mut controller, "e"), EngineId(3));
    }

    #[test]
    fn test_duplicate_queue_registration_is_dropped() {
        let mut controller = controller();
        register(&mut controller, "a");

        let msg = request(REGISTRATION_REQUEST, json!({"queue": "queue-a"}), Value::Null);
        send_frame(&mut controller, Channel::Registration, &Identity::new("x"), &msg);

        assert_eq!(controller.registry().len(), 1);
        assert!(controller.outbound().sent.is_empty());
    }

    #[test]
    fn test_unregistration_request_publishes_notification() {
        let mut controller = controller();
        let id = register(&mut controller, "a");

        let msg = request(UNREGISTRATION_REQUEST, json!({"id": id}), Value::Null);
        send_frame(&mut controller, Channel::Registration, &Identity::new("a"), &msg);

        assert!(controller.registry().is_empty());
        assert!(controller.hearts().is_empty());
        let notices = controller.outbound().published(Channel::Notification);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].msg_type(), UNREGISTRATION_NOTIFICATION);
        assert_eq!(notices[0].content, json!({"id": 0}));
    }

    #[test]
    fn test_unregister_twice_reports_unknown_engine() {
        let mut controller = controller();
        let id = register(&mut controller, "a");

        controller.unregister_engine(id).unwrap();
        let second = controller.unregister_engine(id);

        assert!(second.is_err());
        assert_eq!(controller.outbound().published(Channel::Notification).len(), 1);
    }

    #[test]
    fn test_malformed_registration_is_dropped() {
        let mut controller = controller();

        controller.handle_frame(Channel::Registration, &Identity::new("a"), "not json");
        let msg = request(REGISTRATION_REQUEST, json!({"heartbeat": "h"}), Value::Null);
        send_frame(&mut controller, Channel::Registration, &Identity::new("a"), &msg);

        assert!(controller.registry().is_empty());
        assert!(controller.outbound().sent.is_empty());
    }

    // ============================================================
    // RELAY TESTS
    // ============================================================

    #[test]
    fn test_relay_to_all_fans_out_and_correlates_replies() {
        // ARRANGE
        let mut controller = controller();
        for name in ["a", "b", "c"] {
            register(&mut controller, name);
        }

        // ACT
        let original = relay(&mut controller, Value::Null);

        // ASSERT: one sub-request per engine, all parented on the client request
        let mut forwarded = Vec::new();
        for name in ["a", "b", "c"] {
            let sent = queued(&controller, name);
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].msg_type(), "execute_request");
            assert_eq!(sent[0].parent_id(), Some(original.msg_id()));
            assert_eq!(sent[0].content, json!({"code": "a = 1"}));
            forwarded.push((name, sent[0].clone()));
        }

        let replies = client_replies(&controller);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].msg_type(), RELAY_SUCCESS);
        assert_eq!(replies[0].parent_id(), Some(original.msg_id()));
        let success: RelaySuccess = serde_json::from_value(replies[0].content.clone()).unwrap();
        assert_eq!(success.relay_ids.len(), 3);
        assert_eq!(controller.pending().len(), 3);

        // ACT: every engine answers
        controller.outbound_mut().take();
        for (name, sent) in &forwarded {
            engine_reply(&mut controller, name, sent);
        }

        // ASSERT: three results, each correlated to the original request
        let results = client_replies(&controller);
        assert_eq!(results.len(), 3);
        for (result, (name, sent)) in results.iter().zip(&forwarded) {
            assert_eq!(result.msg_type(), RELAY_RESULT);
            assert_eq!(result.parent_id(), Some(original.msg_id()));
            assert_eq!(result.content["engine"], *name);
            assert_eq!(result.header.field("relay_id"), Some(&json!(sent.msg_id())));
            assert_eq!(result.header.field("reply_type"), Some(&json!("execute_reply")));
        }
        assert!(controller.pending().is_empty());
        assert!(controller.registry().iter().all(|e| e.pending.is_empty()));
    }

    #[test]
    fn test_relay_to_subset_only_reaches_targets() {
        let mut controller = controller();
        for name in ["a", "b", "c"] {
            register(&mut controller, name);
        }

        relay(&mut controller, json!([0, 2, 2]));

        assert_eq!(queued(&controller, "a").len(), 1);
        assert!(queued(&controller, "b").is_empty());
        assert_eq!(queued(&controller, "c").len(), 1);
        assert_eq!(controller.pending().len(), 2);
    }

    #[test]
    fn test_relay_to_unknown_engine_reports_targets() {
        let mut controller = controller();
        register(&mut controller, "a");

        let original = relay(&mut controller, json!([0, 5, 7]));

        assert!(queued(&controller, "a").is_empty());
        assert!(controller.pending().is_empty());

        let replies = client_replies(&controller);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].parent_id(), Some(original.msg_id()));
        let error = error_content(&replies[0]);
        assert_eq!(error.ename, "UnknownEngine");
        assert_eq!(error.targets, Some(vec![EngineId(5), EngineId(7)]));
    }

    #[test]
    fn test_relay_with_no_engines_is_an_error() {
        let mut controller = controller();

        relay(&mut controller, Value::Null);

        let replies = client_replies(&controller);
        assert_eq!(error_content(&replies[0]).ename, "NoEnginesRegistered");
    }

    #[test]
    fn test_relay_without_targets_is_malformed() {
        let mut controller = controller();
        register(&mut controller, "a");

        let msg = request(RELAY_REQUEST, json!({}), json!({"submsg_type": "execute_request"}));
        send_frame(&mut controller, Channel::Client, &client(), &msg);

        let replies = client_replies(&controller);
        assert_eq!(error_content(&replies[0]).ename, "MalformedMessage");
        assert!(queued(&controller, "a").is_empty());
    }

    #[test]
    fn test_unparseable_client_frame_gets_parentless_error() {
        let mut controller = controller();

        controller.handle_frame(Channel::Client, &client(), "{\"header\": 1}");

        let replies = client_replies(&controller);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].parent_header.is_none());
        assert_eq!(error_content(&replies[0]).ename, "MalformedMessage");
    }

    #[test]
    fn test_unknown_client_message_type() {
        let mut controller = controller();

        let msg = request("shutdown_request", json!({}), Value::Null);
        send_frame(&mut controller, Channel::Client, &client(), &msg);

        let replies = client_replies(&controller);
        assert_eq!(replies[0].parent_id(), Some(msg.msg_id()));
        let error = error_content(&replies[0]);
        assert_eq!(error.ename, "UnhandledMessageType");
        assert!(error.evalue.contains("shutdown_request"));
    }

    #[test]
    fn test_unroutable_engine_reply_is_dropped() {
        let mut controller = controller();
        register(&mut controller, "a");

        let stray = Session::new("a").msg(
            "execute_reply",
            json!({}),
            Some(&Session::new("x").header("execute_request")),
            Map::new(),
        );
        send_frame(&mut controller, Channel::Queue, &queue("a"), &stray);

        assert!(controller.outbound().sent.is_empty());
    }

    #[test]
    fn test_reply_with_bare_parent_msg_id_is_routed() {
        // ARRANGE
        let mut controller = controller();
        register(&mut controller, "a");
        let original = relay(&mut controller, json!(0));
        let relay_id = queued(&controller, "a")[0].msg_id().clone();
        controller.outbound_mut().take();

        // ACT: the engine echoes only the relay id in its parent header
        let frame = json!({
            "header": {"msg_id": "e1", "msg_type": "execute_reply"},
            "parent_header": {"msg_id": relay_id},
            "content": {"x": 2}
        })
        .to_string();
        controller.handle_frame(Channel::Queue, &queue("a"), &frame);

        // ASSERT
        assert!(controller.pending().is_empty());
        assert!(controller.registry().get(EngineId(0)).unwrap().pending.is_empty());

        let results = client_replies(&controller);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].msg_type(), RELAY_RESULT);
        assert_eq!(results[0].parent_id(), Some(original.msg_id()));
        assert_eq!(results[0].content, json!({"x": 2}));
    }

    #[test]
    fn test_reply_is_delivered_only_once() {
        let mut controller = controller();
        register(&mut controller, "a");
        relay(&mut controller, json!(0));
        let sent = queued(&controller, "a").remove(0);
        controller.outbound_mut().take();

        engine_reply(&mut controller, "a", &sent);
        engine_reply(&mut controller, "a", &sent);

        assert_eq!(client_replies(&controller).len(), 1);
    }

    // ============================================================
    // FAILURE RECONCILIATION TESTS
    // ============================================================

    #[test]
    fn test_heart_failure_notifies_waiting_client() {
        // ARRANGE
        let mut controller = controller();
        register(&mut controller, "a");
        register(&mut controller, "b");
        let original = relay(&mut controller, Value::Null);
        controller.outbound_mut().take();

        // ACT: "b" keeps answering, "a" never does
        for _ in 0..=3 {
            controller.heartbeat_tick();
            let beat = controller.hearts().current_beat();
            controller.handle_heartbeat(&heart("b"), beat);
        }

        // ASSERT
        assert!(controller.registry().lookup_by_queue_identity(&queue("a")).is_none());
        assert!(controller.registry().contains(EngineId(1)));
        assert_eq!(controller.pending().len(), 1);

        let replies = client_replies(&controller);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].parent_id(), Some(original.msg_id()));
        assert_eq!(error_content(&replies[0]).ename, ENGINE_FAILURE);

        let notices = controller.outbound().published(Channel::Notification);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].msg_type(), UNREGISTRATION_NOTIFICATION);
    }

    fn unregister_request(controller: &mut Controller<MemoryOutbound>, id: EngineId) {
        let msg = request(UNREGISTRATION_REQUEST, json!({"id": id}), Value::Null);
        send_frame(controller, Channel::Registration, &Identity::new("engine"), &msg);
    }

    #[test]
    fn test_unregistration_request_notifies_waiting_client() {
        // ARRANGE
        let mut controller = controller();
        let id = register(&mut controller, "a");
        let original = relay(&mut controller, json!(0));
        controller.outbound_mut().take();

        // ACT
        unregister_request(&mut controller, id);

        // ASSERT
        assert!(controller.pending().is_empty());
        assert!(controller.registry().is_empty());

        let replies = client_replies(&controller);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].parent_id(), Some(original.msg_id()));
        assert_eq!(error_content(&replies[0]).ename, ENGINE_FAILURE);
    }

    #[test]
    fn test_unregistration_request_drops_pending_silently_when_configured() {
        let mut controller = controller_with(ControllerSettings {
            notify_on_engine_failure: false,
            ..ControllerSettings::default()
        });
        let id = register(&mut controller, "a");
        relay(&mut controller, json!(0));
        controller.outbound_mut().take();

        unregister_request(&mut controller, id);

        assert!(controller.pending().is_empty());
        assert!(client_replies(&controller).is_empty());
        assert_eq!(controller.outbound().published(Channel::Notification).len(), 1);
    }

    #[test]
    fn test_heart_failure_drops_pending_silently_when_configured() {
        let mut controller = controller_with(ControllerSettings {
            notify_on_engine_failure: false,
            heartbeat_max_misses: 1,
            ..ControllerSettings::default()
        });
        register(&mut controller, "a");
        relay(&mut controller, json!(0));
        let sent = queued(&controller, "a").remove(0);
        controller.outbound_mut().take();

        starve_hearts(&mut controller, 1);

        assert!(controller.registry().is_empty());
        assert!(controller.pending().is_empty());
        assert!(client_replies(&controller).is_empty());

        // a late reply from the dead engine goes nowhere
        engine_reply(&mut controller, "a", &sent);
        assert!(client_replies(&controller).is_empty());
    }

    #[test]
    fn test_live_hearts_are_pinged_every_round() {
        let mut controller = controller();
        register(&mut controller, "a");

        controller.heartbeat_tick();
        controller.handle_heartbeat(&heart("a"), 1);
        controller.heartbeat_tick();

        let pings = controller.outbound().pings();
        assert_eq!(pings, vec![(&heart("a"), 1), (&heart("a"), 2)]);
        assert!(controller.registry().contains(EngineId(0)));
    }

    // ============================================================
    // SCHEDULING & STATUS TESTS
    // ============================================================

    #[test]
    fn test_task_request_goes_to_one_engine() {
        let mut controller = controller();
        register(&mut controller, "a");
        register(&mut controller, "b");

        let msg = request(TASK_REQUEST, json!({"f": "run"}), json!({"submsg_type": "apply_request"}));
        send_frame(&mut controller, Channel::Client, &client(), &msg);

        let replies = client_replies(&controller);
        assert_eq!(replies[0].msg_type(), TASK_SUCCESS);
        let success: TaskSuccess = serde_json::from_value(replies[0].content.clone()).unwrap();

        let engine = controller.registry().get(success.engine).unwrap();
        assert!(engine.pending.contains(&success.task_id));
        assert_eq!(controller.pending().len(), 1);
        assert_eq!(queued(&controller, "a").len() + queued(&controller, "b").len(), 1);
    }

    #[test]
    fn test_task_request_avoids_loaded_engine() {
        let mut controller = controller();
        register(&mut controller, "a");
        register(&mut controller, "b");
        for _ in 0..20 {
            relay(&mut controller, json!(0));
        }
        controller.outbound_mut().take();

        for _ in 0..10 {
            let msg = request(TASK_REQUEST, json!({}), json!({"submsg_type": "apply_request"}));
            send_frame(&mut controller, Channel::Client, &client(), &msg);
        }

        assert!(queued(&controller, "a").is_empty());
        assert_eq!(queued(&controller, "b").len(), 10);
    }

    #[test]
    fn test_task_request_with_no_engines() {
        let mut controller = controller();

        let msg = request(TASK_REQUEST, json!({}), json!({"submsg_type": "apply_request"}));
        send_frame(&mut controller, Channel::Client, &client(), &msg);

        assert_eq!(error_content(&client_replies(&controller)[0]).ename, "NoEnginesRegistered");
    }

    #[test]
    fn test_connection_request_lists_engines() {
        let mut controller = controller();
        register(&mut controller, "a");
        register(&mut controller, "b");

        let msg = request(CONNECTION_REQUEST, json!({}), Value::Null);
        send_frame(&mut controller, Channel::Client, &client(), &msg);

        let replies = client_replies(&controller);
        assert_eq!(replies[0].msg_type(), CONNECTION_REPLY);
        let reply: ConnectionReply = serde_json::from_value(replies[0].content.clone()).unwrap();
        assert_eq!(reply.notification, "127.0.0.1:10202");
        assert_eq!(reply.engines.len(), 2);
        assert_eq!(reply.engines[&EngineId(1)], queue("b"));
    }

    #[test]
    fn test_queue_status_counts_outstanding_requests() {
        let mut controller = controller();
        register(&mut controller, "a");
        register(&mut controller, "b");
        relay(&mut controller, json!(1));
        relay(&mut controller, json!(1));

        let msg = request(QUEUE_STATUS, json!({}), Value::Null);
        send_frame(&mut controller, Channel::Client, &client(), &msg);

        let reply = client_replies(&controller).pop().unwrap();
        assert_eq!(reply.msg_type(), QUEUE_STATUS_REPLY);
        assert_eq!(reply.content, json!({"0": {"queue": 0}, "1": {"queue": 2}}));
    }

    #[test]
    fn test_queue_status_with_no_engines_is_empty() {
        let mut controller = controller();

        let msg = request(QUEUE_STATUS, json!({}), Value::Null);
        send_frame(&mut controller, Channel::Client, &client(), &msg);

        let reply = client_replies(&controller).pop().unwrap();
        assert_eq!(reply.msg_type(), QUEUE_STATUS_REPLY);
        assert_eq!(reply.content, json!({}));
    }

    #[test]
    fn test_answer_engines_query() {
        let mut controller = controller();
        register(&mut controller, "a");

        let QueryReply::Engines(engines) = controller.answer(Query::Engines) else {
            panic!("expected engine list");
        };

        assert_eq!(engines.len(), 1);
        assert_eq!(engines[0].queue, queue("a"));
        assert_eq!(engines[0].heartbeat, Some(heart("a")));
        assert_eq!(engines[0].pending, 0);
    }

    // ============================================================
    // MONITOR CHANNEL TESTS
    // ============================================================

    fn monitor(controller: &mut Controller<MemoryOutbound>, direction: Direction, message: &Message) {
        let record = MonitorRecord {
            direction,
            client: client(),
            queue: queue("a"),
            message: message.clone(),
        };
        let payload = serde_json::to_string(&record).unwrap();
        controller.handle_frame(Channel::Monitor, &Identity::new("proxy"), &payload);
    }

    #[test]
    fn test_monitor_tracks_proxied_request_without_forwarding() {
        let mut controller = controller();
        register(&mut controller, "a");
        let proxied = request("execute_request", json!({}), Value::Null);

        monitor(&mut controller, Direction::In, &proxied);

        assert_eq!(controller.pending().len(), 1);
        let record = controller.pending().get(proxied.msg_id()).unwrap();
        assert!(!record.relayed);
        assert!(controller.registry().get(EngineId(0)).unwrap().pending.contains(proxied.msg_id()));

        let reply = Session::new("a").reply("execute_reply", json!({}), &proxied.header);
        monitor(&mut controller, Direction::Out, &reply);

        assert!(controller.pending().is_empty());
        assert!(controller.outbound().sent.is_empty());
    }

    #[test]
    fn test_monitor_record_for_unknown_queue_is_dropped() {
        let mut controller = controller();
        let proxied = request("execute_request", json!({}), Value::Null);

        monitor(&mut controller, Direction::In, &proxied);
        controller.handle_frame(Channel::Monitor, &Identity::new("proxy"), "garbage");

        assert!(controller.pending().is_empty());
    }

    // ============================================================
    // EVENT LOOP TESTS
    // ============================================================

    fn frame(channel: Channel, identity: &Identity, msg: &Message) -> Inbound {
        Inbound::Frame {
            channel,
            identity: identity.clone(),
            payload: msg.pack().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_event_loop_processes_events_in_order() {
        // ARRANGE
        let (tx, rx) = mpsc::unbounded_channel();
        let event_loop = EventLoop::new(
            controller(),
            rx,
            Duration::from_secs(3600),
            Duration::from_secs(3600),
        );
        let handle = tokio::spawn(event_loop.run(std::future::pending()));

        let registration = request(REGISTRATION_REQUEST, json!({"queue": "queue-a"}), Value::Null);
        tx.send(frame(Channel::Registration, &Identity::new("a"), &registration)).unwrap();
        let original = request(
            RELAY_REQUEST,
            json!({}),
            json!({"targets": 0, "submsg_type": "execute_request"}),
        );
        tx.send(frame(Channel::Client, &client(), &original)).unwrap();

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Inbound::Query(Query::QueueStatus, reply_tx)).unwrap();

        // ASSERT
        let QueryReply::QueueStatus(status) = reply_rx.await.unwrap() else {
            panic!("expected queue status");
        };
        assert_eq!(status[&EngineId(0)].queue, 1);

        // ACT: closing the channel stops the loop
        drop(tx);
        let controller = handle.await.unwrap();

        assert_eq!(controller.pending().len(), 1);
        assert_eq!(
            controller.outbound().direct_to(Channel::Queue, &queue("a")).len(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_loop_expires_silent_engine() {
        let (tx, rx) = mpsc::unbounded_channel();
        let settings = ControllerSettings {
            heartbeat_max_misses: 2,
            ..ControllerSettings::default()
        };
        let event_loop = EventLoop::new(
            controller_with(settings),
            rx,
            Duration::from_millis(100),
            Duration::from_secs(3600),
        );
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(event_loop.run(async move {
            let _ = stop_rx.await;
        }));

        let registration = request(
            REGISTRATION_REQUEST,
            json!({"queue": "queue-a", "heartbeat": "heart-a"}),
            Value::Null,
        );
        tx.send(frame(Channel::Registration, &Identity::new("a"), &registration)).unwrap();

        tokio::time::sleep(Duration::from_millis(1000)).await;
        stop_tx.send(()).unwrap();
        let controller = handle.await.unwrap();

        assert!(controller.registry().is_empty());
        assert!(controller.hearts().is_empty());
        assert!(!controller.outbound().pings().is_empty());
    }
}
