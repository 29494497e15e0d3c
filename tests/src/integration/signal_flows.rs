//! # Signal Flows
//!
//! Group and single-subject delivery through the signaler, alone and behind
//! the `signalPoint` action.
//!
//! ## Flows Tested
//!
//! 1. **Exceptions**: excluded members never receive the signal
//! 2. **Snapshot semantics**: a join during delivery misses that call
//! 3. **Concurrent membership churn**: joins and signals race safely
//! 4. **Federation**: remote members are batched once per origin
//! 5. **Envelopes**: packed and raw payload shapes

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use parking_lot::Mutex;
    use px_02_signaler::{
        ChannelSink, FederationRelay, Listener, SignalEnvelope, SignalError, SignalMessage,
        SignalSink, Signaler,
    };
    use serde_json::{json, Value};
    use shared_types::{GroupId, UserId};
    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::integration::fixtures::*;

    fn listen(signaler: &Signaler, user: &str) -> UnboundedReceiver<SignalMessage> {
        let (sink, rx) = ChannelSink::pair(UserId::new(user));
        signaler.listen_single(Listener::new(UserId::new(user), sink));
        rx
    }

    fn group_of(signaler: &Signaler, group: &str, users: &[&str]) -> GroupId {
        let group = GroupId::new(group);
        for user in users {
            signaler.join_group(&group, UserId::new(*user));
        }
        group
    }

    // =========================================================================
    // EXCEPTIONS
    // =========================================================================

    #[test]
    fn test_exceptions_never_receive() {
        let signaler = Signaler::new("local");
        let mut rx1 = listen(&signaler, "u1");
        let mut rx2 = listen(&signaler, "u2");
        let mut rx3 = listen(&signaler, "u3");
        let g1 = group_of(&signaler, "g1", &["u1", "u2", "u3"]);

        let report = signaler
            .signal_group("k", &g1, &json!({"n": 1}), false, &[UserId::new("u3")])
            .unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(report.excepted, 1);
        assert_eq!(drain(&mut rx1).len(), 1);
        assert_eq!(drain(&mut rx2).len(), 1);
        assert!(drain(&mut rx3).is_empty());
    }

    #[test]
    fn test_offline_and_paused_members_counted() {
        let signaler = Signaler::new("local");
        let mut rx1 = listen(&signaler, "u1");
        let _rx2 = listen(&signaler, "u2");
        let g1 = group_of(&signaler, "g1", &["u1", "u2", "u3"]);
        assert!(signaler.pause_listener(&UserId::new("u2")));

        let report = signaler.signal_group("k", &g1, &json!(null), false, &[]).unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(report.paused, 1);
        assert_eq!(report.offline, 1);
        assert_eq!(drain(&mut rx1).len(), 1);
    }

    struct FailingSink;

    impl SignalSink for FailingSink {
        fn deliver(&self, _message: &SignalMessage) -> Result<(), SignalError> {
            Err(SignalError::DeliveryFailed("socket closed".into()))
        }
    }

    #[test]
    fn test_failing_member_does_not_block_others() {
        let signaler = Signaler::new("local");
        signaler.listen_single(Listener::new(UserId::new("u1"), Arc::new(FailingSink)));
        let mut rx2 = listen(&signaler, "u2");
        let g1 = group_of(&signaler, "g1", &["u1", "u2"]);

        let report = signaler.signal_group("k", &g1, &json!(1), false, &[]).unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(drain(&mut rx2).len(), 1);
    }

    // =========================================================================
    // SNAPSHOT SEMANTICS
    // =========================================================================

    /// Joins `late` to the group the first time it receives anything.
    struct JoiningSink {
        signaler: Mutex<Option<Arc<Signaler>>>,
        group: GroupId,
        late: UserId,
    }

    impl SignalSink for JoiningSink {
        fn deliver(&self, _message: &SignalMessage) -> Result<(), SignalError> {
            if let Some(signaler) = self.signaler.lock().take() {
                signaler.join_group(&self.group, self.late.clone());
            }
            Ok(())
        }
    }

    #[test]
    fn test_member_joining_during_delivery_misses_that_call() {
        let signaler = Arc::new(Signaler::new("local"));
        let g1 = group_of(&signaler, "g1", &["u1"]);
        let sink = Arc::new(JoiningSink {
            signaler: Mutex::new(Some(signaler.clone())),
            group: g1.clone(),
            late: UserId::new("u2"),
        });
        signaler.listen_single(Listener::new(UserId::new("u1"), sink));
        let mut late = listen(&signaler, "u2");

        let first = signaler.signal_group("k", &g1, &json!(1), false, &[]).unwrap();
        assert_eq!(first.delivered, 1);
        assert!(drain(&mut late).is_empty());
        assert!(signaler.is_member(&g1, &UserId::new("u2")));

        let second = signaler.signal_group("k", &g1, &json!(2), false, &[]).unwrap();
        assert_eq!(second.delivered, 2);
        assert_eq!(drain(&mut late).len(), 1);
    }

    #[tokio::test]
    async fn test_leave_stops_delivery_through_node() {
        let ctx = node();
        let mut u2 = session(&ctx, "u2");
        join_all(&ctx, "g1", &["u1", "u2"]);

        let hello = signed("textMessage", "u1", &json!({"text": "one"})).with_subject("g1");
        ctx.handle(&hello).await;
        assert_eq!(drain(&mut u2).len(), 1);

        assert!(ctx.leave(&GroupId::new("g1"), &UserId::new("u2")));
        let again = signed("textMessage", "u1", &json!({"text": "two"})).with_subject("g1");
        ctx.handle(&again).await;
        assert!(drain(&mut u2).is_empty());
    }

    // =========================================================================
    // CONCURRENT MEMBERSHIP CHURN
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_and_signals() {
        let signaler = Arc::new(Signaler::new("local"));
        let g1 = GroupId::new("g1");
        let mut receivers = Vec::new();
        for i in 0..64 {
            receivers.push(listen(&signaler, &format!("m{i}")));
        }

        let mut tasks = Vec::new();
        for i in 0..64 {
            let signaler = signaler.clone();
            let g1 = g1.clone();
            tasks.push(tokio::spawn(async move {
                signaler.join_group(&g1, UserId::new(format!("m{i}")));
                signaler
                    .signal_group("churn", &g1, &json!(i), false, &[])
                    .map(|report| report.delivered)
            }));
        }

        let mut total = 0;
        for task in tasks {
            let delivered = task.await.unwrap().unwrap();
            assert!(delivered >= 1 && delivered <= 64);
            total += delivered;
        }

        assert_eq!(signaler.members(&g1).len(), 64);
        let received: usize = receivers.iter_mut().map(|rx| drain(rx).len()).sum();
        assert_eq!(received, total);
    }

    // =========================================================================
    // FEDERATION
    // =========================================================================

    #[derive(Default)]
    struct RecordingRelay {
        users: Mutex<Vec<(String, String, UserId)>>,
        groups: Mutex<Vec<(String, GroupId, Vec<UserId>)>>,
    }

    impl FederationRelay for RecordingRelay {
        fn relay_to_user(
            &self,
            origin: &str,
            key: &str,
            user: &UserId,
            _payload: Bytes,
        ) -> Result<(), SignalError> {
            self.users
                .lock()
                .push((origin.to_string(), key.to_string(), user.clone()));
            Ok(())
        }

        fn relay_to_group(
            &self,
            origin: &str,
            _key: &str,
            group: &GroupId,
            _payload: Bytes,
            exceptions: &[UserId],
        ) -> Result<(), SignalError> {
            self.groups
                .lock()
                .push((origin.to_string(), group.clone(), exceptions.to_vec()));
            Ok(())
        }
    }

    #[test]
    fn test_remote_members_relayed_once_per_origin() {
        let relay = Arc::new(RecordingRelay::default());
        let signaler = Signaler::new("earth").with_federation(relay.clone());
        let mut local = listen(&signaler, "alice");
        let g1 = group_of(
            &signaler,
            "g1",
            &["alice", "bob@mars", "carol@mars", "dave@venus", "erin@earth"],
        );

        let report = signaler
            .signal_group("k", &g1, &json!("hi"), false, &[UserId::new("dave@venus")])
            .unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(report.excepted, 1);
        // erin@earth is local and has no listener.
        assert_eq!(report.offline, 1);
        assert_eq!(report.relayed, vec!["mars".to_string()]);
        assert_eq!(drain(&mut local).len(), 1);

        let groups = relay.groups.lock();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "mars");
        assert_eq!(groups[0].2, vec![UserId::new("dave@venus")]);
    }

    #[test]
    fn test_remote_user_signal_goes_to_relay() {
        let relay = Arc::new(RecordingRelay::default());
        let signaler = Signaler::new("earth").with_federation(relay.clone());

        let delivered = signaler
            .signal_user("dm", &UserId::new("bob@mars"), &json!({"x": 1}))
            .unwrap();

        assert!(delivered);
        let users = relay.users.lock();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0], ("mars".to_string(), "dm".to_string(), UserId::new("bob@mars")));
    }

    #[test]
    fn test_remote_user_without_relay_is_offline() {
        let signaler = Signaler::new("earth");
        let delivered = signaler
            .signal_user("dm", &UserId::new("bob@mars"), &json!(1))
            .unwrap();
        assert!(!delivered);
    }

    // =========================================================================
    // ENVELOPES
    // =========================================================================

    #[test]
    fn test_packed_signal_is_enveloped() {
        let signaler = Signaler::new("local");
        let mut rx = listen(&signaler, "u1");
        let g1 = group_of(&signaler, "g1", &["u1"]);

        signaler
            .signal_group("broadcast", &g1, &json!({"x": 1}), true, &[])
            .unwrap();

        let message = drain(&mut rx).remove(0);
        let envelope: SignalEnvelope = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(envelope.kind, "broadcast");
        assert_eq!(envelope.point.id, g1);
        assert_eq!(envelope.data, json!({"x": 1}));
        assert!(envelope.user.is_none());
    }

    #[test]
    fn test_raw_string_payload_sent_as_text() {
        let signaler = Signaler::new("local");
        let mut rx = listen(&signaler, "u1");
        let g1 = group_of(&signaler, "g1", &["u1"]);

        signaler
            .signal_group("raw", &g1, &json!("plain text"), false, &[])
            .unwrap();

        let message = drain(&mut rx).remove(0);
        assert_eq!(&message.payload[..], b"plain text");
    }

    #[tokio::test]
    async fn test_signal_point_broadcast_through_node() {
        let ctx = node();
        let mut u1 = session(&ctx, "u1");
        let mut u2 = session(&ctx, "u2");
        join_all(&ctx, "g1", &["u1", "u2"]);

        let body = json!({"type": "broadcast", "pointId": "g1", "data": "ping"});
        let response = ctx.handle(&signed("signalPoint", "u1", &body)).await;
        let response = response_body(&response);
        assert_eq!(response["ok"], true);
        assert_eq!(response["result"]["packet"]["id"], "g1:1");

        let received = drain(&mut u2);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].key, "points/signal");
        let envelope: SignalEnvelope = serde_json::from_slice(&received[0].payload).unwrap();
        assert_eq!(envelope.data["action"], "broadcast");
        assert_eq!(envelope.data["userId"], "u1");
        assert_eq!(envelope.data["packetId"], "g1:1");
        assert!(drain(&mut u1).is_empty());
    }

    #[tokio::test]
    async fn test_single_signal_to_non_member_is_not_found() {
        let ctx = node();
        join_all(&ctx, "g1", &["u1"]);

        let body = json!({"type": "single", "pointId": "g1", "userId": "u3", "data": "psst"});
        let response = ctx.handle(&signed("signalPoint", "u1", &body)).await;
        let response: Value = response_body(&response);

        assert_eq!(response["ok"], false);
        assert_eq!(response["error"]["code"], 4040);
    }

    #[tokio::test]
    async fn test_temp_single_signal_reaches_only_target() {
        let ctx = node();
        let mut u2 = session(&ctx, "u2");
        let mut u3 = session(&ctx, "u3");
        join_all(&ctx, "g1", &["u1", "u2", "u3"]);

        let body = json!({"type": "single", "pointId": "g1", "userId": "u2", "data": "psst", "temp": true});
        let response = response_body(&ctx.handle(&signed("signalPoint", "u1", &body)).await);
        assert_eq!(response["ok"], true);
        assert!(response["result"].get("packet").is_none());

        let received = drain(&mut u2);
        assert_eq!(received.len(), 1);
        let update: Value = serde_json::from_slice(&received[0].payload).unwrap();
        assert_eq!(update["isTemp"], true);
        assert_eq!(update["packetId"], Value::Null);
        assert!(drain(&mut u3).is_empty());
    }
}
