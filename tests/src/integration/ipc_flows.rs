//! # IPC Flows
//!
//! The sandbox byte-stream protocol driven from both ends: the node attaches
//! a machine over an in-memory duplex stream and a scripted applet speaks
//! the frame codec on the other side.
//!
//! ## Flows Tested
//!
//! 1. **Frame sizes**: empty, tiny, around 1 KiB and the largest legal body
//! 2. **Oversized header**: rejected before any body byte is consumed
//! 3. **Fragmentation**: one byte at a time yields the same frames
//! 4. **runApplet**: member request → applet call → reply
//! 5. **Applet requests**: an applet writes a note on-chain as a machine;
//!    off-chain keys and the applet marker on the transport are refused
//! 6. **Events**: signals to a machine arrive as id 0 frames

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use node_runtime::PlatformContext;
    use px_02_signaler::CrossProcessCall;
    use px_05_sandbox_ipc::{
        encode_frame, Frame, FrameDecoder, FrameError, FrameWriter, Sandbox,
        DEFAULT_MAX_FRAME_BYTES, EVENT_ID,
    };
    use serde_json::{json, Value};
    use shared_types::UserId;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
    use tokio::sync::watch;
    use tokio::time::timeout;

    use crate::integration::fixtures::*;

    const MAX: usize = DEFAULT_MAX_FRAME_BYTES;

    /// The applet's end of an attached machine.
    struct Applet {
        reader: ReadHalf<DuplexStream>,
        writer: FrameWriter<WriteHalf<DuplexStream>>,
        decoder: FrameDecoder,
    }

    impl Applet {
        async fn next_frame(&mut self) -> Frame {
            let mut buf = vec![0u8; 8192];
            loop {
                if let Some(frame) = self.decoder.next_frame().unwrap() {
                    return frame;
                }
                let n = timeout(Duration::from_secs(5), self.reader.read(&mut buf))
                    .await
                    .expect("frame within deadline")
                    .unwrap();
                assert!(n > 0, "host closed the stream");
                self.decoder.feed(&buf[..n]);
            }
        }

        async fn send(&self, callback_id: u64, body: &[u8]) {
            self.writer.write_frame(callback_id, body).await.unwrap();
        }
    }

    fn attach(ctx: &PlatformContext, machine: &str) -> Applet {
        let (host, applet) = tokio::io::duplex(64 * 1024);
        let (host_rd, host_wr) = tokio::io::split(host);
        ctx.attach_machine(UserId::new(machine), host_rd, host_wr);

        let (reader, writer) = tokio::io::split(applet);
        Applet {
            reader,
            writer: FrameWriter::new(writer, MAX),
            decoder: FrameDecoder::new(MAX),
        }
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    fn decode_all(bytes: &[u8]) -> Vec<Frame> {
        let mut decoder = FrameDecoder::new(MAX);
        decoder.feed(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = decoder.next_frame().unwrap() {
            frames.push(frame);
        }
        assert_eq!(decoder.buffered_len(), 0);
        frames
    }

    // =========================================================================
    // FRAME SIZES
    // =========================================================================

    #[tokio::test]
    async fn test_body_sizes_round_trip_over_channel() {
        let ctx = node();
        let mut applet = attach(&ctx, "echo-bot");
        let machine = UserId::new("echo-bot");

        for size in [0usize, 1, 1023, 1024] {
            let body: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let call = ctx.sandbox.invoke(&machine, Bytes::from(body.clone()));
            let serve = async {
                let frame = applet.next_frame().await;
                assert_ne!(frame.callback_id, EVENT_ID);
                assert_eq!(frame.body.len(), size);
                applet.send(frame.callback_id, &frame.body).await;
            };
            let (reply, ()) = tokio::join!(call, serve);
            assert_eq!(reply.unwrap(), Bytes::from(body));
        }
    }

    #[test]
    fn test_largest_legal_body_round_trips() {
        let body = vec![0xA5u8; MAX - 8];
        let encoded = encode_frame(7, &body, MAX).unwrap();
        assert_eq!(&encoded[..4], &(MAX as u32).to_le_bytes());

        let frames = decode_all(&encoded);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].callback_id, 7);
        assert_eq!(frames[0].body.len(), MAX - 8);
    }

    #[test]
    fn test_one_byte_over_limit_refused_by_encoder() {
        let body = vec![0u8; MAX - 7];
        let err = encode_frame(7, &body, MAX).unwrap_err();
        assert!(matches!(
            err,
            FrameError::FrameTooLarge { got_bytes, .. } if got_bytes == MAX + 1
        ));
    }

    // =========================================================================
    // OVERSIZED HEADER
    // =========================================================================

    #[test]
    fn test_oversized_header_rejected_before_body() {
        let mut decoder = FrameDecoder::new(MAX);
        let mut bytes = ((MAX + 1) as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 16]);
        decoder.feed(&bytes);

        let err = decoder.next_frame().unwrap_err();
        assert!(matches!(
            err,
            FrameError::FrameTooLarge { max_frame_bytes, got_bytes }
                if max_frame_bytes == MAX && got_bytes == MAX + 1
        ));
        assert_eq!(decoder.buffered_len(), 16);
        assert!(decoder.is_failed());
        assert!(matches!(decoder.next_frame(), Err(FrameError::DecoderFailed)));
    }

    #[tokio::test]
    async fn test_oversized_frame_detaches_machine() {
        let ctx = node();
        let (host, mut applet) = tokio::io::duplex(1024);
        let (host_rd, host_wr) = tokio::io::split(host);
        let channel = ctx.attach_machine(UserId::new("rogue"), host_rd, host_wr);
        assert!(ctx.signaler.has_listener(&UserId::new("rogue")));

        applet
            .write_all(&((MAX + 1) as u32).to_le_bytes())
            .await
            .unwrap();

        timeout(Duration::from_secs(5), channel.closed())
            .await
            .expect("channel closes");
        eventually(|| !ctx.sandbox.is_attached(&UserId::new("rogue"))).await;
        assert!(!ctx.signaler.has_listener(&UserId::new("rogue")));
    }

    // =========================================================================
    // FRAGMENTATION
    // =========================================================================

    #[test]
    fn test_byte_at_a_time_matches_whole_buffer() {
        let mut stream = Vec::new();
        for (id, body) in [(0u64, &b""[..]), (1, &b"hello"[..]), (2, &[7u8; 300][..])] {
            stream.extend_from_slice(&encode_frame(id, body, MAX).unwrap());
        }
        let whole = decode_all(&stream);

        let mut decoder = FrameDecoder::new(MAX);
        let mut fragmented = Vec::new();
        for byte in &stream {
            decoder.feed(std::slice::from_ref(byte));
            while let Some(frame) = decoder.next_frame().unwrap() {
                fragmented.push(frame);
            }
        }

        assert_eq!(whole.len(), 3);
        assert_eq!(fragmented, whole);
        assert!(fragmented[0].is_event());
    }

    // =========================================================================
    // runApplet
    // =========================================================================

    #[tokio::test]
    async fn test_run_applet_round_trip() {
        let ctx = node();
        join_all(&ctx, "g1", &["u1"]);
        let mut applet = attach(&ctx, "bot");

        let request = signed(
            "runApplet",
            "u1",
            &json!({"machineId": "bot", "pointId": "g1", "type": "textMessage", "data": {"text": "hi"}}),
        );
        let call = ctx.handle(&request);
        let serve = async {
            let frame = applet.next_frame().await;
            let invocation: CrossProcessCall = serde_json::from_slice(&frame.body).unwrap();
            assert_eq!(invocation.key, "textMessage");
            assert_eq!(invocation.input.user_id, UserId::new("u1"));
            let data: Value = serde_json::from_str(&invocation.input.data).unwrap();
            let reply = json!({"type": "textMessage", "text": format!("echo {}", data["text"].as_str().unwrap())});
            applet.send(frame.callback_id, reply.to_string().as_bytes()).await;
        };
        let (response, ()) = tokio::join!(call, serve);

        let body = response_body(&response);
        assert_eq!(body["ok"], true);
        assert_eq!(body["result"], json!({"type": "textMessage", "text": "echo hi"}));
    }

    #[tokio::test]
    async fn test_run_applet_unknown_machine_is_not_found() {
        let ctx = node();
        join_all(&ctx, "g1", &["u1"]);

        let request = signed(
            "runApplet",
            "u1",
            &json!({"machineId": "ghost", "pointId": "g1", "type": "x"}),
        );
        let body = response_body(&ctx.handle(&request).await);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"]["code"], 4040);
    }

    // =========================================================================
    // APPLET REQUESTS
    // =========================================================================

    async fn applet_call(applet: &mut Applet, callback_id: u64, request: &Value) -> Value {
        applet.send(callback_id, request.to_string().as_bytes()).await;
        let reply = timeout(Duration::from_secs(5), applet.next_frame())
            .await
            .expect("applet reply within deadline");
        assert_eq!(reply.callback_id, callback_id);
        serde_json::from_slice(&reply.body).unwrap()
    }

    #[tokio::test]
    async fn test_applet_request_dispatched_as_machine() {
        let ctx = node();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = ctx.spawn_background(shutdown_rx);
        let mut applet = attach(&ctx, "bot");

        let request = json!({
            "key": "putNote",
            "input": {"noteId": "n1", "text": "from applet"}
        });
        let reply = applet_call(&mut applet, 1000, &request).await;
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["result"]["revision"], 1);

        let read = ctx
            .handle(&signed("getNote", "u1", &json!({"noteId": "n1"})))
            .await;
        let read = response_body(&read);
        assert_eq!(read["result"]["text"], "from applet");
        assert_eq!(read["result"]["author"], "bot");

        shutdown_tx.send(true).unwrap();
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_applet_off_chain_request_rejected() {
        let ctx = node();
        let mut u2 = session(&ctx, "u2");
        let mut applet = attach(&ctx, "bot");
        join_all(&ctx, "g1", &["bot", "u2"]);

        let request = json!({
            "key": "signalPoint",
            "input": {"type": "broadcast", "pointId": "g1", "data": "from applet"}
        });
        let reply = applet_call(&mut applet, 1001, &request).await;
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"]["code"], 4030);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(drain(&mut u2).is_empty());
    }

    #[tokio::test]
    async fn test_marker_over_transport_rejected() {
        let ctx = node();
        let _applet = attach(&ctx, "bot");
        join_all(&ctx, "g1", &["bot", "u1"]);

        for (key, body) in [
            ("putNote", json!({"noteId": "n1", "text": "forged"})),
            ("signalPoint", json!({"type": "broadcast", "pointId": "g1", "data": "x"})),
        ] {
            let packet = shared_types::OriginPacket::request(
                key,
                UserId::new("bot"),
                body.to_string().into_bytes(),
            )
            .with_signature("#appletsign");

            let body = response_body(&ctx.handle(&packet).await);
            assert_eq!(body["ok"], false);
            assert_eq!(body["error"]["code"], 4030, "{key}");
        }
        assert_eq!(ctx.callbacks.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_marker_from_non_machine_rejected() {
        let ctx = node();
        join_all(&ctx, "g1", &["u1"]);

        let packet = shared_types::OriginPacket::request(
            "signalPoint",
            UserId::new("u1"),
            json!({"type": "broadcast", "pointId": "g1", "data": "x"})
                .to_string()
                .into_bytes(),
        )
        .with_signature("#appletsign");

        let body = response_body(&ctx.handle(&packet).await);
        assert_eq!(body["error"]["code"], 4030);
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    #[tokio::test]
    async fn test_signal_to_machine_arrives_as_event_frame() {
        let ctx = node();
        let mut applet = attach(&ctx, "bot");

        let delivered = ctx
            .signaler
            .signal_user("notify", &UserId::new("bot"), &json!({"n": 1}))
            .unwrap();
        assert!(delivered);

        let frame = applet.next_frame().await;
        assert_eq!(frame.callback_id, EVENT_ID);
        let body: Value = serde_json::from_slice(&frame.body).unwrap();
        assert_eq!(body, json!({"n": 1}));
    }
}
