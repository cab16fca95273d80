// 바이트 → 프레임 → 서버 메시지 → 구독자 까지 소켓 없이 한 번에 검증

use std::sync::{Arc, Mutex};

use blive_chat::protocol::{decode, decode_message, encode_compressed, Frame, ProtocolVersion, ServerOperation};
use blive_chat::{BliveError, DecodedMessage, LiveEvent, LiveEvents, MatchKind};
use bytes::{BufMut, BytesMut};
use serde_json::{json, Value};

type Log = Arc<Mutex<Vec<String>>>;

fn push_frame(body: Value) -> Frame {
    Frame::new(ServerOperation::Push as u32, ProtocolVersion::Plain, body.to_string().into_bytes())
}

/// 수신 루프와 같은 순서로 처리. 디코딩 에러는 모아서 반환
fn feed(events: &LiveEvents, data: bytes::Bytes) -> Vec<BliveError> {
    let mut errors = Vec::new();
    for frame in decode(data) {
        match frame.and_then(|f| decode_message(&f)) {
            Ok(message) => {
                events.deliver(message);
            }
            Err(e) => errors.push(e),
        }
    }
    errors
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<LiveEvent>) -> Vec<LiveEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

#[test]
fn test_compressed_batch_dispatch_precedence() {
    let events = LiveEvents::new();
    let log: Log = Default::default();

    let l = Arc::clone(&log);
    events.on_command(["LIVE"], false, move |msg, kind| {
        l.lock().unwrap().push(format!("live:{}:{:?}", msg.cmd, kind));
        true
    });
    let l = Arc::clone(&log);
    events.on_any(move |msg| l.lock().unwrap().push(format!("any:{}", msg.cmd)));
    let l = Arc::clone(&log);
    events.on_other(move |msg| l.lock().unwrap().push(format!("other:{}", msg.cmd)));
    let l = Arc::clone(&log);
    events.on_raw(move |cmd, kind, _| l.lock().unwrap().push(format!("raw:{}:{:?}", cmd, kind)));

    let packed = encode_compressed(&[
        push_frame(json!({ "cmd": "LIVE" })),
        push_frame(json!({ "cmd": "WATCHED_CHANGE", "data": { "num": 12 } })),
    ])
    .unwrap();

    assert!(feed(&events, packed).is_empty());
    assert_eq!(*log.lock().unwrap(), vec![
        "live:LIVE:Exact",
        "any:LIVE",
        "raw:LIVE:Exact",
        "any:WATCHED_CHANGE",
        "other:WATCHED_CHANGE",
        "raw:WATCHED_CHANGE:Wildcard",
    ]);
}

#[test]
fn test_builtin_typed_events_do_not_claim() {
    let events = LiveEvents::new();
    let mut rx = events.subscribe();
    let others: Log = Default::default();
    let o = Arc::clone(&others);
    events.on_other(move |msg| o.lock().unwrap().push(msg.cmd.clone()));

    let mut buf = BytesMut::new();
    buf.put_slice(&push_frame(json!({
        "cmd": "SUPER_CHAT_MESSAGE",
        "data": {
            "id": 9, "message": "hi", "price": 30, "uid": 7,
            "user_info": { "uname": "carol", "guard_level": 0, "face": "http://f" }
        }
    })).encode());
    buf.put_slice(&push_frame(json!({
        "cmd": "USER_TOAST_MSG",
        "data": {
            "role_name": "舰长", "gift_id": 10003, "guard_level": 3, "price": 138000,
            "num": 1, "unit": "月", "uid": 8, "username": "dave"
        }
    })).encode());

    assert!(feed(&events, buf.freeze()).is_empty());
    assert_eq!(*others.lock().unwrap(), vec!["SUPER_CHAT_MESSAGE", "USER_TOAST_MSG"]);

    let got = drain(&mut rx);
    assert!(got.iter().any(|e| matches!(e, LiveEvent::SuperChat(sc) if sc.price == 30 && sc.uname == "carol")));
    assert!(got.iter().any(|e| matches!(e, LiveEvent::UserToast(t) if t.guard_level == 3 && t.username == "dave")));
    let classified: Vec<MatchKind> = got
        .iter()
        .filter_map(|e| match e {
            LiveEvent::Classified { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect();
    assert_eq!(classified, vec![MatchKind::Fallback, MatchKind::Fallback]);
}

#[test]
fn test_bad_frame_in_batch() {
    let events = LiveEvents::new();
    let seen: Log = Default::default();
    let s = Arc::clone(&seen);
    events.on_any(move |msg| s.lock().unwrap().push(msg.cmd.clone()));

    // op 5 인데 cmd 가 없음 → 해당 프레임만 에러, 다음 프레임은 정상
    let mut buf = BytesMut::new();
    buf.put_slice(&push_frame(json!({ "data": 1 })).encode());
    buf.put_slice(&push_frame(json!({ "cmd": "LIVE" })).encode());

    let errors = feed(&events, buf.freeze());
    assert_eq!(errors, vec![BliveError::MissingCmd]);
    assert_eq!(*seen.lock().unwrap(), vec!["LIVE"]);
}

#[test]
fn test_heartbeat_reply_two_byte_body() {
    let frame = Frame::new(ServerOperation::HeartbeatReply as u32, ProtocolVersion::PlainAlt, vec![0x01, 0x00]);
    match decode_message(&frame).unwrap() {
        DecodedMessage::HeartbeatReply { online, .. } => assert_eq!(online, 256),
        other => panic!("unexpected: {:?}", other),
    }

    let frame = Frame::new(ServerOperation::HeartbeatReply as u32, ProtocolVersion::PlainAlt, vec![0, 0, 1]);
    assert_eq!(decode_message(&frame).unwrap_err(), BliveError::InvalidBodyLength(3));
}
