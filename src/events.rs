// LiveEvents: 세션이 내보내는 모든 이벤트의 관찰 버스
//
// 구조:
//   LiveSession (수신 루프)
//       └── LiveEvents::deliver(decoded)
//               ├── AuthReply / HeartbeatReply → publish
//               └── Push → publish(Push)          (분류 전)
//                        └── Dispatcher::dispatch
//                                ├── 내장 typed 구독자 → publish(DanmuMsg / SendGift ...)
//                                ├── 앱이 등록한 typed / raw 구독자
//                                └── 내장 raw 구독자   → publish(Classified)  (분류 후)
//
// 내장 typed 구독자는 모두 ignore_hit: 앱의 Fallback 구독자에게서 cmd 를 가로채지 않는다.
// 구독자가 없을 때 publish 는 그냥 drop, 느린 구독자는 Lagged 를 받는다.
// 여러 세션이 하나의 LiveEvents 를 공유해도 된다 (등록 목록은 읽기 전용으로 공유).

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::config;
use crate::dispatch::typed::{CMD_DANMU_MSG, CMD_ENTER_ROOM, CMD_SEND_GIFT, CMD_SUPER_CHAT, CMD_USER_TOAST};
use crate::dispatch::{
    CommandFilter, DanmuMsg, DispatchReport, Dispatcher, EnterRoom, MatchKind, SendGift, SuperChat, UserToast,
};
use crate::error::{BliveError, BliveResult};
use crate::protocol::{DecodedMessage, PushMessage};

// ----------------------------------------------------------------------------
// [LiveEvent]
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum LiveEvent {
    AuthReply { body: Value, raw: Bytes },
    HeartbeatReply { online: i32, raw: Bytes },
    /// 모든 Push (분류 전)
    Push(PushMessage),
    /// 모든 Push (분류 후): raw 계층과 같은 분류
    Classified { cmd: String, kind: MatchKind, body: Value },

    DanmuMsg(DanmuMsg),
    EnterRoom(EnterRoom),
    SendGift(SendGift),
    SuperChat(SuperChat),
    UserToast(UserToast),

    /// 요청에 의한 종료 (code 0)
    Closed { reason: String, code: i32 },
    /// 소켓 이상 종료 (code -1)
    Error { reason: String, code: i32 },
    /// 메시지 1개 디코딩 실패. 세션은 계속 동작
    DecodeError { message: String, error: BliveError },
}

// ----------------------------------------------------------------------------
// [LiveEvents]
// ----------------------------------------------------------------------------

pub struct LiveEvents {
    tx:         broadcast::Sender<LiveEvent>,
    dispatcher: Dispatcher,
}

impl LiveEvents {
    pub fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(config::EVENT_BUS_CAPACITY);
        let dispatcher = Dispatcher::new();
        register_builtin(&dispatcher, &tx);
        Arc::new(Self { tx, dispatcher })
    }

    /// 이벤트 publish: 구독자가 없으면 조용히 무시
    pub fn publish(&self, event: LiveEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.tx.subscribe()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// 지정 cmd 구독. handler 반환값 = hit 여부
    pub fn on_command<I, S, F>(&self, cmds: I, ignore_hit: bool, handler: F)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&PushMessage, MatchKind) -> bool + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(CommandFilter::any_of(cmds), ignore_hit, handler);
    }

    /// 모든 cmd
    pub fn on_any<F>(&self, handler: F)
    where
        F: Fn(&PushMessage) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(CommandFilter::Wildcard, false, move |msg, _| {
            handler(msg);
            true
        });
    }

    /// 아무도 claim 하지 않은 cmd
    pub fn on_other<F>(&self, handler: F)
    where
        F: Fn(&PushMessage) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(CommandFilter::Fallback, false, move |msg, _| {
            handler(msg);
            true
        });
    }

    /// 필터 없는 raw 구독: cmd 와 분류를 함께 받는다
    pub fn on_raw<F>(&self, handler: F)
    where
        F: Fn(&str, MatchKind, &PushMessage) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe_raw(handler);
    }

    /// 디코딩된 서버 메시지 1개 전달. Push 면 dispatch 결과 반환
    pub fn deliver(&self, message: DecodedMessage) -> Option<DispatchReport> {
        match message {
            DecodedMessage::AuthReply { body, raw } => {
                trace!("[events] auth reply {}", body);
                self.publish(LiveEvent::AuthReply { body, raw });
                None
            }
            DecodedMessage::HeartbeatReply { online, raw } => {
                trace!("[events] heartbeat reply online={}", online);
                self.publish(LiveEvent::HeartbeatReply { online, raw });
                None
            }
            DecodedMessage::Push(push) => {
                self.publish(LiveEvent::Push(push.clone()));
                Some(self.dispatcher.dispatch(&push))
            }
        }
    }

    pub fn decode_error(&self, error: BliveError) {
        warn!("[events] decode error: {}", error);
        self.publish(LiveEvent::DecodeError { message: error.to_string(), error });
    }
}

// ----------------------------------------------------------------------------
// [내장 구독자]
// ----------------------------------------------------------------------------

/// typed 이벤트 생성 결과를 버스로. 생성 실패는 DecodeError 로 보고하고 hit 아님
fn emit(tx: &broadcast::Sender<LiveEvent>, built: BliveResult<Option<LiveEvent>>) -> bool {
    match built {
        Ok(Some(event)) => {
            let _ = tx.send(event);
            true
        }
        Ok(None) => false,
        Err(error) => {
            warn!("[events] typed event build failed: {}", error);
            let _ = tx.send(LiveEvent::DecodeError { message: error.to_string(), error });
            false
        }
    }
}

fn register_builtin(dispatcher: &Dispatcher, tx: &broadcast::Sender<LiveEvent>) {
    let t = tx.clone();
    dispatcher.subscribe(CommandFilter::exact(CMD_DANMU_MSG), true, move |msg, _| {
        emit(&t, DanmuMsg::from_push(msg).map(|e| Some(LiveEvent::DanmuMsg(e))))
    });

    let t = tx.clone();
    dispatcher.subscribe(CommandFilter::exact(CMD_ENTER_ROOM), true, move |msg, _| {
        emit(&t, EnterRoom::from_push(msg).map(|e| e.map(LiveEvent::EnterRoom)))
    });

    let t = tx.clone();
    dispatcher.subscribe(CommandFilter::exact(CMD_SEND_GIFT), true, move |msg, _| {
        emit(&t, SendGift::from_push(msg).map(|e| Some(LiveEvent::SendGift(e))))
    });

    let t = tx.clone();
    dispatcher.subscribe(CommandFilter::exact(CMD_SUPER_CHAT), true, move |msg, _| {
        emit(&t, SuperChat::from_push(msg).map(|e| Some(LiveEvent::SuperChat(e))))
    });

    let t = tx.clone();
    dispatcher.subscribe(CommandFilter::exact(CMD_USER_TOAST), true, move |msg, _| {
        emit(&t, UserToast::from_push(msg).map(|e| Some(LiveEvent::UserToast(e))))
    });

    let t = tx.clone();
    dispatcher.subscribe_raw(move |cmd, kind, msg| {
        let _ = t.send(LiveEvent::Classified {
            cmd:  cmd.to_string(),
            kind,
            body: msg.body.clone(),
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn push(body: Value) -> DecodedMessage {
        DecodedMessage::Push(PushMessage {
            cmd: body["cmd"].as_str().unwrap().to_string(),
            raw: Bytes::from(body.to_string()),
            body,
        })
    }

    fn drain(rx: &mut broadcast::Receiver<LiveEvent>) -> Vec<LiveEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn publish_without_subscriber_no_panic() {
        let events = LiveEvents::new();
        events.publish(LiveEvent::Closed { reason: "test".into(), code: 0 });
    }

    #[test]
    fn builtin_subscribers_registered() {
        let events = LiveEvents::new();
        assert_eq!(events.dispatcher().count(), (5, 1));
    }

    #[test]
    fn danmu_push_emits_pre_typed_and_classified() {
        let events = LiveEvents::new();
        let mut rx = events.subscribe();

        let report = events.deliver(push(json!({
            "cmd": "DANMU_MSG",
            "info": [[0], "hello", [10, "alice"], [], [], [], [], 0]
        }))).unwrap();
        // 내장 구독자는 ignore_hit
        assert!(!report.claimed);

        let got = drain(&mut rx);
        assert_eq!(got.len(), 3);
        assert!(matches!(&got[0], LiveEvent::Push(p) if p.cmd == "DANMU_MSG"));
        assert!(matches!(&got[1], LiveEvent::DanmuMsg(d) if d.text == "hello" && d.uid == 10));
        assert!(matches!(&got[2], LiveEvent::Classified { kind: MatchKind::Fallback, .. }));
    }

    #[test]
    fn builtin_does_not_steal_from_other_listener() {
        let events = LiveEvents::new();
        let seen: Arc<Mutex<Vec<String>>> = Default::default();
        let seen2 = Arc::clone(&seen);
        events.on_other(move |msg| seen2.lock().unwrap().push(msg.cmd.clone()));

        events.deliver(push(json!({
            "cmd": "SEND_GIFT",
            "data": { "giftId": 1, "giftName": "辣条", "num": 1, "uid": 2, "uname": "bob" }
        })));
        events.deliver(push(json!({ "cmd": "LIVE" })));

        assert_eq!(*seen.lock().unwrap(), vec!["SEND_GIFT", "LIVE"]);
    }

    #[test]
    fn app_exact_subscriber_claims() {
        let events = LiveEvents::new();
        let mut rx = events.subscribe();
        events.on_command(["LIVE", "PREPARING"], false, |_, _| true);
        let others: Arc<Mutex<usize>> = Default::default();
        let others2 = Arc::clone(&others);
        events.on_other(move |_| *others2.lock().unwrap() += 1);

        let report = events.deliver(push(json!({ "cmd": "PREPARING" }))).unwrap();
        assert!(report.claimed);
        assert_eq!(*others.lock().unwrap(), 0);
        let got = drain(&mut rx);
        assert!(matches!(got.last(), Some(LiveEvent::Classified { kind: MatchKind::Exact, .. })));
    }

    #[test]
    fn broken_typed_payload_reports_decode_error() {
        let events = LiveEvents::new();
        let mut rx = events.subscribe();
        events.deliver(push(json!({ "cmd": "SUPER_CHAT_MESSAGE" })));

        let got = drain(&mut rx);
        assert!(got.iter().any(|e| matches!(e, LiveEvent::DecodeError { error: BliveError::InvalidPayload(_), .. })));
        assert!(!got.iter().any(|e| matches!(e, LiveEvent::SuperChat(_))));
    }

    #[test]
    fn interact_word_follow_emits_no_enter() {
        let events = LiveEvents::new();
        let mut rx = events.subscribe();
        events.deliver(push(json!({ "cmd": "INTERACT_WORD", "data": { "uid": 1, "msg_type": 2 } })));
        let got = drain(&mut rx);
        assert!(!got.iter().any(|e| matches!(e, LiveEvent::EnterRoom(_))));
        assert_eq!(got.len(), 2);
    }

    #[tokio::test]
    async fn heartbeat_reply_reaches_subscriber() {
        let events = LiveEvents::new();
        let mut rx = events.subscribe();
        events.deliver(DecodedMessage::HeartbeatReply { online: 42, raw: Bytes::from_static(&[0, 0, 0, 42]) });
        match rx.recv().await.unwrap() {
            LiveEvent::HeartbeatReply { online, .. } => assert_eq!(online, 42),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
