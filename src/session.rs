// LiveSession: 방 하나에 대한 WebSocket 생명주기
//
// 상태머신:
//   Idle → connect() → Connecting    (방 번호 조회, 소켓 연결)
//        → Authenticated             (AUTH 프레임 전송, 수신/하트비트 루프 시작)
//        → Streaming                 (AUTH_REPLY 수신)
//        → Closing                   (루프 종료: 요청 / 에러 / 서버 종료)
//        → Idle                      (room_id, uid, 취소 토큰, 소켓 정리)
//
// [동시성 원칙]
//   수신 루프와 하트비트 루프는 같은 CancellationToken 을 공유한다.
//   어느 한쪽이 끝나면 토큰을 cancel → 다른 쪽도 종료 → join 후 connect() 반환.
//   spawn 하지 않고 join! 으로 묶으므로 dispatch 는 세션당 항상 순차.
//   std::sync::MutexGuard 는 .await 를 넘기지 않는다 (상태 갱신만 짧게).

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config;
use crate::error::{BliveError, BliveResult, ErrorKind};
use crate::events::{LiveEvent, LiveEvents};
use crate::protocol::{self, auth_packet, decode_message, heartbeat_packet, DecodedMessage};
use crate::resolver::{HttpRoomResolver, RoomResolver};

type WsStream   = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSource   = SplitStream<WsStream>;
type SharedSink = Arc<tokio::sync::Mutex<SplitSink<WsStream, Message>>>;

// ----------------------------------------------------------------------------
// [설정]
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub ws_url:             String,
    pub heartbeat_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ws_url:             config::WS_HOST.to_string(),
            heartbeat_interval: Duration::from_millis(config::HEARTBEAT_INTERVAL_MS),
        }
    }
}

impl SessionOptions {
    /// 환경변수 BLIVE_WS_URL / BLIVE_HEARTBEAT_MS 가 있으면 기본값을 덮어쓴다
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(url) = std::env::var("BLIVE_WS_URL") {
            options.ws_url = url;
        }
        if let Some(interval) = std::env::var("BLIVE_HEARTBEAT_MS").ok().and_then(|v| parse_heartbeat_ms(&v)) {
            options.heartbeat_interval = interval;
        }
        options
    }

    /// 0 주기 하트비트는 tokio interval 이 받지 않는다
    pub fn validate(&self) -> BliveResult<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(BliveError::InvalidOptions("heartbeat_interval must be non-zero".into()));
        }
        Ok(())
    }
}

/// 양의 정수 ms 만 인정. 0 이나 숫자가 아니면 None (기본값 유지)
fn parse_heartbeat_ms(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

// ----------------------------------------------------------------------------
// [세션 상태]
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Authenticated,
    Streaming,
    Closing,
}

struct Inner {
    state:   SessionState,
    room_id: Option<u64>,
    uid:     Option<u64>,
    /// Some 이면 connect() 진행 중
    cancel:  Option<CancellationToken>,
    sink:    Option<SharedSink>,
}

impl Inner {
    fn idle() -> Self {
        Self { state: SessionState::Idle, room_id: None, uid: None, cancel: None, sink: None }
    }
}

pub struct LiveSession {
    events:   Arc<LiveEvents>,
    resolver: Arc<dyn RoomResolver>,
    options:  SessionOptions,
    inner:    Mutex<Inner>,
}

impl LiveSession {
    pub fn new() -> Self {
        Self::with_parts(LiveEvents::new(), Arc::new(HttpRoomResolver::new()), SessionOptions::from_env())
    }

    /// 여러 세션이 하나의 LiveEvents 를 공유할 수 있다
    pub fn with_parts(events: Arc<LiveEvents>, resolver: Arc<dyn RoomResolver>, options: SessionOptions) -> Self {
        Self { events, resolver, options, inner: Mutex::new(Inner::idle()) }
    }

    pub fn events(&self) -> &Arc<LiveEvents> {
        &self.events
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().unwrap().state
    }

    pub fn room_id(&self) -> Option<u64> {
        self.inner.lock().unwrap().room_id
    }

    pub fn uid(&self) -> Option<u64> {
        self.inner.lock().unwrap().uid
    }

    fn set_state(&self, state: SessionState) {
        let mut inner = self.inner.lock().unwrap();
        trace!("[session] {:?} -> {:?}", inner.state, state);
        inner.state = state;
    }

    /// 재진입 검사 + 취소 토큰 설치. 실패 시 기존 세션은 건드리지 않음
    fn begin(&self, parent: &CancellationToken) -> BliveResult<CancellationToken> {
        let mut inner = self.inner.lock().unwrap();
        if inner.cancel.is_some() {
            return Err(BliveError::AlreadyConnecting);
        }
        // 자식 토큰: 내부 루프 종료가 호출자의 토큰까지 취소하지 않도록
        let token = parent.child_token();
        inner.cancel = Some(token.clone());
        inner.state = SessionState::Connecting;
        Ok(token)
    }

    fn reset(&self) {
        *self.inner.lock().unwrap() = Inner::idle();
        debug!("[session] reset to idle");
    }

    // ------------------------------------------------------------------------
    // [공개 API]
    // ------------------------------------------------------------------------

    /// 방에 연결하고 세션이 끝날 때까지 수신/하트비트를 돌린다.
    ///
    /// - 요청에 의한 종료 (close / 취소) → Err(Cancelled) + Closed 이벤트
    /// - 소켓 에러 / 서버 종료 → Err(WebSocket | ConnectionClosed) + Error 이벤트
    /// - 방 번호 조회 실패 → Err(InvalidRoomId | Network), 소켓 미개방
    /// - 이미 연결 중 → 즉시 Err(AlreadyConnecting)
    /// - 잘못된 SessionOptions → 즉시 Err(InvalidOptions), 상태 변화 없음
    ///
    /// 어떤 경로로 끝나든 반환 시점에 state = Idle, room_id / uid = None.
    pub async fn connect(&self, short_room_id: u64) -> BliveResult<()> {
        self.connect_with_cancel(short_room_id, &CancellationToken::new()).await
    }

    /// connect() 와 같지만 외부 토큰 취소도 close() 와 똑같이 처리
    pub async fn connect_with_cancel(&self, short_room_id: u64, cancel: &CancellationToken) -> BliveResult<()> {
        self.options.validate()?;
        let cancel = self.begin(cancel)?;
        let _cleanup = scopeguard::guard((), |_| self.reset());

        let err = self.run(short_room_id, &cancel).await;
        self.set_state(SessionState::Closing);

        let sink = self.inner.lock().unwrap().sink.take();
        if let Some(sink) = sink {
            close_sink(&sink).await;
        }

        match err.kind() {
            ErrorKind::Cancelled => {
                info!("[session] closed by request");
                self.events.publish(LiveEvent::Closed { reason: err.to_string(), code: err.kind().code() });
            }
            ErrorKind::Transport => {
                error!("[session] closed by error: {}", err);
                self.events.publish(LiveEvent::Error { reason: err.to_string(), code: err.kind().code() });
            }
            _ => warn!("[session] connect failed: {}", err),
        }
        Err(err)
    }

    /// 취소 요청 + 소켓이 열려 있으면 close 핸드셰이크. 여러 번 불러도 안전
    pub async fn close(&self) {
        let (cancel, sink) = {
            let inner = self.inner.lock().unwrap();
            (inner.cancel.clone(), inner.sink.clone())
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(sink) = sink {
            close_sink(&sink).await;
        }
    }

    // ------------------------------------------------------------------------
    // [내부 단계]
    // ------------------------------------------------------------------------

    /// 세션이 끝난 이유를 반환
    async fn run(&self, short_room_id: u64, cancel: &CancellationToken) -> BliveError {
        let room = tokio::select! {
            biased;
            _ = cancel.cancelled() => return BliveError::Cancelled,
            r = self.resolver.resolve(short_room_id) => match r {
                Ok(room) => room,
                Err(e)   => return e,
            },
        };
        {
            let mut inner = self.inner.lock().unwrap();
            inner.room_id = Some(room.room_id);
            inner.uid = Some(room.uid);
        }
        info!("[session] room {} -> room_id={} uid={}", short_room_id, room.room_id, room.uid);

        let auth = match auth_packet(room.uid, room.room_id) {
            Ok(p)  => p,
            Err(e) => return e,
        };

        let ws = tokio::select! {
            biased;
            _ = cancel.cancelled() => return BliveError::Cancelled,
            r = connect_async(self.options.ws_url.as_str()) => match r {
                Ok((ws, _)) => ws,
                Err(e)      => return e.into(),
            },
        };
        let (sink, source) = ws.split();
        let sink: SharedSink = Arc::new(tokio::sync::Mutex::new(sink));
        self.inner.lock().unwrap().sink = Some(Arc::clone(&sink));

        if let Err(e) = send(&sink, auth, cancel).await {
            return e;
        }
        self.set_state(SessionState::Authenticated);
        debug!("[session] auth sent to {}", self.options.ws_url);

        join_loops(cancel, self.receive_loop(source, cancel), self.heartbeat_loop(&sink, cancel)).await
    }

    async fn receive_loop(&self, mut source: WsSource, cancel: &CancellationToken) -> BliveError {
        loop {
            let msg = tokio::select! {
                biased;
                _ = cancel.cancelled() => return BliveError::Cancelled,
                msg = source.next() => msg,
            };
            match msg {
                Some(Ok(Message::Binary(data))) => self.handle_message(data),
                Some(Ok(Message::Text(text))) => warn!("[session] unexpected text message: {}", text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    info!("[session] server closed: {:?}", frame);
                    return BliveError::ConnectionClosed;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return e.into(),
                None => return BliveError::ConnectionClosed,
            }
        }
    }

    /// WebSocket 메시지 1개 = 프레임 N개. 디코딩 에러는 보고만 하고 루프는 유지
    fn handle_message(&self, data: Bytes) {
        trace!("[session] message {} bytes", data.len());
        for frame in protocol::decode(data) {
            let decoded = match frame {
                Ok(f)  => decode_message(&f),
                // 코덱 에러: 이 메시지의 나머지는 FrameDecoder 가 버림
                Err(e) => Err(e),
            };
            match decoded {
                Ok(message) => {
                    if matches!(message, DecodedMessage::AuthReply { .. }) {
                        self.set_state(SessionState::Streaming);
                    }
                    self.events.deliver(message);
                }
                Err(e) => self.events.decode_error(e),
            }
        }
    }

    async fn heartbeat_loop(&self, sink: &SharedSink, cancel: &CancellationToken) -> BliveError {
        let packet = heartbeat_packet();
        let mut timer = tokio::time::interval(self.options.heartbeat_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return BliveError::Cancelled,
                _ = timer.tick() => {}
            }
            if let Err(e) = send(sink, packet.clone(), cancel).await {
                return e;
            }
            trace!("[session] heartbeat sent");
        }
    }
}

impl Default for LiveSession {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// [소켓 헬퍼]
// ----------------------------------------------------------------------------

/// 수신/하트비트 루프를 함께 돌린다. 먼저 끝난 쪽이 토큰을 cancel 해서 나머지도 멈춤.
/// 먼저 실패한 쪽의 에러가 원인, 나머지는 Cancelled
async fn join_loops<R, H>(cancel: &CancellationToken, recv: R, beat: H) -> BliveError
where
    R: Future<Output = BliveError>,
    H: Future<Output = BliveError>,
{
    let (recv_end, beat_end) = tokio::join!(
        async {
            let e = recv.await;
            cancel.cancel();
            e
        },
        async {
            let e = beat.await;
            cancel.cancel();
            e
        },
    );
    debug!("[session] loops ended: recv={} heartbeat={}", recv_end, beat_end);

    if !recv_end.is_cancelled() {
        recv_end
    } else {
        beat_end
    }
}

/// 취소되면 sink lock 을 바로 놓는다
async fn send(sink: &SharedSink, packet: Bytes, cancel: &CancellationToken) -> BliveResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BliveError::Cancelled),
        r = async { sink.lock().await.send(Message::Binary(packet)).await } => r.map_err(BliveError::from),
    }
}

async fn close_sink(sink: &SharedSink) {
    let closing = async { sink.lock().await.close().await };
    match tokio::time::timeout(Duration::from_millis(config::CLOSE_TIMEOUT_MS), closing).await {
        Ok(Ok(()))  => debug!("[session] close handshake sent"),
        Ok(Err(e))  => trace!("[session] close on dead socket: {}", e),
        Err(_)      => warn!("[session] close handshake timed out"),
    }
}
