// blive-chat: 라이브 방송 채팅/이벤트 스트림 클라이언트
//
// 계층:
//   protocol : 16바이트 헤더 프레임 코덱, brotli 재귀 해제, protobuf 필드 추출
//   dispatch : cmd 기반 구독자 라우팅 (exact / wildcard / fallback / raw)
//   events   : 세션 이벤트 broadcast 버스 + 내장 typed 핸들러
//   session  : connect → auth → 수신/하트비트 → 정리 상태머신
//   resolver : 짧은 방 번호 → room_id / uid

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod protocol;
pub mod resolver;
pub mod session;

pub use dispatch::{CommandFilter, DispatchReport, Dispatcher, MatchKind};
pub use error::{BliveError, BliveResult, ErrorKind};
pub use events::{LiveEvent, LiveEvents};
pub use protocol::{DecodedMessage, Frame, PushMessage};
pub use resolver::{HttpRoomResolver, RoomInfo, RoomResolver, StaticResolver};
pub use session::{LiveSession, SessionOptions, SessionState};
