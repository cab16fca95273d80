// 매직 넘버를 배제하고 프로토콜 상수와 클라이언트 한계를 모아둔 모듈입니다.

use crate::protocol::ProtocolVersion;

/// 弹幕 WebSocket 엔드포인트
pub const WS_HOST: &str = "wss://broadcastlv.chat.bilibili.com/sub";

/// 짧은 방 번호 → 실제 room_id / 방장 uid 조회 API
pub const ROOM_INFO_URL: &str = "https://api.live.bilibili.com/xlive/web-room/v1/index/getRoomBaseInfo";

/// 하트비트 송신 주기 (20초)
pub const HEARTBEAT_INTERVAL_MS: u64 = 20_000;

// ----------------------------------------------------------------------------
// 프레임 헤더
// ----------------------------------------------------------------------------

/// 고정 헤더 길이. 이 값이 아닌 헤더는 거부
pub const HEADER_LEN: u16 = 16;

/// 클라이언트가 보내는 프레임의 sequence (항상 1)
pub const FRAME_SEQUENCE: u32 = 1;

/// 클라이언트가 보내는 프레임의 protocol version (평문)
pub const CLIENT_PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion::PlainAlt;

// ----------------------------------------------------------------------------
// 인증 패킷 (op 7)
// ----------------------------------------------------------------------------

/// 서버에 요청하는 압축 방식: 3 = brotli
pub const AUTH_PROTOVER: u32 = 3;
pub const AUTH_PLATFORM: &str = "web";
pub const AUTH_TYPE: u32 = 2;

// ----------------------------------------------------------------------------
// 디코더 한계 (적대적 입력 방어)
// ----------------------------------------------------------------------------

/// 압축 프레임 안의 압축 프레임 허용 깊이. 실제 서버는 1단계만 사용
pub const MAX_COMPRESSION_DEPTH: usize = 4;

/// 압축 해제 결과 최대 크기 (16MB)
pub const MAX_DECOMPRESSED_SIZE: u64 = 16 * 1024 * 1024;

/// brotli 디코더 내부 버퍼
pub const BROTLI_BUFFER_SIZE: usize = 4096;

// ----------------------------------------------------------------------------
// 이벤트 / 종료 코드
// ----------------------------------------------------------------------------

/// 이벤트 버스 버퍼 크기. 구독자가 느리면 오래된 이벤트부터 drop
pub const EVENT_BUS_CAPACITY: usize = 1024;

/// 요청에 의한 정상 종료
pub const CLOSE_CODE_REQUESTED: i32 = 0;

/// 소켓 이상 종료
pub const CLOSE_CODE_ERROR: i32 = -1;

/// close 핸드셰이크 대기 한도. 넘으면 소켓을 그냥 버림
pub const CLOSE_TIMEOUT_MS: u64 = 3_000;
