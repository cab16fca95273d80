use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::config;
use crate::error::{BliveError, BliveResult};
use crate::protocol::frame::{encode_frame, Frame};
use crate::protocol::opcode::{ClientOperation, ServerOperation};
use crate::protocol::proto::extract_field;

// ----------------------------------------------------------------------------
// [C→S] 클라이언트 패킷
// ----------------------------------------------------------------------------

/// op: AUTH (7)
///
/// 예시:
///   { "uid": 1, "roomid": 21452505, "protover": 3, "platform": "web", "type": 2 }
#[derive(Serialize, Debug)]
pub struct AuthPayload {
    pub uid:      u64,
    pub roomid:   u64,
    pub protover: u32,
    pub platform: &'static str,
    #[serde(rename = "type")]
    pub kind:     u32,
}

impl AuthPayload {
    pub fn new(uid: u64, room_id: u64) -> Self {
        Self {
            uid,
            roomid:   room_id,
            protover: config::AUTH_PROTOVER,
            platform: config::AUTH_PLATFORM,
            kind:     config::AUTH_TYPE,
        }
    }
}

pub fn auth_packet(uid: u64, room_id: u64) -> BliveResult<Bytes> {
    let body = serde_json::to_vec(&AuthPayload::new(uid, room_id))?;
    Ok(encode_frame(ClientOperation::Auth as u32, config::CLIENT_PROTOCOL_VERSION, &body))
}

/// op: HEARTBEAT (2): body 없음
pub fn heartbeat_packet() -> Bytes {
    encode_frame(ClientOperation::Heartbeat as u32, config::CLIENT_PROTOCOL_VERSION, &[])
}

// ----------------------------------------------------------------------------
// [S→C] 디코딩 결과
// ----------------------------------------------------------------------------

/// cmd 로 분류되는 서버 이벤트 (op 5)
#[derive(Debug, Clone)]
pub struct PushMessage {
    pub cmd:  String,
    pub body: Value,
    pub raw:  Bytes,
}

#[derive(Debug, Clone)]
pub enum DecodedMessage {
    AuthReply { body: Value, raw: Bytes },
    /// online = 인기/시청자 수
    HeartbeatReply { online: i32, raw: Bytes },
    Push(PushMessage),
}

pub fn decode_message(frame: &Frame) -> BliveResult<DecodedMessage> {
    let raw = frame.body.clone();
    match frame.server_operation()? {
        ServerOperation::AuthReply => Ok(DecodedMessage::AuthReply {
            body: parse_json(&raw)?,
            raw,
        }),
        ServerOperation::HeartbeatReply => Ok(DecodedMessage::HeartbeatReply {
            online: be_int(&raw)?,
            raw,
        }),
        ServerOperation::Push => {
            let body = parse_json(&raw)?;
            let cmd = body
                .get("cmd")
                .and_then(Value::as_str)
                .ok_or(BliveError::MissingCmd)?
                .to_string();
            Ok(DecodedMessage::Push(PushMessage { cmd, body, raw }))
        }
    }
}

fn parse_json(raw: &[u8]) -> BliveResult<Value> {
    Ok(serde_json::from_slice(raw)?)
}

/// 2 또는 4바이트 BE 정수. 그 외 길이는 잘라내거나 채우지 않고 에러
fn be_int(raw: &[u8]) -> BliveResult<i32> {
    match *raw {
        [a, b]       => Ok(i16::from_be_bytes([a, b]) as i32),
        [a, b, c, d] => Ok(i32::from_be_bytes([a, b, c, d])),
        _            => Err(BliveError::InvalidBodyLength(raw.len())),
    }
}

/// DANMU_MSG 의 dm_v2 (base64 protobuf) → field 20 (사용자) → field 4 (프로필 이미지 URL)
/// dm_v2 가 없으면 빈 문자열
pub fn danmu_face(body: &Value) -> BliveResult<String> {
    let encoded = match body.get("dm_v2").and_then(Value::as_str) {
        Some(s) if !s.is_empty() => s,
        _ => return Ok(String::new()),
    };
    let proto = STANDARD
        .decode(encoded)
        .map_err(|e| BliveError::InvalidPayload(format!("dm_v2 base64: {}", e)))?;
    let user = extract_field(&proto, 20)?;
    let face = extract_field(&user, 4)?;
    String::from_utf8(face.to_vec())
        .map_err(|e| BliveError::InvalidPayload(format!("dm_v2 face utf8: {}", e)))
}
