use crate::error::BliveError;

/// Client → Server operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ClientOperation {
    /// 생존 알림. body 없음
    Heartbeat = 2,
    /// 연결 직후 인증 (uid, roomid, protover, platform, type)
    Auth      = 7,
}

/// Server → Client operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ServerOperation {
    /// 하트비트 응답. body = 시청자 수 (2 또는 4바이트 BE 정수)
    HeartbeatReply = 3,
    /// cmd 기반 이벤트 (JSON)
    Push           = 5,
    /// 인증 응답 (JSON)
    AuthReply      = 8,
}

impl TryFrom<u32> for ServerOperation {
    type Error = BliveError;

    fn try_from(op: u32) -> Result<Self, Self::Error> {
        match op {
            3 => Ok(ServerOperation::HeartbeatReply),
            5 => Ok(ServerOperation::Push),
            8 => Ok(ServerOperation::AuthReply),
            unknown => Err(BliveError::UnknownOperation(unknown)),
        }
    }
}

/// 헤더 offset 6 의 protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ProtocolVersion {
    /// 평문: body 바로 해석
    Plain      = 0,
    /// 평문 (서버가 인증 응답 등에 사용)
    PlainAlt   = 1,
    /// brotli 압축: 해제하면 프레임 1개 이상이 이어져 있음
    Compressed = 3,
}

impl ProtocolVersion {
    pub fn is_compressed(self) -> bool {
        self == ProtocolVersion::Compressed
    }
}

// 2(zlib 추정)는 확인 전까지 알 수 없는 버전으로 처리
impl TryFrom<u16> for ProtocolVersion {
    type Error = BliveError;

    fn try_from(version: u16) -> Result<Self, Self::Error> {
        match version {
            0 => Ok(ProtocolVersion::Plain),
            1 => Ok(ProtocolVersion::PlainAlt),
            3 => Ok(ProtocolVersion::Compressed),
            unknown => Err(BliveError::UnknownVersion(unknown)),
        }
    }
}
