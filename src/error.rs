use std::fmt;

use crate::config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BliveError {
    // --- 재진입 / 설정 ---
    AlreadyConnecting,
    InvalidOptions(String),

    // --- 방 번호 조회 ---
    InvalidRoomId(u64),
    Network(String),

    // --- 프로토콜 (메시지 1개 단위, 세션은 유지) ---
    TruncatedFrame { needed: usize, available: usize },
    InvalidHeaderLength(u16),
    UnknownVersion(u16),
    UnknownOperation(u32),
    InvalidBodyLength(usize),
    CompressionTooDeep(usize),
    Decompress(String),
    Compress(String),
    InvalidPayload(String),
    MissingCmd,
    Protobuf(String),

    // --- 전송 계층 ---
    WebSocket(String),
    ConnectionClosed,

    // --- 요청에 의한 종료 ---
    Cancelled,
}

/// 에러 분류: 어떤 경로로 전파되는지 결정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connect 실패, 소켓 미개방
    Resolution,
    /// 해당 메시지만 버림. DecodeError 이벤트로 보고
    Protocol,
    /// 세션 종료 + Error 이벤트
    Transport,
    /// 세션 종료 + Closed 이벤트
    Cancelled,
    /// 같은 세션에 Connect 중복 호출
    Reentrancy,
    /// SessionOptions 값이 잘못됨. 소켓 미개방
    Configuration,
}

impl ErrorKind {
    /// Closed / Error 이벤트에 실리는 코드
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::Cancelled => config::CLOSE_CODE_REQUESTED,
            _                    => config::CLOSE_CODE_ERROR,
        }
    }
}

impl BliveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BliveError::AlreadyConnecting => ErrorKind::Reentrancy,
            BliveError::InvalidOptions(_) => ErrorKind::Configuration,

            BliveError::InvalidRoomId(_)
            | BliveError::Network(_) => ErrorKind::Resolution,

            BliveError::TruncatedFrame { .. }
            | BliveError::InvalidHeaderLength(_)
            | BliveError::UnknownVersion(_)
            | BliveError::UnknownOperation(_)
            | BliveError::InvalidBodyLength(_)
            | BliveError::CompressionTooDeep(_)
            | BliveError::Decompress(_)
            | BliveError::Compress(_)
            | BliveError::InvalidPayload(_)
            | BliveError::MissingCmd
            | BliveError::Protobuf(_) => ErrorKind::Protocol,

            BliveError::WebSocket(_)
            | BliveError::ConnectionClosed => ErrorKind::Transport,

            BliveError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}

impl fmt::Display for BliveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BliveError::AlreadyConnecting => write!(f, "Connect is already running on this session"),
            BliveError::InvalidOptions(msg) => write!(f, "Invalid session options: {}", msg),
            BliveError::InvalidRoomId(id) => write!(f, "Invalid room id: {}", id),
            BliveError::Network(msg) => write!(f, "Room lookup failed: {}", msg),
            BliveError::TruncatedFrame { needed, available } => {
                write!(f, "Truncated frame: need {} bytes, have {}", needed, available)
            }
            BliveError::InvalidHeaderLength(len) => write!(f, "Invalid header length: {}", len),
            BliveError::UnknownVersion(v) => write!(f, "Unknown protocol version: {}", v),
            BliveError::UnknownOperation(op) => write!(f, "Unknown server operation: {}", op),
            BliveError::InvalidBodyLength(len) => write!(f, "Invalid integer body length: {}", len),
            BliveError::CompressionTooDeep(depth) => write!(f, "Compressed frames nested too deep: {}", depth),
            BliveError::Decompress(msg) => write!(f, "Decompression failed: {}", msg),
            BliveError::Compress(msg) => write!(f, "Compression failed: {}", msg),
            BliveError::InvalidPayload(msg) => write!(f, "Invalid payload: {}", msg),
            BliveError::MissingCmd => write!(f, "Push message has no string cmd field"),
            BliveError::Protobuf(msg) => write!(f, "Protobuf decode error: {}", msg),
            BliveError::WebSocket(msg) => write!(f, "WebSocket error: {}", msg),
            BliveError::ConnectionClosed => write!(f, "WebSocket closed by server"),
            BliveError::Cancelled => write!(f, "WebSocket closed by request"),
        }
    }
}

impl std::error::Error for BliveError {}

impl From<tokio_tungstenite::tungstenite::Error> for BliveError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BliveError::WebSocket(err.to_string())
    }
}

impl From<serde_json::Error> for BliveError {
    fn from(err: serde_json::Error) -> Self {
        BliveError::InvalidPayload(err.to_string())
    }
}

pub type BliveResult<T> = Result<T, BliveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(BliveError::AlreadyConnecting.kind(), ErrorKind::Reentrancy);
        assert_eq!(BliveError::InvalidRoomId(1).kind(), ErrorKind::Resolution);
        assert_eq!(BliveError::UnknownVersion(2).kind(), ErrorKind::Protocol);
        assert_eq!(BliveError::InvalidBodyLength(3).kind(), ErrorKind::Protocol);
        assert_eq!(BliveError::ConnectionClosed.kind(), ErrorKind::Transport);
        assert_eq!(BliveError::InvalidOptions("x".into()).kind(), ErrorKind::Configuration);
        assert_eq!(BliveError::Compress("x".into()).kind(), ErrorKind::Protocol);
        assert!(BliveError::Cancelled.is_cancelled());
    }

    #[test]
    fn close_codes() {
        assert_eq!(ErrorKind::Cancelled.code(), 0);
        assert_eq!(ErrorKind::Transport.code(), -1);
    }

    #[test]
    fn display_names_body_length() {
        let msg = BliveError::InvalidBodyLength(3).to_string();
        assert!(msg.contains("body length"));
        assert!(msg.contains('3'));
    }
}
