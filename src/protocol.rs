// 와이어 계층: 16바이트 헤더 프레임 → (압축 해제) → 서버 메시지

pub mod frame;
pub mod message;
pub mod opcode;
pub mod proto;

pub use frame::{decode, encode_compressed, encode_frame, split_frames, Frame, FrameDecoder};
pub use message::{auth_packet, decode_message, heartbeat_packet, DecodedMessage, PushMessage};
pub use opcode::{ClientOperation, ProtocolVersion, ServerOperation};
pub use proto::extract_field;
