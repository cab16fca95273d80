// 바이너리 프레임 코덱
//
// 헤더 (16바이트, 모든 정수 Big Endian):
//   ┌──────────┬──────────┬──────────┬───────────┬──────────┐
//   │ total    │ header   │ version  │ operation │ sequence │
//   │ u32      │ u16 (16) │ u16      │ u32       │ u32 (1)  │
//   └──────────┴──────────┴──────────┴───────────┴──────────┘
//
// 하나의 WebSocket 메시지 안에 프레임이 연달아 붙어 올 수 있고,
// version 3 프레임의 body는 brotli로 압축된 "프레임 묶음"이다.
//
// FrameDecoder는 재귀 대신 버퍼 스택으로 처리:
//   스택 top = 가장 안쪽(최근 압축 해제된) 버퍼
//   top이 비면 pop → 바깥 버퍼의 남은 프레임 계속
// 덕분에 프레임 순서가 유지되고 스택 깊이 = 압축 중첩 깊이 + 1 로 제한된다.

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::config;
use crate::error::{BliveError, BliveResult};
use crate::protocol::opcode::{ProtocolVersion, ServerOperation};

const HEADER_SIZE: usize = config::HEADER_LEN as usize;

// ----------------------------------------------------------------------------
// [Frame]
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 헤더 + body 전체 길이
    pub total_len:  u32,
    pub header_len: u16,
    pub version:    ProtocolVersion,
    /// 방향에 따라 ClientOperation / ServerOperation 으로 해석
    pub operation:  u32,
    pub sequence:   u32,
    pub body:       Bytes,
}

impl Frame {
    pub fn new(operation: u32, version: ProtocolVersion, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            total_len:  (HEADER_SIZE + body.len()) as u32,
            header_len: config::HEADER_LEN,
            version,
            operation,
            sequence:   config::FRAME_SEQUENCE,
            body,
        }
    }

    pub fn server_operation(&self) -> BliveResult<ServerOperation> {
        ServerOperation::try_from(self.operation)
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.body.len());
        buf.put_u32((HEADER_SIZE + self.body.len()) as u32);
        buf.put_u16(config::HEADER_LEN);
        buf.put_u16(self.version as u16);
        buf.put_u32(self.operation);
        buf.put_u32(self.sequence);
        buf.put_slice(&self.body);
        buf.freeze()
    }

    /// buf 앞쪽의 프레임 1개를 잘라낸다. 성공 시 buf는 다음 프레임 위치로 전진
    fn parse(buf: &mut Bytes) -> BliveResult<Frame> {
        let available = buf.len();
        if available < HEADER_SIZE {
            return Err(BliveError::TruncatedFrame { needed: HEADER_SIZE, available });
        }

        let total_len  = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let header_len = u16::from_be_bytes([buf[4], buf[5]]);
        let version    = u16::from_be_bytes([buf[6], buf[7]]);
        let operation  = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let sequence   = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);

        if header_len != config::HEADER_LEN {
            return Err(BliveError::InvalidHeaderLength(header_len));
        }
        let total = total_len as usize;
        if total < HEADER_SIZE {
            return Err(BliveError::TruncatedFrame { needed: HEADER_SIZE, available: total });
        }
        if total > available {
            return Err(BliveError::TruncatedFrame { needed: total, available });
        }
        let version = ProtocolVersion::try_from(version)?;

        let mut frame = buf.split_to(total);
        let body = frame.split_off(HEADER_SIZE);

        Ok(Frame { total_len, header_len, version, operation, sequence, body })
    }
}

// ----------------------------------------------------------------------------
// [인코딩 헬퍼]
// ----------------------------------------------------------------------------

/// 평문 프레임 1개 인코딩
pub fn encode_frame(operation: u32, version: ProtocolVersion, body: &[u8]) -> Bytes {
    Frame::new(operation, version, Bytes::copy_from_slice(body)).encode()
}

/// 이미 만들어진 프레임들을 이어 붙여 brotli 압축 → version 3 Push 프레임으로 감싼다
pub fn encode_compressed(frames: &[Frame]) -> BliveResult<Bytes> {
    let mut inner = BytesMut::new();
    for frame in frames {
        inner.put_slice(&frame.encode());
    }

    let mut compressed = Vec::new();
    {
        let mut writer = brotli::CompressorWriter::new(&mut compressed, config::BROTLI_BUFFER_SIZE, 5, 22);
        writer
            .write_all(&inner)
            .map_err(|e| BliveError::Compress(format!("brotli write failed: {}", e)))?;
        writer.into_inner();
    }

    Ok(Frame::new(ServerOperation::Push as u32, ProtocolVersion::Compressed, compressed).encode())
}

fn decompress(body: &[u8]) -> BliveResult<Bytes> {
    let mut out = Vec::new();
    brotli::Decompressor::new(body, config::BROTLI_BUFFER_SIZE)
        .take(config::MAX_DECOMPRESSED_SIZE + 1)
        .read_to_end(&mut out)
        .map_err(|e| BliveError::Decompress(e.to_string()))?;

    if out.len() as u64 > config::MAX_DECOMPRESSED_SIZE {
        return Err(BliveError::Decompress(format!(
            "output exceeds {} bytes", config::MAX_DECOMPRESSED_SIZE
        )));
    }
    Ok(Bytes::from(out))
}

// ----------------------------------------------------------------------------
// [분할 / 디코딩]
// ----------------------------------------------------------------------------

/// 연달아 붙은 프레임을 순서대로 분할. 압축은 풀지 않는다
pub fn split_frames(buf: impl Into<Bytes>) -> BliveResult<Vec<Frame>> {
    let mut buf = buf.into();
    let mut frames = Vec::new();
    while !buf.is_empty() {
        frames.push(Frame::parse(&mut buf)?);
    }
    Ok(frames)
}

/// 압축을 풀어가며 평문 프레임만 하나씩 내놓는다
pub fn decode(buf: impl Into<Bytes>) -> FrameDecoder {
    FrameDecoder::new(buf.into())
}

pub struct FrameDecoder {
    pending: Vec<Bytes>,
}

impl FrameDecoder {
    pub fn new(buf: Bytes) -> Self {
        Self { pending: vec![buf] }
    }

    fn fail(&mut self, err: BliveError) -> Option<BliveResult<Frame>> {
        // 에러 이후 남은 바이트는 신뢰할 수 없음: 이 메시지는 여기서 끝
        self.pending.clear();
        Some(Err(err))
    }
}

impl Iterator for FrameDecoder {
    type Item = BliveResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.pending.last_mut()?;
            if top.is_empty() {
                self.pending.pop();
                continue;
            }

            let frame = match Frame::parse(top) {
                Ok(f)  => f,
                Err(e) => return self.fail(e),
            };

            if !frame.version.is_compressed() {
                return Some(Ok(frame));
            }

            if self.pending.len() > config::MAX_COMPRESSION_DEPTH {
                let depth = self.pending.len();
                return self.fail(BliveError::CompressionTooDeep(depth));
            }
            match decompress(&frame.body) {
                Ok(inner) => {
                    trace!("[codec] decompressed {} -> {} bytes", frame.body.len(), inner.len());
                    self.pending.push(inner);
                }
                Err(e) => return self.fail(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat_reply(count: u32) -> Frame {
        Frame::new(ServerOperation::HeartbeatReply as u32, ProtocolVersion::PlainAlt, count.to_be_bytes().to_vec())
    }

    fn push(json: &str) -> Frame {
        Frame::new(ServerOperation::Push as u32, ProtocolVersion::Plain, json.as_bytes().to_vec())
    }

    #[test]
    fn encode_writes_big_endian_header() {
        let bytes = encode_frame(7, ProtocolVersion::PlainAlt, b"{}");
        assert_eq!(&bytes[..16], &[0, 0, 0, 18, 0, 16, 0, 1, 0, 0, 0, 7, 0, 0, 0, 1]);
        assert_eq!(&bytes[16..], b"{}");
    }

    #[test]
    fn encode_then_split_keeps_fields() {
        for version in [ProtocolVersion::Plain, ProtocolVersion::PlainAlt, ProtocolVersion::Compressed] {
            let frame = Frame::new(5, version, b"payload".to_vec());
            let frames = split_frames(frame.encode()).unwrap();
            assert_eq!(frames, vec![frame]);
        }
    }

    #[test]
    fn split_two_concatenated_frames() {
        let auth = Frame::new(ServerOperation::AuthReply as u32, ProtocolVersion::PlainAlt, br#"{"code":0}"#.to_vec());
        let mut buf = BytesMut::new();
        buf.put_slice(&encode_frame(3, ProtocolVersion::PlainAlt, &[0x00, 0x00, 0x00, 0x2A]));
        buf.put_slice(&auth.encode());

        let frames = split_frames(buf.freeze()).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].server_operation().unwrap(), ServerOperation::HeartbeatReply);
        assert_eq!(&frames[0].body[..], &[0x00, 0x00, 0x00, 0x2A]);
        assert_eq!(frames[1].server_operation().unwrap(), ServerOperation::AuthReply);
        assert_eq!(&frames[1].body[..], br#"{"code":0}"#);
    }

    #[test]
    fn decode_compressed_push() {
        let json = r#"{"cmd":"INTERACT_WORD","data":{"uid":1,"uname":"alice","msg_type":1}}"#;
        let buf = encode_compressed(&[push(json)]).unwrap();

        let frames: Vec<Frame> = decode(buf).collect::<BliveResult<_>>().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].server_operation().unwrap(), ServerOperation::Push);
        assert_eq!(&frames[0].body[..], json.as_bytes());
    }

    #[test]
    fn decode_compressed_batch_keeps_order() {
        let inner = [push(r#"{"cmd":"A"}"#), push(r#"{"cmd":"B"}"#), push(r#"{"cmd":"C"}"#)];
        let mut buf = BytesMut::new();
        buf.put_slice(&heartbeat_reply(1).encode());
        buf.put_slice(&encode_compressed(&inner).unwrap());
        buf.put_slice(&heartbeat_reply(2).encode());

        let bodies: Vec<Bytes> = decode(buf.freeze()).map(|f| f.unwrap().body).collect();
        assert_eq!(bodies.len(), 5);
        assert_eq!(&bodies[0][..], &1u32.to_be_bytes());
        assert_eq!(&bodies[1][..], br#"{"cmd":"A"}"#);
        assert_eq!(&bodies[3][..], br#"{"cmd":"C"}"#);
        // 압축 프레임 뒤에 붙은 프레임도 버리지 않음
        assert_eq!(&bodies[4][..], &2u32.to_be_bytes());
    }

    #[test]
    fn decode_nested_compression() {
        let once = encode_compressed(&[push(r#"{"cmd":"NESTED"}"#)]).unwrap();
        let twice = encode_compressed(&split_frames(once).unwrap()).unwrap();

        let frames: Vec<Frame> = decode(twice).collect::<BliveResult<_>>().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].body[..], br#"{"cmd":"NESTED"}"#);
    }

    #[test]
    fn decode_rejects_deep_nesting() {
        let mut buf = encode_compressed(&[push(r#"{"cmd":"X"}"#)]).unwrap();
        for _ in 0..config::MAX_COMPRESSION_DEPTH {
            buf = encode_compressed(&split_frames(buf).unwrap()).unwrap();
        }
        let result: BliveResult<Vec<Frame>> = decode(buf).collect();
        assert!(matches!(result, Err(BliveError::CompressionTooDeep(_))));
    }

    #[test]
    fn unknown_version_is_error() {
        let mut bytes = BytesMut::from(&encode_frame(5, ProtocolVersion::Plain, b"{}")[..]);
        bytes[7] = 2;
        let mut decoder = decode(bytes.freeze());
        assert_eq!(decoder.next(), Some(Err(BliveError::UnknownVersion(2))));
        assert_eq!(decoder.next(), None);
    }

    #[test]
    fn truncated_frame_is_error() {
        let bytes = encode_frame(5, ProtocolVersion::Plain, b"{\"cmd\":\"X\"}");
        let err = split_frames(bytes.slice(..bytes.len() - 3)).unwrap_err();
        assert!(matches!(err, BliveError::TruncatedFrame { .. }));

        let err = split_frames(bytes.slice(..10)).unwrap_err();
        assert_eq!(err, BliveError::TruncatedFrame { needed: 16, available: 10 });
    }

    #[test]
    fn header_length_must_be_16() {
        let mut bytes = BytesMut::from(&encode_frame(5, ProtocolVersion::Plain, b"{}")[..]);
        bytes[5] = 12;
        assert_eq!(split_frames(bytes.freeze()).unwrap_err(), BliveError::InvalidHeaderLength(12));
    }

    #[test]
    fn truncated_compressed_body_is_error() {
        let whole = encode_compressed(&[push(r#"{"cmd":"DANMU_MSG","info":[0,"hello"]}"#)]).unwrap();
        let body = split_frames(whole).unwrap().remove(0).body;
        let bytes = encode_frame(5, ProtocolVersion::Compressed, &body[..body.len() / 2]);
        let result: BliveResult<Vec<Frame>> = decode(bytes).collect();
        assert!(matches!(result, Err(BliveError::Decompress(_))));
    }
}
