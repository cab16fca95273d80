// 스키마 없이 protobuf 바이트에서 length-delimited 필드 하나를 꺼낸다.
// dm_v2 처럼 .proto 정의를 들고 다닐 필요 없는 한두 필드 조회용.

use bytes::{Buf, Bytes};
use prost::encoding::{decode_key, decode_varint, skip_field, DecodeContext, WireType};

use crate::error::{BliveError, BliveResult};

/// field_number 에 해당하는 첫 번째 length-delimited 값의 raw 바이트.
/// 없으면 빈 Bytes. 반복 필드는 첫 값만 본다.
pub fn extract_field(mut buf: &[u8], field_number: u32) -> BliveResult<Bytes> {
    while buf.has_remaining() {
        let (tag, wire_type) = decode_key(&mut buf).map_err(proto_err)?;

        if tag == field_number && wire_type == WireType::LengthDelimited {
            let len = decode_varint(&mut buf).map_err(proto_err)? as usize;
            if len > buf.remaining() {
                return Err(BliveError::Protobuf(format!(
                    "field {} needs {} bytes, {} left", tag, len, buf.remaining()
                )));
            }
            return Ok(buf.copy_to_bytes(len));
        }

        skip_field(wire_type, tag, &mut buf, DecodeContext::default()).map_err(proto_err)?;
    }
    Ok(Bytes::new())
}

fn proto_err(e: prost::DecodeError) -> BliveError {
    BliveError::Protobuf(e.to_string())
}
