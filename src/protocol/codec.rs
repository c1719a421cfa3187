//! Length-framed binary codec for backend messages.
//!
//! ```text
//! frame    = len:u32 payload[len]
//! request  = echo_tag:u64 command:u8 uuid:[16] start:i64 end:i64 point_width:u8 version:u64
//! response = echo_tag:u64 status:u32 count:u32 record[count]
//! record   = time:i64 min:f64 mean:f64 max:f64 count:u64
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

use crate::protocol::types::{
    QueryRequest, Response, StatisticalRecord, StatusCode, CMD_QUERY_STATISTICAL_VALUES,
};

/// Upper bound on a single payload.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const LEN_PREFIX: usize = 4;
const REQUEST_LEN: usize = 8 + 1 + 16 + 8 + 8 + 1 + 8;
const RESPONSE_HEADER_LEN: usize = 8 + 4 + 4;
const RECORD_LEN: usize = 8 * 5;

/// Errors produced while encoding or decoding a payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    #[error("payload truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("unsupported command {0}")]
    UnknownCommand(u8),

    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
}

fn ensure(buf: &impl Buf, needed: usize) -> Result<(), CodecError> {
    if buf.remaining() < needed {
        return Err(CodecError::Truncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

fn finish(buf: &impl Buf) -> Result<(), CodecError> {
    match buf.remaining() {
        0 => Ok(()),
        n => Err(CodecError::TrailingBytes(n)),
    }
}

/// Serialize a query into a complete frame, length prefix included.
pub fn encode_request(req: &QueryRequest) -> Bytes {
    let mut buf = BytesMut::with_capacity(LEN_PREFIX + REQUEST_LEN);
    buf.put_u32(REQUEST_LEN as u32);
    buf.put_u64(req.echo_tag);
    buf.put_u8(CMD_QUERY_STATISTICAL_VALUES);
    buf.put_slice(req.series.as_bytes());
    buf.put_i64(req.start_time);
    buf.put_i64(req.end_time);
    buf.put_u8(req.point_width);
    buf.put_u64(req.version);
    buf.freeze()
}

/// Decode a query payload (without length prefix).
pub fn decode_request(mut payload: &[u8]) -> Result<QueryRequest, CodecError> {
    ensure(&payload, REQUEST_LEN)?;
    let echo_tag = payload.get_u64();
    let command = payload.get_u8();
    if command != CMD_QUERY_STATISTICAL_VALUES {
        return Err(CodecError::UnknownCommand(command));
    }
    let mut uuid = [0u8; 16];
    payload.copy_to_slice(&mut uuid);
    let req = QueryRequest {
        echo_tag,
        series: Uuid::from_bytes(uuid),
        start_time: payload.get_i64(),
        end_time: payload.get_i64(),
        point_width: payload.get_u8(),
        version: payload.get_u64(),
    };
    finish(&payload)?;
    Ok(req)
}

/// Serialize a response into a complete frame, length prefix included.
pub fn encode_response(resp: &Response) -> Bytes {
    let len = RESPONSE_HEADER_LEN + resp.records.len() * RECORD_LEN;
    let mut buf = BytesMut::with_capacity(LEN_PREFIX + len);
    buf.put_u32(len as u32);
    buf.put_u64(resp.echo_tag);
    buf.put_u32(resp.status.0);
    buf.put_u32(resp.records.len() as u32);
    for record in &resp.records {
        buf.put_i64(record.time);
        buf.put_f64(record.min);
        buf.put_f64(record.mean);
        buf.put_f64(record.max);
        buf.put_u64(record.count);
    }
    buf.freeze()
}

/// Decode a response payload (without length prefix).
pub fn decode_response(mut payload: &[u8]) -> Result<Response, CodecError> {
    ensure(&payload, RESPONSE_HEADER_LEN)?;
    let echo_tag = payload.get_u64();
    let status = StatusCode(payload.get_u32());
    let count = payload.get_u32() as usize;
    ensure(&payload, count.saturating_mul(RECORD_LEN))?;

    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        records.push(StatisticalRecord {
            time: payload.get_i64(),
            min: payload.get_f64(),
            mean: payload.get_f64(),
            max: payload.get_f64(),
            count: payload.get_u64(),
        });
    }
    finish(&payload)?;

    Ok(Response {
        echo_tag,
        status,
        records,
    })
}

/// Read one frame's payload from the stream.
///
/// Oversized frames are consumed and discarded before the error is returned,
/// so the stream remains positioned at the next frame boundary.
pub async fn read_frame<R>(reader: &mut R) -> std::io::Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        let mut skipped = (&mut *reader).take(len as u64);
        tokio::io::copy(&mut skipped, &mut tokio::io::sink()).await?;
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            CodecError::FrameTooLarge(len),
        ));
    }

    let mut payload = BytesMut::zeroed(len);
    reader.read_exact(&mut payload).await?;
    Ok(payload.freeze())
}
