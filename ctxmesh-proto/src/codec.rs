//! Length-delimited JSON framing

use crate::ProtoError;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

fn new_length_delimited_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

/// Decodes frames as `D` and encodes `E`, so each side of a connection names
/// what it reads and what it writes
#[derive(Debug)]
pub struct JsonCodec<D, E = D> {
    inner: LengthDelimitedCodec,
    _marker: PhantomData<fn(E) -> D>,
}

impl<D, E> JsonCodec<D, E> {
    pub fn new() -> Self {
        Self {
            inner: new_length_delimited_codec(),
            _marker: PhantomData,
        }
    }
}

impl<D, E> Default for JsonCodec<D, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, E> Decoder for JsonCodec<D, E>
where
    D: for<'de> Deserialize<'de>,
{
    type Item = D;
    type Error = ProtoError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(frame) => Ok(Some(serde_json::from_slice(&frame)?)),
            None => Ok(None),
        }
    }
}

impl<D, E> Encoder<E> for JsonCodec<D, E>
where
    E: Serialize,
{
    type Error = ProtoError;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item)?;
        self.inner.encode(Bytes::from(json), dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::AgentRequest;

    #[test]
    fn test_frame_layout() {
        let mut codec = JsonCodec::<AgentRequest>::new();
        let mut buf = BytesMut::new();
        codec.encode(AgentRequest::Status, &mut buf).unwrap();

        let body = br#"{"type":"status"}"#;
        assert_eq!(&buf[..4], &(body.len() as u32).to_be_bytes());
        assert_eq!(&buf[4..], body);
    }

    #[test]
    fn test_partial_frame_waits() {
        let mut codec = JsonCodec::<AgentRequest>::new();
        let mut buf = BytesMut::new();
        codec
            .encode(
                AgentRequest::Command {
                    line: "viewall".to_string(),
                },
                &mut buf,
            )
            .unwrap();

        let mut partial = buf.split_to(buf.len() - 3);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.unsplit(buf);
        assert_eq!(
            codec.decode(&mut partial).unwrap(),
            Some(AgentRequest::Command {
                line: "viewall".to_string()
            })
        );
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let mut raw = BytesMut::new();
        LengthDelimitedCodec::new()
            .encode(Bytes::from_static(b"not json"), &mut raw)
            .unwrap();

        let mut codec = JsonCodec::<AgentRequest>::new();
        assert!(matches!(codec.decode(&mut raw), Err(ProtoError::Json(_))));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut raw = BytesMut::new();
        raw.extend_from_slice(&((MAX_FRAME_LENGTH as u32) + 1).to_be_bytes());
        let mut codec = JsonCodec::<AgentRequest>::new();
        assert!(matches!(codec.decode(&mut raw), Err(ProtoError::Io(_))));
    }
}
