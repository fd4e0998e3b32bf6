// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::proto::Profile;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use prost::Message;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

/// The two leading bytes of a gzip stream.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Decode(#[from] prost::DecodeError),
    #[error(transparent)]
    Encode(#[from] prost::EncodeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Decodes a serialized profile. Payloads are normally gzip-framed, but a
/// payload without the gzip magic is decoded as raw protobuf bytes.
pub fn decode(payload: &[u8]) -> Result<Profile, CodecError> {
    if payload.starts_with(&GZIP_MAGIC) {
        let mut decoder = GzDecoder::new(payload);
        let mut buf = Vec::with_capacity(payload.len() * 2);
        decoder.read_to_end(&mut buf)?;
        return Ok(Profile::decode(buf.as_slice())?);
    }
    debug!(len = payload.len(), "payload is not gzip-framed, decoding raw");
    Ok(Profile::decode(payload)?)
}

/// Encodes a profile into a gzip-framed protobuf payload.
pub fn encode(profile: &Profile) -> Result<Vec<u8>, CodecError> {
    let raw = profile.encode_to_vec();
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(raw.len() / 2),
        flate2::Compression::default(),
    );
    encoder.write_all(&raw)?;
    let framed = encoder.finish()?;
    debug!(raw = raw.len(), framed = framed.len(), "encoded profile");
    Ok(framed)
}

/// Reads and decodes a profile from a file.
pub fn open_file(path: impl AsRef<Path>) -> Result<Profile, CodecError> {
    let payload = std::fs::read(path)?;
    decode(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{Sample, ValueType};

    fn small_profile() -> Profile {
        Profile {
            sample_types: vec![ValueType { r#type: 1, unit: 2 }],
            samples: vec![Sample {
                location_ids: vec![1],
                values: vec![42],
                labels: vec![],
            }],
            string_table: vec!["".into(), "cpu".into(), "nanoseconds".into()],
            ..Default::default()
        }
    }

    #[test]
    fn roundtrip() {
        let profile = small_profile();
        let payload = encode(&profile).unwrap();
        assert_eq!(&payload[..2], &GZIP_MAGIC);
        assert_eq!(decode(&payload).unwrap(), profile);
    }

    #[test]
    fn accepts_raw_payload() {
        let profile = small_profile();
        let raw = profile.encode_to_vec();
        assert_eq!(decode(&raw).unwrap(), profile);
    }

    #[test]
    fn rejects_garbage() {
        // A field-number-zero tag is invalid in any protobuf message.
        assert!(decode(&[0x00, 0x01, 0x02, 0x03]).is_err());
    }

    #[test]
    fn rejects_truncated_gzip() {
        let payload = encode(&small_profile()).unwrap();
        assert!(decode(&payload[..payload.len() / 2]).is_err());
    }
}
