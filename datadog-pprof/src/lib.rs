// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! In-memory model of the [pprof profile format], plus the gzip framing
//! that profile payloads travel in.
//!
//! The messages are hand-written [`prost`] structs rather than build-script
//! output, so the field types stay under our control (see [`Profile`]).
//! [`codec`] reads and writes serialized payloads: the decoder accepts both
//! gzip-framed and raw protobuf bytes, the encoder always gzip-frames.
//!
//! Conventions baked into the format and relied on throughout:
//!
//! - `id` fields on mappings, locations, and functions are 1-based; 0 means
//!   "absent" wherever one message references another.
//! - String fields are indices into `string_table`, and index 0 is the
//!   empty string.
//!
//! [pprof profile format]: https://github.com/google/pprof/blob/main/proto/profile.proto

pub mod codec;
mod proto;
pub mod test_utils;

pub use codec::{decode, encode, open_file, CodecError};
pub use proto::*;
