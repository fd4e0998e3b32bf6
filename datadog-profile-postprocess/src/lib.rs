// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Post-processing of profile data for a continuous-profiling backend.
//!
//! Two subsystems operate on the [`datadog_pprof`] model:
//!
//! - The [resolver] turns a symbol dictionary plus a stream of weighted
//!   stacktraces into a pprof profile in which only the heaviest call paths
//!   survive. Everything below a weight floor is folded into a synthetic
//!   `"other"` frame, and the emitted dictionaries are compacted so ids are
//!   dense and every reference is live.
//! - The [normalizer] takes an already-decoded profile, merges duplicate
//!   samples, drops redundant labels and empty samples, and
//!   garbage-collects the locations, functions, and strings nothing refers
//!   to anymore, shifting surviving indices accordingly.
//!
//! Both are pure, single-threaded transforms: no I/O, no logging, no
//! retries. Out-of-range indices in the input are a caller bug and fault at
//! the indexing site.
//!
//! Throughout the crate, stacktraces are **leaf-first**: element 0 of a
//! location sequence is the innermost frame, the same order pprof uses for
//! `Sample.location_ids`.

mod hash;
pub mod normalizer;
pub mod resolver;
mod rewrite;
pub mod tree;

pub use hash::SampleHasher;
pub use normalizer::normalize;
pub use resolver::{resolve, ResolveOptions, Resolver, Symbols};
pub use tree::StacktraceTree;
