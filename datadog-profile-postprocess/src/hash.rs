// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use datadog_pprof::Sample;
use rustc_hash::FxHasher;
use std::hash::Hasher;

/// Hashes samples by their ordered `location_ids` sequence.
///
/// The hash identifies a call stack, nothing else: values and labels don't
/// contribute. Hasher state is reset for every sample, so equal sequences
/// hash equal no matter where they sit in the input. Callers that merge on
/// equal hashes still compare the sequences themselves; a collision only
/// costs a comparison.
#[derive(Default)]
pub struct SampleHasher;

impl SampleHasher {
    /// One hash per input sample, in input order.
    pub fn hashes(&self, samples: &[Sample]) -> Vec<u64> {
        samples.iter().map(Self::hash_sample).collect()
    }

    fn hash_sample(sample: &Sample) -> u64 {
        let mut hasher = FxHasher::default();
        for &location_id in &sample.location_ids {
            hasher.write_u64(location_id);
        }
        hasher.finish()
    }
}
