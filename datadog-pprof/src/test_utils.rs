// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helpers shared by the test suites of this crate's dependents. Not for
//! production use.

use crate::proto::{Profile, Sample};

pub fn sorted_samples(profile: &Profile) -> Vec<Sample> {
    let mut samples = profile.samples.clone();
    samples.sort_unstable();
    samples
}

#[allow(clippy::panic)]
pub fn string_table_fetch(profile: &Profile, id: i64) -> &String {
    profile
        .string_table
        .get(id as usize)
        .unwrap_or_else(|| panic!("string {id} not found"))
}

/// Asserts the referential-integrity invariants every emitted profile has
/// to satisfy: dense 1-based ids, in-range cross-references (`mapping_id`
/// 0 is the legal "no mapping" reference), in-range string indices, and an
/// empty string at index 0.
#[allow(clippy::panic)]
pub fn assert_valid(profile: &Profile) {
    let n_locations = profile.locations.len() as u64;
    let n_functions = profile.functions.len() as u64;
    let n_mappings = profile.mappings.len() as u64;
    let n_strings = profile.string_table.len() as i64;

    let check_string = |idx: i64, what: &str| {
        assert!(
            (0..n_strings).contains(&idx),
            "{what}: string index {idx} out of range (table len {n_strings})"
        );
    };

    assert_eq!(profile.string_table.first().map(String::as_str), Some(""));

    for (i, location) in profile.locations.iter().enumerate() {
        assert_eq!(location.id, i as u64 + 1, "location ids must be dense");
        assert!(
            location.mapping_id <= n_mappings,
            "location {} references mapping {} of {}",
            location.id,
            location.mapping_id,
            n_mappings
        );
        for line in &location.lines {
            assert!(
                (1..=n_functions).contains(&line.function_id),
                "location {} references function {} of {}",
                location.id,
                line.function_id,
                n_functions
            );
        }
    }

    for (i, function) in profile.functions.iter().enumerate() {
        assert_eq!(function.id, i as u64 + 1, "function ids must be dense");
        check_string(function.name, "function.name");
        check_string(function.system_name, "function.system_name");
        check_string(function.filename, "function.filename");
    }

    for (i, mapping) in profile.mappings.iter().enumerate() {
        assert_eq!(mapping.id, i as u64 + 1, "mapping ids must be dense");
        check_string(mapping.filename, "mapping.filename");
        check_string(mapping.build_id, "mapping.build_id");
    }

    for sample in &profile.samples {
        for &location_id in &sample.location_ids {
            assert!(
                (1..=n_locations).contains(&location_id),
                "sample references location {location_id} of {n_locations}"
            );
        }
        for label in &sample.labels {
            check_string(label.key, "label.key");
            check_string(label.str, "label.str");
            check_string(label.num_unit, "label.num_unit");
        }
    }

    for sample_type in &profile.sample_types {
        check_string(sample_type.r#type, "sample_type.type");
        check_string(sample_type.unit, "sample_type.unit");
    }
    if let Some(period_type) = &profile.period_type {
        check_string(period_type.r#type, "period_type.type");
        check_string(period_type.unit, "period_type.unit");
    }
    for &comment in &profile.comment {
        check_string(comment, "comment");
    }
}
