// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-place cleanup of decoded profiles.
//!
//! Normalization merges samples that share a call stack, drops samples
//! whose values are all zero, strips the redundant `"bytes"` allocation
//! label, and then garbage-collects every location, function, and string
//! that only the removed samples were keeping alive. Removal shifts the
//! surviving ids and string indices down so the tables stay dense.

use crate::hash::SampleHasher;
use datadog_pprof::{Profile, Sample};
use rustc_hash::FxHashSet;

/// Normalizes the profile in place:
///
/// - duplicate samples (same ordered `location_ids`) are merged, values
///   summed elementwise;
/// - samples whose values are all zero are dropped;
/// - labels keyed `"bytes"` with a non-zero `num` are dropped (the
///   per-allocation-site tag is meaningless once duplicates merge);
/// - locations, functions, and strings referenced only by removed samples
///   are cascade-deleted, and every surviving reference is shifted down
///   past the holes.
pub fn normalize(profile: &mut Profile) {
    let samples = std::mem::take(&mut profile.samples);
    let hashes = SampleHasher.hashes(&samples);
    let mut samples: Vec<(u64, Sample)> = hashes.into_iter().zip(samples).collect();
    // Sorting by hash groups duplicates; the sequence tiebreak keeps equal
    // stacks adjacent even across a hash collision.
    samples.sort_unstable_by(|a, b| {
        a.0.cmp(&b.0)
            .then_with(|| a.1.location_ids.cmp(&b.1.location_ids))
    });

    let mut kept = Vec::with_capacity(samples.len());
    let mut removed = Vec::new();
    for i in 0..samples.len() {
        // A duplicate folds its values into its successor, so the last of
        // a run carries the total.
        let duplicate_of_next = i + 1 < samples.len()
            && samples[i].0 == samples[i + 1].0
            && samples[i].1.location_ids == samples[i + 1].1.location_ids;
        if duplicate_of_next {
            let (left, right) = samples.split_at_mut(i + 1);
            let source = &left[i].1;
            let target = &mut right[0].1;
            for (target_value, source_value) in target.values.iter_mut().zip(&source.values) {
                *target_value += *source_value;
            }
            removed.push(std::mem::take(&mut samples[i].1));
            continue;
        }
        let sample = &mut samples[i].1;
        if sample.values.iter().all(|&value| value == 0) {
            removed.push(std::mem::take(sample));
            continue;
        }
        let string_table = &profile.string_table;
        sample.labels.retain(|label| {
            !(label.num != 0 && label.key != 0 && string_table[label.key as usize] == "bytes")
        });
        kept.push(std::mem::take(sample));
    }
    profile.samples = kept;

    clear_sample_references(profile, &removed);

    // Reference cleanup may have shifted location ids, which the hash
    // order above was computed from. A final canonical order keeps the
    // whole pass idempotent.
    profile.samples.sort_unstable();
}

/// Drops everything that only the removed samples referenced. Each stage
/// collects removal candidates, subtracts whatever the survivors still
/// reference, and deletes the rest; ids and indices above a deleted entry
/// shift down by the number of deletions below them.
fn clear_sample_references(profile: &mut Profile, removed: &[Sample]) {
    if removed.is_empty() {
        return;
    }

    let mut orphan_locations: FxHashSet<u64> = removed
        .iter()
        .flat_map(|sample| sample.location_ids.iter().copied())
        .collect();
    for sample in &profile.samples {
        for location_id in &sample.location_ids {
            orphan_locations.remove(location_id);
        }
    }
    if orphan_locations.is_empty() {
        return;
    }

    let mut removed_location_ids = Vec::with_capacity(orphan_locations.len());
    let mut orphan_functions: FxHashSet<u64> = FxHashSet::default();
    profile.locations.retain(|location| {
        if orphan_locations.contains(&location.id) {
            removed_location_ids.push(location.id);
            orphan_functions.extend(location.lines.iter().map(|line| line.function_id));
            return false;
        }
        true
    });
    removed_location_ids.sort_unstable();
    shift_ids(&removed_location_ids, profile.locations.iter_mut().map(|l| &mut l.id));
    for sample in &mut profile.samples {
        shift_ids(&removed_location_ids, sample.location_ids.iter_mut());
    }

    if orphan_functions.is_empty() {
        return;
    }
    for location in &profile.locations {
        for line in &location.lines {
            orphan_functions.remove(&line.function_id);
        }
    }

    let mut removed_function_ids = Vec::with_capacity(orphan_functions.len());
    let mut orphan_strings: FxHashSet<i64> = FxHashSet::default();
    profile.functions.retain(|function| {
        if orphan_functions.contains(&function.id) {
            removed_function_ids.push(function.id);
            orphan_strings.extend([function.name, function.system_name, function.filename]);
            return false;
        }
        true
    });
    removed_function_ids.sort_unstable();
    shift_ids(&removed_function_ids, profile.functions.iter_mut().map(|f| &mut f.id));
    for location in &mut profile.locations {
        shift_ids(
            &removed_function_ids,
            location.lines.iter_mut().map(|line| &mut line.function_id),
        );
    }

    if orphan_strings.is_empty() {
        return;
    }
    visit_all_name_references(profile, |reference| {
        orphan_strings.remove(reference);
    });
    // Index 0 is the empty string and stays that way.
    orphan_strings.remove(&0);
    if orphan_strings.is_empty() {
        return;
    }

    let mut removed_strings: Vec<i64> = orphan_strings.into_iter().collect();
    removed_strings.sort_unstable();

    let mut next = 0;
    let mut index = 0i64;
    profile.string_table.retain(|_| {
        let drop = next < removed_strings.len() && removed_strings[next] == index;
        if drop {
            next += 1;
        }
        index += 1;
        !drop
    });
    visit_all_name_references(profile, |reference| {
        *reference -= removed_strings.partition_point(|&r| r < *reference) as i64;
    });
}

fn shift_ids<'a>(removed: &[u64], ids: impl Iterator<Item = &'a mut u64>) {
    if removed.is_empty() {
        return;
    }
    for id in ids {
        *id -= removed.partition_point(|&r| r < *id) as u64;
    }
}

/// Visits every `int64` field that indexes the string table, exactly once
/// each. The set is load-bearing for string removal: a field missing here
/// would silently keep its stale index.
fn visit_all_name_references(profile: &mut Profile, mut visit: impl FnMut(&mut i64)) {
    visit(&mut profile.drop_frames);
    visit(&mut profile.keep_frames);
    if let Some(period_type) = &mut profile.period_type {
        visit(&mut period_type.r#type);
        visit(&mut period_type.unit);
    }
    for sample_type in &mut profile.sample_types {
        visit(&mut sample_type.r#type);
        visit(&mut sample_type.unit);
    }
    for mapping in &mut profile.mappings {
        visit(&mut mapping.filename);
        visit(&mut mapping.build_id);
    }
    for sample in &mut profile.samples {
        for label in &mut sample.labels {
            visit(&mut label.key);
            visit(&mut label.num);
            visit(&mut label.num_unit);
        }
    }
    for function in &mut profile.functions {
        visit(&mut function.name);
        visit(&mut function.system_name);
        visit(&mut function.filename);
    }
    for comment in &mut profile.comment {
        visit(comment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datadog_pprof::test_utils::{assert_valid, sorted_samples};
    use datadog_pprof::{Function, Label, Line, Location, Mapping, ValueType};

    fn location(id: u64, function_id: u64) -> Location {
        Location {
            id,
            mapping_id: 1,
            lines: vec![Line {
                function_id,
                line: 1,
            }],
            ..Default::default()
        }
    }

    fn function(id: u64, name: i64) -> Function {
        Function {
            id,
            name,
            system_name: name,
            filename: 1,
            ..Default::default()
        }
    }

    fn sample(location_ids: Vec<u64>, values: Vec<i64>) -> Sample {
        Sample {
            location_ids,
            values,
            labels: vec![],
        }
    }

    /// Locations 1..=4 over functions 1..=4, one mapping, distinct name
    /// strings, a sample type, and a period type.
    fn test_profile() -> Profile {
        Profile {
            sample_types: vec![ValueType { r#type: 2, unit: 3 }],
            period_type: Some(ValueType { r#type: 2, unit: 3 }),
            period: 100,
            mappings: vec![Mapping {
                id: 1,
                filename: 1,
                ..Default::default()
            }],
            locations: (1..=4).map(|id| location(id, id)).collect(),
            functions: (1..=4).map(|id| function(id, id as i64 + 3)).collect(),
            string_table: [
                "", "app.rb", "cpu", "nanoseconds", "one", "two", "three", "four",
            ]
            .map(String::from)
            .to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn merges_duplicates_and_drops_empty_samples() {
        let mut profile = test_profile();
        profile.samples = vec![
            sample(vec![1, 2], vec![3]),
            sample(vec![1, 2], vec![5]),
            sample(vec![3], vec![0]),
        ];

        normalize(&mut profile);

        assert_eq!(profile.samples.len(), 1);
        assert_eq!(profile.samples[0].location_ids, vec![1, 2]);
        assert_eq!(profile.samples[0].values, vec![8]);
        // Location 3 and function 3 were only referenced by the dropped
        // sample; location 4 was never referenced by any sample and stays.
        assert_eq!(profile.locations.len(), 3);
        assert_eq!(profile.functions.len(), 3);
        assert_valid(&profile);
        // "three" is gone and "four" shifted into its slot.
        assert!(profile.string_table.iter().all(|s| s != "three"));
        let last = profile.functions.last().unwrap();
        assert_eq!(profile.string_table[last.name as usize], "four");
    }

    #[test]
    fn merges_a_run_of_duplicates() {
        let mut profile = test_profile();
        profile.samples = vec![
            sample(vec![2, 1], vec![1, 10]),
            sample(vec![2, 1], vec![2, 20]),
            sample(vec![2, 1], vec![3, 30]),
        ];

        normalize(&mut profile);

        assert_eq!(profile.samples.len(), 1);
        assert_eq!(profile.samples[0].values, vec![6, 60]);
    }

    #[test]
    fn filters_bytes_labels() {
        let mut profile = test_profile();
        profile.string_table.push("bytes".to_string()); // 8
        profile.string_table.push("thread".to_string()); // 9
        profile.samples = vec![Sample {
            location_ids: vec![1],
            values: vec![10],
            labels: vec![
                Label {
                    key: 8,
                    num: 4096,
                    ..Default::default()
                },
                Label {
                    key: 9,
                    str: 2,
                    ..Default::default()
                },
            ],
        }];

        normalize(&mut profile);

        assert_eq!(profile.samples.len(), 1);
        assert_eq!(profile.samples[0].labels.len(), 1);
        assert_eq!(profile.samples[0].labels[0].key, 9);
        assert_valid(&profile);
    }

    #[test]
    fn keeps_bytes_labels_without_a_num() {
        let mut profile = test_profile();
        profile.string_table.push("bytes".to_string()); // 8
        profile.samples = vec![Sample {
            location_ids: vec![1],
            values: vec![10],
            labels: vec![Label {
                key: 8,
                str: 2,
                ..Default::default()
            }],
        }];

        normalize(&mut profile);

        assert_eq!(profile.samples[0].labels.len(), 1);
    }

    #[test]
    fn cascade_removes_location_function_and_string() {
        let mut profile = test_profile();
        profile.samples = vec![
            sample(vec![1], vec![5]),
            sample(vec![4], vec![0]),
        ];

        normalize(&mut profile);

        // The zero sample orphaned location 4 -> function 4 -> "four".
        assert_eq!(profile.samples.len(), 1);
        assert_eq!(profile.locations.len(), 3);
        assert_eq!(profile.functions.len(), 3);
        assert_eq!(profile.string_table.len(), 7);
        assert!(profile.string_table.iter().all(|s| s != "four"));
        // Untouched references still point at the same strings.
        assert_eq!(profile.string_table[profile.functions[0].name as usize], "one");
        assert_eq!(
            profile.string_table[profile.sample_types[0].r#type as usize],
            "cpu"
        );
        assert_valid(&profile);
    }

    #[test]
    fn shifts_ids_past_removed_entries() {
        let mut profile = test_profile();
        // Orphan location 2 (and function 2) while keeping 1, 3, 4 alive.
        profile.samples = vec![
            sample(vec![2], vec![0]),
            sample(vec![1], vec![1]),
            sample(vec![3], vec![1]),
            sample(vec![4], vec![1]),
        ];

        normalize(&mut profile);

        assert_eq!(profile.samples.len(), 3);
        assert_eq!(profile.locations.len(), 3);
        assert_eq!(profile.functions.len(), 3);
        assert_valid(&profile);
        // Old locations 3 and 4 are now ids 2 and 3, and the samples
        // followed; resolving through the tables lands on the same names.
        let names: Vec<&str> = sorted_samples(&profile)
            .iter()
            .map(|s| {
                let location = &profile.locations[s.location_ids[0] as usize - 1];
                let function = &profile.functions[location.lines[0].function_id as usize - 1];
                profile.string_table[function.name as usize].as_str()
            })
            .collect();
        assert_eq!(names, vec!["one", "three", "four"]);
    }

    #[test]
    fn spares_strings_still_referenced_elsewhere() {
        let mut profile = test_profile();
        // "four" (index 7) is also the profile's comment.
        profile.comment = vec![7];
        profile.samples = vec![sample(vec![1], vec![5]), sample(vec![4], vec![0])];

        normalize(&mut profile);

        assert_eq!(profile.locations.len(), 3);
        assert_eq!(profile.functions.len(), 3);
        // The string survives because of the comment reference.
        assert_eq!(profile.string_table.len(), 8);
        assert_eq!(profile.string_table[profile.comment[0] as usize], "four");
        assert_valid(&profile);
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut profile = test_profile();
        profile.samples = vec![
            sample(vec![1, 2], vec![3]),
            sample(vec![1, 2], vec![5]),
            sample(vec![3], vec![0]),
            sample(vec![4], vec![7]),
        ];

        normalize(&mut profile);
        let once = profile.clone();
        normalize(&mut profile);
        assert_eq!(profile, once);
    }

    #[test]
    fn empty_profile_is_untouched() {
        let mut profile = Profile {
            string_table: vec!["".into()],
            ..Default::default()
        };
        normalize(&mut profile);
        assert!(profile.samples.is_empty());
        assert_eq!(profile.string_table, vec![""]);
    }
}
