// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Resolution of weighted stacktraces into a compact pprof profile.
//!
//! The resolver builds a [`StacktraceTree`] out of the inserted stacks,
//! cuts it down to the heaviest `max_nodes` nodes, emits one sample per
//! surviving leaf, and then copies just the referenced slices of the
//! symbol dictionaries into the profile, renumbering ids densely from 1.
//! Weight that fell below the floor is folded into a synthetic `"other"`
//! frame so the profile total stays intact.

use crate::rewrite::RewriteTable;
use crate::tree::{StacktraceTree, TRUNCATED};
use datadog_pprof::{Function, Line, Location, Mapping, Profile, Sample};

/// Name given to the stub frame that absorbs truncated weight.
const TRUNCATED_NODE_NAME: &str = "other";

/// Placeholder in `location_ids` for references that will be patched to
/// the stub location once it exists. Real ids are small, so the sentinel
/// can't collide.
const STUB_SENTINEL: u64 = u64::MAX;

pub const DEFAULT_MAX_NODES: usize = 16 << 10;

/// The symbol dictionaries a profile is resolved against.
///
/// All four tables are position-indexed, `entry.id == position`, and
/// position 0 holds the null entry (the empty string for `strings`).
/// Stack frames passed to [`Resolver::insert_stacktrace`] are indices into
/// `locations`; `mapping_id`, `function_id`, and the string fields inside
/// the entries are indices into their respective tables. The bundle is
/// read-only for the duration of a resolution.
#[derive(Clone, Debug, Default)]
pub struct Symbols {
    pub locations: Vec<Location>,
    pub functions: Vec<Function>,
    pub mappings: Vec<Mapping>,
    pub strings: Vec<String>,
}

#[derive(Clone, Copy, Debug)]
pub struct ResolveOptions {
    /// Upper bound on tree nodes kept before truncation. Zero truncates
    /// everything into a single `"other"` sample.
    pub max_nodes: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
        }
    }
}

/// Accumulates stacktraces and resolves them into a profile.
///
/// Stacks are supplied leaf-first through [`insert_stacktrace`]; each
/// insertion consumes the next entry of `values` as its weight. [`build`]
/// consumes the resolver and produces the profile.
///
/// [`insert_stacktrace`]: Resolver::insert_stacktrace
/// [`build`]: Resolver::build
pub struct Resolver<'a> {
    symbols: &'a Symbols,
    values: &'a [i64],
    tree: StacktraceTree,
    cursor: usize,
    max_nodes: usize,
    truncated: usize,
    rewrite: RewriteTable,
    profile: Profile,
}

impl<'a> Resolver<'a> {
    pub fn new(symbols: &'a Symbols, values: &'a [i64], options: ResolveOptions) -> Self {
        Self {
            symbols,
            values,
            tree: StacktraceTree::with_capacity(values.len() * 4),
            cursor: 0,
            max_nodes: options.max_nodes,
            truncated: 0,
            rewrite: RewriteTable::default(),
            profile: Profile::default(),
        }
    }

    /// Inserts one stacktrace. The id under which the caller knows the
    /// stack is irrelevant here; the weight comes from the value stream.
    pub fn insert_stacktrace(&mut self, _stacktrace_id: u32, locations: &[i32]) {
        self.tree.insert(locations, self.values[self.cursor]);
        self.cursor += 1;
    }

    pub fn build(mut self) -> Profile {
        let min_value = self.tree.min_value(self.max_nodes);
        self.truncated = self.tree.truncate(min_value);
        self.emit_samples();
        self.copy_locations();
        self.copy_functions();
        self.copy_mappings();
        self.copy_strings();
        if self.truncated > 0 {
            self.create_stub();
        }
        self.profile
    }

    /// Emits one sample per surviving leaf. A leaf whose whole path was
    /// truncated contributes to a single accumulator sample appended last;
    /// truncated tails inside longer paths keep the sentinel until the
    /// stub location exists.
    fn emit_samples(&mut self) {
        let nodes = self.tree.nodes();
        // The sample count is not known up front when branches were
        // truncated; the insertion count is the upper bound.
        let mut samples = Vec::with_capacity(self.cursor);
        let mut truncated_root = 0i64;
        let mut path = Vec::with_capacity(64);
        for index in 1..nodes.len() {
            let node = &nodes[index];
            if node.first_child > 0 {
                // Not a leaf.
                continue;
            }
            if nodes[node.parent as usize].location == TRUNCATED {
                // Inside a truncated branch; its weight is carried by the
                // marked ancestor.
                continue;
            }
            self.tree.resolve(&mut path, index as u32);
            if path.len() == 1 && path[0] == TRUNCATED {
                truncated_root += node.value;
                continue;
            }
            let location_ids = path
                .iter()
                .map(|&location| {
                    if location == TRUNCATED {
                        STUB_SENTINEL
                    } else {
                        location as u64
                    }
                })
                .collect();
            samples.push(Sample {
                location_ids,
                values: vec![node.value],
                labels: vec![],
            });
        }
        if truncated_root > 0 {
            samples.push(Sample {
                location_ids: vec![STUB_SENTINEL],
                values: vec![truncated_root],
                labels: vec![],
            });
        }
        self.profile.samples = samples;
    }

    fn copy_locations(&mut self) {
        let mut table: Vec<Option<Location>> = vec![None; self.symbols.locations.len()];
        for node in &self.tree.nodes()[1..] {
            if node.location < 0 {
                continue;
            }
            let index = node.location as usize;
            if table[index].is_none() {
                table[index] = Some(self.symbols.locations[index].clone());
            }
        }
        self.profile.locations = self.rewrite.compact(table);
        for sample in &mut self.profile.samples {
            for location_id in &mut sample.location_ids {
                if *location_id != STUB_SENTINEL {
                    *location_id = self.rewrite.lookup(*location_id);
                }
            }
        }
    }

    fn copy_functions(&mut self) {
        let mut table: Vec<Option<Function>> = vec![None; self.symbols.functions.len()];
        for location in &self.profile.locations {
            for line in &location.lines {
                let index = line.function_id as usize;
                if table[index].is_none() {
                    table[index] = Some(self.symbols.functions[index]);
                }
            }
        }
        self.profile.functions = self.rewrite.compact(table);
        for location in &mut self.profile.locations {
            for line in &mut location.lines {
                line.function_id = self.rewrite.lookup(line.function_id);
            }
        }
    }

    fn copy_mappings(&mut self) {
        let mut table: Vec<Option<Mapping>> = vec![None; self.symbols.mappings.len()];
        for location in &self.profile.locations {
            let index = location.mapping_id as usize;
            if table[index].is_none() {
                table[index] = Some(self.symbols.mappings[index]);
            }
        }
        self.profile.mappings = self.rewrite.compact(table);
        for location in &mut self.profile.locations {
            location.mapping_id = self.rewrite.lookup(location.mapping_id);
        }
    }

    /// Strings run last: they are reached through mappings and functions,
    /// and both tables are final by now.
    fn copy_strings(&mut self) {
        let mut table = vec![String::new(); self.symbols.strings.len().max(1)];
        for mapping in &self.profile.mappings {
            for index in [mapping.filename, mapping.build_id] {
                if index != 0 && table[index as usize].is_empty() {
                    table[index as usize] = self.symbols.strings[index as usize].clone();
                }
            }
        }
        for function in &self.profile.functions {
            for index in [function.name, function.system_name, function.filename] {
                if index != 0 && table[index as usize].is_empty() {
                    table[index as usize] = self.symbols.strings[index as usize].clone();
                }
            }
        }
        self.profile.string_table = self.rewrite.compact_strings(table);
        for mapping in &mut self.profile.mappings {
            mapping.filename = self.rewrite.lookup(mapping.filename as u64) as i64;
            mapping.build_id = self.rewrite.lookup(mapping.build_id as u64) as i64;
        }
        for function in &mut self.profile.functions {
            function.name = self.rewrite.lookup(function.name as u64) as i64;
            function.system_name = self.rewrite.lookup(function.system_name as u64) as i64;
            function.filename = self.rewrite.lookup(function.filename as u64) as i64;
        }
    }

    /// Appends the `"other"` string, function, and location, and patches
    /// every sentinel reference to the new location.
    fn create_stub(&mut self) {
        let name = self.profile.string_table.len() as i64;
        self.profile.string_table.push(TRUNCATED_NODE_NAME.into());
        let function = Function {
            id: self.profile.functions.len() as u64 + 1,
            name,
            system_name: name,
            ..Default::default()
        };
        let stub_function_id = function.id;
        self.profile.functions.push(function);
        let location = Location {
            id: self.profile.locations.len() as u64 + 1,
            // The stub hangs off the first mapping; a fully truncated
            // profile has none, and then the stub carries no mapping.
            mapping_id: if self.profile.mappings.is_empty() { 0 } else { 1 },
            lines: vec![Line {
                function_id: stub_function_id,
                line: 0,
            }],
            ..Default::default()
        };
        let stub_location_id = location.id;
        self.profile.locations.push(location);
        for sample in &mut self.profile.samples {
            for location_id in &mut sample.location_ids {
                if *location_id == STUB_SENTINEL {
                    *location_id = stub_location_id;
                }
            }
        }
    }
}

/// Resolves a batch of stacktraces in one call.
pub fn resolve<'s, I>(
    symbols: &Symbols,
    stacktraces: I,
    values: &[i64],
    options: ResolveOptions,
) -> Profile
where
    I: IntoIterator<Item = &'s [i32]>,
{
    let mut resolver = Resolver::new(symbols, values, options);
    for (stacktrace_id, locations) in stacktraces.into_iter().enumerate() {
        resolver.insert_stacktrace(stacktrace_id as u32, locations);
    }
    resolver.build()
}
