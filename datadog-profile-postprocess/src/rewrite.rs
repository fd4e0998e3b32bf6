// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Compaction of sparse dictionary tables.
//!
//! Resolution materializes dictionary entries at their original positions,
//! leaving holes for everything unreferenced. A compaction pass packs the
//! survivors into low positions, keeping relative order, and records the
//! old-index → new-index translation so references can be rewritten.

use datadog_pprof::{Function, Location, Mapping};

/// An entry whose `id` field is assigned during compaction.
pub trait Reindex {
    fn set_id(&mut self, id: u64);
}

impl Reindex for Location {
    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

impl Reindex for Function {
    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

impl Reindex for Mapping {
    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

/// The translation vector of the most recent compaction pass. One instance
/// is reused for all passes of a resolution; only the first pass pays for
/// the allocation.
#[derive(Default)]
pub struct RewriteTable {
    table: Vec<u32>,
}

impl RewriteTable {
    /// Packs the occupied slots of `entries` into a dense vector. Survivors
    /// get `id = position + 1`; the translation maps their old index to
    /// that id and every absent slot to 0.
    pub fn compact<T: Reindex>(&mut self, entries: Vec<Option<T>>) -> Vec<T> {
        self.table.clear();
        self.table.resize(entries.len() + 1, 0);
        let mut survivors = Vec::new();
        for (old, slot) in entries.into_iter().enumerate() {
            if let Some(mut entry) = slot {
                let id = survivors.len() as u64 + 1;
                entry.set_id(id);
                self.table[old] = id as u32;
                survivors.push(entry);
            }
        }
        survivors
    }

    /// String-table variant: slot 0 always survives as the empty string,
    /// an empty string anywhere else marks an absent slot, and the
    /// translation is 0-based because string indices are.
    pub fn compact_strings(&mut self, entries: Vec<String>) -> Vec<String> {
        self.table.clear();
        self.table.resize(entries.len() + 1, 0);
        let mut survivors = Vec::new();
        for (old, entry) in entries.into_iter().enumerate() {
            if old != 0 && entry.is_empty() {
                continue;
            }
            self.table[old] = survivors.len() as u32;
            survivors.push(entry);
        }
        survivors
    }

    /// Translates an old index. For [`compact`]ed tables the result is a
    /// 1-based id, for [`compact_strings`] a 0-based index.
    ///
    /// [`compact`]: RewriteTable::compact
    /// [`compact_strings`]: RewriteTable::compact_strings
    pub fn lookup(&self, old: u64) -> u64 {
        self.table[old as usize] as u64
    }
}
