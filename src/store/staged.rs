//! Copy-on-write view of a lock table used by both store backends.

use super::LockTable;
use crate::types::{JobId, LockRecord, TargetId};
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

/// Uncommitted changes layered over a base table.
///
/// `None` in the overlay marks a deleted row. After `truncate` the base is
/// ignored entirely until commit.
#[derive(Debug)]
pub(super) struct Staged<B> {
    base: B,
    overlay: BTreeMap<TargetId, Option<LockRecord>>,
    truncated: bool,
}

impl<B: Deref<Target = LockTable>> Staged<B> {
    pub(super) fn new(base: B) -> Self {
        Self {
            base,
            overlay: BTreeMap::new(),
            truncated: false,
        }
    }

    pub(super) fn get(&self, target: &TargetId) -> Option<&LockRecord> {
        match self.overlay.get(target) {
            Some(staged) => staged.as_ref(),
            None if self.truncated => None,
            None => self.base.get(target),
        }
    }

    pub(super) fn select(&self, targets: &[TargetId]) -> Vec<LockRecord> {
        targets
            .iter()
            .filter_map(|t| self.get(t).cloned())
            .collect()
    }

    pub(super) fn upsert(&mut self, records: &[LockRecord]) {
        for record in records {
            self.overlay
                .insert(record.target.clone(), Some(record.clone()));
        }
    }

    pub(super) fn delete_where<F>(&mut self, targets: &[TargetId], pred: F) -> usize
    where
        F: Fn(&LockRecord) -> bool,
    {
        let mut deleted = 0;
        for target in targets {
            if self.get(target).is_some_and(&pred) {
                self.overlay.insert(target.clone(), None);
                deleted += 1;
            }
        }
        deleted
    }

    pub(super) fn delete_owned(&mut self, owner: JobId, targets: &[TargetId]) -> usize {
        self.delete_where(targets, |rec| rec.owner == owner)
    }

    pub(super) fn delete(&mut self, targets: &[TargetId]) -> usize {
        self.delete_where(targets, |_| true)
    }

    pub(super) fn scan(&self) -> Vec<LockRecord> {
        let mut merged: BTreeMap<&TargetId, &LockRecord> = BTreeMap::new();
        if !self.truncated {
            merged.extend(self.base.iter());
        }
        for (target, staged) in &self.overlay {
            match staged {
                Some(record) => {
                    merged.insert(target, record);
                }
                None => {
                    merged.remove(target);
                }
            }
        }
        merged.into_values().cloned().collect()
    }

    pub(super) fn truncate(&mut self) -> usize {
        let existing = self.scan().len();
        self.overlay.clear();
        self.truncated = true;
        existing
    }

    pub(super) fn is_dirty(&self) -> bool {
        self.truncated || !self.overlay.is_empty()
    }
}

impl<B: DerefMut<Target = LockTable>> Staged<B> {
    /// Fold the staged changes into the base and hand it back.
    pub(super) fn apply(mut self) -> B {
        if self.truncated {
            self.base.clear();
        }
        for (target, staged) in std::mem::take(&mut self.overlay) {
            match staged {
                Some(record) => {
                    self.base.insert(target, record);
                }
                None => {
                    self.base.remove(&target);
                }
            }
        }
        self.base
    }
}
