use std::collections::BTreeSet;

use crate::ChapterId;

/// Set of chapter ids whose content is already merged into the output.
///
/// Backed by a `BTreeSet` so the persisted form is sorted and stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSet {
    ids: BTreeSet<ChapterId>,
}

impl ProgressSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Adds an id; returns `false` when it was already present.
    pub fn insert(&mut self, id: impl Into<ChapterId>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChapterId> {
        self.ids.iter()
    }

    /// Ids in ascending order, the persisted representation.
    pub fn to_sorted_vec(&self) -> Vec<ChapterId> {
        self.ids.iter().cloned().collect()
    }
}

impl FromIterator<ChapterId> for ProgressSet {
    fn from_iter<I: IntoIterator<Item = ChapterId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl Extend<ChapterId> for ProgressSet {
    fn extend<I: IntoIterator<Item = ChapterId>>(&mut self, iter: I) {
        self.ids.extend(iter);
    }
}

/// Plain set union; merging an id that is already present is a no-op.
pub fn merge<I>(existing: &ProgressSet, new_ids: I) -> ProgressSet
where
    I: IntoIterator<Item = ChapterId>,
{
    let mut merged = existing.clone();
    merged.extend(new_ids);
    merged
}
