use snafu::ensure;

use crate::error::{ClientResult, UnknownIndexSnafu};

/// Label shown for the empty identifier ("chat without an index").
pub const NO_INDEX_LABEL: &str = "No Index";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexDescriptor {
    pub id: String,
    pub label: String,
}

impl IndexDescriptor {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }

    /// Labels a server-side identifier; the empty identifier becomes "No Index".
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        if id.is_empty() {
            Self::new(id, NO_INDEX_LABEL)
        } else {
            Self::new(id.clone(), id)
        }
    }
}

/// Known indexes plus the active one.
///
/// Identifiers are unique and keep insertion order. A non-empty active
/// identifier always names a known index. Every update consumes the selection
/// and returns the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSelection {
    indexes: Vec<IndexDescriptor>,
    active: String,
}

impl IndexSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = IndexDescriptor>) -> Self {
        Self::new().with_descriptors(descriptors)
    }

    pub fn indexes(&self) -> &[IndexDescriptor] {
        &self.indexes
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.indexes.iter().any(|descriptor| descriptor.id == id)
    }

    /// Active identifier, `None` while nothing (or the empty index) is selected.
    pub fn active(&self) -> Option<&str> {
        if self.active.is_empty() {
            None
        } else {
            Some(&self.active)
        }
    }

    pub fn active_label(&self) -> &str {
        self.indexes
            .iter()
            .find(|descriptor| descriptor.id == self.active)
            .map(|descriptor| descriptor.label.as_str())
            .unwrap_or(NO_INDEX_LABEL)
    }

    /// Replaces the known set with server truth. Duplicate identifiers keep the
    /// first occurrence; the active index survives only if it is still listed.
    pub fn with_descriptors(
        mut self,
        descriptors: impl IntoIterator<Item = IndexDescriptor>,
    ) -> Self {
        self.indexes.clear();
        for descriptor in descriptors {
            if !self.contains(&descriptor.id) {
                self.indexes.push(descriptor);
            }
        }

        if !self.active.is_empty() && !self.contains(&self.active) {
            tracing::debug!(
                active = %self.active,
                "active index no longer listed by the backend; clearing selection"
            );
            self.active.clear();
        }

        self
    }

    /// Appends `id` unless it is already known, then activates it.
    pub fn with_index(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !self.contains(&id) {
            self.indexes.push(IndexDescriptor::from_id(id.clone()));
        }
        self.active = id;
        self
    }

    pub fn select(mut self, id: &str) -> ClientResult<Self> {
        ensure!(
            id.is_empty() || self.contains(id),
            UnknownIndexSnafu {
                stage: "select-index",
                index_name: id.to_string(),
            }
        );
        self.active = id.to_string();
        Ok(self)
    }

    pub fn clear_active(mut self) -> Self {
        self.active.clear();
        self
    }

    pub fn without(mut self, id: &str) -> Self {
        self.indexes.retain(|descriptor| descriptor.id != id);
        if self.active == id {
            self.active.clear();
        }
        self
    }
}
