//! Parent-reference resolution.
//!
//! Entity identifiers are minted by the creating client and globally stable,
//! so resolving a parent reference reduces to an existence/ownership check
//! against the store. A reference that does not resolve is dropped rather
//! than failing the change: the referenced parent may arrive later in the
//! same batch or in a future sync from another device, and an orphaned
//! ("uncategorized") entity is preferable to a rejected one.

use tidelist_core::{CategoryPatch, CoreResult, EntityId, Field, ItemPatch, OwnerId, SyncStore};

/// Checks parent references in incoming payloads against the store.
pub struct ReferenceResolver<'a> {
    store: &'a SyncStore,
}

impl<'a> ReferenceResolver<'a> {
    /// Creates a resolver over the given store.
    pub fn new(store: &'a SyncStore) -> Self {
        Self { store }
    }

    /// Drops a category payload's space reference if it does not resolve.
    pub fn sanitize_category(&self, owner: &OwnerId, patch: &mut CategoryPatch) -> CoreResult<()> {
        self.check(owner, &mut patch.space_id, RefKind::Space)
    }

    /// Drops an item payload's space/category references if they do not
    /// resolve. Each reference is checked independently.
    pub fn sanitize_item(&self, owner: &OwnerId, patch: &mut ItemPatch) -> CoreResult<()> {
        self.check(owner, &mut patch.space_id, RefKind::Space)?;
        self.check(owner, &mut patch.category_id, RefKind::Category)
    }

    fn check(
        &self,
        owner: &OwnerId,
        reference: &mut Field<EntityId>,
        kind: RefKind,
    ) -> CoreResult<()> {
        let Field::Value(id) = reference else {
            return Ok(());
        };

        let resolves = match kind {
            RefKind::Space => self.store.spaces().contains_live(owner, id)?,
            RefKind::Category => self.store.categories().contains_live(owner, id)?,
        };

        if !resolves {
            tracing::debug!(%owner, reference = %id, "dropping unresolved parent reference");
            *reference = Field::Null;
        }
        Ok(())
    }
}

enum RefKind {
    Space,
    Category,
}
