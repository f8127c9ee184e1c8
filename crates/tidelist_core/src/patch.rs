//! Partial-patch payloads for update changes.
//!
//! Incoming `data` payloads are partial: only the fields present in the
//! payload are applied, and an explicit `null` clears a nullable field. A
//! plain `Option<T>` cannot distinguish "key omitted" from "key set to
//! null", so patches use the three-state [`Field`] representation.

use crate::entity::{Category, Item, Priority, Space};
use crate::types::{DeviceId, EntityId, OwnerId, Timestamp};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One field of a partial patch: omitted, explicitly null, or set.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    /// The key was not present in the payload; leave the stored value alone.
    Absent,
    /// The key was present with an explicit `null`; clear the stored value.
    Null,
    /// The key was present with a value.
    Value(T),
}

// Not derived: the derive would bound `T: Default`.
impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Absent
    }
}

impl<T> Field<T> {
    /// Returns true if the key was omitted.
    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    /// Replaces `slot` when the patch carries a value. Explicit `null` is
    /// ignored for non-nullable fields.
    pub fn assign(self, slot: &mut T) {
        if let Field::Value(v) = self {
            *slot = v;
        }
    }

    /// Applies the patch to a nullable field.
    pub fn assign_opt(self, slot: &mut Option<T>) {
        match self {
            Field::Absent => {}
            Field::Null => *slot = None,
            Field::Value(v) => *slot = Some(v),
        }
    }

    /// Consumes the field, substituting `default` when no value was given.
    pub fn unwrap_or(self, default: T) -> T {
        match self {
            Field::Value(v) => v,
            _ => default,
        }
    }

    /// Converts to an `Option`, treating null and absent alike.
    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Field::Value(v),
            None => Field::Null,
        })
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // Absent fields should be skipped by the containing struct;
            // serializing one anyway degrades to null.
            Field::Absent | Field::Null => serializer.serialize_none(),
            Field::Value(v) => serializer.serialize_some(v),
        }
    }
}

/// Partial payload for a space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpacePatch {
    /// Display name.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub name: Field<String>,
    /// Icon name.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub icon: Field<String>,
    /// Accent color.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub color: Field<String>,
    /// Visibility flag.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub is_visible: Field<bool>,
    /// Manual sort position.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub order: Field<i64>,
}

/// Partial payload for a category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryPatch {
    /// Parent space reference.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub space_id: Field<EntityId>,
    /// Display name.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub name: Field<String>,
    /// Icon name.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub icon: Field<String>,
    /// Accent color.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub color: Field<String>,
    /// Visibility flag.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub is_visible: Field<bool>,
    /// Manual sort position.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub order: Field<i64>,
}

/// Partial payload for an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemPatch {
    /// Parent space reference.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub space_id: Field<EntityId>,
    /// Parent category reference.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub category_id: Field<EntityId>,
    /// Item title.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub title: Field<String>,
    /// Longer description.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub description: Field<String>,
    /// Free-form notes.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub notes: Field<String>,
    /// Completion flag.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub is_completed: Field<bool>,
    /// Completion timestamp.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub completed_at: Field<Timestamp>,
    /// Priority.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub priority: Field<Priority>,
    /// Manual sort position.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub order: Field<i64>,
    /// Free-form tags.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub tags: Field<Vec<String>>,
    /// Optional due date.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub due_date: Field<Timestamp>,
}

impl Space {
    /// Builds a new space from a create payload, filling defaults for
    /// omitted fields.
    pub fn create(
        id: EntityId,
        owner_id: OwnerId,
        device: DeviceId,
        timestamp: Timestamp,
        patch: SpacePatch,
    ) -> Self {
        Self {
            id,
            owner_id,
            name: patch.name.unwrap_or(String::new()),
            icon: patch.icon.unwrap_or("folder".into()),
            color: patch.color.unwrap_or("#6366f1".into()),
            is_visible: patch.is_visible.unwrap_or(true),
            order: patch.order.unwrap_or(0),
            last_writer_device: device,
            created_at: timestamp,
            updated_at: timestamp,
            deleted_at: None,
        }
    }

    /// Applies a partial patch, touching only the fields it carries.
    pub fn merge(&mut self, patch: SpacePatch, timestamp: Timestamp, device: DeviceId) {
        patch.name.assign(&mut self.name);
        patch.icon.assign(&mut self.icon);
        patch.color.assign(&mut self.color);
        patch.is_visible.assign(&mut self.is_visible);
        patch.order.assign(&mut self.order);
        self.updated_at = timestamp;
        self.last_writer_device = device;
    }

    /// Marks the space soft-deleted.
    pub fn tombstone(&mut self, timestamp: Timestamp, device: DeviceId) {
        self.deleted_at = Some(timestamp);
        self.updated_at = timestamp;
        self.last_writer_device = device;
    }
}

impl Category {
    /// Builds a new category from a create payload.
    pub fn create(
        id: EntityId,
        owner_id: OwnerId,
        device: DeviceId,
        timestamp: Timestamp,
        patch: CategoryPatch,
    ) -> Self {
        Self {
            id,
            owner_id,
            space_id: patch.space_id.into_option(),
            name: patch.name.unwrap_or(String::new()),
            icon: patch.icon.unwrap_or("list".into()),
            color: patch.color.unwrap_or("#8b5cf6".into()),
            is_visible: patch.is_visible.unwrap_or(true),
            order: patch.order.unwrap_or(0),
            last_writer_device: device,
            created_at: timestamp,
            updated_at: timestamp,
            deleted_at: None,
        }
    }

    /// Applies a partial patch, touching only the fields it carries.
    pub fn merge(&mut self, patch: CategoryPatch, timestamp: Timestamp, device: DeviceId) {
        patch.space_id.assign_opt(&mut self.space_id);
        patch.name.assign(&mut self.name);
        patch.icon.assign(&mut self.icon);
        patch.color.assign(&mut self.color);
        patch.is_visible.assign(&mut self.is_visible);
        patch.order.assign(&mut self.order);
        self.updated_at = timestamp;
        self.last_writer_device = device;
    }

    /// Marks the category soft-deleted.
    pub fn tombstone(&mut self, timestamp: Timestamp, device: DeviceId) {
        self.deleted_at = Some(timestamp);
        self.updated_at = timestamp;
        self.last_writer_device = device;
    }
}

impl Item {
    /// Builds a new item from a create payload.
    pub fn create(
        id: EntityId,
        owner_id: OwnerId,
        device: DeviceId,
        timestamp: Timestamp,
        patch: ItemPatch,
    ) -> Self {
        Self {
            id,
            owner_id,
            space_id: patch.space_id.into_option(),
            category_id: patch.category_id.into_option(),
            title: patch.title.unwrap_or(String::new()),
            description: patch.description.into_option(),
            notes: patch.notes.into_option(),
            is_completed: patch.is_completed.unwrap_or(false),
            completed_at: patch.completed_at.into_option(),
            priority: patch.priority.unwrap_or(Priority::Medium),
            order: patch.order.unwrap_or(0),
            tags: patch.tags.unwrap_or(Vec::new()),
            due_date: patch.due_date.into_option(),
            last_writer_device: device,
            created_at: timestamp,
            updated_at: timestamp,
            deleted_at: None,
        }
    }

    /// Applies a partial patch, touching only the fields it carries.
    pub fn merge(&mut self, patch: ItemPatch, timestamp: Timestamp, device: DeviceId) {
        patch.space_id.assign_opt(&mut self.space_id);
        patch.category_id.assign_opt(&mut self.category_id);
        patch.title.assign(&mut self.title);
        patch.description.assign_opt(&mut self.description);
        patch.notes.assign_opt(&mut self.notes);
        patch.is_completed.assign(&mut self.is_completed);
        patch.completed_at.assign_opt(&mut self.completed_at);
        patch.priority.assign(&mut self.priority);
        patch.order.assign(&mut self.order);
        patch.tags.assign(&mut self.tags);
        patch.due_date.assign_opt(&mut self.due_date);
        self.updated_at = timestamp;
        self.last_writer_device = device;
    }

    /// Marks the item soft-deleted.
    pub fn tombstone(&mut self, timestamp: Timestamp, device: DeviceId) {
        self.deleted_at = Some(timestamp);
        self.updated_at = timestamp;
        self.last_writer_device = device;
    }
}
