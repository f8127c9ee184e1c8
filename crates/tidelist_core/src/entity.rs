//! The three replicated entity kinds and their shared metadata.

use crate::types::{DeviceId, EntityId, OwnerId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a replicated entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Top-level container.
    Space,
    /// Grouping inside a space.
    Category,
    /// A single list entry.
    Item,
}

impl EntityKind {
    /// Returns the wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Space => "space",
            EntityKind::Category => "category",
            EntityKind::Item => "item",
        }
    }

    /// Parses a wire name into a kind.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "space" => Some(EntityKind::Space),
            "category" => Some(EntityKind::Category),
            "item" => Some(EntityKind::Item),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation intent submitted by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create a new entity.
    Create,
    /// Patch an existing entity.
    Update,
    /// Soft-delete an entity.
    Delete,
}

impl Operation {
    /// Returns the wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Parses a wire name into an operation.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "create" => Some(Operation::Create),
            "update" => Some(Operation::Update),
            "delete" => Some(Operation::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority.
    Low,
    /// Default priority.
    #[default]
    Medium,
    /// High priority.
    High,
}

/// Access to the replication metadata every entity kind carries.
///
/// The entity stores are generic over this trait; it is the seam that lets
/// one store implementation serve all three kinds.
pub trait Replicated: Clone {
    /// The entity's immutable, client-minted identifier.
    fn id(&self) -> &EntityId;
    /// The owning account.
    fn owner(&self) -> &OwnerId;
    /// Logical timestamp of the current version.
    fn updated_at(&self) -> Timestamp;
    /// Tombstone timestamp, if soft-deleted.
    fn deleted_at(&self) -> Option<Timestamp>;

    /// Returns true if the entity is live (not tombstoned).
    fn is_live(&self) -> bool {
        self.deleted_at().is_none()
    }
}

macro_rules! impl_replicated {
    ($ty:ty) => {
        impl Replicated for $ty {
            fn id(&self) -> &EntityId {
                &self.id
            }
            fn owner(&self) -> &OwnerId {
                &self.owner_id
            }
            fn updated_at(&self) -> Timestamp {
                self.updated_at
            }
            fn deleted_at(&self) -> Option<Timestamp> {
                self.deleted_at
            }
        }
    };
}

/// A top-level container of categories and items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Space {
    /// Client-minted identifier.
    pub id: EntityId,
    /// Owning account.
    pub owner_id: OwnerId,
    /// Display name.
    pub name: String,
    /// Icon name.
    pub icon: String,
    /// Accent color, as a CSS hex string.
    pub color: String,
    /// Whether the space is shown in the client UI.
    pub is_visible: bool,
    /// Manual sort position.
    pub order: i64,
    /// Device that produced the current version.
    pub last_writer_device: DeviceId,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Logical timestamp of the current version.
    pub updated_at: Timestamp,
    /// Tombstone timestamp; non-null means soft-deleted.
    pub deleted_at: Option<Timestamp>,
}

impl_replicated!(Space);

/// A grouping of items inside a space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// Client-minted identifier.
    pub id: EntityId,
    /// Owning account.
    pub owner_id: OwnerId,
    /// Parent space, if resolved; `None` means uncategorized.
    pub space_id: Option<EntityId>,
    /// Display name.
    pub name: String,
    /// Icon name.
    pub icon: String,
    /// Accent color, as a CSS hex string.
    pub color: String,
    /// Whether the category is shown in the client UI.
    pub is_visible: bool,
    /// Manual sort position.
    pub order: i64,
    /// Device that produced the current version.
    pub last_writer_device: DeviceId,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Logical timestamp of the current version.
    pub updated_at: Timestamp,
    /// Tombstone timestamp; non-null means soft-deleted.
    pub deleted_at: Option<Timestamp>,
}

impl_replicated!(Category);

/// A single list entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Client-minted identifier.
    pub id: EntityId,
    /// Owning account.
    pub owner_id: OwnerId,
    /// Parent space, if resolved.
    pub space_id: Option<EntityId>,
    /// Parent category, if resolved; `None` means uncategorized.
    pub category_id: Option<EntityId>,
    /// Item title.
    pub title: String,
    /// Longer description.
    pub description: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Completion flag.
    pub is_completed: bool,
    /// When the item was completed.
    pub completed_at: Option<Timestamp>,
    /// Priority.
    pub priority: Priority,
    /// Manual sort position.
    pub order: i64,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Optional due date.
    pub due_date: Option<Timestamp>,
    /// Device that produced the current version.
    pub last_writer_device: DeviceId,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Logical timestamp of the current version.
    pub updated_at: Timestamp,
    /// Tombstone timestamp; non-null means soft-deleted.
    pub deleted_at: Option<Timestamp>,
}

impl_replicated!(Item);
