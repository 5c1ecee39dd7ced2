//! Catalog item references.
//!
//! Items live in two independent namespaces (resources and articles). A grant on
//! a resource never implies anything about an article with the same id.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::ItemId;
use crate::value_object::ValueObject;

/// Namespace of a catalog item.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Resource,
    Article,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Resource => "resource",
            ItemKind::Article => "article",
        }
    }
}

impl FromStr for ItemKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "resource" => Ok(ItemKind::Resource),
            "article" => Ok(ItemKind::Article),
            other => Err(DomainError::validation(format!(
                "item kind must be one of: resource, article (got '{other}')"
            ))),
        }
    }
}

/// Reference to exactly one catalog item: a resource XOR an article.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ItemRef {
    Resource(ItemId),
    Article(ItemId),
}

impl ItemRef {
    pub fn new(kind: ItemKind, id: ItemId) -> Self {
        match kind {
            ItemKind::Resource => ItemRef::Resource(id),
            ItemKind::Article => ItemRef::Article(id),
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            ItemRef::Resource(_) => ItemKind::Resource,
            ItemRef::Article(_) => ItemKind::Article,
        }
    }

    pub fn id(&self) -> ItemId {
        match self {
            ItemRef::Resource(id) | ItemRef::Article(id) => *id,
        }
    }
}

impl ValueObject for ItemRef {}

impl core::fmt::Display for ItemRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.id())
    }
}

/// Parses the `kind:uuid` form produced by `Display`.
impl FromStr for ItemRef {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| DomainError::validation(format!("item reference '{s}' must be kind:id")))?;
        Ok(ItemRef::new(kind.parse()?, id.parse()?))
    }
}

/// Read-only view of a catalog entry, owned by the catalog collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ItemId,
    pub kind: ItemKind,
    pub gated: bool,
}

impl CatalogItem {
    pub fn item_ref(&self) -> ItemRef {
        ItemRef::new(self.kind, self.id)
    }
}
