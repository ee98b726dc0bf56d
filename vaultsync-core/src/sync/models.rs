//! Sync data models: entity types, raw sync records and typed read models.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Type of syncable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Password,
    Folder,
    Share,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [Self::Password, Self::Folder, Self::Share];

    /// Convert entity type to its string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Folder => "folder",
            Self::Share => "share",
        }
    }

    /// Parse an entity type, accepting singular and plural forms.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "password" | "passwords" => Some(Self::Password),
            "folder" | "folders" => Some(Self::Folder),
            "share" | "shares" => Some(Self::Share),
            _ => None,
        }
    }

    /// JSON field carrying the version token of this entity type.
    pub fn version_field(&self) -> &'static str {
        match self {
            Self::Password | Self::Folder => "revision",
            Self::Share => "updated",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One remote entity as seen by reconciliation.
///
/// `version` is opaque: it is only ever compared for equality. `payload`
/// is the entity's JSON exactly as the server sent it; encrypted fields
/// stay encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRecord {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub version: String,
    pub payload: String,
}

impl SyncRecord {
    pub fn new(id: Uuid, entity_type: EntityType, version: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id,
            entity_type,
            version: version.into(),
            payload: payload.into(),
        }
    }

    /// Build a record from one element of a list response.
    pub fn from_json(entity_type: EntityType, item: &Value) -> Result<Self, String> {
        let id = item
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| format!("{} without id", entity_type))?;
        let id = Uuid::parse_str(id).map_err(|e| format!("Invalid {} id {}: {}", entity_type, id, e))?;

        let field = entity_type.version_field();
        let version = match item.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(format!("{} {} without {}", entity_type, id, field)),
        };

        Ok(Self {
            id,
            entity_type,
            version,
            payload: item.to_string(),
        })
    }
}

/// Encryption applied to an entity's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CseType {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "CSEv1r1")]
    CseV1r1,
}

/// A cached entity that may carry client-side encrypted fields.
pub trait Syncable: DeserializeOwned {
    const ENTITY_TYPE: EntityType;

    fn id(&self) -> Uuid;

    fn cse_type(&self) -> CseType;

    /// Keychain entry the encrypted fields were sealed with.
    fn cse_key(&self) -> &str;

    /// Encrypted field by its wire name.
    fn field(&self, name: &str) -> Option<&str>;

    /// Parse a cached payload.
    fn from_payload(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }

    /// Key id to decrypt with; empty when the entity is not encrypted.
    fn decryption_key(&self) -> &str {
        match self.cse_type() {
            CseType::None => "",
            CseType::CseV1r1 => self.cse_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Password {
    pub id: Uuid,
    pub revision: Uuid,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub custom_fields: String,
    #[serde(default)]
    pub folder: Option<Uuid>,
    #[serde(default)]
    pub cse_type: CseType,
    #[serde(default)]
    pub cse_key: String,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub trashed: bool,
    #[serde(default)]
    pub edited: i64,
}

impl Syncable for Password {
    const ENTITY_TYPE: EntityType = EntityType::Password;

    fn id(&self) -> Uuid {
        self.id
    }

    fn cse_type(&self) -> CseType {
        self.cse_type
    }

    fn cse_key(&self) -> &str {
        &self.cse_key
    }

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "label" => Some(&self.label),
            "username" => Some(&self.username),
            "password" => Some(&self.password),
            "url" => Some(&self.url),
            "notes" => Some(&self.notes),
            "customFields" | "custom_fields" => Some(&self.custom_fields),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: Uuid,
    pub revision: Uuid,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub parent: Option<Uuid>,
    #[serde(default)]
    pub cse_type: CseType,
    #[serde(default)]
    pub cse_key: String,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub trashed: bool,
}

impl Syncable for Folder {
    const ENTITY_TYPE: EntityType = EntityType::Folder;

    fn id(&self) -> Uuid {
        self.id
    }

    fn cse_type(&self) -> CseType {
        self.cse_type
    }

    fn cse_key(&self) -> &str {
        &self.cse_key
    }

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "label" => Some(&self.label),
            _ => None,
        }
    }
}

/// Share participant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShareUser {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A password shared between users. Shares are never client-side encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub id: Uuid,
    pub updated: i64,
    pub password: Uuid,
    #[serde(default)]
    pub owner: ShareUser,
    #[serde(default)]
    pub receiver: ShareUser,
    #[serde(default)]
    pub editable: bool,
    #[serde(default)]
    pub shareable: bool,
    #[serde(default)]
    pub expires: Option<i64>,
}

impl Syncable for Share {
    const ENTITY_TYPE: EntityType = EntityType::Share;

    fn id(&self) -> Uuid {
        self.id
    }

    fn cse_type(&self) -> CseType {
        CseType::None
    }

    fn cse_key(&self) -> &str {
        ""
    }

    fn field(&self, _name: &str) -> Option<&str> {
        None
    }
}
