//! Shared domain models.

use std::{fmt, fs, path::Path};

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;

/// Server-assigned card identifier.
///
/// Multipart-backed servers are inconsistent about whether ids are numbers or
/// strings, so both are accepted on the wire and normalised to text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CardId(String);

impl CardId {
    /// Wrap a raw identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the identifier as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CardId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(text) if !text.trim().is_empty() => {
                Ok(CardId(text.trim().to_string()))
            }
            serde_json::Value::Number(number) => Ok(CardId(number.to_string())),
            other => Err(de::Error::custom(format!("invalid card id {other}"))),
        }
    }
}

/// A card as stored on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// Identifier assigned by the server.
    pub id: CardId,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Cost to upgrade the card.
    #[serde(default, deserialize_with = "lenient_cost")]
    pub upgrade_cost: u64,
    /// Server-side reference to the stored image, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

fn lenient_cost<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => return Ok(0),
        serde_json::Value::Number(number) => {
            number.as_u64().or_else(|| number.as_f64().and_then(whole_cost))
        }
        serde_json::Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(0);
            }
            trimmed
                .parse::<u64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(whole_cost))
        }
        other => return Err(de::Error::custom(format!("invalid upgrade cost {other}"))),
    };
    parsed.ok_or_else(|| de::Error::custom("invalid upgrade cost"))
}

/// Fractional costs are truncated toward zero; negative or non-finite ones are rejected.
fn whole_cost(value: f64) -> Option<u64> {
    (value.is_finite() && value >= 0.0).then(|| value.trunc() as u64)
}

/// Local file selected for upload alongside a card.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    /// File name reported to the server.
    pub file_name: String,
    /// MIME type of the payload.
    pub content_type: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    /// Build an attachment from in-memory bytes, inferring the content type from the name.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = content_type_for(&file_name).to_string();
        Self {
            file_name,
            content_type,
            bytes,
        }
    }

    /// Read an attachment from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("failed to read image {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow::anyhow!("invalid image file name {}", path.display()))?;
        Ok(Self::new(file_name, bytes))
    }
}

impl fmt::Debug for ImageAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAttachment")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn content_type_for(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// The single working copy edited through the card dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardDraft {
    /// Display name being edited.
    pub name: String,
    /// Description being edited.
    pub description: String,
    /// Upgrade cost; `None` when the field has been cleared.
    pub upgrade_cost: Option<u64>,
    /// Newly selected image, replacing the stored one on save.
    pub image: Option<ImageAttachment>,
}

impl Default for CardDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            upgrade_cost: Some(0),
            image: None,
        }
    }
}

impl CardDraft {
    /// Check the mandatory fields and produce the payload to send.
    pub fn to_form(&self) -> Result<CardForm, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }
        if self.description.trim().is_empty() {
            return Err(ValidationError::MissingDescription);
        }
        let upgrade_cost = self
            .upgrade_cost
            .ok_or(ValidationError::MissingUpgradeCost)?;
        Ok(CardForm {
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            upgrade_cost,
            image: self.image.clone(),
        })
    }
}

impl From<&Card> for CardDraft {
    fn from(card: &Card) -> Self {
        Self {
            name: card.name.clone(),
            description: card.description.clone(),
            upgrade_cost: Some(card.upgrade_cost),
            image: None,
        }
    }
}

/// Validated payload sent to the create and update endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardForm {
    /// Card name.
    pub name: String,
    /// Card description.
    pub description: String,
    /// Upgrade cost.
    pub upgrade_cost: u64,
    /// Optional replacement image.
    pub image: Option<ImageAttachment>,
}
