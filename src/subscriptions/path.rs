/// Subscription request parameters and their canonical path form
///
/// Requests name a remote data point by collection, item and optional field.
/// Sanitizing a request yields a `SubscriptionPath`, the key under which the
/// registry shares one `FieldSubscription` between every consumer.
use crate::errors::ValidationError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Raw request as written in configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionParams {
    #[serde(rename = "collectionID", default, deserialize_with = "deserialize_id", skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    #[serde(rename = "itemID", default, deserialize_with = "deserialize_id", skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(rename = "fieldID", default, deserialize_with = "deserialize_id", skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
}

impl SubscriptionParams {
    pub fn hash_field(collection_id: Option<&str>, item_id: &str, field_id: &str) -> Self {
        Self {
            collection_id: collection_id.map(str::to_string),
            item_id: Some(item_id.to_string()),
            field_id: Some(field_id.to_string()),
        }
    }

    pub fn item(collection_id: Option<&str>, item_id: &str) -> Self {
        Self {
            collection_id: collection_id.map(str::to_string),
            item_id: Some(item_id.to_string()),
            field_id: None,
        }
    }
}

/// IDs may be written as strings or numbers; null means absent
fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number ID, got {}",
            other
        ))),
    }
}

/// Whole item or a single field of a hashed item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionMode {
    Item { item_id: String },
    HashField { item_id: String, field_id: String },
}

/// Canonical subscription key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionPath {
    pub collection_id: String,
    pub mode: SubscriptionMode,
}

impl SubscriptionPath {
    /// Canonicalize `params`, filling in `default_collection_id` when the
    /// request names no collection
    pub fn sanitize(
        params: &SubscriptionParams,
        default_collection_id: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let collection_id = params
            .collection_id
            .as_deref()
            .or(default_collection_id)
            .ok_or(ValidationError::MissingCollectionId)?
            .to_string();

        let item_id = params
            .item_id
            .clone()
            .ok_or(ValidationError::MissingItemId)?;

        let mode = match &params.field_id {
            Some(field_id) => SubscriptionMode::HashField {
                item_id,
                field_id: field_id.clone(),
            },
            None => SubscriptionMode::Item { item_id },
        };

        Ok(Self { collection_id, mode })
    }

    pub fn item_id(&self) -> &str {
        match &self.mode {
            SubscriptionMode::Item { item_id } | SubscriptionMode::HashField { item_id, .. } => item_id,
        }
    }

    pub fn field_id(&self) -> Option<&str> {
        match &self.mode {
            SubscriptionMode::Item { .. } => None,
            SubscriptionMode::HashField { field_id, .. } => Some(field_id),
        }
    }

    /// "item" or "hash"
    pub fn kind(&self) -> &'static str {
        match self.mode {
            SubscriptionMode::Item { .. } => "item",
            SubscriptionMode::HashField { .. } => "hash",
        }
    }
}

impl std::fmt::Display for SubscriptionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.collection_id, self.kind(), self.item_id())?;
        if let Some(field_id) = self.field_id() {
            write!(f, "/{}", field_id)?;
        }
        Ok(())
    }
}
