use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(RecordId);
id_newtype!(Barcode);

impl Barcode {
    /// Trims surrounding whitespace; returns `None` for an empty code.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Add,
    Subtract,
}

impl AdjustmentKind {
    pub fn verb(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
        }
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            Self::Add => "added",
            Self::Subtract => "subtracted",
        }
    }
}

/// Inventory row as held by the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub barcode: Barcode,
    pub name: String,
    pub quantity: u32,
    pub color: String,
    pub size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Operator-entered product fields for a barcode the store does not know yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub name: String,
    pub color: String,
    pub size: String,
}

impl ProductDetails {
    pub fn new(
        name: impl Into<String>,
        color: impl Into<String>,
        size: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            size: size.into(),
        }
    }

    pub fn trimmed(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            color: self.color.trim().to_string(),
            size: self.size.trim().to_string(),
        }
    }
}

/// Field set written when a new product is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub barcode: Barcode,
    pub details: ProductDetails,
    pub quantity: u32,
    pub last_updated: DateTime<Utc>,
}

/// Field set written when an existing product changes quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityUpdate {
    pub quantity: u32,
    pub last_updated: DateTime<Utc>,
}
