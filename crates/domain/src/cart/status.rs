//! Cart lifecycle.

use serde::{Deserialize, Serialize};

/// The state of a cart in its lifecycle.
///
/// ```text
/// Active ──┬──► Converted   (an order was created from it)
///          ├──► Merged      (folded into the owner's other cart)
///          └──► Abandoned   (idle sweep)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    #[default]
    Active,
    Abandoned,
    Converted,
    Merged,
}

impl CartStatus {
    /// Returns true if items can be modified in this state.
    pub fn can_modify(&self) -> bool {
        matches!(self, CartStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Active => "active",
            CartStatus::Abandoned => "abandoned",
            CartStatus::Converted => "converted",
            CartStatus::Merged => "merged",
        }
    }

    /// Parses the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(CartStatus::Active),
            "abandoned" => Some(CartStatus::Abandoned),
            "converted" => Some(CartStatus::Converted),
            "merged" => Some(CartStatus::Merged),
            _ => None,
        }
    }
}

impl std::fmt::Display for CartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
