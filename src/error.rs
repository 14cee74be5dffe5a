//! Error taxonomy for list building, sealing and diff submission.
//!
//! Every variant is a precondition violation by the calling code: the
//! operation is rejected synchronously and nothing is partially applied.
//! Superseded diff generations are NOT errors and never surface here.

/// Errors returned by items, property bags, adapters and controllers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListError {
    /// Two items of one submitted list share an id
    DuplicateId {
        id: i64,
        first: usize,
        second: usize,
    },
    /// Item admitted with id 0
    IdNotSet,
    /// Mutation of a sealed item or property bag
    Sealed { key: Option<String> },
    /// Unsealed item handed to an adapter
    NotSealed { id: i64 },
    /// `add()` called outside of an active build pass
    NotBuilding,
    /// Build requested while a build pass is running
    BuildInProgress,
    /// Required property read (or sealed) without ever being set
    MissingProperty { key: String },
    /// Stored value cannot be read as the requested type
    PropertyType { key: String, expected: &'static str },
    /// Position outside of the live list
    IndexOutOfBounds { index: usize, len: usize },
    /// User builder callback failed or panicked
    Builder(String),
}

impl std::fmt::Display for ListError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListError::DuplicateId { id, first, second } => {
                write!(f, "Duplicated id {} at positions {} and {}", id, first, second)
            }
            ListError::IdNotSet => write!(f, "Item id must be set (non-zero) before it is added"),
            ListError::Sealed { key: Some(key) } => {
                write!(f, "Cannot change property '{}' of an added item", key)
            }
            ListError::Sealed { key: None } => write!(f, "Cannot change an added item"),
            ListError::NotSealed { id } => {
                write!(f, "Item {} was not sealed before being submitted", id)
            }
            ListError::NotBuilding => write!(f, "Cannot add items outside of a build pass"),
            ListError::BuildInProgress => {
                write!(f, "Cannot request a build from inside a build pass")
            }
            ListError::MissingProperty { key } => write!(
                f,
                "Missing property with key '{}', use an optional property for optional values",
                key
            ),
            ListError::PropertyType { key, expected } => {
                write!(f, "Property '{}' is not a {}", key, expected)
            }
            ListError::IndexOutOfBounds { index, len } => {
                write!(f, "Index {} out of bounds (len {})", index, len)
            }
            ListError::Builder(msg) => write!(f, "Item builder failed: {}", msg),
        }
    }
}

impl std::error::Error for ListError {}

pub type Result<T> = std::result::Result<T, ListError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_property_names_key() {
        let err = ListError::MissingProperty { key: "title".into() };
        let msg = err.to_string();
        assert!(msg.contains("'title'"));
        assert!(msg.contains("optional"));
    }

    #[test]
    fn test_duplicate_id_message() {
        let err = ListError::DuplicateId { id: 7, first: 0, second: 3 };
        assert_eq!(err.to_string(), "Duplicated id 7 at positions 0 and 3");
    }
}
