//! Common query parameter structs for pagination and filtering.

use serde::{Deserialize, Deserializer, Serialize};

/// Distinguishes an absent JSON field (outer None) from an explicit null
/// (inner None) in PATCH bodies. Use with `#[serde(default)]`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Helper to deserialize numbers from query string (which are always strings)
pub fn deserialize_from_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr + Default,
    T::Err: std::fmt::Display,
{
    use serde::de::Error;
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if !s.is_empty() => s.parse().map_err(D::Error::custom),
        _ => Ok(T::default()),
    }
}

/// Helper to deserialize optional numbers from query string
pub fn deserialize_option_from_str<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    use serde::de::Error;
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if !s.is_empty() => s.parse().map(Some).map_err(D::Error::custom),
        _ => Ok(None),
    }
}

/// Offset-based pagination for list endpoints (scenarios, executions, bugs).
#[derive(Debug, Deserialize, Clone)]
pub struct PaginationParams {
    /// Max items to return (default: 50, capped at 100)
    #[serde(default = "default_limit", deserialize_with = "deserialize_from_str")]
    pub limit: i64,
    /// Items to skip (default: 0)
    #[serde(default, deserialize_with = "deserialize_from_str")]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl PaginationParams {
    /// Limit clamped into 1..=100.
    pub fn validated_limit(&self) -> i64 {
        self.limit.clamp(1, 100)
    }

    /// Offset clamped to be non-negative.
    pub fn validated_offset(&self) -> i64 {
        self.offset.max(0)
    }
}

/// Search filter for text-based queries
#[derive(Debug, Deserialize, Default, Clone)]
pub struct SearchFilter {
    /// Search query string
    pub search: Option<String>,
}

impl SearchFilter {
    /// The trimmed query, if any non-whitespace was supplied.
    pub fn term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Paginated response wrapper
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    /// Items in the current page
    pub items: Vec<T>,
    /// Total count of items matching the filter
    pub total: i64,
    /// Maximum items per page (as requested)
    pub limit: i64,
    /// Number of items skipped
    pub offset: i64,
    /// Whether there are more items after this page
    pub has_more: bool,
}

impl<T> PaginatedResponse<T> {
    /// Create a new paginated response
    pub fn new(items: Vec<T>, total: i64, limit: i64, offset: i64) -> Self {
        Self {
            has_more: offset + (items.len() as i64) < total,
            items,
            total,
            limit,
            offset,
        }
    }
}
