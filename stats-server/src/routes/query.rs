//! Shared query-string helpers.

use serde::{Deserialize, Deserializer};

/// Deserializes a query flag that may arrive as `1`/`0`, `true`/`false`, or
/// be entirely absent (`spec.md` §6 expansion's `?admin=1` convention,
/// which `bool`'s default `FromStr`-backed deserialize rejects).
pub fn truthy_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(matches!(raw.as_str(), "1" | "true" | "yes"))
}
