use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = urbanshield_common::id::prefixed_ulid("alr");
/// assert!(id.starts_with("alr_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new().to_string())
}

/// Well-known ID prefixes for client-generated records.
pub mod prefix {
    /// In-app proximity alert events.
    pub const ALERT: &str = "alr";
}
