use serde::Serialize;

/// Client version reported when the driver cannot name its library version.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Metadata about the session an adapter holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub db_name: String,
    pub server_version: String,
    pub client_version: String,
}

/// Render a Postgres-style numeric version as a dotted string.
///
/// From 10 on the number is `MMmmmm` (major, then a four-digit minor); before 10 it
/// is `Mmmpp` (major, two-digit minor, two-digit patch). Trailing zero components are
/// dropped:
///
/// ```rust
/// use pg_stats::adapter::format_version;
///
/// assert_eq!(format_version(90624), "9.6.24");
/// assert_eq!(format_version(100000), "10");
/// assert_eq!(format_version(150018), "15.18");
/// ```
#[must_use]
pub fn format_version(number: u32) -> String {
    let mut parts = if number >= 100_000 {
        vec![number / 10_000, number % 10_000]
    } else {
        vec![number / 10_000, (number / 100) % 100, number % 100]
    };
    while parts.len() > 1 && parts.last() == Some(&0) {
        parts.pop();
    }
    parts
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(".")
}
