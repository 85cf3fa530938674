// `::serde` is the external crate; this module shadows the name.
use ::serde::Serializer;
use chrono::{DateTime, SecondsFormat, Utc};

/// `serialize_with` helper: UTC timestamp as RFC 3339, millisecond precision,
/// `Z` suffix. Used for every timestamp that leaves the process.
pub fn to_rfc3339_ms<S>(at: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.collect_str(&at.to_rfc3339_opts(SecondsFormat::Millis, true))
}
