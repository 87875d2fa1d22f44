//! Archive object keys and partition keys
//!
//! Object layout (bit-exact, consumed by the compactor):
//! `{feed_type}/date={YYYY-MM-DD}/hour={YYYY-MM-DDTHH:00:00Z}/base64url={E}/{YYYY-MM-DDTHH:MM:SS.sssZ}.pb`
//! where `E` is the base64url encoding of the configured feed URL. The URL is
//! encoded before the auth layer touches the request, so credentials never
//! reach object keys.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};

use gtfsrt_config::FeedType;

/// Encode a feed URL for use in object keys (base64url, padding stripped).
pub fn encode_feed_url(url: &str) -> String {
    URL_SAFE_NO_PAD.encode(url.as_bytes())
}

/// Decode a base64url feed URL from an object key.
pub fn decode_feed_url(encoded: &str) -> Result<String, String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded.as_bytes())
        .map_err(|e| format!("invalid base64url {encoded:?}: {e}"))?;
    String::from_utf8(bytes).map_err(|e| format!("decoded URL is not UTF-8: {e}"))
}

/// Compute the archive object key for one fetch.
pub fn object_key(feed_type: FeedType, url: &str, fetch_time: DateTime<Utc>) -> String {
    format!(
        "{}/date={}/hour={}/base64url={}/{}.pb",
        feed_type.as_str(),
        fetch_time.format("%Y-%m-%d"),
        fetch_time.format("%Y-%m-%dT%H:00:00Z"),
        encode_feed_url(url),
        fetch_time.to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

/// The `.meta` sidecar key adjacent to a `.pb` object key.
pub fn sidecar_key(object_key: &str) -> String {
    match object_key.strip_suffix(".pb") {
        Some(stem) => format!("{stem}.meta"),
        None => format!("{object_key}.meta"),
    }
}

/// Components recovered from an archive object key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedObjectKey {
    pub feed_type: String,
    pub date: String,
    pub hour: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

/// Parse an archive object key back into its components.
pub fn parse_object_key(key: &str) -> Result<ParsedObjectKey, String> {
    let parts: Vec<&str> = key.split('/').collect();
    let [feed_type, date_part, hour_part, b64_part, file] = parts[..] else {
        return Err(format!("key {key:?} does not have 5 path segments"));
    };

    let date = date_part
        .strip_prefix("date=")
        .ok_or_else(|| format!("missing date= segment in {key:?}"))?;
    let hour = hour_part
        .strip_prefix("hour=")
        .ok_or_else(|| format!("missing hour= segment in {key:?}"))?;
    let encoded = b64_part
        .strip_prefix("base64url=")
        .ok_or_else(|| format!("missing base64url= segment in {key:?}"))?;
    let stem = file
        .strip_suffix(".pb")
        .ok_or_else(|| format!("key {key:?} does not end in .pb"))?;

    let timestamp = DateTime::parse_from_rfc3339(stem)
        .map_err(|e| format!("invalid timestamp {stem:?}: {e}"))?
        .with_timezone(&Utc);

    Ok(ParsedObjectKey {
        feed_type: feed_type.to_string(),
        date: date.to_string(),
        hour: hour.to_string(),
        url: decode_feed_url(encoded)?,
        timestamp,
    })
}

/// Canonicalize a feed URL into a compactor partition key: `https://` is
/// stripped, `http://` becomes a `~` prefix. Bijective with
/// [`partition_key_to_url`].
pub fn url_to_partition_key(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        rest.to_string()
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("~{rest}")
    } else {
        url.to_string()
    }
}

/// Reconstruct a feed URL from its partition key.
pub fn partition_key_to_url(key: &str) -> String {
    if let Some(rest) = key.strip_prefix('~') {
        format!("http://{rest}")
    } else {
        format!("https://{key}")
    }
}
