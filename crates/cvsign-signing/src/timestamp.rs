//! Signature timestamping.

use cvsign_core::descriptor::{DigestSpec, TimestampSpec};

use crate::error::SigningResult;

/// Issues timestamps over the signed component digest.
pub trait TimestampAuthority: Send + Sync {
    fn timestamp(&self, digest: &DigestSpec) -> SigningResult<TimestampSpec>;
}

/// Format a time the way timestamps record it (RFC 3339, UTC).
pub fn format_time(time: chrono::DateTime<chrono::Utc>) -> String {
    time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
