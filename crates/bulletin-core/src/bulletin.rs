//! Bulletin data model.
//!
//! A post travels through three shapes:
//! [`PostPayload`] (raw, from the wire) → [`ValidatedBulletin`] (normalized,
//! no sequence) → [`Bulletin`] (sequence assigned by the broadcast engine,
//! immutable from then on).

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Raw `bulletin_post` payload as sent by a client.
///
/// Every field is optional at this stage so that a missing field surfaces
/// as a [`ValidationError`](crate::ValidationError) rather than a decode failure.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostPayload {
    /// Who posted the bulletin.
    pub sender: Option<String>,
    /// Client-side ISO-8601 timestamp.
    pub post_date: Option<String>,
    /// Bulletin subject line.
    pub subject: Option<String>,
}

impl PostPayload {
    /// Build a payload with all three fields present.
    pub fn new(
        sender: impl Into<String>,
        post_date: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            sender: Some(sender.into()),
            post_date: Some(post_date.into()),
            subject: Some(subject.into()),
        }
    }
}

/// A post that passed validation but has not been accepted yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedBulletin {
    /// Trimmed, non-empty sender.
    pub sender: String,
    /// Parsed post date (server time if the client's was unusable).
    pub post_date: PostDate,
    /// Trimmed, non-empty, length-bounded subject.
    pub subject: String,
}

impl ValidatedBulletin {
    /// Attach the engine-assigned sequence number.
    #[must_use]
    pub fn sequenced(self, sequence: u64) -> Bulletin {
        Bulletin {
            sender: self.sender,
            post_date: self.post_date,
            subject: self.subject,
            sequence,
        }
    }
}

/// An accepted bulletin with its server-assigned sequence number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bulletin {
    /// Who posted the bulletin.
    pub sender: String,
    /// When it was posted.
    pub post_date: PostDate,
    /// Subject line.
    pub subject: String,
    /// Global, strictly increasing sequence number.
    pub sequence: u64,
}

/// A post timestamp in UTC that remembers how many fractional digits the
/// client sent, so `2024-01-01T00:00:00.000Z` is echoed back unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PostDate {
    at: DateTime<Utc>,
    format: SecondsFormat,
}

impl PostDate {
    /// Parse RFC 3339 with any offset, keeping the fractional precision.
    pub fn parse_rfc3339(raw: &str) -> Option<Self> {
        let at = DateTime::parse_from_rfc3339(raw).ok()?.with_timezone(&Utc);
        Some(Self {
            at,
            format: fraction_format(raw),
        })
    }

    /// The instant, normalized to UTC.
    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }
}

impl From<DateTime<Utc>> for PostDate {
    fn from(at: DateTime<Utc>) -> Self {
        Self {
            at,
            format: SecondsFormat::AutoSi,
        }
    }
}

impl PartialEq<DateTime<Utc>> for PostDate {
    fn eq(&self, other: &DateTime<Utc>) -> bool {
        self.at == *other
    }
}

impl fmt::Display for PostDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.at.to_rfc3339_opts(self.format, true))
    }
}

impl Serialize for PostDate {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PostDate {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Self::parse_rfc3339(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid RFC 3339 timestamp '{raw}'")))
    }
}

/// Output format matching the fractional digits in an RFC 3339 string.
fn fraction_format(raw: &str) -> SecondsFormat {
    // `YYYY-MM-DDTHH:MM:SS` is 19 bytes; a fraction starts right after it.
    let digits = raw
        .get(19..)
        .and_then(|rest| rest.strip_prefix('.'))
        .map_or(0, |frac| frac.bytes().take_while(u8::is_ascii_digit).count());
    match digits {
        0 => SecondsFormat::AutoSi,
        1..=3 => SecondsFormat::Millis,
        4..=6 => SecondsFormat::Micros,
        _ => SecondsFormat::Nanos,
    }
}
