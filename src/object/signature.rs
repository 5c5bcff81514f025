// Author/committer/tagger identity lines.
//
// Rendered as `<name> <<email>> <unix-seconds> <±HHMM>`. Parsed lines that
// deviate from that form (extra spaces, `+5` seconds, no space before `<`)
// keep their original bytes so they re-serialize unchanged.

use std::fmt;

use bstr::{BString, ByteSlice};
use chrono::{DateTime, FixedOffset};

/// A person and the moment they acted, with their local UTC offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    pub when: DateTime<FixedOffset>,
    /// The parsed line, when it differs from the canonical rendering.
    raw: Option<BString>,
}

impl Signature {
    pub fn new(name: impl Into<BString>, email: impl Into<BString>, when: DateTime<FixedOffset>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            when,
            raw: None,
        }
    }

    /// Build a signature from unix seconds and a UTC offset in minutes.
    /// Returns `None` if either is out of range.
    pub fn from_unix(
        name: impl Into<BString>,
        email: impl Into<BString>,
        seconds: i64,
        offset_minutes: i32,
    ) -> Option<Self> {
        let offset = FixedOffset::east_opt(offset_minutes.checked_mul(60)?)?;
        let when = DateTime::from_timestamp(seconds, 0)?.with_timezone(&offset);
        Some(Self::new(name, email, when))
    }

    /// Parse the value part of an identity line (everything after the
    /// keyword).
    pub fn parse(value: &[u8]) -> Option<Self> {
        let (name, email, when) = split(value)?;
        let mut sig = Self::new(name, email, when);
        if sig.canonical() != value {
            sig.raw = Some(BString::from(value));
        }
        Some(sig)
    }

    /// The identity line as written into a commit or tag.
    ///
    /// A parsed non-canonical line is reproduced verbatim as long as the
    /// fields still match it; after an edit the canonical form is used.
    pub fn to_bytes(&self) -> Vec<u8> {
        if let Some(raw) = &self.raw {
            let unchanged = split(raw).is_some_and(|(name, email, when)| {
                name == self.name.as_slice() && email == self.email.as_slice() && when == self.when
            });
            if unchanged {
                return raw.to_vec();
            }
        }
        self.canonical()
    }

    fn canonical(&self) -> Vec<u8> {
        let offset = self.when.offset().local_minus_utc();
        let sign = if offset < 0 { '-' } else { '+' };
        let minutes = offset.unsigned_abs() / 60;
        let mut out = Vec::with_capacity(self.name.len() + self.email.len() + 24);
        out.extend_from_slice(&self.name);
        out.extend_from_slice(b" <");
        out.extend_from_slice(&self.email);
        out.extend_from_slice(
            format!(
                "> {} {}{:02}{:02}",
                self.when.timestamp(),
                sign,
                minutes / 60,
                minutes % 60
            )
            .as_bytes(),
        );
        out
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_bytes().as_bstr())
    }
}

/// Split `name <email> seconds zone` into its parts. The name loses its
/// trailing spaces; seconds and zone may be separated by any whitespace.
fn split(value: &[u8]) -> Option<(&[u8], &[u8], DateTime<FixedOffset>)> {
    let open = value.find_byte(b'<')?;
    let close = open + value[open..].find_byte(b'>')?;
    let mut name_end = open;
    while name_end > 0 && value[name_end - 1] == b' ' {
        name_end -= 1;
    }
    let email = &value[open + 1..close];

    let time = std::str::from_utf8(&value[close + 1..]).ok()?;
    let mut parts = time.split_ascii_whitespace();
    let seconds: i64 = parts.next()?.parse().ok()?;
    let offset = parse_zone(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }
    let when = DateTime::from_timestamp(seconds, 0)?.with_timezone(&offset);
    Some((&value[..name_end], email, when))
}

/// Parse `±HHMM`.
fn parse_zone(zone: &str) -> Option<FixedOffset> {
    let bytes = zone.as_bytes();
    if bytes.len() != 5 || !bytes[1..].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let hours: i32 = zone[1..3].parse().ok()?;
    let minutes: i32 = zone[3..5].parse().ok()?;
    let seconds = (hours * 60 + minutes) * 60;
    match bytes[0] {
        b'+' => FixedOffset::east_opt(seconds),
        b'-' => FixedOffset::west_opt(seconds),
        _ => None,
    }
}
