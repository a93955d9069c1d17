use std::fmt;

use bstr::{BStr, BString, ByteSlice, ByteVec};

use crate::ObjectError;

/// A commit identity line: `Name <email> unix-seconds ±HHMM`.
///
/// The timezone is kept as the rendered string because it is stored and
/// re-emitted verbatim; no calendar arithmetic is done on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: BString,
    pub email: BString,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Timezone as `±HHMM` (e.g. `"+0000"`, `"-0500"`).
    pub tz: String,
}

impl Identity {
    /// Parse an identity from the tail of an `author`/`committer` header.
    ///
    /// The email is located from the rightmost `<`/`>` pair so that names
    /// may contain arbitrary bytes.
    pub fn parse(input: &BStr) -> Result<Self, ObjectError> {
        let input = input.as_bytes();

        let gt = input
            .iter()
            .rposition(|&b| b == b'>')
            .ok_or_else(|| ObjectError::MalformedIdentity("missing '>'".into()))?;
        let lt = input[..gt]
            .iter()
            .rposition(|&b| b == b'<')
            .ok_or_else(|| ObjectError::MalformedIdentity("missing '<'".into()))?;

        let name = input[..lt].trim();
        let email = &input[lt + 1..gt];

        let tail = input[gt + 1..].trim();
        let tail = std::str::from_utf8(tail)
            .map_err(|_| ObjectError::MalformedIdentity("non-ASCII timestamp".into()))?;

        let mut parts = tail.splitn(2, ' ');
        let ts_str = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ObjectError::MalformedIdentity("missing timestamp".into()))?;
        let timestamp: i64 = ts_str.parse().map_err(|_| {
            ObjectError::MalformedIdentity(format!("invalid timestamp '{ts_str}'"))
        })?;

        let tz = parts
            .next()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ObjectError::MalformedIdentity("missing timezone".into()))?;
        if tz.len() != 5
            || !(tz.starts_with('+') || tz.starts_with('-'))
            || !tz[1..].bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ObjectError::MalformedIdentity(format!(
                "invalid timezone '{tz}'"
            )));
        }

        Ok(Self {
            name: BString::from(name),
            email: BString::from(email),
            timestamp,
            tz: tz.to_string(),
        })
    }

    /// The `"<name> <<email>>"` rendering stored in reflog committer
    /// columns.
    pub fn name_email(&self) -> BString {
        let mut out = BString::from(self.name.clone());
        out.push_str(b" <");
        out.push_str(&self.email);
        out.push_str(b">");
        out
    }

    /// Canonical identity line bytes: `Name <email> ts ±HHMM`.
    pub fn to_bytes(&self) -> BString {
        let mut out = self.name_email();
        out.push_str(format!(" {} {}", self.timestamp, self.tz).as_bytes());
        out
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_canonical() {
        let id = Identity::parse(b"Test User <test@test.com> 1234567890 +0000".as_bstr()).unwrap();
        assert_eq!(id.name, "Test User");
        assert_eq!(id.email, "test@test.com");
        assert_eq!(id.timestamp, 1234567890);
        assert_eq!(id.tz, "+0000");
    }

    #[test]
    fn parse_negative_offset() {
        let id = Identity::parse(b"A B <a@b> 1700000000 -0530".as_bstr()).unwrap();
        assert_eq!(id.tz, "-0530");
    }

    #[test]
    fn name_may_contain_angle_like_bytes() {
        let id = Identity::parse("Weird \u{00e9} name <w@x> 1 +0000".as_bytes().as_bstr()).unwrap();
        assert_eq!(id.name, "Weird \u{00e9} name".as_bytes());
    }

    #[test]
    fn roundtrip() {
        let line = b"Jane Doe <jane@example.com> 1234567890 -0500";
        let id = Identity::parse(line.as_bstr()).unwrap();
        assert_eq!(id.to_bytes(), line.as_bstr());
    }

    #[test]
    fn name_email_rendering() {
        let id = Identity::parse(b"N <e@x> 0 +0000".as_bstr()).unwrap();
        assert_eq!(id.name_email(), "N <e@x>");
    }

    #[test]
    fn missing_email_fails() {
        assert!(Identity::parse(b"no email here 1 +0000".as_bstr()).is_err());
    }

    #[test]
    fn missing_timestamp_fails() {
        assert!(Identity::parse(b"A <a@b>".as_bstr()).is_err());
    }

    #[test]
    fn bogus_timezone_fails() {
        assert!(Identity::parse(b"A <a@b> 12 0000".as_bstr()).is_err());
        assert!(Identity::parse(b"A <a@b> 12 +00".as_bstr()).is_err());
        assert!(Identity::parse(b"A <a@b> 12 +00xx".as_bstr()).is_err());
    }
}
