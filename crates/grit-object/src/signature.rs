use bstr::{BStr, BString, ByteSlice};

use crate::ObjectError;

/// An author or committer line: identity, seconds since the epoch, and the
/// timezone offset as written (minutes east of UTC).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    pub time: i64,
    pub tz_offset: i32,
}

impl Signature {
    pub fn new(name: impl Into<BString>, email: impl Into<BString>, time: i64) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            time,
            tz_offset: 0,
        }
    }

    /// Parse `"Name <email> 1234567890 +0100"`.
    pub fn parse(data: &BStr) -> Result<Self, ObjectError> {
        let lt = data
            .find_byte(b'<')
            .ok_or_else(|| ObjectError::InvalidSignature("missing '<'".into()))?;
        let gt = data
            .find_byte(b'>')
            .filter(|&gt| gt > lt)
            .ok_or_else(|| ObjectError::InvalidSignature("missing '>'".into()))?;

        let name = BString::from(data[..lt].trim());
        let email = BString::from(&data[lt + 1..gt]);

        let rest = data[gt + 1..].trim();
        let mut fields = rest.split(|&b| b == b' ');
        let time = fields
            .next()
            .and_then(|f| std::str::from_utf8(f).ok())
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| ObjectError::InvalidSignature("bad timestamp".into()))?;
        let tz_offset = match fields.next() {
            Some(tz) => parse_tz(tz)
                .ok_or_else(|| ObjectError::InvalidSignature("bad timezone".into()))?,
            None => 0,
        };

        Ok(Self {
            name,
            email,
            time,
            tz_offset,
        })
    }

    /// Serialise to the canonical form used in commit and tag headers.
    pub fn to_bytes(&self) -> BString {
        let sign = if self.tz_offset < 0 { '-' } else { '+' };
        let off = self.tz_offset.abs();
        let mut out = BString::from(self.name.clone());
        out.extend_from_slice(b" <");
        out.extend_from_slice(&self.email);
        out.extend_from_slice(
            format!("> {} {}{:02}{:02}", self.time, sign, off / 60, off % 60).as_bytes(),
        );
        out
    }
}

/// Parse `±HHMM` into minutes east of UTC.
fn parse_tz(tz: &[u8]) -> Option<i32> {
    if tz.len() != 5 {
        return None;
    }
    let sign = match tz[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits = std::str::from_utf8(&tz[1..]).ok()?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let mins: i32 = digits[2..].parse().ok()?;
    Some(sign * (hours * 60 + mins))
}
