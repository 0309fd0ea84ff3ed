use crate::{ObjectError, ObjectInfo, ObjectKind};

/// Parse an object header from raw bytes.
///
/// The header is `"<type> <size>\0"`; the returned `hdrlen` includes the
/// null terminator.
pub fn parse(data: &[u8]) -> Result<ObjectInfo, ObjectError> {
    let null_pos = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ObjectError::InvalidHeader("missing null terminator".into()))?;

    let header = &data[..null_pos];
    let space_pos = header
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| ObjectError::InvalidHeader("missing space in header".into()))?;

    let kind = ObjectKind::from_bytes(&header[..space_pos])?;

    let size_str = std::str::from_utf8(&header[space_pos + 1..])
        .map_err(|_| ObjectError::InvalidHeader("non-ASCII size".into()))?;
    let size: u64 = size_str
        .parse()
        .map_err(|_| ObjectError::InvalidHeader(format!("invalid size: {size_str}")))?;

    Ok(ObjectInfo {
        kind,
        size,
        hdrlen: null_pos + 1,
    })
}

/// Encode an object header: `"<type> <size>\0"`.
pub fn encode(kind: ObjectKind, size: u64) -> Vec<u8> {
    format!("{} {}\0", kind, size).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_blob_header() {
        let data = b"blob 12\0hello world!";
        let info = parse(data).unwrap();
        assert_eq!(info.kind, ObjectKind::Blob);
        assert_eq!(info.size, 12);
        assert_eq!(info.hdrlen, 8);
        assert_eq!(&data[info.hdrlen..], b"hello world!");
    }

    #[test]
    fn encode_parse_roundtrip() {
        let hdr = encode(ObjectKind::Tree, 42);
        let info = parse(&hdr).unwrap();
        assert_eq!(info.kind, ObjectKind::Tree);
        assert_eq!(info.size, 42);
        assert_eq!(info.hdrlen, hdr.len());
    }

    #[test]
    fn rejects_malformed() {
        assert!(parse(b"blob 12").is_err());
        assert!(parse(b"blob12\0").is_err());
        assert!(parse(b"widget 12\0").is_err());
        assert!(parse(b"blob twelve\0").is_err());
    }
}
