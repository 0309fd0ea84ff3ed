//! Ref advertisement lines and capability negotiation.

use crate::ProtocolError;

/// Capabilities this engine advertises for the send direction.
pub const CAPA_AGENT: &str = "agent";
pub const CAPA_OFS_DELTA: &str = "ofs-delta";
pub const CAPA_REPORT_STATUS: &str = "report-status";
pub const CAPA_DELETE_REFS: &str = "delete-refs";

const AGENT_VALUE: &str = concat!("grit/", env!("CARGO_PKG_VERSION"));

/// A parsed ref advertisement line:
/// `<40-hex> SP <refname> [NUL <capability-list>] LF`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefLine {
    pub id_hex: String,
    pub refname: String,
    /// Capability list, only meaningful on the first line of the stream.
    pub capabilities: String,
}

/// Parse one advertisement frame.
///
/// A line without at least an id and a refname is `NotRef`.
pub fn parse_refline(line: &[u8]) -> Result<RefLine, ProtocolError> {
    let line = match line.split_last() {
        Some((b'\n', rest)) => rest,
        _ => line,
    };

    let (head, capabilities) = match line.iter().position(|&b| b == 0) {
        Some(nul) => (
            &line[..nul],
            String::from_utf8_lossy(&line[nul + 1..]).into_owned(),
        ),
        None => (line, String::new()),
    };

    let text = String::from_utf8_lossy(head);
    let mut fields = text.split_whitespace();
    let (Some(id_hex), Some(refname)) = (fields.next(), fields.next()) else {
        return Err(ProtocolError::NotRef(text.into_owned()));
    };

    Ok(RefLine {
        id_hex: id_hex.to_string(),
        refname: refname.to_string(),
        capabilities,
    })
}

/// Intersect the server's advertised capabilities with ours.
///
/// Returns the space-joined capability list to announce with the first
/// update. `report-status` is appended unconditionally when the
/// intersection lacks it: some hosts advertise nothing at all yet reject
/// ref updates unless the client asks for a status report.
pub fn match_capabilities(server_capabilities: &str) -> String {
    let ours = [
        (CAPA_AGENT, Some(AGENT_VALUE)),
        (CAPA_OFS_DELTA, None),
        (CAPA_REPORT_STATUS, None),
        (CAPA_DELETE_REFS, None),
    ];

    let mut matched: Vec<String> = Vec::new();
    for capa in server_capabilities.split(' ') {
        let key = capa.split_once('=').map_or(capa, |(k, _)| k);
        for (our_key, our_value) in &ours {
            if key == *our_key {
                match our_value {
                    Some(value) => matched.push(format!("{our_key}={value}")),
                    None => matched.push((*our_key).to_string()),
                }
            }
        }
    }

    if !matched.iter().any(|c| c == CAPA_REPORT_STATUS) {
        matched.push(CAPA_REPORT_STATUS.to_string());
    }
    matched.join(" ")
}

/// Does a negotiated capability string contain the given capability?
pub fn has_capability(capabilities: &str, name: &str) -> bool {
    capabilities
        .split(' ')
        .any(|c| c == name || c.split_once('=').map_or(false, |(k, _)| k == name))
}
