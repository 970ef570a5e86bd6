//! Text event stream framing.

use bytes::Bytes;

/// Comment frame sent when a stream has been idle for a heartbeat interval.
pub const HEARTBEAT: &str = ": ping\n\n";

/// Encode a rendered payload as a `message` event: one `data:` line per
/// payload line, terminated by a blank line.
pub fn message(payload: &str) -> Bytes {
    // CR and CRLF are line terminators on the wire too; normalize so no bare CR
    // leaks into a data line.
    let normalized = payload.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(normalized.len() + 32);
    out.push_str("event: message\n");
    for line in normalized.lines() {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    Bytes::from(out)
}

pub fn heartbeat() -> Bytes {
    Bytes::from_static(HEARTBEAT.as_bytes())
}
