use std::time::{SystemTime, UNIX_EPOCH};

#[inline]
pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

/// `chatcmpl-` followed by the 32 hex digits of `id`.
#[must_use]
pub(crate) fn completion_id(id: uuid::Uuid) -> String {
    let mut buf = uuid::Uuid::encode_buffer();
    let hex = id.simple().encode_lower(&mut buf);
    let mut out = String::with_capacity(9 + hex.len());
    out.push_str("chatcmpl-");
    out.push_str(hex);
    out
}
