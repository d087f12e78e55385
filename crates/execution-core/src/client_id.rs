//! Client order id generation.

use uuid::Uuid;

/// Generate a unique client order id with a prefix.
///
/// Format: `{prefix}_{uuid}` where uuid is a v4 UUID in simple format (no hyphens).
pub fn generate_client_order_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().as_simple())
}

/// Generate a client order id no longer than `max_len` bytes.
///
/// For venues with short id limits: the prefix is kept and the random part
/// is cut to fit. A prefix longer than `max_len` is itself truncated, never
/// splitting a character.
pub fn generate_bounded_client_order_id(prefix: &str, max_len: usize) -> String {
    let mut id = format!("{}{}", prefix, Uuid::new_v4().as_simple());
    let mut end = max_len.min(id.len());
    while !id.is_char_boundary(end) {
        end -= 1;
    }
    id.truncate(end);
    id
}
