//! Shared validation helpers for the adapter layer.

/// Returns `true` for a colon-separated 6-byte address such as
/// `A4:C1:38:0B:7E:21` (either hex case).
///
/// Used to validate configured and command-line device addresses.
pub fn is_valid_address(s: &str) -> bool {
    let mut parts = 0;
    for part in s.split(':') {
        parts += 1;
        if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return false;
        }
    }
    parts == 6
}
