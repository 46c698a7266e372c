//! Cache fingerprint computation

use blake3::Hasher;

/// Length of a rendered fingerprint in hex characters
pub const FINGERPRINT_HEX_LEN: usize = 64;

/// Compute the storage key for a query
///
/// fingerprint = hex(blake3(tool || 0x00 || question || 0x00 || model))
///
/// NUL never appears in command-line arguments or model ids, so field
/// boundaries cannot shift between two distinct triples. Model ids such as
/// `llama3:8b` rule out `:` as the separator.
pub fn fingerprint(tool: &str, question: &str, model: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(tool.as_bytes());
    hasher.update(b"\0");
    hasher.update(question.as_bytes());
    hasher.update(b"\0");
    hasher.update(model.as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

/// True if `name` has the shape of a rendered fingerprint.
pub fn is_fingerprint(name: &str) -> bool {
    name.len() == FINGERPRINT_HEX_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
