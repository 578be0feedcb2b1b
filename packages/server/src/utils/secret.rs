use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compare a presented secret against the configured one.
///
/// Both sides are hashed first so the comparison always runs over 32 bytes,
/// whatever the lengths of the inputs.
pub fn secrets_match(expected: &str, provided: &str) -> bool {
    let expected = Sha256::digest(expected.as_bytes());
    let provided = Sha256::digest(provided.as_bytes());
    expected.as_slice().ct_eq(provided.as_slice()).into()
}
