use sha3::{Digest, Keccak256};

/// Checks an Ethereum address: `0x` and 40 hex digits. All-lowercase and
/// all-uppercase addresses carry no checksum, mixed case must match EIP-55.
pub fn is_valid_eth_address(address: &str) -> bool {
    let Some(hex_part) = address.strip_prefix("0x") else {
        return false;
    };
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
    if !(has_lower && has_upper) {
        return true;
    }
    hex_part == to_checksum(hex_part)
}

/// EIP-55 mixed-case form of 40 hex digits, without `0x`.
fn to_checksum(hex_part: &str) -> String {
    let lower = hex_part.to_ascii_lowercase();
    let hash = hex::encode(Keccak256::digest(lower.as_bytes()));
    lower
        .chars()
        .zip(hash.chars())
        .map(|(c, nibble)| {
            if c.is_ascii_alphabetic() && nibble >= '8' {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect()
}
