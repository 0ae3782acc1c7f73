//! Stable digests for type definitions.
//!
//! Type ids must be identical on every node that loads the same `.typedefs`
//! module, so they are derived from the type name instead of being minted at
//! load time.
//!
//! - algorithm: **FNV-1a 64-bit**, run twice with distinct domain prefixes
//! - output: a GUID-shaped string (`8-4-4-4-12` lowercase hex)
//!
//! This is an identity tool, not a security primitive.

/// Prefix used in serialized module digests.
pub const TYPEDEFS_DIGEST_V1_PREFIX: &str = "fnv1a64:";

fn fnv1a64(bytes: &[u8]) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x00000100000001b3;

    let mut hash = FNV_OFFSET_BASIS;
    for b in bytes {
        hash ^= (*b) as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Digest of a whole `.typedefs` module as-read.
pub fn typedefs_digest_v1(text: &str) -> String {
    format!("{TYPEDEFS_DIGEST_V1_PREFIX}{:016x}", fnv1a64(text.as_bytes()))
}

/// Stable, GUID-shaped type id for a type name.
pub fn type_id_v1(type_name: &str) -> String {
    let hi = fnv1a64(format!("typedef-hi:{type_name}").as_bytes());
    let lo = fnv1a64(format!("typedef-lo:{type_name}").as_bytes());
    let hex = format!("{hi:016x}{lo:016x}");
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_ids_are_stable_and_distinct() {
        assert_eq!(type_id_v1("Comment"), type_id_v1("Comment"));
        assert_ne!(type_id_v1("Comment"), type_id_v1("Rating"));
        assert_eq!(type_id_v1("Comment").len(), 36);
    }

    #[test]
    fn module_digest_has_prefix() {
        let d = typedefs_digest_v1("module M\n");
        assert!(d.starts_with(TYPEDEFS_DIGEST_V1_PREFIX));
        assert_eq!(d.len(), TYPEDEFS_DIGEST_V1_PREFIX.len() + 16);
    }
}
