//! Id generation and normalization for the four generator strategies.
//!
//! Every id is canonicalized at every boundary: insert, lookup, update,
//! and delete all normalize first, so exactly one string form is ever
//! stored or probed.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use syncopate_core::error::DbError;
use syncopate_core::types::IdGeneratorKind;

/// Canonical form of an auto-increment id: ASCII decimal, no sign, no
/// leading zeros.
pub fn format_auto_increment(n: u64) -> String {
    n.to_string()
}

/// Generates an RFC 4122 v4 uuid in canonical lowercase hyphenated form.
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

// Process-local sequence folded into the cuid to keep same-millisecond
// ids distinct.
static CUID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a collision-resistant id starting with the literal `c`:
/// millisecond timestamp, process counter, and random entropy, all
/// base36 lowercase.
pub fn generate_cuid() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let count = CUID_COUNTER.fetch_add(1, Ordering::Relaxed) % (36u64.pow(4));
    let mut rng = rand::rng();
    let entropy: u64 = rng.random_range(0..36u64.pow(8));
    format!(
        "c{}{}{}",
        to_base36(millis),
        pad_base36(count, 4),
        pad_base36(entropy, 8)
    )
}

/// Validates a caller-supplied id against the generator and returns its
/// canonical form. Auto-increment rejects supplied ids outright.
pub fn validate_supplied(kind: IdGeneratorKind, id: &str) -> Result<String, DbError> {
    match kind {
        IdGeneratorKind::AutoIncrement => Err(DbError::InvalidId {
            id: id.to_string(),
            reason: "ids are generated by the store for auto_increment types".into(),
        }),
        IdGeneratorKind::Uuid => parse_uuid(id),
        IdGeneratorKind::Cuid => parse_cuid(id),
        IdGeneratorKind::Custom => Ok(id.to_string()),
    }
}

/// Normalizes an id arriving on the lookup path (get/update/delete) so
/// that equivalent client representations map to the same stored key.
pub fn normalize(kind: IdGeneratorKind, id: &str) -> Result<String, DbError> {
    match kind {
        IdGeneratorKind::AutoIncrement => parse_numeric(id),
        IdGeneratorKind::Uuid => parse_uuid(id),
        IdGeneratorKind::Cuid => parse_cuid(id),
        IdGeneratorKind::Custom => Ok(id.to_string()),
    }
}

fn parse_numeric(id: &str) -> Result<String, DbError> {
    // u64::from_str accepts a leading '+'; the canonical form does not.
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DbError::InvalidId {
            id: id.to_string(),
            reason: "expected a decimal number".into(),
        });
    }
    let n: u64 = id.parse().map_err(|_| DbError::InvalidId {
        id: id.to_string(),
        reason: "number out of range".into(),
    })?;
    Ok(format_auto_increment(n))
}

fn parse_uuid(id: &str) -> Result<String, DbError> {
    let parsed = uuid::Uuid::parse_str(id).map_err(|e| DbError::InvalidId {
        id: id.to_string(),
        reason: format!("not a valid uuid: {e}"),
    })?;
    Ok(parsed.hyphenated().to_string())
}

fn parse_cuid(id: &str) -> Result<String, DbError> {
    if id.len() < 2 || !id.starts_with('c') {
        return Err(DbError::InvalidId {
            id: id.to_string(),
            reason: "cuid must start with 'c'".into(),
        });
    }
    Ok(id.to_string())
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ascii")
}

fn pad_base36(n: u64, width: usize) -> String {
    let s = to_base36(n);
    if s.len() >= width {
        s
    } else {
        format!("{}{}", "0".repeat(width - s.len()), s)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn auto_increment_canonical_form() {
        assert_eq!(format_auto_increment(1), "1");
        assert_eq!(format_auto_increment(1042), "1042");
    }

    #[test]
    fn auto_increment_normalize_strips_leading_zeros() {
        assert_eq!(
            normalize(IdGeneratorKind::AutoIncrement, "0012").unwrap(),
            "12"
        );
        assert_eq!(normalize(IdGeneratorKind::AutoIncrement, "7").unwrap(), "7");
    }

    #[test]
    fn auto_increment_rejects_non_numeric() {
        for bad in ["abc", "", "-1", "+1", "1.5", "1e3"] {
            assert!(
                matches!(
                    normalize(IdGeneratorKind::AutoIncrement, bad),
                    Err(DbError::InvalidId { .. })
                ),
                "expected rejection of {bad:?}"
            );
        }
    }

    #[test]
    fn auto_increment_rejects_supplied_ids() {
        assert!(matches!(
            validate_supplied(IdGeneratorKind::AutoIncrement, "5"),
            Err(DbError::InvalidId { .. })
        ));
    }

    #[test]
    fn uuid_generation_is_canonical() {
        let id = generate_uuid();
        assert_eq!(id.len(), 36);
        assert_eq!(id, id.to_lowercase());
        assert_eq!(normalize(IdGeneratorKind::Uuid, &id).unwrap(), id);
    }

    #[test]
    fn uuid_normalize_lowercases() {
        let upper = "550E8400-E29B-41D4-A716-446655440000";
        assert_eq!(
            normalize(IdGeneratorKind::Uuid, upper).unwrap(),
            "550e8400-e29b-41d4-a716-446655440000"
        );
    }

    #[test]
    fn uuid_rejects_garbage() {
        assert!(validate_supplied(IdGeneratorKind::Uuid, "not-a-uuid").is_err());
    }

    #[test]
    fn cuid_generation_has_prefix_and_varies() {
        let mut seen = HashSet::new();
        for _ in 0..64 {
            let id = generate_cuid();
            assert!(id.starts_with('c'), "cuid {id} must start with 'c'");
            assert!(seen.insert(id), "cuid collision");
        }
    }

    #[test]
    fn cuid_accepts_only_c_prefixed() {
        assert!(validate_supplied(IdGeneratorKind::Cuid, "cabc123").is_ok());
        assert!(validate_supplied(IdGeneratorKind::Cuid, "xyz").is_err());
        assert!(validate_supplied(IdGeneratorKind::Cuid, "c").is_err());
    }

    #[test]
    fn custom_is_verbatim() {
        assert_eq!(
            validate_supplied(IdGeneratorKind::Custom, "order:2024/0001").unwrap(),
            "order:2024/0001"
        );
        assert_eq!(
            normalize(IdGeneratorKind::Custom, "order:2024/0001").unwrap(),
            "order:2024/0001"
        );
    }

    proptest! {
        // normalize(canonical(x)) == canonical(x) for every generator
        #[test]
        fn auto_increment_roundtrip(n in any::<u64>()) {
            let canonical = format_auto_increment(n);
            prop_assert_eq!(
                normalize(IdGeneratorKind::AutoIncrement, &canonical).unwrap(),
                canonical
            );
        }

        #[test]
        fn uuid_roundtrip(bytes in any::<[u8; 16]>()) {
            let canonical = uuid::Uuid::from_bytes(bytes).hyphenated().to_string();
            prop_assert_eq!(normalize(IdGeneratorKind::Uuid, &canonical).unwrap(), canonical);
        }

        #[test]
        fn custom_roundtrip(s in ".{1,64}") {
            prop_assert_eq!(normalize(IdGeneratorKind::Custom, &s).unwrap(), s);
        }
    }

    #[test]
    fn cuid_roundtrip() {
        for _ in 0..16 {
            let id = generate_cuid();
            assert_eq!(normalize(IdGeneratorKind::Cuid, &id).unwrap(), id);
        }
    }
}
