use blake3::Hasher;

use nestedset_core::GroupKey;

const PARTITION_LOCK_DOMAIN: &[u8] = b"nestedset/partition-lock/v0";

/// Advisory lock key for a partition: the first eight bytes of a domain-separated BLAKE3 hash.
/// The unscoped partition (`None`) hashes differently from every group key.
pub fn partition_lock_key(group: Option<&GroupKey>) -> i64 {
    let mut hasher = Hasher::new();
    hasher.update(PARTITION_LOCK_DOMAIN);
    match group {
        Some(key) => {
            hasher.update(&[1]);
            hasher.update(&(key.as_bytes().len() as u32).to_be_bytes());
            hasher.update(key.as_bytes());
        }
        None => {
            hasher.update(&[0]);
        }
    }
    let hash = hasher.finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash.as_bytes()[0..8]);
    i64::from_be_bytes(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_stable_and_distinct() {
        let a = GroupKey::from("a");
        assert_eq!(partition_lock_key(Some(&a)), partition_lock_key(Some(&a)));
        assert_ne!(partition_lock_key(Some(&a)), partition_lock_key(None));
        assert_ne!(
            partition_lock_key(Some(&a)),
            partition_lock_key(Some(&GroupKey::from("b")))
        );
        assert_ne!(
            partition_lock_key(None),
            partition_lock_key(Some(&GroupKey::new(Vec::new())))
        );
    }
}
