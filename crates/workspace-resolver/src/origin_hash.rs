//! Origin Hash (C8, spec §4.1): a cheap staleness guard over root manifests
//! and top-level dependency locations. Never used for security.

use resolver_util::sha256::Sha256Accumulator;

/// Computes the origin hash: SHA-256 over the concatenation of each root
/// manifest's raw bytes (in the order roots are listed), followed by each
/// top-level dependency's location string, emitted as lowercase hex.
///
/// Deterministic and order-sensitive in the declared order; sensitive to
/// any manifest byte change.
pub fn compute_origin_hash<'a>(
    root_manifest_bytes: impl IntoIterator<Item = &'a [u8]>,
    dependency_locations: impl IntoIterator<Item = &'a str>,
) -> String {
    let mut acc = Sha256Accumulator::new();
    for bytes in root_manifest_bytes {
        acc.update(bytes);
    }
    for location in dependency_locations {
        acc.update(location.as_bytes());
    }
    let hash = acc.finish_hex();
    tracing::trace!(%hash, "computed origin hash");
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_input() {
        let a = compute_origin_hash([b"manifest-a".as_ref()], ["https://example.com/x"]);
        let b = compute_origin_hash([b"manifest-a".as_ref()], ["https://example.com/x"]);
        assert_eq!(a, b);
    }

    #[test]
    fn sensitive_to_manifest_byte_change() {
        let a = compute_origin_hash([b"manifest-a".as_ref()], []);
        let b = compute_origin_hash([b"manifest-b".as_ref()], []);
        assert_ne!(a, b);
    }

    #[test]
    fn sensitive_to_declared_order() {
        let a = compute_origin_hash([], ["loc1", "loc2"]);
        let b = compute_origin_hash([], ["loc2", "loc1"]);
        assert_ne!(a, b);
    }

    #[test]
    fn sensitive_to_dependency_location_change() {
        let a = compute_origin_hash([b"m".as_ref()], ["https://example.com/x"]);
        let b = compute_origin_hash([b"m".as_ref()], ["https://example.com/y"]);
        assert_ne!(a, b);
    }

    proptest::proptest! {
        #[test]
        fn always_deterministic_for_same_input(
            manifest in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..64),
            locations in proptest::collection::vec("[a-z/:.]{0,16}", 0..4),
        ) {
            let locs: Vec<&str> = locations.iter().map(String::as_str).collect();
            let a = compute_origin_hash([manifest.as_slice()], locs.iter().copied());
            let b = compute_origin_hash([manifest.as_slice()], locs.iter().copied());
            proptest::prop_assert_eq!(a, b);
        }

        #[test]
        fn always_sixty_four_hex_chars(
            manifest in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..64),
        ) {
            let hash = compute_origin_hash([manifest.as_slice()], []);
            proptest::prop_assert_eq!(hash.len(), 64);
            proptest::prop_assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
