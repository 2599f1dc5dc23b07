//! Physical key encoding for account namespaces.
//!
//! Every entry lives in one shared, sorted keyspace under a physical key of
//! the form
//!
//! ```text
//! <encoded-account>-store-<base64(logical key)>
//! ```
//!
//! Both the account identifier and the logical key are encoded with the
//! standard, padded base64 alphabet (`A-Z a-z 0-9 + / =`). That alphabet has
//! no `-`, so the separator appears exactly twice in every physical key and
//! the namespace prefix of one account can never match a key belonging to a
//! different account, even when one encoded identifier is a byte prefix of
//! another.

use base64::{Engine, engine::general_purpose::STANDARD};
use thiserror::Error;

/// Separator between the segments of a physical key.
pub const SEPARATOR: char = '-';

/// Middle segment marking entries of the key-value store.
pub const STORE_SEGMENT: &str = "store";

/// Why a physical key could not be turned back into a logical key.
#[derive(Debug, Error)]
pub enum KeyDecodeError {
    /// The physical key is not valid UTF-8.
    #[error("physical key is not valid UTF-8")]
    NotUtf8(#[source] std::str::Utf8Error),

    /// The physical key does not have the `<account>-store-<key>` shape.
    #[error("physical key is not of the form <account>-{STORE_SEGMENT}-<key>")]
    Malformed,

    /// The key segment is not valid base64.
    #[error("key segment is not valid base64")]
    InvalidBase64(#[source] base64::DecodeError),

    /// The decoded logical key is not valid UTF-8.
    #[error("decoded logical key is not valid UTF-8")]
    LogicalKeyNotUtf8(#[source] std::string::FromUtf8Error),
}

/// Encodes an account identifier into its separator-free form.
#[must_use]
pub fn encode_identifier(account: &str) -> String {
    STANDARD.encode(account.as_bytes())
}

/// Returns the prefix shared by every physical key of `account`.
///
/// The prefix ends with the trailing separator, so it is also the seek
/// boundary for a namespace scan.
///
/// ```
/// use tenantkv_namespace::keys::namespace_prefix;
///
/// assert_eq!(namespace_prefix("alice"), "YWxpY2U=-store-");
/// ```
#[must_use]
pub fn namespace_prefix(account: &str) -> String {
    format!("{}{SEPARATOR}{STORE_SEGMENT}{SEPARATOR}", encode_identifier(account))
}

/// Builds the physical key for `logical_key` inside `account`'s namespace.
///
/// ```
/// use tenantkv_namespace::keys::encode_physical_key;
///
/// assert_eq!(encode_physical_key("alice", "color"), "YWxpY2U=-store-Y29sb3I=");
/// ```
#[must_use]
pub fn encode_physical_key(account: &str, logical_key: &str) -> String {
    let mut physical = namespace_prefix(account);
    STANDARD.encode_string(logical_key.as_bytes(), &mut physical);
    physical
}

/// Recovers the logical key from a physical key.
///
/// # Errors
///
/// Returns a [`KeyDecodeError`] if the key is not UTF-8, lacks the `store`
/// segment, or its key segment is not base64 of a UTF-8 string.
pub fn decode_logical_key(physical_key: &[u8]) -> Result<String, KeyDecodeError> {
    let physical = std::str::from_utf8(physical_key).map_err(KeyDecodeError::NotUtf8)?;

    let mut segments = physical.splitn(3, SEPARATOR);
    let (Some(_account), Some(STORE_SEGMENT), Some(encoded_key)) =
        (segments.next(), segments.next(), segments.next())
    else {
        return Err(KeyDecodeError::Malformed);
    };

    let bytes = STANDARD.decode(encoded_key).map_err(KeyDecodeError::InvalidBase64)?;
    String::from_utf8(bytes).map_err(KeyDecodeError::LogicalKeyNotUtf8)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn physical_key_layout() {
        assert_eq!(encode_identifier("abc"), "YWJj");
        assert_eq!(encode_physical_key("abc", "k"), "YWJj-store-aw==");
        assert_eq!(namespace_prefix(""), "-store-");
    }

    #[test]
    fn empty_logical_key_is_representable() {
        let physical = encode_physical_key("acct", "");
        assert_eq!(physical, namespace_prefix("acct"));
        assert_eq!(decode_logical_key(physical.as_bytes()).unwrap(), "");
    }

    #[test]
    fn identifiers_with_separators_stay_separator_free() {
        let encoded = encode_identifier("user-with-dashes@example.com");
        assert!(!encoded.contains(SEPARATOR));
    }

    #[test]
    fn decode_rejects_non_utf8_physical_key() {
        let err = decode_logical_key(&[0xff, b'-', b's']).unwrap_err();
        assert!(matches!(err, KeyDecodeError::NotUtf8(_)));
    }

    #[test]
    fn decode_rejects_missing_or_wrong_segments() {
        for key in ["YWJj", "YWJj-store", "YWJj-other-aw==", "YWJj-stor-aw=="] {
            let err = decode_logical_key(key.as_bytes()).unwrap_err();
            assert!(matches!(err, KeyDecodeError::Malformed), "{key}: {err:?}");
        }
    }

    #[test]
    fn decode_rejects_bad_base64() {
        let err = decode_logical_key(b"YWJj-store-!!!").unwrap_err();
        assert!(matches!(err, KeyDecodeError::InvalidBase64(_)));

        // A stray separator inside the key segment is not base64 either
        let err = decode_logical_key(b"YWJj-store-aw-=").unwrap_err();
        assert!(matches!(err, KeyDecodeError::InvalidBase64(_)));
    }

    #[test]
    fn decode_rejects_non_utf8_logical_key() {
        let physical = format!("YWJj-store-{}", STANDARD.encode([0xc3, 0x28]));
        let err = decode_logical_key(physical.as_bytes()).unwrap_err();
        assert!(matches!(err, KeyDecodeError::LogicalKeyNotUtf8(_)));
    }

    #[test]
    fn prefix_identifier_does_not_capture_longer_identifier() {
        // "YWJj" is a byte prefix of "YWJjYWJj"
        let short = namespace_prefix("abc");
        let long_key = encode_physical_key("abcabc", "k");
        assert!(encode_identifier("abcabc").starts_with(&encode_identifier("abc")));
        assert!(!long_key.starts_with(&short));
    }

    proptest! {
        /// Decoding a physical key yields exactly the logical key that built it.
        #[test]
        fn decode_recovers_logical_key(account in ".*", key in ".*") {
            let physical = encode_physical_key(&account, &key);
            prop_assert_eq!(decode_logical_key(physical.as_bytes()).unwrap(), key);
        }

        /// A physical key starts with another account's prefix only if the accounts are equal.
        #[test]
        fn prefixes_isolate_accounts(a in ".*", b in ".*", key in ".*") {
            let physical = encode_physical_key(&b, &key);
            prop_assert_eq!(physical.starts_with(&namespace_prefix(&a)), a == b);
        }

        /// Distinct (account, key) pairs never collide.
        #[test]
        fn physical_keys_are_injective(
            a in ".{0,8}", ka in ".{0,8}",
            b in ".{0,8}", kb in ".{0,8}",
        ) {
            let same_pair = a == b && ka == kb;
            prop_assert_eq!(encode_physical_key(&a, &ka) == encode_physical_key(&b, &kb), same_pair);
        }

        /// Encoded identifiers use only the separator-free base64 alphabet.
        #[test]
        fn encoded_identifier_alphabet(account in ".*") {
            let encoded = encode_identifier(&account);
            prop_assert!(encoded.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')));
        }
    }
}
