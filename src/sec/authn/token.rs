use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::ids;

pub const SELECTOR_LEN: usize = 16;
pub const VERIFIER_LEN: usize = 16;

/// combined wire form, selector then verifier, both hex encoded
pub const COMBINED_CHARS: usize = (SELECTOR_LEN + VERIFIER_LEN) * 2;

pub fn generate(len: usize) -> Result<Vec<u8>, rand::Error> {
    let mut rtn = vec![0u8; len];

    rand::thread_rng().try_fill_bytes(&mut rtn)?;

    Ok(rtn)
}

pub fn generate_hex(len: usize) -> Result<String, rand::Error> {
    Ok(HEXLOWER.encode(&generate(len)?))
}

/// hashes the verifier together with the user id and expiry it was issued
/// for. a verifier replayed against another user or another expiry will
/// never produce the stored hash
pub fn bind_hash(verifier: &[u8], user_id: ids::UserId, expires: &DateTime<Utc>) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(verifier);
    hasher.update(&user_id.to_be_bytes());
    hasher.update(&expires.timestamp().to_be_bytes());
    hasher.finalize()
}

/// full length comparison, no short circuit on the first mismatched byte
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[derive(Debug, thiserror::Error)]
#[error("given value is not a valid token")]
pub struct InvalidFormat;

/// parsed selector/verifier pair. the selector stays hex encoded since it
/// is only ever used as a lookup key, the verifier is decoded for hashing
#[derive(Debug)]
pub struct Combined {
    selector: String,
    verifier: Vec<u8>,
}

impl Combined {
    pub fn parse(given: &str) -> Result<Self, InvalidFormat> {
        if given.len() != COMBINED_CHARS {
            return Err(InvalidFormat);
        }

        let Ok(bytes) = HEXLOWER.decode(given.as_bytes()) else {
            return Err(InvalidFormat);
        };

        Ok(Combined {
            selector: given[..(SELECTOR_LEN * 2)].to_owned(),
            verifier: bytes[SELECTOR_LEN..].to_vec(),
        })
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn verifier(&self) -> &[u8] {
        &self.verifier
    }
}

pub fn join(selector: &str, verifier: &[u8]) -> String {
    format!("{selector}{}", HEXLOWER.encode(verifier))
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn expires() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn generate_returns_requested_length() {
        assert_eq!(generate(SELECTOR_LEN).unwrap().len(), SELECTOR_LEN);
        assert_eq!(generate_hex(SELECTOR_LEN).unwrap().len(), SELECTOR_LEN * 2);
    }

    #[test]
    fn join_parse_round_trip() {
        let selector = generate_hex(SELECTOR_LEN).unwrap();
        let verifier = generate(VERIFIER_LEN).unwrap();

        let combined = Combined::parse(&join(&selector, &verifier)).unwrap();

        assert_eq!(combined.selector(), selector);
        assert_eq!(combined.verifier(), verifier.as_slice());
    }

    #[test]
    fn parse_rejects_malformed_input() {
        let valid = join(
            &generate_hex(SELECTOR_LEN).unwrap(),
            &generate(VERIFIER_LEN).unwrap()
        );

        assert!(Combined::parse(&valid[..COMBINED_CHARS - 2]).is_err());
        assert!(Combined::parse(&format!("{valid}00")).is_err());
        assert!(Combined::parse(&valid.to_uppercase()).is_err());
        assert!(Combined::parse(&valid.replace(|c: char| c.is_ascii_hexdigit(), "z")).is_err());
        assert!(Combined::parse("").is_err());
    }

    #[test]
    fn bind_hash_separates_users() {
        let verifier = generate(VERIFIER_LEN).unwrap();
        let expires = expires();

        let first = bind_hash(&verifier, 1, &expires);
        let second = bind_hash(&verifier, 2, &expires);

        assert_ne!(first, second, "identical verifiers for two users produced one hash");
    }

    #[test]
    fn bind_hash_separates_expiries() {
        let verifier = generate(VERIFIER_LEN).unwrap();
        let expires = expires();
        let later = expires + chrono::Duration::seconds(1);

        assert_ne!(
            bind_hash(&verifier, 1, &expires),
            bind_hash(&verifier, 1, &later)
        );
    }

    #[test]
    fn constant_time_eq_checks_content_and_length() {
        assert!(constant_time_eq(b"same bytes", b"same bytes"));
        assert!(!constant_time_eq(b"same bytes", b"same bytez"));
        assert!(!constant_time_eq(b"short", b"longer value"));
        assert!(constant_time_eq(b"", b""));
    }
}
