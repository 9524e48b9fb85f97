use chrono::{DateTime, Utc};
use rand::RngCore;

use crate::sec::authn::token;

pub mod algo;

pub use algo::Algo;

pub const SECRET_LEN: usize = 25;

pub fn create_secret() -> Result<Vec<u8>, rand::Error> {
    let mut bytes = [0u8; SECRET_LEN];
    rand::thread_rng().try_fill_bytes(&mut bytes)?;

    Ok(bytes.to_vec())
}

/// code parameters. the defaults are what every enrolled authenticator in
/// the portal uses, one 30 second step of drift tolerated on either side
#[derive(Debug, Clone)]
pub struct Settings {
    pub algo: Algo,
    pub digits: u32,
    pub step: u64,
    pub window_before: u64,
    pub window_after: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            algo: Algo::SHA1,
            digits: 6,
            step: 30,
            window_before: 1,
            window_after: 1,
        }
    }
}

/// dynamic truncation from rfc 4226, zero padded to the requested digits
pub fn generate_code(secret: &[u8], algo: Algo, digits: u32, counter: u64) -> String {
    let digest = algo.digest(secret, counter);

    let offset = (digest[digest.len() - 1] & 0xf) as usize;
    let binary = ((digest[offset] as u32 & 0x7f) << 24)
        | ((digest[offset + 1] as u32) << 16)
        | ((digest[offset + 2] as u32) << 8)
        | (digest[offset + 3] as u32);

    let code = binary % 10u32.pow(digits);

    format!("{:0>width$}", code, width = digits as usize)
}

/// checks the given code against every step in the tolerance window.
/// every candidate is compared in constant time and the scan never stops
/// early on a match
pub fn verify_code(secret: &[u8], settings: &Settings, code: &str, now: DateTime<Utc>) -> bool {
    if code.len() != settings.digits as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let timestamp = now.timestamp().max(0) as u64;
    let current = timestamp / settings.step;

    let first = current.saturating_sub(settings.window_before);
    let last = current.saturating_add(settings.window_after);

    let mut valid = false;

    for counter in first..=last {
        let expected = generate_code(secret, settings.algo, settings.digits, counter);

        if token::constant_time_eq(expected.as_bytes(), code.as_bytes()) {
            valid = true;
        }
    }

    valid
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    // rfc 6238 appendix b secrets
    const SECRET_SHA1: &[u8] = b"12345678901234567890";
    const SECRET_SHA256: &[u8] = b"12345678901234567890123456789012";
    const SECRET_SHA512: &[u8] =
        b"1234567890123456789012345678901234567890123456789012345678901234";

    fn at(timestamp: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(timestamp, 0).unwrap()
    }

    fn vector_settings(algo: Algo) -> Settings {
        Settings {
            algo,
            digits: 8,
            step: 30,
            window_before: 0,
            window_after: 0,
        }
    }

    #[test]
    fn rfc6238_sha1_vectors() {
        let cases: [(i64, &str); 6] = [
            (59, "94287082"),
            (1111111109, "07081804"),
            (1111111111, "14050471"),
            (1234567890, "89005924"),
            (2000000000, "69279037"),
            (20000000000, "65353130"),
        ];

        for (timestamp, expected) in cases {
            let counter = (timestamp as u64) / 30;

            assert_eq!(
                generate_code(SECRET_SHA1, Algo::SHA1, 8, counter),
                expected,
                "wrong code for T={timestamp}"
            );
        }
    }

    #[test]
    fn rfc6238_sha256_and_sha512_vectors() {
        assert_eq!(generate_code(SECRET_SHA256, Algo::SHA256, 8, 1), "46119246");
        assert_eq!(generate_code(SECRET_SHA512, Algo::SHA512, 8, 1), "90693936");
    }

    #[test]
    fn verify_accepts_current_step() {
        let settings = vector_settings(Algo::SHA1);

        assert!(verify_code(SECRET_SHA1, &settings, "94287082", at(59)));
    }

    #[test]
    fn verify_tolerates_one_step_of_drift() {
        let settings = Settings {
            digits: 8,
            ..Settings::default()
        };

        // code from T=59 lands in the step before T=61
        assert!(verify_code(SECRET_SHA1, &settings, "94287082", at(61)));
        // and in the step after T=29
        assert!(verify_code(SECRET_SHA1, &settings, "94287082", at(29)));
    }

    #[test]
    fn verify_rejects_two_steps_of_drift() {
        let settings = Settings {
            digits: 8,
            ..Settings::default()
        };

        assert!(!verify_code(SECRET_SHA1, &settings, "94287082", at(120)));
        assert!(!verify_code(SECRET_SHA1, &settings, "94287082", at(150)));
    }

    #[test]
    fn verify_rejects_malformed_codes() {
        let settings = vector_settings(Algo::SHA1);

        assert!(!verify_code(SECRET_SHA1, &settings, "9428708", at(59)));
        assert!(!verify_code(SECRET_SHA1, &settings, "942870822", at(59)));
        assert!(!verify_code(SECRET_SHA1, &settings, "9428708a", at(59)));
        assert!(!verify_code(SECRET_SHA1, &settings, "", at(59)));
    }

    #[test]
    fn secret_has_expected_length() {
        assert_eq!(create_secret().unwrap().len(), SECRET_LEN);
    }
}
