use crate::config;
use crate::error::{self, Context};

use super::chacha;

pub const TOTP_KEY_INFO: &[u8] = b"handin/sec/totp";
pub const FINGERPRINT_KEY_INFO: &[u8] = b"handin/sec/fingerprint";
pub const RECOVERY_KEY_INFO: &[u8] = b"handin/sec/recovery";

#[derive(Debug)]
pub struct CookieInfo {
    domain: Option<String>,
    secure: bool,
}

impl CookieInfo {
    pub fn domain(&self) -> Option<&String> {
        self.domain.as_ref()
    }

    pub fn secure(&self) -> bool {
        self.secure
    }
}

/// working keys for the reversible secrets plus the cookie site settings
/// and configured token lifetimes. each key is expanded from the master
/// secret with its own info string so no two purposes ever share key
/// material
#[derive(Debug)]
pub struct Sec {
    totp: chacha::Cipher,
    fingerprint: chacha::Cipher,
    recovery: chacha::Cipher,
    cookie: CookieInfo,
    account_token_timeout: chrono::Duration,
    trust_device_ttl: chrono::Duration,
}

fn expand_key(kdf: &config::Kdf, info: &[u8]) -> error::Result<chacha::Key> {
    let mut key = chacha::empty_key();

    kdf.expand(info, &mut key)
        .map_err(error::Error::from)
        .context("failed to expand working key from master secret")?;

    Ok(key)
}

impl Sec {
    pub fn from_config(config: &config::Config) -> error::Result<Sec> {
        tracing::debug!("creating Sec state");

        let totp = chacha::Cipher::new(&expand_key(&config.kdf, TOTP_KEY_INFO)?);
        let fingerprint = chacha::Cipher::new(&expand_key(&config.kdf, FINGERPRINT_KEY_INFO)?);
        let recovery = chacha::Cipher::new(&expand_key(&config.kdf, RECOVERY_KEY_INFO)?);

        Ok(Sec {
            totp,
            fingerprint,
            recovery,
            cookie: CookieInfo {
                domain: config.settings.site.domain.clone(),
                secure: config.settings.site.secure,
            },
            account_token_timeout: chrono::Duration::minutes(
                config.settings.tokens.account_timeout_minutes
            ),
            trust_device_ttl: chrono::Duration::days(
                config.settings.tokens.trust_device_days
            ),
        })
    }

    pub fn totp(&self) -> &chacha::Cipher {
        &self.totp
    }

    pub fn fingerprint(&self) -> &chacha::Cipher {
        &self.fingerprint
    }

    pub fn recovery(&self) -> &chacha::Cipher {
        &self.recovery
    }

    pub fn cookie(&self) -> &CookieInfo {
        &self.cookie
    }

    pub fn account_token_timeout(&self) -> chrono::Duration {
        self.account_token_timeout
    }

    pub fn trust_device_ttl(&self) -> chrono::Duration {
        self.trust_device_ttl
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{Config, Db, Settings, Site, Tokens};

    fn test_config() -> Config {
        Config::new(Settings {
            db: Db {
                user: String::from("handin"),
                password: None,
                host: String::from("localhost"),
                port: 5432,
                dbname: String::from("handin"),
                pool_size: 1,
            },
            site: Site::default(),
            tokens: Tokens::default(),
            master_key: "ab".repeat(32),
        }).expect("failed to build test config")
    }

    #[test]
    fn derivation_is_deterministic() {
        let first = Sec::from_config(&test_config()).unwrap();
        let second = Sec::from_config(&test_config()).unwrap();

        let encrypted = first.totp().encrypt(b"shared secret").unwrap();
        let decrypted = second.totp().decrypt(&encrypted).unwrap();

        assert_eq!(decrypted.as_slice(), b"shared secret");
    }

    #[test]
    fn purposes_get_distinct_keys() {
        let sec = Sec::from_config(&test_config()).unwrap();

        let encrypted = sec.totp().encrypt(b"totp secret").unwrap();

        assert!(sec.fingerprint().decrypt(&encrypted).is_err());
        assert!(sec.recovery().decrypt(&encrypted).is_err());
    }
}
