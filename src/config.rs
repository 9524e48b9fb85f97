use data_encoding::HEXLOWER_PERMISSIVE;
use serde::Deserialize;

use crate::error::{self, Context};

pub type Kdf = hkdf::Hkdf<sha3::Sha3_512>;

pub const MASTER_KEY_MIN_BYTES: usize = 16;

fn default_host() -> String {
    String::from("localhost")
}

fn default_port() -> u16 {
    5432
}

fn default_pool_size() -> usize {
    4
}

fn default_account_timeout() -> i64 {
    30
}

fn default_trust_device_days() -> i64 {
    30
}

#[derive(Debug, Deserialize)]
pub struct Db {
    pub user: String,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub dbname: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

#[derive(Debug, Deserialize)]
pub struct Site {
    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default)]
    pub secure: bool,
}

#[derive(Debug, Deserialize)]
pub struct Tokens {
    #[serde(default = "default_account_timeout")]
    pub account_timeout_minutes: i64,

    #[serde(default = "default_trust_device_days")]
    pub trust_device_days: i64,
}

/// settings shape provided by the hosting application. loading and merging
/// config files is the host's concern, the crate only consumes the result.
#[derive(Debug, Deserialize)]
pub struct Settings {
    pub db: Db,

    #[serde(default)]
    pub site: Site,

    #[serde(default)]
    pub tokens: Tokens,

    /// hex encoded master secret that all working keys derive from
    pub master_key: String,
}

impl Default for Site {
    fn default() -> Self {
        Site {
            domain: None,
            secure: false,
        }
    }
}

impl Default for Tokens {
    fn default() -> Self {
        Tokens {
            account_timeout_minutes: default_account_timeout(),
            trust_device_days: default_trust_device_days(),
        }
    }
}

pub struct Config {
    pub settings: Settings,
    pub kdf: Kdf,
}

impl Config {
    pub fn new(settings: Settings) -> error::Result<Self> {
        let ikm = HEXLOWER_PERMISSIVE.decode(settings.master_key.as_bytes())
            .context("master_key is not valid hex")?;

        if ikm.len() < MASTER_KEY_MIN_BYTES {
            return Err(error::Error::new()
                .kind("MasterKeyTooShort")
                .message("master_key must be at least 16 bytes"));
        }

        let kdf = Kdf::new(None, &ikm);

        Ok(Config {
            settings,
            kdf,
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
