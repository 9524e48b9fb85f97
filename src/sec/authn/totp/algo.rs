use std::str::FromStr;

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algo {
    SHA1,
    SHA256,
    SHA512,
}

impl Algo {
    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            0 => Some(Algo::SHA1),
            1 => Some(Algo::SHA256),
            2 => Some(Algo::SHA512),
            _ => None
        }
    }

    pub fn as_i16(&self) -> i16 {
        match self {
            Algo::SHA1 => 0,
            Algo::SHA256 => 1,
            Algo::SHA512 => 2,
        }
    }

    /// hmac of the big endian counter under the shared secret
    pub fn digest(&self, secret: &[u8], counter: u64) -> Vec<u8> {
        let buf = counter.to_be_bytes();

        match self {
            Algo::SHA1 => {
                let mut mac = Hmac::<Sha1>::new_from_slice(secret).unwrap();
                mac.update(&buf);
                mac.finalize().into_bytes().to_vec()
            },
            Algo::SHA256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(secret).unwrap();
                mac.update(&buf);
                mac.finalize().into_bytes().to_vec()
            },
            Algo::SHA512 => {
                let mut mac = Hmac::<Sha512>::new_from_slice(secret).unwrap();
                mac.update(&buf);
                mac.finalize().into_bytes().to_vec()
            },
        }
    }
}

pub struct FromIntError;

impl TryFrom<i16> for Algo {
    type Error = FromIntError;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        Self::from_i16(v).ok_or(FromIntError)
    }
}

impl From<Algo> for i16 {
    fn from(v: Algo) -> i16 {
        v.as_i16()
    }
}

pub struct FromStrError;

impl FromStr for Algo {
    type Err = FromStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SHA1" => Ok(Algo::SHA1),
            "SHA256" => Ok(Algo::SHA256),
            "SHA512" => Ok(Algo::SHA512),
            _ => Err(FromStrError),
        }
    }
}

impl std::fmt::Display for Algo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Algo::SHA1 => f.write_str("SHA1"),
            Algo::SHA256 => f.write_str("SHA256"),
            Algo::SHA512 => f.write_str("SHA512"),
        }
    }
}
