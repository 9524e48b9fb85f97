use argon2::Variant;
use rand::RngCore;

pub const SALT_LEN: usize = 32;

pub type Salt = [u8; SALT_LEN];

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error(transparent)]
    Rand(#[from] rand::Error),

    #[error(transparent)]
    Argon2(#[from] argon2::Error),
}

pub fn gen_salt() -> Result<Salt, rand::Error> {
    let mut salt = [0u8; SALT_LEN];

    rand::thread_rng().try_fill_bytes(&mut salt)?;

    Ok(salt)
}

pub fn gen_hash(password: &str) -> Result<String, PasswordError> {
    let salt = gen_salt()?;

    let mut config = argon2::Config::default();
    config.mem_cost = 19456;
    config.variant = Variant::Argon2id;

    Ok(argon2::hash_encoded(
        password.as_bytes(),
        &salt,
        &config
    )?)
}

/// timing safe compare against the stored encoded hash
pub fn verify_hash<C>(encoded: &str, check: C) -> Result<bool, argon2::Error>
where
    C: AsRef<[u8]>
{
    argon2::verify_encoded_ext(encoded, check.as_ref(), &[], &[])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hash_verify_round_trip() {
        let encoded = gen_hash("correct horse battery staple").unwrap();

        assert!(verify_hash(&encoded, "correct horse battery staple").unwrap());
        assert!(!verify_hash(&encoded, "correct horse battery stable").unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let first = gen_hash("duplicate").unwrap();
        let second = gen_hash("duplicate").unwrap();

        assert_ne!(first, second, "two hashes of one password shared a salt");
    }
}
