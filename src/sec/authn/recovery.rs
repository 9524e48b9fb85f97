use deadpool_postgres::GenericClient;
use futures::TryStreamExt;
use tokio_postgres::Error as PgError;

use crate::ids;
use crate::sec::chacha;
use crate::sec::state::Sec;

use super::token;

pub const BATCH_SIZE: usize = 10;
pub const SELECTOR_LEN: usize = 3;
pub const VERIFIER_LEN: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// uniform failure for unknown selectors and wrong verifiers
    #[error("recovery code is not valid")]
    NotFound,

    #[error(transparent)]
    Rand(#[from] rand::Error),

    #[error(transparent)]
    Crypto(#[from] chacha::CryptoError),

    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    Pg(#[from] PgError),
}

/// the user facing form, six hex digits, a dash, six hex digits
pub fn display_form(selector: &str, verifier: &str) -> String {
    format!("{selector}-{verifier}")
}

/// splits user input back into selector and verifier. accepts exactly the
/// shape `generate` hands out
pub fn split_code(given: &str) -> Option<(&str, &str)> {
    let (selector, verifier) = given.split_once('-')?;

    if selector.len() != SELECTOR_LEN * 2 || verifier.len() != VERIFIER_LEN * 2 {
        return None;
    }

    let hex = |s: &str| s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));

    if !hex(selector) || !hex(verifier) {
        return None;
    }

    Some((selector, verifier))
}

/// issues a fresh batch of ten codes. any codes the user still had are
/// invalidated first so exactly one batch is ever live
pub async fn generate(
    conn: &impl GenericClient,
    sec: &Sec,
    user_id: &ids::UserId,
) -> Result<Vec<String>, RecoveryError> {
    let _ = delete_all(conn, user_id).await?;

    let mut rtn = Vec::with_capacity(BATCH_SIZE);

    for _ in 0..BATCH_SIZE {
        let selector = token::generate_hex(SELECTOR_LEN)?;
        let verifier = token::generate_hex(VERIFIER_LEN)?;

        let encrypted = sec.recovery().encrypt(verifier.as_bytes())?;

        let _ = conn.execute(
            "\
            insert into auth_recovery_code (user_id, selector, verifier) values \
            ($1, $2, $3)",
            &[user_id, &selector, &encrypted]
        ).await?;

        rtn.push(display_form(&selector, &verifier));
    }

    Ok(rtn)
}

/// decrypted display forms for the view my codes page
pub async fn list(
    conn: &impl GenericClient,
    sec: &Sec,
    user_id: &ids::UserId,
) -> Result<Vec<String>, RecoveryError> {
    let params: crate::sql::ParamsArray<1> = [user_id];

    let stream = conn.query_raw(
        "\
        select auth_recovery_code.selector, \
               auth_recovery_code.verifier \
        from auth_recovery_code \
        where auth_recovery_code.user_id = $1 \
        order by auth_recovery_code.id",
        params
    ).await?;

    futures::pin_mut!(stream);

    let mut rtn = Vec::new();

    while let Some(row) = stream.try_next().await? {
        let selector: String = row.get(0);
        let encrypted: Vec<u8> = row.get(1);

        let verifier = String::from_utf8(sec.recovery().decrypt(&encrypted)?)?;

        rtn.push(display_form(&selector, &verifier));
    }

    Ok(rtn)
}

/// single use consumption. the matching row is deleted before success is
/// reported, a replay of the same code is just an unknown selector
pub async fn consume(
    conn: &impl GenericClient,
    sec: &Sec,
    selector: &str,
    verifier: &str,
) -> Result<(), RecoveryError> {
    let rows = conn.query(
        "\
        select auth_recovery_code.id, \
               auth_recovery_code.verifier \
        from auth_recovery_code \
        where auth_recovery_code.selector = $1",
        &[&selector]
    ).await?;

    for row in rows {
        let id: ids::CodeId = row.get(0);
        let encrypted: Vec<u8> = row.get(1);

        let stored = match sec.recovery().decrypt(&encrypted) {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!("failed to decrypt recovery code {id}: {err}");

                continue;
            }
        };

        if token::constant_time_eq(&stored, verifier.as_bytes()) {
            let _ = conn.execute(
                "delete from auth_recovery_code where id = $1",
                &[&id]
            ).await?;

            return Ok(());
        }
    }

    Err(RecoveryError::NotFound)
}

pub async fn delete_all(
    conn: &impl GenericClient,
    user_id: &ids::UserId,
) -> Result<u64, PgError> {
    conn.execute(
        "delete from auth_recovery_code where user_id = $1",
        &[user_id]
    ).await
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_form_round_trip() {
        let selector = token::generate_hex(SELECTOR_LEN).unwrap();
        let verifier = token::generate_hex(VERIFIER_LEN).unwrap();

        let code = display_form(&selector, &verifier);
        let (parsed_selector, parsed_verifier) = split_code(&code).unwrap();

        assert_eq!(parsed_selector, selector);
        assert_eq!(parsed_verifier, verifier);
    }

    #[test]
    fn split_rejects_malformed_codes() {
        assert!(split_code("abcdef").is_none());
        assert!(split_code("abcde-abcdef").is_none());
        assert!(split_code("abcdef-abcde").is_none());
        assert!(split_code("ABCDEF-abcdef").is_none());
        assert!(split_code("abcdeg-abcdef").is_none());
        assert!(split_code("").is_none());
        assert!(split_code("abcdef-abcdef-abcdef").is_none());
    }

    #[test]
    fn split_accepts_generated_shape() {
        let (selector, verifier) = split_code("0123ab-cdef45").unwrap();

        assert_eq!(selector, "0123ab");
        assert_eq!(verifier, "cdef45");
    }
}
