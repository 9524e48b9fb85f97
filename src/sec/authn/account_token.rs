use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use futures::TryStreamExt;
use tokio_postgres::Error as PgError;

use crate::ids;
use crate::user::Status;

use super::token;

pub const TIMEOUT_MINUTES: i64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// one uniform failure for expired, consumed, unknown and mismatched
    /// tokens so the caller cannot be turned into an existence oracle
    #[error("token is invalid or has expired")]
    NotFoundOrExpired,

    #[error("date time value overflowed")]
    UtcOverflow,

    #[error(transparent)]
    Rand(#[from] rand::Error),

    #[error(transparent)]
    Pg(#[from] PgError),
}

/// freshly issued token. `combined` is the only place the verifier ever
/// exists in the clear and it goes straight into the outbound email link
#[derive(Debug)]
pub struct Issued {
    pub token_id: ids::TokenId,
    pub combined: String,
    pub expires: DateTime<Utc>,
}

/// result of a successful verify. the token is dual purpose, a `Pending`
/// user is verifying their account while an `Active` user is resetting
/// their password, the caller dispatches on the live status
#[derive(Debug)]
pub struct Verified {
    pub token_id: ids::TokenId,
    pub user_id: ids::UserId,
    pub username: String,
    pub status: Status,
}

fn matches_candidate(
    verifier: &[u8],
    user_id: ids::UserId,
    expires: &DateTime<Utc>,
    stored: &[u8],
) -> bool {
    let expected = token::bind_hash(verifier, user_id, expires);

    token::constant_time_eq(expected.as_bytes(), stored)
}

pub async fn create(
    conn: &impl GenericClient,
    user_id: &ids::UserId,
    timeout: Option<chrono::Duration>,
) -> Result<Issued, TokenError> {
    let selector = token::generate_hex(token::SELECTOR_LEN)?;
    let verifier = token::generate(token::VERIFIER_LEN)?;

    let issued_on = Utc::now();
    let duration = timeout.unwrap_or_else(|| chrono::Duration::minutes(TIMEOUT_MINUTES));

    let Some(expires) = issued_on.checked_add_signed(duration) else {
        return Err(TokenError::UtcOverflow);
    };

    let hash = token::bind_hash(&verifier, *user_id, &expires);

    let row = conn.query_one(
        "\
        insert into auth_account_token (user_id, selector, hash, expires) values \
        ($1, $2, $3, $4) \
        returning id",
        &[user_id, &selector, &hash.as_bytes().as_slice(), &expires]
    ).await?;

    Ok(Issued {
        token_id: row.get(0),
        combined: token::join(&selector, &verifier),
        expires,
    })
}

pub async fn verify(
    conn: &impl GenericClient,
    given: &str,
) -> Result<Verified, TokenError> {
    let Ok(combined) = token::Combined::parse(given) else {
        return Err(TokenError::NotFoundOrExpired);
    };

    let now = Utc::now();

    // selectors are random but not guaranteed unique, every live candidate
    // gets its hash recomputed against this verifier
    let selector = combined.selector();
    let params: crate::sql::ParamsArray<2> = [&selector, &now];

    let stream = conn.query_raw(
        "\
        select auth_account_token.id, \
               auth_account_token.user_id, \
               auth_account_token.hash, \
               auth_account_token.expires, \
               users.username, \
               users.status \
        from auth_account_token \
        join users on users.id = auth_account_token.user_id \
        where auth_account_token.selector = $1 and \
              auth_account_token.expires > $2",
        params
    ).await?;

    futures::pin_mut!(stream);

    while let Some(row) = stream.try_next().await? {
        let user_id: ids::UserId = row.get(1);
        let stored: Vec<u8> = row.get(2);
        let expires: DateTime<Utc> = row.get(3);

        if matches_candidate(combined.verifier(), user_id, &expires, &stored) {
            return Ok(Verified {
                token_id: row.get(0),
                user_id,
                username: row.get(4),
                status: Status::from_i16(row.get(5))
                    .expect("invalid status returned from database for user"),
            });
        }
    }

    Err(TokenError::NotFoundOrExpired)
}

/// consumes the token. callers run this after acting on a successful
/// verify, a token left behind stays replayable until it expires
pub async fn delete(
    conn: &impl GenericClient,
    token_id: &ids::TokenId,
) -> Result<(), PgError> {
    let _ = conn.execute(
        "delete from auth_account_token where id = $1",
        &[token_id]
    ).await?;

    Ok(())
}

/// opportunistic sweep for a host scheduled job
pub async fn delete_expired(conn: &impl GenericClient) -> Result<u64, PgError> {
    let now = Utc::now();

    let count = conn.execute(
        "delete from auth_account_token where expires <= $1",
        &[&now]
    ).await?;

    if count > 0 {
        tracing::info!("dropped {count} expired account tokens");
    }

    Ok(count)
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn expires() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn candidate_matches_own_binding() {
        let verifier = token::generate(token::VERIFIER_LEN).unwrap();
        let expires = expires();
        let stored = token::bind_hash(&verifier, 42, &expires);

        assert!(matches_candidate(&verifier, 42, &expires, stored.as_bytes()));
    }

    #[test]
    fn candidate_rejects_other_user() {
        let verifier = token::generate(token::VERIFIER_LEN).unwrap();
        let expires = expires();
        let stored = token::bind_hash(&verifier, 42, &expires);

        // same verifier bytes issued to a different user must never match
        assert!(!matches_candidate(&verifier, 43, &expires, stored.as_bytes()));
    }

    #[test]
    fn candidate_rejects_shifted_expiry() {
        let verifier = token::generate(token::VERIFIER_LEN).unwrap();
        let expires = expires();
        let stored = token::bind_hash(&verifier, 42, &expires);
        let shifted = expires + chrono::Duration::minutes(1);

        assert!(!matches_candidate(&verifier, 42, &shifted, stored.as_bytes()));
    }

    #[test]
    fn candidate_rejects_wrong_verifier() {
        let verifier = token::generate(token::VERIFIER_LEN).unwrap();
        let other = token::generate(token::VERIFIER_LEN).unwrap();
        let expires = expires();
        let stored = token::bind_hash(&verifier, 42, &expires);

        assert!(!matches_candidate(&other, 42, &expires, stored.as_bytes()));
    }
}
