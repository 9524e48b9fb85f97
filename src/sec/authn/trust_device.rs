use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use futures::TryStreamExt;
use serde::{Serialize, Deserialize};
use tokio_postgres::Error as PgError;

use crate::ids;
use crate::sec::chacha;
use crate::sec::state::Sec;

use super::token;

/// fixed name of the second factor bypass cookie
pub const COOKIE_NAME: &str = "trusted_device";

pub const TTL_DAYS: i64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("date time value overflowed")]
    UtcOverflow,

    #[error(transparent)]
    Rand(#[from] rand::Error),

    #[error(transparent)]
    Crypto(#[from] chacha::CryptoError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Pg(#[from] PgError),
}

/// what the browser looked like when the user chose to trust it. shown on
/// the manage devices page so people can recognize their own sessions
#[derive(Debug, Serialize, Deserialize)]
pub struct Fingerprint {
    pub platform: String,
    pub browser: String,
    pub ip: String,
}

impl Fingerprint {
    pub fn describe(&self) -> String {
        format!("{} / {} ({})", self.platform, self.browser, self.ip)
    }
}

pub struct TrustDevice {
    pub id: ids::DeviceId,
    pub user_id: ids::UserId,
    pub selector: String,
    pub hash: Vec<u8>,
    pub expires: DateTime<Utc>,
    pub fingerprint: Vec<u8>,
}

impl TrustDevice {
    /// recomputes the binding hash for this row and compares it to the
    /// stored one in constant time
    pub fn matches(&self, verifier: &[u8]) -> bool {
        let expected = token::bind_hash(verifier, self.user_id, &self.expires);

        token::constant_time_eq(expected.as_bytes(), &self.hash)
    }
}

#[derive(Debug)]
pub struct Issued {
    pub device_id: ids::DeviceId,
    pub cookie: String,
    pub expires: DateTime<Utc>,
}

/// row shape for the manage devices page, no verifier material included
#[derive(Debug)]
pub struct DeviceEntry {
    pub id: ids::DeviceId,
    pub expires: DateTime<Utc>,
    pub description: String,
}

pub async fn create(
    conn: &impl GenericClient,
    sec: &Sec,
    user_id: &ids::UserId,
    fingerprint: &Fingerprint,
    ttl: Option<chrono::Duration>,
) -> Result<Issued, DeviceError> {
    let selector = token::generate_hex(token::SELECTOR_LEN)?;
    let verifier = token::generate(token::VERIFIER_LEN)?;

    let issued_on = Utc::now();
    let duration = ttl.unwrap_or_else(|| chrono::Duration::days(TTL_DAYS));

    let Some(expires) = issued_on.checked_add_signed(duration) else {
        return Err(DeviceError::UtcOverflow);
    };

    let hash = token::bind_hash(&verifier, *user_id, &expires);
    let encrypted = sec.fingerprint().encrypt(&serde_json::to_vec(fingerprint)?)?;

    let row = conn.query_one(
        "\
        insert into auth_trust_device (user_id, selector, hash, expires, fingerprint) values \
        ($1, $2, $3, $4, $5) \
        returning id",
        &[user_id, &selector, &hash.as_bytes().as_slice(), &expires, &encrypted]
    ).await?;

    Ok(Issued {
        device_id: row.get(0),
        cookie: token::join(&selector, &verifier),
        expires,
    })
}

/// every unexpired row for the selector. the caller still has to check
/// each candidate with [`TrustDevice::matches`]
pub async fn find_valid(
    conn: &impl GenericClient,
    user_id: &ids::UserId,
    selector: &str,
) -> Result<Vec<TrustDevice>, PgError> {
    let now = Utc::now();
    let params: crate::sql::ParamsArray<3> = [user_id, &selector, &now];

    let stream = conn.query_raw(
        "\
        select auth_trust_device.id, \
               auth_trust_device.user_id, \
               auth_trust_device.selector, \
               auth_trust_device.hash, \
               auth_trust_device.expires, \
               auth_trust_device.fingerprint \
        from auth_trust_device \
        where auth_trust_device.user_id = $1 and \
              auth_trust_device.selector = $2 and \
              auth_trust_device.expires > $3",
        params
    ).await?;

    futures::pin_mut!(stream);

    let mut rtn = Vec::new();

    while let Some(row) = stream.try_next().await? {
        rtn.push(TrustDevice {
            id: row.get(0),
            user_id: row.get(1),
            selector: row.get(2),
            hash: row.get(3),
            expires: row.get(4),
            fingerprint: row.get(5),
        });
    }

    Ok(rtn)
}

/// unexpired devices for display. a fingerprint that fails to decrypt is
/// reported as unknown instead of failing the whole listing
pub async fn list(
    conn: &impl GenericClient,
    sec: &Sec,
    user_id: &ids::UserId,
) -> Result<Vec<DeviceEntry>, PgError> {
    let now = Utc::now();
    let params: crate::sql::ParamsArray<2> = [user_id, &now];

    let stream = conn.query_raw(
        "\
        select auth_trust_device.id, \
               auth_trust_device.expires, \
               auth_trust_device.fingerprint \
        from auth_trust_device \
        where auth_trust_device.user_id = $1 and \
              auth_trust_device.expires > $2 \
        order by auth_trust_device.expires desc",
        params
    ).await?;

    futures::pin_mut!(stream);

    let mut rtn = Vec::new();

    while let Some(row) = stream.try_next().await? {
        let id: ids::DeviceId = row.get(0);
        let encrypted: Vec<u8> = row.get(2);

        let description = match decrypt_fingerprint(sec, &encrypted) {
            Ok(fingerprint) => fingerprint.describe(),
            Err(err) => {
                tracing::warn!("failed to decrypt fingerprint for device {id}: {err}");

                String::from("unknown device")
            }
        };

        rtn.push(DeviceEntry {
            id,
            expires: row.get(1),
            description,
        });
    }

    Ok(rtn)
}

fn decrypt_fingerprint(sec: &Sec, encrypted: &[u8]) -> Result<Fingerprint, DeviceError> {
    let decrypted = sec.fingerprint().decrypt(encrypted)?;

    Ok(serde_json::from_slice(&decrypted)?)
}

/// best effort batch delete. each id is attempted on its own, a failure is
/// logged and the rest of the batch still goes through
pub async fn revoke(
    conn: &impl GenericClient,
    ids: &[ids::DeviceId],
) -> u64 {
    let mut rtn = 0;

    for id in ids {
        match conn.execute(
            "delete from auth_trust_device where id = $1",
            &[id]
        ).await {
            Ok(count) => rtn += count,
            Err(err) => {
                tracing::warn!("failed to revoke trust device {id}: {err}");
            }
        }
    }

    rtn
}

/// opportunistic sweep for a host scheduled job
pub async fn delete_expired(conn: &impl GenericClient) -> Result<u64, PgError> {
    let now = Utc::now();

    let count = conn.execute(
        "delete from auth_trust_device where expires <= $1",
        &[&now]
    ).await?;

    if count > 0 {
        tracing::info!("dropped {count} expired trust devices");
    }

    Ok(count)
}
