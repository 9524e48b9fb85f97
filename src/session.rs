use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use tokio_postgres::Error as PgError;

use crate::ids;

pub struct SessionRecord {
    pub id: String,
    pub data: Vec<u8>,
    pub user_id: Option<ids::UserId>,
    pub touched: DateTime<Utc>,
}

/// the hosting runtime opens the handler before the first read. the pool
/// is already live so there is nothing to acquire
pub fn open() {}

/// counterpart of [`open`], nothing to release
pub fn close() {}

pub async fn retrieve(
    conn: &impl GenericClient,
    session_id: &str,
) -> Result<Option<SessionRecord>, PgError> {
    Ok(conn.query_opt(
        "\
        select sessions.id, \
               sessions.data, \
               sessions.user_id, \
               sessions.touched \
        from sessions \
        where sessions.id = $1",
        &[&session_id]
    )
        .await?
        .map(|row| SessionRecord {
            id: row.get(0),
            data: row.get(1),
            user_id: row.get(2),
            touched: row.get(3),
        }))
}

/// returns the stored blob. an unknown id lazily creates a bare row, empty
/// data and no user, so a fresh session exists before its first write
pub async fn read(
    conn: &impl GenericClient,
    session_id: &str,
) -> Result<Vec<u8>, PgError> {
    if let Some(row) = conn.query_opt(
        "select sessions.data from sessions where sessions.id = $1",
        &[&session_id]
    ).await? {
        Ok(row.get(0))
    } else {
        let now = Utc::now();
        let empty: &[u8] = &[];

        // two first requests can race here, the conflict clause lets the
        // loser ride on the winner's row
        let _ = conn.execute(
            "\
            insert into sessions (id, data, user_id, touched) values \
            ($1, $2, null, $3) \
            on conflict (id) do nothing",
            &[&session_id, &empty, &now]
        ).await?;

        Ok(Vec::new())
    }
}

/// upsert, never a bare update. the lazy create in [`read`] means the row
/// may or may not exist by the time the first write lands
pub async fn write(
    conn: &impl GenericClient,
    session_id: &str,
    data: &[u8],
    user_id: Option<ids::UserId>,
) -> Result<(), PgError> {
    let now = Utc::now();

    let _ = conn.execute(
        "\
        insert into sessions (id, data, user_id, touched) values \
        ($1, $2, $3, $4) \
        on conflict (id) do update \
        set data = excluded.data, \
            user_id = excluded.user_id, \
            touched = excluded.touched",
        &[&session_id, &data, &user_id, &now]
    ).await?;

    Ok(())
}

pub async fn destroy(
    conn: &impl GenericClient,
    session_id: &str,
) -> Result<(), PgError> {
    let _ = conn.execute(
        "delete from sessions where id = $1",
        &[&session_id]
    ).await?;

    Ok(())
}

fn gc_cutoff(now: DateTime<Utc>, max_lifetime_secs: u64) -> DateTime<Utc> {
    // chrono duration arithmetic is bounded well below u64 seconds
    let capped = max_lifetime_secs.min((i64::MAX / 1_000) as u64) as i64;
    let lifetime = chrono::Duration::seconds(capped);

    now.checked_sub_signed(lifetime).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// drops every session whose last touch is older than the given lifetime
pub async fn gc(
    conn: &impl GenericClient,
    max_lifetime_secs: u64,
) -> Result<u64, PgError> {
    let cutoff = gc_cutoff(Utc::now(), max_lifetime_secs);

    let count = conn.execute(
        "delete from sessions where touched < $1",
        &[&cutoff]
    ).await?;

    if count > 0 {
        tracing::info!("dropped {count} sessions");
    }

    Ok(count)
}
