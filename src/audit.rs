use chrono::Utc;
use deadpool_postgres::GenericClient;
use tokio_postgres::Error as PgError;

use crate::ids;
use crate::sql;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    LoginFailed,
    LoginBlocked,
    LoginPending,
    LoginPassed,
    TotpPassed,
    TotpFailed,
    RecoveryPassed,
    RecoveryFailed,
    TokenIssued,
    TokenVerified,
}

impl AuthEvent {
    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            0 => Some(AuthEvent::LoginFailed),
            1 => Some(AuthEvent::LoginBlocked),
            2 => Some(AuthEvent::LoginPending),
            3 => Some(AuthEvent::LoginPassed),
            4 => Some(AuthEvent::TotpPassed),
            5 => Some(AuthEvent::TotpFailed),
            6 => Some(AuthEvent::RecoveryPassed),
            7 => Some(AuthEvent::RecoveryFailed),
            8 => Some(AuthEvent::TokenIssued),
            9 => Some(AuthEvent::TokenVerified),
            _ => None
        }
    }

    pub fn as_i16(&self) -> i16 {
        match self {
            AuthEvent::LoginFailed => 0,
            AuthEvent::LoginBlocked => 1,
            AuthEvent::LoginPending => 2,
            AuthEvent::LoginPassed => 3,
            AuthEvent::TotpPassed => 4,
            AuthEvent::TotpFailed => 5,
            AuthEvent::RecoveryPassed => 6,
            AuthEvent::RecoveryFailed => 7,
            AuthEvent::TokenIssued => 8,
            AuthEvent::TokenVerified => 9,
        }
    }
}

/// appends one auth event. the identifier is recorded exactly as the
/// client submitted it so failed probes are visible even when no user row
/// exists
pub async fn record(
    conn: &impl GenericClient,
    user_id: Option<ids::UserId>,
    identifier: &str,
    event: AuthEvent,
    detail: Option<serde_json::Value>,
) -> Result<(), PgError> {
    let created = Utc::now();
    let event = event.as_i16();
    let detail = detail.map(sql::ser_to_sql);

    let _ = conn.execute(
        "\
        insert into auth_log (user_id, identifier, event, detail, created) values \
        ($1, $2, $3, $4, $5)",
        &[&user_id, &identifier, &event, &detail, &created]
    ).await?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn event_codec_round_trip() {
        let all = [
            AuthEvent::LoginFailed,
            AuthEvent::LoginBlocked,
            AuthEvent::LoginPending,
            AuthEvent::LoginPassed,
            AuthEvent::TotpPassed,
            AuthEvent::TotpFailed,
            AuthEvent::RecoveryPassed,
            AuthEvent::RecoveryFailed,
            AuthEvent::TokenIssued,
            AuthEvent::TokenVerified,
        ];

        for event in all {
            assert_eq!(AuthEvent::from_i16(event.as_i16()), Some(event));
        }

        assert_eq!(AuthEvent::from_i16(10), None);
    }
}
