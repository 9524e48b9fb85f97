use std::fmt::Write;

use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use tokio_postgres::Error as PgError;

use crate::ids;
use crate::sql;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Active,
    Blocked,
}

impl Status {
    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            0 => Some(Status::Pending),
            1 => Some(Status::Active),
            2 => Some(Status::Blocked),
            _ => None
        }
    }

    pub fn as_i16(&self) -> i16 {
        match self {
            Status::Pending => 0,
            Status::Active => 1,
            Status::Blocked => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Staff,
    Admin,
}

impl Role {
    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            0 => Some(Role::Student),
            1 => Some(Role::Staff),
            2 => Some(Role::Admin),
            _ => None
        }
    }

    pub fn as_i16(&self) -> i16 {
        match self {
            Role::Student => 0,
            Role::Staff => 1,
            Role::Admin => 2,
        }
    }
}

pub struct User {
    pub id: ids::UserId,
    pub username: String,
    pub hash: String,
    pub role: Role,
    pub status: Status,
    pub mfa_enabled: bool,
    pub mfa_key_verified: bool,
    pub totp_secret: Option<Vec<u8>>,
    pub registration_number: Option<String>,
    pub created: DateTime<Utc>,
}

const USER_COLUMNS: &str = "\
    users.id, \
    users.username, \
    users.hash, \
    users.role, \
    users.status, \
    users.mfa_enabled, \
    users.mfa_key_verified, \
    users.totp_secret, \
    users.registration_number, \
    users.created";

fn from_row(row: tokio_postgres::Row) -> User {
    User {
        id: row.get(0),
        username: row.get(1),
        hash: row.get(2),
        role: Role::from_i16(row.get(3))
            .expect("invalid role returned from database for user"),
        status: Status::from_i16(row.get(4))
            .expect("invalid status returned from database for user"),
        mfa_enabled: row.get(5),
        mfa_key_verified: row.get(6),
        totp_secret: row.get(7),
        registration_number: row.get(8),
        created: row.get(9),
    }
}

impl User {
    pub async fn retrieve(
        conn: &impl GenericClient,
        user_id: &ids::UserId,
    ) -> Result<Option<User>, PgError> {
        Ok(conn.query_opt(
            format!("select {USER_COLUMNS} from users where users.id = $1").as_str(),
            &[user_id]
        )
            .await?
            .map(from_row))
    }

    pub async fn retrieve_username(
        conn: &impl GenericClient,
        username: &str,
    ) -> Result<Option<User>, PgError> {
        Ok(conn.query_opt(
            format!("select {USER_COLUMNS} from users where users.username = $1").as_str(),
            &[&username]
        )
            .await?
            .map(from_row))
    }

    /// login lookup, the identifier may be a username or a numeric user id
    pub async fn retrieve_identifier(
        conn: &impl GenericClient,
        identifier: &str,
    ) -> Result<Option<User>, PgError> {
        let mut query = format!("select {USER_COLUMNS} from users where users.username = $1");
        let mut params: sql::ParamsVec = vec![&identifier];

        let id_param;

        if let Ok(id) = identifier.parse::<ids::UserId>() {
            id_param = id;

            write!(
                &mut query,
                " or users.id = ${}",
                sql::push_param(&mut params, &id_param)
            ).unwrap();
        }

        Ok(conn.query_opt(query.as_str(), params.as_slice())
            .await?
            .map(from_row))
    }

    /// stores a freshly enrolled second factor key. the secret arrives
    /// already encrypted, this module never sees key material in the clear
    pub async fn update_totp(
        &mut self,
        conn: &impl GenericClient,
        encrypted_secret: Option<Vec<u8>>,
        verified: bool,
    ) -> Result<(), PgError> {
        let enabled = encrypted_secret.is_some();

        let _ = conn.execute(
            "\
            update users \
            set totp_secret = $2, \
                mfa_enabled = $3, \
                mfa_key_verified = $4 \
            where id = $1",
            &[&self.id, &encrypted_secret, &enabled, &verified]
        ).await?;

        self.totp_secret = encrypted_secret;
        self.mfa_enabled = enabled;
        self.mfa_key_verified = verified;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_codec_round_trip() {
        for status in [Status::Pending, Status::Active, Status::Blocked] {
            assert_eq!(Status::from_i16(status.as_i16()), Some(status));
        }

        assert_eq!(Status::from_i16(3), None);
    }

    #[test]
    fn role_codec_round_trip() {
        for role in [Role::Student, Role::Staff, Role::Admin] {
            assert_eq!(Role::from_i16(role.as_i16()), Some(role));
        }

        assert_eq!(Role::from_i16(-1), None);
    }
}
