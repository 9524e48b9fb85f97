use chrono::Utc;
use deadpool_postgres::GenericClient;
use tokio_postgres::Error as PgError;

use crate::audit::{self, AuthEvent};
use crate::ids;
use crate::net::cookie::{SameSite, SetCookie};
use crate::notify::Notifier;
use crate::sec::state::Sec;
use crate::session;
use crate::user::{self, Status};

use super::{account_token, password, recovery, token, totp, trust_device};

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// covers unknown identifiers and wrong passwords alike
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("account is blocked")]
    AccountBlocked,

    #[error("account has not been verified yet")]
    AccountPending,

    #[error("no second factor key is configured")]
    NoMfaKeyConfigured,

    #[error("second factor key could not be read")]
    DecryptFailure,

    #[error("token is invalid or has expired")]
    InvalidOrExpiredToken,

    #[error("cookie value is malformed")]
    InvalidCookieFormat,

    #[error("verification code is not valid")]
    InvalidCode,

    #[error("date time value overflowed")]
    UtcOverflow,

    #[error(transparent)]
    Rand(#[from] rand::Error),

    #[error(transparent)]
    Argon2(#[from] argon2::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Db(#[from] PgError),
}

impl From<password::PasswordError> for VerifyError {
    fn from(err: password::PasswordError) -> Self {
        match err {
            password::PasswordError::Rand(e) => VerifyError::Rand(e),
            password::PasswordError::Argon2(e) => VerifyError::Argon2(e),
        }
    }
}

impl From<trust_device::DeviceError> for VerifyError {
    fn from(err: trust_device::DeviceError) -> Self {
        match err {
            trust_device::DeviceError::UtcOverflow => VerifyError::UtcOverflow,
            trust_device::DeviceError::Rand(e) => VerifyError::Rand(e),
            trust_device::DeviceError::Crypto(_) => VerifyError::DecryptFailure,
            trust_device::DeviceError::Json(e) => VerifyError::Json(e),
            trust_device::DeviceError::Pg(e) => VerifyError::Db(e),
        }
    }
}

impl From<recovery::RecoveryError> for VerifyError {
    fn from(err: recovery::RecoveryError) -> Self {
        match err {
            recovery::RecoveryError::NotFound => VerifyError::InvalidCode,
            recovery::RecoveryError::Rand(e) => VerifyError::Rand(e),
            recovery::RecoveryError::Crypto(_) |
            recovery::RecoveryError::Utf8(_) => VerifyError::DecryptFailure,
            recovery::RecoveryError::Pg(e) => VerifyError::Db(e),
        }
    }
}

impl From<account_token::TokenError> for VerifyError {
    fn from(err: account_token::TokenError) -> Self {
        match err {
            account_token::TokenError::NotFoundOrExpired => VerifyError::InvalidOrExpiredToken,
            account_token::TokenError::UtcOverflow => VerifyError::UtcOverflow,
            account_token::TokenError::Rand(e) => VerifyError::Rand(e),
            account_token::TokenError::Pg(e) => VerifyError::Db(e),
        }
    }
}

/// immutable snapshot of the user that passed the password check. the
/// password hash and second factor key never leave the verifier, callers
/// thread this value through the follow up calls instead of the component
/// holding a current user
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user_id: ids::UserId,
    pub username: String,
    pub role: user::Role,
    pub status: Status,
    pub mfa_enabled: bool,
    pub mfa_key_verified: bool,
    pub registration_number: Option<String>,

    /// true while a second factor step is still owed
    pub requires_verification: bool,
}

impl Authenticated {
    fn from_user(user: &user::User, requires_verification: bool) -> Self {
        Authenticated {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
            status: user.status,
            mfa_enabled: user.mfa_enabled,
            mfa_key_verified: user.mfa_key_verified,
            registration_number: user.registration_number.clone(),
            requires_verification,
        }
    }

    fn verified(&self) -> Self {
        Authenticated {
            requires_verification: false,
            ..self.clone()
        }
    }
}

/// what the caller should do with the trust cookie it forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieDisposition {
    Keep,
    Clear,
}

#[derive(Debug)]
pub struct Login {
    pub auth: Authenticated,
    pub trust_cookie: CookieDisposition,
}

#[derive(Debug)]
pub struct TotpOutcome {
    pub auth: Authenticated,

    /// present when the user asked to trust this device, ready to be set
    /// on the response
    pub trust_cookie: Option<SetCookie>,
}

fn parse_trust_cookie(given: &str) -> Result<token::Combined, VerifyError> {
    token::Combined::parse(given).map_err(|_| VerifyError::InvalidCookieFormat)
}

async fn check_trust_cookie(
    conn: &impl GenericClient,
    user: &user::User,
    given: Option<&str>,
) -> Result<(bool, CookieDisposition), VerifyError> {
    let Some(given) = given else {
        return Ok((true, CookieDisposition::Keep));
    };

    let combined = match parse_trust_cookie(given) {
        Ok(combined) => combined,
        Err(_) => {
            // a cookie we never issued, have the caller drop it
            return Ok((true, CookieDisposition::Clear));
        }
    };

    let devices = trust_device::find_valid(conn, &user.id, combined.selector()).await?;

    for device in &devices {
        if device.matches(combined.verifier()) {
            return Ok((false, CookieDisposition::Keep));
        }
    }

    // stale or rotated out, the browser should stop presenting it
    Ok((true, CookieDisposition::Clear))
}

/// password step of the login state machine. on success the snapshot says
/// whether a second factor step is still owed for this request
pub async fn verify_credentials(
    conn: &impl GenericClient,
    identifier: &str,
    given_password: &str,
    require_second_factor: bool,
    trust_cookie: Option<&str>,
) -> Result<Login, VerifyError> {
    let Some(user) = user::User::retrieve_identifier(conn, identifier).await? else {
        audit::record(conn, None, identifier, AuthEvent::LoginFailed, None).await?;

        return Err(VerifyError::InvalidCredentials);
    };

    match user.status {
        Status::Blocked => {
            audit::record(conn, Some(user.id), identifier, AuthEvent::LoginBlocked, None).await?;

            return Err(VerifyError::AccountBlocked);
        },
        Status::Pending => {
            audit::record(conn, Some(user.id), identifier, AuthEvent::LoginPending, None).await?;

            return Err(VerifyError::AccountPending);
        },
        Status::Active => {}
    }

    if !password::verify_hash(&user.hash, given_password)? {
        audit::record(conn, Some(user.id), identifier, AuthEvent::LoginFailed, None).await?;

        return Err(VerifyError::InvalidCredentials);
    }

    let (requires_verification, disposition) =
        if require_second_factor && user.mfa_enabled && user.mfa_key_verified {
            check_trust_cookie(conn, &user, trust_cookie).await?
        } else {
            (false, CookieDisposition::Keep)
        };

    audit::record(
        conn,
        Some(user.id),
        identifier,
        AuthEvent::LoginPassed,
        Some(serde_json::json!({ "second_factor_pending": requires_verification }))
    ).await?;

    Ok(Login {
        auth: Authenticated::from_user(&user, requires_verification),
        trust_cookie: disposition,
    })
}

/// cookie for a freshly trusted device, attributes match the session
/// cookie the portal already sets
pub fn trust_cookie(sec: &Sec, issued: &trust_device::Issued) -> SetCookie {
    let mut cookie = SetCookie::new(trust_device::COOKIE_NAME, issued.cookie.clone())
        .with_expires(issued.expires)
        .with_path("/")
        .with_http_only(true)
        .with_secure(sec.cookie().secure())
        .with_same_site(SameSite::Strict);

    if let Some(domain) = sec.cookie().domain() {
        cookie.set_domain(domain);
    }

    cookie
}

/// removal form of the trust cookie for the [`CookieDisposition::Clear`] case
pub fn expire_trust_cookie(sec: &Sec) -> SetCookie {
    let mut cookie = SetCookie::new(trust_device::COOKIE_NAME, "")
        .with_max_age(std::time::Duration::new(0, 0))
        .with_path("/")
        .with_http_only(true)
        .with_secure(sec.cookie().secure())
        .with_same_site(SameSite::Strict);

    if let Some(domain) = sec.cookie().domain() {
        cookie.set_domain(domain);
    }

    cookie
}

/// a wrong second factor after a correct password is treated as a
/// suspected compromise, alert the owner, drop the session, keep the record
async fn second_factor_failed(
    conn: &impl GenericClient,
    notifier: &dyn Notifier,
    user: &user::User,
    session_id: Option<&str>,
    event: AuthEvent,
) -> Result<(), VerifyError> {
    notifier.second_factor_failed(&user.username);

    if let Some(session_id) = session_id {
        session::destroy(conn, session_id).await?;
    }

    audit::record(conn, Some(user.id), &user.username, event, None).await?;

    Ok(())
}

/// totp step. requires the password checked snapshot from
/// [`verify_credentials`], never a fresh login
pub async fn verify_totp(
    conn: &impl GenericClient,
    sec: &Sec,
    notifier: &dyn Notifier,
    auth: &Authenticated,
    code: &str,
    trust: bool,
    fingerprint: &trust_device::Fingerprint,
    session_id: Option<&str>,
) -> Result<TotpOutcome, VerifyError> {
    let Some(user) = user::User::retrieve(conn, &auth.user_id).await? else {
        return Err(VerifyError::InvalidCredentials);
    };

    let Some(encrypted) = user.totp_secret.as_ref() else {
        return Err(VerifyError::NoMfaKeyConfigured);
    };

    let secret = match sec.totp().decrypt(encrypted) {
        Ok(secret) => secret,
        Err(err) => {
            tracing::error!("failed to decrypt totp secret for user {}: {err}", user.id);

            return Err(VerifyError::DecryptFailure);
        }
    };

    let settings = totp::Settings::default();

    if !totp::verify_code(&secret, &settings, code, Utc::now()) {
        second_factor_failed(conn, notifier, &user, session_id, AuthEvent::TotpFailed).await?;

        return Err(VerifyError::InvalidCode);
    }

    let mut outcome = TotpOutcome {
        auth: auth.verified(),
        trust_cookie: None,
    };

    if trust {
        let issued = trust_device::create(
            conn,
            sec,
            &user.id,
            fingerprint,
            Some(sec.trust_device_ttl())
        ).await?;

        notifier.trust_device_created(&user.username, fingerprint);

        audit::record(
            conn,
            Some(user.id),
            &user.username,
            AuthEvent::TotpPassed,
            Some(serde_json::json!({ "trusted_device": issued.device_id }))
        ).await?;

        outcome.trust_cookie = Some(trust_cookie(sec, &issued));
    } else {
        audit::record(conn, Some(user.id), &user.username, AuthEvent::TotpPassed, None).await?;
    }

    Ok(outcome)
}

/// recovery fallback for when the authenticator is unavailable. consumes
/// the code, a replay later is just an unknown code
pub async fn verify_recovery_code(
    conn: &impl GenericClient,
    sec: &Sec,
    notifier: &dyn Notifier,
    auth: &Authenticated,
    selector: &str,
    verifier: &str,
    session_id: Option<&str>,
) -> Result<Authenticated, VerifyError> {
    let Some(user) = user::User::retrieve(conn, &auth.user_id).await? else {
        return Err(VerifyError::InvalidCredentials);
    };

    match recovery::consume(conn, sec, selector, verifier).await {
        Ok(()) => {
            audit::record(conn, Some(user.id), &user.username, AuthEvent::RecoveryPassed, None).await?;

            Ok(auth.verified())
        },
        Err(recovery::RecoveryError::NotFound) => {
            second_factor_failed(conn, notifier, &user, session_id, AuthEvent::RecoveryFailed).await?;

            Err(VerifyError::InvalidCode)
        },
        Err(err) => Err(err.into())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn snapshot() -> Authenticated {
        Authenticated {
            user_id: 42,
            username: String::from("mwallace"),
            role: user::Role::Student,
            status: Status::Active,
            mfa_enabled: true,
            mfa_key_verified: true,
            registration_number: Some(String::from("s2620114")),
            requires_verification: true,
        }
    }

    #[test]
    fn parse_trust_cookie_rejects_malformed_values() {
        assert!(matches!(
            parse_trust_cookie("definitely not a token"),
            Err(VerifyError::InvalidCookieFormat)
        ));
        assert!(matches!(
            parse_trust_cookie(""),
            Err(VerifyError::InvalidCookieFormat)
        ));
    }

    #[test]
    fn parse_trust_cookie_accepts_issued_shape() {
        let value = token::join(
            &token::generate_hex(token::SELECTOR_LEN).unwrap(),
            &token::generate(token::VERIFIER_LEN).unwrap()
        );

        assert!(parse_trust_cookie(&value).is_ok());
    }

    #[test]
    fn verified_snapshot_clears_the_flag_only() {
        let auth = snapshot();
        let verified = auth.verified();

        assert!(!verified.requires_verification);
        assert_eq!(verified.user_id, auth.user_id);
        assert_eq!(verified.username, auth.username);
        assert_eq!(verified.registration_number, auth.registration_number);
    }

    #[test]
    fn recovery_not_found_maps_to_invalid_code() {
        let err = VerifyError::from(recovery::RecoveryError::NotFound);

        assert!(matches!(err, VerifyError::InvalidCode));
    }

    #[test]
    fn account_token_failure_maps_to_uniform_token_error() {
        let err = VerifyError::from(account_token::TokenError::NotFoundOrExpired);

        assert!(matches!(err, VerifyError::InvalidOrExpiredToken));
    }

    #[test]
    fn trust_cookie_carries_expected_attributes() {
        let config = crate::config::Config::new(crate::config::Settings {
            db: crate::config::Db {
                user: String::from("handin"),
                password: None,
                host: String::from("localhost"),
                port: 5432,
                dbname: String::from("handin"),
                pool_size: 1,
            },
            site: crate::config::Site {
                domain: Some(String::from("portal.example.edu")),
                secure: true,
            },
            tokens: crate::config::Tokens::default(),
            master_key: "cd".repeat(32),
        }).unwrap();

        let sec = Sec::from_config(&config).unwrap();

        let issued = trust_device::Issued {
            device_id: 9,
            cookie: "ab".repeat(32),
            expires: Utc.with_ymd_and_hms(2026, 10, 2, 8, 0, 0).unwrap(),
        };

        let rendered = trust_cookie(&sec, &issued).header_value();

        assert!(rendered.starts_with("trusted_device="));
        assert!(rendered.contains("Domain=portal.example.edu"));
        assert!(rendered.contains("Path=/"));
        assert!(rendered.contains("Secure"));
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("SameSite=Strict"));
        assert!(rendered.contains("Expires="));

        let removal = expire_trust_cookie(&sec).header_value();

        assert!(removal.contains("Max-Age=0"));
    }
}
