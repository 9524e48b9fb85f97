use chrono::{DateTime, Utc};

use crate::sec::authn::trust_device::Fingerprint;

/// trigger points for outbound mail. composing and delivering the actual
/// messages belongs to the hosting application, implementations here only
/// decide what to do with the signal
pub trait Notifier {
    /// a failed totp or recovery attempt after a correct password, treated
    /// as a suspected compromise
    fn second_factor_failed(&self, username: &str);

    fn trust_device_created(&self, username: &str, fingerprint: &Fingerprint);

    fn account_token_issued(&self, username: &str, expires: &DateTime<Utc>);
}

/// default sink that only records the trigger
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn second_factor_failed(&self, username: &str) {
        tracing::event!(
            tracing::Level::INFO,
            "second factor failed alert for \"{username}\""
        );
    }

    fn trust_device_created(&self, username: &str, fingerprint: &Fingerprint) {
        tracing::event!(
            tracing::Level::INFO,
            "trust device created for \"{username}\": {}",
            fingerprint.describe()
        );
    }

    fn account_token_issued(&self, username: &str, expires: &DateTime<Utc>) {
        tracing::event!(
            tracing::Level::INFO,
            "account token issued for \"{username}\" expiring {expires}"
        );
    }
}
