pub mod token;
pub mod password;
pub mod totp;
pub mod account_token;
pub mod trust_device;
pub mod recovery;
pub mod verify;
