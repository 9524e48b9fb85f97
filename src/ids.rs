pub type UserId = i64;
pub type TokenId = i64;
pub type DeviceId = i64;
pub type CodeId = i64;
