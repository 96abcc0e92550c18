// src/models/user.rs
use serde::{Deserialize, Serialize};

/// The signed-in rider, as persisted next to the access token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RiderProfile {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub profile_picture: Option<String>,
}

/// Bearer credential plus profile, fetched from secure storage at connect
/// time and wiped on logout or any 401.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub access_token: String,
    pub rider: RiderProfile,
}
