use serde::{Deserialize, Serialize};

/// Claims carried by identity provider access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub aud: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,

    #[serde(default)]
    pub nbf: Option<i64>,

    #[serde(default)]
    pub email: Option<String>,

    /// Provider role, e.g. `authenticated`
    #[serde(default)]
    pub role: Option<String>,

    #[serde(default)]
    pub user_metadata: Option<UserMetadata>,
}

/// Profile fields set at signup
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserMetadata {
    /// `landlord` or `cleaner`
    #[serde(default)]
    pub user_type: Option<String>,

    #[serde(default)]
    pub full_name: Option<String>,
}

impl Claims {
    pub fn user_type(&self) -> Option<&str> {
        self.user_metadata.as_ref()?.user_type.as_deref()
    }
}
