use super::Claims;
use uuid::Uuid;

/// The authenticated caller. Ownership checks compare `user_id` against a
/// job's landlord or assigned cleaner.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: Option<String>,
    /// `landlord` or `cleaner` when the signup recorded it
    pub user_type: Option<String>,
    pub issuer: String,
}

impl AuthContext {
    pub fn from_claims(claims: &Claims) -> Result<Self, &'static str> {
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| "Invalid user ID in token")?;

        Ok(Self {
            user_id,
            email: claims.email.clone(),
            role: claims.role.clone(),
            user_type: claims.user_type().map(str::to_string),
            issuer: claims.iss.clone(),
        })
    }
}
