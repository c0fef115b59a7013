use crate::error::AppError;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ROLE_CUSTOMER: &str = "customer";
pub const ROLE_ADMIN: &str = "admin";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Customer id as issued by the identity service.
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::AuthenticationError(e.to_string()))?;
    Ok(data.claims)
}

/// The bearer's customer id. Tokens whose subject is not a UUID never came
/// from our identity service.
pub fn customer_id(claims: &Claims) -> Result<Uuid, AppError> {
    Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::AuthenticationError("malformed subject claim".to_string()))
}

pub fn require_admin(claims: &Claims) -> Result<(), AppError> {
    if claims.role != ROLE_ADMIN {
        return Err(AppError::AuthorizationError("admin role required".to_string()));
    }
    Ok(())
}

/// Mint a token. Development and the test suites use this; production tokens
/// come from the identity service with the same shape.
pub fn issue_token(
    user_id: Uuid,
    role: &str,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: (chrono::Utc::now().timestamp() as usize) + expiration_seconds as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AppError::InternalServerError(e.to_string()))
}
