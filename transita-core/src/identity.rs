use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authenticated caller, as resolved by the identity collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email_verified: bool,
}

/// Contract consumed from the identity service. Token issuance and account
/// management live outside this engine; we only resolve a bearer token to
/// a user.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self, bearer_token: &str) -> crate::CoreResult<CurrentUser>;
}
