//! Registry credentials stored per application.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUserCredential {
    pub application_id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub username: String,
    pub password: String,
    pub description: String,
}
