use chatbot_core::UserProfile;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::db::UserRecord;

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

impl UserRecord {
    pub fn to_profile(&self) -> UserProfile {
        UserProfile { id: self.id.clone(), name: self.name.clone(), email: self.email.clone() }
    }
}
