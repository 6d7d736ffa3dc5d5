use serde::Deserialize;
use utoipa::ToSchema;

/// `multipart/form-data` body of `POST /api/chat`.
#[derive(Debug, Deserialize, ToSchema)]
#[allow(dead_code)]
pub struct ChatUpload {
    /// Prompt text.
    pub text: Option<String>,
    /// An `image/*` or `audio/*` file.
    #[schema(value_type = Option<String>, format = Binary)]
    pub file: Option<Vec<u8>>,
}
