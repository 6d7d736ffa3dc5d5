use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::routes::{auth, chat, chats, health};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "chatbot-server",
        description = "Multimodal chatbot API backed by Google Gemini",
        version = "0.1.0",
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(chat::ChatApi::openapi());
    root.merge(auth::AuthApi::openapi());
    root.merge(chats::ChatsApi::openapi());
    root
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = get_docs();
        for path in ["/health", "/api/chat", "/api/auth/login", "/api/auth/register", "/api/chats", "/api/chats/{id}"] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
        let schemes = doc.components.as_ref().map(|c| c.security_schemes.len());
        assert_eq!(schemes, Some(1));
    }
}
