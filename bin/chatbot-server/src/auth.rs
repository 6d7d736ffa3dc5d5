//! Password hashing and session tokens.
//!
//! Passwords are stored as `pbkdf2-sha256$<rounds>$<salt>$<digest>` (base64
//! fields) with a random 16-byte salt.  Verification re-derives the key and
//! compares with [`subtle::ConstantTimeEq`].  Sessions are HS256 JWTs whose
//! subject is the user id.

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD as B64;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

const SCHEME: &str = "pbkdf2-sha256";
const KEY_LEN: usize = 32;
/// OWASP guidance for PBKDF2-HMAC-SHA256.
pub const DEFAULT_ROUNDS: u32 = 600_000;

/// Hash `password` with a fresh random salt.
pub fn hash_password(password: &str, rounds: u32) -> String {
    let rounds = rounds.max(1);
    let salt = *Uuid::new_v4().as_bytes();
    let key = derive(password.as_bytes(), &salt, rounds);
    format!("{SCHEME}${rounds}${}${}", B64.encode(salt), B64.encode(key))
}

/// `false` for a wrong password or an unreadable stored hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut fields = stored.split('$');
    let (Some(SCHEME), Some(rounds), Some(salt), Some(digest), None) =
        (fields.next(), fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return false;
    };
    let (Ok(rounds @ 1..), Ok(salt), Ok(expected)) =
        (rounds.parse::<u32>(), B64.decode(salt), B64.decode(digest))
    else {
        return false;
    };
    let actual = derive(password.as_bytes(), &salt, rounds);
    bool::from(actual.as_slice().ct_eq(expected.as_slice()))
}

fn derive(password: &[u8], salt: &[u8], rounds: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, rounds, &mut key);
    key
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies session tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenIssuer(ttl={}h)", self.ttl.num_hours())
    }
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours.max(1)),
        }
    }

    pub fn issue(&self, user_id: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_owned(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    /// The user id of a valid, unexpired token.
    pub fn verify(&self, token: &str) -> Option<String> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims.sub)
            .ok()
    }
}
