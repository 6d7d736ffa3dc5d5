//! Client side of the multimodal chatbot.
//!
//! [`ApiClient`] talks to the REST backend; [`ChatController`] drives the
//! send-message flow on top of it and keeps the local chat list current.

mod api;
mod controller;
mod error;

pub use api::{ApiClient, Attachment, AuthResponse, DEFAULT_TIMEOUT, Health, RemoteChat};
pub use controller::{ChatController, ERROR_REPLY};
pub use error::ClientError;
