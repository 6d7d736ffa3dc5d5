//! The send-message flow.

use chatbot_core::{Chat, ConversationStore, KeyValueStore, LocalState, Message, Role, UserProfile};
use tracing::{info, warn};

use crate::api::{ApiClient, Attachment};
use crate::error::ClientError;

/// Bot message appended when the backend could not be reached or answered
/// with an error.
pub const ERROR_REPLY: &str = "Sorry, I encountered an error processing your request.";

/// Owns the local chat list and the selected chat.
///
/// All mutation goes through `&mut self`, so saves to the underlying store
/// never interleave.
pub struct ChatController<S> {
    api: ApiClient,
    chats: ConversationStore<S>,
    state: LocalState<S>,
    current: Option<Chat>,
}

impl<S: KeyValueStore + Clone> ChatController<S> {
    /// Restores the session token and the chat that was open last time.
    pub fn new(mut api: ApiClient, store: S) -> Self {
        let state = LocalState::new(store.clone());
        if api.token().is_none() {
            api.set_token(state.token());
        }
        let chats = ConversationStore::new(store);
        let current = state
            .take_current_chat()
            .and_then(|remembered| chats.get(remembered.id).or(Some(remembered)));
        Self { api, chats, state, current }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn current(&self) -> Option<&Chat> {
        self.current.as_ref()
    }

    pub fn chats(&self) -> Vec<Chat> {
        self.chats.load()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.user()
    }

    pub fn select(&mut self, id: i64) -> Option<&Chat> {
        self.current = self.chats.get(id);
        self.remember_current();
        self.current.as_ref()
    }

    pub fn new_chat(&mut self, name: Option<&str>) -> &Chat {
        let chat = self.chats.create_chat(name);
        self.current.insert(chat)
    }

    /// Renaming keeps `last_modified`; only transcript changes move it.
    pub fn rename(&mut self, id: i64, name: &str) -> bool {
        let Some(mut chat) = self.chats.get(id) else {
            return false;
        };
        chat.name = name.trim().to_owned();
        self.chats.save(&mut chat);
        if self.current.as_ref().is_some_and(|c| c.id == id) {
            self.current = Some(chat);
        }
        true
    }

    pub fn delete_chat(&mut self, id: i64) -> bool {
        let deleted = self.chats.delete(id);
        if self.current.as_ref().is_some_and(|c| c.id == id) {
            self.current = None;
        }
        deleted
    }

    pub fn clear_chats(&mut self) {
        if let Err(e) = self.chats.clear() {
            warn!(error = %e, "failed to clear chats");
        }
        self.current = None;
    }

    pub fn dark_mode(&self) -> bool {
        self.state.dark_mode()
    }

    pub fn toggle_dark_mode(&self) -> bool {
        let on = !self.state.dark_mode();
        if let Err(e) = self.state.set_dark_mode(on) {
            warn!(error = %e, "failed to store theme");
        }
        on
    }

    pub async fn register(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, ClientError> {
        let auth = self.api.register(name, email, password).await?;
        Ok(self.sign_in(auth.user, auth.token))
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<UserProfile, ClientError> {
        let auth = self.api.login(email, password).await?;
        Ok(self.sign_in(auth.user, auth.token))
    }

    pub fn logout(&mut self) {
        self.api.set_token(None);
        if let Err(e) = self.state.sign_out() {
            warn!(error = %e, "failed to clear session");
        }
    }

    /// Copy chats that exist only on the server into the local list.
    /// Returns how many were added.
    pub async fn pull_remote(&mut self) -> Result<usize, ClientError> {
        let known: Vec<String> = self.chats.load().into_iter().filter_map(|c| c.remote_id).collect();
        let mut added = 0;
        for remote in self.api.list_chats().await? {
            if known.contains(&remote.id) {
                continue;
            }
            let mut chat = remote.into_local(self.chats.next_chat_id());
            self.chats.save(&mut chat);
            added += 1;
        }
        info!(added, "pulled remote chats");
        Ok(added)
    }

    /// Send user input and wait for the bot's reply.
    ///
    /// Returns `None` when there is nothing to send.  Backend failures never
    /// surface as errors: the reply is then [`ERROR_REPLY`].
    pub async fn send(&mut self, text: &str, attachment: Option<Attachment>) -> Option<Message> {
        let text = text.trim();
        if text.is_empty() && attachment.is_none() {
            return None;
        }

        let mut chat = match self.current.take() {
            Some(chat) => chat,
            None => self.chats.create_chat(None),
        };

        let content = match (&attachment, text.is_empty()) {
            (Some(a), true) => a.file_name.clone(),
            _ => text.to_owned(),
        };
        let message = chat.append(Role::User, content);
        if let Some(a) = &attachment {
            if a.is_audio() {
                message.audio_ref = Some(a.data_uri());
            } else {
                message.image_ref = Some(a.data_uri());
            }
        }
        self.chats.save(&mut chat);
        self.current = Some(chat.clone());
        self.remember_current();

        let result = match &attachment {
            Some(a) => self.api.send_file(Some(text), a).await,
            None => self.api.send_text(text).await,
        };
        let reply = match result {
            Ok(resp) => {
                let content = resp.response.into_content();
                if content.is_empty() { ERROR_REPLY.to_owned() } else { content }
            }
            Err(e) => {
                warn!(error = %e, chat_id = chat.id, "chat request failed");
                ERROR_REPLY.to_owned()
            }
        };

        let reply = chat.append(Role::Bot, reply).clone();
        self.chats.save(&mut chat);
        self.sync(&mut chat).await;
        self.current = Some(chat);
        self.remember_current();
        Some(reply)
    }

    // ── private helpers ─────────────────────────────────────────────────────

    fn sign_in(&mut self, user: UserProfile, token: String) -> UserProfile {
        if let Err(e) = self.state.sign_in(&user, &token) {
            warn!(error = %e, "failed to store session");
        }
        self.api.set_token(Some(token));
        info!(user_id = %user.id, "signed in");
        user
    }

    /// Mirror the chat to the server when signed in.  Failures are logged.
    async fn sync(&mut self, chat: &mut Chat) {
        if self.api.token().is_none() {
            return;
        }
        let result = match &chat.remote_id {
            Some(remote_id) => self.api.update_chat(remote_id, None, Some(&chat.messages)).await,
            None => self.api.create_chat(&chat.name, &chat.messages).await,
        };
        match result {
            Ok(remote) if chat.remote_id.is_none() => {
                chat.remote_id = Some(remote.id);
                self.chats.save(chat);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, chat_id = chat.id, "chat sync failed"),
        }
    }

    fn remember_current(&self) {
        let result = match &self.current {
            Some(chat) => self.state.set_current_chat(chat),
            None => Ok(()),
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to remember current chat");
        }
    }
}
