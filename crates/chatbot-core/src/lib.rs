//! Core types of the multimodal chatbot: response segmentation, message
//! composition, the chat data model and quota-aware local persistence.

pub mod conversation;
pub mod model;
pub mod render;
pub mod reply;
pub mod segment;
pub mod storage;
pub mod time;

pub use conversation::{ConversationStore, LocalState, RetentionPolicy, SaveOutcome};
pub use model::{Chat, GREETING, Message, Role, UserProfile};
pub use reply::{ChatResponse, LegacyReply, ReplyBody, ReplyError};
pub use segment::{Segment, SegmentKind, Segmentation, Segmenter, segment};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
