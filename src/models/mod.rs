pub mod conversation;
pub mod message;
pub mod session;

pub use conversation::{Conversation, RetentionPolicy};
pub use message::Message;
pub use session::{ChatSessionLog, ConversationState};
