pub mod conversation;
pub mod message;

pub use conversation::{Conversation, ConversationKind, ConversationSummary, MessagePreview};
pub use message::{Message, MessagePage};
