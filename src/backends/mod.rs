/// Backend implementations of [`crate::chat::ChatProvider`].
pub mod openrouter;
