//! A minimal interactive console chatbot for models hosted behind OpenRouter.
//!
//! # Overview
//! A [`session::Session`] is built once from the `OPENROUTER_API_KEY`
//! credential and handed to a [`repl::ChatLoop`], which reads operator input
//! line by line and sends each line, together with a fixed system
//! instruction, as an independent turn. Replies are printed as they stream
//! in; failed turns are reported and the loop continues.
//!
//! The remote model sits behind the [`chat::ChatProvider`] trait, so another
//! provider can be substituted without touching the loop.

// Re-export for convenience
pub use async_trait::async_trait;

/// Backend implementations for supported chat providers
pub mod backends;

/// Chat messages, turns and the provider capability trait
pub mod chat;

/// Session configuration and `.env` handling
pub mod config;

/// Error types and handling
pub mod error;

/// The interactive read/send/print loop
pub mod repl;

/// The configured handle to the remote chat capability
pub mod session;

pub use config::SessionConfig;
pub use error::LLMError;
pub use session::Session;

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
/// This is a no-op if the feature is not enabled.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::try_init();
    }
}
