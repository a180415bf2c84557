//! Convenient re-exports for typical use of the chat client.

pub use crate::{
    Backoff, CallContext, ChatClient, ChatClientBuilder, ChatClientConfig, ChatError,
    CircuitState, Jitter, Message, MessageType, MessagesPage,
};
