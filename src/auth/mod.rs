//! Session and token persistence module

pub mod session;
pub mod token_store;

pub use session::{Credentials, Session, SessionEvent, SessionStore};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
