mod client;
mod diff;
mod error;
mod logger;
mod markup;
mod protocol;
mod session;
mod types;

pub use client::{NexiaClient, NexiaClientBuilder};
pub use error::{Error, Result};
pub use logger::TrafficLogMode;
pub use protocol::SetpointPayload;
pub use session::{CookieJar, FileSessionStore, MemorySessionStore, Session, SessionStore};
pub use types::*;
