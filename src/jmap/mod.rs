//! JMAP mail access: session/request client, incremental synchronizer,
//! and the push event listener.

pub mod client;
pub mod listener;
pub mod sync;

pub use client::JmapClient;
pub use listener::{ListenerHandle, spawn_listener};
pub use sync::{EmailMessage, FetchResult, JmapMailSource, MailSource};
