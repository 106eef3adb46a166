#![deny(unsafe_code)]

//! Client for the gitinsp backend: streamed chat answers and index lifecycle.

pub mod backend;
/// Streaming chat turns.
pub mod chat;
pub mod error;
/// Index selection state and the operations that reconcile it with the backend.
pub mod index;
pub mod settings;

pub use backend::{BackendClient, GenerateResponse, ListIndexesResponse};
pub use chat::{ChatStreamHandle, SnapshotStream, StreamingChatClient};
pub use error::{ClientError, ClientResult};
pub use index::{
    ContentFormat, IndexDescriptor, IndexRegistry, IndexSelection, IndexUpdate, NO_INDEX_LABEL,
};
pub use settings::{ClientSettings, SettingsStore};
