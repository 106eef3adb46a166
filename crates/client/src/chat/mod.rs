/// Event-stream line framing and payload decoding.
pub mod frame;
/// Fragment display rules and the response accumulator.
pub mod normalize;
pub mod stream;

pub use frame::{ChatPayload, FRAME_PREFIX, LineBuffer, StreamEvent};
pub use normalize::{
    ChatResponseAccumulator, THINK_MARKER, normalize_fragment, repair_misencoded_utf8,
};
pub use stream::{
    CONNECT_ERROR_MESSAGE, ChatRequest, ChatStreamHandle, ChatWorker, DECODE_ERROR_MESSAGE,
    SnapshotStream, StreamingChatClient,
};
