//! Wire protocol between server and UI clients.

pub mod frames;
pub mod reassembler;
pub mod reconnect;

pub use frames::{
    ChatInput, ChatRequest, ClientMessage, FrameError, ServerFrame, ToolInfo, decode_sse,
    decode_ws_message,
};
pub use reassembler::{Conversation, FrameDecoder, FrameOutcome, MessageView, ToolActivity};
pub use reconnect::{RECONNECT_FAILED, ReconnectPolicy, connect_with_backoff};
