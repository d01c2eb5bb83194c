mod handlers;
mod models;
mod state;
mod stream;
mod translate;

pub use handlers::{build_router, run_server};
pub use models::{
    ChatChunk, ChatMessage, ChatRequest, ChunkChoice, ChunkDelta, ContentPart, MessageContent,
};
pub use state::ServerState;
pub use stream::{ChatStreamSession, DONE_FRAME};
