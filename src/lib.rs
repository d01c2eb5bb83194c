pub mod batch;
pub mod error;
pub mod html;
pub mod logging;
pub mod progress;
pub mod providers;
pub mod server;
pub mod session;
pub mod settings;
pub mod tracker;

pub use batch::{BatchJob, TranslationResult, run_batch};
pub use error::{AuthError, TranslateError};
pub use progress::{ChannelProgress, NoProgress, Progress, ProgressSink};
pub use providers::{Backend, ChatClient, GoogleTranslate, Translate, TranslationRequest};
pub use session::{
    BatchDispatch, BatchRequest, BatchResponse, LocalDispatcher, RemoteDispatcher, SessionReport,
    TranslationSession,
};
pub use settings::Settings;
pub use tracker::{MutationTracker, Page, UnitHost};
