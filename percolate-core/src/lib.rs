pub mod config;
pub mod error;
pub mod ipc;
pub mod models;

pub use config::PercolateConfig;
pub use error::{PercolateError, SessionError};
pub use ipc::{AppResult, GatewayRequest, PagedResults, ServerMessage, ValidationError};
pub use models::{
    Note, NoteType, Participant, ParticipantRole, Session, SessionEvent, SessionStatus,
};
