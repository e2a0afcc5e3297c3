pub mod event;
pub mod note;
pub mod participant;
pub mod session;

pub use event::SessionEvent;
pub use note::{Note, NoteType};
pub use participant::{Participant, ParticipantRole};
pub use session::{Session, SessionStatus};
