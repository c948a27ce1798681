pub mod action_log;
pub mod participants;
pub mod sessions;

pub use action_log::Entity as ActionLog;
pub use action_log::Model as ActionLogRow;
pub use participants::Entity as Participants;
pub use participants::Model as ParticipantRow;
pub use sessions::Entity as Sessions;
pub use sessions::Model as SessionRow;
