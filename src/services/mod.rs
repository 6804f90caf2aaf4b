pub mod calendar;
pub mod clock;
pub mod conversation;
pub mod dialogue;
pub mod escalation;
pub mod nlu;
pub mod notify;
pub mod profiles;
pub mod scheduling;
pub mod sessions;
pub mod speech;
pub mod summary;
