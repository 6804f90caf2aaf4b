pub mod calendar;
pub mod call;
pub mod escalation;
pub mod nlu;
pub mod profile;
pub mod summary;

pub use calendar::{Attendee, BookingResult, CalendarEvent, CallerDetails, Interval, Slot};
pub use call::{
    AppointmentDraft, CallAction, CallSession, ConversationTurn, DraftStage, Role, SessionState,
    SpokenReply,
};
pub use escalation::{EscalationVerdict, ReasonCode};
pub use nlu::{Entity, EntityKind, Intent, IntentName, NluResult, Span};
pub use profile::{BusinessHours, BusinessProfile, DaySchedule, Faq, ProfileDocument, ProfileError};
pub use summary::{ActionCategory, ActionItem, CallSummary, Priority};
