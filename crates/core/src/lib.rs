pub mod availability;
pub mod calendar;
pub mod config;
pub mod domain;
pub mod errors;

pub use availability::{DayAvailability, Unavailability};
pub use calendar::{Clock, FixedClock, SystemClock};
pub use domain::appointment::{Appointment, AppointmentId, AppointmentStatus, NewAppointment};
pub use domain::conversation::{Conversation, ConversationId, ConversationMessage, MessageRole};
pub use domain::practice::{DaySchedule, PracticeSettings};
pub use errors::{ApplicationError, DomainError, InterfaceError};
