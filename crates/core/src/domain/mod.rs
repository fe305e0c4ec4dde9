pub mod appointment;
pub mod conversation;
pub mod practice;
