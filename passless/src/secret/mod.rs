//! One-time secrets: namespaced tickets and hashed one-time passwords.
//!
//! Everything here is a pure function of the secure RNG and the clock; the
//! single-slot storage model lives on the user record, not in this module.

mod otp;
mod ticket;

pub use otp::{OtpSecret, issue_otp};
pub use ticket::{Ticket, TicketKind};
