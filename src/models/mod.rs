//! Data models for the WG casting application.
//!
//! Field names match the JSON the frontend reads and writes.

mod appointment;
mod candidate;
mod document;
mod slot_note;
mod vote;

pub use appointment::*;
pub use candidate::*;
pub use document::*;
pub use slot_note::*;
pub use vote::*;
