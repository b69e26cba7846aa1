//! Infrastructure layer for Leadflow.
//!
//! Contains implementations of the ports defined in `leadflow-core`: SQLite
//! repositories, the Resend email sender and Twilio SMS sender, plus the
//! configuration loader.

pub mod config;
pub mod delivery;
pub mod sqlite;
