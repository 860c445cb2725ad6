//! Data model for a rendered message.

pub mod email;

pub use email::Email;
