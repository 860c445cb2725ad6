//! `mailtmpl` - render an email message through a text template.
//!
//! The library reads one RFC 5322 message, extracts the text of the parts
//! whose `Content-Type` matches a prefix, and renders a template against the
//! message's headers and that text.

pub mod config;
pub mod error;
pub mod helpers;
pub mod model;
pub mod parser;
pub mod render;
pub mod template;
