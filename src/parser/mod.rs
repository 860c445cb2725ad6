//! Message parsing: header blocks, the top-level message, and MIME parts.

pub mod header;
pub mod message;
pub mod mime;
