//! The record templates render against.

use crate::parser::message::Message;
use crate::template::{Record, Value};

/// Header fields and extracted text of one message.
///
/// Every field holds the bytes exactly as transmitted; no charset is applied.
/// Built once per run and never modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Email {
    /// Value of the `Subject:` header, empty when absent.
    pub subject: Vec<u8>,

    /// Raw `Date:` header.
    pub date: Vec<u8>,

    /// Raw `From:` header (not address-parsed).
    pub from: Vec<u8>,

    /// Recipients. Never populated from the message.
    pub to: Vec<u8>,

    /// Concatenated content of the extracted parts.
    pub text: Vec<u8>,
}

impl Email {
    /// Field names visible to templates, in print order.
    pub const FIELDS: [&'static str; 5] = ["Subject", "Date", "From", "To", "Text"];

    pub fn from_message(message: &Message<'_>, text: Vec<u8>) -> Self {
        Self {
            subject: message.header("Subject").to_vec(),
            date: message.header("Date").to_vec(),
            from: message.header("From").to_vec(),
            to: Vec::new(),
            text,
        }
    }

    /// Look up a field by its template name (case-sensitive).
    pub fn field(&self, name: &str) -> Option<&[u8]> {
        let value = match name {
            "Subject" => &self.subject,
            "Date" => &self.date,
            "From" => &self.from,
            "To" => &self.to,
            "Text" => &self.text,
            _ => return None,
        };
        Some(value.as_slice())
    }
}

impl Record for Email {
    fn type_name(&self) -> &'static str {
        "Email"
    }

    fn field(&self, name: &str) -> Option<Value> {
        Email::field(self, name).map(Value::from)
    }

    fn values(&self) -> Vec<Value> {
        Self::FIELDS
            .iter()
            .filter_map(|name| Email::field(self, name))
            .map(Value::from)
            .collect()
    }
}
