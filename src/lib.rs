//! Lead Assist, a lead-capture chat bot.
//!
//! Users pick a segment, answer a short questionnaire and then chat with an
//! assistant. Completed questionnaires are handed to the CRM.

pub mod api;
pub mod channels;
pub mod config;
pub mod conversation;
pub mod crm;
pub mod error;
pub mod llm;
pub mod runtime;
pub mod store;
