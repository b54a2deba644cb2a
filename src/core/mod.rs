pub mod chat_stream;
pub mod config;
pub mod message;
pub mod persona;
