//! Pundit is a persona-driven chat service that streams model responses over
//! Server-Sent Events and renders them as bullet lists.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns configuration, the persona registry, transcript messages,
//!   and the backend completion service (blocking and streaming).
//! - [`server`] exposes the completion service over HTTP: a blocking
//!   `/chat` route, an SSE `/chat-stream` route, and the chat page.
//! - [`client`] implements the consuming side: the stream transport, bullet
//!   derivation, and the controller state machine that owns at most one
//!   stream session at a time.
//! - [`api`] defines the wire payloads exchanged with the OpenAI-compatible
//!   text-generation backend.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::run`], which dispatches into [`server`] for the
//! default serve mode and [`client`] for the one-shot `ask` command.

pub mod api;
pub mod cli;
pub mod client;
pub mod core;
pub mod server;
pub mod utils;
