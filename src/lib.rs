// Library root
// -----------
// The SecureBox client is split into a small library and a thin binary.
// `main.rs` parses flags, sets up logging and hands control to `commands`.
//
// Module responsibilities:
// - `api`: blocking HTTP client for the SecureBox REST endpoints.
// - `cipher`: signing/encryption capability interface and its OpenSSL
//   implementation.
// - `envelope`: the fixed binary layout of downloaded files.
// - `files`: upload/download/list/delete workflows, generic over the
//   remote store and the cipher so they can be exercised without a server.
// - `config`: config file and flag/env resolution.
// - `commands`: wires everything together and prints status lines.
pub mod api;
pub mod cipher;
pub mod cli;
pub mod commands;
pub mod config;
pub mod envelope;
pub mod error;
pub mod files;

pub use error::{Error, Result};
