//! The tern agent: control-plane front end and command modules.

pub mod modules;
pub mod server;
