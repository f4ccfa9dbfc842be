pub mod backend;
pub mod config;
pub mod logging;
pub mod script;
pub mod session;
pub mod verify;
pub mod vote;
