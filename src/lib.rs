pub mod cli;
pub mod config;
pub mod delivery;
pub mod edge;
pub mod inventory;
pub mod source;
pub mod tracker;
pub mod watch;
