//! Cirro Server - configuration and HTTP servers for the origin and edge
//! roles of distributed static file serving

pub mod config;
pub mod server;
