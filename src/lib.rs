pub mod api;
pub mod assignment;
pub mod config;
pub mod error;
pub mod intake;
pub mod leads;
pub mod rest;
pub mod server;
pub mod shutdown;
