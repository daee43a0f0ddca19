pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod index;
pub mod markup;
pub mod model;
pub mod parser;
pub mod resolve;
pub mod server;
pub mod util;
