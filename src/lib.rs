pub mod cache;
pub mod config;
pub mod decode;
pub mod geometry;
pub mod model;
pub mod pipeline;
pub mod session;
pub mod watch;
