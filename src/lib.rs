pub mod comments;
pub mod config;
pub mod facade;
pub mod logging;
pub mod memory;
pub mod model;
pub mod moderation;
pub mod screen;
pub mod state;
pub mod store;
