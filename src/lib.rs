pub mod arguments;
pub mod bridge;
pub mod compose;
pub mod config;
pub mod errors; // Structured error types
pub mod logger;
pub mod observer;
pub mod run;
pub mod sink; // Renderer output sockets
pub mod subscriptions;
pub mod utils;
