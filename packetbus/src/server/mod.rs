mod config;
mod conn;
mod pipeline;
mod tasks;

pub use config::ServerConfig;
pub use pipeline::{OnMessage, Server, ServerHandle};
pub use tasks::{Destination, RecvTask, SendTask};
