mod handler;
pub mod hub;
mod model;

pub use handler::{get_messages, ws_handler};
pub use model::ChatMessage;
