mod handler;
pub mod model;

pub use handler::{send_verification, verify};
