mod handler;

pub use handler::{delete_image, upload_image};
