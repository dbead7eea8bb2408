mod handler;
mod model;

pub use handler::{create_bookmark, delete_bookmark, list_bookmarks};
