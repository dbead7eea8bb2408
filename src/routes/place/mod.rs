mod handler;
mod model;

pub use handler::{find_by_id, list, nearby, search};
pub use model::TravelPlace;
