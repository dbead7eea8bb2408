pub mod bookmark;
pub mod chat;
pub mod email;
pub mod member;
pub mod place;
pub mod profile;
pub mod schedule;
