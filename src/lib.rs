use config::Config;
use sqlx::PgPool;
use std::sync::Arc;
use redis::Client as RedisClient;

use crate::routes::chat::hub::ChatHub;
use crate::storage::ObjectStorage;

pub mod config;
pub mod error;
pub mod middleware;
pub mod storage;
pub mod utils;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub redis: Arc<RedisClient>,
    pub storage: Arc<ObjectStorage>,
    pub hub: Arc<ChatHub>,
    pub http: reqwest::Client,
}
