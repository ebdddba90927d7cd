// Copyright 2023 Remi Bernotavicius

use crate::config::Config;
use crate::database::Database;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, database: Database) -> Self {
        Self {
            database,
            config: Arc::new(config),
        }
    }
}
