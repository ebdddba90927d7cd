// Copyright 2023 Remi Bernotavicius

use crate::Result;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::{env, fmt::Display, str::FromStr};

pub struct Config {
    pub address: SocketAddr,
    pub database: PathBuf,
    pub page_size: i64,
    pub recipes_limit: i64,
}

impl Config {
    /// Reads settings from the environment. `database_override` wins over
    /// `RECIPE_SHARE_DATABASE`.
    pub fn load(database_override: Option<PathBuf>) -> Result<Self> {
        let database = match database_override {
            Some(path) => path,
            None => match env::var_os("RECIPE_SHARE_DATABASE") {
                Some(path) => path.into(),
                None => {
                    let path = crate::data_path()?.join("data.sqlite");
                    log::info!("RECIPE_SHARE_DATABASE not set, using default: {path:?}");
                    path
                }
            },
        };

        let config = Self {
            address: try_load("RECIPE_SHARE_ADDR", "0.0.0.0:8000")?,
            database,
            page_size: try_load("RECIPE_SHARE_PAGE_SIZE", "6")?,
            recipes_limit: try_load("RECIPE_SHARE_RECIPES_LIMIT", "3")?,
        };
        if !(1..=100).contains(&config.page_size) {
            return Err("RECIPE_SHARE_PAGE_SIZE must be between 1 and 100".into());
        }
        if config.recipes_limit < 0 {
            return Err("RECIPE_SHARE_RECIPES_LIMIT must not be negative".into());
        }
        Ok(config)
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let value = env::var(key).unwrap_or_else(|_| {
        log::info!("{key} not set, using default: {default}");
        default.to_string()
    });
    parse_setting(key, &value)
}

fn parse_setting<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| format!("invalid {key} value {value:?}: {e}").into())
}

#[test]
fn parse_settings() {
    let port: SocketAddr = parse_setting("ADDR", "127.0.0.1:8000").unwrap();
    assert_eq!(port.port(), 8000);
    assert_eq!(parse_setting::<i64>("SIZE", "6").unwrap(), 6);

    let err = parse_setting::<i64>("RECIPE_SHARE_PAGE_SIZE", "six").unwrap_err();
    assert!(err.to_string().contains("RECIPE_SHARE_PAGE_SIZE"));
    assert!(parse_setting::<SocketAddr>("RECIPE_SHARE_ADDR", "nowhere").is_err());
}
