// Copyright 2023 Remi Bernotavicius

use crate::error::{Error, Result};
use diesel::prelude::Connection as _;
use diesel::RunQueryDsl as _;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub mod models;
pub mod schema;

pub type Connection = diesel::sqlite::SqliteConnection;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

fn prepare(mut connection: Connection) -> Result<Connection> {
    diesel::sql_query("PRAGMA foreign_keys = ON").execute(&mut connection)?;
    connection
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| Error::Internal(format!("failed to run migrations: {e}")))?;
    Ok(connection)
}

pub fn establish_connection(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();
    let url = path
        .to_str()
        .ok_or_else(|| Error::Internal(format!("database path {path:?} is not valid UTF-8")))?;
    let connection = Connection::establish(url)
        .map_err(|e| Error::Internal(format!("failed to open database {url}: {e}")))?;
    prepare(connection)
}

/// A fresh, fully migrated database that lives only as long as the connection.
pub fn establish_in_memory() -> Result<Connection> {
    let connection = Connection::establish(":memory:")
        .map_err(|e| Error::Internal(format!("failed to open in-memory database: {e}")))?;
    prepare(connection)
}

/// The connection shared by request handlers. Queries run on tokio's blocking pool.
#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection: Arc::new(Mutex::new(connection)),
        }
    }

    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let connection = self.connection.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = connection.lock().unwrap_or_else(|poisoned| {
                log::warn!("recovering database connection after a panicked query");
                poisoned.into_inner()
            });
            f(&mut conn)
        })
        .await
        .map_err(|e| Error::Internal(format!("database task failed: {e}")))?
    }
}

#[test]
fn migrations() {
    let mut conn = establish_in_memory().unwrap();
    assert!(!conn.has_pending_migration(MIGRATIONS).unwrap());

    conn.revert_all_migrations(MIGRATIONS).unwrap();
    assert!(conn.has_pending_migration(MIGRATIONS).unwrap());

    conn.run_pending_migrations(MIGRATIONS).unwrap();
    assert!(!conn.has_pending_migration(MIGRATIONS).unwrap());
}

#[test]
fn foreign_keys_enabled() {
    use diesel::sql_types::Integer;

    #[derive(diesel::QueryableByName)]
    struct Pragma {
        #[diesel(sql_type = Integer)]
        foreign_keys: i32,
    }

    let mut conn = establish_in_memory().unwrap();
    let pragma: Pragma = diesel::sql_query("PRAGMA foreign_keys")
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(pragma.foreign_keys, 1);
}

#[tokio::test]
async fn panicked_query_does_not_poison_the_connection() {
    let database = Database::new(establish_in_memory().unwrap());

    let failed = database
        .run(|_conn| -> Result<()> { panic!("query blew up") })
        .await;
    assert!(matches!(failed, Err(Error::Internal(_))));

    let tags: i64 = database
        .run(|conn| {
            use diesel::QueryDsl as _;
            Ok(schema::tags::table.count().get_result(conn)?)
        })
        .await
        .unwrap();
    assert_eq!(tags, 0);
}
