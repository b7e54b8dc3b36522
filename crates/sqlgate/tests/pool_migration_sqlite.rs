//! End-to-end tests: pool, gate, and migration coordinator against
//! file-backed databases.

use sqlgate::{Location, Pool, Query, SchemaDescriptor};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Version 3: users (with email) and sessions.
fn app_schema() -> SchemaDescriptor {
    SchemaDescriptor::builder(3)
        .bootstrap(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT);\n\
             CREATE TABLE sessions (id INTEGER PRIMARY KEY, \
             user_id INTEGER NOT NULL REFERENCES users(id), token TEXT NOT NULL);",
        )
        .migration(
            1,
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        )
        .migration(2, "ALTER TABLE users ADD COLUMN email TEXT")
        .migration(
            3,
            "CREATE TABLE sessions (id INTEGER PRIMARY KEY, \
             user_id INTEGER NOT NULL REFERENCES users(id), token TEXT NOT NULL)",
        )
        .require_table("users")
        .require_table("sessions")
        .finish()
}

fn stored_version(pool: &Pool) -> i64 {
    pool.fetch_one(&Query::new("PRAGMA user_version"), |row| {
        row.get_as::<i64>(0)
    })
    .unwrap()
    .unwrap()
}

#[test]
fn bootstrap_from_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Pool::new();
    pool.configure_with(
        Location::file(dir.path().join("app.db")),
        String::new,
        |prepare| prepare.create_or_migrate(&app_schema()),
    )
    .unwrap();

    assert_eq!(stored_version(&pool), 3);

    let tables = pool
        .fetch_all(
            &Query::new("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name"),
            |row| row.get_as::<String>(0),
        )
        .unwrap();
    assert!(tables.contains(&"users".to_string()));
    assert!(tables.contains(&"sessions".to_string()));

    // The email column is queryable and defaults to null
    pool.execute(&Query::new("INSERT INTO users (name) VALUES (?)").bind("Ana"))
        .unwrap();
    let email = pool
        .fetch_one(&Query::new("SELECT email FROM users"), |row| {
            row.get_as::<Option<String>>(0)
        })
        .unwrap();
    assert_eq!(email, Some(None));
}

#[test]
fn insert_then_fetch_by_rowid() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Pool::new();
    pool.configure_with(
        Location::file(dir.path().join("app.db")),
        String::new,
        |prepare| prepare.create_or_migrate(&app_schema()),
    )
    .unwrap();

    pool.execute(&Query::new("INSERT INTO users (name) VALUES (?)").bind("Ana"))
        .unwrap();
    let name = pool
        .fetch_one(
            &Query::new("SELECT name FROM users WHERE rowid = last_insert_rowid()"),
            |row| row.get_named::<String>("name"),
        )
        .unwrap();
    assert_eq!(name, Some("Ana".to_string()));
}

#[test]
fn fetch_streaming_visits_every_row() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Pool::new();
    pool.configure_with(
        Location::file(dir.path().join("app.db")),
        String::new,
        |prepare| prepare.create_or_migrate(&app_schema()),
    )
    .unwrap();

    for name in ["Ana", "Bea", "Cai"] {
        pool.execute(&Query::new("INSERT INTO users (name) VALUES (?)").bind(name))
            .unwrap();
    }

    let mut names = Vec::new();
    pool.fetch_streaming(
        &Query::new("SELECT name FROM users ORDER BY name"),
        |row| row.get_as::<String>(0),
        |name| names.push(name),
    )
    .unwrap();
    assert_eq!(names, vec!["Ana", "Bea", "Cai"]);
}

#[test]
fn wrong_key_fails_before_any_migration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("encrypted.db");

    // A file the key cannot decrypt: from the engine's point of view it is
    // simply not a database.
    let garbage = b"definitely not a database header, nor anything after it";
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(garbage).unwrap();
    drop(f);

    let pool = Pool::new();
    let err = pool
        .configure_with(
            Location::file(&path),
            || "wrong-secret".to_string(),
            |prepare| prepare.create_or_migrate(&app_schema()),
        )
        .unwrap_err();

    assert!(err.is_invalid_key(), "got: {err}");
    // Nothing was created or corrupted
    assert_eq!(std::fs::read(&path).unwrap(), garbage);
}

#[test]
fn readers_never_observe_partial_schema() {
    let dir = tempfile::tempdir().unwrap();
    let location = Location::file(dir.path().join("app.db"));
    let pool = Arc::new(Pool::new());
    let prepare_started = Arc::new(AtomicBool::new(false));

    let configure = {
        let pool = Arc::clone(&pool);
        let started = Arc::clone(&prepare_started);
        thread::spawn(move || {
            pool.configure_with(location, String::new, |prepare| {
                started.store(true, Ordering::SeqCst);
                // Stretch the preparation window so readers pile up on the
                // gate while the schema is mid-flight.
                prepare.create_or_migrate(
                    &SchemaDescriptor::builder(1)
                        .bootstrap("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
                        .migration(
                            1,
                            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
                        )
                        .finish(),
                )?;
                thread::sleep(Duration::from_millis(80));
                prepare.create_or_migrate(&app_schema())
            })
            .unwrap();
        })
    };

    while !prepare_started.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(5));
    }

    let mut readers = Vec::new();
    for _ in 0..4 {
        let pool = Arc::clone(&pool);
        readers.push(thread::spawn(move || {
            // Granted only after preparation fully finished; both tables
            // must be visible, never just one.
            let tables = pool
                .fetch_all(
                    &Query::new(
                        "SELECT name FROM sqlite_master \
                         WHERE type = 'table' AND name IN ('users', 'sessions')",
                    ),
                    |row| row.get_as::<String>(0),
                )
                .unwrap();
            assert_eq!(tables.len(), 2, "saw a partially-migrated schema");
        }));
    }

    configure.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn recreate_resets_through_prepare() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");

    let pool = Pool::new();
    pool.configure_with(Location::file(&path), String::new, |prepare| {
        prepare.create_or_migrate(&app_schema())
    })
    .unwrap();
    pool.execute(&Query::new("INSERT INTO users (name) VALUES (?)").bind("Ana"))
        .unwrap();

    // A second pool against the same file, recreated destructively
    let pool2 = Pool::new();
    pool2
        .configure_with(Location::file(&path), String::new, |prepare| {
            prepare.recreate(&app_schema())
        })
        .unwrap();

    let count = pool2
        .fetch_one(&Query::new("SELECT count(*) FROM users"), |row| {
            row.get_as::<i64>(0)
        })
        .unwrap();
    assert_eq!(count, Some(0));
    assert_eq!(stored_version(&pool2), 3);
}
