//! Numbered directory migrations: `<number>_<name>/up.sql` with a matching `down.sql`.
//!
//! Applied migrations are tracked in `lantern.role_persist_host`, separate from the platform's
//! own migration table so both can share one database.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{Client, ClientError};

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] ClientError),

    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid migration name: {0}")]
    InvalidName(PathBuf),

    #[error("Client is read-only")]
    ReadOnly,
}

impl From<tokio_postgres::Error> for MigrationError {
    fn from(e: tokio_postgres::Error) -> Self {
        MigrationError::DatabaseError(e.into())
    }
}

pub async fn migrate<P: AsRef<Path>>(client: &Client, path: P) -> Result<(), MigrationError> {
    if client.readonly {
        return Err(MigrationError::ReadOnly);
    }

    client.execute("CREATE SCHEMA IF NOT EXISTS lantern", &[]).await?;
    client
        .execute(
            "CREATE TABLE IF NOT EXISTS lantern.role_persist_host (
                migration int4 NOT NULL PRIMARY KEY,
                migrated timestamptz NOT NULL
            )",
            &[],
        )
        .await?;

    let newest_migration = client
        .query_one("SELECT max(migration) FROM lantern.role_persist_host", &[])
        .await?;

    let last_migration: i32 = newest_migration.try_get::<_, Option<i32>>(0)?.unwrap_or(-1);

    log::info!("Last migration: {last_migration}");

    let mut available_migrations = Vec::new();

    for entry in std::fs::read_dir(path)? {
        let path = entry?.path();

        if path.is_dir() {
            available_migrations.push((migration_number(&path)?, path));
        }
    }

    available_migrations.sort_by_key(|(key, _)| *key);

    for (idx, migration_path) in available_migrations {
        let name = migration_path.file_name().unwrap_or_default().to_string_lossy().into_owned();

        if idx <= last_migration {
            log::info!("Skipping migration {idx}: {name}");
            continue;
        }

        log::info!("Running migration {idx}: {name}");

        let migration = load_migration(migration_path).await?;

        async fn run_batch(client: &Client, sql: &str) -> Result<(), MigrationError> {
            for command in SqlIterator::new(sql) {
                client.execute(command, &[]).await?;
            }

            Ok(())
        }

        if let Err(e) = run_batch(client, &migration.up).await {
            log::error!("Migration error: {e}");
            log::warn!("Rolling back migration {idx}...");

            run_batch(client, &migration.down).await?;

            return Err(e);
        }

        client
            .execute(
                "INSERT INTO lantern.role_persist_host (migration, migrated) VALUES ($1, now())",
                &[&idx],
            )
            .await?;
    }

    Ok(())
}

fn migration_number(path: &Path) -> Result<i32, MigrationError> {
    let invalid = || MigrationError::InvalidName(path.to_owned());

    let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(invalid)?;
    let end = name.find(|c: char| !c.is_ascii_digit()).unwrap_or(name.len());

    i32::from_str(&name[..end]).map_err(|_| invalid())
}

pub struct Migration {
    up: String,
    down: String,
}

async fn load_migration(path: PathBuf) -> Result<Migration, MigrationError> {
    Ok(Migration {
        up: tokio::fs::read_to_string(path.join("up.sql")).await?,
        down: tokio::fs::read_to_string(path.join("down.sql")).await?,
    })
}

/// Splits a script into individual statements on `;`, ignoring those inside
/// `$$` bodies, quoted strings and `--` comments. Whitespace-only statements are skipped.
pub struct SqlIterator<'a> {
    sql: &'a str,
}

impl<'a> SqlIterator<'a> {
    pub fn new(sql: &'a str) -> Self {
        SqlIterator { sql }
    }
}

impl<'a> Iterator for SqlIterator<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        loop {
            if self.sql.trim().is_empty() {
                return None;
            }

            let mut in_dollar = false;
            let mut in_quote = false;
            let mut in_comment = false;
            let mut split = None;

            let mut ic = self.sql.char_indices().peekable();

            while let Some((idx, c)) = ic.next() {
                let next = ic.peek().map(|(_, c)| *c);

                match c {
                    '\n' if in_comment => in_comment = false,
                    _ if in_comment => {}
                    '-' if !in_quote && !in_dollar && next == Some('-') => in_comment = true,
                    '\'' if !in_dollar => in_quote = !in_quote,
                    '$' if !in_quote && next == Some('$') => {
                        in_dollar = !in_dollar;
                        ic.next();
                    }
                    ';' if !in_quote && !in_dollar => {
                        split = Some(idx);
                        break;
                    }
                    _ => {}
                }
            }

            let command = match split {
                Some(idx) => {
                    let command = &self.sql[..idx];
                    self.sql = &self.sql[idx + 1..];
                    command
                }
                None => std::mem::take(&mut self.sql),
            };

            if !strip_comments(command).trim().is_empty() {
                return Some(command);
            }
        }
    }
}

fn strip_comments(sql: &str) -> String {
    sql.lines().map(|line| line.split("--").next().unwrap_or_default()).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_statements() {
        let sql = "CREATE TABLE a (x int8);\nCREATE INDEX a_x ON a (x);\n";
        let commands: Vec<_> = SqlIterator::new(sql).map(str::trim).collect();

        assert_eq!(commands, ["CREATE TABLE a (x int8)", "CREATE INDEX a_x ON a (x)"]);
    }

    #[test]
    fn keeps_dollar_bodies_and_strings_intact() {
        let sql = "
            CREATE FUNCTION f() RETURNS void AS $$ BEGIN PERFORM 1; END $$ LANGUAGE plpgsql;
            SELECT ';';
        ";
        let commands: Vec<_> = SqlIterator::new(sql).map(str::trim).collect();

        assert_eq!(commands.len(), 2);
        assert!(commands[0].ends_with("LANGUAGE plpgsql"));
        assert_eq!(commands[1], "SELECT ';'");
    }

    #[test]
    fn skips_comment_only_statements() {
        let sql = "-- header; with a semicolon\nDROP TABLE a;\n-- trailing\n";
        let commands: Vec<_> = SqlIterator::new(sql).map(str::trim).collect();

        assert_eq!(commands.len(), 1);
        assert!(commands[0].ends_with("DROP TABLE a"));
    }

    #[test]
    fn migration_numbers_parse_from_prefix() {
        assert_eq!(migration_number(Path::new("migrations/0001_role_persists")).unwrap(), 1);
        assert_eq!(migration_number(Path::new("12")).unwrap(), 12);
        assert!(migration_number(Path::new("role_persists")).is_err());
    }
}
