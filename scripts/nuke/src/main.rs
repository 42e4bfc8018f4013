use clap::Parser;
use colored::*;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

/// Child tables first so the truncation respects foreign keys.
const TABLES: [&str; 4] = ["tracks", "releases", "artists", "events"];
const DEFAULT_SCHEMA: &str = "concerts_vienna";

#[derive(Parser, Debug)]
#[command(name = "concerts-nuke", about = "Delete all data from the concerts schema")]
struct Args {
    /// Skip confirmation prompt
    #[arg(long)]
    yes: bool,

    /// Drop the whole schema instead of emptying its tables
    #[arg(long)]
    drop: bool,
}

#[derive(Debug, Error)]
enum NukeError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("invalid {key}: '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{} statement(s) failed: {}", .0.len(), .0.join(", "))]
    Statements(Vec<String>),

    #[error("Could not read confirmation: {0}")]
    Prompt(#[from] io::Error),
}

struct Target {
    database: PgConnectOptions,
    schema: String,
}

fn load_dotenv() {
    let env_paths = [PathBuf::from(".env"), PathBuf::from("../../.env")];

    for p in &env_paths {
        if p.exists() {
            dotenvy::from_path(p).ok();
            return;
        }
    }

    if let Ok(project_root) = std::env::var("PROJECT_ROOT") {
        let env_path = PathBuf::from(&project_root).join(".env");
        if env_path.exists() {
            dotenvy::from_path(env_path).ok();
        }
    }
}

fn target_from<F>(get: F) -> Result<Target, NukeError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

    let database = match get("DATABASE_URL") {
        Some(url) => url.parse::<PgConnectOptions>().map_err(|_| NukeError::Invalid {
            key: "DATABASE_URL",
            value: url,
        })?,
        None => {
            let user = get("DB_USER").ok_or(NukeError::Missing("DATABASE_URL or DB_USER"))?;
            let port = get("DB_PORT").unwrap_or_else(|| "5432".to_string());
            let port = port.parse::<u16>().map_err(|_| NukeError::Invalid {
                key: "DB_PORT",
                value: port,
            })?;
            let mut options = PgConnectOptions::new()
                .host(&get("DB_HOST").unwrap_or_else(|| "localhost".to_string()))
                .port(port)
                .database(&get("DB_NAME").unwrap_or_else(|| "concerts".to_string()))
                .username(&user);
            if let Some(password) = get("DB_PASSWORD") {
                options = options.password(&password);
            }
            options
        }
    };

    let schema = get("DB_SCHEMA").unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
    if !is_identifier(&schema) {
        return Err(NukeError::Invalid {
            key: "DB_SCHEMA",
            value: schema,
        });
    }

    Ok(Target { database, schema })
}

/// The schema name is spliced into SQL, so only plain lowercase identifiers pass.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name.len() <= 63
}

fn statements(schema: &str, drop: bool) -> Vec<(String, String)> {
    if drop {
        return vec![(
            format!("schema {}", schema),
            format!("DROP SCHEMA IF EXISTS {} CASCADE", schema),
        )];
    }
    TABLES
        .iter()
        .map(|table| {
            (
                format!("{}.{}", schema, table),
                format!("TRUNCATE TABLE {}.{} CASCADE", schema, table),
            )
        })
        .collect()
}

/// Runs every statement and fails afterwards if any of them did.
async fn execute_all(pool: &PgPool, statements: &[(String, String)]) -> Result<(), NukeError> {
    let mut failed = Vec::new();
    for (label, sql) in statements {
        match sqlx::query(sql).execute(pool).await {
            Ok(_) => println!("  {} {}", "✓".green(), label),
            Err(e) => {
                eprintln!("  {} Error on {}: {}", "✗".red(), label, e);
                failed.push(label.clone());
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(NukeError::Statements(failed))
    }
}

fn confirm() -> Result<bool, NukeError> {
    print!("Are you sure you want to continue? Type 'yes' to confirm: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim() == "yes")
}

async fn nuke(args: &Args) -> Result<(), NukeError> {
    load_dotenv();
    let target = target_from(|key| std::env::var(key).ok())?;

    let action = if args.drop { "DROP the schema" } else { "DELETE ALL DATA from" };
    println!(
        "{}  WARNING: This will {} '{}'!",
        "⚠️".yellow(),
        action,
        target.schema.bright_white().bold()
    );
    println!();

    if !args.yes {
        if !confirm()? {
            println!("Aborted.");
            return Ok(());
        }
        println!();
    }

    println!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_with(target.database)
        .await?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)")
            .bind(&target.schema)
            .fetch_one(&pool)
            .await?;
    if !exists {
        println!("  {} Schema {} does not exist, nothing to do", "✓".green(), target.schema);
        return Ok(());
    }

    execute_all(&pool, &statements(&target.schema, args.drop)).await?;

    println!();
    println!("{} Schema {} nuked", "✓".green().bold(), target.schema);
    println!();
    println!("Next steps:");
    println!("  1. Run: ./concerts-sync");

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    println!("Concerts Database Nuke");
    println!("======================");
    println!();

    match nuke(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn target(pairs: &[(&str, &str)]) -> Result<Target, NukeError> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        target_from(|key| env.get(key).cloned())
    }

    #[test]
    fn test_truncates_children_before_parents() {
        let sql: Vec<_> = statements("concerts_vienna", false).into_iter().map(|(_, s)| s).collect();
        assert_eq!(
            sql,
            vec![
                "TRUNCATE TABLE concerts_vienna.tracks CASCADE",
                "TRUNCATE TABLE concerts_vienna.releases CASCADE",
                "TRUNCATE TABLE concerts_vienna.artists CASCADE",
                "TRUNCATE TABLE concerts_vienna.events CASCADE",
            ]
        );
    }

    #[test]
    fn test_drop_is_a_single_statement() {
        let sql = statements("concerts_graz", true);
        assert_eq!(sql.len(), 1);
        assert_eq!(sql[0].1, "DROP SCHEMA IF EXISTS concerts_graz CASCADE");
    }

    #[test]
    fn test_target_defaults_and_validation() {
        let t = target(&[("DATABASE_URL", "postgres://u:p@db:5432/concerts")]).unwrap();
        assert_eq!(t.schema, DEFAULT_SCHEMA);

        assert!(matches!(target(&[]), Err(NukeError::Missing(_))));
        assert!(matches!(
            target(&[("DB_USER", "u"), ("DB_SCHEMA", "public; DROP")]),
            Err(NukeError::Invalid { key: "DB_SCHEMA", .. })
        ));
        assert!(matches!(
            target(&[("DB_USER", "u"), ("DB_PORT", "abc")]),
            Err(NukeError::Invalid { key: "DB_PORT", .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_statement_is_an_error() {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            return;
        };
        let pool = PgPoolOptions::new().max_connections(1).connect(&url).await.unwrap();
        let schema = format!("concerts_nuke_test_{}", std::process::id());
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(&format!("CREATE TABLE {}.events (id TEXT PRIMARY KEY)", schema))
            .execute(&pool)
            .await
            .unwrap();

        // Only events exists, so the other three truncations fail.
        let err = execute_all(&pool, &statements(&schema, false)).await.unwrap_err();
        match err {
            NukeError::Statements(failed) => assert_eq!(
                failed,
                vec![
                    format!("{}.tracks", schema),
                    format!("{}.releases", schema),
                    format!("{}.artists", schema),
                ]
            ),
            other => panic!("expected statement failures, got {:?}", other),
        }

        assert!(execute_all(&pool, &statements(&schema, true)).await.is_ok());
    }

    #[test]
    fn test_statement_failures_message() {
        let err = NukeError::Statements(vec!["s.tracks".to_string(), "s.artists".to_string()]);
        assert_eq!(err.to_string(), "2 statement(s) failed: s.tracks, s.artists");
    }
}
