//! Versioned schema migrations, embedded at compile time and tracked in
//! `refinery_schema_history`.

use refinery::embed_migrations;
use tokio_postgres::NoTls;

use crate::error::Error;

embed_migrations!("migrations");

/// Applies every pending migration in version order. A failing migration
/// is rolled back and aborts startup.
pub async fn run_migrations(database_url: &str) -> Result<(), Error> {
    tracing::info!("Running database migrations...");

    let config: tokio_postgres::Config = database_url.parse().map_err(|e| {
        Error::ConfigurationError(format!("Invalid database URL: {}", e))
    })?;

    let (mut client, connection) =
        config.connect(NoTls).await.map_err(|e| {
            Error::ConfigurationError(format!(
                "Failed to connect for migrations: {}",
                e
            ))
        })?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Migration connection error: {}", e);
        }
    });

    let report = migrations::runner()
        .run_async(&mut client)
        .await
        .map_err(|e| {
            Error::ConfigurationError(format!("Migration failed: {}", e))
        })?;

    let applied = report.applied_migrations();
    if applied.is_empty() {
        tracing::info!("No new migrations to apply");
    } else {
        for migration in applied {
            tracing::info!(
                "Applied migration: V{:03}__{}",
                migration.version(),
                migration.name()
            );
        }
        tracing::info!("Successfully applied {} migration(s)", applied.len());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_embedded() {
        let runner = migrations::runner();
        let mut versions: Vec<u32> = runner
            .get_migrations()
            .iter()
            .map(|m| m.version())
            .collect();
        versions.sort();

        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[test]
    fn protocol_precedes_positions() {
        let runner = migrations::runner();
        let names: Vec<String> = runner
            .get_migrations()
            .iter()
            .map(|m| m.name().to_owned())
            .collect();

        assert!(names.contains(&String::from("protocol")));
        assert!(names.contains(&String::from("lp_position")));
        assert!(names.contains(&String::from("action_history")));
    }
}
