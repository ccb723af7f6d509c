//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api;
use crate::config::ServerConfig;
use biosite_core::{BiositeError, RegisterForm, Store, UserProfile};
use std::path::{Path, PathBuf};

/// Validate an output path before writing to it.
///
/// The parent directory must exist; it is canonicalized so the reported
/// path has no `..` or symlink components.
fn validate_output_path(path: &Path) -> Result<PathBuf, BiositeError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        BiositeError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(BiositeError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| BiositeError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(config: ServerConfig) -> Result<(), BiositeError> {
    println!("biosite server starting...");
    println!();
    println!("Configuration:");
    println!("  Host:         {}", config.host);
    println!("  Port:         {}", config.port);
    println!("  Database:     {:?}", config.database);
    println!(
        "  CORS:         {}",
        config.cors_origins.as_deref().unwrap_or("localhost only")
    );
    println!(
        "  Rate limit:   {}",
        match config.rate_limit {
            0 => "disabled".to_string(),
            n => format!("{n} req/s"),
        }
    );
    println!("  Session TTL:  {}h", config.session_ttl_hours);
    println!(
        "  Registration: {}",
        if config.allow_registration {
            "open"
        } else {
            "closed"
        }
    );
    println!();
    println!("Endpoints:");
    println!("  GET  /health, /metrics");
    println!("  POST /auth/login, /auth/logout   GET /auth/me");
    println!("  CRUD /achievements, /gallery, /events, /visitors, /messages");
    println!("  GET  /events/search?q=");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(config).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show row counts per table.
pub fn cmd_status(config: &ServerConfig, json_mode: bool) -> Result<(), BiositeError> {
    let store = Store::open(&config.database)?;
    let counts = store.counts()?;

    if json_mode {
        let output = serde_json::json!({
            "database": config.database.to_string_lossy(),
            "counts": counts,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("biosite Status");
    println!("==============");
    println!("Database: {:?}", config.database);
    println!();
    println!("Visitors:     {}", counts.visitors);
    println!("Messages:     {}", counts.messages);
    println!("Achievements: {}", counts.achievements);
    println!("Gallery:      {}", counts.gallery);
    println!("Events:       {}", counts.events);
    println!("Users:        {}", counts.users);
    println!("Sessions:     {}", counts.sessions);

    Ok(())
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Write every content table to `output` as pretty-printed JSON.
pub fn cmd_export(db_path: &Path, output: &Path) -> Result<(), BiositeError> {
    let validated_output = validate_output_path(output)?;

    let store = Store::open(db_path)?;
    let snapshot = store.snapshot()?;
    let data = serde_json::to_vec_pretty(&snapshot)
        .map_err(|e| BiositeError::SerializationError(e.to_string()))?;

    std::fs::write(&validated_output, &data)
        .map_err(|e| BiositeError::IoError(format!("Write file: {}", e)))?;

    println!(
        "Exported {} visitors, {} messages, {} achievements, {} gallery items, {} events ({} bytes) to {:?}",
        snapshot.visitors.len(),
        snapshot.messages.len(),
        snapshot.achievements.len(),
        snapshot.gallery.len(),
        snapshot.events.len(),
        data.len(),
        validated_output
    );

    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(db_path: &Path, force: bool) -> Result<(), BiositeError> {
    if db_path.exists() {
        if !force {
            return Err(BiositeError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| BiositeError::IoError(format!("Remove existing database: {}", e)))?;
    }

    Store::open(db_path)?;
    println!("Initialized new redb database at {:?}", db_path);
    Ok(())
}

// =============================================================================
// CREATE-USER COMMAND
// =============================================================================

/// Create an administrator account.
///
/// Works regardless of `allow_registration`; this is how the first
/// account is made on a closed site.
pub fn cmd_create_user(
    config: &ServerConfig,
    json_mode: bool,
    email: String,
    password: String,
    name: Option<String>,
) -> Result<(), BiositeError> {
    let store = Store::open(&config.database)?;
    let user = config.authenticator().create_user(
        &store,
        RegisterForm {
            email,
            password,
            name,
        },
    )?;
    let profile = UserProfile::from(&user);

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&profile).unwrap_or_default()
        );
    } else {
        println!("Created user {} ({})", profile.email, profile.id);
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_for(db: PathBuf) -> ServerConfig {
        ServerConfig {
            database: db,
            password_rounds: 1,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn init_refuses_to_clobber_without_force() {
        let dir = tempdir().expect("temp dir");
        let db = dir.path().join("site.redb");
        cmd_init(&db, false).expect("first init");
        assert!(cmd_init(&db, false).is_err());
        cmd_init(&db, true).expect("forced init");
    }

    #[test]
    fn create_user_then_export_excludes_accounts() {
        let dir = tempdir().expect("temp dir");
        let config = config_for(dir.path().join("site.redb"));
        cmd_create_user(
            &config,
            false,
            "admin@example.com".into(),
            "correct horse".into(),
            None,
        )
        .expect("create user");

        let output = dir.path().join("export.json");
        cmd_export(&config.database, &output).expect("export");
        let text = std::fs::read_to_string(&output).expect("read export");
        assert!(!text.contains("admin@example.com"));
        let value: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert!(value["visitors"].as_array().is_some());
    }

    #[test]
    fn create_user_rejects_weak_password() {
        let dir = tempdir().expect("temp dir");
        let config = config_for(dir.path().join("site.redb"));
        let err = cmd_create_user(&config, false, "a@example.com".into(), "short".into(), None)
            .expect_err("weak password");
        assert!(matches!(err, BiositeError::Validation(_)));
    }

    #[test]
    fn export_into_missing_directory_fails() {
        let dir = tempdir().expect("temp dir");
        let missing = dir.path().join("nope").join("export.json");
        assert!(validate_output_path(&missing).is_err());
    }
}
