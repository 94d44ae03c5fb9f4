//! Command implementations.
//!
//! Every command returns an [`Output`]: text for humans and a JSON value for
//! `--json`. Printing is left to the binary.

use crate::cli::{CliError, Commands};
use fpstore::{Column, FingerprintStore, FingerprintStoreConfig, GcReport, copy_store};
use fpstore_events::TracingSink;
use serde_json::{Value, json};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Result of one command.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    /// Human-readable rendering.
    pub text: String,
    /// Structured payload for JSON envelopes.
    pub data: Value,
}

impl Output {
    fn new(text: impl Into<String>, data: Value) -> Self {
        Self {
            text: text.into(),
            data,
        }
    }
}

/// Build the store configuration: defaults, then the TOML file, then
/// `FPSTORE_*` environment variables.
///
/// # Errors
///
/// Returns a configuration error for an unreadable file or invalid value.
pub fn load_config(path: Option<&Path>) -> Result<FingerprintStoreConfig, CliError> {
    let config = match path {
        Some(path) => FingerprintStoreConfig::load(path)?,
        None => FingerprintStoreConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

/// Run `command` against the store it names.
///
/// # Errors
///
/// Returns a [`CliError`] when the store cannot be opened or the requested
/// record does not exist.
#[tracing::instrument(name = "command", skip_all, fields(command = command_name(&command)))]
pub async fn execute(
    command: Commands,
    config: &FingerprintStoreConfig,
) -> Result<Output, CliError> {
    match command {
        Commands::Entry {
            store,
            semi_stable_id,
            output_hash,
        } => {
            let store = open_read_only(&store, config)?;
            show_entry(&store, output_hash.as_deref(), &semi_stable_id)
        }
        Commands::ContentHash { store, hash } => {
            let store = open_read_only(&store, config)?;
            show_content_hash(&store, &hash)
        }
        Commands::CacheMisses { store } => {
            let store = open_read_only(&store, config)?;
            show_cache_misses(&store)
        }
        Commands::Keys { store, column } => {
            let store = open_read_only(&store, config)?;
            list_keys(&store, column.into())
        }
        Commands::Stats { store } => {
            let store = open_read_only(&store, config)?;
            show_stats(&store)
        }
        Commands::Remove {
            store,
            semi_stable_id,
        } => remove_entry(&store, config, &semi_stable_id),
        Commands::Gc {
            store,
            max_entry_age_secs,
            gc_budget_ms,
        } => {
            let mut config = config.clone();
            if let Some(secs) = max_entry_age_secs {
                config.max_entry_age_secs = secs;
            }
            if let Some(ms) = gc_budget_ms {
                config.gc_budget_ms = ms;
            }
            collect_garbage(&store, &config)
        }
        Commands::Copy { store, destination } => copy(&store, &destination).await,
        Commands::Checkpoint { store, destination } => {
            let store = open_read_write(&store, config)?;
            store.checkpoint(&destination)?;
            store.close()?;
            Ok(Output::new(
                format!("checkpoint written to {}", destination.display()),
                json!({ "destination": destination.display().to_string() }),
            ))
        }
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Entry { .. } => "entry",
        Commands::ContentHash { .. } => "content-hash",
        Commands::CacheMisses { .. } => "cache-misses",
        Commands::Keys { .. } => "keys",
        Commands::Stats { .. } => "stats",
        Commands::Remove { .. } => "remove",
        Commands::Gc { .. } => "gc",
        Commands::Copy { .. } => "copy",
        Commands::Checkpoint { .. } => "checkpoint",
    }
}

fn open_read_only(
    path: &Path,
    config: &FingerprintStoreConfig,
) -> Result<FingerprintStore, CliError> {
    Ok(FingerprintStore::open(path, config.to_open_options().read_only(true))?)
}

fn open_read_write(
    path: &Path,
    config: &FingerprintStoreConfig,
) -> Result<FingerprintStore, CliError> {
    if config.read_only {
        return Err(CliError::config(
            "this command writes to the store but the configuration sets read_only",
        ));
    }
    Ok(FingerprintStore::open(path, config.to_open_options())?)
}

/// Inputs are stored as opaque text; show them parsed when they are JSON.
fn inputs_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}

fn show_entry(
    store: &FingerprintStore,
    output_hash: Option<&str>,
    semi_stable_id: &str,
) -> Result<Output, CliError> {
    let entry = store
        .try_get_fingerprint_store_entry(output_hash, semi_stable_id)
        .ok_or_else(|| CliError::not_found(format!("entry for '{semi_stable_id}'")))?;

    let keys = entry.keys();
    let strong = &entry.strong_fingerprint_entry;
    let mut text = String::new();
    let _ = writeln!(text, "semi-stable id:     {}", entry.semi_stable_id());
    let _ = writeln!(text, "weak fingerprint:   {}", keys.weak_fingerprint);
    let _ = writeln!(text, "strong fingerprint: {}", keys.strong_fingerprint);
    let _ = writeln!(text, "path set:           {}", keys.path_set_hash);
    let _ = writeln!(text, "weak inputs:        {}", entry.weak_fingerprint_to_inputs.value);
    let _ = writeln!(text, "strong inputs:      {}", strong.strong_fingerprint_to_inputs.value);
    let _ = write!(text, "path set inputs:    {}", strong.path_set_hash_to_inputs.value);

    let data = json!({
        "semi_stable_id": entry.semi_stable_id(),
        "keys": keys,
        "weak_inputs": inputs_value(&entry.weak_fingerprint_to_inputs.value),
        "strong_inputs": inputs_value(&strong.strong_fingerprint_to_inputs.value),
        "path_set_inputs": inputs_value(&strong.path_set_hash_to_inputs.value),
    });
    Ok(Output::new(text, data))
}

fn show_content_hash(store: &FingerprintStore, hash: &str) -> Result<Output, CliError> {
    let value = store
        .try_get_content_hash_value(hash)
        .ok_or_else(|| CliError::not_found(format!("content hash '{hash}'")))?;
    let data = json!({ "hash": hash, "inputs": inputs_value(&value) });
    Ok(Output::new(value, data))
}

fn show_cache_misses(store: &FingerprintStore) -> Result<Output, CliError> {
    let list = store.try_get_cache_miss_list().unwrap_or_default();
    let mut text = String::new();
    for info in &list {
        let _ = writeln!(text, "{:>10}  {:?}", info.task_id, info.kind);
    }
    let _ = write!(text, "{} cache misses", list.len());
    Ok(Output::new(text, json!({ "cache_misses": list })))
}

fn list_keys(store: &FingerprintStore, column: Column) -> Result<Output, CliError> {
    let keys = store.keys(column)?;
    Ok(Output::new(
        keys.join("\n"),
        json!({ "column": column.name(), "keys": keys }),
    ))
}

fn show_stats(store: &FingerprintStore) -> Result<Output, CliError> {
    let mut text = String::new();
    let mut columns = serde_json::Map::new();
    for column in Column::ALL {
        let estimate = store.estimate_num_keys(column)?;
        let _ = writeln!(text, "{:<24} ~{estimate}", column.name());
        columns.insert(column.name().to_owned(), json!(estimate));
    }
    Ok(Output::new(
        text.trim_end().to_owned(),
        json!({ "estimated_keys": columns }),
    ))
}

fn remove_entry(
    path: &Path,
    config: &FingerprintStoreConfig,
    semi_stable_id: &str,
) -> Result<Output, CliError> {
    let store = open_read_write(path, config)?;
    let removed = store.remove_fingerprint_store_entry(semi_stable_id);
    store.close()?;
    if !removed {
        return Err(CliError::store(format!("failed to remove '{semi_stable_id}'")));
    }
    Ok(Output::new(
        format!("removed {semi_stable_id}"),
        json!({ "removed": semi_stable_id }),
    ))
}

fn collect_garbage(path: &Path, config: &FingerprintStoreConfig) -> Result<Output, CliError> {
    let store = open_read_write(path, config)?;
    let report = store.close()?;
    Ok(Output::new(render_gc_report(&report), gc_report_value(&report)))
}

fn render_gc_report(report: &GcReport) -> String {
    let mut text = String::new();
    for column in &report.columns {
        let _ = writeln!(
            text,
            "{:<24} evaluated {:>8}  removed {:>8}  tracked {:>8}{}{}",
            column.column().name(),
            column.total_keys,
            column.removed,
            column.lru_entries,
            if column.first_run { "  (first run)" } else { "" },
            if column.canceled { "  (canceled)" } else { "" },
        );
    }
    let _ = write!(
        text,
        "removed {} keys in {} ms",
        report.total_removed(),
        report.duration.as_millis()
    );
    text
}

fn gc_report_value(report: &GcReport) -> Value {
    let columns: Vec<Value> = report
        .columns
        .iter()
        .map(|c| {
            json!({
                "column": c.column().name(),
                "total_keys": c.total_keys,
                "removed": c.removed,
                "dangling": c.dangling,
                "lru_entries": c.lru_entries,
                "canceled": c.canceled,
                "first_run": c.first_run,
                "duration_ms": duration_ms(c.duration),
            })
        })
        .collect();
    json!({
        "columns": columns,
        "total_removed": report.total_removed(),
        "duration_ms": duration_ms(report.duration),
    })
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

async fn copy(store: &Path, destination: &Path) -> Result<Output, CliError> {
    if !store.is_dir() {
        return Err(CliError::store_with_help(
            format!("no store directory at {}", store.display()),
            "Pass the directory the build wrote its fingerprint store to",
        ));
    }
    let report = copy_store(store, destination, Arc::new(TracingSink)).await;
    let data = json!({
        "destination": destination.display().to_string(),
        "cloned": report.cloned,
        "hard_linked": report.hard_linked,
        "copied": report.copied,
        "skipped": report.skipped,
        "failed": report.failed,
    });
    if report.failed > 0 {
        return Err(CliError::store_with_help(
            format!("{} files failed to copy", report.failed),
            "Rerun with --level warn or lower to see each failure",
        ));
    }
    Ok(Output::new(
        format!(
            "copied {} files to {} (cloned {}, hard-linked {}, copied {}, skipped {})",
            report.transferred(),
            destination.display(),
            report.cloned,
            report.hard_linked,
            report.copied,
            report.skipped,
        ),
        data,
    ))
}
