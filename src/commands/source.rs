//! `source` subcommands: manage the registry.

use anyhow::{Context, Result, bail};
use digest_hub::source::{AdapterConfig, NewSource, SourceConfig, SourceUpdate};
use serde_json::Value;

use super::{AppContext, print_json};
use crate::cli::{SourceAddArgs, SourceCommand, SourceUpdateArgs};

pub async fn run_source_command(ctx: &AppContext, command: SourceCommand) -> Result<()> {
    match command {
        SourceCommand::Add(args) => add(ctx, args).await,
        SourceCommand::List { json } => list(ctx, json).await,
        SourceCommand::Show { id } => {
            let source = load(ctx, &id).await?;
            print_json(&source)
        }
        SourceCommand::Update(args) => update(ctx, args).await,
        SourceCommand::Remove { id, purge } => remove(ctx, &id, purge).await,
        SourceCommand::Test { id } => test(ctx, &id).await,
    }
}

async fn add(ctx: &AppContext, args: SourceAddArgs) -> Result<()> {
    let mut source = NewSource::new(args.name, args.kind, args.adapter);
    source.id = args.id;
    source.cadence = args.cadence;
    source.config = settings_to_config(args.settings, AdapterConfig::new());
    source.tags = args.tags;
    source.enabled = !args.disabled;

    // Reject unknown adapters and invalid configs before anything is stored.
    let probe_id = source.id.clone().unwrap_or_else(|| source.name.clone());
    ctx.adapters
        .create(&source.adapter_id, &probe_id, &source.config)
        .context("Source rejected")?;

    let created = ctx.sources().create(source).await?;
    println!(
        "Added source {} ({}, {}, every {})",
        created.id, created.adapter_id, created.kind, created.cadence
    );
    Ok(())
}

async fn list(ctx: &AppContext, json: bool) -> Result<()> {
    let sources = ctx.sources().get_all().await?;
    if json {
        return print_json(&sources);
    }
    if sources.is_empty() {
        println!("No sources configured. Add one with `digest-hub source add`.");
        return Ok(());
    }
    for source in &sources {
        println!("{}", render_source_row(source));
    }
    Ok(())
}

async fn update(ctx: &AppContext, args: SourceUpdateArgs) -> Result<()> {
    let current = load(ctx, &args.id).await?;

    let config = if args.settings.is_empty() {
        None
    } else {
        Some(settings_to_config(args.settings, current.config.clone()))
    };
    let enabled = match (args.enable, args.disable) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    };
    let update = SourceUpdate {
        name: args.name,
        cadence: args.cadence,
        config,
        tags: if args.tags.is_empty() {
            None
        } else {
            Some(args.tags)
        },
        enabled,
        ..SourceUpdate::default()
    };
    if update.is_empty() {
        println!("Nothing to update for source {}", current.id);
        return Ok(());
    }

    if let Some(config) = &update.config {
        ctx.adapters
            .create(&current.adapter_id, &current.id, config)
            .context("Update rejected")?;
    }

    let updated = ctx.sources().update(&current.id, update).await?;
    println!("{}", render_source_row(&updated));
    Ok(())
}

async fn remove(ctx: &AppContext, id: &str, purge: bool) -> Result<()> {
    if purge {
        let Some(items) = ctx.sources().purge(id).await? else {
            bail!("source not found: {id}");
        };
        println!("Removed source {id} and {items} stored items");
        return Ok(());
    }
    if !ctx.sources().delete(id).await? {
        bail!("source not found: {id}");
    }
    println!("Removed source {id}");
    Ok(())
}

async fn test(ctx: &AppContext, id: &str) -> Result<()> {
    let source = load(ctx, id).await?;
    let adapter = ctx
        .adapters
        .create(&source.adapter_id, &source.id, &source.config)?;
    if adapter.test_connection().await {
        println!("Source {id} is reachable");
        Ok(())
    } else {
        bail!("source {id} is not reachable with its current config")
    }
}

async fn load(ctx: &AppContext, id: &str) -> Result<SourceConfig> {
    ctx.sources()
        .get_by_id(id)
        .await?
        .with_context(|| format!("source not found: {id}"))
}

/// Merges `KEY=VALUE` pairs into `base`. Values that parse as JSON scalars
/// (numbers, booleans) keep that type; everything else is a string.
fn settings_to_config(settings: Vec<(String, String)>, mut base: AdapterConfig) -> AdapterConfig {
    for (key, raw) in settings {
        let value = match serde_json::from_str::<Value>(&raw) {
            Ok(parsed @ (Value::Number(_) | Value::Bool(_))) => parsed,
            _ => Value::String(raw),
        };
        base.insert(key, value);
    }
    base
}

fn render_source_row(source: &SourceConfig) -> String {
    let state = if source.enabled { "enabled" } else { "disabled" };
    let last = source
        .last_retrieved
        .map_or_else(|| "never".to_string(), |at| at.to_rfc3339());
    let tags = if source.tags.is_empty() {
        String::new()
    } else {
        format!("  [{}]", source.tags.join(", "))
    };
    format!(
        "{}  {}  {}/{}  {}  {}  last: {}{}",
        source.id, source.name, source.kind, source.adapter_id, source.cadence, state, last, tags
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_keep_scalar_types() {
        let config = settings_to_config(
            vec![
                ("url".to_string(), "https://example.com/feed.xml".to_string()),
                ("timeout".to_string(), "10".to_string()),
                ("verify".to_string(), "false".to_string()),
                ("channel".to_string(), "\"quoted\"".to_string()),
            ],
            AdapterConfig::new(),
        );
        assert_eq!(config["url"], Value::String("https://example.com/feed.xml".into()));
        assert_eq!(config["timeout"], Value::from(10));
        assert_eq!(config["verify"], Value::Bool(false));
        assert_eq!(config["channel"], Value::String("\"quoted\"".into()));
    }

    #[test]
    fn test_settings_override_existing_keys() {
        let mut base = AdapterConfig::new();
        base.insert("url".to_string(), "https://old.example/feed".into());
        base.insert("timeout".to_string(), 30.into());
        let config = settings_to_config(
            vec![("url".to_string(), "https://new.example/feed".to_string())],
            base,
        );
        assert_eq!(config["url"], Value::String("https://new.example/feed".into()));
        assert_eq!(config["timeout"], Value::from(30));
    }
}
