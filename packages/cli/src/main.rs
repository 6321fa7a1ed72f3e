use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use storage::BlobStore;
use thumbnails::processor::ImageProcessor;
use thumbnails::{
    Thumbnail, ThumbnailManager, Thumbnails, ThumbnailsConfig, delete, exists, fetch_thumbnails,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "thumbs", version, about = "Generate, inspect and delete thumbnails")]
struct Cli {
    /// Configuration file, extension optional.
    #[arg(long, short, env = "THUMBNAILS_CONFIG", default_value = "config/thumbnails")]
    config: String,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List configured sizes.
    Sizes,
    /// Store a local image as a source and register it.
    Upload {
        file: PathBuf,
        /// Blob path to store under. Defaults to the file name.
        #[arg(long)]
        name: Option<String>,
    },
    /// Resolve a thumbnail, generating it if missing.
    Get { source: String, size: String },
    /// Resolve a thumbnail without generating it.
    Find { source: String, size: String },
    /// Regenerate a thumbnail.
    Create { source: String, size: String },
    /// List every stored thumbnail of a source.
    All { source: String },
    /// Check whether a thumbnail exists. Uses the default size when none is given.
    Exists {
        source: String,
        #[arg(long)]
        size: Option<String>,
    },
    /// Delete a thumbnail. Uses the default size when none is given.
    Delete {
        source: String,
        #[arg(long)]
        size: Option<String>,
    },
    /// Prefetch thumbnails of many sources with one query per metadata backend.
    Fetch {
        #[arg(required = true)]
        sources: Vec<String>,
        /// Restrict to these sizes. Repeatable.
        #[arg(long = "size")]
        sizes: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = ThumbnailsConfig::load_from(&cli.config).context("Failed to load config")?;
    let thumbnails = Thumbnails::from_config(&config, Arc::new(ImageProcessor::default()))
        .await
        .context("Failed to initialize thumbnails")?;

    run(cli.command, &thumbnails, cli.json).await
}

async fn run(command: Command, thumbnails: &Thumbnails, json: bool) -> anyhow::Result<()> {
    match command {
        Command::Sizes => {
            let registry = thumbnails.registry();
            for spec in registry.iter() {
                let t = &spec.transform;
                let primary = registry.default_size() == Some(spec.name.as_str());
                let value = json!({
                    "name": spec.name,
                    "width": t.width,
                    "height": t.height,
                    "method": t.method,
                    "format": t.format,
                    "quality": t.quality,
                    "fallback_url": spec.fallback_url,
                    "default": primary,
                });
                if json {
                    println!("{value}");
                } else {
                    let marker = if primary { " (default)" } else { "" };
                    println!(
                        "{}{marker}\t{}x{}\t{:?}",
                        spec.name, t.width, t.height, t.method
                    );
                }
            }
        }
        Command::Upload { file, name } => {
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .context("File name is not valid UTF-8")?,
            };
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let stored = thumbnails.storage().save(&name, &bytes).await?;
            thumbnails.add_source(&stored).await?;
            info!(source = %stored, bytes = bytes.len(), "Source uploaded");
            print_value(json, json!({ "source": stored }), &stored);
        }
        Command::Get { source, size } => {
            let thumb = thumbnails.manager(source).get(&size).await?;
            print_thumbnail(json, &thumb);
        }
        Command::Find { source, size } => {
            let thumb = thumbnails.manager(source).find(&size).await?;
            print_thumbnail(json, &thumb);
        }
        Command::Create { source, size } => {
            let thumb = thumbnails.manager(source).create(&size).await?;
            print_thumbnail(json, &thumb);
        }
        Command::All { source } => {
            for thumb in thumbnails.manager(source).all().await?.values() {
                print_thumbnail(json, thumb);
            }
        }
        Command::Exists { source, size } => {
            let found = exists(thumbnails, &source, size.as_deref()).await?;
            print_value(json, json!({ "exists": found }), &found.to_string());
        }
        Command::Delete { source, size } => {
            let deleted = delete(thumbnails, &source, size.as_deref()).await?;
            print_value(json, json!({ "deleted": deleted }), &deleted.to_string());
        }
        Command::Fetch { sources, sizes } => {
            let managers: Vec<ThumbnailManager> = sources
                .into_iter()
                .map(|source| thumbnails.manager(source))
                .collect();
            let refs: Vec<&ThumbnailManager> = managers.iter().collect();
            let requested: Vec<&str> = sizes.iter().map(String::as_str).collect();
            let scope = (!requested.is_empty()).then_some(requested.as_slice());

            let summary = fetch_thumbnails(&refs, scope, thumbnails.cancellation()).await?;
            info!(
                groups = summary.groups,
                sources = summary.sources,
                skipped = summary.skipped,
                "Prefetch complete"
            );

            let names: Vec<String> = match scope {
                Some(sizes) => sizes.iter().map(|s| s.to_string()).collect(),
                None => thumbnails.registry().names().map(str::to_string).collect(),
            };
            for manager in &managers {
                for size in &names {
                    let thumb = manager.find(size).await?;
                    if json {
                        let mut value = render(&thumb);
                        value["source"] = json!(manager.source().map(|s| s.name()));
                        println!("{value}");
                    } else {
                        let source = manager.source().map_or("-", |s| s.name());
                        println!("{source}\t{}", render_text(&thumb));
                    }
                }
            }
        }
    }
    Ok(())
}

fn render(thumb: &Thumbnail) -> Value {
    match thumb {
        Thumbnail::Stored(stored) => json!({
            "size": thumb.size(),
            "status": "stored",
            "path": stored.path(),
            "url": stored.url(),
            "created_at": thumb.descriptor().map(|d| d.created_at.to_rfc3339()),
        }),
        Thumbnail::Fallback(fallback) => json!({
            "size": thumb.size(),
            "status": "fallback",
            "url": fallback.url(),
        }),
        Thumbnail::Empty { .. } => json!({
            "size": thumb.size(),
            "status": "absent",
        }),
    }
}

fn render_text(thumb: &Thumbnail) -> String {
    match thumb {
        Thumbnail::Stored(stored) => format!("{}\t{}\t{}", thumb.size(), stored.path(), stored.url()),
        Thumbnail::Fallback(fallback) => format!("{}\tfallback\t{}", thumb.size(), fallback.url()),
        Thumbnail::Empty { .. } => format!("{}\tabsent", thumb.size()),
    }
}

fn print_thumbnail(json: bool, thumb: &Thumbnail) {
    if json {
        println!("{}", render(thumb));
    } else {
        println!("{}", render_text(thumb));
    }
}

fn print_value(json: bool, value: Value, text: &str) {
    if json {
        println!("{value}");
    } else {
        println!("{text}");
    }
}
