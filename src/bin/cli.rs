// Backtrack - Offline Media Library Client
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::{Context, Result};
use backtrack_core::api::{ContentId, PlayerClient, ResolverConfig};
use backtrack_core::download::{AcquisitionConfig, AcquisitionManager, AcquisitionSource, DownloadProgress, QualityPreference};
use backtrack_core::storage::{Database, MediaStore, NewLibraryEntry};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "backtrack-cli")]
#[command(about = "Backtrack CLI - Desktop testing tool", long_about = None)]
struct Cli {
    /// SQLite database path (defaults to the platform data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Player endpoint override
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Pass-through proxy prefixed to every upstream URL
    #[arg(long, global = true)]
    proxy: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a video and list its stream variants
    Info {
        id: String,
    },
    /// Download video and audio into the local cache
    Acquire {
        id: String,
        /// Quality tier ("medium") or height ("360p")
        #[arg(short, long)]
        quality: Option<String>,
        /// Also add the video to the library
        #[arg(long)]
        add: bool,
        /// Range request size in bytes
        #[arg(long)]
        chunk_size: Option<u64>,
    },
    /// Remove a video from the library and the cache
    Delete {
        id: String,
    },
    /// List library entries and cached media
    List,
    /// Reclaim space left by deleted media
    Compact {
        /// Vacuum even below the unused-space threshold
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let db_path = cli.db.clone().unwrap_or_else(Database::get_default_path);
    let db = Database::new(&db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    let store = Arc::new(MediaStore::new(db));

    let mut resolver_config = ResolverConfig::default();
    if let Some(ref endpoint) = cli.endpoint {
        resolver_config.endpoint = endpoint.clone();
    }
    resolver_config.proxy_prefix = cli.proxy.clone();
    let resolver = Arc::new(PlayerClient::new(resolver_config).context("Failed to build player client")?);

    let mut config = AcquisitionConfig::default();
    config.fetch.proxy_prefix = cli.proxy.clone();
    if let Commands::Acquire { chunk_size: Some(size), .. } = cli.command {
        config.fetch.chunk_size = size;
    }

    let manager = AcquisitionManager::new(reqwest::Client::new(), resolver, store.clone(), config);

    match cli.command {
        Commands::Info { id } => {
            let info = manager.list_formats(&ContentId::new(id)).await?;
            println!("{} - {}", info.title, info.author);
            println!("{:<6} {:<6} {:<10} {:<10} {:<10} {:>12}", "itag", "ext", "video", "audio", "quality", "size");
            for f in &info.formats {
                println!(
                    "{:<6} {:<6} {:<10} {:<10} {:<10} {:>12}",
                    f.format_id,
                    f.container,
                    f.video_codec,
                    f.audio_codec,
                    f.quality_tier.as_deref().unwrap_or("-"),
                    f.byte_size.map(DownloadProgress::bytes_string).unwrap_or_else(|| "?".to_string()),
                );
            }
        }
        Commands::Acquire { id, quality, add, .. } => {
            let id = ContentId::new(id);
            let quality = match quality {
                Some(q) => q.parse::<QualityPreference>()?,
                None => manager.default_quality(),
            };

            if add && !store.entry_exists(&id).await? {
                let info = manager.list_formats(&id).await?;
                store.add_entry(&NewLibraryEntry::from(&info)).await?;
            }

            let media = manager
                .acquire_with_progress(&id, &quality, |p| {
                    eprint!("\r{}   ", p.display_string());
                    let _ = std::io::stderr().flush();
                })
                .await
                .map_err(|e| anyhow::anyhow!("{} ({})", e.user_message(), e))?;

            let source = match media.source {
                AcquisitionSource::Cache => "cache",
                AcquisitionSource::Network => "network",
            };
            eprintln!();
            println!(
                "{}: video {} ({}), audio {} ({}) from {}",
                media.content_id,
                DownloadProgress::bytes_string(media.video.len() as u64),
                media.video.mime_type,
                DownloadProgress::bytes_string(media.audio.len() as u64),
                media.audio.mime_type,
                source,
            );
        }
        Commands::Delete { id } => {
            let id = ContentId::new(id);
            let removed = store.remove_entry(&id).await?;
            manager.delete_cached_media(&id).await?;
            println!("{}: {}", id, if removed { "removed" } else { "not in library, cache cleared" });
        }
        Commands::List => {
            let entries = store.list_entries().await?;
            let cached = store.cached_ids().await?;
            for entry in &entries {
                let marker = if cached.contains(&entry.id()) { "*" } else { " " };
                println!("{} {}  {} - {}", marker, entry.content_id, entry.title, entry.author);
            }
            println!(
                "{} entries, {} cached ({})",
                entries.len(),
                cached.len(),
                DownloadProgress::bytes_string(store.total_cached_bytes().await?)
            );
        }
        Commands::Compact { force } => {
            let db = store.database();
            let before = db.get_stats().await?;
            println!(
                "{} total, {} unused ({:.1}%)",
                DownloadProgress::bytes_string(before.total_size),
                DownloadProgress::bytes_string(before.unused_size),
                before.unused_percentage()
            );

            if !force && !before.should_vacuum() {
                println!("Nothing to reclaim");
                return Ok(());
            }

            db.vacuum().await.context("Vacuum failed")?;
            let after = db.get_stats().await?;
            println!(
                "Reclaimed {}",
                DownloadProgress::bytes_string(before.total_size.saturating_sub(after.total_size))
            );
        }
    }

    Ok(())
}
