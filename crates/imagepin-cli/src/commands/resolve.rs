//! Resolve command implementation.
//!
//! Resolves image references concurrently through one shared resolver and
//! prints the pinned references.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use futures::future::join_all;
use serde::Serialize;
use tracing::info;

use imagepin_core::ImageSpec;
use imagepin_notify::{spawn_flusher, Notifier, DEFAULT_FLUSH_INTERVAL};
use imagepin_registry::{CacheStats, OciTransport, RegistryResolver, RegistryTransport};

use crate::settings::{Overrides, Settings};

/// Arguments for the resolve command.
#[derive(Args)]
pub struct ResolveArgs {
    /// Images to resolve (`repository[:tag]` or `repository:pattern`, e.g. `nginx:1.*`)
    #[arg(required = true)]
    pub images: Vec<String>,

    /// TTL of successful resolutions in seconds
    #[arg(long)]
    pub cache_ttl: Option<u64>,

    /// TTL of failed resolutions in seconds
    #[arg(long)]
    pub failure_ttl: Option<u64>,

    /// Per-request registry timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Resolve the whole set this many times and print cache statistics
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
    pub repeat: u32,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

impl ResolveArgs {
    const fn overrides(&self) -> Overrides {
        Overrides {
            cache_ttl_secs: self.cache_ttl,
            failure_ttl_secs: self.failure_ttl,
            timeout_secs: self.timeout,
        }
    }
}

/// Outcome of one image.
#[derive(Debug, Serialize)]
struct Outcome {
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pinned: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Outcome {
    fn line(&self) -> String {
        match (&self.pinned, &self.error) {
            (Some(pinned), _) => format!("{} -> {pinned}", self.image),
            (None, Some(error)) => format!("{} !! {error}", self.image),
            (None, None) => format!("{} -> ?", self.image),
        }
    }
}

/// Runs the resolve command.
///
/// # Errors
///
/// Returns an error if the settings are invalid or any image fails to
/// resolve.
pub async fn run(args: &ResolveArgs, settings: &Settings) -> Result<()> {
    let overrides = args.overrides();
    let router = settings.router()?;
    let transport: Arc<dyn RegistryTransport> = Arc::new(
        OciTransport::new(settings.transport_config(&overrides))
            .context("Failed to create registry transport")?,
    );
    let resolver = RegistryResolver::new(settings.resolver_config(&overrides), router, transport);

    let (shutdown, signal) = tokio::sync::watch::channel(false);
    let mut notifier = Notifier::new().verbose(settings.notify_verbose());
    let mut flusher = None;
    if let Some(backend) = settings.notify_backend()? {
        notifier = notifier.with_backend(Arc::clone(&backend));
        flusher = Some(spawn_flusher(backend, DEFAULT_FLUSH_INTERVAL, signal));
    }

    info!(images = args.images.len(), repeat = args.repeat, "Resolving images");

    let mut outcomes = Vec::new();
    for round in 1..=args.repeat {
        outcomes = resolve_round(&resolver, &args.images).await;
        tracing::debug!(round, "Resolution round finished");
    }

    let failures: Vec<&Outcome> = outcomes.iter().filter(|o| o.error.is_some()).collect();
    for outcome in &failures {
        notifier.error(outcome.line());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        for outcome in &outcomes {
            println!("{}", outcome.line());
        }
        if args.repeat > 1 {
            println!();
            print_stats(&resolver.cache_stats());
        }
    }

    let failed = failures.len();
    let _ = shutdown.send(true);
    if let Some(flusher) = flusher {
        flusher.await.context("Notification flusher failed")?;
    }

    if failed > 0 {
        bail!("{failed} of {} images failed to resolve", outcomes.len());
    }
    Ok(())
}

async fn resolve_round(resolver: &RegistryResolver, images: &[String]) -> Vec<Outcome> {
    let lookups = images.iter().map(|image| async move {
        let result = match ImageSpec::parse(image) {
            Ok(spec) => resolver
                .resolve_spec(&spec)
                .await
                .map(|pinned| pinned.to_string())
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match result {
            Ok(pinned) => Outcome {
                image: image.clone(),
                pinned: Some(pinned),
                error: None,
            },
            Err(error) => Outcome {
                image: image.clone(),
                pinned: None,
                error: Some(error),
            },
        }
    });

    join_all(lookups).await
}

fn print_stats(stats: &CacheStats) {
    println!("Cache statistics:");
    println!("  Hits:      {}", stats.hits);
    println!("  Misses:    {}", stats.misses);
    println!("  Coalesced: {}", stats.coalesced);
    println!("  Evictions: {}", stats.evictions);
}
