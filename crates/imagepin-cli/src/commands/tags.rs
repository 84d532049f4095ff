//! Tags command implementation.
//!
//! Lists the tags of a repository, optionally ranked against a pattern.

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use imagepin_core::{Repository, TagPattern, VersionSelector};
use imagepin_registry::{OciTransport, RegistryTransport};

use crate::settings::{Overrides, Settings};

/// Arguments for the tags command.
#[derive(Args)]
pub struct TagsArgs {
    /// Repository (e.g. `nginx`, `ghcr.io/org/app`)
    pub repository: String,

    /// Only show tags matching this pattern, highest first (e.g. `1.*`)
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Per-request registry timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Runs the tags command.
///
/// # Errors
///
/// Returns an error if the repository or pattern is invalid, no credential
/// applies in strict mode, or the registry cannot be queried.
pub async fn run(args: &TagsArgs, settings: &Settings) -> Result<()> {
    let repository = Repository::parse(&args.repository)
        .with_context(|| format!("Invalid repository '{}'", args.repository))?;
    let pattern = args
        .pattern
        .as_deref()
        .map(TagPattern::parse)
        .transpose()
        .context("Invalid pattern")?;

    let overrides = Overrides {
        timeout_secs: args.timeout,
        ..Overrides::default()
    };
    let router = settings.router()?;
    let auth = router.route(&args.repository)?;
    let transport = OciTransport::new(settings.transport_config(&overrides))
        .context("Failed to create registry transport")?;

    info!(repository = %repository, auth = %auth, "Listing tags");
    let tags = transport
        .list_tags(&repository, auth)
        .await
        .with_context(|| format!("Failed to list tags of {repository}"))?;

    for line in render(&tags, pattern.as_ref()) {
        println!("{line}");
    }
    Ok(())
}

/// Output lines: every tag, or the matching ones highest first with the
/// winner marked.
fn render(tags: &[String], pattern: Option<&TagPattern>) -> Vec<String> {
    let Some(pattern) = pattern else {
        return tags.to_vec();
    };

    VersionSelector::new()
        .ranked(pattern, tags)
        .into_iter()
        .enumerate()
        .map(|(i, tag)| {
            if i == 0 {
                format!("* {tag} (selected)")
            } else {
                format!("  {tag}")
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> Vec<String> {
        ["1.2", "latest", "1.10", "2.0"]
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_render_all_tags() {
        assert_eq!(render(&tags(), None), tags());
    }

    #[test]
    fn test_render_ranked_matches() {
        let pattern = TagPattern::parse("1.*").unwrap();
        assert_eq!(
            render(&tags(), Some(&pattern)),
            vec!["* 1.10 (selected)", "  1.2"]
        );
    }

    #[test]
    fn test_render_no_matches() {
        let pattern = TagPattern::parse("3.*").unwrap();
        assert!(render(&tags(), Some(&pattern)).is_empty());
    }
}
