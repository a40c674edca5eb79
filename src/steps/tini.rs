//! tini, the container init, from its GitHub releases.

use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::context::ProvisioningContext;
use crate::download;
use crate::error::Error;

pub const TINI_REPO: &str = "krallin/tini";
pub const TINI_DOWNLOAD_URL: &str = "https://github.com/krallin/tini/releases/download";

/// Release asset name for a `uname -m` machine type.
pub fn asset_for_arch(arch: &str) -> crate::error::Result<&'static str> {
    match arch {
        "x86_64" => Ok("tini-amd64"),
        "aarch64" | "arm64" => Ok("tini-arm64"),
        other => Err(Error::UnsupportedArchitecture {
            arch: other.to_string(),
        }),
    }
}

/// Download `asset` of release `tag` to `dest` and make it executable.
///
/// With `verify`, the published `<asset>.sha256sum` is fetched and a
/// mismatching binary is deleted again.
pub async fn fetch(base_url: &str, tag: &str, asset: &str, dest: &Path, verify: bool) -> Result<()> {
    let url = format!("{}/{}/{}", base_url.trim_end_matches('/'), tag, asset);
    download::download_file(&url, dest, true).await?;

    if verify {
        let sums_url = format!("{}.sha256sum", url);
        let sums = download::fetch_text(&sums_url).await?;
        let expected = download::parse_sha256sum(&sums, asset)
            .with_context(|| format!("no digest for {} in {}", asset, sums_url))?;
        if let Err(e) = download::verify_sha256(dest, &expected) {
            let _ = tokio::fs::remove_file(dest).await;
            return Err(e.into());
        }
    }

    tokio::fs::set_permissions(dest, Permissions::from_mode(0o755))
        .await
        .with_context(|| format!("failed to chmod {}", dest.display()))?;
    Ok(())
}

pub async fn install_tini(ctx: Arc<ProvisioningContext>) -> Result<()> {
    // Reject unknown machines before touching the network.
    let asset = asset_for_arch(&ctx.arch)?;

    let tag = match &ctx.config.tini_version {
        Some(tag) => tag.clone(),
        None => download::latest_release_tag(&ctx.config.github_api_url, TINI_REPO)
            .await
            .context("failed to resolve the latest tini release")?,
    };

    fetch(
        TINI_DOWNLOAD_URL,
        &tag,
        asset,
        &ctx.paths.tini,
        ctx.config.verify_checksums,
    )
    .await?;
    tracing::info!(%tag, asset, path = %ctx.paths.tini.display(), "tini installed");
    Ok(())
}
