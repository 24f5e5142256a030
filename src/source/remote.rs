//! Remote video URL resolution.
//!
//! A remote video URL (a watch-page style link) cannot be opened directly:
//! it must first be resolved to a concrete streamable media URL. Resolution
//! is a distinct, fallible step: the remote service lists stream variants,
//! and only an mp4 at exactly the required resolution is acceptable. When no
//! such variant exists the whole run fails with a resolution error before
//! any capture resource is acquired.
//!
//! The HTTP resolver (feature `remote-resolve-http`) fetches a JSON stream
//! manifest. `stub://` URLs resolve without network: `stub://video?...`
//! resolves to a synthetic clip carrying the same query, and
//! `stub://no-stream` resolves to an empty variant list.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use url::Url;

use super::synthetic::is_stub_url;

/// Container the resolved stream must use.
const REQUIRED_CONTAINER: &str = "mp4";

/// Stream height the resolved variant must have exactly.
const REQUIRED_HEIGHT: u32 = 720;

/// One playable variant advertised by the remote service.
#[derive(Clone, Debug, Deserialize)]
pub struct StreamVariant {
    pub url: String,
    pub container: String,
    pub height: u32,
}

#[derive(Debug, Deserialize)]
struct StreamManifest {
    #[serde(default)]
    streams: Vec<StreamVariant>,
}

/// Resolve a remote video URL to a direct media URL.
pub fn resolve(raw: &str) -> Result<String> {
    let variants = if is_stub_url(raw) {
        stub_variants(raw)?
    } else {
        fetch_variants(raw)?
    };
    let variant = pick_variant(&variants).ok_or_else(|| {
        anyhow!(
            "no {} stream at {}p for '{}'",
            REQUIRED_CONTAINER,
            REQUIRED_HEIGHT,
            raw
        )
    })?;
    log::info!(
        "resolved '{}' to {}p {} stream",
        raw,
        variant.height,
        variant.container
    );
    Ok(variant.url.clone())
}

/// The first mp4 at exactly the required height. Variants in other
/// containers or at any other resolution never match.
fn pick_variant(variants: &[StreamVariant]) -> Option<&StreamVariant> {
    variants
        .iter()
        .filter(|v| v.container.eq_ignore_ascii_case(REQUIRED_CONTAINER))
        .find(|v| v.height == REQUIRED_HEIGHT)
}

fn stub_variants(raw: &str) -> Result<Vec<StreamVariant>> {
    let url = Url::parse(raw).with_context(|| format!("parse stub url '{raw}'"))?;
    match url.host_str().unwrap_or_default() {
        "no-stream" => Ok(Vec::new()),
        _ => {
            let query = url.query().map(|q| format!("?{q}")).unwrap_or_default();
            Ok(vec![StreamVariant {
                url: format!("stub://clip{query}"),
                container: REQUIRED_CONTAINER.to_string(),
                height: REQUIRED_HEIGHT,
            }])
        }
    }
}

#[cfg(feature = "remote-resolve-http")]
fn fetch_variants(raw: &str) -> Result<Vec<StreamVariant>> {
    let url = Url::parse(raw).with_context(|| format!("parse remote url '{raw}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(anyhow!(
            "remote video urls must be http(s), got '{}'",
            url.scheme()
        ));
    }
    let body = ureq::get(raw)
        .call()
        .with_context(|| format!("fetch stream manifest for '{raw}'"))?
        .into_string()
        .context("read stream manifest body")?;
    let manifest: StreamManifest =
        serde_json::from_str(&body).context("parse stream manifest JSON")?;
    Ok(manifest.streams)
}

#[cfg(not(feature = "remote-resolve-http"))]
fn fetch_variants(raw: &str) -> Result<Vec<StreamVariant>> {
    Err(anyhow!(
        "resolving '{raw}' requires the remote-resolve-http feature"
    ))
}
