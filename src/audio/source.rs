use anyhow::{anyhow, Context, Result};
use std::{
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use url::Url;

use crate::config::EffectiveConfig;

fn host(url: &str) -> Option<String> {
    Url::parse(url).ok().and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

pub fn is_uri_allowed(cfg: &EffectiveConfig, uri: &str) -> bool {
    let h = host(uri).unwrap_or_default();
    if cfg.block_patterns.iter().any(|re| re.is_match(uri) || (!h.is_empty() && re.is_match(&h))) {
        return false;
    }
    if cfg.allow_patterns.is_empty() {
        true
    } else {
        cfg.allow_patterns.iter().any(|re| re.is_match(uri) || (!h.is_empty() && re.is_match(&h)))
    }
}

/// A preview ready for decoding. Downloaded previews are deleted on drop.
pub enum PreparedSource {
    Local(PathBuf),
    Downloaded(NamedTempFile),
}

impl PreparedSource {
    pub fn path(&self) -> &Path {
        match self {
            PreparedSource::Local(p) => p,
            PreparedSource::Downloaded(f) => f.path(),
        }
    }
}

fn extension_of(u: &Url) -> Option<String> {
    let last = u.path_segments()?.last()?;
    let (_, ext) = last.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| ext.to_ascii_lowercase())
}

pub async fn prepare_source(http: &reqwest::Client, uri: &str) -> Result<PreparedSource> {
    if let Ok(u) = Url::parse(uri) {
        match u.scheme() {
            "file" => {
                let p = u.to_file_path().map_err(|_| anyhow!("invalid file:// path"))?;
                if !p.exists() {
                    anyhow::bail!("file not found: {}", p.display());
                }
                return Ok(PreparedSource::Local(p));
            }
            "http" | "https" => {
                let resp = http
                    .get(uri)
                    .send()
                    .await
                    .context("http get")?
                    .error_for_status()
                    .context("bad status")?;
                let body = resp.bytes().await.context("read body")?;
                if body.is_empty() {
                    anyhow::bail!("empty preview body");
                }
                let suffix = extension_of(&u).map(|e| format!(".{e}")).unwrap_or_default();
                let mut tmp = tempfile::Builder::new().prefix("speedtune_").suffix(&suffix).tempfile()?;
                tmp.as_file_mut().write_all(&body).context("write preview to temp file")?;
                return Ok(PreparedSource::Downloaded(tmp));
            }
            _ => {}
        }
    }

    let p = PathBuf::from(uri);
    if !p.exists() {
        anyhow::bail!("source not found: {}", p.display());
    }
    Ok(PreparedSource::Local(p))
}
