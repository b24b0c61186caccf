//! Input files and argument parsing shared by commands

use anyhow::{Context, Result, anyhow, bail};
use keel_controller::ArtifactSelection;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;

/// Reads a JSON document (service, infrastructure, link list) from disk
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Parse a single key=value pair
pub fn parse_key_val(s: &str) -> Result<(String, String)> {
    let pos = s
        .find('=')
        .ok_or_else(|| anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Builds the deploy selection from `--image` or `--map` arguments
pub fn selection(image: Option<String>, map: Vec<(String, String)>) -> Result<ArtifactSelection> {
    match (image, map.is_empty()) {
        (Some(_), false) => bail!("--image and --map are mutually exclusive"),
        (Some(tag), true) => Ok(ArtifactSelection::Image(tag)),
        (None, false) => Ok(ArtifactSelection::PerService(
            map.into_iter().collect::<BTreeMap<_, _>>(),
        )),
        (None, true) => Ok(ArtifactSelection::None),
    }
}
