//! Shared DNA fixtures for tests and benches.
//!
//! Fixtures live under the workspace `fixtures/` directory and are named in
//! `fixtures/manifest.json`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    dna: HashMap<String, String>,
    #[serde(default)]
    goldens: HashMap<String, GoldenEntry>,
}

#[derive(Debug, Deserialize)]
struct GoldenEntry {
    dna: String,
    expected: String,
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_to_string(rel)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

pub mod dna {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.dna.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let rel = lookup(&MANIFEST.dna, "dna", name)?;
        read_to_string(rel)
    }

    /// Parse the named DNA fixture, typically into `rig_dna::DnaAsset`.
    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let rel = lookup(&MANIFEST.dna, "dna", name)?;
        super::load_json(rel)
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let rel = lookup(&MANIFEST.dna, "dna", name)?;
        Ok(resolve_path(rel))
    }
}

pub mod goldens {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.goldens.keys().cloned().collect()
    }

    /// Name of the DNA fixture a golden was recorded against.
    pub fn dna_name(name: &str) -> Result<String> {
        let entry = lookup(&MANIFEST.goldens, "golden", name)?;
        Ok(entry.dna.clone())
    }

    pub fn expected<T: DeserializeOwned>(name: &str) -> Result<T> {
        let entry = lookup(&MANIFEST.goldens, "golden", name)?;
        super::load_json(&entry.expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_manifest_entry_resolves() {
        for key in dna::keys() {
            let text = dna::json(&key).unwrap();
            serde_json::from_str::<serde_json::Value>(&text)
                .unwrap_or_else(|err| panic!("{key} should be valid JSON: {err}"));
        }
        for key in goldens::keys() {
            let dna_name = goldens::dna_name(&key).unwrap();
            assert!(dna::path(&dna_name).unwrap().exists(), "{key} references {dna_name}");
            goldens::expected::<serde_json::Value>(&key).unwrap();
        }
    }

    #[test]
    fn unknown_fixture_is_an_error() {
        let err = dna::json("does_not_exist").unwrap_err();
        assert!(err.to_string().contains("unknown dna fixture"));
    }
}
