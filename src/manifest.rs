//! Provisioner manifest: the declarative list of external components.
//!
//! A manifest pins each component to {url, branch, optional commit} and names
//! an optional patch file to reconcile local modifications after checkout.
//! `${VAR}` references in urls and paths are expanded from the environment at
//! load time, so the parsed manifest is already concrete.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Environment variable expected to hold the external toolchain root.
    #[serde(default)]
    pub toolchain_env: Option<String>,

    /// Directory holding patch files, relative to the manifest.
    #[serde(default = "default_patch_dir")]
    pub patch_dir: PathBuf,

    pub components: Vec<Component>,
}

fn default_patch_dir() -> PathBuf {
    PathBuf::from("patches")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Component {
    pub name: String,
    pub url: String,
    /// Checkout location, relative to the provisioning root.
    pub path: String,
    pub branch: String,
    /// Pinned commit; absent means the branch tip (shallow clone).
    #[serde(default)]
    pub commit: Option<String>,
    /// Patch file under `patch_dir` applied after checkout.
    #[serde(default)]
    pub patch: Option<PathBuf>,
    /// A required component's clone or patch failure aborts the whole run.
    #[serde(default)]
    pub required: bool,
}

impl Manifest {
    /// Load, expand `${VAR}` references, and validate a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read manifest {}", path.display()))?;
        let mut manifest: Manifest = serde_json::from_str(&text)
            .with_context(|| format!("parse manifest {}", path.display()))?;

        for component in &mut manifest.components {
            component.url = expand_env(&component.url)
                .with_context(|| format!("component {}: url", component.name))?;
            component.path = expand_env(&component.path)
                .with_context(|| format!("component {}: path", component.name))?;
        }
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        if self.components.is_empty() {
            bail!("manifest declares no components");
        }
        let mut names = BTreeSet::new();
        let mut paths = BTreeSet::new();
        for component in &self.components {
            if component.name.is_empty() {
                bail!("component with empty name");
            }
            if !names.insert(component.name.as_str()) {
                bail!("duplicate component name {:?}", component.name);
            }
            if !paths.insert(component.path.as_str()) {
                bail!("duplicate component path {:?}", component.path);
            }
            let path = Path::new(&component.path);
            if path.is_absolute() || component.path.is_empty() {
                bail!(
                    "component {}: path must be relative and non-empty",
                    component.name
                );
            }
        }
        Ok(())
    }

    /// Absolute patch-file path for a component, if one is declared.
    pub fn patch_path(&self, manifest_dir: &Path, component: &Component) -> Option<PathBuf> {
        component
            .patch
            .as_ref()
            .map(|patch| manifest_dir.join(&self.patch_dir).join(patch))
    }

    /// Value of the toolchain env var, if the manifest names one.
    pub fn toolchain_root(&self) -> Option<Result<String>> {
        let var = self.toolchain_env.as_deref()?;
        Some(env::var(var).map_err(|_| anyhow!("environment variable {var} is not set")))
    }
}

/// Expand `${VAR}` references from the environment. An unset variable is a
/// configuration error, not an empty string.
fn expand_env(input: &str) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| anyhow!("unterminated ${{...}} reference in {input:?}"))?;
        let var = &after[..end];
        let value =
            env::var(var).map_err(|_| anyhow!("environment variable {var} is not set"))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("components.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_minimal_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            dir.path(),
            r#"{
                "components": [
                    { "name": "lvgl", "url": "https://example.com/lvgl.git",
                      "path": "components/lvgl", "branch": "v8.1.0",
                      "patch": "lvgl.patch" },
                    { "name": "rainmaker", "url": "https://example.com/rm.git",
                      "path": "components/rainmaker", "branch": "master",
                      "commit": "fa00c1b0", "required": true }
                ]
            }"#,
        );
        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.components.len(), 2);
        assert_eq!(manifest.patch_dir, PathBuf::from("patches"));
        let lvgl = &manifest.components[0];
        assert_eq!(
            manifest.patch_path(dir.path(), lvgl).unwrap(),
            dir.path().join("patches/lvgl.patch")
        );
        assert!(manifest.components[1].required);
        assert!(manifest.components[0].commit.is_none());
    }

    #[test]
    fn rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            dir.path(),
            r#"{ "components": [ { "name": "x", "url": "u", "path": "p",
                 "branch": "b", "bogus": 1 } ] }"#,
        );
        assert!(Manifest::load(&path).is_err());
    }

    #[test]
    fn rejects_duplicate_names_and_absolute_paths() {
        let dir = tempfile::tempdir().unwrap();
        let dup = write_manifest(
            dir.path(),
            r#"{ "components": [
                 { "name": "x", "url": "u", "path": "p1", "branch": "b" },
                 { "name": "x", "url": "u", "path": "p2", "branch": "b" } ] }"#,
        );
        assert!(Manifest::load(&dup).is_err());

        let abs = write_manifest(
            dir.path(),
            r#"{ "components": [
                 { "name": "x", "url": "u", "path": "/abs", "branch": "b" } ] }"#,
        );
        assert!(Manifest::load(&abs).is_err());
    }

    #[test]
    fn expands_env_references() {
        env::set_var("CSETUP_TEST_MIRROR", "https://mirror.example.com");
        let expanded = expand_env("${CSETUP_TEST_MIRROR}/lvgl.git").unwrap();
        assert_eq!(expanded, "https://mirror.example.com/lvgl.git");

        assert!(expand_env("${CSETUP_TEST_UNSET_VAR}/x").is_err());
        assert!(expand_env("${unterminated").is_err());
        assert_eq!(expand_env("plain").unwrap(), "plain");
    }
}
