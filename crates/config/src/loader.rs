use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::ConclaveConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "conclave.toml",
    "conclave.yaml",
    "conclave.yml",
    "conclave.json",
];

/// Local-override file names, layered on top of the base file.
const LOCAL_FILENAMES: &[&str] = &[
    "conclave.local.toml",
    "conclave.local.yaml",
    "conclave.local.yml",
    "conclave.local.json",
];

/// Prefix for environment overrides: `CONCLAVE_SERVER__PORT=9000` sets
/// `server.port`. `__` separates path segments.
const ENV_PREFIX: &str = "CONCLAVE_";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<ConclaveConfig> {
    let value = load_config_value(path)?;
    Ok(serde_json::from_value(value)?)
}

fn load_config_value(path: &Path) -> anyhow::Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config_value(&raw, path)
}

/// Load the full layer stack rooted at `dir`:
/// defaults → `conclave.*` → `conclave.local.*` → `CONCLAVE_*` env vars.
///
/// A broken layer is logged and skipped, never fatal.
pub fn load_layered(dir: &Path) -> ConclaveConfig {
    let mut merged = default_value();

    for names in [CONFIG_FILENAMES, LOCAL_FILENAMES] {
        if let Some(path) = first_existing(dir, names) {
            match load_config_value(&path) {
                Ok(layer) => {
                    debug!(path = %path.display(), "merging config layer");
                    deep_merge(&mut merged, layer);
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping broken config layer");
                },
            }
        }
    }

    apply_env_overrides(&mut merged, std::env::vars());

    match serde_json::from_value(merged) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(error = %e, "merged config failed to deserialize, using defaults");
            ConclaveConfig::default()
        },
    }
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./conclave.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/conclave/conclave.{toml,yaml,yml,json}` (user-global)
///
/// Returns layered defaults if no config file is found.
pub fn discover_and_load() -> ConclaveConfig {
    if first_existing(Path::new("."), CONFIG_FILENAMES).is_some() {
        return load_layered(Path::new("."));
    }
    if let Some(dir) = config_dir()
        && first_existing(&dir, CONFIG_FILENAMES).is_some()
    {
        return load_layered(&dir);
    }
    debug!("no config file found, using defaults");
    let mut merged = default_value();
    apply_env_overrides(&mut merged, std::env::vars());
    serde_json::from_value(merged).unwrap_or_default()
}

/// Returns the user-global config directory (`~/.config/conclave/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "conclave").map(|d| d.config_dir().to_path_buf())
}

fn default_value() -> serde_json::Value {
    serde_json::to_value(ConclaveConfig::default()).unwrap_or_default()
}

fn first_existing(dir: &Path, names: &[&str]) -> Option<PathBuf> {
    names.iter().map(|n| dir.join(n)).find(|p| p.exists())
}

fn parse_config_value(raw: &str, path: &Path) -> anyhow::Result<serde_json::Value> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => {
            let v: toml::Value = toml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "yaml" | "yml" => {
            let v: serde_yaml::Value = serde_yaml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

/// Deep-merge `overlay` into `base`: objects merge key by key, everything
/// else replaces.
fn deep_merge(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        base_map.insert(key, value);
                    },
                }
            }
        },
        (base, overlay) => *base = overlay,
    }
}

/// Apply `CONCLAVE_SECTION__FIELD=value` overrides onto a merged value.
///
/// Values parse as JSON scalars where possible (`9000` → number, `true` →
/// bool), otherwise they are taken as strings.
fn apply_env_overrides(
    merged: &mut serde_json::Value,
    vars: impl Iterator<Item = (String, String)>,
) {
    for (name, raw) in vars {
        let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let segments: Vec<String> = rest.split("__").map(str::to_lowercase).collect();
        if segments.iter().any(String::is_empty) {
            continue;
        }
        let value = serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw));
        set_path(merged, &segments, value);
    }
}

fn set_path(target: &mut serde_json::Value, segments: &[String], value: serde_json::Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let serde_json::Value::Object(map) = target else {
        return;
    };
    if rest.is_empty() {
        map.insert(head.clone(), value);
        return;
    }
    let slot = map
        .entry(head.clone())
        .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
    set_path(slot, rest, value);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn local_layer_overrides_base() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "conclave.toml", "[server]\nport = 9000\nhost = \"0.0.0.0\"\n");
        write(dir.path(), "conclave.local.toml", "[server]\nport = 9001\n");

        let cfg = load_layered(dir.path());
        assert_eq!(cfg.server.port, 9001);
        // host from the base layer survives the local merge
        assert_eq!(cfg.server.host, "0.0.0.0");
    }

    #[test]
    fn defaults_fill_unset_sections() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "conclave.toml", "[log]\nlevel = \"debug\"\n");

        let cfg = load_layered(dir.path());
        assert_eq!(cfg.log.level, "debug");
        assert_eq!(cfg.server.port, 8765);
        assert_eq!(cfg.sessions.disconnect_threshold_secs, 60);
    }

    #[test]
    fn broken_layer_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "conclave.toml", "this is not toml ===");

        let cfg = load_layered(dir.path());
        assert_eq!(cfg.server.port, 8765);
    }

    #[test]
    fn yaml_layer_parses() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "conclave.yaml", "server:\n  port: 4242\n");

        let cfg = load_layered(dir.path());
        assert_eq!(cfg.server.port, 4242);
    }

    #[test]
    fn env_override_sets_nested_field() {
        let mut merged = default_value();
        apply_env_overrides(
            &mut merged,
            vec![
                ("CONCLAVE_SERVER__PORT".to_string(), "9000".to_string()),
                ("CONCLAVE_LOG__LEVEL".to_string(), "trace".to_string()),
                ("UNRELATED".to_string(), "x".to_string()),
            ]
            .into_iter(),
        );
        let cfg: ConclaveConfig = serde_json::from_value(merged).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.log.level, "trace");
    }

    #[test]
    fn deep_merge_replaces_arrays() {
        let mut base = serde_json::json!({"cors": {"allowed_origins": ["*"]}});
        deep_merge(
            &mut base,
            serde_json::json!({"cors": {"allowed_origins": ["https://a.example"]}}),
        );
        assert_eq!(
            base["cors"]["allowed_origins"],
            serde_json::json!(["https://a.example"])
        );
    }
}
