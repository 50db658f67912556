//! Tolerance overrides loaded from `configs/tolerance.json`.
//!
//! Rules are keyed by backend and case name patterns (`*` wildcards). A rule naming only a
//! backend applies first, then a rule naming only a case, then one naming both. Values fixed by
//! the caller win over every rule.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::Deserialize;
use thiserror::Error;

use crate::env;
use crate::tolerance::ToleranceBits;

static TOLERANCE_CONFIG: OnceLock<ToleranceConfig> = OnceLock::new();

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read tolerance config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse tolerance config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ToleranceOverride {
    #[serde(default)]
    pub float_tolerance_bits: Option<u32>,
    #[serde(default)]
    pub double_tolerance_bits: Option<u32>,
}

impl ToleranceOverride {
    fn apply(&self, target: &mut ToleranceBits) {
        if let Some(bits) = self.float_tolerance_bits {
            target.float = bits;
        }
        if let Some(bits) = self.double_tolerance_bits {
            target.double = bits;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToleranceRule {
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub case: Option<String>,
    #[serde(default)]
    pub float_tolerance_bits: Option<u32>,
    #[serde(default)]
    pub double_tolerance_bits: Option<u32>,
}

impl ToleranceRule {
    fn bits(&self) -> ToleranceOverride {
        ToleranceOverride {
            float_tolerance_bits: self.float_tolerance_bits,
            double_tolerance_bits: self.double_tolerance_bits,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToleranceConfig {
    #[serde(default)]
    pub default: Option<ToleranceOverride>,
    #[serde(default)]
    pub rules: Vec<ToleranceRule>,
}

impl ToleranceConfig {
    pub fn from_json_str(src: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(src)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Final tolerance for one case on one backend.
    ///
    /// `explicit` carries values fixed by the caller (test macro or CLI flags) and is applied
    /// after the `default` block and every matching rule.
    pub fn resolve(&self, explicit: ToleranceOverride, backend: &str, case: &str) -> ToleranceBits {
        let mut resolved = ToleranceBits::default();
        if let Some(defaults) = &self.default {
            defaults.apply(&mut resolved);
        }

        let mut backend_rule = None;
        let mut case_rule = None;
        let mut backend_case_rule = None;
        for rule in &self.rules {
            let backend_match = rule
                .backend
                .as_deref()
                .is_some_and(|pattern| matches_pattern(backend, pattern));
            let case_match = rule
                .case
                .as_deref()
                .is_some_and(|pattern| matches_pattern(case, pattern));
            match (backend_match, case_match, rule.case.is_some(), rule.backend.is_some()) {
                (true, true, _, _) => backend_case_rule = Some(rule.bits()),
                (false, true, _, false) => case_rule = Some(rule.bits()),
                (true, false, false, _) => backend_rule = Some(rule.bits()),
                _ => {}
            }
        }

        for rule in [backend_rule, case_rule, backend_case_rule].into_iter().flatten() {
            rule.apply(&mut resolved);
        }
        explicit.apply(&mut resolved);
        resolved
    }
}

pub fn default_config_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs/tolerance.json")
}

fn load_global_config() -> ToleranceConfig {
    let (path, explicit) = match env::tolerance_config_override() {
        Some(path) => (path, true),
        None => (default_config_path(), false),
    };
    if !explicit && !path.exists() {
        tracing::debug!(path = %path.display(), "no tolerance config found, using defaults");
        return ToleranceConfig::default();
    }
    match ToleranceConfig::load(&path) {
        Ok(config) => {
            tracing::debug!(
                path = %path.display(),
                rules = config.rules.len(),
                "loaded tolerance config"
            );
            config
        }
        Err(err) => {
            tracing::warn!(
                error = %err,
                variable = env::TOLERANCE_CONFIG_VAR,
                "ignoring tolerance config"
            );
            ToleranceConfig::default()
        }
    }
}

/// Process-wide config, loaded on first use.
pub fn tolerance_config() -> &'static ToleranceConfig {
    TOLERANCE_CONFIG.get_or_init(load_global_config)
}

/// Glob match supporting `*` wildcards anywhere in `pattern`.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return value == pattern;
    }
    let value = value.as_bytes();
    let pattern = pattern.as_bytes();
    let (mut v, mut p) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;
    while v < value.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            backtrack = Some((p, v));
            p += 1;
        } else if p < pattern.len() && pattern[p] == value[v] {
            p += 1;
            v += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            v = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(src: &str) -> ToleranceConfig {
        ToleranceConfig::from_json_str(src).unwrap()
    }

    #[test]
    fn wildcard_patterns() {
        assert!(matches_pattern("minimum_int32", "minimum*"));
        assert!(matches_pattern("minimum_int32", "*int32"));
        assert!(matches_pattern("minimum_int32", "min*_*32"));
        assert!(matches_pattern("cosh", "cosh"));
        assert!(!matches_pattern("cosh_f64", "cosh"));
        assert!(!matches_pattern("minimum", "*int*"));
        assert!(!matches_pattern("ab", "ab*b"));
    }

    #[test]
    fn empty_config_yields_defaults() {
        let resolved = config("{}").resolve(ToleranceOverride::default(), "interpreter", "cosh");
        assert_eq!(resolved, ToleranceBits::default());
    }

    #[test]
    fn explicit_values_replace_the_default_block() {
        let cfg = config(r#"{"default": {"float_tolerance_bits": 6, "double_tolerance_bits": 7}}"#);
        let explicit = ToleranceOverride {
            float_tolerance_bits: Some(4),
            double_tolerance_bits: None,
        };
        let resolved = cfg.resolve(explicit, "interpreter", "cosh");
        assert_eq!(resolved, ToleranceBits { float: 4, double: 7 });
    }

    #[test]
    fn rule_precedence_is_backend_then_case_then_both() {
        let cfg = config(
            r#"{
                "rules": [
                    {"backend": "gpu*", "case": "cosh", "float_tolerance_bits": 9},
                    {"case": "cosh*", "float_tolerance_bits": 5, "double_tolerance_bits": 5},
                    {"backend": "gpu-*", "float_tolerance_bits": 3, "double_tolerance_bits": 3}
                ]
            }"#,
        );
        let explicit = ToleranceOverride::default();
        assert_eq!(
            cfg.resolve(explicit, "gpu-a", "cosh"),
            ToleranceBits { float: 9, double: 5 }
        );
        assert_eq!(
            cfg.resolve(explicit, "gpu-a", "cosh_f64"),
            ToleranceBits { float: 5, double: 5 }
        );
        assert_eq!(
            cfg.resolve(explicit, "gpu-a", "minimum"),
            ToleranceBits { float: 3, double: 3 }
        );
        assert_eq!(
            cfg.resolve(explicit, "interpreter", "minimum"),
            ToleranceBits::default()
        );
    }

    #[test]
    fn explicit_values_win_over_matching_rules() {
        let cfg = config(
            r#"{
                "default": {"float_tolerance_bits": 2, "double_tolerance_bits": 2},
                "rules": [
                    {"backend": "interpreter-wide", "float_tolerance_bits": 3},
                    {"case": "cosh*", "float_tolerance_bits": 4},
                    {"backend": "interpreter-wide", "case": "cosh*", "float_tolerance_bits": 5, "double_tolerance_bits": 6}
                ]
            }"#,
        );
        let explicit = ToleranceOverride {
            float_tolerance_bits: Some(0),
            double_tolerance_bits: None,
        };
        assert_eq!(
            cfg.resolve(explicit, "interpreter-wide", "cosh"),
            ToleranceBits { float: 0, double: 6 }
        );
        assert_eq!(
            cfg.resolve(explicit, "interpreter-wide", "minimum"),
            ToleranceBits { float: 0, double: 2 }
        );
    }
}
