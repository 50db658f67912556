use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

pub(crate) const TOLERANCE_CONFIG_VAR: &str = "OPGRAPH_TOLERANCE_CONFIG";
pub(crate) const IGNORE_MANIFEST_VAR: &str = "OPGRAPH_IGNORE_MANIFEST";

static IGNORE_MANIFEST: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

/// Explicit tolerance config path, if the variable is set and non-empty.
pub(crate) fn tolerance_config_override() -> Option<PathBuf> {
    match env::var(TOLERANCE_CONFIG_VAR) {
        Ok(value) if !value.trim().is_empty() => Some(PathBuf::from(value.trim())),
        _ => None,
    }
}

/// When set, manifest skips are ignored and every case runs.
pub(crate) fn ignore_manifest() -> bool {
    *IGNORE_MANIFEST.get_or_init(|| match env::var(IGNORE_MANIFEST_VAR) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::parse_bool;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for value in ["1", "true", "YES", " on "] {
            assert!(parse_bool(value), "{value}");
        }
        for value in ["0", "false", "off", "maybe"] {
            assert!(!parse_bool(value), "{value}");
        }
    }
}
