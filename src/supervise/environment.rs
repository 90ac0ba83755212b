/*!
 * Child Environment
 * Builds the explicit environment for one child without touching the
 * parent's
 */

use crate::supervise::artifacts::SearchPathMods;
use std::collections::HashMap;

/// True if `value` already holds `dir` as a complete `:`-separated
/// segment. Substring hits do not count.
pub fn path_contains(value: &str, dir: &str) -> bool {
    value.split(':').any(|segment| segment == dir)
}

/// Compose a child's environment from a base snapshot plus search-path
/// contributions. New directories are prepended, existing segments are
/// left where they are, and the base map itself is never modified.
pub fn compose_child_env(
    base: impl IntoIterator<Item = (String, String)>,
    mods: &SearchPathMods,
) -> Vec<(String, String)> {
    let mut env: HashMap<String, String> = base.into_iter().collect();

    for (var, dirs) in mods.iter() {
        let current = env.get(var).cloned().unwrap_or_default();
        let mut prefix: Vec<&str> = Vec::new();
        for dir in dirs {
            if !path_contains(&current, dir) && !prefix.iter().any(|d| *d == dir) {
                prefix.push(dir);
            }
        }
        if prefix.is_empty() {
            continue;
        }
        let value = if current.is_empty() {
            prefix.join(":")
        } else {
            format!("{}:{}", prefix.join(":"), current)
        };
        env.insert(var.to_string(), value);
    }

    let mut env: Vec<(String, String)> = env.into_iter().collect();
    env.sort();
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervise::artifacts::{ArtifactClass, LD_LIBRARY_PATH};
    use std::path::Path;

    fn mods(paths: &[&str]) -> SearchPathMods {
        let mut m = SearchPathMods::new();
        for p in paths {
            m.add(ArtifactClass::NativeBinary, Path::new(p));
        }
        m
    }

    fn get<'a>(env: &'a [(String, String)], var: &str) -> Option<&'a str> {
        env.iter().find(|(k, _)| k == var).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_segment_match_is_exact() {
        assert!(path_contains("/a:/b/c", "/b/c"));
        assert!(!path_contains("/a:/b/cd", "/b/c"));
        assert!(!path_contains("", "/a"));
    }

    #[test]
    fn test_new_dirs_prepend() {
        let base = vec![(LD_LIBRARY_PATH.to_string(), "/usr/lib".to_string())];
        let env = compose_child_env(base, &mods(&["/sdr/deps/fft/libfft.so"]));
        assert_eq!(get(&env, LD_LIBRARY_PATH), Some("/sdr/deps/fft:/usr/lib"));
    }

    #[test]
    fn test_existing_segment_not_duplicated() {
        let base = vec![(LD_LIBRARY_PATH.to_string(), "/sdr/deps/fft:/usr/lib".to_string())];
        let env = compose_child_env(base, &mods(&["/sdr/deps/fft/libfft.so"]));
        assert_eq!(get(&env, LD_LIBRARY_PATH), Some("/sdr/deps/fft:/usr/lib"));
    }

    #[test]
    fn test_unset_variable_created() {
        let env = compose_child_env(Vec::new(), &mods(&["/sdr/deps/fft/libfft.so"]));
        assert_eq!(get(&env, LD_LIBRARY_PATH), Some("/sdr/deps/fft"));
    }

    #[test]
    fn test_unrelated_variables_untouched() {
        let base = vec![("HOME".to_string(), "/home/sdr".to_string())];
        let env = compose_child_env(base, &mods(&["/sdr/deps/fft/libfft.so"]));
        assert_eq!(get(&env, "HOME"), Some("/home/sdr"));
    }
}
