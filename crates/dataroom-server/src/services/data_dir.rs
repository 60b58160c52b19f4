// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution.

use std::path::PathBuf;

/// Where uploads, renditions, the database, and `config.json` live:
/// `DATAROOM_DATA_DIR`, else `$XDG_DATA_HOME/dataroom`, else
/// `~/.local/share/dataroom`.
pub fn data_dir() -> PathBuf {
    resolve(|key| std::env::var(key).ok())
}

fn resolve<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup("DATAROOM_DATA_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    base_dir(&lookup).join("dataroom")
}

fn base_dir<F>(lookup: &F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(xdg) = lookup("XDG_DATA_HOME").filter(|d| !d.is_empty()) {
        return PathBuf::from(xdg);
    }
    if let Some(home) = lookup("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    // Last resort
    PathBuf::from("/tmp")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn resolve_with(vars: &[(&str, &str)]) -> PathBuf {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        resolve(|key| env.get(key).cloned())
    }

    #[test]
    fn explicit_dir_wins() {
        assert_eq!(
            resolve_with(&[("DATAROOM_DATA_DIR", "/srv/dr"), ("XDG_DATA_HOME", "/x")]),
            PathBuf::from("/srv/dr")
        );
    }

    #[test]
    fn falls_back_through_xdg_and_home() {
        assert_eq!(
            resolve_with(&[("XDG_DATA_HOME", "/x"), ("HOME", "/home/u")]),
            PathBuf::from("/x/dataroom")
        );
        assert_eq!(
            resolve_with(&[("HOME", "/home/u")]),
            PathBuf::from("/home/u/.local/share/dataroom")
        );
        assert_eq!(resolve_with(&[]), PathBuf::from("/tmp/dataroom"));
    }
}
