// Copyright 2025 Cornell University
// released under MIT License

use std::path::{Path, PathBuf};

use anyhow::Context;
use glob::Pattern;
use log::{debug, warn};

const WILDCARD: char = '*';

/// Builds a pattern in which only `*` is special.
fn name_pattern(pattern: &str) -> anyhow::Result<Pattern> {
    let parts: Vec<String> = pattern.split(WILDCARD).map(Pattern::escape).collect();
    Pattern::new(&parts.join("*")).with_context(|| format!("invalid file pattern {pattern}"))
}

/// Expands a single argument. Paths without a wildcard in their file name are
/// returned as they are, even if they do not exist.
pub fn expand(arg: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let Some(pattern) = arg.file_name().and_then(|n| n.to_str()) else {
        return Ok(vec![arg.to_path_buf()]);
    };
    if !pattern.contains(WILDCARD) {
        return Ok(vec![arg.to_path_buf()]);
    }

    let parent = arg.parent().filter(|p| !p.as_os_str().is_empty());
    let dir = parent.unwrap_or(Path::new("."));
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list directory {}", dir.display()))?;

    let pattern = name_pattern(pattern)?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list directory {}", dir.display()))?;
        if let Some(name) = entry.file_name().to_str() {
            if pattern.matches(name) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();

    if names.is_empty() {
        warn!("no file matches {}", arg.display());
    } else {
        debug!("{} expands to {} files", arg.display(), names.len());
    }
    Ok(names
        .into_iter()
        .map(|name| match parent {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        })
        .collect())
}

/// Expands every argument in order.
pub fn expand_all(args: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for arg in args {
        files.extend(expand(arg)?);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_pattern() {
        let matches = |pattern: &str, name: &str| name_pattern(pattern).unwrap().matches(name);
        assert!(matches("*.cfsm", "a.cfsm"));
        assert!(matches("*.cfsm", ".cfsm"));
        assert!(!matches("*.cfsm", "a.cfs"));
        assert!(matches("p*e*.cfsm", "pipeline.cfsm"));
        assert!(!matches("p*e*.cfsm", "priority.cfsm"));
        assert!(matches("a*a", "aa"));
        assert!(!matches("aa*aa", "aaa"));
        assert!(matches("plain", "plain"));
        assert!(!matches("plain", "plainer"));
    }

    #[test]
    fn test_only_star_is_a_wildcard() {
        let matches = |pattern: &str, name: &str| name_pattern(pattern).unwrap().matches(name);
        assert!(matches("x?*", "x?.cfsm"));
        assert!(!matches("x?*", "xy.cfsm"));
        assert!(matches("[ab]*", "[ab]1.cfsm"));
        assert!(!matches("[ab]*", "a1.cfsm"));
    }

    #[test]
    fn test_plain_path_passes_through() {
        let path = PathBuf::from("tests/no_such_file.cfsm");
        assert_eq!(expand(&path).unwrap(), vec![path]);
    }

    #[test]
    fn test_expand_is_sorted() {
        let files = expand(Path::new("tests/*.cfsm")).unwrap();
        let names: Vec<&str> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "buffer_no_consumer.cfsm",
                "mismatch.cfsm",
                "philosophers.cfsm",
                "pipeline.cfsm",
                "priority.cfsm",
                "self_loop.cfsm",
                "three_senders.cfsm",
            ]
        );
        assert!(files.iter().all(|p| p.starts_with("tests")));
    }

    #[test]
    fn test_multiple_wildcards() {
        let files = expand(Path::new("tests/p*e*.cfsm")).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("tests/philosophers.cfsm"),
                PathBuf::from("tests/pipeline.cfsm"),
            ]
        );
    }

    #[test]
    fn test_no_match_is_empty() {
        assert!(expand(Path::new("tests/*.prot")).unwrap().is_empty());
    }

    #[test]
    fn test_expand_all_keeps_argument_order() {
        let files = expand_all(&[
            PathBuf::from("tests/self_loop.cfsm"),
            PathBuf::from("tests/errors/*.cfsm"),
        ])
        .unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("tests/self_loop.cfsm"),
                PathBuf::from("tests/errors/buffer_after_use.cfsm"),
                PathBuf::from("tests/errors/duplicate_action.cfsm"),
            ]
        );
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        assert!(expand(Path::new("no_such_dir/*.cfsm")).is_err());
    }
}
