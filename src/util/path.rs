use std::path::{Path, PathBuf};

use itertools::Itertools;

/// Drop repeated paths, keeping the first occurrence and the original order.
///
/// Paths compare as written; `a/b` and `./a/b` are different entries.
pub fn dedup_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths.iter().unique().cloned().collect()
}

/// Path shown to users: relative to `base` when below it, unchanged otherwise.
pub fn display_relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}
