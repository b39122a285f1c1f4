// rust/datasets-core/src/naming.rs

//! Shard file naming.
//!
//! A shard lives at
//! `<data_dir>/<dataset>-<split>[.<suffix>]-<index:05>-of-<total:05>`.
//! The read side only knows the split, so it globs the same name with the
//! shard spec replaced by `*`.

use std::path::{Path, PathBuf};

use crate::error::{DatasetError, Result};
use crate::split::Split;

fn split_prefix(dataset_name: &str, split: Split, filetype_suffix: Option<&str>) -> String {
    match filetype_suffix {
        Some(suffix) if !suffix.is_empty() => format!("{dataset_name}-{split}.{suffix}"),
        _ => format!("{dataset_name}-{split}"),
    }
}

/// Shard spec for one file, e.g. `00003-of-00010`.
pub fn shard_spec(index: u32, num_shards: u32) -> String {
    format!("{index:05}-of-{num_shards:05}")
}

/// Returns the `num_shards` shard paths for a split, in shard order.
///
/// # Errors
///
/// `InvalidArgument` if `num_shards` is zero.
pub fn filepaths_for_split(
    dataset_name: &str,
    split: Split,
    num_shards: u32,
    data_dir: &Path,
    filetype_suffix: Option<&str>,
) -> Result<Vec<PathBuf>> {
    if num_shards == 0 {
        return Err(DatasetError::invalid_argument(format!(
            "num_shards must be positive for {dataset_name}/{split}"
        )));
    }

    let prefix = split_prefix(dataset_name, split, filetype_suffix);
    Ok((0..num_shards)
        .map(|i| data_dir.join(format!("{prefix}-{}", shard_spec(i, num_shards))))
        .collect())
}

/// Returns the glob pattern matching every shard of a split.
pub fn filepattern_for_split(
    dataset_name: &str,
    split: Split,
    data_dir: &Path,
    filetype_suffix: Option<&str>,
) -> PathBuf {
    data_dir.join(format!("{}-*", split_prefix(dataset_name, split, filetype_suffix)))
}

/// Matches a file name against a pattern where `*` matches any run of
/// characters and `?` matches exactly one.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();

    let (mut pi, mut ni) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ni));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ni = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

/// Converts a type-style name into the canonical dataset name:
/// `MyDataset` becomes `my_dataset`, `MNIST` becomes `mnist`.
pub fn camel_to_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|j| chars[j]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.map_or(false, |n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
