use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub relative: String,
}

/// Files found under one root plus entries that could not be read.
#[derive(Debug, Default)]
pub struct FolderScan {
    pub files: Vec<ScannedFile>,
    pub errors: Vec<(String, String)>,
}

pub fn scan_folder(root: &Path, exclusions: &[String], follow_symlinks: bool) -> Result<FolderScan> {
    if !root.exists() {
        bail!("Folder does not exist: {}", root.display());
    }
    if !root.is_dir() {
        bail!("Not a directory: {}", root.display());
    }

    let exclude_set = build_globset(exclusions)?;
    let mut scan = FolderScan::default();

    let walker = WalkDir::new(root).follow_links(follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                scan.errors.push((path, e.to_string()));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        // Apply exclude patterns
        if exclude_set.is_match(&rel_str) {
            continue;
        }

        scan.files.push(ScannedFile {
            path: path.to_path_buf(),
            relative: rel_str,
        });
    }

    // Sort for deterministic ordering
    scan.files.sort_by(|a, b| a.relative.cmp(&b.relative));

    Ok(scan)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scan_applies_exclusions_and_sorts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("b.md"), "b").unwrap();
        fs::write(root.join("sub/a.md"), "a").unwrap();
        fs::write(root.join("debug.log"), "noise").unwrap();
        fs::write(root.join(".git/config"), "x").unwrap();

        let exclusions = vec!["**/.git/**".to_string(), "**/*.log".to_string()];
        let scan = scan_folder(root, &exclusions, false).unwrap();
        let rel: Vec<&str> = scan.files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(rel, vec!["b.md", "sub/a.md"]);
        assert!(scan.errors.is_empty());
    }

    #[test]
    fn missing_root_is_an_error() {
        let err = scan_folder(Path::new("/definitely/not/here"), &[], false).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
