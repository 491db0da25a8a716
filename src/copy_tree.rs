use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ProjectConfig;
use crate::detect_language;
use crate::state::STATE_FILE;

const SKIP_NAMES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    ".venv",
    "target",
    "dist",
    "build",
    ".next",
    ".nuxt",
    "coverage",
    STATE_FILE,
];

const SKIP_SUFFIXES: &[&str] = &[".schemata.bak"];

fn should_skip(name: &str) -> bool {
    SKIP_NAMES.iter().any(|s| *s == name) || SKIP_SUFFIXES.iter().any(|s| name.ends_with(s))
}

fn copy_dir_filtered(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if should_skip(&name_str) {
            continue;
        }
        let src_path = entry.path();
        let dst_path = dst.join(&name);
        let ft = entry.file_type()?;
        if ft.is_dir() {
            copy_dir_filtered(&src_path, &dst_path)?;
        } else if ft.is_file() {
            fs::copy(&src_path, &dst_path)?;
        }
        // Skip symlinks and other special files
    }
    Ok(())
}

/// Find the project root by walking up from `start` looking for markers.
pub fn find_project_root(start: &Path) -> PathBuf {
    let markers = &["Cargo.toml", "package.json", "schemata.toml", ".git"];
    let mut dir = if start.is_dir() {
        start
    } else {
        start.parent().unwrap_or(start)
    };
    let fallback = dir.to_path_buf();
    loop {
        for marker in markers {
            if dir.join(marker).exists() {
                return dir.to_path_buf();
            }
        }
        match dir.parent() {
            Some(parent) if parent != dir => dir = parent,
            _ => break,
        }
    }
    fallback
}

/// Copy the project tree into `dest_root`, leaving VCS, dependency and build
/// directories behind.
pub fn copy_tree(project_root: &Path, dest_root: &Path) -> std::io::Result<()> {
    copy_dir_filtered(project_root, dest_root)
}

fn hidden_or_vendored(entry: &walkdir::DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    (entry.file_type().is_dir() && name.starts_with('.')) || should_skip(&name)
}

/// Supported source files under `inputs`, relative to `root`, sorted and
/// deduplicated. Inputs may be files or directories.
pub fn discover_source_files(root: &Path, inputs: &[PathBuf], config: &ProjectConfig) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        let abs = if input.is_absolute() {
            input.clone()
        } else {
            root.join(input)
        };
        let walker = WalkDir::new(&abs).into_iter().filter_entry(|e| !hidden_or_vendored(e));
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() || detect_language(entry.path()).is_none() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(root) else { continue };
            let rel: PathBuf = rel.components().filter(|c| !matches!(c, Component::CurDir)).collect();
            if config.is_excluded(&rel) {
                continue;
            }
            files.push(rel);
        }
    }
    files.sort();
    files.dedup();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn copy_tree_copies_files_and_skips_git() {
        let src_dir = TempDir::new().unwrap();
        let src = src_dir.path();
        fs::create_dir(src.join("src")).unwrap();
        fs::write(src.join("src").join("lib.rs"), "fn a() {}").unwrap();
        fs::create_dir(src.join(".git")).unwrap();
        fs::write(src.join(".git").join("HEAD"), "ref").unwrap();
        fs::create_dir(src.join("target")).unwrap();
        fs::write(src.join("target").join("out"), "bytes").unwrap();

        let dst_dir = TempDir::new().unwrap();
        copy_tree(src, dst_dir.path()).unwrap();

        assert_eq!(
            fs::read_to_string(dst_dir.path().join("src").join("lib.rs")).unwrap(),
            "fn a() {}"
        );
        assert!(!dst_dir.path().join(".git").exists());
        assert!(!dst_dir.path().join("target").exists());
    }

    #[test]
    fn copy_tree_skips_backups_and_state() {
        let src_dir = TempDir::new().unwrap();
        let src = src_dir.path();
        fs::write(src.join("lib.rs"), "x").unwrap();
        fs::write(src.join(".lib.rs.schemata.bak"), "y").unwrap();
        fs::write(src.join(STATE_FILE), "{}").unwrap();

        let dst_dir = TempDir::new().unwrap();
        copy_tree(src, dst_dir.path()).unwrap();

        assert!(dst_dir.path().join("lib.rs").exists());
        assert!(!dst_dir.path().join(".lib.rs.schemata.bak").exists());
        assert!(!dst_dir.path().join(STATE_FILE).exists());
    }

    #[test]
    fn find_project_root_finds_cargo_toml() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("Cargo.toml"), "[package]").unwrap();
        fs::write(root.join("src").join("lib.rs"), "").unwrap();

        assert_eq!(find_project_root(&root.join("src").join("lib.rs")), root);
        assert_eq!(find_project_root(&root.join("src")), root);
    }

    #[test]
    fn find_project_root_finds_package_json() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("package.json"), "{}").unwrap();
        fs::write(root.join("src").join("index.ts"), "").unwrap();

        assert_eq!(find_project_root(&root.join("src").join("index.ts")), root);
    }

    #[test]
    fn discover_source_files_sorts_and_filters() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src").join("gen")).unwrap();
        fs::create_dir_all(root.join("node_modules").join("dep")).unwrap();
        fs::write(root.join("src").join("b.rs"), "").unwrap();
        fs::write(root.join("src").join("a.ts"), "").unwrap();
        fs::write(root.join("src").join("notes.md"), "").unwrap();
        fs::write(root.join("src").join("gen").join("api.rs"), "").unwrap();
        fs::write(root.join("node_modules").join("dep").join("index.js"), "").unwrap();

        let config = ProjectConfig::parse("exclude = [\"src/gen/**\"]", Path::new("x.toml")).unwrap();
        let files = discover_source_files(root, &[PathBuf::from("."), PathBuf::from("src")], &config);

        assert_eq!(files, vec![PathBuf::from("src/a.ts"), PathBuf::from("src/b.rs")]);
    }

    #[test]
    fn should_skip_filters_correctly() {
        assert!(should_skip(".git"));
        assert!(should_skip("node_modules"));
        assert!(should_skip("target"));
        assert!(should_skip("foo.rs.schemata.bak"));
        assert!(!should_skip("lib.rs"));
        assert!(!should_skip("src"));
        assert!(!should_skip("Cargo.toml"));
    }
}
