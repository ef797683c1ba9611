use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::fixture::FIXTURE_EXT;

fn should_walk_dir_entry(entry: &walkdir::DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    !matches!(name.as_ref(), ".git" | "target")
}

fn is_fixture(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(FIXTURE_EXT)
}

/// Every fixture under `root`, recursively, sorted by path.
pub fn find_fixtures(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::Discovery {
            root: root.to_path_buf(),
            message: "not a directory".to_string(),
        });
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(should_walk_dir_entry)
    {
        let entry = entry.map_err(|err| Error::Discovery {
            root: root.to_path_buf(),
            message: err.to_string(),
        })?;
        if entry.file_type().is_file() && is_fixture(entry.path()) {
            out.push(entry.into_path());
        }
    }
    out.sort();
    Ok(out)
}

/// Drops a trailing extension the caller typed (`add.tst` matches like `add`).
fn strip_extension(fragment: &str) -> &str {
    match fragment.rfind('.') {
        Some(dot) if dot > 0 && !fragment[dot..].contains(&['/', '\\'][..]) => &fragment[..dot],
        _ => fragment,
    }
}

/// Filters `candidates` by name fragments.
///
/// Each fragment claims every remaining candidate whose root-relative path
/// contains it; claimed candidates leave the pool, so overlapping fragments
/// never select a fixture twice. No fragments selects everything.
pub fn select(root: &Path, candidates: Vec<PathBuf>, fragments: &[String]) -> Vec<PathBuf> {
    if fragments.is_empty() {
        return candidates;
    }

    let mut pool = candidates;
    let mut out = Vec::new();
    for fragment in fragments {
        let needle = strip_extension(fragment);
        let (matched, rest): (Vec<PathBuf>, Vec<PathBuf>) = pool
            .into_iter()
            .partition(|p| relative_name(root, p).contains(needle));
        tracing::debug!(fragment = %fragment, matched = matched.len(), "fragment");
        out.extend(matched);
        pool = rest;
    }
    out.sort();
    out
}

/// Fixtures under `root` selected by `fragments`.
pub fn discover(root: &Path, fragments: &[String]) -> Result<Vec<PathBuf>> {
    let all = find_fixtures(root)?;
    Ok(select(root, all, fragments))
}

/// The name shown for a fixture: its path relative to the search root,
/// `/`-separated on every platform.
pub fn relative_name(root: &Path, path: &Path) -> String {
    let Ok(rel) = path.strip_prefix(root) else {
        return path.to_string_lossy().into_owned();
    };
    rel.iter()
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, "x\n========\ny\n").unwrap();
    }

    fn names(root: &Path, paths: &[PathBuf]) -> Vec<String> {
        paths.iter().map(|p| relative_name(root, p)).collect()
    }

    #[test]
    fn finds_fixtures_recursively_in_sorted_order() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(root, "zeta.tst");
        touch(root, "ops/add.tst");
        touch(root, "alpha.tst");
        touch(root, "alpha.syp");
        touch(root, "target/stale.tst");
        touch(root, ".git/objects.tst");

        let found = find_fixtures(root).unwrap();
        assert_eq!(
            names(root, &found),
            vec!["alpha.tst", "ops/add.tst", "zeta.tst"]
        );
    }

    #[test]
    fn missing_root_is_a_discovery_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = find_fixtures(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::Discovery { .. }), "got {err:?}");
    }

    #[test]
    fn first_fragment_claims_overlapping_fixtures() {
        let root = Path::new("/t");
        let candidates = vec![
            root.join("baz.tst"),
            root.join("foo1.tst"),
            root.join("foobar.tst"),
        ];
        let fragments = vec!["foo".to_string(), "bar".to_string()];

        let picked = select(root, candidates, &fragments);
        assert_eq!(names(root, &picked), vec!["foo1.tst", "foobar.tst"]);
    }

    #[test]
    fn later_fragment_sees_remaining_pool() {
        let root = Path::new("/t");
        let candidates = vec![root.join("bar.tst"), root.join("foobar.tst")];
        let fragments = vec!["foo".to_string(), "bar".to_string()];

        let picked = select(root, candidates, &fragments);
        assert_eq!(names(root, &picked), vec!["bar.tst", "foobar.tst"]);
    }

    #[test]
    fn fragment_extension_is_ignored() {
        let root = Path::new("/t");
        let candidates = vec![root.join("add.tst"), root.join("sub.tst")];

        let picked = select(root, candidates.clone(), &["add.tst".to_string()]);
        assert_eq!(names(root, &picked), vec!["add.tst"]);

        let picked = select(root, candidates, &[]);
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn strip_extension_keeps_dotted_directories() {
        assert_eq!(strip_extension("add.tst"), "add");
        assert_eq!(strip_extension("ops/add"), "ops/add");
        assert_eq!(strip_extension("v1.2/add"), "v1.2/add");
        assert_eq!(strip_extension(".hidden"), ".hidden");
    }

    #[test]
    fn relative_names_use_forward_slashes() {
        let root = Path::new("t");
        let nested: PathBuf = [root, Path::new("ops"), Path::new("add.tst")].iter().collect();
        assert_eq!(relative_name(root, &nested), "ops/add.tst");
        assert_eq!(relative_name(root, &root.join("call.tst")), "call.tst");
        assert_eq!(relative_name(root, Path::new("elsewhere.tst")), "elsewhere.tst");
    }

    #[test]
    fn fragments_match_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(root, "ops/add.tst");
        touch(root, "ops/sub.tst");
        touch(root, "call.tst");

        let picked = discover(root, &["ops/".to_string()]).unwrap();
        assert_eq!(names(root, &picked), vec!["ops/add.tst", "ops/sub.tst"]);
    }
}
