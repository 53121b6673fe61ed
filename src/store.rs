//! Host-side storage for extracted assets.

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// A directory that receives the binaries of a loaded document.
///
/// Paths are handed out before the data arrives (`<binary>` elements
/// usually follow the body), so [`AssetDir::path_for`] only computes the
/// location and [`AssetDir::store`] writes it later. The directory itself
/// is created by the first `store`. Written files, and the directory if
/// this value created it, are removed on drop unless [`AssetDir::keep`]
/// was called.
#[derive(Debug)]
pub struct AssetDir {
    root: PathBuf,
    /// Asset name to the path handed out for it.
    paths: HashMap<String, PathBuf>,
    taken: HashSet<PathBuf>,
    written: Vec<PathBuf>,
    created_root: bool,
    keep: bool,
}

impl AssetDir {
    /// An asset directory rooted at `root`. Touches nothing on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            paths: HashMap::new(),
            taken: HashSet::new(),
            written: Vec::new(),
            created_root: false,
            keep: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the asset `name` inside the directory.
    ///
    /// Only the file-name component of `name` is used, so ids such as
    /// `../x.png` cannot escape the directory. Distinct names never share
    /// a path: a clash gets a numeric suffix (`x.png`, `x-2.png`, ...).
    pub fn path_for(&mut self, name: &str) -> PathBuf {
        if let Some(path) = self.paths.get(name) {
            return path.clone();
        }
        let base = Path::new(name)
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or("asset");
        let mut path = self.root.join(base);
        let mut n = 1;
        while self.taken.contains(&path) {
            n += 1;
            path = self.root.join(numbered(base, n));
        }
        self.taken.insert(path.clone());
        self.paths.insert(name.to_string(), path.clone());
        path
    }

    /// Write the asset `name`, returning where it was stored.
    pub fn store(&mut self, name: &str, data: &[u8]) -> io::Result<PathBuf> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root)?;
            self.created_root = true;
        }
        let path = self.path_for(name);
        fs::write(&path, data)?;
        debug!(%name, path = %path.display(), "stored asset");
        self.written.push(path.clone());
        Ok(path)
    }

    /// Files written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    /// Leave written files in place on drop.
    pub fn keep(&mut self) {
        self.keep = true;
    }
}

/// `x.png` -> `x-2.png`; `cover` -> `cover-2`.
fn numbered(base: &str, n: usize) -> String {
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{n}.{ext}"),
        _ => format!("{base}-{n}"),
    }
}

impl Drop for AssetDir {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        for path in &self.written {
            if let Err(e) = fs::remove_file(path)
                && e.kind() != io::ErrorKind::NotFound
            {
                warn!(path = %path.display(), "cannot remove asset: {e}");
            }
        }
        if self.created_root {
            // Leaves the directory alone if anything else was put there.
            let _ = fs::remove_dir(&self.root);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_for_is_stable_and_confined() {
        let dir = tempfile::tempdir().unwrap();
        let mut assets = AssetDir::new(dir.path());

        let cover = assets.path_for("cover.jpg");
        assert_eq!(cover, dir.path().join("cover.jpg"));
        assert_eq!(assets.path_for("cover.jpg"), cover);
        assert_eq!(assets.path_for("../../etc/passwd"), dir.path().join("passwd"));
        assert_eq!(assets.path_for(""), dir.path().join("asset"));
    }

    #[test]
    fn test_clashing_names_get_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut assets = AssetDir::new(dir.path());

        assert_eq!(assets.path_for("a/x.png"), dir.path().join("x.png"));
        assert_eq!(assets.path_for("b/x.png"), dir.path().join("x-2.png"));
        assert_eq!(assets.path_for("x-2.png"), dir.path().join("x-2-2.png"));
        assert_eq!(assets.path_for(".."), dir.path().join("asset"));
        assert_eq!(assets.path_for("asset"), dir.path().join("asset-2"));

        let first = assets.store("a/x.png", b"first").unwrap();
        let second = assets.store("b/x.png", b"second").unwrap();
        assert_eq!(fs::read(&first).unwrap(), b"first");
        assert_eq!(fs::read(&second).unwrap(), b"second");
    }

    #[test]
    fn test_directory_is_created_on_first_store() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("book_files");
        {
            let mut assets = AssetDir::new(&root);
            assets.path_for("a.png");
            assert!(!root.exists());

            let path = assets.store("a.png", b"\x89PNG").unwrap();
            assert!(root.is_dir());
            assert_eq!(fs::read(&path).unwrap(), b"\x89PNG");
            assert_eq!(assets.written().len(), 1);
        }
        assert!(!root.exists());
    }

    #[test]
    fn test_unused_directory_is_never_created() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("assets");
        let mut assets = AssetDir::new(&root);
        assets.path_for("cover.jpg");
        assets.keep();
        drop(assets);
        assert!(!root.exists());
    }

    #[test]
    fn test_keep() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("files");
        let path = {
            let mut assets = AssetDir::new(&root);
            let path = assets.store("b.gif", b"GIF89a").unwrap();
            assets.keep();
            path
        };
        assert!(path.exists());
        assert!(root.is_dir());
    }

    #[test]
    fn test_existing_directory_is_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut assets = AssetDir::new(dir.path());
            assets.store("c.png", b"x").unwrap();
        }
        assert!(dir.path().is_dir());
        assert!(!dir.path().join("c.png").exists());
    }
}
