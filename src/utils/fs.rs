//! Filesystem helpers for the dump and cache directories.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::Result;

/// Remove `root` and everything below it. A missing `root` is not an error.
///
/// # Errors
/// Returns [`crate::Error::FileError`] if an existing entry could not be removed.
pub fn delete_tree(root: &Path) -> Result<()> {
    if root.is_file() {
        fs::remove_file(root)?;
        return Ok(());
    }

    match fs::remove_dir_all(root) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error.into()),
    }
}

/// Path of the `.class` file for `qualified_name` below `root`.
///
/// Both `.` and `/` separate packages, so `a.b.C` and `a/b/C` map to `root/a/b/C.class`.
#[must_use]
pub fn class_file_path(root: &Path, qualified_name: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    let mut segments = qualified_name
        .split(['.', '/'])
        .filter(|segment| !segment.is_empty())
        .peekable();

    while let Some(segment) = segments.next() {
        if segments.peek().is_some() {
            path.push(segment);
        } else {
            path.push(format!("{segment}.class"));
        }
    }
    path
}

/// Write `bytes` to `path`, creating parent directories as needed.
///
/// # Errors
/// Returns [`crate::Error::FileError`] on any I/O failure.
pub fn write_creating_parents(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_paths() {
        let root = Path::new("/dump");
        assert_eq!(
            class_file_path(root, "com.example.Foo"),
            PathBuf::from("/dump/com/example/Foo.class")
        );
        assert_eq!(
            class_file_path(root, "com/example/Foo$Inner"),
            PathBuf::from("/dump/com/example/Foo$Inner.class")
        );
        assert_eq!(class_file_path(root, "Bare"), PathBuf::from("/dump/Bare.class"));
    }

    #[test]
    fn delete_tree_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("dump");
        write_creating_parents(&root.join("a/b/C.class"), b"x").unwrap();
        write_creating_parents(&root.join("D.class"), b"y").unwrap();

        delete_tree(&root).unwrap();
        assert!(!root.exists());

        // second call on a missing tree is fine
        delete_tree(&root).unwrap();
    }
}
