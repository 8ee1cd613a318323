//! Moves a finished tree into an app's target directory.

use std::fs;
use std::io;
use std::path::Path;
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::{InstallError, Result};
use crate::uninstall::remove_tree_best_effort;

pub const STAGING_PREFIX: &str = ".appkeeper-";

/// Creates a staging directory beside `target` so the final move is a rename
/// on the same filesystem.
pub fn staging_dir(target: &Path) -> Result<TempDir> {
    let parent = target.parent().ok_or_else(|| InstallError::Placement {
        target: target.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "target has no parent directory"),
    })?;
    fs::create_dir_all(parent)?;
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(parent)?;
    tracing::debug!("Staging in {}", staging.path().display());
    Ok(staging)
}

/// Replaces `target` with the tree at `source_root`.
///
/// Any existing target is first moved aside. If the new tree cannot be put in
/// place the old one is moved back, so `target` is either fully old or fully
/// new.
pub fn place_tree(source_root: &Path, target: &Path) -> Result<()> {
    replace_in_place(target, |target| {
        move_into_place(source_root, target).map_err(|source| InstallError::Placement {
            target: target.to_path_buf(),
            source,
        })
    })?;
    tracing::info!("Placed content at {}", target.display());
    Ok(())
}

/// Moves an existing `target` aside, then lets `build` create a new one at
/// the same path.
///
/// When `build` fails, whatever it left at `target` is removed and the
/// previous tree is moved back.
pub fn replace_in_place<F>(target: &Path, build: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let placement = |source: io::Error| InstallError::Placement {
        target: target.to_path_buf(),
        source,
    };

    let parent = target
        .parent()
        .ok_or_else(|| placement(io::Error::new(io::ErrorKind::InvalidInput, "target has no parent directory")))?;
    fs::create_dir_all(parent).map_err(placement)?;

    let backup = if target.symlink_metadata().is_ok() {
        let holder = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(parent)
            .map_err(placement)?;
        let previous = holder.path().join("previous");
        fs::rename(target, &previous).map_err(placement)?;
        tracing::debug!("Moved previous install aside to {}", previous.display());
        Some((holder, previous))
    } else {
        None
    };

    if let Err(e) = build(target) {
        if target.symlink_metadata().is_ok() {
            let residue = remove_tree_best_effort(target);
            if !residue.is_empty() {
                tracing::error!(
                    "{} files of the failed install are left in {}",
                    residue.len(),
                    target.display()
                );
            }
        }
        if let Some((_, previous)) = &backup {
            if let Err(restore) = fs::rename(previous, target) {
                tracing::error!(
                    "Could not restore previous install at {}: {}",
                    target.display(),
                    restore
                );
            }
        }
        return Err(e);
    }

    if let Some((holder, previous)) = backup {
        let residue = remove_tree_best_effort(&previous);
        if !residue.is_empty() {
            // Not fatal: the new tree is already in place
            tracing::warn!(
                "{} files from the previous install could not be removed from {}",
                residue.len(),
                holder.path().display()
            );
        }
    }
    Ok(())
}

fn move_into_place(source_root: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(source_root, target) {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::debug!("Rename into place failed ({}), copying instead", e);
            copy_tree(source_root, target).map_err(|copy_err| {
                remove_tree_best_effort(target);
                copy_err
            })
        }
    }
}

/// Recursively copies `src` to `dst`. Symlinks are recreated, not followed.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let dest = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&dest)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, dest: &Path) -> io::Result<()> {
    let points_to = fs::read_link(link)?;
    std::os::unix::fs::symlink(points_to, dest)
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, dest: &Path) -> io::Result<()> {
    if link.is_dir() {
        copy_tree(&link.canonicalize()?, dest)
    } else {
        fs::copy(link, dest).map(|_| ())
    }
}
