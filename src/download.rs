use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tar::Archive;
use walkdir::WalkDir;

use crate::error::{InstallError, Result};
use crate::types::ExtractionPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    TarXz,
}

impl ArchiveFormat {
    /// Guesses the format from a file name or URL path.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if lower.ends_with(".tar.xz") || lower.ends_with(".txz") {
            Some(ArchiveFormat::TarXz)
        } else {
            None
        }
    }

    /// Name first, then magic bytes.
    pub fn detect(path: &Path) -> Option<Self> {
        let by_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(Self::from_name);
        by_name.or_else(|| Self::sniff(path).ok().flatten())
    }

    fn sniff(path: &Path) -> io::Result<Option<Self>> {
        let mut magic = [0u8; 6];
        let mut file = fs::File::open(path)?;
        let read = file.read(&mut magic)?;
        let magic = &magic[..read];

        Ok(if magic.starts_with(b"PK\x03\x04") || magic.starts_with(b"PK\x05\x06") {
            Some(ArchiveFormat::Zip)
        } else if magic.starts_with(&[0x1f, 0x8b]) {
            Some(ArchiveFormat::TarGz)
        } else if magic.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            Some(ArchiveFormat::TarXz)
        } else {
            None
        })
    }
}

/// File name to store a download under.
pub fn download_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.trim_end_matches('/').rsplit('/').next() {
        Some(name) if !name.is_empty() && !name.contains(':') => name.to_string(),
        _ => "download".to_string(),
    }
}

pub fn download_file(url: &str, local_path: &Path, timeout: Option<Duration>) -> Result<()> {
    let failed = |reason: String| InstallError::DownloadError {
        url: url.to_string(),
        reason,
    };

    tracing::info!("Downloading {}...", url);

    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("appkeeper/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().map_err(|e| failed(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(failed(format!("HTTP status {}", status)));
    }

    let total_size = response.content_length().unwrap_or(0);
    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.set_message(format!("Downloading {}", download_name(url)));

    let mut file = fs::File::create(local_path)?;
    let mut reader = pb.wrap_read(response);
    io::copy(&mut reader, &mut file).map_err(|e| failed(e.to_string()))?;

    pb.finish_and_clear();
    tracing::debug!("Saved {} to {}", url, local_path.display());
    Ok(())
}

/// Unpacks `archive_path` into `extract_dir`, rejecting entries that would
/// land outside it.
pub fn extract_archive(archive_path: &Path, format: ArchiveFormat, extract_dir: &Path) -> Result<()> {
    tracing::info!("Extracting {}...", archive_path.display());
    fs::create_dir_all(extract_dir)?;

    match format {
        ArchiveFormat::Zip => extract_zip(archive_path, extract_dir),
        ArchiveFormat::TarGz => {
            let file = fs::File::open(archive_path)?;
            extract_tar(archive_path, Archive::new(GzDecoder::new(file)), extract_dir)
        }
        ArchiveFormat::TarXz => {
            let file = fs::File::open(archive_path)?;
            let decoder = xz2::read::XzDecoder::new(file);
            extract_tar(archive_path, Archive::new(decoder), extract_dir)
        }
    }
}

fn corrupt(archive_path: &Path, reason: impl ToString) -> InstallError {
    InstallError::CorruptArchive {
        path: archive_path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn extract_zip(archive_path: &Path, extract_dir: &Path) -> Result<()> {
    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| corrupt(archive_path, e))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| corrupt(archive_path, e))?;
        let relative = match entry.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => {
                return Err(corrupt(
                    archive_path,
                    format!("entry '{}' escapes the extraction root", entry.name()),
                ))
            }
        };
        let outpath = extract_dir.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = fs::File::create(&outpath)?;
        io::copy(&mut entry, &mut outfile).map_err(|e| corrupt(archive_path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode().map(|m| m & 0o777).filter(|m| *m != 0) {
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode))?;
            }
        }
    }

    tracing::debug!("Extracted {} zip entries", archive.len());
    Ok(())
}

fn extract_tar<R: Read>(archive_path: &Path, mut archive: Archive<R>, extract_dir: &Path) -> Result<()> {
    let root = extract_dir.canonicalize()?;
    let escapes = |what: String| corrupt(archive_path, format!("{} escapes the extraction root", what));

    let entries = archive.entries().map_err(|e| corrupt(archive_path, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| corrupt(archive_path, e))?;
        let relative = entry
            .path()
            .map_err(|e| corrupt(archive_path, e))?
            .into_owned();

        if !is_safe_relative(&relative) {
            return Err(escapes(format!("entry '{}'", relative.display())));
        }

        let kind = entry.header().entry_type();
        if kind.is_symlink() || kind.is_hard_link() {
            let link = entry
                .link_name()
                .map_err(|e| corrupt(archive_path, e))?
                .ok_or_else(|| corrupt(archive_path, format!("link '{}' has no target", relative.display())))?
                .into_owned();
            // Symlinks resolve from their own directory, hard links from the archive root
            let base = if kind.is_symlink() {
                relative.parent().unwrap_or_else(|| Path::new(""))
            } else {
                Path::new("")
            };
            if !link_stays_inside(base, &link) {
                return Err(escapes(format!("link '{}' -> '{}'", relative.display(), link.display())));
            }
        }

        let unpacked = entry
            .unpack_in(extract_dir)
            .map_err(|e| corrupt(archive_path, e))?;
        if !unpacked {
            return Err(escapes(format!("entry '{}'", relative.display())));
        }
        if kind.is_symlink() && !resolves_inside(&root, &extract_dir.join(&relative)) {
            return Err(escapes(format!("link '{}'", relative.display())));
        }
    }

    // A link may be unpacked before the entries it points through
    for entry in WalkDir::new(extract_dir).follow_links(false) {
        let entry = entry.map_err(|e| corrupt(archive_path, e))?;
        if entry.path_is_symlink() && !resolves_inside(&root, entry.path()) {
            let relative = entry.path().strip_prefix(extract_dir).unwrap_or(entry.path());
            return Err(escapes(format!("link '{}'", relative.display())));
        }
    }
    Ok(())
}

/// True when `link`, read relative to the directory `base`, never climbs
/// above the root that `base` is relative to.
fn link_stays_inside(base: &Path, link: &Path) -> bool {
    let mut depth = base
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count();
    for component in link.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir if depth > 0 => depth -= 1,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

/// Dangling links pass; they were already checked by name.
fn resolves_inside(root: &Path, link: &Path) -> bool {
    match link.canonicalize() {
        Ok(resolved) => resolved.starts_with(root),
        Err(_) => true,
    }
}

/// True when `path` stays below whatever directory it is joined onto.
pub fn is_safe_relative(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// The lone top-level directory of `tree`, if that is all it contains.
pub fn single_top_level_dir(tree: &Path) -> io::Result<Option<PathBuf>> {
    let mut entries = fs::read_dir(tree)?;
    let first = match entries.next() {
        Some(entry) => entry?,
        None => return Ok(None),
    };
    if entries.next().is_some() {
        return Ok(None);
    }
    // file_type() does not follow symlinks
    if first.file_type()?.is_dir() {
        Ok(Some(first.path()))
    } else {
        Ok(None)
    }
}

/// Picks the directory inside an extracted `tree` that becomes the app root.
///
/// `rootdir` is looked up in the tree as extracted and, when collapsing is
/// enabled, also below a single top-level directory. Without `rootdir` a
/// single top-level directory is collapsed unless `contentdir` is off.
pub fn normalize_root(tree: &Path, policy: &ExtractionPolicy) -> Result<PathBuf> {
    let collapsed = if policy.contentdir {
        single_top_level_dir(tree)?
    } else {
        None
    };

    if let Some(rootdir) = &policy.rootdir {
        let relative = Path::new(rootdir.trim_matches(|c| c == '/' || c == '\\'));
        if relative.as_os_str().is_empty() {
            return Ok(collapsed.unwrap_or_else(|| tree.to_path_buf()));
        }
        let not_found = || InstallError::RootDirNotFound {
            rootdir: rootdir.clone(),
        };
        if !is_safe_relative(relative) {
            return Err(not_found());
        }

        for base in std::iter::once(tree.to_path_buf()).chain(collapsed) {
            if is_plain_dir(&base, relative) {
                let root = base.join(relative);
                tracing::debug!("Using rootdir {}", root.display());
                return Ok(root);
            }
        }
        return Err(not_found());
    }

    match collapsed {
        Some(dir) => {
            tracing::debug!("Collapsing single top-level directory {}", dir.display());
            Ok(dir)
        }
        None => Ok(tree.to_path_buf()),
    }
}

/// True when every component of `relative` below `base` is a real directory.
/// Symlinks do not count, so a rootdir can never lead out of the tree.
fn is_plain_dir(base: &Path, relative: &Path) -> bool {
    let mut current = base.to_path_buf();
    relative
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .all(|component| {
            current.push(component);
            fs::symlink_metadata(&current)
                .map(|meta| meta.is_dir())
                .unwrap_or(false)
        })
}
