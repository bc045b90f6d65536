//! Asset download and archive extraction
//!
//! Downloads a release asset to a staging directory, validates and extracts
//! the archive, and locates the engine library inside the extracted tree.
//! Everything here is blocking I/O; callers run it under
//! `tokio::task::spawn_blocking`. Partial output is confined to the staging
//! directory, which the cache manager discards on failure — nothing written
//! here is ever authoritative on its own.

use crate::error::{LodeError, LodeResult};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use ureq::Agent;

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Byte-progress callback: (bytes downloaded so far, total if known)
pub type Progress<'a, 'b> = &'a mut (dyn FnMut(u64, Option<u64>) + Send + 'b);

/// Owned progress callback that can move into a blocking task
pub type DownloadProgress = Box<dyn FnMut(u64, Option<u64>) + Send>;

/// Download an asset, extract it, and return the path of the engine library
/// inside `staging_root`.
///
/// Archive layout varies by release and is never assumed fixed; the library
/// file is searched for anywhere in the extracted tree.
pub fn fetch_and_extract(
    agent: &Agent,
    url: &str,
    staging_root: &Path,
    library_name: &str,
    progress: Option<Progress<'_, '_>>,
) -> LodeResult<PathBuf> {
    // The URL's last segment names the temp file; anything that could
    // resolve as a path component falls back to a fixed name
    let archive_name = url
        .rsplit('/')
        .next()
        .map(|s| s.split(['?', '#']).next().unwrap_or(s))
        .filter(|s| !s.is_empty() && *s != "." && *s != ".." && !s.contains('\\'))
        .unwrap_or("asset.zip");
    let archive_path = staging_root.join(archive_name);

    download_to(agent, url, &archive_path, progress)?;
    extract_archive(&archive_path, staging_root)?;

    // The archive itself is no longer needed; drop it so it never gets
    // promoted into the cache alongside the extracted tree.
    fs::remove_file(&archive_path)
        .map_err(|e| LodeError::io(format!("removing {}", archive_path.display()), e))?;

    find_library(staging_root, library_name).ok_or_else(|| LodeError::LibraryMissing {
        name: library_name.to_string(),
        dir: staging_root.to_path_buf(),
    })
}

/// Stream-download a URL to a file. Returns the number of bytes written.
pub fn download_to(
    agent: &Agent,
    url: &str,
    dest: &Path,
    mut progress: Option<Progress<'_, '_>>,
) -> LodeResult<u64> {
    let context = format!("downloading {}", url);

    let response = agent.get(url).call().map_err(|e| match e {
        ureq::Error::StatusCode(status) => LodeError::HttpStatus {
            status,
            context: context.clone(),
        },
        ureq::Error::Timeout(_) => LodeError::Timeout {
            context: context.clone(),
        },
        other => LodeError::network(context.clone(), other.to_string()),
    })?;

    let total: Option<u64> = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());

    let mut reader = response.into_body().into_reader();
    let mut file = fs::File::create(dest)
        .map_err(|e| LodeError::io(format!("creating {}", dest.display()), e))?;

    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut written: u64 = 0;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                // A truncated download must not survive as a plausible archive
                drop(file);
                let _ = fs::remove_file(dest);
                return Err(LodeError::network(context, e.to_string()));
            }
        };
        file.write_all(&buf[..n])
            .map_err(|e| LodeError::io(format!("writing {}", dest.display()), e))?;
        written += n as u64;
        if let Some(cb) = &mut progress {
            cb(written, total);
        }
    }

    debug!("Downloaded {} bytes to {}", written, dest.display());
    Ok(written)
}

/// Validate and extract a zip archive into `dest_root`.
///
/// Every entry path is resolved and checked against `dest_root` before any
/// write; an entry that would land outside is rejected with
/// `UnsafeArchivePath`. Returns the number of files extracted.
pub fn extract_archive(archive_path: &Path, dest_root: &Path) -> LodeResult<usize> {
    let bad_archive = |reason: String| LodeError::BadArchive {
        path: archive_path.to_path_buf(),
        reason,
    };

    let file = fs::File::open(archive_path)
        .map_err(|e| LodeError::io(format!("opening {}", archive_path.display()), e))?;

    // Parsing the central directory up front is the well-formedness check;
    // a truncated or non-zip payload fails here before anything is written.
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| bad_archive(e.to_string()))?;

    if archive.is_empty() {
        return Err(bad_archive("archive contains no entries".to_string()));
    }

    let mut extracted = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| bad_archive(e.to_string()))?;
        let entry_name = entry.name().to_string();

        let rel = entry
            .enclosed_name()
            .ok_or_else(|| LodeError::UnsafeArchivePath {
                entry: entry_name.clone(),
            })?;
        let out_path = dest_root.join(rel);

        // enclosed_name already normalizes; re-check the prefix anyway so a
        // regression in the zip layer cannot write outside the root
        if !out_path.starts_with(dest_root) {
            return Err(LodeError::UnsafeArchivePath { entry: entry_name });
        }

        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .map_err(|e| LodeError::io(format!("creating {}", out_path.display()), e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| LodeError::io(format!("creating {}", parent.display()), e))?;
        }

        let mut out = fs::File::create(&out_path)
            .map_err(|e| LodeError::io(format!("creating {}", out_path.display()), e))?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| LodeError::io(format!("extracting {}", entry_name), e))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))
                .map_err(|e| LodeError::io(format!("setting mode on {}", out_path.display()), e))?;
        }

        extracted += 1;
    }

    debug!(
        "Extracted {} files from {} into {}",
        extracted,
        archive_path.display(),
        dest_root.display()
    );
    Ok(extracted)
}

/// Search an extracted tree for the engine library file.
///
/// Directories are visited in name order so the result is deterministic
/// even if an archive somehow ships the file twice.
pub fn find_library(root: &Path, file_name: &str) -> Option<PathBuf> {
    let mut entries: Vec<PathBuf> = match fs::read_dir(root) {
        Ok(rd) => rd.filter_map(|e| e.ok().map(|e| e.path())).collect(),
        Err(e) => {
            warn!("Cannot read {} while searching: {}", root.display(), e);
            return None;
        }
    };
    entries.sort();

    for path in &entries {
        if path.is_file() && path.file_name().is_some_and(|n| n == file_name) {
            return Some(path.clone());
        }
    }
    for path in &entries {
        if path.is_dir() {
            if let Some(found) = find_library(path, file_name) {
                return Some(found);
            }
        }
    }
    None
}
