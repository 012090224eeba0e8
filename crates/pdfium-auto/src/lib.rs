//! # pdfium-auto
//!
//! Finds a PDFium shared library for `pdfium-render`, downloading it from
//! [bblanchon/pdfium-binaries](https://github.com/bblanchon/pdfium-binaries)
//! the first time it is needed.
//!
//! Lookup order:
//!
//! 1. `PDFIUM_LIB_PATH`: an existing library on disk.
//! 2. `<cache>/edgequake-magnifier/pdfium-{VERSION}/<lib>` (override the cache
//!    root with `PDFIUM_AUTO_CACHE_DIR`).
//! 3. Download the platform archive and unpack the library into (2).
//!
//! ```rust,no_run
//! let pdfium = pdfium_auto::bind_pdfium().expect("PDFium unavailable");
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use pdfium_render::prelude::Pdfium;
use thiserror::Error;

/// The pdfium-binaries release tag used for downloads.
pub const PDFIUM_VERSION: &str = "7690";

const RELEASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

/// Directory name used under the platform cache root.
const CACHE_NAMESPACE: &str = "edgequake-magnifier";

#[derive(Error, Debug)]
pub enum PdfiumAutoError {
    #[error("No PDFium build is published for {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Cache directory error: {0}")]
    CacheDir(#[source] std::io::Error),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Archive extraction failed: {0}")]
    Extract(String),

    #[error("Failed to bind PDFium from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },
}

/// A published pdfium-binaries asset for one OS/arch pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Asset {
    archive: &'static str,
    member: &'static str,
    file_name: &'static str,
}

const fn unix_asset(archive: &'static str, so: bool) -> Asset {
    if so {
        Asset {
            archive,
            member: "lib/libpdfium.so",
            file_name: "libpdfium.so",
        }
    } else {
        Asset {
            archive,
            member: "lib/libpdfium.dylib",
            file_name: "libpdfium.dylib",
        }
    }
}

const fn windows_asset(archive: &'static str) -> Asset {
    Asset {
        archive,
        member: "bin/pdfium.dll",
        file_name: "pdfium.dll",
    }
}

const ASSETS: &[(&str, &str, Asset)] = &[
    ("macos", "aarch64", unix_asset("pdfium-mac-arm64.tgz", false)),
    ("macos", "x86_64", unix_asset("pdfium-mac-x64.tgz", false)),
    ("linux", "x86_64", unix_asset("pdfium-linux-x64.tgz", true)),
    ("linux", "aarch64", unix_asset("pdfium-linux-arm64.tgz", true)),
    ("windows", "x86_64", windows_asset("pdfium-win-x64.tgz")),
    ("windows", "aarch64", windows_asset("pdfium-win-arm64.tgz")),
    ("windows", "x86", windows_asset("pdfium-win-x86.tgz")),
];

fn asset_for(os: &str, arch: &str) -> Result<Asset, PdfiumAutoError> {
    ASSETS
        .iter()
        .find(|(o, a, _)| *o == os && *a == arch)
        .map(|(_, _, asset)| *asset)
        .ok_or_else(|| PdfiumAutoError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        })
}

fn current_asset() -> Result<Asset, PdfiumAutoError> {
    asset_for(std::env::consts::OS, std::env::consts::ARCH)
}

/// Per-version cache directory for the library.
pub fn pdfium_cache_dir() -> PathBuf {
    let root = match std::env::var("PDFIUM_AUTO_CACHE_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
            .unwrap_or_else(std::env::temp_dir)
            .join(CACHE_NAMESPACE),
    };
    root.join(format!("pdfium-{PDFIUM_VERSION}"))
}

/// Path of an already-available library, if any. Never touches the network.
pub fn cached_pdfium_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("PDFIUM_LIB_PATH") {
        let p = PathBuf::from(p);
        if p.exists() {
            return Some(p);
        }
    }
    let asset = current_asset().ok()?;
    let p = pdfium_cache_dir().join(asset.file_name);
    p.exists().then_some(p)
}

/// `true` when [`ensure_pdfium_library`] would not need to download.
pub fn is_pdfium_cached() -> bool {
    cached_pdfium_path().is_some()
}

static RESOLVED: OnceLock<PathBuf> = OnceLock::new();

/// Make sure the library is on disk and return its path.
///
/// `on_progress` receives `(downloaded, total)` byte counts while
/// downloading. The lookup runs at most once per process once it succeeds.
pub fn ensure_pdfium_library(
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<PathBuf, PdfiumAutoError> {
    if let Some(p) = RESOLVED.get() {
        return Ok(p.clone());
    }

    let path = match cached_pdfium_path() {
        Some(p) => p,
        None => download_into_cache(on_progress)?,
    };
    let _ = RESOLVED.set(path.clone());
    Ok(path)
}

/// Bind to PDFium, downloading it first when necessary.
pub fn bind_pdfium() -> Result<Pdfium, PdfiumAutoError> {
    let path = ensure_pdfium_library(None)?;
    bind_pdfium_from_path(&path)
}

/// Bind to the library at `path` without touching the cache.
pub fn bind_pdfium_from_path(path: &Path) -> Result<Pdfium, PdfiumAutoError> {
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| PdfiumAutoError::Bind {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn download_into_cache(
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<PathBuf, PdfiumAutoError> {
    let asset = current_asset()?;
    let dir = pdfium_cache_dir();
    std::fs::create_dir_all(&dir).map_err(PdfiumAutoError::CacheDir)?;

    let url = format!("{RELEASE_URL}/chromium%2F{PDFIUM_VERSION}/{}", asset.archive);
    let archive = fetch(&url, on_progress)?;

    let dest = dir.join(asset.file_name);
    unpack_member(&archive, asset.member, &dest)?;
    Ok(dest)
}

fn fetch(
    url: &str,
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<Vec<u8>, PdfiumAutoError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("pdfium-auto/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| PdfiumAutoError::Download(e.to_string()))?;

    let mut response = client
        .get(url)
        .send()
        .map_err(|e| PdfiumAutoError::Download(format!("GET {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(PdfiumAutoError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    let total = response.content_length();
    let mut body = Vec::with_capacity(total.unwrap_or(0) as usize);
    let mut chunk = vec![0u8; 64 * 1024];
    loop {
        let n = match response.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(PdfiumAutoError::Download(format!("read: {e}"))),
        };
        body.extend_from_slice(&chunk[..n]);
        if let Some(cb) = on_progress {
            cb(body.len() as u64, total);
        }
    }
    Ok(body)
}

fn unpack_member(archive: &[u8], member: &str, dest: &Path) -> Result<(), PdfiumAutoError> {
    let extract_err = |e: std::io::Error| PdfiumAutoError::Extract(e.to_string());
    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(archive));

    for entry in tar.entries().map_err(extract_err)? {
        let mut entry = entry.map_err(extract_err)?;
        let is_member = entry.path().map_err(extract_err)?.to_string_lossy() == member;
        if is_member {
            entry.unpack(dest).map_err(extract_err)?;
            return Ok(());
        }
    }

    Err(PdfiumAutoError::Extract(format!("'{member}' not in archive")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linux_x64_uses_shared_object() {
        let asset = asset_for("linux", "x86_64").unwrap();
        assert_eq!(asset.file_name, "libpdfium.so");
        assert_eq!(asset.member, "lib/libpdfium.so");
    }

    #[test]
    fn windows_assets_ship_a_dll() {
        for arch in ["x86_64", "aarch64", "x86"] {
            assert_eq!(asset_for("windows", arch).unwrap().file_name, "pdfium.dll");
        }
    }

    #[test]
    fn unknown_platform_is_rejected() {
        let err = asset_for("plan9", "mips").unwrap_err();
        assert!(err.to_string().contains("plan9/mips"));
    }

    #[test]
    fn cache_dir_is_versioned() {
        let d = pdfium_cache_dir();
        assert_eq!(d, pdfium_cache_dir());
        assert!(d.to_string_lossy().contains(PDFIUM_VERSION));
    }
}
