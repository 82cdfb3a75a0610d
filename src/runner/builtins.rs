//! Built-in command dispatch: `mkdir`, `cleandir`, `remove`, `move`, `copy`,
//! `zip`/`unzip`, `archive`/`unarchive`.
//!
//! Built-ins always run on the host, never inside a container, even when
//! the owning rule targets one — this sidesteps the volume-mount I/O
//! penalty of shelling into the container for something as simple as
//! `mkdir`. Archives use `zip` for zip/unzip and `tar` + `flate2` (gzip) for
//! archive/unarchive.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Result, ZimError};
use crate::model::{ArchiveParams, CopyParams, MoveParams, RemovePaths, UnarchiveParams, UnzipParams, ZipParams};
use crate::util::constants::ARCHIVE_BUF_SIZE;

fn resolve(base: &Path, path: &str) -> PathBuf {
    base.join(path)
}

pub fn mkdir(base: &Path, path: &str) -> Result<()> {
    fs::create_dir_all(resolve(base, path))?;
    Ok(())
}

/// Remove the directory (if present) and recreate it empty.
pub fn cleandir(base: &Path, path: &str) -> Result<()> {
    let target = resolve(base, path);
    if target.exists() {
        fs::remove_dir_all(&target)?;
    }
    fs::create_dir_all(&target)?;
    Ok(())
}

pub fn remove(base: &Path, paths: &RemovePaths) -> Result<()> {
    for p in paths.as_slice() {
        let target = resolve(base, p);
        if target.is_dir() {
            fs::remove_dir_all(&target)?;
        } else if target.exists() {
            fs::remove_file(&target)?;
        }
    }
    Ok(())
}

pub fn move_path(base: &Path, params: &MoveParams) -> Result<()> {
    let src = resolve(base, &params.src);
    let dst = resolve(base, &params.dst);
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(&src, &dst)?;
    Ok(())
}

pub fn copy_path(base: &Path, params: &CopyParams) -> Result<()> {
    let src = resolve(base, &params.src);
    let dst = resolve(base, &params.dst);
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    if src.is_dir() {
        copy_dir_recursive(&src, &dst)?;
    } else {
        fs::copy(&src, &dst)?;
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Collect every regular file under `dir`, relative to `dir`, in a stable
/// (sorted) order — used by both `zip` and `archive` so an identical
/// directory always produces byte-identical archive entry ordering.
fn sorted_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if dir.is_file() {
        return Ok(vec![PathBuf::new()]);
    }
    for entry in walkdir(dir)? {
        out.push(entry);
    }
    out.sort();
    Ok(out)
}

fn walkdir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            for nested in walkdir(&path)? {
                out.push(nested);
            }
        } else {
            out.push(path.strip_prefix(dir).unwrap_or(&path).to_path_buf());
        }
    }
    Ok(out)
}

pub fn zip(base: &Path, params: &ZipParams) -> Result<()> {
    let source_root = match &params.cd {
        Some(cd) => resolve(base, cd).join(&params.input),
        None => resolve(base, &params.input),
    };
    let output = resolve(base, &params.output);
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = File::create(&output)?;
    let mut writer = zip::ZipWriter::new(BufWriter::new(file));
    let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let entries = sorted_files(&source_root)?;
    for relative in entries {
        let absolute = if relative.as_os_str().is_empty() { source_root.clone() } else { source_root.join(&relative) };
        let entry_name = if relative.as_os_str().is_empty() {
            source_root.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
        } else {
            relative.to_string_lossy().replace('\\', "/")
        };
        writer
            .start_file(entry_name, options)
            .map_err(|e| ZimError::UserError { reason: format!("zip write failed: {e}") })?;
        let mut reader = File::open(&absolute)?;
        std::io::copy(&mut reader, &mut writer)?;
    }
    writer.finish().map_err(|e| ZimError::UserError { reason: format!("zip finalize failed: {e}") })?;
    Ok(())
}

pub fn unzip(base: &Path, params: &UnzipParams) -> Result<()> {
    let input = resolve(base, &params.input);
    let output = match &params.output {
        Some(o) => resolve(base, o),
        None => base.to_path_buf(),
    };
    fs::create_dir_all(&output)?;

    let file = File::open(&input)?;
    let mut archive = zip::ZipArchive::new(BufReader::with_capacity(ARCHIVE_BUF_SIZE, file))
        .map_err(|e| ZimError::UserError { reason: format!("invalid zip '{}': {e}", input.display()) })?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ZimError::UserError { reason: format!("zip entry read failed: {e}") })?;
        let Some(entry_path) = entry.enclosed_name().map(|p| p.to_path_buf()) else { continue };
        let dest = output.join(entry_path);
        if entry.is_dir() {
            fs::create_dir_all(&dest)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest)?;
        std::io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

pub fn archive(base: &Path, params: &ArchiveParams) -> Result<()> {
    let input = resolve(base, &params.input);
    let output = resolve(base, &params.output);
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = File::create(&output)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    if input.is_dir() {
        builder.append_dir_all(".", &input)?;
    } else {
        let name = input.file_name().ok_or_else(|| ZimError::UserError {
            reason: format!("archive input '{}' has no file name", input.display()),
        })?;
        builder.append_path_with_name(&input, name)?;
    }
    builder.into_inner()?.finish().map_err(ZimError::IoError)?;
    Ok(())
}

pub fn unarchive(base: &Path, params: &UnarchiveParams) -> Result<()> {
    let input = resolve(base, &params.input);
    let output = match &params.output {
        Some(o) => resolve(base, o),
        None => base.to_path_buf(),
    };
    fs::create_dir_all(&output)?;

    let file = File::open(&input)?;
    let decoder = GzDecoder::new(BufReader::with_capacity(ARCHIVE_BUF_SIZE, file));
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(&output)?;
    Ok(())
}
