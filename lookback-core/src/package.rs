//! Trigger-time packaging.
//!
//! On a button press the appliance bundles the newest photos and a
//! point-in-time copy of the rolling WAV into one timestamped zip archive.
//!
//! The WAV copy is the only step that touches the capture session's shared
//! lock: take it, `fs::copy`, release. Archiving and any upload happen after
//! the lock is gone, so a drain cycle in flight can never hand us a torn file
//! and the capture callback is blocked for no longer than one file copy.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{info, warn};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::{audio::session::BufferHandle, error::Result, photo::recent_photos};

/// Bundle the newest `max_photos` photos and the rolling WAV into a zip
/// archive under `archive_dir`, returning the archive path.
///
/// A missing WAV (capture still warming up) downgrades to a photos-only
/// archive with a warning, mirroring the roll's availability-over-
/// completeness stance.
pub fn package_outputs(
    photo_dir: &Path,
    max_photos: usize,
    audio_path: &Path,
    buffer: &BufferHandle,
    archive_dir: &Path,
) -> Result<PathBuf> {
    let mut files = recent_photos(photo_dir, max_photos)?;

    // Lock-scoped copy: consistent with any in-flight drain rename.
    let audio_copy = if audio_path.exists() {
        let copy_path = audio_path.with_extension("copy.wav");
        {
            let _guard = buffer.lock();
            fs::copy(audio_path, &copy_path)?;
        }
        files.push(copy_path.clone());
        Some(copy_path)
    } else {
        warn!(
            "rolling audio file {} not found; packaging photos only",
            audio_path.display()
        );
        None
    };

    fs::create_dir_all(archive_dir)?;
    let archive_path = archive_dir.join(format!(
        "capture_{}.zip",
        Local::now().format("%Y%m%d_%H%M%S")
    ));

    let result = write_archive(&archive_path, &files, audio_path, audio_copy.as_deref());

    // The temp copy is never part of the on-disk contract; drop it even when
    // archiving failed.
    if let Some(copy_path) = &audio_copy {
        if let Err(e) = fs::remove_file(copy_path) {
            warn!("could not remove audio copy {}: {e}", copy_path.display());
        }
    }
    result?;

    info!(
        files = files.len(),
        archive = %archive_path.display(),
        "packaged capture outputs"
    );
    Ok(archive_path)
}

fn write_archive(
    archive_path: &Path,
    files: &[PathBuf],
    audio_path: &Path,
    audio_copy: Option<&Path>,
) -> Result<()> {
    let mut zip = ZipWriter::new(File::create(archive_path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in files {
        // The audio copy is stored under the canonical snapshot name.
        let name = if audio_copy == Some(path.as_path()) {
            entry_name(audio_path)
        } else {
            entry_name(path)
        };
        zip.start_file(name, options)?;
        io::copy(&mut File::open(path)?, &mut zip)?;
    }
    zip.finish()?;
    Ok(())
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ring::RingBuffer;
    use crate::drain_once;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn handle(capacity: usize) -> BufferHandle {
        Arc::new(Mutex::new(RingBuffer::new(capacity, 1, capacity - 1).unwrap()))
    }

    fn archive_names(path: &Path) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_owned())
            .collect()
    }

    #[test]
    fn bundles_recent_photos_and_audio_copy() {
        let dir = tempfile::tempdir().unwrap();
        let photo_dir = dir.path().join("photos");
        fs::create_dir_all(&photo_dir).unwrap();
        for i in 0..5 {
            fs::write(photo_dir.join(format!("photo_{i:06}.jpg")), b"jpeg").unwrap();
        }

        let wav_path = dir.path().join("rolling_audio.wav");
        let buffer = handle(4);
        buffer.lock().write(&[1.0, 2.0, 3.0, 4.0]);
        drain_once(&buffer, 4, 1, &wav_path).unwrap();

        let archive =
            package_outputs(&photo_dir, 3, &wav_path, &buffer, dir.path()).unwrap();

        let mut names = archive_names(&archive);
        names.sort();
        assert_eq!(
            names,
            vec![
                "photo_000002.jpg",
                "photo_000003.jpg",
                "photo_000004.jpg",
                "rolling_audio.wav",
            ]
        );
        // Temp copy removed after packaging.
        assert!(!wav_path.with_extension("copy.wav").exists());
    }

    #[test]
    fn missing_audio_packages_photos_only() {
        let dir = tempfile::tempdir().unwrap();
        let photo_dir = dir.path().join("photos");
        fs::create_dir_all(&photo_dir).unwrap();
        fs::write(photo_dir.join("photo_000000.jpg"), b"jpeg").unwrap();

        let wav_path = dir.path().join("rolling_audio.wav");
        let buffer = handle(4);

        let archive =
            package_outputs(&photo_dir, 15, &wav_path, &buffer, dir.path()).unwrap();
        assert_eq!(archive_names(&archive), vec!["photo_000000.jpg"]);
    }

    #[test]
    fn missing_photo_dir_still_packages_audio() {
        let dir = tempfile::tempdir().unwrap();
        let wav_path = dir.path().join("rolling_audio.wav");
        let buffer = handle(4);
        buffer.lock().write(&[1.0, 2.0, 3.0, 4.0]);
        drain_once(&buffer, 4, 1, &wav_path).unwrap();

        let archive = package_outputs(
            &dir.path().join("no_photos"),
            15,
            &wav_path,
            &buffer,
            dir.path(),
        )
        .unwrap();
        assert_eq!(archive_names(&archive), vec!["rolling_audio.wav"]);
    }

    #[test]
    fn archived_audio_matches_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let photo_dir = dir.path().join("photos");
        fs::create_dir_all(&photo_dir).unwrap();

        let wav_path = dir.path().join("rolling_audio.wav");
        let buffer = handle(4);
        buffer.lock().write(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        drain_once(&buffer, 4, 1, &wav_path).unwrap();
        let expected = fs::read(&wav_path).unwrap();

        let archive =
            package_outputs(&photo_dir, 15, &wav_path, &buffer, dir.path()).unwrap();

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut entry = zip.by_name("rolling_audio.wav").unwrap();
        let mut bytes = Vec::new();
        io::Read::read_to_end(&mut entry, &mut bytes).unwrap();
        assert_eq!(bytes, expected);
    }
}
