//! Zip extraction into the install root with zip-slip protection.
//!
//! Every entry name is normalised lexically (`.` dropped, `..` pops a component,
//! absolute or prefixed names refused) and must resolve to a strict descendant of
//! the canonical root; the first entry that does not aborts the whole extraction.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::JobError;

/// How an extraction ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractOutcome {
    Completed { entries: usize },
    /// `stop` was set; entries before that point are already on disk.
    Stopped { entries: usize },
}

fn io_err(what: impl std::fmt::Display, e: impl std::fmt::Display) -> JobError {
    JobError::ExtractionIo(format!("{}: {}", what, e))
}

/// Resolve an archive entry name below `root`. `None` if it escapes or names the root itself.
pub(crate) fn resolve_entry_path(root: &Path, name: &str) -> Option<PathBuf> {
    let mut rel = PathBuf::new();
    for comp in Path::new(name).components() {
        match comp {
            Component::Normal(part) => rel.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !rel.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if rel.as_os_str().is_empty() {
        return None;
    }
    let out = root.join(rel);
    if out.starts_with(root) && out != root {
        Some(out)
    } else {
        None
    }
}

fn ensure_root(dest_root: &Path) -> Result<PathBuf, JobError> {
    match fs::metadata(dest_root) {
        Ok(meta) if !meta.is_dir() => {
            return Err(JobError::ExtractionIo(format!(
                "{} exists and is not a directory",
                dest_root.display()
            )))
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dest_root).map_err(|e| io_err(dest_root.display(), e))?;
        }
        Err(e) => return Err(io_err(dest_root.display(), e)),
    }
    fs::canonicalize(dest_root).map_err(|e| io_err(dest_root.display(), e))
}

/// Directories are created through the real filesystem, so a symlink already inside
/// the root could redirect them; re-check the canonical location.
fn create_dir_below(root: &Path, dir: &Path, entry: &str) -> Result<(), JobError> {
    fs::create_dir_all(dir).map_err(|e| io_err(entry, e))?;
    let real = fs::canonicalize(dir).map_err(|e| io_err(entry, e))?;
    if !real.starts_with(root) {
        return Err(JobError::ExtractionSecurity {
            entry: entry.to_string(),
        });
    }
    Ok(())
}

/// A symlink already sitting at a file entry's path would redirect the write.
fn refuse_symlink(target: &Path, entry: &str) -> Result<(), JobError> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.file_type().is_symlink() => {
            tracing::warn!(entry, path = %target.display(), "refusing to write through a symlink");
            Err(JobError::ExtractionSecurity {
                entry: entry.to_string(),
            })
        }
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(entry, e)),
    }
}

/// Extract every entry of the zip at `archive` into `dest_root`, in archive order.
///
/// Creates `dest_root` if missing. Files overwrite existing ones; directory entries
/// are idempotent. `stop` is checked before each entry.
pub fn extract_archive(
    archive: &Path,
    dest_root: &Path,
    stop: &AtomicBool,
) -> Result<ExtractOutcome, JobError> {
    let root = ensure_root(dest_root)?;
    let file = File::open(archive).map_err(|e| io_err(archive.display(), e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| io_err(archive.display(), e))?;

    tracing::info!(
        archive = %archive.display(),
        root = %root.display(),
        entries = zip.len(),
        "extracting"
    );

    for index in 0..zip.len() {
        if stop.load(Ordering::SeqCst) {
            tracing::info!(done = index, "extraction stopped");
            return Ok(ExtractOutcome::Stopped { entries: index });
        }
        let mut entry = zip
            .by_index(index)
            .map_err(|e| io_err(format!("entry {}", index), e))?;
        let name = entry.name().to_string();
        let Some(target) = resolve_entry_path(&root, &name) else {
            tracing::warn!(entry = %name, "refusing archive entry outside the install root");
            return Err(JobError::ExtractionSecurity { entry: name });
        };

        if entry.is_dir() {
            create_dir_below(&root, &target, &name)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            create_dir_below(&root, parent, &name)?;
        }
        refuse_symlink(&target, &name)?;
        let mut out = File::create(&target).map_err(|e| io_err(&name, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| io_err(&name, e))?;
    }

    tracing::info!(entries = zip.len(), "extraction complete");
    Ok(ExtractOutcome::Completed { entries: zip.len() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    enum Entry<'a> {
        Dir(&'a str),
        File(&'a str, &'a [u8]),
    }

    fn build_zip(path: &Path, entries: &[Entry]) {
        let mut w = zip::ZipWriter::new(File::create(path).unwrap());
        let opts = SimpleFileOptions::default();
        for e in entries {
            match e {
                Entry::Dir(name) => w.add_directory(*name, opts).unwrap(),
                Entry::File(name, body) => {
                    w.start_file(*name, opts).unwrap();
                    w.write_all(body).unwrap();
                }
            }
        }
        w.finish().unwrap();
    }

    #[test]
    fn resolve_normalises_lexically() {
        let root = Path::new("/srv/root");
        assert_eq!(
            resolve_entry_path(root, "a/./b/../c.txt"),
            Some(PathBuf::from("/srv/root/a/c.txt"))
        );
        assert_eq!(resolve_entry_path(root, "../../evil"), None);
        assert_eq!(resolve_entry_path(root, "a/../../evil"), None);
        assert_eq!(resolve_entry_path(root, "/etc/passwd"), None);
        assert_eq!(resolve_entry_path(root, "a/.."), None);
        assert_eq!(resolve_entry_path(root, "./"), None);
    }

    #[test]
    fn extracts_directory_and_file() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("pack.zip");
        build_zip(
            &archive,
            &[Entry::Dir("a/"), Entry::File("a/b.txt", b"hello")],
        );
        let root = tmp.path().join("installed");

        let out = extract_archive(&archive, &root, &AtomicBool::new(false)).unwrap();
        assert_eq!(out, ExtractOutcome::Completed { entries: 2 });
        assert!(root.join("a").is_dir());
        assert_eq!(fs::read(root.join("a/b.txt")).unwrap(), b"hello");

        // Second run overwrites and tolerates the existing directory.
        extract_archive(&archive, &root, &AtomicBool::new(false)).unwrap();
        assert_eq!(fs::read(root.join("a/b.txt")).unwrap(), b"hello");
    }

    #[test]
    fn rejects_entry_escaping_root() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("evil.zip");
        build_zip(
            &archive,
            &[
                Entry::File("ok.txt", b"fine"),
                Entry::File("../../evil", b"pwned"),
            ],
        );
        let root = tmp.path().join("deep").join("installed");

        match extract_archive(&archive, &root, &AtomicBool::new(false)) {
            Err(JobError::ExtractionSecurity { entry }) => assert_eq!(entry, "../../evil"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!tmp.path().join("evil").exists());
    }

    #[cfg(unix)]
    #[test]
    fn refuses_to_write_through_existing_symlink() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tmp.path().join("outside.txt");
        fs::write(&outside, b"keep").unwrap();
        let root = tmp.path().join("installed");
        fs::create_dir_all(root.join("a")).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("a/b.txt")).unwrap();

        let archive = tmp.path().join("pack.zip");
        build_zip(&archive, &[Entry::File("a/b.txt", b"overwritten")]);

        let err = extract_archive(&archive, &root, &AtomicBool::new(false)).unwrap_err();
        assert!(matches!(err, JobError::ExtractionSecurity { ref entry } if entry == "a/b.txt"));
        assert_eq!(fs::read(&outside).unwrap(), b"keep");
    }

    #[test]
    fn root_that_is_a_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("pack.zip");
        build_zip(&archive, &[Entry::File("x", b"1")]);
        let root = tmp.path().join("not-a-dir");
        fs::write(&root, b"").unwrap();

        assert!(matches!(
            extract_archive(&archive, &root, &AtomicBool::new(false)),
            Err(JobError::ExtractionIo(_))
        ));
    }

    #[test]
    fn stop_flag_halts_before_next_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("pack.zip");
        build_zip(&archive, &[Entry::File("x", b"1"), Entry::File("y", b"2")]);
        let root = tmp.path().join("installed");

        let out = extract_archive(&archive, &root, &AtomicBool::new(true)).unwrap();
        assert_eq!(out, ExtractOutcome::Stopped { entries: 0 });
        assert!(!root.join("x").exists());
    }

    #[test]
    fn garbage_archive_is_an_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("pack.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();
        assert!(matches!(
            extract_archive(&archive, &tmp.path().join("r"), &AtomicBool::new(false)),
            Err(JobError::ExtractionIo(_))
        ));
    }
}
