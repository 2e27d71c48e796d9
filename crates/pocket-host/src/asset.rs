//! Staging bundled model assets into a real file the native loader can open.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context};
use pocket_core::LlmError;
use tracing::{debug, error, info, warn};

/// Copy buffer size.
pub const STAGE_CHUNK: usize = 64 * 1024;

/// Read-only store of named assets (an APK's asset manager, a bundle directory, ...).
pub trait AssetSource {
    fn open(&self, name: &str) -> io::Result<Box<dyn Read + '_>>;
}

/// Assets laid out as plain files under one directory.
#[derive(Debug, Clone)]
pub struct DirAssetSource {
    root: PathBuf,
}

impl DirAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetSource for DirAssetSource {
    fn open(&self, name: &str) -> io::Result<Box<dyn Read + '_>> {
        let file = File::open(self.root.join(name))?;
        Ok(Box::new(file))
    }
}

/// Make sure `dest_dir/name` holds the asset's full content and return its path.
///
/// A non-empty file already at the destination is trusted and left alone.
/// Otherwise the asset is streamed into a `.part` sibling and renamed into
/// place once complete, so an interrupted copy never looks staged.
pub fn stage_asset<S>(source: &S, name: &str, dest_dir: &Path) -> Result<PathBuf, LlmError>
where
    S: AssetSource + ?Sized,
{
    stage(source, name, dest_dir).map_err(|e| {
        error!(asset = name, "failed to stage asset: {e:#}");
        LlmError::AssetUnavailable(format!("{e:#}"))
    })
}

fn stage<S>(source: &S, name: &str, dest_dir: &Path) -> anyhow::Result<PathBuf>
where
    S: AssetSource + ?Sized,
{
    ensure!(is_plain_name(name), "invalid asset name {name:?}");

    let dest = dest_dir.join(name);
    if is_present(&dest) {
        debug!(path = %dest.display(), "asset already staged");
        return Ok(dest);
    }

    fs::create_dir_all(dest_dir).with_context(|| format!("mkd {}", dest_dir.display()))?;
    let mut reader = source
        .open(name)
        .with_context(|| format!("open asset {name}"))?;

    let tmp = dest_dir.join(format!("{name}.part"));
    let copied = match copy_chunked(&mut *reader, &tmp) {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
    };
    fs::rename(&tmp, &dest)
        .with_context(|| format!("rename {} -> {}", tmp.display(), dest.display()))?;

    if copied == 0 {
        warn!(asset = name, "staged asset is empty");
    }
    info!(path = %dest.display(), bytes = copied, "asset staged");
    Ok(dest)
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

fn is_present(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

fn copy_chunked(reader: &mut dyn Read, tmp: &Path) -> anyhow::Result<u64> {
    let mut out = File::create(tmp).with_context(|| format!("create {}", tmp.display()))?;
    let mut buf = vec![0u8; STAGE_CHUNK];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("read asset"),
        };
        out.write_all(&buf[..n])
            .with_context(|| format!("write {}", tmp.display()))?;
        total += n as u64;
    }
    out.sync_all()
        .with_context(|| format!("sync {}", tmp.display()))?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn assets_with(name: &str, bytes: &[u8]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(name), bytes).unwrap();
        dir
    }

    /// Counts opens so tests can tell whether a copy happened.
    struct Counting<'a> {
        inner: DirAssetSource,
        opens: &'a Cell<usize>,
    }

    impl AssetSource for Counting<'_> {
        fn open(&self, name: &str) -> io::Result<Box<dyn Read + '_>> {
            self.opens.set(self.opens.get() + 1);
            self.inner.open(name)
        }
    }

    /// Yields `good` bytes, then fails.
    struct Flaky {
        good: usize,
    }

    impl AssetSource for Flaky {
        fn open(&self, _name: &str) -> io::Result<Box<dyn Read + '_>> {
            let head = io::Cursor::new(vec![7u8; self.good]);
            Ok(Box::new(head.chain(FailingReader)))
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "asset truncated"))
        }
    }

    #[test]
    fn copies_a_missing_asset() {
        let assets = assets_with("model.gguf", b"GGUF weights");
        let cache = tempfile::tempdir().unwrap();
        let src = DirAssetSource::new(assets.path());

        let path = stage_asset(&src, "model.gguf", cache.path()).unwrap();
        assert_eq!(path, cache.path().join("model.gguf"));
        assert_eq!(fs::read(&path).unwrap(), b"GGUF weights");
        assert!(!cache.path().join("model.gguf.part").exists());
    }

    #[test]
    fn creates_the_destination_directory() {
        let assets = assets_with("model.gguf", b"x");
        let cache = tempfile::tempdir().unwrap();
        let nested = cache.path().join("a").join("b");
        let path = stage_asset(&DirAssetSource::new(assets.path()), "model.gguf", &nested).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn existing_copy_is_left_alone() {
        let assets = assets_with("model.gguf", b"new contents");
        let cache = tempfile::tempdir().unwrap();
        fs::write(cache.path().join("model.gguf"), b"already here").unwrap();

        let opens = Cell::new(0);
        let src = Counting {
            inner: DirAssetSource::new(assets.path()),
            opens: &opens,
        };
        let path = stage_asset(&src, "model.gguf", cache.path()).unwrap();
        assert_eq!(fs::read(path).unwrap(), b"already here");
        assert_eq!(opens.get(), 0);
    }

    #[test]
    fn empty_leftover_is_replaced() {
        let assets = assets_with("model.gguf", b"real weights");
        let cache = tempfile::tempdir().unwrap();
        fs::write(cache.path().join("model.gguf"), b"").unwrap();

        let path = stage_asset(&DirAssetSource::new(assets.path()), "model.gguf", cache.path())
            .unwrap();
        assert_eq!(fs::read(path).unwrap(), b"real weights");
    }

    #[test]
    fn large_assets_survive_chunking() {
        let payload: Vec<u8> = (0..(STAGE_CHUNK * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let assets = assets_with("big.bin", &payload);
        let cache = tempfile::tempdir().unwrap();
        let path =
            stage_asset(&DirAssetSource::new(assets.path()), "big.bin", cache.path()).unwrap();
        assert_eq!(fs::read(path).unwrap(), payload);
    }

    #[test]
    fn missing_asset_is_unavailable() {
        let assets = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let err = stage_asset(&DirAssetSource::new(assets.path()), "nope.gguf", cache.path())
            .unwrap_err();
        assert!(matches!(err, LlmError::AssetUnavailable(ref m) if m.contains("nope.gguf")));
        assert!(!cache.path().join("nope.gguf").exists());
    }

    #[test]
    fn failed_copy_leaves_nothing_behind() {
        let cache = tempfile::tempdir().unwrap();
        let err = stage_asset(&Flaky { good: 1000 }, "model.gguf", cache.path()).unwrap_err();
        assert!(matches!(err, LlmError::AssetUnavailable(_)));
        assert!(!cache.path().join("model.gguf").exists());
        assert!(!cache.path().join("model.gguf.part").exists());
    }

    #[test]
    fn path_like_names_are_rejected() {
        let assets = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let src = DirAssetSource::new(assets.path());
        for name in ["", "..", "../escape.gguf", "dir/model.gguf", "dir\\model.gguf"] {
            let err = stage_asset(&src, name, cache.path()).unwrap_err();
            assert!(matches!(err, LlmError::AssetUnavailable(_)), "{name:?}");
        }
    }
}
