use super::compiler::{CompiledMaps, MapKind};
use crate::error::{SyncError, SyncResult};
use std::fs::Permissions;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// Where each map lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapPaths {
    pub enforce_literal: PathBuf,
    pub enforce_pattern: PathBuf,
    pub test_literal: PathBuf,
    pub test_pattern: PathBuf,
}

impl MapPaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            enforce_literal: dir.join("blocked_recipients"),
            enforce_pattern: dir.join("blocked_recipients.pattern"),
            test_literal: dir.join("blocked_recipients_test"),
            test_pattern: dir.join("blocked_recipients_test.pattern"),
        }
    }

    pub fn get(&self, kind: MapKind) -> &Path {
        match kind {
            MapKind::EnforceLiteral => &self.enforce_literal,
            MapKind::EnforcePattern => &self.enforce_pattern,
            MapKind::TestLiteral => &self.test_literal,
            MapKind::TestPattern => &self.test_pattern,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenMap {
    pub kind: MapKind,
    pub path: PathBuf,
    pub bytes: usize,
    pub lines: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub maps: Vec<WrittenMap>,
}

impl WriteReport {
    pub fn total_lines(&self) -> usize {
        self.maps.iter().map(|m| m.lines).sum()
    }
}

/// Writes compiled maps with temp-file-then-rename so Postfix never reads a
/// half-written map.
#[derive(Debug, Clone)]
pub struct MapWriter {
    paths: MapPaths,
}

impl MapWriter {
    pub fn new(paths: MapPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &MapPaths {
        &self.paths
    }

    /// All four files are staged before any is renamed. A failure while
    /// staging leaves every existing map untouched.
    pub fn write(&self, maps: &CompiledMaps) -> SyncResult<WriteReport> {
        let mut staged = Vec::with_capacity(MapKind::ALL.len());
        for kind in MapKind::ALL {
            let path = self.paths.get(kind);
            let contents = maps.get(kind);
            let tmp = stage(path, contents).map_err(|e| SyncError::compile(path, e))?;
            staged.push((kind, tmp, contents));
        }

        let mut report = WriteReport::default();
        for (kind, tmp, contents) in staged {
            let path = self.paths.get(kind);
            tmp.persist(path)
                .map_err(|e| SyncError::compile(path, e.error))?;
            report.maps.push(WrittenMap {
                kind,
                path: path.to_path_buf(),
                bytes: contents.len(),
                lines: contents.lines().count(),
            });
        }

        for map in &report.maps {
            info!(
                "Wrote map {} (bytes={}, lines={})",
                map.path.display(),
                map.bytes,
                map.lines
            );
        }
        Ok(report)
    }
}

fn stage(path: &Path, contents: &str) -> std::io::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".blocked_recipients.")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.as_file().set_permissions(Permissions::from_mode(0o644))?;
    Ok(tmp)
}
