//! Segment storage: path template and read-only memory mapping.

use std::fmt;
use std::fs::File;
use std::ops::Deref;
use std::path::PathBuf;

use log::trace;
use memmap2::Mmap;

use super::chunk_index::ChunkEntry;

/// Camera stream of one recording day
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamId {
    pub day: String,
    pub camera: u32,
}

impl StreamId {
    pub fn new(day: impl Into<String>, camera: u32) -> Self {
        Self { day: day.into(), camera }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/cam{:02}", self.day, self.camera)
    }
}

/// Bytes of one segment, either mapped from disk or held in memory.
pub enum SegmentMap {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for SegmentMap {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            SegmentMap::Mapped(m) => m,
            SegmentMap::Owned(v) => v,
        }
    }
}

impl fmt::Debug for SegmentMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            SegmentMap::Mapped(_) => "Mapped",
            SegmentMap::Owned(_) => "Owned",
        };
        write!(f, "SegmentMap::{}({} bytes)", kind, self.len())
    }
}

#[derive(Debug)]
pub enum SegmentError {
    /// File not (yet) present on the storage share
    Missing(PathBuf),
    Io(PathBuf, std::io::Error),
    Empty(PathBuf),
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentError::Missing(p) => write!(f, "segment missing: {}", p.display()),
            SegmentError::Io(p, e) => write!(f, "segment {}: {}", p.display(), e),
            SegmentError::Empty(p) => write!(f, "segment empty: {}", p.display()),
        }
    }
}

impl std::error::Error for SegmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SegmentError::Io(_, e) => Some(e),
            _ => None,
        }
    }
}

/// Source of segment bytes for the decoder
pub trait SegmentSource: Send + Sync {
    fn map(&self, stream: &StreamId, entry: ChunkEntry) -> Result<SegmentMap, SegmentError>;
}

/// Segment files laid out as `{root}/srv{srvid}/{day}/cam{camid:02}/{start_ms:x}.ts`
#[derive(Debug, Clone)]
pub struct SegmentStore {
    root: PathBuf,
}

impl SegmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, stream: &StreamId, entry: ChunkEntry) -> PathBuf {
        self.root
            .join(format!("srv{}", entry.server_id))
            .join(&stream.day)
            .join(format!("cam{:02}", stream.camera))
            .join(format!("{:x}.ts", entry.start_ms))
    }
}

impl SegmentSource for SegmentStore {
    fn map(&self, stream: &StreamId, entry: ChunkEntry) -> Result<SegmentMap, SegmentError> {
        let path = self.path(stream, entry);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(SegmentError::Missing(path)),
            Err(e) => return Err(SegmentError::Io(path, e)),
        };
        let len = file.metadata().map_err(|e| SegmentError::Io(path.clone(), e))?.len();
        if len == 0 {
            return Err(SegmentError::Empty(path));
        }
        // SAFETY: segment files are written once by the recorder and never modified afterwards
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| SegmentError::Io(path.clone(), e))?;
        trace!("Mapped {} ({} bytes)", path.display(), mmap.len());
        Ok(SegmentMap::Mapped(mmap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("segplay-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_path_template() {
        let store = SegmentStore::new("/data");
        let stream = StreamId::new("2024-05-01", 3);
        let path = store.path(&stream, ChunkEntry::new(0x18f2a, 2));
        assert_eq!(path, PathBuf::from("/data/srv2/2024-05-01/cam03/18f2a.ts"));
    }

    #[test]
    fn test_map_reads_file() {
        let root = temp_root("map");
        let store = SegmentStore::new(&root);
        let stream = StreamId::new("2024-05-01", 1);
        let entry = ChunkEntry::new(4000, 0);
        let path = store.path(&stream, entry);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(&path).unwrap().write_all(b"\x47segment").unwrap();

        let map = store.map(&stream, entry).unwrap();
        assert_eq!(&map[..], b"\x47segment");
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_missing_and_empty() {
        let root = temp_root("missing");
        let store = SegmentStore::new(&root);
        let stream = StreamId::new("2024-05-01", 1);
        assert!(matches!(store.map(&stream, ChunkEntry::new(1, 0)), Err(SegmentError::Missing(_))));

        let entry = ChunkEntry::new(2, 0);
        let path = store.path(&stream, entry);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(&path).unwrap();
        assert!(matches!(store.map(&stream, entry), Err(SegmentError::Empty(_))));
        std::fs::remove_dir_all(&root).unwrap();
    }
}
