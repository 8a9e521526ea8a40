//! Catalog wire types and camera configuration lookups.

use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::core::chunk_index::ChunkEntry;

/// Cameras per mat
pub const MAX_CAM: u32 = 4;

/// Days offered for browsing
pub const MAX_DAYS: usize = 32;

/// Segments of one storage server, start times as hex milliseconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkGroup {
    pub srvid: u8,
    #[serde(default)]
    pub ts: Vec<String>,
}

/// Flatten server groups into index entries, skipping unparsable timestamps.
pub fn flatten_chunks(groups: Vec<ChunkGroup>) -> Vec<ChunkEntry> {
    let mut out = Vec::with_capacity(groups.iter().map(|g| g.ts.len()).sum());
    for group in groups {
        for ts in group.ts {
            match u64::from_str_radix(ts.trim_start_matches("0x"), 16) {
                Ok(ms) => out.push(ChunkEntry::new(ms, group.srvid)),
                Err(_) => warn!("Bad chunk timestamp '{}' on srv{}", ts, group.srvid),
            }
        }
    }
    out
}

/// Placement of one camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct CameraConfig {
    pub mat: u32,
    /// 1-based slot on the mat
    pub position: u32,
}

/// Camera id to placement for one day
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CameraConfigs(BTreeMap<u32, CameraConfig>);

impl CameraConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: BTreeMap<u32, CameraConfig>) -> Self {
        Self(map)
    }

    pub fn insert(&mut self, camera: u32, config: CameraConfig) {
        self.0.insert(camera, config);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, camera: u32) -> Option<CameraConfig> {
        self.0.get(&camera).copied()
    }

    pub fn mat_of(&self, camera: u32) -> Option<u32> {
        self.get(camera).map(|c| c.mat)
    }

    /// Cameras of a mat ordered by position
    pub fn cameras_of(&self, mat: u32) -> Vec<u32> {
        let mut cams: Vec<(u32, u32)> = self
            .0
            .iter()
            .filter(|(_, c)| c.mat == mat && (1..=MAX_CAM).contains(&c.position))
            .map(|(&cam, c)| (c.position, cam))
            .collect();
        cams.sort_unstable();
        cams.into_iter().map(|(_, cam)| cam).collect()
    }

    /// Camera at `slot`-th occupied position (0-based) of a mat
    pub fn camera_at(&self, mat: u32, slot: usize) -> Option<u32> {
        self.cameras_of(mat).get(slot).copied()
    }

    /// Camera at an exact (mat, position) placement
    pub fn camera_placed(&self, mat: u32, position: u32) -> Option<u32> {
        self.0
            .iter()
            .find(|(_, c)| c.mat == mat && c.position == position)
            .map(|(&cam, _)| cam)
    }

    /// First camera of the next mat after the one `current` is on, wrapping around.
    pub fn next_mat_camera(&self, current: Option<u32>) -> Option<u32> {
        let current_mat = current.and_then(|c| self.mat_of(c));
        let mats: Vec<u32> = {
            let mut m: Vec<u32> = self.0.values().map(|c| c.mat).collect();
            m.sort_unstable();
            m.dedup();
            m
        };
        let next = current_mat
            .and_then(|cur| mats.iter().copied().find(|&m| m > cur))
            .or_else(|| mats.first().copied())?;
        self.cameras_of(next).first().copied()
    }
}

/// Annotations of one mat for one day (epoch seconds)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MatInfo {
    #[serde(default)]
    pub bookmarks: Vec<i64>,
    /// (start, end) intervals, flattened on the wire
    #[serde(default, with = "flat_pairs")]
    pub medicals: Vec<(i64, i64)>,
}

/// Partial mat update sent after a local edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatPatch {
    Bookmarks(Vec<i64>),
    #[serde(with = "flat_pairs")]
    Medicals(Vec<(i64, i64)>),
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct PlayerInfo {
    #[serde(default)]
    pub camid: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct RecordingState {
    pub recording: bool,
}

mod flat_pairs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(pairs: &[(i64, i64)], s: S) -> Result<S::Ok, S::Error> {
        let flat: Vec<i64> = pairs.iter().flat_map(|&(a, b)| [a, b]).collect();
        flat.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<(i64, i64)>, D::Error> {
        let flat = Vec::<i64>::deserialize(d)?;
        // trailing unpaired value is dropped
        Ok(flat.chunks_exact(2).map(|p| (p[0], p[1])).collect())
    }
}
