//! Bookmark and medical annotation editing for the loaded mat.
//!
//! Edits apply to the second currently on screen. The overlay domain holds the loaded
//! annotations; the catalog PATCH happens after the overlay lock is released.

use std::sync::Arc;

use log::{debug, info};

use crate::catalog::types::{MatInfo, MatPatch};
use crate::catalog::{Catalog, CatalogError};
use crate::core::context::{PlaybackContext, PlayerHandle};
use crate::core::speed::Speed;

pub const MAX_BOOKMARKS: usize = 35;
pub const MAX_MEDICALS: usize = 128;

/// Seconds around an interval that still hit it
pub const MEDICAL_EXTEND: i64 = 20;

/// Intervals shorter than this are dropped
pub const MEDICAL_DELETE: i64 = 5;

/// End of an interval that has not been stopped yet
pub const MEDICAL_OPEN_END: i64 = i64::MAX - MEDICAL_EXTEND;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatAction {
    AddBookmark,
    /// Delete by index; only honored while that bookmark's interval is on screen
    DeleteBookmark(usize),
    MedicalStart,
    MedicalStop,
}

/// Index of the bookmark interval containing `sec`; the last interval is open-ended.
pub fn bookmark_at(bookmarks: &[i64], sec: i64) -> Option<usize> {
    bookmarks.iter().enumerate().position(|(i, &b)| {
        sec >= b && bookmarks.get(i + 1).is_none_or(|&next| sec < next)
    })
}

fn add_bookmark(bookmarks: &mut Vec<i64>, sec: i64) -> bool {
    if bookmarks.len() >= MAX_BOOKMARKS {
        return false;
    }
    match bookmarks.binary_search(&sec) {
        Ok(_) => false,
        Err(i) => {
            bookmarks.insert(i, sec);
            true
        }
    }
}

fn edit_medical(medicals: &mut Vec<(i64, i64)>, start: bool, sec: i64) -> bool {
    let hit = medicals
        .iter()
        .position(|&(s, e)| sec >= s - MEDICAL_EXTEND && sec <= e.saturating_add(MEDICAL_EXTEND));
    let Some(i) = hit else {
        if !start || medicals.len() >= MAX_MEDICALS {
            return false;
        }
        let at = medicals.iter().position(|&(_, e)| e >= sec).unwrap_or(medicals.len());
        medicals.insert(at, (sec, MEDICAL_OPEN_END));
        return true;
    };
    let (s, e) = &mut medicals[i];
    if start && sec <= *e {
        *s = sec;
    }
    if !start && sec >= *s {
        *e = sec;
    }
    if *e - *s < MEDICAL_DELETE {
        medicals.remove(i);
    }
    true
}

/// Apply `action` at displayed second `sec`. Returns the patch to send when anything changed.
pub fn apply(info: &mut MatInfo, action: MatAction, sec: i64) -> Option<MatPatch> {
    match action {
        MatAction::AddBookmark => {
            add_bookmark(&mut info.bookmarks, sec).then(|| MatPatch::Bookmarks(info.bookmarks.clone()))
        }
        MatAction::DeleteBookmark(index) => {
            if index >= info.bookmarks.len() {
                return None;
            }
            if bookmark_at(&info.bookmarks, sec) != Some(index) {
                return None;
            }
            info.bookmarks.remove(index);
            Some(MatPatch::Bookmarks(info.bookmarks.clone()))
        }
        MatAction::MedicalStart | MatAction::MedicalStop => {
            let start = action == MatAction::MedicalStart;
            edit_medical(&mut info.medicals, start, sec).then(|| MatPatch::Medicals(info.medicals.clone()))
        }
    }
}

/// Annotation editor bound to the running player
pub struct MatEditor {
    ctx: Arc<PlaybackContext>,
    catalog: Arc<dyn Catalog>,
}

impl MatEditor {
    pub fn new(ctx: Arc<PlaybackContext>, catalog: Arc<dyn Catalog>) -> Self {
        Self { ctx, catalog }
    }

    /// Mat of the active camera with the day it belongs to
    fn active_mat(&self) -> Option<(String, u32)> {
        let c = self.ctx.command.lock();
        let mat = c.active.and_then(|cam| c.cams.mat_of(cam))?;
        Some((c.day.clone(), mat))
    }

    /// Edit the loaded mat at the displayed second. Returns whether a patch was sent.
    pub fn edit(&self, action: MatAction) -> Result<bool, CatalogError> {
        let Some((day, mat)) = self.active_mat() else {
            return Ok(false);
        };
        let patch = {
            let mut o = self.ctx.overlay.lock();
            let Some(sec) = o.shown_sec() else {
                return Ok(false);
            };
            if o.loaded_mat != Some(mat) {
                debug!("Mat {} not loaded, ignoring {:?}", mat, action);
                return Ok(false);
            }
            apply(&mut o.mat, action, sec)
        };
        self.ctx.overlay.notify();
        match patch {
            Some(patch) => {
                info!("Mat {} edit {:?}", mat, action);
                self.catalog.patch_mat(&day, mat, &patch)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Jump to bookmark `index` and play from there. Returns the target second.
    pub fn select_bookmark(&self, handle: &PlayerHandle, index: usize) -> Option<i64> {
        let sec = self.ctx.overlay.lock().mat.bookmarks.get(index).copied()?;
        if sec <= 0 {
            return None;
        }
        handle.set_speed(Speed::PLAY.level());
        handle.seek(sec as u64 * 1000);
        Some(sec)
    }

    /// Re-read the loaded mat from the catalog
    pub fn reload(&self) -> Result<(), CatalogError> {
        let Some((day, mat)) = self.active_mat() else {
            return Ok(());
        };
        let info = self.catalog.mat(&day, mat)?;
        {
            let mut o = self.ctx.overlay.lock();
            o.loaded_mat = Some(mat);
            o.mat = info;
        }
        self.ctx.overlay.notify();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::{CameraConfig, CameraConfigs};
    use crate::core::testing::FakeCatalog;

    #[test]
    fn test_bookmark_add_sorted_no_duplicates() {
        let mut info = MatInfo::default();
        assert!(apply(&mut info, MatAction::AddBookmark, 200).is_some());
        assert!(apply(&mut info, MatAction::AddBookmark, 100).is_some());
        assert!(apply(&mut info, MatAction::AddBookmark, 200).is_none());
        assert_eq!(info.bookmarks, vec![100, 200]);
    }

    #[test]
    fn test_bookmark_cap() {
        let mut info = MatInfo {
            bookmarks: (0..MAX_BOOKMARKS as i64).collect(),
            medicals: vec![],
        };
        assert!(apply(&mut info, MatAction::AddBookmark, 1000).is_none());
        assert_eq!(info.bookmarks.len(), MAX_BOOKMARKS);
    }

    #[test]
    fn test_bookmark_delete_only_when_on_screen() {
        let mut info = MatInfo {
            bookmarks: vec![100, 200, 300],
            medicals: vec![],
        };
        assert_eq!(bookmark_at(&info.bookmarks, 250), Some(1));
        assert_eq!(bookmark_at(&info.bookmarks, 5000), Some(2));
        assert_eq!(bookmark_at(&info.bookmarks, 50), None);

        // interval 0 is not on screen
        assert!(apply(&mut info, MatAction::DeleteBookmark(0), 250).is_none());
        assert_eq!(info.bookmarks, vec![100, 200, 300]);

        assert_eq!(
            apply(&mut info, MatAction::DeleteBookmark(1), 250),
            Some(MatPatch::Bookmarks(vec![100, 300]))
        );
        assert!(apply(&mut info, MatAction::DeleteBookmark(7), 250).is_none());
    }

    #[test]
    fn test_medical_open_move_close() {
        let mut info = MatInfo::default();
        assert!(apply(&mut info, MatAction::MedicalStop, 1000).is_none());

        apply(&mut info, MatAction::MedicalStart, 1000);
        assert_eq!(info.medicals, vec![(1000, MEDICAL_OPEN_END)]);

        // within the extended range: move the start back
        apply(&mut info, MatAction::MedicalStart, 985);
        assert_eq!(info.medicals, vec![(985, MEDICAL_OPEN_END)]);

        apply(&mut info, MatAction::MedicalStop, 1100);
        assert_eq!(info.medicals, vec![(985, 1100)]);

        // a second interval well after the first
        apply(&mut info, MatAction::MedicalStart, 2000);
        apply(&mut info, MatAction::MedicalStart, 500);
        assert_eq!(info.medicals, vec![(500, MEDICAL_OPEN_END), (985, 1100), (2000, MEDICAL_OPEN_END)]);
    }

    #[test]
    fn test_short_medical_deleted() {
        let mut info = MatInfo {
            bookmarks: vec![],
            medicals: vec![(1000, 1100)],
        };
        assert_eq!(apply(&mut info, MatAction::MedicalStop, 1003), Some(MatPatch::Medicals(vec![])));
    }

    fn editor() -> (Arc<PlaybackContext>, Arc<FakeCatalog>, MatEditor) {
        let ctx = PlaybackContext::with_capacity("d", 4);
        let catalog = Arc::new(FakeCatalog::new());
        let mut cams = CameraConfigs::new();
        cams.insert(3, CameraConfig { mat: 9, position: 1 });
        {
            let mut c = ctx.command.lock();
            c.cams = cams;
            c.active = Some(3);
        }
        let editor = MatEditor::new(Arc::clone(&ctx), catalog.clone());
        (ctx, catalog, editor)
    }

    #[test]
    fn test_edit_patches_loaded_mat() {
        let (ctx, catalog, editor) = editor();
        // nothing on screen yet
        assert!(!editor.edit(MatAction::AddBookmark).unwrap());
        {
            let mut o = ctx.overlay.lock();
            o.shown_ms = Some(123_456);
            o.loaded_mat = Some(9);
        }
        assert!(editor.edit(MatAction::AddBookmark).unwrap());
        assert_eq!(ctx.overlay.lock().mat.bookmarks, vec![123]);
        assert_eq!(
            catalog.patches.lock().unwrap().as_slice(),
            &[(9, MatPatch::Bookmarks(vec![123]))]
        );
    }

    #[test]
    fn test_edit_ignored_for_other_mat() {
        let (ctx, catalog, editor) = editor();
        {
            let mut o = ctx.overlay.lock();
            o.shown_ms = Some(5000);
            o.loaded_mat = Some(2);
        }
        assert!(!editor.edit(MatAction::MedicalStart).unwrap());
        assert!(catalog.patches.lock().unwrap().is_empty());
    }

    #[test]
    fn test_select_bookmark_seeks_and_plays() {
        let (ctx, _catalog, editor) = editor();
        ctx.overlay.lock().mat.bookmarks = vec![1_700_000_000];
        let handle = PlayerHandle::new(Arc::clone(&ctx));
        handle.set_speed(0);
        assert_eq!(editor.select_bookmark(&handle, 0), Some(1_700_000_000));
        assert_eq!(editor.select_bookmark(&handle, 4), None);
        let c = ctx.command.lock();
        assert_eq!(c.speed, Speed::PLAY);
        assert_eq!(c.seek, Some(1_700_000_000_000));
    }
}
