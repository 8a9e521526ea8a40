//! Application wiring: playback context, Commander thread, control API and the
//! housekeeping loop that keeps camera configuration, annotations and snapshots current.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, error, info, warn};

use crate::catalog::Catalog;
use crate::catalog::types::{CameraConfig, MAX_CAM, MAX_DAYS};
use crate::config::{self, Config};
use crate::core::commander::Commander;
use crate::core::context::{PlaybackContext, PlayerHandle};
use crate::core::workers::Services;
use crate::mats::{MatAction, MatEditor};
use crate::server::{ApiCommand, ApiServer, SharedApiState};

/// Housekeeping period
pub const HOUSEKEEPING_INTERVAL: Duration = Duration::from_millis(500);

pub struct App {
    ctx: Arc<PlaybackContext>,
    handle: PlayerHandle,
    services: Services,
    editor: MatEditor,
    api_state: Arc<SharedApiState>,
    commands: Option<Receiver<ApiCommand>>,
    player_id: Option<String>,
    today: String,
    commander: Option<JoinHandle<()>>,
    /// Day deletion in progress; runs long, so it is never joined
    deleting: Option<JoinHandle<()>>,
}

/// Publish the recorded days, newest listing from the catalog
fn refresh_days(catalog: &dyn Catalog, state: &SharedApiState) {
    match catalog.days() {
        Ok(mut days) => {
            days.truncate(MAX_DAYS);
            *state.days.write().unwrap_or_else(|e| e.into_inner()) = days;
        }
        Err(e) => warn!("Day list: {}", e),
    }
}

impl App {
    pub fn new(cfg: &Config, services: Services) -> Self {
        let ctx = PlaybackContext::new(cfg.day_or_today());
        let handle = PlayerHandle::new(Arc::clone(&ctx));
        let editor = MatEditor::new(Arc::clone(&ctx), Arc::clone(&services.catalog));
        Self {
            ctx,
            handle,
            services,
            editor,
            api_state: Arc::new(SharedApiState::default()),
            commands: None,
            player_id: cfg.player_id_or_host(),
            today: config::today(),
            commander: None,
            deleting: None,
        }
    }

    pub fn handle(&self) -> &PlayerHandle {
        &self.handle
    }

    /// Attach a command source (normally the API server)
    pub fn with_commands(mut self, rx: Receiver<ApiCommand>) -> Self {
        self.commands = Some(rx);
        self
    }

    pub fn start_api(&mut self, port: u16) -> Result<()> {
        let rx = ApiServer::start(port, Arc::clone(&self.api_state)).context("Failed to spawn API server thread")?;
        self.commands = Some(rx);
        Ok(())
    }

    fn is_today(&self) -> bool {
        self.handle.day() == self.today
    }

    /// Load camera configs, pick the initial camera and start the Commander thread.
    pub fn start(&mut self) -> Result<()> {
        self.reload_cams();
        refresh_days(self.services.catalog.as_ref(), &self.api_state);
        if self.is_today() {
            if let Some(id) = &self.player_id {
                match self.services.catalog.player_camera(id) {
                    Ok(Some(cam)) if self.ctx.command.lock().cams.get(cam).is_some() => {
                        info!("Player {} starts on camera {}", id, cam);
                        self.handle.switch_camera(Some(cam));
                    }
                    Ok(Some(cam)) => warn!("Player {} camera {} is not configured", id, cam),
                    Ok(None) => debug!("Player {} has no camera assigned", id),
                    Err(e) => warn!("Player camera for {}: {}", id, e),
                }
            }
        }

        let commander = Commander::new(Arc::clone(&self.ctx), self.services.clone());
        let h = thread::Builder::new()
            .name("segplay-commander".into())
            .spawn(move || commander.run())
            .context("Failed to spawn commander thread")?;
        self.commander = Some(h);
        Ok(())
    }

    /// Replace camera configs when they changed; drop to "no camera" if the active one vanished.
    fn reload_cams(&self) {
        let day = self.handle.day();
        let cams = match self.services.catalog.cams(&day) {
            Ok(c) => c,
            Err(e) => {
                warn!("Camera config for {}: {}", day, e);
                return;
            }
        };
        let (changed, lost) = {
            let c = self.ctx.command.lock();
            let lost = c.active.is_some_and(|cam| cams.get(cam).is_none()) && c.requested == c.active;
            (c.cams != cams, lost)
        };
        if changed {
            debug!("Camera config for {} changed ({} cameras)", day, cams.len());
            self.handle.set_cams(cams);
        }
        if lost {
            info!("Active camera no longer configured");
            self.handle.switch_camera(None);
        }
    }

    /// Place the requested camera at `position` of `mat` on the current day.
    fn assign_camera(&self, mat: u32, position: u32) {
        if !(1..=MAX_CAM).contains(&position) {
            warn!("Position {} out of range", position);
            return;
        }
        let Some(cam) = self.ctx.command.lock().requested else {
            debug!("No camera to assign");
            return;
        };
        let day = self.handle.day();
        info!("Assign cam {} to mat {} position {} on {}", cam, mat, position, day);
        match self.services.catalog.assign_camera(&day, cam, CameraConfig { mat, position }) {
            Ok(()) => self.reload_cams(),
            Err(e) => warn!("Assigning cam {}: {}", cam, e),
        }
    }

    /// Delete the recordings of the selected day in the background, then drop the stream
    /// and republish the day list.
    fn delete_day(&mut self, day: String) {
        if day != self.handle.day() {
            warn!("Only the selected day can be deleted ({} requested)", day);
            return;
        }
        if self.deleting.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!("A day deletion is already running");
            return;
        }
        let catalog = Arc::clone(&self.services.catalog);
        let state = Arc::clone(&self.api_state);
        let handle = self.handle.clone();
        info!("Deleting day {}", day);
        let spawned = thread::Builder::new().name("segplay-delete".into()).spawn(move || {
            match catalog.delete_day(&day) {
                Ok(()) => {
                    info!("Day {} deleted", day);
                    if handle.day() == day {
                        handle.switch_camera(None);
                    }
                }
                Err(e) => error!("Deleting day {}: {}", day, e),
            }
            refresh_days(catalog.as_ref(), &state);
        });
        match spawned {
            Ok(h) => self.deleting = Some(h),
            Err(e) => error!("Failed to spawn delete thread: {}", e),
        }
    }

    fn set_recording(&self, on: bool) {
        match self.services.catalog.set_recording(on) {
            Ok(()) => {
                info!("Recording {}", if on { "started" } else { "stopped" });
                self.ctx.overlay.lock().recording = on;
            }
            Err(e) => warn!("Recording toggle: {}", e),
        }
    }

    fn remember_camera(&self, camera: Option<u32>) {
        if !self.is_today() {
            return;
        }
        if let Some(id) = &self.player_id {
            if let Err(e) = self.services.catalog.set_player_camera(id, camera) {
                warn!("Saving camera of player {}: {}", id, e);
            }
        }
    }

    fn edit(&self, action: MatAction) {
        if let Err(e) = self.editor.edit(action) {
            warn!("Mat edit {:?}: {}", action, e);
        }
    }

    /// Execute one API command. Returns false on stop.
    pub fn handle_command(&mut self, cmd: ApiCommand) -> bool {
        debug!("API command {:?}", cmd);
        match cmd {
            ApiCommand::SetSpeed(level) => self.handle.set_speed(level),
            ApiCommand::Seek(ms) => self.handle.seek(ms),
            ApiCommand::Camera(cam) => {
                self.handle.switch_camera(cam);
                self.remember_camera(cam);
            }
            ApiCommand::Position(slot) => {
                if let Some(cam) = self.handle.select_position(slot) {
                    self.remember_camera(Some(cam));
                }
            }
            ApiCommand::NextMat => {
                if let Some(cam) = self.handle.next_mat() {
                    self.remember_camera(Some(cam));
                }
            }
            ApiCommand::Restore => self.handle.restore(),
            ApiCommand::Day(day) => {
                self.handle.select_day(&day);
                self.reload_cams();
            }
            ApiCommand::BookmarkAdd => self.edit(MatAction::AddBookmark),
            ApiCommand::BookmarkDelete(i) => self.edit(MatAction::DeleteBookmark(i)),
            ApiCommand::BookmarkPlay(i) => {
                self.editor.select_bookmark(&self.handle, i);
            }
            ApiCommand::MedicalStart => self.edit(MatAction::MedicalStart),
            ApiCommand::MedicalStop => self.edit(MatAction::MedicalStop),
            ApiCommand::AssignCamera { mat, position } => self.assign_camera(mat, position),
            ApiCommand::DeleteDay(day) => self.delete_day(day),
            ApiCommand::SetRecording(on) => self.set_recording(on),
            ApiCommand::Stop => return false,
        }
        true
    }

    /// One housekeeping pass
    pub fn housekeep(&self) {
        let pending = self.ctx.command.lock().switch_pending();
        if !pending {
            self.reload_cams();
            if let Err(e) = self.editor.reload() {
                debug!("Mat reload: {}", e);
            }
        }
        match self.services.catalog.recording() {
            Ok(on) => self.ctx.overlay.lock().recording = on,
            Err(e) => debug!("Recording state: {}", e),
        }

        *self.api_state.status.write().unwrap_or_else(|e| e.into_inner()) = Some(self.handle.status());
        let mat = self.ctx.overlay.lock().mat.clone();
        *self.api_state.mat.write().unwrap_or_else(|e| e.into_inner()) = mat;
    }

    /// Housekeeping loop; returns when a stop command arrives or the player is stopped.
    pub fn run(mut self) -> Result<()> {
        self.start()?;
        let commands = self.commands.take();
        while !self.ctx.is_stopping() {
            let cmd = match &commands {
                Some(rx) => match rx.recv_timeout(HOUSEKEEPING_INTERVAL) {
                    Ok(cmd) => Some(cmd),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => {
                        error!("Command channel closed");
                        break;
                    }
                },
                None => {
                    self.ctx.stop_token().sleep(HOUSEKEEPING_INTERVAL);
                    None
                }
            };
            match cmd {
                Some(cmd) => {
                    if !self.handle_command(cmd) {
                        break;
                    }
                    // drain the burst before the next pass
                    if let Some(rx) = &commands {
                        let mut stop = false;
                        for cmd in rx.try_iter() {
                            if !self.handle_command(cmd) {
                                stop = true;
                                break;
                            }
                        }
                        if stop {
                            break;
                        }
                    }
                }
                None => self.housekeep(),
            }
        }
        self.shutdown();
        Ok(())
    }

    pub fn shutdown(&mut self) {
        self.handle.stop();
        if let Some(h) = self.commander.take() {
            if h.join().is_err() {
                error!("Commander thread panicked");
            }
        }
        info!("Player stopped");
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if self.commander.is_some() {
            self.shutdown();
        }
    }
}
