//! REST API implementation using rouille.
//!
//! # Key types
//!
//! - [`ApiServer`] - HTTP server runner, spawns background thread
//! - [`ApiCommand`] - commands sent to the housekeeping loop (speed, seek, camera, edits)
//! - [`SharedApiState`] - snapshots (status, mat, days) refreshed by the housekeeping loop
//!
//! # Thread safety
//!
//! - `SharedApiState` uses `RwLock` for each field - housekeeping writes, HTTP handlers read
//! - `ApiCommand` sent via `crossbeam_channel::Sender` - thread-safe, non-blocking
//! - CORS headers added to all responses for browser access

use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use rouille::{Request, Response};
use serde::Serialize;

use crate::catalog::types::MatInfo;
use crate::core::context::PlayerStatus;

/// Commands sent from API handlers to the housekeeping loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCommand {
    /// Speed level, negative for reverse
    SetSpeed(i32),
    /// Absolute seek, epoch milliseconds
    Seek(u64),
    /// Switch camera; `None` hides the video
    Camera(Option<u32>),
    /// Camera at a slot of the current mat (0-based)
    Position(usize),
    NextMat,
    /// Back to live play
    Restore,
    Stop,
    Day(String),
    BookmarkAdd,
    BookmarkDelete(usize),
    BookmarkPlay(usize),
    MedicalStart,
    MedicalStop,
    /// Place the current camera at `position` of `mat` for the current day
    AssignCamera { mat: u32, position: u32 },
    /// Delete the recordings of a day; only the selected day can be deleted
    DeleteDay(String),
    SetRecording(bool),
}

/// Shared state readable by API handlers
pub struct SharedApiState {
    pub status: RwLock<Option<PlayerStatus>>,
    pub mat: RwLock<MatInfo>,
    pub days: RwLock<Vec<String>>,
}

impl Default for SharedApiState {
    fn default() -> Self {
        Self {
            status: RwLock::new(None),
            mat: RwLock::new(MatInfo::default()),
            days: RwLock::new(Vec::new()),
        }
    }
}

/// Generic API response
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn ok() -> Self {
        Self { success: true, message: None, error: None }
    }

    fn ok_msg(msg: &str) -> Self {
        Self { success: true, message: Some(msg.to_string()), error: None }
    }

    fn err(msg: &str) -> Self {
        Self { success: false, message: None, error: Some(msg.to_string()) }
    }
}

/// Path parameter after `prefix`, with an optional fixed `suffix`
fn param<T: FromStr>(path: &str, prefix: &str, suffix: &str) -> Option<Result<T, ()>> {
    let rest = path.strip_prefix(prefix)?;
    let value = if suffix.is_empty() {
        rest
    } else {
        rest.strip_suffix(suffix)?
    };
    if value.is_empty() || value.contains('/') {
        return None;
    }
    Some(value.parse::<T>().map_err(|_| ()))
}

/// Two `/`-separated path parameters after `prefix`
fn param_pair<A: FromStr, B: FromStr>(path: &str, prefix: &str) -> Option<Result<(A, B), ()>> {
    let (a, b) = path.strip_prefix(prefix)?.split_once('/')?;
    if a.is_empty() || b.is_empty() || b.contains('/') {
        return None;
    }
    Some(match (a.parse::<A>(), b.parse::<B>()) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        _ => Err(()),
    })
}

fn bad_request(msg: &str) -> Response {
    Response::json(&ApiResponse::err(msg)).with_status_code(400)
}

/// REST API server
pub struct ApiServer {
    port: u16,
    state: Arc<SharedApiState>,
    command_tx: Sender<ApiCommand>,
}

impl ApiServer {
    /// Start the API server in a background thread.
    /// Returns the command receiver for the housekeeping loop to poll.
    pub fn start(port: u16, state: Arc<SharedApiState>) -> std::io::Result<Receiver<ApiCommand>> {
        let (tx, rx) = crossbeam_channel::unbounded();

        let server = ApiServer {
            port,
            state,
            command_tx: tx,
        };

        thread::Builder::new().name("segplay-api".into()).spawn(move || {
            server.run();
        })?;

        Ok(rx)
    }

    fn run(self) {
        let addr = format!("0.0.0.0:{}", self.port);
        log::info!("API server starting on http://{}", addr);

        let state = self.state;
        let tx = self.command_tx;

        match rouille::Server::new(&addr, move |request| Self::handle_request(request, &state, &tx)) {
            Ok(server) => server.run(),
            Err(e) => log::error!("API server failed to bind {}: {}", addr, e),
        }
    }

    /// Route one request. Path parameters are parsed by hand, the rest goes through `router!`.
    pub(crate) fn handle_request(
        request: &Request,
        state: &Arc<SharedApiState>,
        tx: &Sender<ApiCommand>,
    ) -> Response {
        // Handle preflight
        if request.method() == "OPTIONS" {
            return Response::empty_204()
                .with_additional_header("Access-Control-Allow-Origin", "*")
                .with_additional_header("Access-Control-Allow-Methods", "GET, POST, DELETE, OPTIONS")
                .with_additional_header("Access-Control-Allow-Headers", "Content-Type");
        }

        let response = Self::route_params(request, tx).unwrap_or_else(|| Self::route(request, state, tx));

        response.with_additional_header("Access-Control-Allow-Origin", "*")
    }

    fn route_params(request: &Request, tx: &Sender<ApiCommand>) -> Option<Response> {
        let path = request.url();
        let cmd = match request.method() {
            "POST" => {
                if let Some(level) = param::<i32>(&path, "/api/speed/", "") {
                    level.map(ApiCommand::SetSpeed).map_err(|_| "Invalid speed level")
                } else if let Some(ms) = param::<u64>(&path, "/api/seek/", "") {
                    ms.map(ApiCommand::Seek).map_err(|_| "Invalid seek time")
                } else if path == "/api/camera/none" {
                    Ok(ApiCommand::Camera(None))
                } else if let Some(cam) = param::<u32>(&path, "/api/camera/", "") {
                    cam.map(|c| ApiCommand::Camera(Some(c))).map_err(|_| "Invalid camera id")
                } else if let Some(slot) = param::<usize>(&path, "/api/position/", "") {
                    slot.map(ApiCommand::Position).map_err(|_| "Invalid position")
                } else if let Some(day) = param::<String>(&path, "/api/day/", "") {
                    day.map(ApiCommand::Day).map_err(|_| "Invalid day")
                } else if let Some(index) = param::<usize>(&path, "/api/bookmarks/", "/play") {
                    index.map(ApiCommand::BookmarkPlay).map_err(|_| "Invalid bookmark index")
                } else if let Some(slot) = param_pair::<u32, u32>(&path, "/api/assign/") {
                    slot.map(|(mat, position)| ApiCommand::AssignCamera { mat, position })
                        .map_err(|_| "Invalid mat or position")
                } else {
                    return None;
                }
            }
            "DELETE" => {
                if let Some(day) = param::<String>(&path, "/api/days/", "") {
                    day.map(ApiCommand::DeleteDay).map_err(|_| "Invalid day")
                } else {
                    let index = param::<usize>(&path, "/api/bookmarks/", "")?;
                    index.map(ApiCommand::BookmarkDelete).map_err(|_| "Invalid bookmark index")
                }
            }
            _ => return None,
        };
        Some(match cmd {
            Ok(cmd) => Self::send_command(tx, cmd),
            Err(msg) => bad_request(msg),
        })
    }

    fn route(request: &Request, state: &Arc<SharedApiState>, tx: &Sender<ApiCommand>) -> Response {
        rouille::router!(request,
            (GET) ["/api/status"] => {
                Self::get_status(state)
            },
            (GET) ["/api/mat"] => {
                Self::get_mat(state)
            },
            (GET) ["/api/days"] => {
                Self::get_days(state)
            },

            (POST) ["/api/mat/next"] => {
                Self::send_command(tx, ApiCommand::NextMat)
            },
            (POST) ["/api/restore"] => {
                Self::send_command(tx, ApiCommand::Restore)
            },
            (POST) ["/api/stop"] => {
                Self::send_command(tx, ApiCommand::Stop)
            },
            (POST) ["/api/bookmarks"] => {
                Self::send_command(tx, ApiCommand::BookmarkAdd)
            },
            (POST) ["/api/medical/start"] => {
                Self::send_command(tx, ApiCommand::MedicalStart)
            },
            (POST) ["/api/medical/stop"] => {
                Self::send_command(tx, ApiCommand::MedicalStop)
            },
            (POST) ["/api/recording/on"] => {
                Self::send_command(tx, ApiCommand::SetRecording(true))
            },
            (POST) ["/api/recording/off"] => {
                Self::send_command(tx, ApiCommand::SetRecording(false))
            },

            // Health check
            (GET) ["/api/health"] => {
                Response::json(&ApiResponse::ok_msg("segplay API server"))
            },

            // Fallback
            _ => {
                Response::json(&ApiResponse::err("Not found")).with_status_code(404)
            }
        )
    }

    fn get_status(state: &Arc<SharedApiState>) -> Response {
        let status = state.status.read().unwrap_or_else(|e| e.into_inner()).clone();
        match status {
            Some(s) => Response::json(&s),
            None => Response::json(&ApiResponse::err("Player not started")).with_status_code(503),
        }
    }

    fn get_mat(state: &Arc<SharedApiState>) -> Response {
        let mat = state.mat.read().unwrap_or_else(|e| e.into_inner()).clone();
        Response::json(&mat)
    }

    fn get_days(state: &Arc<SharedApiState>) -> Response {
        let days = state.days.read().unwrap_or_else(|e| e.into_inner()).clone();
        Response::json(&days)
    }

    fn send_command(tx: &Sender<ApiCommand>, cmd: ApiCommand) -> Response {
        match tx.send(cmd) {
            Ok(_) => Response::json(&ApiResponse::ok()),
            Err(e) => Response::json(&ApiResponse::err(&format!("Failed to send command: {}", e)))
                .with_status_code(500),
        }
    }
}
