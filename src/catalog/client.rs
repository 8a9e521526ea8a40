//! Blocking HTTP+JSON client for the catalog service.

use std::time::Duration;

use log::{debug, trace};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::types::{
    CameraConfig, CameraConfigs, ChunkGroup, MAX_DAYS, MatInfo, MatPatch, PlayerInfo, RecordingState, flatten_chunks,
};
use super::{Catalog, CatalogError};
use crate::core::chunk_index::ChunkEntry;

/// Per-call timeouts
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub quick: Duration,
    pub normal: Duration,
    pub slow: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            quick: Duration::from_secs(1),
            normal: Duration::from_secs(10),
            slow: Duration::from_secs(20),
            delete: Duration::from_secs(300),
        }
    }
}

pub struct CatalogClient {
    base: String,
    http: Client,
    timeouts: Timeouts,
}

impl From<reqwest::Error> for CatalogError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            CatalogError::Decode(e.to_string())
        } else {
            CatalogError::Http(e.to_string())
        }
    }
}

impl CatalogClient {
    pub fn new(base: &str, timeouts: Timeouts) -> Result<Self, CatalogError> {
        let http = Client::builder()
            .user_agent(concat!("segplay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            http,
            timeouts,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn send(&self, req: RequestBuilder, timeout: Duration) -> Result<Response, CatalogError> {
        let resp = req.timeout(timeout).send()?;
        trace!("{} -> {}", resp.url(), resp.status());
        Ok(resp)
    }

    /// GET returning `None` on a non-success status ("not ready").
    fn get_json<T: DeserializeOwned>(&self, path: &str, timeout: Duration) -> Result<Option<T>, CatalogError> {
        let resp = self.send(self.http.get(self.url(path)), timeout)?;
        if !resp.status().is_success() {
            debug!("GET {} -> {}", path, resp.status());
            return Ok(None);
        }
        Ok(Some(resp.json()?))
    }

    fn expect_success(resp: Response) -> Result<(), CatalogError> {
        let status = resp.status();
        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            Ok(())
        } else {
            Err(CatalogError::Status(status.as_u16()))
        }
    }
}

impl Catalog for CatalogClient {
    fn chunks(&self, day: &str, camera: u32) -> Result<Vec<ChunkEntry>, CatalogError> {
        let groups: Option<Vec<ChunkGroup>> = self.get_json(&format!("/chunks/{}/{}", day, camera), self.timeouts.normal)?;
        Ok(groups.map(flatten_chunks).unwrap_or_default())
    }

    fn cams(&self, day: &str) -> Result<CameraConfigs, CatalogError> {
        if day.is_empty() {
            return Ok(CameraConfigs::new());
        }
        let cams: Option<CameraConfigs> = self.get_json(&format!("/cams/{}", day), self.timeouts.slow)?;
        Ok(cams.unwrap_or_default())
    }

    fn days(&self) -> Result<Vec<String>, CatalogError> {
        let mut days: Vec<String> = self
            .get_json("/cams", self.timeouts.normal)?
            .ok_or(CatalogError::Status(StatusCode::NOT_FOUND.as_u16()))?;
        days.sort();
        days.truncate(MAX_DAYS);
        Ok(days)
    }

    fn assign_camera(&self, day: &str, camera: u32, config: CameraConfig) -> Result<(), CatalogError> {
        let req = self.http.post(self.url(&format!("/cams/{}/{}", day, camera))).json(&config);
        Self::expect_success(self.send(req, self.timeouts.slow)?)
    }

    fn delete_day(&self, day: &str) -> Result<(), CatalogError> {
        let req = self.http.delete(self.url(&format!("/cams/{}", day)));
        Self::expect_success(self.send(req, self.timeouts.delete)?)
    }

    fn mat(&self, day: &str, mat: u32) -> Result<MatInfo, CatalogError> {
        let info: Option<MatInfo> = self.get_json(&format!("/mats/{}/{}", day, mat), self.timeouts.quick)?;
        Ok(info.unwrap_or_default())
    }

    fn patch_mat(&self, day: &str, mat: u32, patch: &MatPatch) -> Result<(), CatalogError> {
        let req = self.http.patch(self.url(&format!("/mats/{}/{}", day, mat))).json(patch);
        Self::expect_success(self.send(req, self.timeouts.slow)?)
    }

    fn player_camera(&self, player: &str) -> Result<Option<u32>, CatalogError> {
        let info: Option<PlayerInfo> = self.get_json(&format!("/players/{}", player), self.timeouts.quick)?;
        Ok(info.and_then(|p| p.camid).filter(|&c| c != 0))
    }

    fn set_player_camera(&self, player: &str, camera: Option<u32>) -> Result<(), CatalogError> {
        let req = self
            .http
            .post(self.url(&format!("/players/{}", player)))
            .json(&json!({ "camid": camera.unwrap_or(0) }));
        Self::expect_success(self.send(req, self.timeouts.quick)?)
    }

    fn recording(&self) -> Result<bool, CatalogError> {
        let state: Option<RecordingState> = self.get_json("/recording", self.timeouts.normal)?;
        Ok(state.map(|s| s.recording).unwrap_or(false))
    }

    fn set_recording(&self, on: bool) -> Result<(), CatalogError> {
        let req = self.http.put(self.url("/recording")).json(&RecordingState { recording: on });
        Self::expect_success(self.send(req, self.timeouts.normal)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Serve canned catalog responses on an ephemeral port; returns base URI and stop handle.
    fn fake_catalog(log: Arc<Mutex<Vec<String>>>) -> (String, std::sync::mpsc::Sender<()>) {
        let server = rouille::Server::new("127.0.0.1:0", move |request| {
            let body = request.data().map(|mut d| {
                let mut s = String::new();
                let _ = std::io::Read::read_to_string(&mut d, &mut s);
                s
            });
            log.lock()
                .unwrap()
                .push(format!("{} {} {}", request.method(), request.url(), body.unwrap_or_default()));
            match (request.method(), request.url().as_str()) {
                ("GET", "/chunks/2024-05-01/3") => rouille::Response::json(&json!([
                    {"srvid": 1, "ts": ["1f40", "fa0"]},
                    {"srvid": 2, "ts": ["2ee0"]}
                ])),
                ("GET", "/cams/2024-05-01") => rouille::Response::json(&json!({"3": {"mat": 1, "position": 2}})),
                ("GET", "/cams") => rouille::Response::json(&json!(["2024-05-02", "2024-05-01"])),
                ("GET", "/mats/2024-05-01/1") => rouille::Response::json(&json!({"bookmarks": [7], "medicals": [1, 9]})),
                ("GET", "/players/4") => rouille::Response::json(&json!({"camid": 3})),
                ("GET", "/recording") => rouille::Response::json(&json!({"recording": true})),
                ("PATCH", _) | ("POST", _) | ("PUT", _) | ("DELETE", _) => rouille::Response::text("ok"),
                _ => rouille::Response::empty_404(),
            }
        })
        .unwrap();
        let base = format!("http://{}", server.server_addr());
        let (_handle, stop) = server.stoppable();
        (base, stop)
    }

    #[test]
    fn test_catalog_roundtrip() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (base, stop) = fake_catalog(Arc::clone(&log));
        let client = CatalogClient::new(&format!("{}/", base), Timeouts::default()).unwrap();

        let chunks = client.chunks("2024-05-01", 3).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.contains(&ChunkEntry::new(0x2ee0, 2)));

        // unknown camera is "not ready", not an error
        assert!(client.chunks("2024-05-01", 9).unwrap().is_empty());

        assert_eq!(client.cams("2024-05-01").unwrap().mat_of(3), Some(1));
        assert_eq!(client.days().unwrap(), vec!["2024-05-01", "2024-05-02"]);
        assert_eq!(client.mat("2024-05-01", 1).unwrap().medicals, vec![(1, 9)]);
        assert_eq!(client.player_camera("4").unwrap(), Some(3));
        assert!(client.recording().unwrap());

        client
            .patch_mat("2024-05-01", 1, &MatPatch::Bookmarks(vec![7, 8]))
            .unwrap();
        client.set_player_camera("4", None).unwrap();
        client
            .assign_camera("2024-05-01", 3, CameraConfig { mat: 1, position: 2 })
            .unwrap();
        client.delete_day("2024-05-01").unwrap();
        client.set_recording(false).unwrap();

        let log = log.lock().unwrap();
        assert!(log.iter().any(|l| l == r#"POST /cams/2024-05-01/3 {"mat":1,"position":2}"#));
        assert!(log.iter().any(|l| l.trim_end() == "DELETE /cams/2024-05-01"));
        assert!(log.iter().any(|l| l == r#"PUT /recording {"recording":false}"#));
        assert!(log.iter().any(|l| l == r#"PATCH /mats/2024-05-01/1 {"bookmarks":[7,8]}"#));
        assert!(log.iter().any(|l| l == r#"POST /players/4 {"camid":0}"#));
        let _ = stop.send(());
    }

    #[test]
    fn test_unreachable_is_error() {
        let timeouts = Timeouts {
            quick: Duration::from_millis(200),
            ..Timeouts::default()
        };
        let client = CatalogClient::new("http://127.0.0.1:1", timeouts).unwrap();
        assert!(matches!(client.player_camera("1"), Err(CatalogError::Http(_))));
    }
}
