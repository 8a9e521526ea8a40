//! REST API server for remote control of the kiosk player.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────┐   crossbeam channel    ┌──────────────────────────┐
//! │   API Server Thread     │  ──── ApiCommand ───▶  │   Housekeeping loop      │
//! │   (rouille HTTP)        │                        │   (app::App::run)        │
//! │                         │                        │                          │
//! │  POST /api/speed/-9     │  ──▶ SetSpeed(-9) ──▶  │  handle.set_speed(-9)    │
//! │  POST /api/bookmarks    │  ──▶ BookmarkAdd ───▶  │  editor.edit(AddBookmark)│
//! └─────────────────────────┘                        └──────────────────────────┘
//!          │                                                      │
//!          │  Arc<SharedApiState>                                 │
//!          │◀──────────── read snapshots ─────────────────────────│
//!          │                                           updates every 500 ms
//! ```
//!
//! # Endpoints
//!
//! | Method | Path                        | Description                        |
//! |--------|-----------------------------|------------------------------------|
//! | GET    | `/api/health`               | Health check                       |
//! | GET    | `/api/status`               | Speed, camera, day, shown time, cache |
//! | GET    | `/api/mat`                  | Bookmarks and medicals of the loaded mat |
//! | GET    | `/api/days`                 | Recorded days                      |
//! | POST   | `/api/speed/{level}`        | Set speed level (-9..=9)           |
//! | POST   | `/api/seek/{ms}`            | Seek to epoch milliseconds         |
//! | POST   | `/api/camera/{id}`          | Switch camera                      |
//! | POST   | `/api/camera/none`          | Hide video                         |
//! | POST   | `/api/position/{n}`         | Camera at slot n of the current mat |
//! | POST   | `/api/mat/next`             | First camera of the next mat       |
//! | POST   | `/api/restore`              | Live play (now - 5 s)              |
//! | POST   | `/api/day/{day}`            | Switch recording day               |
//! | POST   | `/api/bookmarks`            | Bookmark the shown second          |
//! | POST   | `/api/bookmarks/{i}/play`   | Play from bookmark i               |
//! | DELETE | `/api/bookmarks/{i}`        | Delete bookmark i (when on screen) |
//! | POST   | `/api/medical/start`        | Start or move a medical interval   |
//! | POST   | `/api/medical/stop`         | Stop or move a medical interval    |
//! | POST   | `/api/assign/{mat}/{pos}`   | Place the current camera on a mat  |
//! | DELETE | `/api/days/{day}`           | Delete the selected day's recordings |
//! | POST   | `/api/recording/on`         | Resume recording                   |
//! | POST   | `/api/recording/off`        | Pause recording                    |
//! | POST   | `/api/stop`                 | Stop the player                    |

mod api;

pub use api::{ApiCommand, ApiServer, SharedApiState};
