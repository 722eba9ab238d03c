//! IPC module for daemon to speech host and UI communication

mod adapter;
mod protocol;
mod server;

pub use adapter::IpcSessionAdapter;
pub use protocol::{DaemonStatus, Notification, Request, Response, SessionCommand, MAX_FRAME_LEN};
pub use server::{read_frame, relay_engine_events, write_frame, Server};
