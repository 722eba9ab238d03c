//! Adapter module for the native speech recognizer
//!
//! Only the contract lives here; implementations belong to the host
//! (see `ipc::IpcSessionAdapter` for the daemon's).

mod session;

pub use session::{AdapterEvent, SessionAdapter, SessionEvent, SessionOptions};
