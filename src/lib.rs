//! Airpanel - session lifecycle manager for wireless audit tools
//!
//! Drives airodump-ng style scanners and mdk4 style beacon flooders as
//! supervised child processes: timed network scans, passive station recon
//! against a selected network, and multi-process beacon floods.

pub mod config;
pub mod error;
pub mod manager;
pub mod monitor;
pub mod output;
pub mod parser;
pub mod process;
pub mod records;
pub mod session;
pub mod target;

// Re-export commonly used types
pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use manager::SessionManager;
pub use monitor::{ModeProbe, ModeStrategy, MonitorControl, SysfsModeProbe};
pub use parser::{CsvScanParser, ScanDump};
pub use process::{IoMode, Launcher, ProcessHandle, SystemLauncher};
pub use records::{NetworkRecord, StationRecord, StationSnapshot};
pub use session::{SessionKind, SessionState};
pub use target::{TargetKind, TargetSelection};

pub type Result<T> = std::result::Result<T, SessionError>;
