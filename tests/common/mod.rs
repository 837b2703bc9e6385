//! Mock tools and launchers shared by the integration tests

#![allow(dead_code)]

use airpanel::{IoMode, Launcher, ModeProbe, ProcessHandle, SessionConfig, SessionError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const TARGET_BSSID: &str = "00:11:22:33:44:55";

/// airodump-style dump: three named APs, one hidden AP, three stations
pub const DUMP: &str = "\
\r
BSSID, First time seen, Last time seen, channel, Speed, Privacy, Cipher, Authentication, Power, # beacons, # IV, LAN IP, ID-length, ESSID, Key\r
00:11:22:33:44:55, 2024-01-01 10:00:00, 2024-01-01 10:00:05,  6,  54, WPA2, CCMP, PSK, -40,       10,        0,   0.0.0.0,  10, HomeRouter, \r
66:77:88:99:AA:BB, 2024-01-01 10:00:00, 2024-01-01 10:00:05, 11,  54, WPA2, CCMP, PSK, -67,       22,        0,   0.0.0.0,   4, Cafe, \r
11:22:33:44:55:66, 2024-01-01 10:00:00, 2024-01-01 10:00:05,  1,  54, OPN,      ,    , -80,        3,        0,   0.0.0.0,   7, Airport, \r
22:33:44:55:66:77, 2024-01-01 10:00:00, 2024-01-01 10:00:05,  3,  54, WPA2, CCMP, PSK, -75,        5,        0,   0.0.0.0,   0, , \r
\r
Station MAC, First time seen, Last time seen, Power, # packets, BSSID, Probed ESSIDs\r
AA:BB:CC:DD:EE:01, 2024-01-01 10:00:00, 2024-01-01 10:00:05, -55,       40, 00:11:22:33:44:55, \r
AA:BB:CC:DD:EE:02, 2024-01-01 10:00:00, 2024-01-01 10:00:05, -71,        6, (not associated), Cafe, Office\r
AA:BB:CC:DD:EE:03, 2024-01-01 10:00:00, 2024-01-01 10:00:05, -62,       12, 66:77:88:99:AA:BB, \r
\r
";

/// Temp directories for the mock tools and for the session work dir
pub struct Fixture {
    pub tools: TempDir,
    pub work: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            tools: tempfile::tempdir().unwrap(),
            work: tempfile::tempdir().unwrap(),
        }
    }

    /// Scanner that copies [`DUMP`] to `<prefix>-01.csv`, then idles
    pub fn writing_scanner(&self) -> Vec<String> {
        let dump = self.tools.path().join("dump.csv");
        std::fs::write(&dump, DUMP).unwrap();
        self.script(
            "writing-scanner.sh",
            &format!(
                "prefix=\"\"\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"-w\" ]; then prefix=\"$2\"; fi\n  shift\ndone\ncp '{}' \"$prefix-01.csv\"\nexec sleep 30\n",
                dump.display()
            ),
        )
    }

    /// Scanner that never writes a capture file
    pub fn silent_scanner(&self) -> Vec<String> {
        self.script("silent-scanner.sh", "exec sleep 30\n")
    }

    /// Scanner that exits right away
    pub fn crashing_scanner(&self) -> Vec<String> {
        self.script("crashing-scanner.sh", "exit 1\n")
    }

    /// Run through `sh` so the script never has to be executable
    fn script(&self, name: &str, body: &str) -> Vec<String> {
        let path = self.tools.path().join(name);
        std::fs::write(&path, body).unwrap();
        vec!["sh".to_string(), path.to_string_lossy().into_owned()]
    }

    pub fn config(&self, scanner: Vec<String>) -> SessionConfig {
        SessionConfig::new("wlan1")
            .with_scanner(scanner)
            // Unique name so the kill-by-name sweep never matches a real process
            .with_flooder(vec!["airpanel-test-flooder".to_string()])
            .with_work_dir(self.work.path())
            .with_poll_interval(Duration::from_millis(50))
            .with_grace_period(Duration::from_secs(1))
            .with_launch_stagger(Duration::from_millis(10))
            .with_status_interval(Duration::from_millis(50))
    }

    pub fn work_files(&self) -> Vec<PathBuf> {
        list(self.work.path())
    }
}

pub fn list(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    files.sort();
    files
}

pub struct AlwaysReady;

impl ModeProbe for AlwaysReady {
    fn is_ready(&self, _interface: &str) -> bool {
        true
    }
}

pub struct NeverReady;

impl ModeProbe for NeverReady {
    fn is_ready(&self, _interface: &str) -> bool {
        false
    }
}

/// Spawns real processes and counts every launch attempt
#[derive(Default)]
pub struct CountingLauncher {
    pub launches: AtomicUsize,
}

impl CountingLauncher {
    pub fn count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl Launcher for CountingLauncher {
    fn launch(&self, argv: &[String], io: IoMode) -> Result<ProcessHandle, SessionError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        ProcessHandle::start(argv, io)
    }
}

/// Stands in for the flooder: launch `fail_on` (1-based) fails, every
/// other launch runs `sleep 30` and records its pid
pub struct FlakyLauncher {
    fail_on: usize,
    calls: AtomicUsize,
    pub argv: Mutex<Vec<Vec<String>>>,
    pub pids: Mutex<Vec<u32>>,
}

impl FlakyLauncher {
    pub fn failing_on(fail_on: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_on,
            calls: AtomicUsize::new(0),
            argv: Mutex::new(Vec::new()),
            pids: Mutex::new(Vec::new()),
        })
    }
}

impl Launcher for FlakyLauncher {
    fn launch(&self, argv: &[String], io: IoMode) -> Result<ProcessHandle, SessionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.argv.lock().unwrap().push(argv.to_vec());
        if call == self.fail_on {
            return Err(SessionError::SpawnFailed(format!("launch {} refused", call)));
        }

        let process = ProcessHandle::start(&["sleep".to_string(), "30".to_string()], io)?;
        if let Some(pid) = process.pid() {
            self.pids.lock().unwrap().push(pid);
        }
        Ok(process)
    }
}

/// Runs `sleep 30` for every launch, then blocks the caller for `delay`
/// so a start stays in progress long enough to be stopped. `launched` is
/// notified once the first process is up.
pub struct SlowLauncher {
    delay: Duration,
    pub launched: tokio::sync::Notify,
    pub pids: Mutex<Vec<u32>>,
}

impl SlowLauncher {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            launched: tokio::sync::Notify::new(),
            pids: Mutex::new(Vec::new()),
        })
    }
}

impl Launcher for SlowLauncher {
    fn launch(&self, _argv: &[String], io: IoMode) -> Result<ProcessHandle, SessionError> {
        let process = ProcessHandle::start(&["sleep".to_string(), "30".to_string()], io)?;
        if let Some(pid) = process.pid() {
            self.pids.lock().unwrap().push(pid);
        }
        self.launched.notify_one();
        std::thread::sleep(self.delay);
        Ok(process)
    }
}

/// Whether a pid still exists (zombies included)
pub fn pid_exists(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}
