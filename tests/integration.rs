//! Integration tests for aios.
//!
//! Daemon tests run the real accept loop on a temporary Unix socket with
//! translation disabled, so no network access is needed.

use std::process::Command;

fn aios() -> Command {
    Command::new(env!("CARGO_BIN_EXE_aios"))
}

#[test]
fn test_version_flag() {
    let output = aios().arg("--version").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains(env!("CARGO_PKG_VERSION")),
        "unexpected version output: {stdout}"
    );
}

#[cfg(unix)]
#[test]
fn test_config_path_uses_home() {
    let home = tempfile::tempdir().unwrap();
    let output = aios()
        .args(["config", "path"])
        .env("HOME", home.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        home.path().join(".aios").join("config.toml").display().to_string()
    );
}

#[cfg(unix)]
#[test]
fn test_config_show_redacts_keys() {
    let home = tempfile::tempdir().unwrap();
    let dir = home.path().join(".aios");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("config.toml"),
        "[provider.gemini]\napi_key = \"very-secret\"\n",
    )
    .unwrap();

    let output = aios()
        .args(["config", "show"])
        .env("HOME", home.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("very-secret"));
    assert!(stdout.contains("gemini-2.0-flash"));
}

#[cfg(unix)]
#[test]
fn test_send_without_daemon() {
    let home = tempfile::tempdir().unwrap();
    let dir = home.path().join(".aios");
    std::fs::create_dir_all(&dir).unwrap();
    let socket = home.path().join("nobody-listens.sock");
    std::fs::write(
        dir.join("config.toml"),
        format!("[daemon]\nsocket_path = \"{}\"\n", socket.display()),
    )
    .unwrap();

    let output = aios()
        .args(["send", "echo", "hi"])
        .env("HOME", home.path())
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Daemon not running"), "got: {stdout}");
}

#[cfg(unix)]
mod daemon {
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread::JoinHandle;
    use std::time::{Duration, Instant};

    use aios::config::{Config, Endpoint};
    use aios::history::{HistoryLog, HistoryStore};

    struct RunningDaemon {
        config: Config,
        socket: PathBuf,
        shutdown: Arc<AtomicBool>,
        handle: Option<JoinHandle<anyhow::Result<()>>>,
        _dir: tempfile::TempDir,
    }

    impl RunningDaemon {
        fn start() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let socket = dir.path().join("aios.sock");
            let mut config = Config::default();
            config.provider.default = "disabled".into();
            config.daemon.socket_path = Some(socket.clone());
            config.db.path = Some(dir.path().join("history.db"));

            let shutdown = Arc::new(AtomicBool::new(false));
            let handle = {
                let config = config.clone();
                let shutdown = Arc::clone(&shutdown);
                std::thread::spawn(move || aios::daemon::run_daemon_until(&config, shutdown))
            };

            let deadline = Instant::now() + Duration::from_secs(10);
            while !socket.exists() {
                assert!(Instant::now() < deadline, "daemon did not bind in time");
                std::thread::sleep(Duration::from_millis(20));
            }
            Self {
                config,
                socket,
                shutdown,
                handle: Some(handle),
                _dir: dir,
            }
        }

        fn endpoint(&self) -> Endpoint {
            Endpoint::Unix(self.socket.clone())
        }

        fn send(&self, line: &str) -> String {
            aios::client::send_request(&self.endpoint(), line, |prompt| {
                panic!("unexpected confirmation prompt: {prompt}")
            })
        }

        fn history(&self) -> HistoryStore {
            HistoryStore::open(&self.config.db.effective_path(), 1000).unwrap()
        }

        fn stop(mut self) -> PathBuf {
            self.shutdown.store(true, Ordering::Relaxed);
            if let Some(handle) = self.handle.take() {
                handle.join().unwrap().unwrap();
            }
            self.socket.clone()
        }
    }

    impl Drop for RunningDaemon {
        fn drop(&mut self) {
            self.shutdown.store(true, Ordering::Relaxed);
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

    #[test]
    fn test_request_round_trip_and_history() {
        let daemon = RunningDaemon::start();

        assert_eq!(daemon.send("echo hello world"), "hello world");

        let user = aios::history::current_user_id();
        let records = daemon.history().query(user, 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].command, "echo hello world");
        assert_eq!(records[0].success, Some(true));
        assert_eq!(records[0].result.as_deref(), Some("hello world"));
    }

    #[test]
    fn test_unknown_command_gets_suggestion() {
        let daemon = RunningDaemon::start();
        let out = daemon.send("hlep");
        assert!(out.starts_with("'hlep' is not available."), "got: {out}");
        assert!(out.contains("'help'"));
    }

    #[test]
    fn test_empty_payload_closes_without_effect() {
        let daemon = RunningDaemon::start();

        let mut stream = UnixStream::connect(&daemon.socket).unwrap();
        stream.shutdown(std::net::Shutdown::Write).unwrap();
        let mut reply = String::new();
        stream.read_to_string(&mut reply).unwrap();

        assert_eq!(reply, "");
        let user = aios::history::current_user_id();
        assert!(daemon.history().query(user, 10).unwrap().is_empty());
    }

    #[test]
    fn test_sessions_are_served_one_at_a_time() {
        let daemon = RunningDaemon::start();

        // First connection is accepted but holds the daemon by not sending yet.
        let mut first = UnixStream::connect(&daemon.socket).unwrap();

        let endpoint = daemon.endpoint();
        let second = std::thread::spawn(move || {
            aios::client::send_request(&endpoint, "echo second", |_| Ok(String::new()))
        });

        std::thread::sleep(Duration::from_millis(300));
        assert!(!second.is_finished(), "second session served while first was open");
        first.write_all(b"echo first\n").unwrap();
        let mut first_reply = String::new();
        first.read_to_string(&mut first_reply).unwrap();

        assert_eq!(first_reply, "first");
        assert_eq!(second.join().unwrap(), "second");

        let user = aios::history::current_user_id();
        let mut records = daemon.history().query(user, 10).unwrap();
        records.sort_by_key(|r| r.id);
        let commands: Vec<_> = records.iter().map(|r| r.command.as_str()).collect();
        assert_eq!(commands, vec!["echo first", "echo second"]);
    }

    #[test]
    fn test_shutdown_removes_socket() {
        let daemon = RunningDaemon::start();
        assert_eq!(daemon.send("echo up"), "up");
        let socket = daemon.stop();
        assert!(!socket.exists());
    }

    #[test]
    fn test_bind_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.provider.default = "disabled".into();
        // A socket path inside a regular file cannot be created.
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        config.daemon.socket_path = Some(blocker.join("aios.sock"));
        config.db.path = Some(dir.path().join("history.db"));

        let result = aios::daemon::run_daemon_until(&config, Arc::new(AtomicBool::new(false)));
        assert!(result.is_err());
    }

    #[test]
    fn test_db_open_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.provider.default = "disabled".into();
        config.daemon.socket_path = Some(dir.path().join("aios.sock"));
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        config.db.path = Some(blocker.join("history.db"));

        let result = aios::daemon::run_daemon_until(&config, Arc::new(AtomicBool::new(false)));
        assert!(result.is_err());
        assert!(!dir.path().join("aios.sock").exists());
    }
}
