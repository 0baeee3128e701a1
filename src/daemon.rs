//! The aios daemon: a strictly sequential accept loop over a local socket.
//!
//! Each accepted connection is one session. The session reads a single
//! request line, translates it once, asks for confirmation when both the
//! translator and the denylist call the candidate risky, logs the raw input,
//! executes, replies and closes. Faults inside a session are reported to that
//! client as `Server error: ...` and never stop the loop.

use std::io::{BufReader, Write};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{Config, DaemonConfig, Endpoint};
use crate::engine::Engine;
use crate::history::{HistoryLog, HistoryStore, NewHistoryEntry};
use crate::protocol::{self, ConfirmOutcome, SessionStream};

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Daemon {
    engine: Engine,
    history: Arc<dyn HistoryLog>,
    user_id: i64,
    config: DaemonConfig,
}

impl Daemon {
    pub fn new(
        engine: Engine,
        history: Arc<dyn HistoryLog>,
        user_id: i64,
        config: DaemonConfig,
    ) -> Self {
        Self {
            engine,
            history,
            user_id,
            config,
        }
    }

    /// Serve one connection to completion. Never panics and never fails.
    pub fn serve_connection<S: SessionStream>(&mut self, stream: S) {
        let mut reader = BufReader::new(stream);
        let outcome =
            std::panic::catch_unwind(AssertUnwindSafe(|| self.handle_session(&mut reader)));
        let message = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };
        tracing::warn!("session failed: {message}");
        let stream = reader.get_mut();
        let _ = stream.write_all(format!("Server error: {message}").as_bytes());
        let _ = stream.flush();
    }

    fn handle_session<S: SessionStream>(&mut self, reader: &mut BufReader<S>) -> anyhow::Result<()> {
        reader
            .get_ref()
            .set_read_timeout(Some(self.config.request_timeout()))?;
        let Some(raw) =
            protocol::read_line_bounded(reader, self.config.effective_max_request_bytes())?
        else {
            tracing::debug!("empty request, closing session");
            return Ok(());
        };
        tracing::info!("request: {raw:?}");

        let translation = self.engine.translate(&raw);
        let mut confirmed = false;
        if translation.risky && crate::security::classify(&translation.command) {
            let stream = reader.get_mut();
            stream.write_all(protocol::confirm_prompt(&translation.command).as_bytes())?;
            stream.flush()?;
            reader
                .get_ref()
                .set_read_timeout(Some(self.config.confirm_timeout()))?;
            match protocol::read_confirmation(reader) {
                ConfirmOutcome::Confirmed => confirmed = true,
                ConfirmOutcome::Declined => {
                    tracing::info!("user declined {:?}", translation.command);
                    return send(reader.get_mut(), protocol::ABORTED_BY_USER);
                }
                ConfirmOutcome::TimedOut => {
                    tracing::info!("confirmation timed out for {:?}", translation.command);
                    return send(reader.get_mut(), protocol::CONFIRM_TIMED_OUT);
                }
            }
        }

        let history_id = match self.history.append(NewHistoryEntry {
            user_id: self.user_id,
            command: raw.clone(),
        }) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("history append failed: {e}");
                None
            }
        };

        let started = Instant::now();
        let result = self.engine.execute_translated(&raw, translation, confirmed);
        let elapsed_ms = started.elapsed().as_millis() as i64;
        tracing::debug!(
            "executed in {elapsed_ms}ms, succeeded={}, {} bytes",
            result.succeeded,
            result.output.len()
        );

        send(reader.get_mut(), &result.output)?;

        if let Some(id) = history_id {
            if let Err(e) =
                self.history
                    .record_outcome(id, &result.output, result.succeeded, elapsed_ms)
            {
                tracing::warn!("history outcome update failed: {e}");
            }
        }
        Ok(())
    }

    /// Accept connections one at a time until `shutdown` is set.
    pub fn serve(&mut self, listener: &Listener, shutdown: &AtomicBool) -> anyhow::Result<()> {
        while !shutdown.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok(Some(conn)) => self.serve_accepted(conn),
                Ok(None) => std::thread::sleep(ACCEPT_POLL),
                Err(e) => {
                    tracing::warn!("accept error: {e}");
                    std::thread::sleep(ACCEPT_POLL * 2);
                }
            }
        }
        Ok(())
    }

    fn serve_accepted(&mut self, conn: Connection) {
        match conn {
            #[cfg(unix)]
            Connection::Unix(stream) => {
                if !check_peer_uid(&stream) {
                    tracing::warn!("rejected connection from another user");
                    return;
                }
                self.serve_connection(stream);
            }
            Connection::Tcp(stream) => self.serve_connection(stream),
        }
    }
}

fn send<W: Write>(stream: &mut W, text: &str) -> anyhow::Result<()> {
    stream.write_all(text.as_bytes())?;
    stream.flush()?;
    Ok(())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "internal error".to_string()
    }
}

pub enum Connection {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Tcp(std::net::TcpStream),
}

/// A non-blocking listening socket. A Unix listener removes its socket file
/// when dropped.
pub enum Listener {
    #[cfg(unix)]
    Unix {
        listener: std::os::unix::net::UnixListener,
        path: std::path::PathBuf,
    },
    Tcp(std::net::TcpListener),
}

impl Listener {
    pub fn bind(endpoint: &Endpoint) -> anyhow::Result<Self> {
        let listener = match endpoint {
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                let _ = std::fs::remove_file(path);
                let listener = std::os::unix::net::UnixListener::bind(path).map_err(|e| {
                    anyhow::anyhow!("failed to bind {}: {e}", path.display())
                })?;
                {
                    use std::os::unix::fs::PermissionsExt;
                    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
                }
                listener.set_nonblocking(true)?;
                Listener::Unix {
                    listener,
                    path: path.clone(),
                }
            }
            Endpoint::Tcp(addr) => {
                let listener = std::net::TcpListener::bind(addr)
                    .map_err(|e| anyhow::anyhow!("failed to bind {addr}: {e}"))?;
                listener.set_nonblocking(true)?;
                Listener::Tcp(listener)
            }
        };
        Ok(listener)
    }

    /// `Ok(None)` when no connection is pending.
    pub fn accept(&self) -> std::io::Result<Option<Connection>> {
        let accepted = match self {
            #[cfg(unix)]
            Listener::Unix { listener, .. } => listener.accept().map(|(stream, _)| {
                let _ = stream.set_nonblocking(false);
                let _ = stream.set_write_timeout(Some(WRITE_TIMEOUT));
                Connection::Unix(stream)
            }),
            Listener::Tcp(listener) => listener.accept().map(|(stream, _)| {
                let _ = stream.set_nonblocking(false);
                let _ = stream.set_write_timeout(Some(WRITE_TIMEOUT));
                Connection::Tcp(stream)
            }),
        };
        match accepted {
            Ok(conn) => Ok(Some(conn)),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Listener::Unix { path, .. } = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Run the daemon until SIGINT or SIGTERM.
pub fn run_daemon(config: &Config) -> anyhow::Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))?;
    run_daemon_until(config, shutdown)
}

/// Bind, open the history database, and serve until `shutdown` is set.
/// Binding and opening the database are fatal; nothing is accepted if either
/// fails.
pub fn run_daemon_until(config: &Config, shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    let endpoint = config.daemon.endpoint();
    eprintln!("aios: starting daemon");
    let listener = Listener::bind(&endpoint)?;

    let db_path = config.db.effective_path();
    let history: Arc<dyn HistoryLog> =
        Arc::new(HistoryStore::open(&db_path, config.db.busy_timeout_ms).map_err(|e| {
            anyhow::anyhow!("failed to open history database {}: {e}", db_path.display())
        })?);
    tracing::info!("history database at {}", db_path.display());

    let engine = Engine::from_config(config, Some(Arc::clone(&history)))?;
    let mut daemon = Daemon::new(
        engine,
        history,
        crate::history::current_user_id(),
        config.daemon.clone(),
    );

    eprintln!("aios: daemon listening on {endpoint}");
    daemon.serve(&listener, &shutdown)?;
    eprintln!("aios: daemon shutting down");
    drop(listener);
    Ok(())
}

#[cfg(unix)]
fn check_peer_uid(stream: &std::os::unix::net::UnixStream) -> bool {
    #[cfg(target_os = "linux")]
    {
        use std::os::fd::AsRawFd;
        let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
        let rc = unsafe {
            libc::getsockopt(
                stream.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                &mut cred as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };
        if rc != 0 {
            return false;
        }
        cred.uid == unsafe { libc::getuid() }
    }
    #[cfg(any(target_os = "macos", target_os = "freebsd"))]
    {
        use std::os::fd::AsRawFd;
        let mut euid: libc::uid_t = 0;
        let mut egid: libc::gid_t = 0;
        let rc = unsafe { libc::getpeereid(stream.as_raw_fd(), &mut euid, &mut egid) };
        rc == 0 && euid == unsafe { libc::getuid() }
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "freebsd")))]
    {
        let _ = stream;
        tracing::warn!("peer UID check not implemented for this platform, relying on socket permissions");
        true
    }
}
