use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// What to hand to the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// A full line for the platform command processor (`sh -c` / `cmd /C`).
    Shell(String),
    /// A resolved executable plus an argument string, run through the shell
    /// so quoting in `args` behaves as the user typed it.
    Program { path: PathBuf, args: String },
}

impl Invocation {
    /// The line the platform shell will see.
    pub fn shell_line(&self) -> String {
        match self {
            Invocation::Shell(line) => line.clone(),
            Invocation::Program { path, args } => {
                let program = quote_program(&path.to_string_lossy());
                if args.is_empty() {
                    program
                } else {
                    format!("{program} {args}")
                }
            }
        }
    }
}

#[cfg(unix)]
fn quote_program(program: &str) -> String {
    shell_words::quote(program).into_owned()
}

#[cfg(windows)]
fn quote_program(program: &str) -> String {
    if program.contains(' ') {
        format!("\"{program}\"")
    } else {
        program.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Exited {
        stdout: String,
        stderr: String,
        success: bool,
    },
    TimedOut(Duration),
    NotFound,
    Failed(String),
}

impl ProcessOutcome {
    /// Stdout if there is any, otherwise stderr.
    pub fn primary_output(&self) -> &str {
        match self {
            ProcessOutcome::Exited { stdout, stderr, .. } => {
                if stdout.is_empty() {
                    stderr
                } else {
                    stdout
                }
            }
            _ => "",
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, ProcessOutcome::Exited { success: true, .. })
    }
}

pub trait ProcessRunner {
    fn run(&self, invocation: &Invocation, timeout: Duration) -> ProcessOutcome;
}

/// Runs invocations through the platform shell in the daemon's current
/// working directory, killing the child once `timeout` elapses.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

fn shell_command(line: &str) -> Command {
    #[cfg(unix)]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(line);
        cmd
    }
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", line]);
        cmd
    }
}

/// Kill the child together with anything it started. On Unix the child leads
/// its own process group, so the whole group goes.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: killpg only sends a signal; pgid is our child's group.
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

impl ProcessRunner for ShellRunner {
    fn run(&self, invocation: &Invocation, timeout: Duration) -> ProcessOutcome {
        let line = invocation.shell_line();
        let mut cmd = shell_command(&line);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Ok(cwd) = std::env::current_dir() {
            cmd.current_dir(cwd);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ProcessOutcome::NotFound,
            Err(e) => return ProcessOutcome::Failed(e.to_string()),
        };
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) if Instant::now() >= deadline => {
                    kill_tree(&mut child);
                    let _ = child.wait();
                    break None;
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    kill_tree(&mut child);
                    return ProcessOutcome::Failed(e.to_string());
                }
            }
        };

        let Some(status) = status else {
            tracing::warn!("command timed out after {}s: {line}", timeout.as_secs());
            return ProcessOutcome::TimedOut(timeout);
        };
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        // Shells report a missing program as 127 (sh) or 9009 (cmd).
        if stdout.is_empty() && matches!(status.code(), Some(127) | Some(9009)) {
            tracing::debug!("shell could not find program: {line}");
            return ProcessOutcome::NotFound;
        }
        ProcessOutcome::Exited {
            stdout,
            stderr,
            success: status.success(),
        }
    }
}
