//! Line protocol shared by the daemon and the client.
//!
//! One connection carries one request. The client writes a single line; on
//! the risky path the daemon answers with a prompt ending in
//! [`CONFIRM_SUFFIX`] and reads one reply line; finally the daemon writes the
//! output and closes the connection. There is no framing beyond that.

use std::io::{self, BufRead, Read, Write};
use std::time::Duration;

pub const CONFIRM_SUFFIX: &str = "Execute? [y/N]: ";
pub const ABORTED_BY_USER: &str = "Aborted by user.\n";
pub const CONFIRM_TIMED_OUT: &str = "Confirmation timeout. Aborted.\n";

/// Replies are tiny; anything longer is not a confirmation.
const MAX_CONFIRM_BYTES: usize = 256;

pub fn confirm_prompt(candidate: &str) -> String {
    format!("[AI] Interpreted: {candidate}\n{CONFIRM_SUFFIX}")
}

pub fn is_affirmative(reply: &str) -> bool {
    matches!(reply.trim().to_lowercase().as_str(), "y" | "yes")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    Declined,
    /// Timeout or receive failure.
    TimedOut,
}

/// A connected socket the session handler can bound reads on.
pub trait SessionStream: Read + Write {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
}

#[cfg(unix)]
impl SessionStream for std::os::unix::net::UnixStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        std::os::unix::net::UnixStream::set_read_timeout(self, timeout)
    }
}

impl SessionStream for std::net::TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        std::net::TcpStream::set_read_timeout(self, timeout)
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Read one line of at most `max_bytes`, not counting the newline. The
/// newline is optional: a line ends at `\n`, at EOF, or when the peer stops
/// sending and the read times out with data already buffered. Returns `None`
/// for an empty payload.
pub fn read_line_bounded<R: BufRead>(reader: &mut R, max_bytes: usize) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    let limit = max_bytes as u64 + 1;
    match reader.by_ref().take(limit).read_until(b'\n', &mut buf) {
        Ok(_) => {}
        Err(e) if is_timeout(&e) && !buf.is_empty() => {}
        Err(e) => return Err(e),
    }
    if buf.len() > max_bytes && buf.last() != Some(&b'\n') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("request exceeds {max_bytes} bytes"),
        ));
    }
    let line = String::from_utf8_lossy(&buf);
    let line = line.trim_end_matches(['\n', '\r']);
    if line.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(line.to_string()))
    }
}

/// Read the confirmation reply. EOF counts as a refusal; an I/O error or
/// timeout counts as a timeout.
pub fn read_confirmation<R: BufRead>(reader: &mut R) -> ConfirmOutcome {
    match read_line_bounded(reader, MAX_CONFIRM_BYTES) {
        Ok(Some(reply)) if is_affirmative(&reply) => ConfirmOutcome::Confirmed,
        Ok(_) => ConfirmOutcome::Declined,
        Err(e) => {
            tracing::debug!("confirmation read failed: {e}");
            ConfirmOutcome::TimedOut
        }
    }
}

/// Client side of one exchange: send `line`, answer any confirmation prompt
/// through `confirm`, and return the final output. `confirm` receives the
/// prompt text and returns the user's reply.
pub fn exchange<S, F>(stream: &mut S, line: &str, mut confirm: F) -> io::Result<String>
where
    S: Read + Write,
    F: FnMut(&str) -> io::Result<String>,
{
    let request = format!("{}\n", line.trim_end_matches(['\n', '\r']));
    stream.write_all(request.as_bytes())?;
    stream.flush()?;

    let mut pending = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match stream.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if n == 0 {
            return Ok(String::from_utf8_lossy(&pending).into_owned());
        }
        pending.extend_from_slice(&chunk[..n]);
        if pending.ends_with(CONFIRM_SUFFIX.as_bytes()) {
            let prompt = String::from_utf8_lossy(&pending).into_owned();
            pending.clear();
            let reply = confirm(&prompt)?;
            stream.write_all(format!("{}\n", reply.trim()).as_bytes())?;
            stream.flush()?;
        }
    }
}
