use std::io::{self, BufRead, Write};

use crate::config::Endpoint;
use crate::protocol;

pub const DAEMON_NOT_RUNNING: &str = "Error: Daemon not running. Start with 'aios daemon'";

const PROMPT: &str = "aios> ";

/// Send one line to the daemon and return its final output. Connection
/// problems come back as a message rather than an error.
pub fn send_request<F>(endpoint: &Endpoint, line: &str, confirm: F) -> String
where
    F: FnMut(&str) -> io::Result<String>,
{
    let result = match endpoint {
        #[cfg(unix)]
        Endpoint::Unix(path) => std::os::unix::net::UnixStream::connect(path)
            .and_then(|mut stream| protocol::exchange(&mut stream, line, confirm)),
        Endpoint::Tcp(addr) => std::net::TcpStream::connect(addr.as_str())
            .and_then(|mut stream| protocol::exchange(&mut stream, line, confirm)),
    };
    match result {
        Ok(output) => output,
        Err(e) => connection_error_message(&e),
    }
}

fn connection_error_message(e: &io::Error) -> String {
    match e.kind() {
        // A missing socket file means the daemon was never started.
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => DAEMON_NOT_RUNNING.into(),
        _ => format!("Connection error: {e}"),
    }
}

/// Show the daemon's prompt and read the user's answer from stdin.
pub fn ask_on_terminal(prompt: &str) -> io::Result<String> {
    let mut stdout = io::stdout();
    stdout.write_all(prompt.as_bytes())?;
    stdout.flush()?;
    let mut reply = String::new();
    io::stdin().lock().read_line(&mut reply)?;
    Ok(reply)
}

fn print_response(response: &str) {
    let mut stdout = io::stdout();
    let _ = writeln!(stdout, "{}", response.trim_end_matches('\n'));
    let _ = stdout.flush();
}

/// Interactive loop: one daemon round trip per input line until `exit` or
/// end of input.
pub fn run_shell(endpoint: &Endpoint) -> anyhow::Result<()> {
    println!("AI-Augmented Command Terminal");
    println!("Type 'exit' to quit, 'help' for help, 'commands' to list commands");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("{PROMPT}");
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!();
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" {
            break;
        }
        let response = send_request(endpoint, input, ask_on_terminal);
        print_response(&response);
    }
    Ok(())
}

/// One-shot request. Returns whether the daemon could be reached.
pub fn run_send(endpoint: &Endpoint, words: &[String]) -> bool {
    let line = words.join(" ");
    let response = send_request(endpoint, &line, ask_on_terminal);
    print_response(&response);
    response != DAEMON_NOT_RUNNING && !response.starts_with("Connection error:")
}
