//! Catalog of commands the engine can run directly.
//!
//! The registry starts out holding only the fixed built-ins. The first lookup
//! (and every lookup after the refresh interval has elapsed) rebuilds it from
//! scratch: built-ins, the platform's shell builtins, and whichever
//! well-known executables resolve on `PATH`. A rebuild assembles a new map
//! and swaps it in whole, so no entry from an earlier epoch survives.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::telemetry::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Builtin,
    External,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandKind::Builtin => write!(f, "builtin"),
            CommandKind::External => write!(f, "external"),
        }
    }
}

/// Commands implemented inside the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Help,
    Commands,
    Refresh,
    Exit,
    Clear,
    Cd,
    Pwd,
    Echo,
    History,
    Telemetry(Snapshot),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handler {
    Builtin(Builtin),
    /// A builtin of the platform command processor, run through the shell.
    Shell,
    /// An executable resolved on `PATH`.
    External { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEntry {
    pub name: String,
    pub kind: CommandKind,
    pub category: String,
    pub description: String,
    pub handler: Handler,
}

impl CommandEntry {
    fn builtin(name: &str, category: &str, description: &str, builtin: Builtin) -> Self {
        Self {
            name: name.to_string(),
            kind: CommandKind::Builtin,
            category: category.to_string(),
            description: description.to_string(),
            handler: Handler::Builtin(builtin),
        }
    }

    fn shell(name: &str, category: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: CommandKind::Builtin,
            category: category.to_string(),
            description: description.to_string(),
            handler: Handler::Shell,
        }
    }

    pub fn external(name: &str, category: &str, path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            kind: CommandKind::External,
            category: category.to_string(),
            description: format!("{name} command ({category})"),
            handler: Handler::External { path },
        }
    }
}

/// Resolves executable names against the OS search path without running
/// anything.
pub trait ExecutableProbe {
    fn resolve(&self, name: &str) -> Option<PathBuf>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PathProbe;

impl ExecutableProbe for PathProbe {
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }
}

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub refresh_interval: Duration,
    pub telemetry: bool,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(300),
            telemetry: crate::telemetry::AVAILABLE,
        }
    }
}

const CORE_BUILTINS: &[(&str, &str, Builtin)] = &[
    ("help", "Show help information", Builtin::Help),
    ("commands", "List all available commands", Builtin::Commands),
    ("list-commands", "List all available commands", Builtin::Commands),
    ("refresh", "Refresh command cache", Builtin::Refresh),
    ("exit", "Exit the terminal", Builtin::Exit),
    ("clear", "Clear the screen", Builtin::Clear),
    ("cls", "Clear the screen", Builtin::Clear),
];

const TELEMETRY_BUILTINS: &[(&str, &str, Snapshot)] = &[
    ("cpu", "Show CPU usage and information", Snapshot::Cpu),
    ("mem", "Show memory usage statistics", Snapshot::Memory),
    ("ps", "List running processes", Snapshot::Processes),
    ("disk", "Show disk usage information", Snapshot::Disk),
    ("network", "Show network I/O statistics", Snapshot::Network),
    ("sysinfo", "Show system information", Snapshot::SystemInfo),
    ("uptime", "Show system uptime", Snapshot::Uptime),
];

/// Shell builtins answered natively on every platform.
const NATIVE_SHELL_BUILTINS: &[(&str, &str, &str, Builtin)] = &[
    ("cd", "file_ops", "Change directory", Builtin::Cd),
    ("pwd", "file_ops", "Print working directory", Builtin::Pwd),
    ("echo", "system", "Display text", Builtin::Echo),
    ("history", "system", "Show command history", Builtin::History),
];

#[cfg(not(windows))]
const PLATFORM_SHELL_BUILTINS: &[(&str, &str, &str)] = &[
    ("ls", "file_ops", "List directory contents"),
    ("cat", "file_ops", "Display file contents"),
    ("cp", "file_ops", "Copy files"),
    ("mv", "file_ops", "Move files"),
    ("rm", "file_ops", "Delete files"),
    ("mkdir", "file_ops", "Make directory"),
    ("rmdir", "file_ops", "Remove directory"),
    ("touch", "file_ops", "Create empty file or update timestamp"),
    ("export", "system", "Set environment variables"),
    ("type", "system", "Describe a command"),
];

#[cfg(windows)]
const PLATFORM_SHELL_BUILTINS: &[(&str, &str, &str)] = &[
    ("dir", "file_ops", "List directory contents"),
    ("type", "file_ops", "Display file contents"),
    ("copy", "file_ops", "Copy files"),
    ("move", "file_ops", "Move files"),
    ("ren", "file_ops", "Rename files"),
    ("del", "file_ops", "Delete files"),
    ("md", "file_ops", "Make directory"),
    ("mkdir", "file_ops", "Make directory"),
    ("rd", "file_ops", "Remove directory"),
    ("rmdir", "file_ops", "Remove directory"),
    ("start", "system", "Start a program or open file"),
    ("echo.", "system", "Create empty file"),
    ("more", "file_ops", "Display file contents page by page"),
    ("find", "file_ops", "Search for text in files"),
    ("sort", "file_ops", "Sort file contents"),
    ("fc", "file_ops", "Compare files"),
    ("tree", "file_ops", "Display directory structure"),
    ("attrib", "file_ops", "Change file attributes"),
    ("vol", "system", "Display volume information"),
    ("ver", "system", "Display Windows version"),
    ("time", "system", "Display or set system time"),
    ("date", "system", "Display or set system date"),
    ("set", "system", "Display or set environment variables"),
    ("path", "system", "Display or set PATH"),
    ("title", "system", "Set window title"),
    ("color", "system", "Set console colors"),
];

pub const WELL_KNOWN_EXECUTABLES: &[(&str, &[&str])] = &[
    (
        "development",
        &["python", "python3", "pip", "pip3", "node", "npm", "yarn", "git", "docker", "docker-compose", "cargo"],
    ),
    (
        "system",
        &["top", "htop", "kill", "killall", "ping", "netstat", "ss", "curl", "wget"],
    ),
    (
        "file_ops",
        &["head", "tail", "grep", "find", "less", "wc", "du", "df"],
    ),
    ("text_editors", &["vim", "nano", "emacs", "code", "notepad", "gedit"]),
    ("browsers", &["firefox", "chrome", "chromium", "safari", "opera"]),
    (
        "package_managers",
        &["apt", "yum", "dnf", "pacman", "brew", "snap", "flatpak", "winget"],
    ),
    ("network", &["ssh", "scp", "ftp", "sftp", "telnet"]),
    ("compression", &["tar", "gzip", "zip", "unzip", "rar", "7z"]),
];

#[cfg(windows)]
const WINDOWS_EXECUTABLES: &[&str] = &[
    "cmd", "powershell", "explorer", "notepad", "calc", "taskmgr", "chrome", "firefox", "msedge",
];

pub struct CommandRegistry {
    entries: HashMap<String, CommandEntry>,
    last_refreshed: Option<Instant>,
    refresh_interval: Duration,
    telemetry: bool,
    epoch: u64,
    probe: Box<dyn ExecutableProbe>,
    clock: Box<dyn Clock>,
}

impl CommandRegistry {
    pub fn new(
        probe: Box<dyn ExecutableProbe>,
        clock: Box<dyn Clock>,
        options: RegistryOptions,
    ) -> Self {
        let mut entries = HashMap::new();
        insert_core_builtins(&mut entries, options.telemetry);
        Self {
            entries,
            last_refreshed: None,
            refresh_interval: options.refresh_interval,
            telemetry: options.telemetry,
            epoch: 0,
            probe,
            clock,
        }
    }

    pub fn from_config(config: &crate::config::RegistryConfig) -> Self {
        Self::new(
            Box::new(PathProbe),
            Box::new(SystemClock),
            RegistryOptions {
                refresh_interval: config.refresh_interval(),
                ..Default::default()
            },
        )
    }

    pub fn is_stale(&self) -> bool {
        match self.last_refreshed {
            None => true,
            Some(at) => self.clock.now().saturating_duration_since(at) > self.refresh_interval,
        }
    }

    /// Rebuild if the current epoch has expired. Returns whether a rebuild ran.
    pub fn ensure_fresh(&mut self) -> bool {
        if self.is_stale() {
            self.rebuild();
            true
        } else {
            false
        }
    }

    pub fn lookup(&mut self, name: &str) -> Option<&CommandEntry> {
        self.ensure_fresh();
        self.entries.get(&name.to_lowercase())
    }

    /// Lookup without the staleness check.
    pub fn get(&self, name: &str) -> Option<&CommandEntry> {
        self.entries.get(&name.to_lowercase())
    }

    pub fn rebuild(&mut self) {
        let mut next = HashMap::new();
        insert_core_builtins(&mut next, self.telemetry);

        for (name, category, description, builtin) in NATIVE_SHELL_BUILTINS {
            next.insert(
                name.to_string(),
                CommandEntry::builtin(name, category, description, *builtin),
            );
        }
        for (name, category, description) in PLATFORM_SHELL_BUILTINS {
            next.entry(name.to_string())
                .or_insert_with(|| CommandEntry::shell(name, category, description));
        }

        for (category, names) in WELL_KNOWN_EXECUTABLES {
            for name in *names {
                self.insert_if_resolvable(&mut next, name, category);
            }
        }
        #[cfg(windows)]
        for name in WINDOWS_EXECUTABLES {
            self.insert_if_resolvable(&mut next, name, "windows");
        }

        self.entries = next;
        self.last_refreshed = Some(self.clock.now());
        self.epoch += 1;
        tracing::info!(
            "registry rebuilt (epoch {}): {} commands",
            self.epoch,
            self.entries.len()
        );
    }

    fn insert_if_resolvable(
        &self,
        entries: &mut HashMap<String, CommandEntry>,
        name: &str,
        category: &str,
    ) {
        // Built-ins keep precedence over executables of the same name.
        if entries.contains_key(name) {
            return;
        }
        if let Some(path) = self.probe.resolve(name) {
            entries.insert(name.to_string(), CommandEntry::external(name, category, path));
        }
    }

    /// Force a rebuild regardless of the refresh interval.
    pub fn refresh(&mut self) {
        self.last_refreshed = None;
        self.rebuild();
    }

    /// Whether `name` resolves on the OS search path right now.
    pub fn is_resolvable(&self, name: &str) -> bool {
        self.probe.resolve(name).is_some()
    }

    pub fn entries(&self) -> Vec<&CommandEntry> {
        let mut entries: Vec<&CommandEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of rebuilds so far.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

fn insert_core_builtins(entries: &mut HashMap<String, CommandEntry>, telemetry: bool) {
    for (name, description, builtin) in CORE_BUILTINS {
        entries.insert(
            name.to_string(),
            CommandEntry::builtin(name, "system", description, *builtin),
        );
    }
    if telemetry {
        for (name, description, snapshot) in TELEMETRY_BUILTINS {
            entries.insert(
                name.to_string(),
                CommandEntry::builtin(name, "monitoring", description, Builtin::Telemetry(*snapshot)),
            );
        }
    }
}
