use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Outcome of matching a command line against the denylist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskVerdict {
    pub is_risky: bool,
    pub reason: String,
}

impl RiskVerdict {
    fn safe() -> Self {
        Self {
            is_risky: false,
            reason: String::new(),
        }
    }

    fn risky(reason: &str) -> Self {
        Self {
            is_risky: true,
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Display for RiskVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_risky {
            write!(f, "risky: {}", self.reason)
        } else {
            write!(f, "no_obvious_risk")
        }
    }
}

/// Lowercase substrings that mark a command as needing confirmation,
/// paired with the reason reported to the user.
const DENYLIST: &[(&str, &str)] = &[
    ("rm -rf", "recursive forced delete"),
    ("rm -fr", "recursive forced delete"),
    ("rm -r", "recursive delete"),
    ("del /f /s", "forced recursive delete"),
    ("del /s", "recursive delete"),
    ("rd /s", "recursive directory removal"),
    ("rmdir /s", "recursive directory removal"),
    ("format", "disk format"),
    ("fdisk", "partition table edit"),
    ("mkfs", "filesystem format operation"),
    ("diskpart", "partition table edit"),
    ("dd if=", "raw disk write"),
    ("of=/dev/", "raw device write"),
    ("> /dev/sd", "raw device write"),
    ("shred", "destructive file wipe"),
    ("wipefs", "destructive disk operation"),
    ("sudo", "elevated privileges"),
    ("doas ", "elevated privileges"),
    ("runas", "elevated privileges"),
    ("su -", "elevated privileges"),
    ("su root", "elevated privileges"),
    ("chmod 777", "world-writable permission change"),
    ("chmod -r 777", "world-writable permission change"),
    ("chown root", "ownership change to root"),
    ("passwd", "credential change"),
    ("shutdown", "system shutdown/reboot"),
    ("reboot", "system shutdown/reboot"),
    ("halt", "system shutdown/reboot"),
    ("poweroff", "system shutdown/reboot"),
    ("init 0", "system shutdown/reboot"),
    ("init 6", "system shutdown/reboot"),
    (":(){ :|:& };:", "fork bomb"),
];

/// Bare `su` is only flagged as a whole word; as a substring it would match
/// half the dictionary ("result", "issue").
fn invokes_su(lower: &str) -> bool {
    static SU_WORD: OnceLock<Option<Regex>> = OnceLock::new();
    SU_WORD
        .get_or_init(|| Regex::new(r"(?:^|[\s;&|])su(?:$|[\s;&|])").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(lower))
}

pub fn assess(command: &str) -> RiskVerdict {
    let lower = command.to_lowercase();
    if let Some((_, reason)) = DENYLIST.iter().find(|(pattern, _)| lower.contains(pattern)) {
        return RiskVerdict::risky(reason);
    }
    if invokes_su(&lower) {
        return RiskVerdict::risky("elevated privileges");
    }
    RiskVerdict::safe()
}

/// True when `command` matches any denylisted pattern, ignoring case.
pub fn classify(command: &str) -> bool {
    assess(command).is_risky
}

#[cfg(unix)]
pub fn secure_aios_directory() {
    use std::os::unix::fs::PermissionsExt;
    let dir = crate::config::Config::aios_dir();
    if dir.exists() {
        let _ = std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700));
    }
}

#[cfg(not(unix))]
pub fn secure_aios_directory() {}
