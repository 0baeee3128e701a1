//! Suggestions for commands that could not be run.

use std::fmt;

/// Natural-language synonyms for common commands.
const ALIASES: &[(&str, &[&str])] = &[
    ("ls", &["dir", "list", "show files"]),
    ("cd", &["change directory", "go to"]),
    ("mkdir", &["create directory", "make folder"]),
    ("rm", &["delete", "remove"]),
    ("cp", &["copy", "duplicate"]),
    ("mv", &["move", "rename"]),
    ("ps", &["processes", "tasks"]),
    ("kill", &["stop", "terminate"]),
    ("ping", &["test connection", "check network"]),
    ("git", &["version control", "repository"]),
    ("python", &["run script", "execute python"]),
    ("pip", &["install package", "python package manager"]),
];

/// Largest edit distance still treated as a typo.
pub const MAX_TYPO_DISTANCE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    Permission,
    Timeout,
    Other,
}

impl FailureKind {
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("not found") || lower.contains("no such file") {
            FailureKind::NotFound
        } else if lower.contains("permission") || lower.contains("access is denied") {
            FailureKind::Permission
        } else if lower.contains("timeout") || lower.contains("timed out") {
            FailureKind::Timeout
        } else {
            FailureKind::Other
        }
    }

    fn hint(self) -> &'static str {
        match self {
            FailureKind::NotFound => {
                "Check if the program is installed or try 'help' for available commands"
            }
            FailureKind::Permission => "Try running with administrator/sudo privileges",
            FailureKind::Timeout => "Command took too long - it might be hanging",
            FailureKind::Other => "Try 'help' or 'commands' to see available options",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suggestion {
    /// The input used a synonym of a command available on this system.
    Alias(String),
    /// A registered name close to what was typed.
    Typo { name: String, distance: usize },
    Hint(FailureKind),
}

impl fmt::Display for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Suggestion::Alias(name) => write!(f, "'{name}' (available on your system)"),
            Suggestion::Typo { name, .. } => write!(f, "'{name}' (did you mean this?)"),
            Suggestion::Hint(kind) => f.write_str(kind.hint()),
        }
    }
}

/// A registered name offered as a typo correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub name: &'a str,
    pub builtin: bool,
}

impl<'a> Candidate<'a> {
    pub fn builtin(name: &'a str) -> Self {
        Self { name, builtin: true }
    }

    pub fn external(name: &'a str) -> Self {
        Self {
            name,
            builtin: false,
        }
    }
}

/// Pick a suggestion for `input`, which failed with `failure`.
///
/// `typed` is compared against `candidates` for typos; the whole input is
/// searched for alias synonyms. `is_resolvable` decides whether an aliased
/// command actually exists here. At equal distance built-ins rank before
/// externals, then names alphabetically.
pub fn suggest<'a>(
    input: &str,
    typed: &str,
    candidates: impl IntoIterator<Item = Candidate<'a>>,
    is_resolvable: impl Fn(&str) -> bool,
    failure: FailureKind,
) -> Suggestion {
    let lower = input.to_lowercase();
    for (command, synonyms) in ALIASES {
        if synonyms.iter().any(|s| lower.contains(s)) && is_resolvable(command) {
            return Suggestion::Alias(command.to_string());
        }
    }

    let typed = typed.to_lowercase();
    let best = candidates
        .into_iter()
        .map(|c| (levenshtein(&typed, c.name), !c.builtin, c.name))
        .filter(|(distance, _, _)| *distance <= MAX_TYPO_DISTANCE)
        .min();
    if let Some((distance, _, name)) = best {
        return Suggestion::Typo {
            name: name.to_string(),
            distance,
        };
    }

    Suggestion::Hint(failure)
}

/// Classic Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let n = b.len();

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMES: [Candidate<'static>; 3] = [
        Candidate {
            name: "dir",
            builtin: true,
        },
        Candidate {
            name: "cd",
            builtin: true,
        },
        Candidate {
            name: "help",
            builtin: true,
        },
    ];

    fn nothing_resolves(_: &str) -> bool {
        false
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("dor", "dir"), 1);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
    }

    #[test]
    fn test_typo_suggests_registered_name() {
        let s = suggest("dor", "dor", NAMES, nothing_resolves, FailureKind::NotFound);
        assert_eq!(
            s,
            Suggestion::Typo {
                name: "dir".into(),
                distance: 1
            }
        );
        assert_eq!(s.to_string(), "'dir' (did you mean this?)");
    }

    #[test]
    fn test_far_input_gets_generic_hint() {
        let s = suggest("zzzzzzzz", "zzzzzzzz", NAMES, nothing_resolves, FailureKind::NotFound);
        assert_eq!(s, Suggestion::Hint(FailureKind::NotFound));
        assert!(s.to_string().contains("try 'help'"));
    }

    #[test]
    fn test_closest_name_wins() {
        let names = ["helm", "help", "held"].map(Candidate::external);
        let s = suggest("helpp", "helpp", names, nothing_resolves, FailureKind::Other);
        assert_eq!(
            s,
            Suggestion::Typo {
                name: "help".into(),
                distance: 1
            }
        );
    }

    #[test]
    fn test_ties_break_alphabetically() {
        let names = ["hat", "cat", "bat"].map(Candidate::external);
        let s = suggest("mat", "mat", names, nothing_resolves, FailureKind::Other);
        assert_eq!(
            s,
            Suggestion::Typo {
                name: "bat".into(),
                distance: 1
            }
        );
    }

    #[test]
    fn test_builtin_wins_tie_over_external() {
        let names = [
            Candidate::external("grep"),
            Candidate::external("htop"),
            Candidate::builtin("help"),
            Candidate::builtin("echo"),
            Candidate::external("sleep"),
        ];
        let s = suggest("hlep", "hlep", names, nothing_resolves, FailureKind::NotFound);
        assert_eq!(
            s,
            Suggestion::Typo {
                name: "help".into(),
                distance: 2
            }
        );
    }

    #[test]
    fn test_closer_external_beats_builtin() {
        let names = [Candidate::builtin("help"), Candidate::external("gerp")];
        let s = suggest("gerq", "gerq", names, nothing_resolves, FailureKind::Other);
        assert!(matches!(s, Suggestion::Typo { ref name, distance: 1 } if name == "gerp"));
    }

    #[test]
    fn test_alias_requires_resolvable_command() {
        let s = suggest(
            "show files please",
            "show",
            NAMES,
            |c| c == "ls",
            FailureKind::NotFound,
        );
        assert_eq!(s, Suggestion::Alias("ls".into()));
        assert_eq!(s.to_string(), "'ls' (available on your system)");

        let s = suggest("show files please", "show", NAMES, nothing_resolves, FailureKind::NotFound);
        assert_eq!(s, Suggestion::Hint(FailureKind::NotFound));
    }

    #[test]
    fn test_alias_beats_typo() {
        let s = suggest("dir", "dir", NAMES, |c| c == "ls", FailureKind::Other);
        assert_eq!(s, Suggestion::Alias("ls".into()));
    }

    #[test]
    fn test_typo_compares_lowercased_word() {
        let s = suggest("DOR stuff", "DOR", NAMES, nothing_resolves, FailureKind::Other);
        assert!(matches!(s, Suggestion::Typo { ref name, .. } if name == "dir"));
    }

    #[test]
    fn test_failure_kind_from_message() {
        assert_eq!(FailureKind::from_message("command not found"), FailureKind::NotFound);
        assert_eq!(
            FailureKind::from_message("Permission denied (os error 13)"),
            FailureKind::Permission
        );
        assert_eq!(FailureKind::from_message("timed out after 30s"), FailureKind::Timeout);
        assert_eq!(FailureKind::from_message("boom"), FailureKind::Other);
    }
}
