//! Command resolution and execution.
//!
//! [`Engine::execute`] is the whole pipeline: translate natural language when
//! the input is long enough, gate risky translations, run translated lines
//! through the shell, and otherwise dispatch the command word through the
//! registry. Every path ends in an [`ExecutionResult`]; nothing here returns
//! an error.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ExecutionConfig;
use crate::history::HistoryLog;
use crate::registry::{Builtin, CommandEntry, CommandKind, CommandRegistry, Handler};
use crate::runner::{Invocation, ProcessOutcome, ProcessRunner};
use crate::suggest::{self, Candidate, FailureKind};
use crate::translate::{Translation, TranslationSource, Translator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub output: String,
    pub succeeded: bool,
}

impl ExecutionResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            succeeded: true,
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            succeeded: false,
        }
    }
}

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";
const HISTORY_SHOWN: usize = 20;

pub struct Engine {
    registry: CommandRegistry,
    translator: Box<dyn Translator>,
    runner: Box<dyn ProcessRunner>,
    history: Option<Arc<dyn HistoryLog>>,
    user_id: i64,
    config: ExecutionConfig,
}

impl Engine {
    pub fn new(
        registry: CommandRegistry,
        translator: Box<dyn Translator>,
        runner: Box<dyn ProcessRunner>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            registry,
            translator,
            runner,
            history: None,
            user_id: 0,
            config,
        }
    }

    /// Attach the log the `history` builtin reads from.
    pub fn with_history(mut self, history: Arc<dyn HistoryLog>, user_id: i64) -> Self {
        self.history = Some(history);
        self.user_id = user_id;
        self
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    fn should_translate(&self, line: &str) -> bool {
        line.chars().count() >= self.config.translate_min_chars.max(1)
    }

    /// Translate `line` if it is long enough to be natural language.
    pub fn translate(&self, line: &str) -> Translation {
        let trimmed = line.trim();
        if self.should_translate(trimmed) {
            self.translator.translate(trimmed)
        } else {
            Translation::identity(trimmed, TranslationSource::Skipped)
        }
    }

    pub fn execute(&mut self, line: &str) -> ExecutionResult {
        let translation = self.translate(line);
        self.execute_translated(line, translation, false)
    }

    /// Execute `raw` given an already computed translation. `confirmed` lets
    /// a risky translation through.
    pub fn execute_translated(
        &mut self,
        raw: &str,
        translation: Translation,
        confirmed: bool,
    ) -> ExecutionResult {
        let line = raw.trim();
        if line.is_empty() {
            return ExecutionResult::ok("");
        }
        self.registry.ensure_fresh();

        if translation.changes(line) {
            tracing::debug!("translated {line:?} -> {:?}", translation.command);
            let risky = translation.risky || crate::security::classify(&translation.command);
            if risky && !confirmed {
                return risky_refusal(&translation);
            }
            return self.run_translated(&translation.command);
        }

        let (word, args) = split_command(line);
        match self.registry.lookup(word).cloned() {
            Some(entry) => self.invoke(&entry, args),
            None => {
                let suggestion = self.suggestion(line, word, None, FailureKind::NotFound);
                ExecutionResult::failed(format!(
                    "'{}' is not available.\n💡 Did you mean: {suggestion}",
                    word.to_lowercase()
                ))
            }
        }
    }

    fn run_translated(&self, command: &str) -> ExecutionResult {
        let outcome = self
            .runner
            .run(&Invocation::Shell(command.to_string()), self.config.timeout());
        match outcome {
            outcome @ ProcessOutcome::Exited { .. } => ExecutionResult {
                output: format!("🤖 AI executed: {command}\n{}", outcome.primary_output()),
                succeeded: outcome.succeeded(),
            },
            ProcessOutcome::TimedOut(after) => ExecutionResult::failed(format!(
                "🤖 AI command timed out after {}s: {command}",
                after.as_secs()
            )),
            ProcessOutcome::NotFound => ExecutionResult::failed(format!(
                "🤖 AI command failed: {command}\n❌ Error: command not found"
            )),
            ProcessOutcome::Failed(e) => ExecutionResult::failed(format!(
                "🤖 AI command failed: {command}\n❌ Error: {e}"
            )),
        }
    }

    /// Run a registry entry with the argument remainder.
    pub fn invoke(&mut self, entry: &CommandEntry, args: &str) -> ExecutionResult {
        let outcome = match &entry.handler {
            Handler::Builtin(builtin) => self.run_builtin(*builtin, args),
            Handler::Shell => {
                let line = if args.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{} {args}", entry.name)
                };
                self.run_process(&entry.name, Invocation::Shell(line))
            }
            Handler::External { path } => self.run_process(
                &entry.name,
                Invocation::Program {
                    path: path.clone(),
                    args: args.to_string(),
                },
            ),
        };
        match outcome {
            Ok(result) => result,
            Err(message) => {
                let line = if args.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{} {args}", entry.name)
                };
                // The entry itself ran, so it is no typo candidate.
                let suggestion = self.suggestion(
                    &line,
                    &line,
                    Some(&entry.name),
                    FailureKind::from_message(&message),
                );
                ExecutionResult::failed(format!(
                    "Error executing {}: {message}\n💡 Suggestion: {suggestion}",
                    entry.name
                ))
            }
        }
    }

    /// `Err` carries a handler failure; a process that ran and exited is
    /// always `Ok`, with `succeeded` from its status.
    fn run_process(&self, name: &str, invocation: Invocation) -> Result<ExecutionResult, String> {
        match self.runner.run(&invocation, self.config.timeout()) {
            outcome @ ProcessOutcome::Exited { .. } => Ok(ExecutionResult {
                output: outcome.primary_output().to_string(),
                succeeded: outcome.succeeded(),
            }),
            ProcessOutcome::TimedOut(after) => Err(format!(
                "{name}: command timed out after {} seconds",
                after.as_secs()
            )),
            ProcessOutcome::NotFound => Err(format!("{name}: command not found")),
            ProcessOutcome::Failed(e) => Err(format!("{name}: error: {e}")),
        }
    }

    fn run_builtin(&mut self, builtin: Builtin, args: &str) -> Result<ExecutionResult, String> {
        match builtin {
            Builtin::Help => Ok(ExecutionResult::ok(self.help(args))),
            Builtin::Commands => Ok(ExecutionResult::ok(self.list_commands())),
            Builtin::Refresh => {
                self.registry.refresh();
                Ok(ExecutionResult::ok(format!(
                    "Command cache refreshed: {} commands available",
                    self.registry.len()
                )))
            }
            Builtin::Exit => Ok(ExecutionResult::ok("exit")),
            Builtin::Clear => Ok(ExecutionResult::ok(CLEAR_SCREEN)),
            Builtin::Cd => change_directory(args).map(ExecutionResult::ok),
            Builtin::Pwd => std::env::current_dir()
                .map(|dir| ExecutionResult::ok(dir.display().to_string()))
                .map_err(|e| format!("pwd: {e}")),
            Builtin::Echo => Ok(ExecutionResult::ok(args)),
            Builtin::History => self.show_history(),
            Builtin::Telemetry(kind) => Ok(ExecutionResult::ok(crate::telemetry::snapshot(kind))),
        }
    }

    fn suggestion(
        &self,
        line: &str,
        typed: &str,
        exclude: Option<&str>,
        failure: FailureKind,
    ) -> suggest::Suggestion {
        let candidates = self
            .registry
            .entries()
            .into_iter()
            .filter(|entry| Some(entry.name.as_str()) != exclude)
            .map(|entry| Candidate {
                name: &entry.name,
                builtin: entry.kind == CommandKind::Builtin,
            });
        suggest::suggest(
            line,
            typed,
            candidates,
            |name| self.registry.is_resolvable(name),
            failure,
        )
    }

    fn help(&self, args: &str) -> String {
        let topic = args.trim();
        if topic.is_empty() {
            return GENERAL_HELP.to_string();
        }
        match self.registry.get(topic) {
            Some(entry) => format!(
                "Help for '{}':\n  Type: {}\n  Description: {}\n  Category: {}",
                entry.name, entry.kind, entry.description, entry.category
            ),
            None => format!("No help available for '{}'", topic.to_lowercase()),
        }
    }

    fn list_commands(&mut self) -> String {
        self.registry.ensure_fresh();
        let entries = self.registry.entries();
        let mut out = format!("Available Commands:\n{}\n", "=".repeat(50));

        let builtin: Vec<String> = entries
            .iter()
            .filter(|e| e.kind == CommandKind::Builtin)
            .map(|e| format!("  {:<12} - {}", e.name, e.description))
            .collect();
        let external: Vec<String> = entries
            .iter()
            .filter(|e| e.kind == CommandKind::External)
            .map(|e| format!("  {:<12} - {} ({})", e.name, e.description, e.category))
            .collect();

        if !builtin.is_empty() {
            out.push_str("\nBuilt-in Commands:\n");
            out.push_str(&builtin.join("\n"));
        }
        if !external.is_empty() {
            out.push_str("\n\nExternal Commands:\n");
            out.push_str(&external.join("\n"));
        }
        out.push_str(&format!(
            "\n\nTotal: {} commands available\n\n💡 Type 'help <command>' for detailed information about a specific command",
            entries.len()
        ));
        out
    }

    fn show_history(&self) -> Result<ExecutionResult, String> {
        let Some(history) = &self.history else {
            return Ok(ExecutionResult::ok("No command history available"));
        };
        let records = history
            .query(self.user_id, HISTORY_SHOWN)
            .map_err(|e| format!("history: {e}"))?;
        if records.is_empty() {
            return Ok(ExecutionResult::ok("No command history available"));
        }
        let mut out = format!("Command History:\n{}\n", "=".repeat(30));
        // Oldest of the window first, like a shell's history listing.
        for (i, record) in records.iter().rev().enumerate() {
            out.push_str(&format!("{:2}. {}\n", i + 1, record.command));
        }
        Ok(ExecutionResult::ok(out))
    }
}

const GENERAL_HELP: &str = "AI Terminal Help
================

Available command types:
• Built-in commands (always available)
• External commands (discovered from your system)

Special features:
• Natural language is translated into shell commands
• Risky commands require confirmation
• Suggestions when commands fail

Type 'commands' to see all available commands
Type 'help <command>' for specific help";

fn risky_refusal(translation: &Translation) -> ExecutionResult {
    let mut output = format!(
        "⚠️  Risky command detected: {}\n💡 This command could be dangerous. Use with caution or try a safer alternative.",
        translation.command
    );
    if !translation.reason.is_empty() {
        output.push_str(&format!("\nReason: {}", translation.reason));
    }
    ExecutionResult::failed(output)
}

/// Split on the first whitespace run.
pub fn split_command(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (line, ""),
    }
}

fn change_directory(args: &str) -> Result<String, String> {
    let target = args.trim();
    let dir = if target.is_empty() || target == "~" {
        dirs::home_dir().ok_or_else(|| "cd: home directory not found".to_string())?
    } else if let Some(rest) = target.strip_prefix("~/") {
        dirs::home_dir()
            .ok_or_else(|| "cd: home directory not found".to_string())?
            .join(rest)
    } else {
        PathBuf::from(target)
    };
    std::env::set_current_dir(&dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => format!("cd: {target}: No such file or directory"),
        _ => format!("cd: {target}: {e}"),
    })?;
    let now = std::env::current_dir().map_err(|e| format!("cd: {e}"))?;
    Ok(format!("Changed directory to {}", now.display()))
}

impl Engine {
    /// Production wiring: PATH probe, shell runner, LLM translator.
    pub fn from_config(
        config: &crate::config::Config,
        history: Option<Arc<dyn HistoryLog>>,
    ) -> anyhow::Result<Self> {
        let registry = CommandRegistry::from_config(&config.registry);
        let translator = crate::translate::translator_from_config(config)?;
        let engine = Self::new(
            registry,
            translator,
            Box::new(crate::runner::ShellRunner),
            config.execution.clone(),
        );
        Ok(match history {
            Some(history) => engine.with_history(history, crate::history::current_user_id()),
            None => engine,
        })
    }
}
