//! Natural-language to shell-command translation.
//!
//! The translator never fails: every problem with the completion service
//! degrades to an identity translation that echoes the input back as a
//! non-risky command. Callers can tell the two apart through
//! [`Translation::source`].

use serde::Deserialize;

use crate::provider::{CompletionRequest, LlmProvider};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationSource {
    /// The service produced a well-formed reply.
    Service,
    /// Translation was not attempted (input too short).
    Skipped,
    /// The service was unusable; the payload is the reason.
    Fallback(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub command: String,
    pub risky: bool,
    pub reason: String,
    pub source: TranslationSource,
}

impl Translation {
    pub fn identity(raw: &str, source: TranslationSource) -> Self {
        Self {
            command: raw.to_string(),
            risky: false,
            reason: String::new(),
            source,
        }
    }

    pub fn fallback(raw: &str, why: impl Into<String>) -> Self {
        Self::identity(raw, TranslationSource::Fallback(why.into()))
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, TranslationSource::Fallback(_))
    }

    /// True when the translation proposes something other than `raw`.
    pub fn changes(&self, raw: &str) -> bool {
        self.command.trim() != raw.trim()
    }
}

pub trait Translator {
    fn translate(&self, raw: &str) -> Translation;
}

/// Structured reply the completion service is asked to produce.
#[derive(Debug, Deserialize)]
struct TranslationReply {
    command: String,
    risky: bool,
    #[serde(default)]
    reason: String,
}

/// Parse a service reply into a translation of `raw`. Accepts bare JSON and
/// JSON wrapped in a fenced code block; anything else falls back.
pub fn parse_reply(raw: &str, reply: &str) -> Translation {
    let payload = strip_code_fence(reply.trim());
    match serde_json::from_str::<TranslationReply>(payload) {
        Ok(parsed) if !parsed.command.trim().is_empty() => Translation {
            command: parsed.command.trim().to_string(),
            risky: parsed.risky,
            reason: parsed.reason,
            source: TranslationSource::Service,
        },
        Ok(_) => Translation::fallback(raw, "empty command in reply"),
        Err(e) => Translation::fallback(raw, format!("unparsable reply: {e}")),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json", "JSON", ...) up to the first newline.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

#[cfg(windows)]
const PLATFORM_HINTS: &str = "PLATFORM: Windows (use 'start' for apps, 'echo. > X' for empty files, \
'del' for deletion, 'dir' for listing, 'type' to print files)";

#[cfg(not(windows))]
const PLATFORM_HINTS: &str = "PLATFORM: Unix-like (use 'xdg-open' or 'open' for apps, 'touch X' for \
empty files, 'rm' for deletion, 'ls' for listing, 'cat' to print files)";

pub fn build_prompt(raw: &str) -> String {
    format!(
        r#"{PLATFORM_HINTS}

COMMAND PATTERNS:
- File creation: "create/make X file"
- File listing: "list/show files"
- Directory change: "go to X" -> "cd X"
- App launch: "open X" (use executable names: chrome, firefox, code, etc.)
- Deletion: "delete X" (mark risky if broad)

RISK RULES: Mark risky if the command could harm the system or delete multiple files.
If the input already is a valid shell command, return it unchanged.

User input: "{raw}"

Respond ONLY with JSON:
{{"command": "shell_command", "risky": true/false, "reason": "explanation_if_risky"}}"#
    )
}

const SYSTEM_PROMPT: &str = "You are a command translator for a cross-platform terminal. \
Translate natural language requests into a single shell command.";

/// Translator backed by an LLM provider. Holds its own single-threaded
/// runtime so the synchronous daemon loop can drive async HTTP.
pub struct LlmTranslator {
    provider: Option<Box<dyn LlmProvider>>,
    unavailable_reason: String,
    model: String,
    runtime: tokio::runtime::Runtime,
}

impl LlmTranslator {
    pub fn new(provider: Box<dyn LlmProvider>, model: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            provider: Some(provider),
            unavailable_reason: String::new(),
            model: model.into(),
            runtime: build_runtime()?,
        })
    }

    /// Build from config. A provider that cannot be created (usually a
    /// missing API key) leaves the translator in permanent fallback mode.
    pub fn from_config(config: &crate::config::Config) -> anyhow::Result<Self> {
        match crate::provider::create_provider(config) {
            Ok(provider) => Self::new(provider, config.provider.model.clone()),
            Err(e) => {
                tracing::warn!("translation disabled: {e}");
                Ok(Self {
                    provider: None,
                    unavailable_reason: e.to_string(),
                    model: config.provider.model.clone(),
                    runtime: build_runtime()?,
                })
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }
}

fn build_runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

impl Translator for LlmTranslator {
    fn translate(&self, raw: &str) -> Translation {
        let Some(provider) = &self.provider else {
            return Translation::fallback(raw, self.unavailable_reason.clone());
        };
        let request = CompletionRequest {
            model: self.model.clone(),
            system: SYSTEM_PROMPT.into(),
            prompt: build_prompt(raw),
            max_tokens: 256,
            temperature: 0.0,
        };
        match self.runtime.block_on(provider.complete(request)) {
            Ok(text) => {
                let translation = parse_reply(raw, &text);
                if let TranslationSource::Fallback(why) = &translation.source {
                    tracing::debug!("translation fallback for {raw:?}: {why}");
                }
                translation
            }
            Err(e) => {
                tracing::warn!("translation request via {} failed: {e}", provider.name());
                Translation::fallback(raw, e.to_string())
            }
        }
    }
}

/// Translator that always echoes its input. Used when AI translation is
/// switched off.
pub struct IdentityTranslator;

impl Translator for IdentityTranslator {
    fn translate(&self, raw: &str) -> Translation {
        Translation::identity(raw, TranslationSource::Skipped)
    }
}

/// `provider.default` value that switches AI translation off.
pub const DISABLED_PROVIDER: &str = "disabled";

/// Build the translator the config asks for.
pub fn translator_from_config(config: &crate::config::Config) -> anyhow::Result<Box<dyn Translator>> {
    if config.provider.default == DISABLED_PROVIDER {
        tracing::info!("AI translation switched off in config");
        return Ok(Box::new(IdentityTranslator));
    }
    Ok(Box::new(LlmTranslator::from_config(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProvider;

    #[async_trait::async_trait]
    impl LlmProvider for FailingProvider {
        async fn complete(&self, _request: CompletionRequest) -> anyhow::Result<String> {
            anyhow::bail!("connection refused")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct CannedProvider(&'static str);

    #[async_trait::async_trait]
    impl LlmProvider for CannedProvider {
        async fn complete(&self, _request: CompletionRequest) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    #[test]
    fn test_provider_error_falls_back_to_identity() {
        let translator = LlmTranslator::new(Box::new(FailingProvider), "m").unwrap();
        let t = translator.translate("list files");
        assert_eq!(t.command, "list files");
        assert!(!t.risky);
        assert!(t.is_fallback());
    }

    #[test]
    fn test_unparsable_reply_falls_back_to_identity() {
        let translator = LlmTranslator::new(Box::new(CannedProvider("sure! ls")), "m").unwrap();
        let t = translator.translate("list files");
        assert_eq!((t.command.as_str(), t.risky), ("list files", false));
        assert!(t.is_fallback());
    }

    #[test]
    fn test_well_formed_reply() {
        let translator = LlmTranslator::new(
            Box::new(CannedProvider(r#"{"command": "ls", "risky": false, "reason": ""}"#)),
            "m",
        )
        .unwrap();
        let t = translator.translate("list files");
        assert_eq!(t.command, "ls");
        assert_eq!(t.source, TranslationSource::Service);
        assert!(t.changes("list files"));
    }

    #[test]
    fn test_json_fenced_reply() {
        let reply = "```json\n{\"command\": \"del *\", \"risky\": true, \"reason\": \"Deletes all files\"}\n```";
        let t = parse_reply("delete all files", reply);
        assert_eq!(t.command, "del *");
        assert!(t.risky);
        assert_eq!(t.reason, "Deletes all files");
    }

    #[test]
    fn test_plain_fenced_reply() {
        let t = parse_reply("list files", "```\n{\"command\": \"dir\", \"risky\": false}\n```");
        assert_eq!(t.command, "dir");
        assert_eq!(t.reason, "");
    }

    #[test]
    fn test_single_line_fence() {
        let t = parse_reply("x", "```json{\"command\": \"pwd\", \"risky\": false}```");
        assert_eq!(t.command, "pwd");
    }

    #[test]
    fn test_missing_risky_field_falls_back() {
        let t = parse_reply("list files", r#"{"command": "ls"}"#);
        assert!(t.is_fallback());
        assert_eq!(t.command, "list files");
    }

    #[test]
    fn test_empty_command_falls_back() {
        let t = parse_reply("list files", r#"{"command": "  ", "risky": false}"#);
        assert!(t.is_fallback());
    }

    #[test]
    fn test_missing_provider_falls_back() {
        let mut config = crate::config::Config::default();
        config.provider.default = "unknown".into();
        let translator = LlmTranslator::from_config(&config).unwrap();
        assert!(!translator.is_available());
        let t = translator.translate("list files");
        assert_eq!(t.command, "list files");
        assert!(t.is_fallback());
    }

    #[test]
    fn test_identity_translator() {
        let t = IdentityTranslator.translate("open firefox");
        assert_eq!(t.command, "open firefox");
        assert_eq!(t.source, TranslationSource::Skipped);
        assert!(!t.changes("open firefox"));
    }

    #[test]
    fn test_prompt_embeds_input() {
        let prompt = build_prompt("create folder called mydir");
        assert!(prompt.contains("\"create folder called mydir\""));
        assert!(prompt.contains("\"risky\""));
    }

    #[test]
    fn test_disabled_provider_passes_input_through() {
        let mut config = crate::config::Config::default();
        config.provider.default = DISABLED_PROVIDER.into();
        let translator = translator_from_config(&config).unwrap();

        let t = translator.translate("list all files");
        assert_eq!(t.command, "list all files");
        assert_eq!(t.source, TranslationSource::Skipped);
        assert!(!t.risky);
    }
}
