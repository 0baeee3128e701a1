use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "aios",
    version = env!("AIOS_BUILD_VERSION"),
    long_version = env!("AIOS_BUILD_LONG_VERSION"),
    about = "AI-augmented command terminal"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive terminal (the default)
    Shell,

    /// Run the background daemon
    Daemon,

    /// Send a single request to the daemon and print the reply
    Send {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        words: Vec<String>,
    },

    /// Show command history recorded by the daemon
    History {
        /// Number of entries to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Only entries whose command or output contains this text
        #[arg(long)]
        search: Option<String>,
        /// Show success statistics instead of entries
        #[arg(long, default_value_t = false)]
        stats: bool,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the config file path
    Path,
    /// Show current configuration
    Show {
        /// Show unredacted config (include inline API keys)
        #[arg(long, default_value_t = false)]
        raw: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_is_shell() {
        let cli = Cli::try_parse_from(["aios"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_send_collects_words() {
        let cli = Cli::try_parse_from(["aios", "send", "list", "all", "files"]).unwrap();
        match cli.command {
            Some(Commands::Send { words }) => assert_eq!(words, vec!["list", "all", "files"]),
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn test_send_requires_words() {
        assert!(Cli::try_parse_from(["aios", "send"]).is_err());
    }

    #[test]
    fn test_history_flags() {
        let cli =
            Cli::try_parse_from(["aios", "history", "--limit", "5", "--search", "git"]).unwrap();
        match cli.command {
            Some(Commands::History {
                limit,
                search,
                stats,
            }) => {
                assert_eq!(limit, 5);
                assert_eq!(search.as_deref(), Some("git"));
                assert!(!stats);
            }
            _ => panic!("expected history"),
        }
    }

    #[test]
    fn test_config_show_raw() {
        let cli = Cli::try_parse_from(["aios", "config", "show", "--raw"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: Some(ConfigAction::Show { raw: true })
            })
        ));
    }
}
