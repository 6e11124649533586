//! `/channels` command parser and help text.
//!
//! Parsing is pure. [`crate::app::ChatApp::command`] executes the parsed
//! command for a sender.

use thiserror::Error;

/// Name the command is invoked by.
pub const COMMAND_NAME: &str = "channels";

/// Accepted spellings of the command.
const COMMAND_ALIASES: &[&str] = &["channels", "channel", "ch"];

/// A parsed `/channels` subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelsCommand {
    /// List usable channels.
    List,
    /// Listen to a channel and make it active.
    Join(String),
    /// Stop listening to a channel.
    Leave(String),
    /// Mute a channel.
    Mute(String),
    /// Unmute a channel.
    Unmute(String),
    /// Hide messages from a user, by name or id.
    Ignore(String),
    /// Show messages from an ignored user again.
    Unignore(String),
    /// Create and register a channel at runtime.
    Create {
        /// Channel name.
        name: String,
        /// Marker.
        marker: String,
        /// Prefix with `&` codes.
        prefix: String,
        /// Condition string, possibly empty.
        conditions: String,
    },
    /// Show channel details.
    Info(String),
    /// Show usage.
    Help,
}

impl ChannelsCommand {
    /// Get the subcommand name.
    pub fn name(&self) -> &'static str {
        match self {
            ChannelsCommand::List => "list",
            ChannelsCommand::Join(_) => "join",
            ChannelsCommand::Leave(_) => "leave",
            ChannelsCommand::Mute(_) => "mute",
            ChannelsCommand::Unmute(_) => "unmute",
            ChannelsCommand::Ignore(_) => "ignore",
            ChannelsCommand::Unignore(_) => "unignore",
            ChannelsCommand::Create { .. } => "create",
            ChannelsCommand::Info(_) => "info",
            ChannelsCommand::Help => "help",
        }
    }
}

impl std::fmt::Display for ChannelsCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelsCommand::List | ChannelsCommand::Help => {
                write!(f, "/{COMMAND_NAME} {}", self.name())
            }
            ChannelsCommand::Join(name)
            | ChannelsCommand::Leave(name)
            | ChannelsCommand::Mute(name)
            | ChannelsCommand::Unmute(name)
            | ChannelsCommand::Ignore(name)
            | ChannelsCommand::Unignore(name)
            | ChannelsCommand::Info(name) => {
                write!(f, "/{COMMAND_NAME} {} {name}", self.name())
            }
            ChannelsCommand::Create {
                name,
                marker,
                prefix,
                conditions,
            } => {
                write!(f, "/{COMMAND_NAME} create {name} {marker} {prefix}")?;
                if !conditions.is_empty() {
                    write!(f, " {conditions}")?;
                }
                Ok(())
            }
        }
    }
}

/// Why a line could not be parsed as a `/channels` command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The line is not a `/channels` invocation.
    #[error("not a /{COMMAND_NAME} command")]
    NotACommand,
    /// A subcommand is missing an argument.
    #[error("usage: {0}")]
    MissingArgument(&'static str),
    /// The subcommand is not known.
    #[error("unknown subcommand '{0}'")]
    UnknownSubcommand(String),
}

/// Split off the first whitespace-delimited word.
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], s[pos..].trim_start()),
        None => (s, ""),
    }
}

/// Whether the line invokes `/channels`.
pub fn is_channels_command(line: &str) -> bool {
    let Some(rest) = line.trim_start().strip_prefix('/') else {
        return false;
    };
    let (cmd, _) = split_word(rest);
    COMMAND_ALIASES
        .iter()
        .any(|alias| cmd.eq_ignore_ascii_case(alias))
}

fn one_name(
    args: &str,
    usage: &'static str,
    f: fn(String) -> ChannelsCommand,
) -> Result<ChannelsCommand, CommandError> {
    let (name, _) = split_word(args);
    if name.is_empty() {
        return Err(CommandError::MissingArgument(usage));
    }
    Ok(f(name.to_string()))
}

/// Parse a `/channels ...` line.
///
/// A bare `/channels` shows help.
pub fn parse_command(line: &str) -> Result<ChannelsCommand, CommandError> {
    if !is_channels_command(line) {
        return Err(CommandError::NotACommand);
    }
    let (_, rest) = split_word(line.trim_start().trim_start_matches('/'));
    let (sub, args) = split_word(rest);

    match sub.to_lowercase().as_str() {
        "" | "help" | "?" => Ok(ChannelsCommand::Help),
        "list" | "ls" => Ok(ChannelsCommand::List),
        "join" => one_name(args, "/channels join <name>", ChannelsCommand::Join),
        "leave" => one_name(args, "/channels leave <name>", ChannelsCommand::Leave),
        "mute" => one_name(args, "/channels mute <name>", ChannelsCommand::Mute),
        "unmute" => one_name(args, "/channels unmute <name>", ChannelsCommand::Unmute),
        "info" => one_name(args, "/channels info <name>", ChannelsCommand::Info),
        "ignore" => one_name(args, "/channels ignore <user>", ChannelsCommand::Ignore),
        "unignore" => one_name(args, "/channels unignore <user>", ChannelsCommand::Unignore),
        "create" => {
            const USAGE: &str = "/channels create <name> <marker> <prefix> [conditions...]";
            let (name, args) = split_word(args);
            let (marker, args) = split_word(args);
            let (prefix, conditions) = split_word(args);
            if name.is_empty() || marker.is_empty() || prefix.is_empty() {
                return Err(CommandError::MissingArgument(USAGE));
            }
            Ok(ChannelsCommand::Create {
                name: name.to_string(),
                marker: marker.to_string(),
                prefix: prefix.to_string(),
                conditions: conditions.trim().to_string(),
            })
        }
        other => Err(CommandError::UnknownSubcommand(other.to_string())),
    }
}

/// Subcommand information for help display.
pub struct CommandInfo {
    /// Subcommand name.
    pub name: &'static str,
    /// Subcommand syntax.
    pub syntax: &'static str,
    /// Subcommand description.
    pub description: &'static str,
}

/// Get all subcommand information.
pub fn get_command_help() -> Vec<CommandInfo> {
    vec![
        CommandInfo {
            name: "list",
            syntax: "/channels list",
            description: "Show the channels you can use",
        },
        CommandInfo {
            name: "join",
            syntax: "/channels join <name>",
            description: "Listen to a channel and make it your active channel",
        },
        CommandInfo {
            name: "leave",
            syntax: "/channels leave <name>",
            description: "Stop listening to a channel",
        },
        CommandInfo {
            name: "mute",
            syntax: "/channels mute <name>",
            description: "Leave a channel and stay out of it on later sessions",
        },
        CommandInfo {
            name: "unmute",
            syntax: "/channels unmute <name>",
            description: "Allow a muted channel again",
        },
        CommandInfo {
            name: "ignore",
            syntax: "/channels ignore <user>",
            description: "Hide messages from a user",
        },
        CommandInfo {
            name: "unignore",
            syntax: "/channels unignore <user>",
            description: "Show messages from an ignored user again",
        },
        CommandInfo {
            name: "create",
            syntax: "/channels create <name> <marker> <prefix> [conditions...]",
            description: "Create a channel (requires hubbub.admin)",
        },
        CommandInfo {
            name: "info",
            syntax: "/channels info <name>",
            description: "Show details of a channel",
        },
        CommandInfo {
            name: "help",
            syntax: "/channels help",
            description: "Show this help",
        },
    ]
}

/// Format the help message for display.
pub fn format_help() -> Vec<String> {
    let mut lines = vec!["=== Channel commands ===".to_string()];
    for info in get_command_help() {
        lines.push(format!("{}  - {}", info.syntax, info.description));
    }
    lines
}
