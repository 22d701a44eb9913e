//! Slash Command Parsing
//!
//! Recognises `/command[@botname] args...` messages. Arguments that an admin
//! command needs are kept optional so a missing one can be answered with
//! usage text after the caller has been authorized.

/// A parsed bot command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Clear,
    Status,
    SetAdmin,
    AddKey {
        secret: Option<String>,
        name: Option<String>,
    },
    RemoveKey { id: Option<String> },
    ListKeys,
    KeyStats,
    ToggleKey { id: Option<String> },
    EnableKey { id: Option<String> },
    DisableKey { id: Option<String> },
    Unknown(String),
}

impl Command {
    /// Parse a message; `None` when it is not a command for this bot
    pub fn parse(text: &str, bot_username: &str) -> Option<Command> {
        let text = text.trim_start();
        let body = text.strip_prefix('/')?;

        let mut words = body.split_whitespace();
        let head = words.next()?;
        let args: Vec<&str> = words.collect();

        let name = match head.split_once('@') {
            Some((name, target)) => {
                if !target.eq_ignore_ascii_case(bot_username) {
                    return None;
                }
                name
            }
            None => head,
        };
        let first = || args.first().map(|s| s.to_string());

        let command = match name.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "clear" => Command::Clear,
            "status" => Command::Status,
            "setadmin" => Command::SetAdmin,
            "addapi" => Command::AddKey {
                secret: first(),
                name: (args.len() > 1).then(|| args[1..].join(" ")),
            },
            "removeapi" => Command::RemoveKey { id: first() },
            "listapis" => Command::ListKeys,
            "apistat" => Command::KeyStats,
            "toggleapi" => Command::ToggleKey { id: first() },
            "enableapi" => Command::EnableKey { id: first() },
            "disableapi" => Command::DisableKey { id: first() },
            other => Command::Unknown(other.to_string()),
        };
        Some(command)
    }

    /// Whether only the bot admin may run this command
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Command::AddKey { .. }
                | Command::RemoveKey { .. }
                | Command::ListKeys
                | Command::KeyStats
                | Command::ToggleKey { .. }
                | Command::EnableKey { .. }
                | Command::DisableKey { .. }
        )
    }

    /// Whether the message carrying this command should be deleted after handling
    pub fn carries_secret(&self) -> bool {
        matches!(self, Command::AddKey { secret: Some(_), .. })
    }
}
