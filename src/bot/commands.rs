// Command Parsing
// Splits "/name@bot arg arg" messages and validates admin arguments

use super::guard::Gate;

pub const GRANT_USAGE: &str = "Usage: /grant <user_id> <days>";
pub const REVOKE_USAGE: &str = "Usage: /revoke <user_id>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Start,
    Help,
    Report,
    Pay,
    Cancel,
    Grant,
    Revoke,
    Users,
}

impl CommandKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name.to_ascii_lowercase().as_str() {
            "start" => CommandKind::Start,
            "help" => CommandKind::Help,
            "report" => CommandKind::Report,
            "pay" | "pay_mpesastk" => CommandKind::Pay,
            "cancel" => CommandKind::Cancel,
            "grant" => CommandKind::Grant,
            "revoke" => CommandKind::Revoke,
            "users" => CommandKind::Users,
            _ => return None,
        };
        Some(kind)
    }

    pub fn gate(self) -> Gate {
        match self {
            CommandKind::Start | CommandKind::Help | CommandKind::Pay | CommandKind::Cancel => Gate::Open,
            CommandKind::Report => Gate::Subscriber,
            CommandKind::Grant | CommandKind::Revoke | CommandKind::Users => Gate::Admin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine<'a> {
    pub kind: CommandKind,
    pub args: Vec<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedText<'a> {
    Command(CommandLine<'a>),
    Unknown(&'a str),
    /// Plain text, not starting with '/'.
    Plain(&'a str),
}

pub fn parse_text(text: &str) -> ParsedText<'_> {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return ParsedText::Plain(trimmed);
    };

    let mut parts = rest.split_whitespace();
    let head = parts.next().unwrap_or("");
    // Group chats address commands as /name@BotName
    let name = head.split('@').next().unwrap_or(head);

    match CommandKind::from_name(name) {
        Some(kind) => ParsedText::Command(CommandLine {
            kind,
            args: parts.collect(),
        }),
        None => ParsedText::Unknown(name),
    }
}

/// Malformed admin arguments; the payload is the reply text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgError {
    Usage(&'static str),
    Invalid(&'static str),
}

impl ArgError {
    pub fn message(self) -> &'static str {
        match self {
            ArgError::Usage(m) | ArgError::Invalid(m) => m,
        }
    }
}

pub fn parse_grant_args(args: &[&str]) -> Result<(i64, u32), ArgError> {
    let [user, days] = args else {
        return Err(ArgError::Usage(GRANT_USAGE));
    };
    let user_id = user.parse::<i64>().map_err(|_| ArgError::Invalid("Invalid arguments."))?;
    let days = days.parse::<u32>().map_err(|_| ArgError::Invalid("Invalid arguments."))?;
    Ok((user_id, days))
}

pub fn parse_revoke_args(args: &[&str]) -> Result<i64, ArgError> {
    let [user] = args else {
        return Err(ArgError::Usage(REVOKE_USAGE));
    };
    user.parse::<i64>().map_err(|_| ArgError::Invalid("Invalid user ID"))
}
