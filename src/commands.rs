//! Slash command parsing and static replies

use crate::models::RequestId;

pub const HELP_MESSAGE: &str = "List of commands:\n\
/help - Display this list of commands\n\
/sdo - List the SDOs on duty\n\
\n\
SDO commands (group chats):\n\
/pm [reference no.] [text] - Send a message to a requester\n\
/resolve [reference no.] - Close an enquiry\n\
/hoto @incoming_sdo ... - Hand over duty\n\
/ack [duty info] - Take over duty as an incoming SDO\n\
/cancelhoto - Cancel the HOTO in progress";

pub const WELCOME_MESSAGE: &str = "Good day! This is the SDO bot. How may I help you?";

pub const PM_USAGE: &str = "Syntax error.\n\
To send additional information to a requester via the bot, use:\n\
<code>/pm [request reference no.] [text to send]</code>.";

pub const RESOLVE_USAGE: &str = "Syntax error.\n\
To close an enquiry, use:\n\
<code>/resolve [request reference no.]</code>.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Sdo,
    /// Raw arguments; shape is checked by the coordinator
    Hoto(Vec<String>),
    Ack(Option<String>),
    CancelHoto,
    /// `None` when the arguments do not parse
    Pm(Option<(RequestId, String)>),
    Resolve(Option<RequestId>),
    Unknown(String),
}

impl Command {
    /// Commands that act on group state
    pub fn group_only(&self) -> bool {
        matches!(
            self,
            Command::Hoto(_)
                | Command::Ack(_)
                | Command::CancelHoto
                | Command::Pm(_)
                | Command::Resolve(_)
        )
    }
}

/// Parse a message text; `None` if it is not a command
pub fn parse(text: &str) -> Option<Command> {
    let text = text.trim_start();
    let rest = text.strip_prefix('/')?;

    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };
    // "/cmd@botname" addresses a specific bot in groups
    let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }

    let command = match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "sdo" => Command::Sdo,
        "hoto" => Command::Hoto(args.split_whitespace().map(str::to_string).collect()),
        "ack" => Command::Ack((!args.is_empty()).then(|| args.to_string())),
        "cancelhoto" => Command::CancelHoto,
        "pm" => Command::Pm(parse_pm(args)),
        "resolve" => Command::Resolve(parse_reference(args)),
        _ => Command::Unknown(name),
    };
    Some(command)
}

fn parse_pm(args: &str) -> Option<(RequestId, String)> {
    let (reference, text) = args.split_once(char::is_whitespace)?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some((reference.parse().ok()?, text.to_string()))
}

fn parse_reference(args: &str) -> Option<RequestId> {
    let mut parts = args.split_whitespace();
    let reference = parts.next()?.parse().ok()?;
    parts.next().is_none().then_some(reference)
}
