//! Bot command handling.
//!
//! Supports the following commands:
//! - `/start` greeting
//! - `/help` usage text
//! - `/reset`, `/new`, `/reload` start a new conversation

use tracing::debug;

use crate::updates::Message;

/// Reply to `/start`.
pub const START_TEXT: &str = "Hi! Send me a message and I'll relay it to the assistant.";

/// Reply to `/help`.
pub const HELP_TEXT: &str = "Send any message to chat with the assistant.\n\n\
/reset - start a new conversation\n\
/new - same as /reset\n\
/help - show this message";

/// Reply after a conversation reset.
pub const RESET_TEXT: &str = "Started a new conversation. Enjoy!";

/// A recognised bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    Start,
    Help,
    /// `/reset`, `/new` and `/reload`.
    Reset,
    /// Any other command.
    Unknown {
        /// The command name without the leading slash.
        command: String,
        /// The text after the command.
        args: String,
    },
}

impl ParsedCommand {
    /// Fixed reply for this command, if it has one.
    pub fn reply_text(&self) -> Option<&'static str> {
        match self {
            ParsedCommand::Start => Some(START_TEXT),
            ParsedCommand::Help => Some(HELP_TEXT),
            ParsedCommand::Reset => Some(RESET_TEXT),
            ParsedCommand::Unknown { .. } => None,
        }
    }
}

/// Parse the command at the start of `message`, if any.
///
/// A `@botname` suffix is accepted when it names `bot_username` (or when no
/// username is known) and rejected otherwise, since the command was meant
/// for another bot in the same group.
pub fn parse_command(message: &Message, bot_username: Option<&str>) -> Option<ParsedCommand> {
    if !message.is_command() {
        return None;
    }

    let text = message.text().trim();
    let (head, args) = match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    };
    let head = head.strip_prefix('/')?;

    let name = match head.split_once('@') {
        Some((name, target)) => {
            if let Some(own) = bot_username
                && !target.eq_ignore_ascii_case(own)
            {
                debug!(target, "Ignoring command addressed to another bot");
                return None;
            }
            name
        }
        None => head,
    };

    let command = match name.to_lowercase().as_str() {
        "start" => ParsedCommand::Start,
        "help" => ParsedCommand::Help,
        "reset" | "new" | "reload" => ParsedCommand::Reset,
        _ => ParsedCommand::Unknown {
            command: name.to_string(),
            args: args.to_string(),
        },
    };
    Some(command)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::updates::{Chat, MessageEntity};

    fn message(text: &str, command_len: Option<usize>) -> Message {
        Message {
            message_id: 1,
            from: None,
            chat: Chat {
                id: 1,
                kind: "private".to_string(),
                username: None,
                title: None,
            },
            date: 0,
            text: Some(text.to_string()),
            entities: command_len
                .map(|length| MessageEntity {
                    kind: "bot_command".to_string(),
                    offset: 0,
                    length,
                })
                .into_iter()
                .collect(),
        }
    }

    fn cmd(text: &str) -> Message {
        let len = text.split_whitespace().next().map_or(0, str::len);
        message(text, Some(len))
    }

    #[test]
    fn test_known_commands() {
        assert_eq!(parse_command(&cmd("/start"), None), Some(ParsedCommand::Start));
        assert_eq!(parse_command(&cmd("/help"), None), Some(ParsedCommand::Help));
        for reset in ["/reset", "/new", "/reload", "/RESET"] {
            assert_eq!(parse_command(&cmd(reset), None), Some(ParsedCommand::Reset));
        }
    }

    #[test]
    fn test_unknown_command_keeps_args() {
        assert_eq!(
            parse_command(&cmd("/translate  hello world "), None),
            Some(ParsedCommand::Unknown {
                command: "translate".to_string(),
                args: "hello world".to_string(),
            })
        );
    }

    #[test]
    fn test_bot_name_suffix() {
        assert_eq!(
            parse_command(&cmd("/start@RelayBot"), Some("relaybot")),
            Some(ParsedCommand::Start)
        );
        assert_eq!(parse_command(&cmd("/start@OtherBot"), Some("relaybot")), None);
        assert_eq!(
            parse_command(&cmd("/help@AnyBot"), None),
            Some(ParsedCommand::Help)
        );
    }

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(parse_command(&message("hello /start", None), None), None);
    }

    #[test]
    fn test_reply_text() {
        assert_eq!(ParsedCommand::Reset.reply_text(), Some(RESET_TEXT));
        assert!(
            ParsedCommand::Unknown {
                command: "x".into(),
                args: String::new()
            }
            .reply_text()
            .is_none()
        );
    }
}
