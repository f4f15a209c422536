/// Who sent an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: u64,
    pub name: Option<String>,
}

impl Sender {
    pub fn new(id: u64, name: Option<String>) -> Self {
        Self { id, name }
    }

    /// Display name for logs and telemetry.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unknown")
    }
}

/// One inbound unit of work from the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingEvent {
    Command { sender: Sender, name: String },
    Text { sender: Sender, text: String },
    Photo { sender: Sender, image: Vec<u8> },
}

impl IncomingEvent {
    /// Classify a plain text message as either a command or chat text.
    /// Commands addressed to another bot (`/start@other_bot`) yield `None`.
    pub fn from_text(sender: Sender, text: &str, bot_username: Option<&str>) -> Option<Self> {
        match parse_command(text) {
            Some(command) if !command.is_for(bot_username) => None,
            Some(command) => Some(IncomingEvent::Command {
                sender,
                name: command.name,
            }),
            None => Some(IncomingEvent::Text {
                sender,
                text: text.to_string(),
            }),
        }
    }
}

/// A parsed `/name@bot args` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Lower-cased command word.
    pub name: String,
    pub addressee: Option<String>,
}

impl ParsedCommand {
    /// Unaddressed commands are for everyone. Without a known username every
    /// command is accepted.
    pub fn is_for(&self, bot_username: Option<&str>) -> bool {
        match (&self.addressee, bot_username) {
            (Some(to), Some(me)) => to.eq_ignore_ascii_case(me.trim_start_matches('@')),
            _ => true,
        }
    }
}

pub fn parse_command(text: &str) -> Option<ParsedCommand> {
    let rest = text.strip_prefix('/')?;
    let word = rest.split(char::is_whitespace).next()?;
    let (name, addressee) = match word.split_once('@') {
        Some((name, to)) => (name, Some(to.to_string()).filter(|t| !t.is_empty())),
        None => (word, None),
    };
    if name.is_empty() {
        return None;
    }
    Some(ParsedCommand {
        name: name.to_lowercase(),
        addressee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Sender {
        Sender::new(42, Some("alice".to_string()))
    }

    fn command(name: &str, addressee: Option<&str>) -> Option<ParsedCommand> {
        Some(ParsedCommand {
            name: name.to_string(),
            addressee: addressee.map(str::to_string),
        })
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/start"), command("start", None));
        assert_eq!(
            parse_command("/Start@relay_bot"),
            command("start", Some("relay_bot"))
        );
        assert_eq!(parse_command("/help me please"), command("help", None));
        assert_eq!(parse_command("/start@"), command("start", None));
        assert_eq!(parse_command("hello /start"), None);
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command("/ start"), None);
        assert_eq!(parse_command("/@bot"), None);
    }

    #[test]
    fn test_from_text_classifies_commands() {
        let expected = Some(IncomingEvent::Command {
            sender: alice(),
            name: "start".to_string(),
        });
        assert_eq!(
            IncomingEvent::from_text(alice(), "/start", Some("relay_bot")),
            expected
        );
        assert_eq!(
            IncomingEvent::from_text(alice(), "/start@Relay_Bot", Some("relay_bot")),
            expected
        );
        assert_eq!(
            IncomingEvent::from_text(alice(), "/start@some_bot", None),
            expected
        );
    }

    #[test]
    fn test_commands_for_other_bots_are_dropped() {
        assert_eq!(
            IncomingEvent::from_text(alice(), "/start@some_other_bot", Some("relay_bot")),
            None
        );
    }

    #[test]
    fn test_from_text_keeps_plain_text_verbatim() {
        assert_eq!(
            IncomingEvent::from_text(alice(), "  nasılsın?  ", Some("relay_bot")),
            Some(IncomingEvent::Text {
                sender: alice(),
                text: "  nasılsın?  ".to_string()
            })
        );
    }

    #[test]
    fn test_display_name_fallback() {
        assert_eq!(Sender::new(1, None).display_name(), "unknown");
        assert_eq!(alice().display_name(), "alice");
    }
}
