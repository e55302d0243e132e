//! Line-level parsing of the inbound chat protocol.
//!
//! Lines may arrive concatenated in one frame separated by CRLF, so callers
//! split first with [`split_frame`] and feed each line to [`parse_line`].
//!
//! Reference shapes:
//!
//! ```text
//! :user!user@user.tmi.twitch.tv JOIN #channel
//! :u.tmi.twitch.tv 353 this_bot = #channel :jane jack jill
//! :tmi.twitch.tv 366 this_bot #channel :End of /NAMES list
//! ```

use super::{END_OF_NAMES_NUMERIC, NAMES_LIST_NUMERIC};

/// The protocol events the listener acts on. Anything else parses to `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcEvent {
    /// A single user's join echo.
    Join { channel: String, user: String },
    /// One page of the channel's name list (numeric 353).
    NamesList {
        channel: String,
        names: Vec<String>,
    },
    /// The name list is complete (numeric 366).
    EndOfNames { channel: String },
}

/// Split a raw inbound frame into individual protocol lines.
pub fn split_frame(frame: &str) -> impl Iterator<Item = &str> {
    frame.split("\r\n").filter(|line| !line.trim().is_empty())
}

/// Parse one protocol line into an event, or `None` for everything the
/// listener ignores.
pub fn parse_line(line: &str) -> Option<IrcEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    // Lines of interest always open with a ":prefix "
    let rest = line.strip_prefix(':')?;
    let (prefix, rest) = rest.split_once(' ')?;
    let (command, params) = rest.split_once(' ').unwrap_or((rest, ""));

    match command {
        "JOIN" => {
            // prefix is "user!user@user.tmi.twitch.tv"
            let user = prefix.split('!').next()?.to_string();
            let channel = params
                .trim()
                .trim_start_matches(':')
                .trim_start_matches('#')
                .to_string();
            if user.is_empty() || channel.is_empty() {
                return None;
            }
            Some(IrcEvent::Join { channel, user })
        }
        NAMES_LIST_NUMERIC => {
            // params are "this_bot = #channel :jane jack jill"; the channel
            // is the last token before the colon-trailing name payload.
            let (meta, names) = params.split_once(':')?;
            let channel = meta
                .split_whitespace()
                .last()?
                .trim_start_matches('#')
                .to_string();
            let names: Vec<String> = names.split_whitespace().map(str::to_string).collect();
            if channel.is_empty() {
                return None;
            }
            Some(IrcEvent::NamesList { channel, names })
        }
        END_OF_NAMES_NUMERIC => {
            // params are "this_bot #channel :End of /NAMES list"
            let meta = params.split(':').next()?;
            let channel = meta
                .split_whitespace()
                .last()?
                .trim_start_matches('#')
                .to_string();
            if channel.is_empty() {
                return None;
            }
            Some(IrcEvent::EndOfNames { channel })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names_list() {
        let event = parse_line(":u.tmi.twitch.tv 353 bot = #coolstreamer :alice bob")
            .expect("353 parses");
        assert_eq!(
            event,
            IrcEvent::NamesList {
                channel: "coolstreamer".to_string(),
                names: vec!["alice".to_string(), "bob".to_string()],
            }
        );
    }

    #[test]
    fn test_parse_end_of_names() {
        let event = parse_line(":u.tmi.twitch.tv 366 bot #coolstreamer :End of /NAMES list")
            .expect("366 parses");
        assert_eq!(
            event,
            IrcEvent::EndOfNames {
                channel: "coolstreamer".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_join_echo() {
        let event =
            parse_line(":lurker42!lurker42@lurker42.tmi.twitch.tv JOIN #coolstreamer")
                .expect("JOIN parses");
        assert_eq!(
            event,
            IrcEvent::Join {
                channel: "coolstreamer".to_string(),
                user: "lurker42".to_string(),
            }
        );
    }

    #[test]
    fn test_other_messages_ignored() {
        assert!(parse_line("PING :tmi.twitch.tv").is_none());
        assert!(parse_line(":tmi.twitch.tv 001 bot :Welcome, GLHF!").is_none());
        assert!(
            parse_line(":someone!someone@someone.tmi.twitch.tv PRIVMSG #chan :hi").is_none()
        );
        assert!(parse_line("").is_none());
    }

    #[test]
    fn test_split_frame_on_crlf() {
        let frame = ":u.tmi.twitch.tv 353 bot = #coolstreamer :alice bob\r\n:u.tmi.twitch.tv 366 bot #coolstreamer :End of /NAMES list\r\n";
        let lines: Vec<&str> = split_frame(frame).collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("353"));
        assert!(lines[1].contains("366"));
    }

    #[test]
    fn test_single_line_frame_passes_through() {
        let lines: Vec<&str> = split_frame(":tmi.twitch.tv 001 bot :Welcome").collect();
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_names_payload_splits_on_spaces_only() {
        let event = parse_line(":u.tmi.twitch.tv 353 bot = #chan :a_1 b_2   c_3")
            .expect("353 parses");
        let IrcEvent::NamesList { names, .. } = event else {
            panic!("wrong event kind");
        };
        assert_eq!(names, vec!["a_1", "b_2", "c_3"]);
    }
}
