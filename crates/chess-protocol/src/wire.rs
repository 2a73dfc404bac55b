//! Tagged wire records exchanged after the handshake.

/// `%MOVE -1000`: a fresh game was just linked.
pub const NEW_GAME: &str = "%MOVE -1000";
/// `%MOVE -1001`: you are playing black.
pub const PLAY_BLACK: &str = "%MOVE -1001";
/// `%MOVE -1002`: you are playing white.
pub const PLAY_WHITE: &str = "%MOVE -1002";

/// Separator line used to bracket admin command output.
pub const SEPARATOR: &str = "---------------------------------------";

pub fn welcome(name: &str) -> String {
    format!("WELCOME {name}")
}

/// Banner sent to a freshly promoted admin connection: database path and
/// running server version, per spec.md §4.E.
pub fn admin_welcome(db_path: &str) -> String {
    format!("WELCOME admin [db={db_path}] [version={}]", crate::constants::PROGRAM_VERSION)
}

pub fn info(msg: &str) -> String {
    format!("%INFO {msg}")
}

pub fn note(msg: &str) -> String {
    format!("%NOTE {msg}")
}

pub fn name_of(peer: &str) -> String {
    format!("%NAME {peer}")
}

pub fn elo_header(name: &str, rating: i64) -> String {
    format!("%ELO [ {name} - {rating} ]")
}

/// `%SERVER ...` subcommand parsed out of an inbound record.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ServerCommand {
    Link,
    LinkTo(String),
    Feedback(String),
    Elo,
    Disconnect,
    Scoring(f64),
    Unknown(String),
}

/// Parse a record already known to start with `%SERVER `.
///
/// Mirrors the original's `str.split(maxsplit=2)`: at most three
/// whitespace-separated tokens, the third carrying any remaining
/// whitespace verbatim (relevant for `FEEDBACK <text>`).
pub fn parse_server_command(record: &str) -> Option<ServerCommand> {
    let rest = record.strip_prefix("%SERVER")?;
    let rest = rest.trim_start();
    let mut parts = rest.splitn(2, char::is_whitespace);
    let verb = parts.next().unwrap_or("");
    let arg = parts.next().map(str::trim_start);

    Some(match (verb, arg) {
        ("LINK", _) => ServerCommand::Link,
        ("LINKTO", Some(name)) if !name.is_empty() => ServerCommand::LinkTo(name.to_owned()),
        ("FEEDBACK", Some(text)) if !text.is_empty() => ServerCommand::Feedback(text.to_owned()),
        ("ELO", _) => ServerCommand::Elo,
        ("DISCONNECT", _) => ServerCommand::Disconnect,
        ("SCORING", Some(s)) => match s.trim().parse::<f64>() {
            Ok(v) => ServerCommand::Scoring(v),
            Err(_) => ServerCommand::Unknown(verb.to_owned()),
        },
        _ => ServerCommand::Unknown(verb.to_owned()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_link() {
        assert_eq!(parse_server_command("%SERVER LINK"), Some(ServerCommand::Link));
    }

    #[test]
    fn parses_linkto() {
        assert_eq!(
            parse_server_command("%SERVER LINKTO client_6"),
            Some(ServerCommand::LinkTo("client_6".to_owned()))
        );
    }

    #[test]
    fn parses_scoring_float() {
        assert_eq!(
            parse_server_command("%SERVER SCORING 0.5"),
            Some(ServerCommand::Scoring(0.5))
        );
    }

    #[test]
    fn parses_feedback_with_embedded_whitespace() {
        assert_eq!(
            parse_server_command("%SERVER FEEDBACK this is great"),
            Some(ServerCommand::Feedback("this is great".to_owned()))
        );
    }

    #[test]
    fn unknown_verb_is_preserved_for_logging() {
        assert_eq!(
            parse_server_command("%SERVER BOGUS"),
            Some(ServerCommand::Unknown("BOGUS".to_owned()))
        );
    }

    #[test]
    fn malformed_scoring_falls_back_to_unknown() {
        assert_eq!(
            parse_server_command("%SERVER SCORING not-a-number"),
            Some(ServerCommand::Unknown("SCORING".to_owned()))
        );
    }
}
