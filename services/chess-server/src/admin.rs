//! Component 4.H — admin command dispatch.
//!
//! `execute` takes the raw command string and a read-only view of
//! whatever relay state it needs, formatted as a single `format_result`
//! string wrapped in the separator lines, matching the original's
//! `SEPARATOR_LF + body + SEPARATOR_LF` envelope.

use crate::account::{Account, UserId};
use chess_protocol::wire::SEPARATOR;
use std::collections::{HashMap, HashSet};

/// Everything an admin verb might need to read. Built fresh each time
/// `execute` runs so the admin module never has to know about sockets.
pub struct AdminView<'a> {
    pub all_accounts: &'a [Account],
    pub online_ids: &'a HashSet<UserId>,
    pub linked: &'a HashMap<UserId, UserId>,
    pub ip_counts: &'a HashMap<String, usize>,
    pub last_game: &'a str,
    pub active_worker_count: usize,
}

/// The effect an admin command asks the caller (which owns the sockets)
/// to perform, alongside the text response.
pub enum Effect {
    None,
    Notify { name: String, message: String },
    NotifyAll { message: String },
    ResetPassword { name: String },
    Remove { name: String },
    SignOff { name: String },
    SetLanguage(i64),
    Stop,
    Shutdown,
    Update,
    Feedback,
}

pub struct AdminResult {
    pub text: String,
    pub effect: Effect,
}

/// Wraps a response body in the separator lines every admin command (and,
/// per spec.md §4.G, the user-facing `%SERVER ELO` command) uses.
pub fn wrap(body: &str) -> String {
    format!("{SEPARATOR}\n{body}\n{SEPARATOR}")
}

pub fn execute(command: &str, view: &AdminView) -> AdminResult {
    let mut parts = command.trim().splitn(3, char::is_whitespace);
    let verb = parts.next().unwrap_or("");
    let arg1 = parts.next();
    let arg2 = parts.next();

    let (text, effect) = match verb {
        "get" => (get_users(view), Effect::None),
        "info" => (get_info(view), Effect::None),
        "ip" => (get_ip_addresses(view), Effect::None),
        "links" => (get_links(view), Effect::None),
        "list" => (get_threads(view), Effect::None),
        "rating" => (rating_chart(view), Effect::None),
        "notify" => match (arg1, arg2) {
            (Some(name), Some(msg)) => (
                format!("{name} notified"),
                Effect::Notify { name: name.to_owned(), message: msg.to_owned() },
            ),
            _ => ("too few arguments - notify *name* *message*".to_owned(), Effect::None),
        },
        "notify_all" => match arg2 {
            Some(msg) => ("notified users".to_owned(), Effect::NotifyAll { message: msg.to_owned() }),
            None => (
                "too few arguments - notify_all users *message*".to_owned(),
                Effect::None,
            ),
        },
        "resetpw" => match arg1 {
            Some(name) => (format!("{name} password reset"), Effect::ResetPassword { name: name.to_owned() }),
            None => ("too few arguments - resetpw *username*".to_owned(), Effect::None),
        },
        "remove" => match arg1 {
            Some(name) => (format!("removed user {name}"), Effect::Remove { name: name.to_owned() }),
            None => ("too few arguments".to_owned(), Effect::None),
        },
        "setlang" => match arg1.and_then(|a| a.parse::<i64>().ok()) {
            Some(n) => {
                let label = if n.rem_euclid(2) == 0 { "English" } else { "German" };
                (format!("set language to {label}"), Effect::SetLanguage(n))
            }
            None => ("usage: setlang <0|1>".to_owned(), Effect::None),
        },
        "signoff" => match arg1 {
            Some(name) => (format!("signed off {name}"), Effect::SignOff { name: name.to_owned() }),
            None => ("too few arguments - remove *name*".to_owned(), Effect::None),
        },
        "feedback" => (String::new(), Effect::Feedback),
        "update" => ("database updated".to_owned(), Effect::Update),
        "stop" => ("stopping server".to_owned(), Effect::Stop),
        "shutdown" => ("shut server down immediately".to_owned(), Effect::Shutdown),
        _ => (usage(), Effect::None),
    };

    AdminResult { text: wrap(&text), effect }
}

fn usage() -> String {
    let verbs = [
        "get", "info", "ip", "links", "list", "notify", "notify_all", "rating", "resetpw", "remove",
        "setlang", "signoff", "feedback", "update", "stop", "shutdown",
    ];
    let mut out = String::from("command not found.\nvalid commands:\n#####\n");
    for v in verbs {
        out.push_str(v);
        out.push('\n');
    }
    out.push_str("#####");
    out
}

fn get_users(view: &AdminView) -> String {
    let mut out = Vec::new();
    let online: Vec<&Account> = view.all_accounts.iter().filter(|a| view.online_ids.contains(&a.id)).collect();
    if online.is_empty() {
        out.push("no users online".to_owned());
    } else {
        out.push("online:".to_owned());
        for a in &online {
            out.push(a.display());
        }
        out.push(format!("#online:{}", online.len()));
    }
    out.push(SEPARATOR.to_owned());
    let offline: Vec<&Account> = view.all_accounts.iter().filter(|a| !view.online_ids.contains(&a.id)).collect();
    if offline.is_empty() {
        out.push("no users offline".to_owned());
    } else {
        out.push("offline:".to_owned());
        for a in &offline {
            out.push(a.display());
        }
        out.push(format!("#offline:{}", offline.len()));
    }
    out.join("\n")
}

fn get_info(view: &AdminView) -> String {
    format!(
        "active workers: {}\nusers: {}\nonline: {}\nlinked users: {}",
        view.active_worker_count,
        view.all_accounts.len(),
        view.online_ids.len(),
        view.linked.len()
    )
}

fn get_ip_addresses(view: &AdminView) -> String {
    let mut out = Vec::new();
    let mut total = 0usize;
    for (ip, count) in view.ip_counts {
        total += count;
        out.push(format!("({ip:?}, {count})"));
    }
    out.push(format!("TOTAL: {total}"));
    out.join("\n")
}

fn get_links(view: &AdminView) -> String {
    let by_id: HashMap<UserId, &Account> = view.all_accounts.iter().map(|a| (a.id, a)).collect();
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for (&a, &b) in view.linked {
        if seen.contains(&b) {
            continue;
        }
        seen.insert(a);
        if let (Some(ua), Some(ub)) = (by_id.get(&a), by_id.get(&b)) {
            out.push(format!("{} <-> {}", ua.display(), ub.display()));
        }
    }
    let unlinked: Vec<&Account> = view
        .all_accounts
        .iter()
        .filter(|a| view.online_ids.contains(&a.id) && !view.linked.contains_key(&a.id))
        .collect();
    if !unlinked.is_empty() {
        out.push("unlinked:".to_owned());
        for u in &unlinked {
            out.push(u.display());
        }
    }
    out.push(format!("linked: {} / unlinked: {}", view.linked.len() / 2, unlinked.len()));
    out.join("\n")
}

fn get_threads(view: &AdminView) -> String {
    format!("workers: {} active", view.active_worker_count)
}

/// Top 10 rated users with `played_games > 0`, tagged online/offline, plus
/// the last-game summary and global counts — shared by the admin `rating`
/// verb and the user-facing `%SERVER ELO` command.
pub fn rating_chart(view: &AdminView) -> String {
    let mut ranked: Vec<&Account> = view.all_accounts.iter().filter(|a| a.played_games > 0).collect();
    ranked.sort_by(|a, b| b.rating.cmp(&a.rating));

    let mut out = Vec::new();
    for (i, a) in ranked.iter().take(10).enumerate() {
        let marker = if view.online_ids.contains(&a.id) { "(*)" } else { "(o)" };
        out.push(format!("{}. {} {} - {}", i + 1, marker, a.name, a.rating));
    }
    out.push(SEPARATOR.to_owned());
    if !view.last_game.is_empty() {
        out.push(view.last_game.to_owned());
        out.push(SEPARATOR.to_owned());
    }
    out.push(format!(
        "online: {} / offline: {}",
        view.online_ids.len(),
        view.all_accounts.len() - view.online_ids.len()
    ));
    out.push("online: (*) / offline: (o)".to_owned());
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view<'a>(
        accounts: &'a [Account],
        online: &'a HashSet<UserId>,
        linked: &'a HashMap<UserId, UserId>,
        ip_counts: &'a HashMap<String, usize>,
    ) -> AdminView<'a> {
        AdminView {
            all_accounts: accounts,
            online_ids: online,
            linked,
            ip_counts,
            last_game: "",
            active_worker_count: 3,
        }
    }

    #[test]
    fn unknown_verb_returns_usage_listing() {
        let accounts = Vec::new();
        let online = HashSet::new();
        let linked = HashMap::new();
        let ips = HashMap::new();
        let result = execute("bogus", &view(&accounts, &online, &linked, &ips));
        assert!(result.text.contains("valid commands"));
    }

    #[test]
    fn notify_requires_two_arguments() {
        let accounts = Vec::new();
        let online = HashSet::new();
        let linked = HashMap::new();
        let ips = HashMap::new();
        let result = execute("notify onlyone", &view(&accounts, &online, &linked, &ips));
        assert!(result.text.contains("too few arguments"));
        assert!(matches!(result.effect, Effect::None));
    }

    #[test]
    fn notify_with_name_and_message_produces_effect() {
        let accounts = Vec::new();
        let online = HashSet::new();
        let linked = HashMap::new();
        let ips = HashMap::new();
        let result = execute("notify client_9 have_a_nice_day", &view(&accounts, &online, &linked, &ips));
        match result.effect {
            Effect::Notify { name, message } => {
                assert_eq!(name, "client_9");
                assert_eq!(message, "have_a_nice_day");
            }
            _ => panic!("expected Notify effect"),
        }
    }

    #[test]
    fn responses_are_wrapped_in_separators() {
        let accounts = Vec::new();
        let online = HashSet::new();
        let linked = HashMap::new();
        let ips = HashMap::new();
        let result = execute("info", &view(&accounts, &online, &linked, &ips));
        let lines: Vec<&str> = result.text.lines().collect();
        assert_eq!(lines.first(), Some(&SEPARATOR));
        assert_eq!(lines.last(), Some(&SEPARATOR));
    }

    #[test]
    fn rating_chart_only_lists_users_with_games_played() {
        let mut a = Account::new(1, "a".into(), "pw".into(), "ip".into(), "t".into());
        a.played_games = 5;
        a.rating = 1200;
        let b = Account::new(2, "b".into(), "pw".into(), "ip".into(), "t".into());
        let accounts = vec![a, b];
        let online = HashSet::new();
        let linked = HashMap::new();
        let ips = HashMap::new();
        let chart = rating_chart(&view(&accounts, &online, &linked, &ips));
        assert!(chart.contains('a'));
        assert!(!chart.lines().next().unwrap().contains('b'));
    }
}
