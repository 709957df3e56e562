//! Input line parsing

use chatlink_core::{CallKind, ClientCommand};

pub const HELP: &str = "\
/open <user>            open the conversation with <user>
/back                   return to the conversation list
/send <text>            send <text> (plain lines are sent as-is)
/call <user> [audio|video]
/accept  /reject  /hangup
/contacts               list followed users
/notifications          list notifications
/compact on|off         toggle the small-screen layout
/quit";

/// Parse one input line. `Ok(None)` for blank lines.
pub fn parse(line: &str) -> Result<Option<ClientCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    // "//text" sends a message that starts with a slash.
    if let Some(text) = line.strip_prefix("//") {
        return Ok(Some(ClientCommand::Send(format!("/{}", text))));
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(ClientCommand::Send(line.to_string())));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "open" => ClientCommand::Open(single_arg(args, "/open <user>")?),
        "back" => ClientCommand::Back,
        "send" => ClientCommand::Send(args.to_string()),
        "call" => {
            let mut parts = args.split_whitespace();
            let peer = parts
                .next()
                .ok_or_else(|| "usage: /call <user> [audio|video]".to_string())?;
            let kind = match parts.next() {
                Some(kind) => kind.parse::<CallKind>()?,
                None => CallKind::Audio,
            };
            ClientCommand::Call {
                peer: peer.to_string(),
                kind,
            }
        }
        "accept" => ClientCommand::Accept,
        "reject" => ClientCommand::Reject,
        "hangup" => ClientCommand::Hangup,
        "contacts" => ClientCommand::Contacts,
        "notifications" => ClientCommand::Notifications,
        "compact" => match args {
            "" | "on" => ClientCommand::SetCompact(true),
            "off" => ClientCommand::SetCompact(false),
            _ => return Err("usage: /compact on|off".to_string()),
        },
        "quit" | "exit" => ClientCommand::Quit,
        other => return Err(format!("unknown command /{}", other)),
    };

    Ok(Some(command))
}

fn single_arg(args: &str, usage: &str) -> Result<String, String> {
    let mut parts = args.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(arg), None) => Ok(arg.to_string()),
        _ => Err(format!("usage: {}", usage)),
    }
}
