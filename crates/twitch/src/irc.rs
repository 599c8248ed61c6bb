//! Minimal IRC line codec with IRCv3 tags, as spoken by Twitch chat.
//!
//! `@key=value;key2=value2 :prefix COMMAND param param :trailing`

use std::collections::HashMap;

/// A parsed IRC line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub tags: HashMap<String, String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
    /// The line as received, without the line terminator.
    pub raw: String,
}

impl IrcMessage {
    /// Parse one line. Returns `None` for blank or truncated input.
    pub fn parse(line: &str) -> Option<Self> {
        let raw = line.trim_end_matches(['\r', '\n']);
        let mut rest = raw;
        if rest.is_empty() {
            return None;
        }

        let mut tags = HashMap::new();
        if let Some(tagged) = rest.strip_prefix('@') {
            let (tag_str, after) = tagged.split_once(' ')?;
            tags = parse_tags(tag_str);
            rest = after.trim_start_matches(' ');
        }

        let mut prefix = None;
        if let Some(prefixed) = rest.strip_prefix(':') {
            let (pfx, after) = prefixed.split_once(' ')?;
            prefix = Some(pfx.to_string());
            rest = after.trim_start_matches(' ');
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((cmd, after)) => (cmd, after),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        while !rest.is_empty() {
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, after)) => {
                    if !param.is_empty() {
                        params.push(param.to_string());
                    }
                    rest = after;
                },
                None => {
                    params.push(rest.to_string());
                    break;
                },
            }
        }

        Some(Self {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
            raw: raw.to_string(),
        })
    }

    /// Nick part of a `nick!user@host` prefix.
    pub fn nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .map(|p| p.split_once('!').map_or(p, |(nick, _)| nick))
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

fn parse_tags(tag_str: &str) -> HashMap<String, String> {
    tag_str
        .split(';')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), unescape_tag_value(value)),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

/// `\:` → `;`, `\s` → space, `\\` → `\`, `\r` → CR, `\n` → LF.
fn unescape_tag_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {},
        }
    }
    out
}

/// Inverse of [`unescape_tag_value`].
pub fn escape_tag_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            ';' => out.push_str("\\:"),
            ' ' => out.push_str("\\s"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

/// Strip line breaks so client-supplied text can never start a second
/// IRC command.
pub fn single_line(text: &str) -> String {
    text.chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect()
}

/// `PRIVMSG` to `channel` (IRC form), threaded under `parent_id` when given.
pub fn privmsg(channel: &str, parent_id: Option<&str>, text: &str) -> String {
    let text = single_line(text);
    match parent_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => format!(
            "@reply-parent-msg-id={} PRIVMSG {channel} :{text}",
            escape_tag_value(&single_line(id))
        ),
        None => format!("PRIVMSG {channel} :{text}"),
    }
}
