//! Structured chat events built from `PRIVMSG` and `USERNOTICE` lines.
//!
//! Serialized field names are the PascalCase ones WebSocket clients already
//! consume (`User.DisplayName`, `RoomID`, `Emotes[].Positions`, ...).

use std::collections::{BTreeMap, HashMap};

use {
    chatbridge_protocol::ChannelName,
    chrono::{DateTime, TimeZone, Utc},
    serde::Serialize,
};

use crate::irc::IrcMessage;

/// Numeric message kinds as seen by clients.
pub const TYPE_PRIVMSG: i32 = 1;
pub const TYPE_USERNOTICE: i32 = 4;

const ACTION_PREFIX: &str = "\u{1}ACTION ";
const ACTION_SUFFIX: char = '\u{1}';

// ── Types ───────────────────────────────────────────────────────────────────

/// One inbound chat event, forwarded verbatim as a WebSocket text frame.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChatEvent {
    Message(PrivateMessage),
    Notice(UserNoticeMessage),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct User {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "DisplayName")]
    pub display_name: String,
    #[serde(rename = "Color")]
    pub color: String,
    #[serde(rename = "Badges")]
    pub badges: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmotePosition {
    #[serde(rename = "Start")]
    pub start: usize,
    #[serde(rename = "End")]
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Emote {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Count")]
    pub count: usize,
    #[serde(rename = "Positions")]
    pub positions: Vec<EmotePosition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplyParent {
    #[serde(rename = "ParentMsgID")]
    pub parent_msg_id: String,
    #[serde(rename = "ParentUserID")]
    pub parent_user_id: String,
    #[serde(rename = "ParentUserLogin")]
    pub parent_user_login: String,
    #[serde(rename = "ParentDisplayName")]
    pub parent_display_name: String,
    #[serde(rename = "ParentMsgBody")]
    pub parent_msg_body: String,
}

/// Fields shared by every event kind.
#[derive(Debug, Clone, Serialize)]
pub struct EventBase {
    #[serde(rename = "User")]
    pub user: User,
    #[serde(rename = "Raw")]
    pub raw: String,
    #[serde(rename = "Type")]
    pub kind: i32,
    #[serde(rename = "RawType")]
    pub raw_type: String,
    #[serde(rename = "Tags")]
    pub tags: BTreeMap<String, String>,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Channel")]
    pub channel: String,
    #[serde(rename = "RoomID")]
    pub room_id: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Time")]
    pub time: DateTime<Utc>,
    #[serde(rename = "Emotes")]
    pub emotes: Vec<Emote>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrivateMessage {
    #[serde(flatten)]
    pub base: EventBase,
    #[serde(rename = "Bits")]
    pub bits: i64,
    #[serde(rename = "Action")]
    pub action: bool,
    #[serde(rename = "FirstMessage")]
    pub first_message: bool,
    #[serde(rename = "Reply", skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyParent>,
    #[serde(rename = "CustomRewardID")]
    pub custom_reward_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserNoticeMessage {
    #[serde(flatten)]
    pub base: EventBase,
    #[serde(rename = "MsgID")]
    pub msg_id: String,
    #[serde(rename = "MsgParams")]
    pub msg_params: BTreeMap<String, String>,
    #[serde(rename = "SystemMsg")]
    pub system_msg: String,
}

// ── Construction ────────────────────────────────────────────────────────────

impl ChatEvent {
    /// Build an event from a parsed line. Lines other than `PRIVMSG` and
    /// `USERNOTICE`, or lacking a channel parameter, yield `None`.
    pub fn from_irc(msg: &IrcMessage) -> Option<Self> {
        match msg.command.as_str() {
            "PRIVMSG" => PrivateMessage::from_irc(msg).map(Self::Message),
            "USERNOTICE" => UserNoticeMessage::from_irc(msg).map(Self::Notice),
            _ => None,
        }
    }

    pub fn base(&self) -> &EventBase {
        match self {
            Self::Message(m) => &m.base,
            Self::Notice(n) => &n.base,
        }
    }

    /// Routing key for this event.
    pub fn channel(&self) -> ChannelName {
        ChannelName::new(&self.base().channel)
    }

    pub fn text(&self) -> &str {
        &self.base().message
    }
}

impl PrivateMessage {
    pub fn from_irc(msg: &IrcMessage) -> Option<Self> {
        let mut base = EventBase::from_irc(msg, TYPE_PRIVMSG)?;
        base.user.name = msg.nick().unwrap_or_default().to_string();

        let (text, action) = strip_action(&base.message);
        if action {
            base.message = text.to_string();
        }
        base.emotes = parse_emotes(msg.tag("emotes").unwrap_or_default(), &base.message);

        let reply = msg.tag("reply-parent-msg-id").map(|id| ReplyParent {
            parent_msg_id: id.to_string(),
            parent_user_id: tag_string(msg, "reply-parent-user-id"),
            parent_user_login: tag_string(msg, "reply-parent-user-login"),
            parent_display_name: tag_string(msg, "reply-parent-display-name"),
            parent_msg_body: tag_string(msg, "reply-parent-msg-body"),
        });

        Some(Self {
            bits: msg.tag("bits").and_then(|b| b.parse().ok()).unwrap_or(0),
            action,
            first_message: msg.tag("first-msg") == Some("1"),
            reply,
            custom_reward_id: tag_string(msg, "custom-reward-id"),
            base,
        })
    }
}

impl UserNoticeMessage {
    pub fn from_irc(msg: &IrcMessage) -> Option<Self> {
        let mut base = EventBase::from_irc(msg, TYPE_USERNOTICE)?;
        base.user.name = tag_string(msg, "login");
        base.emotes = parse_emotes(msg.tag("emotes").unwrap_or_default(), &base.message);

        let msg_params = msg
            .tags
            .iter()
            .filter(|(k, _)| k.starts_with("msg-param-"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Some(Self {
            msg_id: tag_string(msg, "msg-id"),
            msg_params,
            system_msg: tag_string(msg, "system-msg"),
            base,
        })
    }
}

impl EventBase {
    fn from_irc(msg: &IrcMessage, kind: i32) -> Option<Self> {
        let channel = msg.param(0)?;
        let channel = channel.strip_prefix('#').unwrap_or(channel).to_string();

        Some(Self {
            user: User {
                id: tag_string(msg, "user-id"),
                name: String::new(),
                display_name: tag_string(msg, "display-name"),
                color: tag_string(msg, "color"),
                badges: parse_badges(msg.tag("badges").unwrap_or_default()),
            },
            raw: msg.raw.clone(),
            kind,
            raw_type: msg.command.clone(),
            tags: sorted(&msg.tags),
            message: msg.param(1).unwrap_or_default().to_string(),
            channel,
            room_id: tag_string(msg, "room-id"),
            id: tag_string(msg, "id"),
            time: parse_timestamp(msg.tag("tmi-sent-ts")),
            emotes: Vec::new(),
        })
    }
}

// ── Tag helpers ─────────────────────────────────────────────────────────────

fn tag_string(msg: &IrcMessage, key: &str) -> String {
    msg.tag(key).unwrap_or_default().to_string()
}

fn sorted(tags: &HashMap<String, String>) -> BTreeMap<String, String> {
    tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

fn strip_action(text: &str) -> (&str, bool) {
    match text.strip_prefix(ACTION_PREFIX) {
        Some(rest) => (rest.strip_suffix(ACTION_SUFFIX).unwrap_or(rest), true),
        None => (text, false),
    }
}

/// `subscriber/6,premium/1` → `{subscriber: 6, premium: 1}`.
fn parse_badges(raw: &str) -> BTreeMap<String, i64> {
    raw.split(',')
        .filter_map(|badge| badge.split_once('/'))
        .map(|(name, version)| (name.to_string(), version.parse().unwrap_or(0)))
        .collect()
}

/// Millisecond unix timestamp; missing or malformed values fall back to now.
fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|ts| ts.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now)
}

/// `25:0-4,12-16/1902:6-10`. Positions index Unicode scalar values in
/// `message`, inclusive on both ends.
fn parse_emotes(raw: &str, message: &str) -> Vec<Emote> {
    let chars: Vec<char> = message.chars().collect();
    raw.split('/')
        .filter_map(|entry| entry.split_once(':'))
        .filter_map(|(id, ranges)| {
            let positions: Vec<EmotePosition> = ranges
                .split(',')
                .filter_map(|range| range.split_once('-'))
                .filter_map(|(start, end)| {
                    Some(EmotePosition {
                        start: start.parse().ok()?,
                        end: end.parse().ok()?,
                    })
                })
                .collect();
            let first = positions.first()?;
            let name = if first.start <= first.end && first.end < chars.len() {
                chars[first.start..=first.end].iter().collect()
            } else {
                String::new()
            };
            Some(Emote {
                name,
                id: id.to_string(),
                count: positions.len(),
                positions,
            })
        })
        .collect()
}
