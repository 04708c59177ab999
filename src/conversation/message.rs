use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    Drawing,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        use MessageKind::*;
        match self {
            Text => "text",
            Image => "image",
            Audio => "audio",
            Drawing => "drawing",
        }
    }
}

impl FromStr for MessageKind {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use MessageKind::*;
        Ok(match s {
            "text" => Text,
            "image" => Image,
            "audio" => Audio,
            "drawing" => Drawing,
            other => return Err(ChatError::InvalidMessage(format!("unknown kind {other:?}"))),
        })
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recipient acknowledgement. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Sent,
    Delivered,
    Seen,
}

impl DeliveryState {
    pub(crate) fn rank(self) -> i64 {
        self as i64
    }

    pub(crate) fn from_rank(rank: i64) -> DeliveryState {
        match rank {
            i64::MIN..=0 => DeliveryState::Sent,
            1 => DeliveryState::Delivered,
            _ => DeliveryState::Seen,
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", format!("{self:?}").to_lowercase())
    }
}

/// A message as stored and delivered to subscribers.
///
/// Every kind carries all four payload fields; only the one matching `kind` is
/// non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub seq: i64,
    pub pairing_id: String,
    pub sender_id: String,
    pub sender_display_name: String,
    pub kind: MessageKind,
    pub text: String,
    pub image_url: String,
    pub audio_url: String,
    pub drawing_url: String,
    /// Server-assigned, non-decreasing within a pairing.
    pub timestamp: i64,
    /// The sender's own clock, for display only.
    pub sent_at: Option<i64>,
    pub reactions: BTreeMap<String, String>,
    pub delivery_state: DeliveryState,
}

/// What a sender submits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Draft {
    pub kind: Option<MessageKind>,
    pub text: String,
    pub image_url: String,
    pub audio_url: String,
    pub drawing_url: String,
    pub sent_at: Option<i64>,
    /// Idempotency key; resubmitting the same token yields the same message.
    pub client_token: Option<String>,
}

impl Draft {
    pub fn text(text: impl Into<String>) -> Draft {
        Draft { kind: Some(MessageKind::Text), text: text.into(), ..Default::default() }
    }

    /// A media message pointing at an already hosted `url`.
    pub fn media(kind: MessageKind, url: impl Into<String>) -> Draft {
        let url = url.into();
        let mut draft = Draft { kind: Some(kind), ..Default::default() };
        match kind {
            MessageKind::Text => draft.text = url,
            MessageKind::Image => draft.image_url = url,
            MessageKind::Audio => draft.audio_url = url,
            MessageKind::Drawing => draft.drawing_url = url,
        }
        draft
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Draft {
        self.client_token = Some(token.into());
        self
    }

    /// Checks the kind is set and exactly its payload field is filled, trimming text.
    pub fn validate(mut self) -> Result<(MessageKind, Draft), ChatError> {
        let kind = self
            .kind
            .ok_or_else(|| ChatError::InvalidMessage("missing kind".to_owned()))?;

        self.text = self.text.trim().to_owned();
        let fields = [
            (MessageKind::Text, &self.text),
            (MessageKind::Image, &self.image_url),
            (MessageKind::Audio, &self.audio_url),
            (MessageKind::Drawing, &self.drawing_url),
        ];
        for (field_kind, value) in fields {
            let filled = !value.trim().is_empty();
            if field_kind == kind && !filled {
                return Err(ChatError::InvalidMessage(format!("{kind} message has no payload")));
            }
            if field_kind != kind && filled {
                return Err(ChatError::InvalidMessage(format!(
                    "{kind} message also carries a {field_kind} payload"
                )));
            }
        }

        if self.client_token.as_deref().is_some_and(|t| t.trim().is_empty()) {
            self.client_token = None;
        }

        Ok((kind, self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_states_are_ordered() {
        assert!(DeliveryState::Sent < DeliveryState::Delivered);
        assert!(DeliveryState::Delivered < DeliveryState::Seen);
        for state in [DeliveryState::Sent, DeliveryState::Delivered, DeliveryState::Seen] {
            assert_eq!(DeliveryState::from_rank(state.rank()), state);
        }
        assert_eq!(DeliveryState::Seen.to_string(), "seen");
    }

    #[test]
    fn kinds_parse_from_their_names() {
        for kind in [MessageKind::Text, MessageKind::Image, MessageKind::Audio, MessageKind::Drawing] {
            assert_eq!(kind.as_str().parse::<MessageKind>().unwrap(), kind);
        }
        assert!("video".parse::<MessageKind>().is_err());
    }

    #[test]
    fn drafts_need_exactly_their_own_payload() {
        let (kind, draft) = Draft::text("  hi  ").validate().unwrap();
        assert_eq!(kind, MessageKind::Text);
        assert_eq!(draft.text, "hi");

        assert!(Draft::text("   ").validate().is_err());
        assert!(Draft::default().validate().is_err());

        let mut mixed = Draft::media(MessageKind::Image, "https://img/1.png");
        mixed.audio_url = "https://audio/1.webm".into();
        assert!(mixed.validate().is_err());

        let (kind, draft) = Draft::media(MessageKind::Drawing, "https://img/d.png").validate().unwrap();
        assert_eq!(kind, MessageKind::Drawing);
        assert_eq!(draft.drawing_url, "https://img/d.png");
    }

    #[test]
    fn draft_json_uses_camel_case() {
        let draft: Draft =
            serde_json::from_str(r#"{"kind":"audio","audioUrl":"https://a/1","clientToken":"t1"}"#).unwrap();
        assert_eq!(draft, Draft::media(MessageKind::Audio, "https://a/1").with_token("t1"));
    }
}
