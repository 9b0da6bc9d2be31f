//! Tokens and actions: the typed units a parsed message is made of.
//!
//! Each token knows how to serialize itself back to spec text (`spec()`), and
//! the token stream round-trips: parsing the serialized form yields a message
//! with identical rendered bytes. Header shortcuts remember their surface
//! form (`c'foo'` stays `c'foo'`) while behaving as plain headers.

use crate::message::{Message, Response};
use crate::settings::Settings;
use crate::value::{escape_bytes, RenderError, Value};
use rand::rngs::StdRng;
use rand::Rng;

/// Canned User-Agent strings reachable through the `u<letter>` shortcut.
pub const USER_AGENTS: &[(&str, char, &str)] = &[
    (
        "android",
        'a',
        "Mozilla/5.0 (Linux; U; Android 4.1.1; en-gb; Nexus 7 Build/JRO03D) AppleWebKit/535.19 (KHTML, like Gecko) Chrome/18.0.1025.166 Safari/535.19",
    ),
    (
        "chrome",
        'c',
        "Mozilla/5.0 (Windows NT 6.1; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/41.0.2228.0 Safari/537.36",
    ),
    (
        "firefox",
        'f',
        "Mozilla/5.0 (Windows NT 6.1; WOW64; rv:40.0) Gecko/20100101 Firefox/40.1",
    ),
    (
        "ie9",
        'i',
        "Mozilla/5.0 (compatible; MSIE 9.0; Windows NT 6.1; Trident/5.0)",
    ),
    (
        "safari",
        's',
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_10_1) AppleWebKit/600.2.5 (KHTML, like Gecko) Version/8.0.2 Safari/600.2.5",
    ),
];

/// One lexical unit of a message spec.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Method(MethodToken),
    Path(Value),
    Code(u16),
    Reason(Value),
    Header(Header),
    Body(Value),
    /// Suppresses auto-computed framing headers (Content-Length, Host).
    Raw,
    /// A full response spec embedded as a value (`s'200:b@1'`).
    Nested(Box<Response>),
    Action(Action),
}

impl Token {
    pub fn spec(&self) -> String {
        match self {
            Token::Method(m) => m.spec(),
            Token::Path(v) => v.spec(),
            Token::Code(c) => c.to_string(),
            Token::Reason(v) => format!("m{}", v.spec()),
            Token::Header(h) => h.spec(),
            Token::Body(v) => format!("b{}", v.spec()),
            Token::Raw => "r".to_string(),
            Token::Nested(resp) => {
                format!("s'{}'", escape_bytes(resp.spec().as_bytes(), Some(b'\'')))
            }
            Token::Action(a) => a.spec(),
        }
    }

    /// Freeze any randomized content inside the token.
    pub fn freeze(&self, settings: &Settings) -> Result<Token, RenderError> {
        Ok(match self {
            Token::Method(m) => Token::Method(m.freeze(settings)?),
            Token::Path(v) => Token::Path(v.freeze(settings)?),
            Token::Reason(v) => Token::Reason(v.freeze(settings)?),
            Token::Header(h) => Token::Header(h.freeze(settings)?),
            Token::Body(v) => Token::Body(v.freeze(settings)?),
            Token::Nested(resp) => Token::Nested(Box::new(resp.freeze(settings)?)),
            Token::Action(a) => Token::Action(a.freeze(settings)?),
            Token::Code(_) | Token::Raw => self.clone(),
        })
    }
}

/// A request method: one of the recognized shortcuts, or an explicit value.
///
/// Shortcut methods render uppercase on the wire and serialize lowercase in
/// spec text; explicit values pass through untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodToken {
    Get,
    Head,
    Post,
    Put,
    Explicit(Value),
}

impl MethodToken {
    pub fn from_option(s: &str) -> Option<MethodToken> {
        Some(match s.to_ascii_lowercase().as_str() {
            "get" => MethodToken::Get,
            "head" => MethodToken::Head,
            "post" => MethodToken::Post,
            "put" => MethodToken::Put,
            _ => return None,
        })
    }

    /// The value rendered on the wire.
    pub fn value(&self) -> Value {
        match self {
            MethodToken::Get => Value::literal("GET"),
            MethodToken::Head => Value::literal("HEAD"),
            MethodToken::Post => Value::literal("POST"),
            MethodToken::Put => Value::literal("PUT"),
            MethodToken::Explicit(v) => v.clone(),
        }
    }

    pub fn spec(&self) -> String {
        match self {
            MethodToken::Get => "get".to_string(),
            MethodToken::Head => "head".to_string(),
            MethodToken::Post => "post".to_string(),
            MethodToken::Put => "put".to_string(),
            MethodToken::Explicit(v) => v.spec(),
        }
    }

    pub fn freeze(&self, settings: &Settings) -> Result<MethodToken, RenderError> {
        Ok(match self {
            MethodToken::Explicit(v) => MethodToken::Explicit(v.freeze(settings)?),
            other => other.clone(),
        })
    }
}

/// Surface form a header was written in, kept so `spec()` round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderShortcut {
    /// `c<value>` = Content-Type.
    ContentType,
    /// `l<value>` = Location.
    Location,
    /// `u<value>` or `u<letter>` = User-Agent; the letter picks a canned
    /// browser string from [`USER_AGENTS`].
    UserAgent(Option<char>),
}

/// A key/value header pair of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub key: Value,
    pub value: Value,
    pub shortcut: Option<HeaderShortcut>,
}

impl Header {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Header {
        Header {
            key: Value::literal(key),
            value: Value::literal(value),
            shortcut: None,
        }
    }

    pub fn content_type(value: Value) -> Header {
        Header {
            key: Value::literal("Content-Type"),
            value,
            shortcut: Some(HeaderShortcut::ContentType),
        }
    }

    pub fn location(value: Value) -> Header {
        Header {
            key: Value::literal("Location"),
            value,
            shortcut: Some(HeaderShortcut::Location),
        }
    }

    pub fn user_agent(value: Value) -> Header {
        Header {
            key: Value::literal("User-Agent"),
            value,
            shortcut: Some(HeaderShortcut::UserAgent(None)),
        }
    }

    /// Canned User-Agent by shortcut letter.
    pub fn user_agent_shortcut(letter: char) -> Option<Header> {
        let (_, _, agent) = USER_AGENTS.iter().find(|(_, c, _)| *c == letter)?;
        Some(Header {
            key: Value::literal("User-Agent"),
            value: Value::literal(*agent),
            shortcut: Some(HeaderShortcut::UserAgent(Some(letter))),
        })
    }

    pub fn spec(&self) -> String {
        match self.shortcut {
            Some(HeaderShortcut::ContentType) => format!("c{}", self.value.spec()),
            Some(HeaderShortcut::Location) => format!("l{}", self.value.spec()),
            Some(HeaderShortcut::UserAgent(Some(letter))) => format!("u{}", letter),
            Some(HeaderShortcut::UserAgent(None)) => format!("u{}", self.value.spec()),
            None => format!("h{}={}", self.key.spec(), self.value.spec()),
        }
    }

    pub fn freeze(&self, settings: &Settings) -> Result<Header, RenderError> {
        Ok(Header {
            key: self.key.freeze(settings)?,
            value: self.value.freeze(settings)?,
            shortcut: self.shortcut,
        })
    }
}

// ==================== Actions ====================

/// Where in the rendered message an action fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offset {
    /// Absolute byte offset from the start of the rendered message.
    Absolute(u64),
    /// `r`: a uniformly chosen offset within the rendered message.
    Random,
    /// `a`: fires once all message bytes have been written.
    After,
}

impl Offset {
    pub fn spec(&self) -> String {
        match self {
            Offset::Absolute(n) => n.to_string(),
            Offset::Random => "r".to_string(),
            Offset::After => "a".to_string(),
        }
    }
}

/// Pause length: a number of seconds or `f` for blocking forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseDuration {
    Seconds(u64),
    Forever,
}

impl PauseDuration {
    pub fn spec(&self) -> String {
        match self {
            PauseDuration::Seconds(s) => s.to_string(),
            PauseDuration::Forever => "f".to_string(),
        }
    }
}

/// A scheduled side effect tied to a byte offset.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    DisconnectAt { offset: Offset },
    PauseAt { offset: Offset, duration: PauseDuration },
    InjectAt { offset: Offset, value: Value },
}

impl Action {
    pub fn offset(&self) -> Offset {
        match self {
            Action::DisconnectAt { offset } => *offset,
            Action::PauseAt { offset, .. } => *offset,
            Action::InjectAt { offset, .. } => *offset,
        }
    }

    pub fn spec(&self) -> String {
        match self {
            Action::DisconnectAt { offset } => format!("d{}", offset.spec()),
            Action::PauseAt { offset, duration } => {
                format!("p{},{}", offset.spec(), duration.spec())
            }
            Action::InjectAt { offset, value } => format!("i{},{}", offset.spec(), value.spec()),
        }
    }

    pub fn freeze(&self, settings: &Settings) -> Result<Action, RenderError> {
        Ok(match self {
            Action::InjectAt { offset, value } => Action::InjectAt {
                offset: *offset,
                value: value.freeze(settings)?,
            },
            other => other.clone(),
        })
    }

    /// True for actions that affect timing or connection state rather than
    /// bytes; these are stripped from preview-safe messages.
    pub fn is_timing(&self) -> bool {
        matches!(self, Action::DisconnectAt { .. } | Action::PauseAt { .. })
    }

    /// Bind the symbolic offset against a concrete rendered length and
    /// materialize the injected byte source.
    pub fn resolve(
        &self,
        settings: &Settings,
        total_len: u64,
        rng: &mut StdRng,
    ) -> Result<ResolvedAction, RenderError> {
        let offset = match self.offset() {
            Offset::Absolute(n) => n,
            Offset::After => total_len,
            Offset::Random => {
                if total_len == 0 {
                    0
                } else {
                    rng.random_range(0..total_len)
                }
            }
        };
        let kind = match self {
            Action::DisconnectAt { .. } => ResolvedActionKind::Disconnect,
            Action::PauseAt { duration, .. } => ResolvedActionKind::Pause(*duration),
            Action::InjectAt { value, .. } => {
                ResolvedActionKind::Inject(value.get_generator(settings)?)
            }
        };
        Ok(ResolvedAction { offset, kind })
    }
}

/// An action with its offset bound to a concrete byte position.
///
/// Sorted ascending by offset with a stable sort, so actions at the same
/// offset keep their declaration order across runs.
pub struct ResolvedAction {
    pub offset: u64,
    pub kind: ResolvedActionKind,
}

pub enum ResolvedActionKind {
    Disconnect,
    Pause(PauseDuration),
    Inject(Box<dyn crate::value::ByteSource>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ResponseFlavor;
    use crate::value::{DataClass, SizeUnit};

    #[test]
    fn nested_token_serializes_and_freezes() {
        let resp = Response {
            flavor: ResponseFlavor::Http,
            tokens: vec![
                Token::Code(200),
                Token::Body(Value::Generated {
                    size: 3,
                    unit: SizeUnit::Bytes,
                    class: DataClass::Digits,
                }),
            ],
        };
        let t = Token::Nested(Box::new(resp));
        assert_eq!(t.spec(), "s'200:b@3,digits'");

        let settings = Settings {
            testing: true,
            ..Default::default()
        };
        let frozen = t.freeze(&settings).expect("freeze");
        match frozen {
            Token::Nested(inner) => match inner.body() {
                Some(Value::Literal { val, .. }) => assert_eq!(val.len(), 3),
                other => panic!("expected frozen literal body, got {:?}", other),
            },
            other => panic!("expected nested token, got {:?}", other),
        }
    }

    #[test]
    fn action_spec_forms() {
        assert_eq!(
            Action::DisconnectAt {
                offset: Offset::Random
            }
            .spec(),
            "dr"
        );
        assert_eq!(
            Action::DisconnectAt {
                offset: Offset::Absolute(10)
            }
            .spec(),
            "d10"
        );
        assert_eq!(
            Action::PauseAt {
                offset: Offset::Random,
                duration: PauseDuration::Seconds(5)
            }
            .spec(),
            "pr,5"
        );
        assert_eq!(
            Action::PauseAt {
                offset: Offset::Absolute(0),
                duration: PauseDuration::Forever
            }
            .spec(),
            "p0,f"
        );
    }

    #[test]
    fn resolve_binds_symbolic_offsets() {
        let settings = Settings {
            testing: true,
            ..Default::default()
        };
        let mut rng = settings.rng();
        let a = Action::DisconnectAt {
            offset: Offset::After,
        };
        let r = a.resolve(&settings, 37, &mut rng).expect("resolve");
        assert_eq!(r.offset, 37);

        let a = Action::DisconnectAt {
            offset: Offset::Random,
        };
        let r = a.resolve(&settings, 37, &mut rng).expect("resolve");
        assert!(r.offset < 37);
    }

    #[test]
    fn header_shortcut_spec_roundtrip_form() {
        let h = Header::content_type(Value::literal("text/plain"));
        assert_eq!(h.spec(), "c'text/plain'");
        let h = Header::user_agent_shortcut('a').expect("android agent");
        assert_eq!(h.spec(), "ua");
        match &h.value {
            Value::Literal { val, .. } => {
                assert!(String::from_utf8_lossy(val).contains("Android"))
            }
            other => panic!("expected literal, got {:?}", other),
        }
    }
}
