//! A small language for crafting malformed-at-will HTTP and WebSocket
//! messages, with byte-exact fault injection.
//!
//! A spec like `400:m'go away':b@100k,digits:d2000` parses to a [`Response`]
//! template: status 400, a custom reason, 100 KiB of generated digits, and a
//! disconnect after exactly 2000 bytes. [`serve`] renders a template to any
//! [`std::io::Write`] sink, executing pauses, disconnects, and byte
//! injections at their precise offsets.
//!
//! ```
//! use faultwire::{parse_response, serve, Settings};
//!
//! let resp = parse_response("200:b'hello'").unwrap();
//! let settings = Settings::default();
//! let mut out = Vec::new();
//! let summary = serve(&resp, &mut out, &settings).unwrap();
//! assert!(!summary.disconnected);
//! assert!(out.ends_with(b"hello"));
//! ```
//!
//! Templates with randomized content (generated values, random offsets) can
//! be pinned with [`Message::freeze`] so repeated renders emit identical
//! bytes.

pub mod ast;
pub mod message;
pub mod parser;
pub mod settings;
pub mod value;
pub mod websocket;
pub mod writer;

pub use ast::{Action, Header, HeaderShortcut, MethodToken, Offset, PauseDuration, Token};
pub use message::{reason_phrase, Message, Request, RequestFlavor, Response, ResponseFlavor};
pub use parser::{parse_request, parse_requests, parse_response, ParseError};
pub use settings::Settings;
pub use value::{ByteSource, DataClass, RenderError, SizeUnit, Value};
pub use writer::{serve, write_values, WriteSummary, BLOCKSIZE};
