//! Parse spec text into message templates using PEST.
//!
//! The grammar is validated eagerly: malformed numeric offsets, unknown data
//! classes, and nested specs that do not parse are all rejected here, so the
//! only failures left for resolve/freeze time are environmental (sandbox,
//! missing websocket key).

use crate::ast::{Action, Header, MethodToken, Offset, PauseDuration, Token};
use crate::message::{Request, RequestFlavor, Response, ResponseFlavor};
use crate::value::{unescape, DataClass, SizeUnit, Value};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct SpecParser;

/// A spec failed to parse. Carries the position and the offending fragment.
#[derive(Debug, Clone, thiserror::Error)]
#[error("parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    /// The offending line or fragment of input.
    pub fragment: String,
    pub message: String,
}

impl ParseError {
    fn from_pest(e: pest::error::Error<Rule>) -> ParseError {
        let (line, column) = match e.line_col {
            pest::error::LineColLocation::Pos((l, c)) => (l, c),
            pest::error::LineColLocation::Span((l, c), _) => (l, c),
        };
        let fragment = e.line().to_string();
        ParseError {
            line,
            column,
            fragment,
            message: e.variant.message().into_owned(),
        }
    }

    fn at(pair: &Pair<Rule>, message: impl Into<String>) -> ParseError {
        let (line, column) = pair.line_col();
        ParseError {
            line,
            column,
            fragment: pair.as_str().to_string(),
            message: message.into(),
        }
    }

    /// Human-readable pointer: the offending fragment with a caret under the
    /// failing column.
    pub fn marked(&self) -> String {
        format!(
            "{}\n{}^",
            self.fragment,
            " ".repeat(self.column.saturating_sub(1))
        )
    }
}

// ==================== Entry points ====================

/// Parse one or more whitespace-separated request specs.
pub fn parse_requests(source: &str) -> Result<Vec<Request>, ParseError> {
    let mut pairs =
        SpecParser::parse(Rule::requests, source).map_err(ParseError::from_pest)?;
    let root = match pairs.next() {
        Some(p) => p,
        None => return Ok(Vec::new()),
    };
    let mut out = Vec::new();
    for pair in root.into_inner() {
        if pair.as_rule() == Rule::request {
            out.push(build_request(pair)?);
        }
    }
    Ok(out)
}

/// Parse a single request spec.
pub fn parse_request(source: &str) -> Result<Request, ParseError> {
    parse_requests(source)?.into_iter().next().ok_or(ParseError {
        line: 1,
        column: 1,
        fragment: source.to_string(),
        message: "empty request spec".to_string(),
    })
}

/// Parse a single response spec.
pub fn parse_response(source: &str) -> Result<Response, ParseError> {
    let mut pairs =
        SpecParser::parse(Rule::response_spec, source).map_err(ParseError::from_pest)?;
    let root = pairs.next().ok_or(ParseError {
        line: 1,
        column: 1,
        fragment: source.to_string(),
        message: "empty response spec".to_string(),
    })?;
    for pair in root.into_inner() {
        if pair.as_rule() == Rule::response {
            return build_response(pair);
        }
    }
    Err(ParseError {
        line: 1,
        column: 1,
        fragment: source.to_string(),
        message: "empty response spec".to_string(),
    })
}

// ==================== Messages ====================

/// Sole child of a pair. The grammar guarantees one for every rule this is
/// used on; a miss means the grammar and the tree walker have diverged.
fn only_child(pair: Pair<Rule>) -> Result<Pair<Rule>, ParseError> {
    let span = pair.clone();
    pair.into_inner()
        .next()
        .ok_or_else(|| ParseError::at(&span, "internal: malformed parse tree"))
}

fn build_request(pair: Pair<Rule>) -> Result<Request, ParseError> {
    let inner = only_child(pair)?;
    let flavor = match inner.as_rule() {
        Rule::http_request => RequestFlavor::Http,
        Rule::ws_request => RequestFlavor::Websocket,
        Rule::wf_request => RequestFlavor::WebsocketFrame,
        other => return Err(ParseError::at(&inner, format!("unexpected rule {:?}", other))),
    };
    let mut tokens = Vec::new();
    for part in inner.into_inner() {
        match part.as_rule() {
            Rule::method => tokens.push(Token::Method(build_method(part)?)),
            Rule::path => tokens.push(Token::Path(build_path(part)?)),
            Rule::request_token => tokens.push(build_request_token(part)?),
            _ => {}
        }
    }
    Ok(Request { flavor, tokens })
}

fn build_response(pair: Pair<Rule>) -> Result<Response, ParseError> {
    let inner = only_child(pair)?;
    let flavor = match inner.as_rule() {
        Rule::http_response => ResponseFlavor::Http,
        Rule::ws_response => ResponseFlavor::Websocket,
        other => return Err(ParseError::at(&inner, format!("unexpected rule {:?}", other))),
    };
    let mut tokens = Vec::new();
    for part in inner.into_inner() {
        match part.as_rule() {
            Rule::code => {
                let code: u16 = part
                    .as_str()
                    .parse()
                    .map_err(|_| ParseError::at(&part, "status code out of range"))?;
                tokens.push(Token::Code(code));
            }
            // A quoted literal directly after the code is reason sugar.
            Rule::literal => tokens.push(Token::Reason(build_literal(part))),
            Rule::response_token => tokens.push(build_response_token(part)?),
            _ => {}
        }
    }
    Ok(Response { flavor, tokens })
}

// ==================== Tokens ====================

fn build_request_token(pair: Pair<Rule>) -> Result<Token, ParseError> {
    let inner = only_child(pair)?;
    Ok(match inner.as_rule() {
        Rule::header => Token::Header(build_header(inner)?),
        Rule::ctype => Token::Header(Header::content_type(first_value(inner)?)),
        Rule::location => Token::Header(Header::location(first_value(inner)?)),
        Rule::useragent => Token::Header(build_useragent(inner)?),
        Rule::body => Token::Body(first_value(inner)?),
        Rule::nested => build_nested(inner)?,
        Rule::raw => Token::Raw,
        Rule::inject | Rule::disconnect | Rule::pause => Token::Action(build_action(inner)?),
        other => return Err(ParseError::at(&inner, format!("unexpected token {:?}", other))),
    })
}

fn build_response_token(pair: Pair<Rule>) -> Result<Token, ParseError> {
    let inner = only_child(pair)?;
    Ok(match inner.as_rule() {
        Rule::header => Token::Header(build_header(inner)?),
        Rule::ctype => Token::Header(Header::content_type(first_value(inner)?)),
        Rule::location => Token::Header(Header::location(first_value(inner)?)),
        Rule::body => Token::Body(first_value(inner)?),
        Rule::reason => Token::Reason(first_value(inner)?),
        Rule::raw => Token::Raw,
        Rule::inject | Rule::disconnect | Rule::pause => Token::Action(build_action(inner)?),
        other => return Err(ParseError::at(&inner, format!("unexpected token {:?}", other))),
    })
}

fn build_header(pair: Pair<Rule>) -> Result<Header, ParseError> {
    let span = pair.clone();
    let mut values = pair.into_inner().filter(|p| p.as_rule() == Rule::value);
    let key = values
        .next()
        .ok_or_else(|| ParseError::at(&span, "internal: malformed parse tree"))?;
    let value = values
        .next()
        .ok_or_else(|| ParseError::at(&span, "internal: malformed parse tree"))?;
    Ok(Header {
        key: build_value(key)?,
        value: build_value(value)?,
        shortcut: None,
    })
}

fn build_useragent(pair: Pair<Rule>) -> Result<Header, ParseError> {
    let span = pair.clone();
    let inner = only_child(pair)?;
    match inner.as_rule() {
        Rule::value => Ok(Header::user_agent(build_value(inner)?)),
        Rule::ua_shortcut => {
            let letter = inner.as_str().chars().next().unwrap_or('a');
            Header::user_agent_shortcut(letter)
                .ok_or_else(|| ParseError::at(&span, format!("unknown user agent shortcut: u{}", letter)))
        }
        other => Err(ParseError::at(&span, format!("unexpected rule {:?}", other))),
    }
}

fn build_nested(pair: Pair<Rule>) -> Result<Token, ParseError> {
    let span = pair.clone();
    let literal = only_child(pair)?;
    let raw = unescape(inner_text(&literal));
    let text = String::from_utf8(raw)
        .map_err(|_| ParseError::at(&span, "nested spec must be text"))?;
    let response = parse_response(&text)
        .map_err(|e| ParseError::at(&span, format!("nested response spec: {}", e.message)))?;
    Ok(Token::Nested(Box::new(response)))
}

fn build_action(pair: Pair<Rule>) -> Result<Action, ParseError> {
    let rule = pair.as_rule();
    let span = pair.clone();
    let mut inner = pair.into_inner();
    let offset = build_offset(inner.next().ok_or_else(|| ParseError::at(&span, "missing offset"))?)?;
    Ok(match rule {
        Rule::disconnect => Action::DisconnectAt { offset },
        Rule::pause => {
            let time = inner
                .next()
                .ok_or_else(|| ParseError::at(&span, "missing pause duration"))?;
            let duration = match time.as_str() {
                "f" => PauseDuration::Forever,
                s => PauseDuration::Seconds(
                    s.parse()
                        .map_err(|_| ParseError::at(&time, "pause duration out of range"))?,
                ),
            };
            Action::PauseAt { offset, duration }
        }
        Rule::inject => {
            let value = inner
                .next()
                .ok_or_else(|| ParseError::at(&span, "missing inject value"))?;
            Action::InjectAt {
                offset,
                value: build_value(value)?,
            }
        }
        other => return Err(ParseError::at(&span, format!("unexpected action {:?}", other))),
    })
}

fn build_offset(pair: Pair<Rule>) -> Result<Offset, ParseError> {
    Ok(match pair.as_str() {
        "r" => Offset::Random,
        "a" => Offset::After,
        s => Offset::Absolute(
            s.parse()
                .map_err(|_| ParseError::at(&pair, "offset out of range"))?,
        ),
    })
}

// ==================== Values ====================

fn build_method(pair: Pair<Rule>) -> Result<MethodToken, ParseError> {
    let span = pair.clone();
    let inner = only_child(pair)?;
    match inner.as_rule() {
        Rule::method_option => MethodToken::from_option(inner.as_str())
            .ok_or_else(|| ParseError::at(&span, "unknown method shortcut")),
        Rule::value => Ok(MethodToken::Explicit(build_value(inner)?)),
        other => Err(ParseError::at(&span, format!("unexpected rule {:?}", other))),
    }
}

fn build_path(pair: Pair<Rule>) -> Result<Value, ParseError> {
    let inner = only_child(pair)?;
    match inner.as_rule() {
        Rule::value => build_value(inner),
        Rule::naked => Ok(Value::naked(unescape(inner.as_str()))),
        other => Err(ParseError::at(&inner, format!("unexpected rule {:?}", other))),
    }
}

fn first_value(pair: Pair<Rule>) -> Result<Value, ParseError> {
    let span = pair.clone();
    pair.into_inner()
        .find(|p| p.as_rule() == Rule::value)
        .map(build_value)
        .transpose()?
        .ok_or_else(|| ParseError::at(&span, "missing value"))
}

fn build_value(pair: Pair<Rule>) -> Result<Value, ParseError> {
    let inner = only_child(pair)?;
    match inner.as_rule() {
        Rule::literal => Ok(build_literal(inner)),
        Rule::generated => build_generated(inner),
        Rule::filevalue => build_filevalue(inner),
        other => Err(ParseError::at(&inner, format!("unexpected value {:?}", other))),
    }
}

fn build_literal(pair: Pair<Rule>) -> Value {
    Value::literal(unescape(inner_text(&pair)))
}

/// Body text of a quoted literal pair.
fn inner_text<'a>(pair: &'a Pair<Rule>) -> &'a str {
    pair.clone()
        .into_inner()
        .next()
        .map(|p| p.as_str())
        .unwrap_or("")
}

fn build_generated(pair: Pair<Rule>) -> Result<Value, ParseError> {
    let span = pair.clone();
    let mut size = 0u64;
    let mut unit = SizeUnit::Bytes;
    let mut class = DataClass::Bytes;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::num => {
                size = part
                    .as_str()
                    .parse()
                    .map_err(|_| ParseError::at(&part, "generated size out of range"))?;
            }
            Rule::unit => {
                unit = SizeUnit::from_suffix(part.as_str())
                    .ok_or_else(|| ParseError::at(&part, "unknown size unit"))?;
            }
            Rule::dataclass => {
                class = DataClass::from_name(part.as_str()).ok_or_else(|| {
                    ParseError::at(&part, format!("unknown data class: {}", part.as_str()))
                })?;
            }
            _ => {}
        }
    }
    if size.checked_mul(unit.multiplier()).is_none() {
        return Err(ParseError::at(&span, "generated size out of range"));
    }
    Ok(Value::Generated { size, unit, class })
}

fn build_filevalue(pair: Pair<Rule>) -> Result<Value, ParseError> {
    let span = pair.clone();
    let inner = only_child(pair)?;
    match inner.as_rule() {
        Rule::literal => {
            let raw = unescape(inner_text(&inner));
            let path = String::from_utf8(raw)
                .map_err(|_| ParseError::at(&span, "file path must be text"))?;
            Ok(Value::File { path, quoted: true })
        }
        Rule::naked => {
            let raw = unescape(inner.as_str());
            let path = String::from_utf8(raw)
                .map_err(|_| ParseError::at(&span, "file path must be text"))?;
            Ok(Value::File {
                path,
                quoted: false,
            })
        }
        other => Err(ParseError::at(&span, format!("unexpected rule {:?}", other))),
    }
}
