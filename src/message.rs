//! Messages: requests and responses as ordered token sequences.
//!
//! A parsed message is a template: it may contain symbolic action offsets and
//! randomized values. `resolve` binds it against settings (websocket sugar
//! expanded, default headers computed unless the raw flag is set) and
//! `freeze` additionally fixes all randomized content. Resolution always
//! produces a new token sequence; templates are immutable.

use crate::ast::{Action, Header, MethodToken, Token};
use crate::settings::Settings;
use crate::value::{ByteSource, LiteralSource, RenderError, Value};
use crate::websocket;

/// Common behavior of requests and responses.
pub trait Message: Sized + Clone {
    fn tokens(&self) -> &[Token];

    /// Same message kind, new token sequence.
    fn with_tokens(&self, tokens: Vec<Token>) -> Self;

    /// Bind symbolic content against settings: expand websocket sugar and
    /// compute default headers (unless raw). Returns a new message.
    fn resolve(&self, settings: &Settings) -> Result<Self, RenderError>;

    /// Ordered byte sources for the rendered message.
    fn values(&self, settings: &Settings) -> Result<Vec<Box<dyn ByteSource>>, RenderError>;

    /// Textual spec form; parses back to an equivalent message.
    fn spec(&self) -> String;

    fn headers(&self) -> Vec<&Header> {
        self.tokens()
            .iter()
            .filter_map(|t| match t {
                Token::Header(h) => Some(h),
                _ => None,
            })
            .collect()
    }

    fn body(&self) -> Option<&Value> {
        self.tokens().iter().find_map(|t| match t {
            Token::Body(v) => Some(v),
            _ => None,
        })
    }

    fn actions(&self) -> Vec<&Action> {
        self.tokens()
            .iter()
            .filter_map(|t| match t {
                Token::Action(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    fn raw(&self) -> bool {
        self.tokens().iter().any(|t| matches!(t, Token::Raw))
    }

    /// Resolve, then fix all randomized content to concrete bytes.
    /// Idempotent: freezing a frozen message yields identical bytes.
    fn freeze(&self, settings: &Settings) -> Result<Self, RenderError> {
        let resolved = self.resolve(settings)?;
        let tokens = resolved
            .tokens()
            .iter()
            .map(|t| t.freeze(settings))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(resolved.with_tokens(tokens))
    }

    /// Total rendered byte length of the resolved message.
    fn length(&self, settings: &Settings) -> Result<u64, RenderError> {
        let vals = self.resolve(settings)?.values(settings)?;
        Ok(vals.iter().map(|v| v.len()).sum())
    }

    /// Upper bound on bytes the sink can receive, injected bytes included.
    /// Always >= the actual rendered byte count.
    fn maximum_length(&self, settings: &Settings) -> Result<u64, RenderError> {
        let mut total = self.length(settings)?;
        for action in self.actions() {
            if let Action::InjectAt { value, .. } = action {
                total += value.get_generator(settings)?.len();
            }
        }
        Ok(total)
    }

    /// Copy with pause and disconnect actions stripped, for display only.
    /// Never use the result for actual transmission.
    fn preview_safe(&self) -> Self {
        let tokens = self
            .tokens()
            .iter()
            .filter(|t| !matches!(t, Token::Action(a) if a.is_timing()))
            .cloned()
            .collect();
        self.with_tokens(tokens)
    }
}

// ==================== Request ====================

/// How a request renders on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFlavor {
    Http,
    /// `ws:` sugar; resolves to an HTTP Upgrade handshake.
    Websocket,
    /// `wf:` renders a raw WebSocket frame instead of an HTTP preamble.
    WebsocketFrame,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub flavor: RequestFlavor,
    pub tokens: Vec<Token>,
}

impl Request {
    pub fn method(&self) -> Option<&MethodToken> {
        self.tokens.iter().find_map(|t| match t {
            Token::Method(m) => Some(m),
            _ => None,
        })
    }

    pub fn path(&self) -> Option<&Value> {
        self.tokens.iter().find_map(|t| match t {
            Token::Path(v) => Some(v),
            _ => None,
        })
    }
}

impl Message for Request {
    fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    fn with_tokens(&self, tokens: Vec<Token>) -> Self {
        Request {
            flavor: self.flavor,
            tokens,
        }
    }

    fn resolve(&self, settings: &Settings) -> Result<Self, RenderError> {
        let mut tokens = self.tokens.clone();
        match self.flavor {
            RequestFlavor::WebsocketFrame => {
                return Ok(self.clone());
            }
            RequestFlavor::Websocket => {
                if self.method().is_none() {
                    tokens.insert(0, Token::Method(MethodToken::Get));
                }
                let key = match &settings.websocket_key {
                    Some(k) => k.clone(),
                    None => websocket::client_key(&mut settings.rng()),
                };
                tokens.push(Token::Header(Header::new("Upgrade", "websocket")));
                tokens.push(Token::Header(Header::new("Connection", "Upgrade")));
                tokens.push(Token::Header(Header::new("Sec-WebSocket-Key", key)));
                tokens.push(Token::Header(Header::new("Sec-WebSocket-Version", "13")));
            }
            RequestFlavor::Http => {}
        }

        if !self.raw() {
            add_default_headers(&mut tokens, settings, true)?;
        }

        let resolved = Request {
            flavor: RequestFlavor::Http,
            tokens,
        };
        if resolved.method().is_none() {
            return Err(RenderError::MissingToken("method"));
        }
        if resolved.path().is_none() {
            return Err(RenderError::MissingToken("path"));
        }
        Ok(resolved)
    }

    fn values(&self, settings: &Settings) -> Result<Vec<Box<dyn ByteSource>>, RenderError> {
        match self.flavor {
            RequestFlavor::Websocket => {
                return self.resolve(settings)?.values(settings);
            }
            RequestFlavor::WebsocketFrame => {
                let payload: Box<dyn ByteSource> = match self.body() {
                    Some(v) => v.get_generator(settings)?,
                    None => Box::new(LiteralSource(Vec::new())),
                };
                let header = websocket::frame_header(payload.len());
                return Ok(vec![Box::new(LiteralSource(header)), payload]);
            }
            RequestFlavor::Http => {}
        }

        let method = self
            .method()
            .ok_or(RenderError::MissingToken("method"))?
            .value();
        let path = self.path().ok_or(RenderError::MissingToken("path"))?;

        let mut vals: Vec<Box<dyn ByteSource>> = Vec::new();
        vals.push(method.get_generator(settings)?);
        vals.push(lit(" "));
        vals.push(path.get_generator(settings)?);
        vals.push(lit(" HTTP/1.1\r\n"));
        push_header_values(&mut vals, self.headers(), settings)?;
        vals.push(lit("\r\n"));
        if let Some(body) = self.body() {
            vals.push(body.get_generator(settings)?);
        }
        for token in &self.tokens {
            if let Token::Nested(resp) = token {
                vals.push(Box::new(LiteralSource(resp.spec().into_bytes())));
            }
        }
        Ok(vals)
    }

    fn spec(&self) -> String {
        let joined = join_specs(&self.tokens);
        match self.flavor {
            RequestFlavor::Http => joined,
            RequestFlavor::Websocket => prefix_spec("ws", &joined),
            RequestFlavor::WebsocketFrame => prefix_spec("wf", &joined),
        }
    }
}

// ==================== Response ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFlavor {
    Http,
    /// `ws` sugar; resolves to a 101 upgrade response.
    Websocket,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub flavor: ResponseFlavor,
    pub tokens: Vec<Token>,
}

impl Response {
    pub fn code(&self) -> Option<u16> {
        self.tokens.iter().find_map(|t| match t {
            Token::Code(c) => Some(*c),
            _ => None,
        })
    }

    pub fn reason(&self) -> Option<&Value> {
        self.tokens.iter().find_map(|t| match t {
            Token::Reason(v) => Some(v),
            _ => None,
        })
    }
}

impl Message for Response {
    fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    fn with_tokens(&self, tokens: Vec<Token>) -> Self {
        Response {
            flavor: self.flavor,
            tokens,
        }
    }

    fn resolve(&self, settings: &Settings) -> Result<Self, RenderError> {
        let mut tokens = self.tokens.clone();
        if self.flavor == ResponseFlavor::Websocket {
            let key = settings
                .websocket_key
                .as_ref()
                .ok_or(RenderError::MissingWebsocketKey)?;
            tokens.insert(0, Token::Code(101));
            tokens.push(Token::Header(Header::new("Upgrade", "websocket")));
            tokens.push(Token::Header(Header::new("Connection", "Upgrade")));
            tokens.push(Token::Header(Header::new(
                "Sec-WebSocket-Accept",
                websocket::accept_key(key),
            )));
        }

        if !self.raw() {
            add_default_headers(&mut tokens, settings, false)?;
        }

        let resolved = Response {
            flavor: ResponseFlavor::Http,
            tokens,
        };
        if resolved.code().is_none() {
            return Err(RenderError::MissingToken("code"));
        }
        Ok(resolved)
    }

    fn values(&self, settings: &Settings) -> Result<Vec<Box<dyn ByteSource>>, RenderError> {
        if self.flavor == ResponseFlavor::Websocket {
            return self.resolve(settings)?.values(settings);
        }
        let code = self.code().ok_or(RenderError::MissingToken("code"))?;

        let mut vals: Vec<Box<dyn ByteSource>> = Vec::new();
        vals.push(lit(format!("HTTP/1.1 {} ", code)));
        match self.reason() {
            Some(reason) => vals.push(reason.get_generator(settings)?),
            None => vals.push(lit(reason_phrase(code))),
        }
        vals.push(lit("\r\n"));
        push_header_values(&mut vals, self.headers(), settings)?;
        vals.push(lit("\r\n"));
        if let Some(body) = self.body() {
            vals.push(body.get_generator(settings)?);
        }
        Ok(vals)
    }

    fn spec(&self) -> String {
        let joined = join_specs(&self.tokens);
        match self.flavor {
            ResponseFlavor::Http => joined,
            ResponseFlavor::Websocket => prefix_spec("ws", &joined),
        }
    }
}

// ==================== Shared helpers ====================

fn lit(s: impl Into<Vec<u8>>) -> Box<dyn ByteSource> {
    Box::new(LiteralSource(s.into()))
}

fn join_specs(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| t.spec())
        .collect::<Vec<_>>()
        .join(":")
}

fn prefix_spec(prefix: &str, joined: &str) -> String {
    if joined.is_empty() {
        prefix.to_string()
    } else {
        format!("{}:{}", prefix, joined)
    }
}

fn push_header_values(
    vals: &mut Vec<Box<dyn ByteSource>>,
    headers: Vec<&Header>,
    settings: &Settings,
) -> Result<(), RenderError> {
    for h in headers {
        vals.push(h.key.get_generator(settings)?);
        vals.push(lit(": "));
        vals.push(h.value.get_generator(settings)?);
        vals.push(lit("\r\n"));
    }
    Ok(())
}

/// Append Content-Length (and Host, for requests) unless already present.
fn add_default_headers(
    tokens: &mut Vec<Token>,
    settings: &Settings,
    is_request: bool,
) -> Result<(), RenderError> {
    let body_len = match tokens.iter().find_map(|t| match t {
        Token::Body(v) => Some(v),
        _ => None,
    }) {
        Some(body) => Some(body.get_generator(settings)?.len()),
        None => None,
    };
    if let Some(len) = body_len {
        if !has_header(tokens, b"content-length") {
            tokens.push(Token::Header(Header::new(
                "Content-Length",
                len.to_string(),
            )));
        }
    }
    if is_request {
        if let Some(host) = &settings.request_host {
            if !has_header(tokens, b"host") {
                tokens.push(Token::Header(Header::new("Host", host.clone())));
            }
        }
    }
    Ok(())
}

fn has_header(tokens: &[Token], lower_key: &[u8]) -> bool {
    tokens.iter().any(|t| match t {
        Token::Header(h) => match &h.key {
            Value::Literal { val, .. } => val.eq_ignore_ascii_case(lower_key),
            _ => false,
        },
        _ => false,
    })
}

/// Standard reason phrase for a status code; `Unknown code` otherwise.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "Unknown code",
    }
}
