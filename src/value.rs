//! Values: the byte-content producers a message is assembled from.
//!
//! A [`Value`] is a literal (quoted or naked), a procedurally generated byte
//! sequence (`@100k,digits`), or a file reference (`<path`) sandboxed to
//! `Settings::staticdir`. Rendering a value yields a [`ByteSource`]: a lazy,
//! random-access byte producer the writer can slice at arbitrary offsets
//! without materializing very large generated bodies.
//!
//! Generated values are randomized templates until [`Value::freeze`] captures
//! their bytes as a literal; freezing is idempotent.

use crate::settings::Settings;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Component, Path, PathBuf};

/// Failure to resolve, freeze, or render a message.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("file access disabled: no static directory configured")]
    FileAccessDisabled,
    #[error("file access outside of static directory: {0}")]
    FileOutsideRoot(String),
    #[error("file not readable: {0}")]
    FileUnreadable(String),
    #[error("cannot resolve websocket handshake: no websocket key in settings")]
    MissingWebsocketKey,
    #[error("message is missing a required {0} token")]
    MissingToken(&'static str),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ==================== Byte sources ====================

/// A lazy, random-access byte producer with a known total length.
///
/// `slice(start, end)` must be a pure function of the source and the range:
/// re-reading a range yields the same bytes, and adjacent ranges concatenate
/// to the same bytes as one larger range, whatever chunking the writer picks.
pub trait ByteSource {
    fn len(&self) -> u64;
    fn slice(&self, start: u64, end: u64) -> Vec<u8>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fully materialized bytes: literals and file contents.
pub struct LiteralSource(pub Vec<u8>);

impl ByteSource for LiteralSource {
    fn len(&self) -> u64 {
        self.0.len() as u64
    }

    fn slice(&self, start: u64, end: u64) -> Vec<u8> {
        let end = end.min(self.len());
        let start = start.min(end);
        self.0[start as usize..end as usize].to_vec()
    }
}

/// Internal generation block: bytes are produced per fixed-size block so any
/// chunking of the same source observes the same bytes.
const GEN_BLOCK: u64 = 4096;

/// Procedurally generated bytes of a given size and data class, derived from
/// a seed drawn once when the source is built.
pub struct RandomSource {
    size: u64,
    class: DataClass,
    seed: u64,
}

impl RandomSource {
    pub fn new(size: u64, class: DataClass, seed: u64) -> Self {
        RandomSource { size, class, seed }
    }

    fn block(&self, idx: u64) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ idx.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        let n = GEN_BLOCK.min(self.size - idx * GEN_BLOCK) as usize;
        let mut out = Vec::with_capacity(n);
        match self.class.alphabet() {
            Some(alphabet) => {
                for _ in 0..n {
                    out.push(alphabet[rng.random_range(0..alphabet.len())]);
                }
            }
            None => {
                for _ in 0..n {
                    out.push(rng.random());
                }
            }
        }
        out
    }
}

impl ByteSource for RandomSource {
    fn len(&self) -> u64 {
        self.size
    }

    fn slice(&self, start: u64, end: u64) -> Vec<u8> {
        let end = end.min(self.size);
        let start = start.min(end);
        let mut out = Vec::with_capacity((end - start) as usize);
        let mut pos = start;
        while pos < end {
            let idx = pos / GEN_BLOCK;
            let block = self.block(idx);
            let b_start = (pos - idx * GEN_BLOCK) as usize;
            let b_end = block.len().min(b_start + (end - pos) as usize);
            out.extend_from_slice(&block[b_start..b_end]);
            pos += (b_end - b_start) as u64;
        }
        out
    }
}

// ==================== Data classes and units ====================

/// Alphabet tag for generated content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataClass {
    /// Raw bytes, the default: any value 0x00-0xff.
    #[default]
    Bytes,
    Ascii,
    AsciiLetters,
    AsciiLowercase,
    AsciiUppercase,
    Digits,
    Hexdigits,
    Octdigits,
    Letters,
    Lowercase,
    Uppercase,
    Printable,
    Punctuation,
    Whitespace,
}

const ASCII_ALL: &[u8] = &{
    let mut t = [0u8; 128];
    let mut i = 0;
    while i < 128 {
        t[i] = i as u8;
        i += 1;
    }
    t
};
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const HEXDIGITS: &[u8] = b"0123456789abcdefABCDEF";
const OCTDIGITS: &[u8] = b"01234567";
const PUNCTUATION: &[u8] = b"!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";
const WHITESPACE: &[u8] = b" \t\n\r\x0b\x0c";
const PRINTABLE: &[u8] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~ \t\n\r\x0b\x0c";

impl DataClass {
    pub fn from_name(name: &str) -> Option<DataClass> {
        Some(match name {
            "bytes" => DataClass::Bytes,
            "ascii" => DataClass::Ascii,
            "ascii_letters" => DataClass::AsciiLetters,
            "ascii_lowercase" => DataClass::AsciiLowercase,
            "ascii_uppercase" => DataClass::AsciiUppercase,
            "digits" => DataClass::Digits,
            "hexdigits" => DataClass::Hexdigits,
            "octdigits" => DataClass::Octdigits,
            "letters" => DataClass::Letters,
            "lowercase" => DataClass::Lowercase,
            "uppercase" => DataClass::Uppercase,
            "printable" => DataClass::Printable,
            "punctuation" => DataClass::Punctuation,
            "whitespace" => DataClass::Whitespace,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataClass::Bytes => "bytes",
            DataClass::Ascii => "ascii",
            DataClass::AsciiLetters => "ascii_letters",
            DataClass::AsciiLowercase => "ascii_lowercase",
            DataClass::AsciiUppercase => "ascii_uppercase",
            DataClass::Digits => "digits",
            DataClass::Hexdigits => "hexdigits",
            DataClass::Octdigits => "octdigits",
            DataClass::Letters => "letters",
            DataClass::Lowercase => "lowercase",
            DataClass::Uppercase => "uppercase",
            DataClass::Printable => "printable",
            DataClass::Punctuation => "punctuation",
            DataClass::Whitespace => "whitespace",
        }
    }

    /// The byte alphabet to draw from, or None for the full 0x00-0xff range.
    fn alphabet(&self) -> Option<&'static [u8]> {
        match self {
            DataClass::Bytes => None,
            DataClass::Ascii => Some(ASCII_ALL),
            DataClass::AsciiLetters | DataClass::Letters => Some(LETTERS),
            DataClass::AsciiLowercase | DataClass::Lowercase => Some(LOWERCASE),
            DataClass::AsciiUppercase | DataClass::Uppercase => Some(UPPERCASE),
            DataClass::Digits => Some(DIGITS),
            DataClass::Hexdigits => Some(HEXDIGITS),
            DataClass::Octdigits => Some(OCTDIGITS),
            DataClass::Printable => Some(PRINTABLE),
            DataClass::Punctuation => Some(PUNCTUATION),
            DataClass::Whitespace => Some(WHITESPACE),
        }
    }
}

/// Size multiplier suffix for generated values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeUnit {
    #[default]
    Bytes,
    Kilo,
    Mega,
    Giga,
}

impl SizeUnit {
    pub fn from_suffix(s: &str) -> Option<SizeUnit> {
        Some(match s {
            "b" => SizeUnit::Bytes,
            "k" => SizeUnit::Kilo,
            "m" => SizeUnit::Mega,
            "g" => SizeUnit::Giga,
            _ => return None,
        })
    }

    pub fn multiplier(&self) -> u64 {
        match self {
            SizeUnit::Bytes => 1,
            SizeUnit::Kilo => 1024,
            SizeUnit::Mega => 1024 * 1024,
            SizeUnit::Giga => 1024 * 1024 * 1024,
        }
    }

    /// Spec suffix; the default unit is omitted (`@1`, not `@1b`).
    pub fn suffix(&self) -> &'static str {
        match self {
            SizeUnit::Bytes => "",
            SizeUnit::Kilo => "k",
            SizeUnit::Mega => "m",
            SizeUnit::Giga => "g",
        }
    }
}

// ==================== Values ====================

/// A byte-content producer as written in a spec.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Fixed bytes. `naked` literals were written without quotes and must
    /// serialize back without them.
    Literal { val: Vec<u8>, naked: bool },
    /// Procedurally generated bytes of `size * unit` length.
    Generated {
        size: u64,
        unit: SizeUnit,
        class: DataClass,
    },
    /// Contents of a file under `Settings::staticdir`.
    File { path: String, quoted: bool },
}

impl Value {
    pub fn literal(val: impl Into<Vec<u8>>) -> Value {
        Value::Literal {
            val: val.into(),
            naked: false,
        }
    }

    pub fn naked(val: impl Into<Vec<u8>>) -> Value {
        Value::Literal {
            val: val.into(),
            naked: true,
        }
    }

    /// Exact byte length, if known without consulting settings. File values
    /// report None: their length comes from the filesystem at render time.
    pub fn length(&self) -> Option<u64> {
        match self {
            Value::Literal { val, .. } => Some(val.len() as u64),
            Value::Generated { size, unit, .. } => size.checked_mul(unit.multiplier()),
            Value::File { .. } => None,
        }
    }

    /// Byte source for rendering. Generated values draw a fresh seed from
    /// settings, so two calls on an unfrozen template yield different bytes;
    /// freeze first for cross-render determinism.
    pub fn get_generator(&self, settings: &Settings) -> Result<Box<dyn ByteSource>, RenderError> {
        match self {
            Value::Literal { val, .. } => Ok(Box::new(LiteralSource(val.clone()))),
            // The parser rejects sizes whose product overflows; saturate for
            // directly constructed values rather than panic.
            Value::Generated { size, unit, class } => Ok(Box::new(RandomSource::new(
                size.saturating_mul(unit.multiplier()),
                *class,
                settings.seed(),
            ))),
            Value::File { path, .. } => {
                let resolved = resolve_static_path(path, settings)?;
                let data = std::fs::read(resolved)?;
                Ok(Box::new(LiteralSource(data)))
            }
        }
    }

    /// Materialize all bytes. Avoid for very large generated values.
    pub fn to_bytes(&self, settings: &Settings) -> Result<Vec<u8>, RenderError> {
        let g = self.get_generator(settings)?;
        Ok(g.slice(0, g.len()))
    }

    /// Replace randomized or external content with fixed bytes. Idempotent:
    /// freezing a frozen value is a no-op.
    pub fn freeze(&self, settings: &Settings) -> Result<Value, RenderError> {
        match self {
            Value::Literal { .. } => Ok(self.clone()),
            Value::Generated { .. } | Value::File { .. } => {
                Ok(Value::literal(self.to_bytes(settings)?))
            }
        }
    }

    /// Canonical spec text; parses back to a value with identical bytes.
    pub fn spec(&self) -> String {
        match self {
            Value::Literal { val, naked: true } => escape_bytes(val, None),
            Value::Literal { val, naked: false } => {
                format!("'{}'", escape_bytes(val, Some(b'\'')))
            }
            Value::Generated { size, unit, class } => {
                let mut s = format!("@{}{}", size, unit.suffix());
                if *class != DataClass::Bytes {
                    s.push(',');
                    s.push_str(class.name());
                }
                s
            }
            Value::File { path, quoted: true } => {
                format!("<'{}'", escape_bytes(path.as_bytes(), Some(b'\'')))
            }
            Value::File {
                path,
                quoted: false,
            } => format!("<{}", escape_bytes(path.as_bytes(), None)),
        }
    }
}

// ==================== Sandbox ====================

/// Resolve a file value's logical path against the static directory.
///
/// The joined path is normalized lexically (no symlink resolution, an
/// abspath-and-prefix check) and must stay inside the root.
fn resolve_static_path(path: &str, settings: &Settings) -> Result<PathBuf, RenderError> {
    let root = settings
        .staticdir
        .as_ref()
        .ok_or(RenderError::FileAccessDisabled)?;
    let root = normalize(root);
    let joined = normalize(&root.join(path));
    if !joined.starts_with(&root) {
        return Err(RenderError::FileOutsideRoot(path.to_string()));
    }
    if !joined.is_file() {
        return Err(RenderError::FileUnreadable(path.to_string()));
    }
    Ok(joined)
}

fn normalize(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in p.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// ==================== Escaping ====================

/// Escape bytes for spec text. Backslash, the quote byte (if any), and
/// non-printable bytes become escape sequences; printable ASCII passes
/// through.
pub fn escape_bytes(val: &[u8], quote: Option<u8>) -> String {
    let mut out = String::with_capacity(val.len());
    for &b in val {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            _ if Some(b) == quote => {
                out.push('\\');
                out.push(b as char);
            }
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out
}

/// Reverse [`escape_bytes`]: decode backslash escapes to raw bytes. Unknown
/// escapes keep the backslash, like the original language did.
pub fn unescape(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c as u8);
            continue;
        }
        match chars.next() {
            Some('x') => {
                let hi = chars.next();
                let lo = chars.next();
                match (
                    hi.and_then(|h| h.to_digit(16)),
                    lo.and_then(|l| l.to_digit(16)),
                ) {
                    (Some(h), Some(l)) => out.push((h * 16 + l) as u8),
                    _ => {
                        out.push(b'\\');
                        out.push(b'x');
                        if let Some(h) = hi {
                            out.push(h as u8);
                        }
                        if let Some(l) = lo {
                            out.push(l as u8);
                        }
                    }
                }
            }
            Some('n') => out.push(b'\n'),
            Some('r') => out.push(b'\r'),
            Some('t') => out.push(b'\t'),
            Some(c @ ('\\' | '\'' | '"')) => out.push(c as u8),
            Some(other) => {
                out.push(b'\\');
                out.push(other as u8);
            }
            None => out.push(b'\\'),
        }
    }
    out
}
