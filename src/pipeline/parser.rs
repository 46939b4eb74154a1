//! Filter-chain descriptor parser using winnow.
//!
//! Parses linear filter chains:
//!
//! ```text
//! identity
//! negate=planes=1,delay=frames=2
//! format=pix_fmts=yuv420p|nv12,tblend=frames=3
//! ```
//!
//! # Syntax
//!
//! - Filters are separated by `,` (whitespace around it is ignored)
//! - A filter is a name, optionally followed by `=key=value:key=value...`
//! - `,`, `=` and `:` are reserved; inside a value they must be escaped with
//!   `\` or wrapped in single quotes (`'a,b'`)
//! - Duplicate keys are allowed; the last value wins
//!
//! Keys are not validated here. Each filter interprets its own options when
//! it is constructed.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use winnow::Parser;
use winnow::ascii::multispace0;
use winnow::combinator::{alt, fail};
use winnow::error::{ContextError, StrContext};
use winnow::token::{any, take_till, take_while};

type WResult<T> = std::result::Result<T, ContextError>;

/// Characters that delimit filters, keys and values.
const RESERVED: [char; 3] = [',', '=', ':'];

/// One filter in a parsed chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    /// Filter kind name (e.g. `identity`).
    pub name: String,
    /// Options in key order.
    pub options: FilterOptions,
}

impl FilterSpec {
    /// Create a filter token with no options.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: FilterOptions::new(),
        }
    }

    /// Add an option, replacing any earlier value for the key.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key, value);
        self
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, (key, value)) in self.options.iter().enumerate() {
            f.write_str(if i == 0 { "=" } else { ":" })?;
            write!(f, "{key}=")?;
            for c in value.chars() {
                if RESERVED.contains(&c) || c == '\\' || c == '\'' || c.is_whitespace() {
                    f.write_str("\\")?;
                }
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

/// String key/value options of one filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    values: BTreeMap<String, String>,
}

impl FilterOptions {
    /// Create an empty option map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option. Returns the value it replaced, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    /// Get an option verbatim.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Check whether an option is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of options.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if there are no options.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate options in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Fail with [`Error::InvalidOption`] if any key is not in `known`.
    pub fn ensure_known(&self, filter: &str, known: &[&str]) -> Result<()> {
        match self.values.keys().find(|k| !known.contains(&k.as_str())) {
            Some(key) => Err(Error::InvalidOption {
                filter: filter.to_string(),
                key: key.clone(),
                reason: if known.is_empty() {
                    "filter takes no options".to_string()
                } else {
                    format!("unknown option, expected one of: {}", known.join(", "))
                },
            }),
            None => Ok(()),
        }
    }

    /// Parse an option with [`FromStr`].
    pub fn parse<T>(&self, filter: &str, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| Error::InvalidOption {
                    filter: filter.to_string(),
                    key: key.to_string(),
                    reason: format!("'{raw}': {e}"),
                })
            })
            .transpose()
    }

    /// Parse an unsigned integer option.
    pub fn get_u64(&self, filter: &str, key: &str) -> Result<Option<u64>> {
        self.parse::<u64>(filter, key)
    }
}

/// Parse a descriptor into its filter specs, in chain order.
///
/// # Example
///
/// ```rust
/// use planefilter::pipeline::parser::parse_descriptor;
///
/// let chain = parse_descriptor("negate=planes=1,delay=frames=2").unwrap();
/// assert_eq!(chain.len(), 2);
/// assert_eq!(chain[1].name, "delay");
/// assert_eq!(chain[1].options.get("frames"), Some("2"));
/// ```
pub fn parse_descriptor(input: &str) -> Result<Vec<FilterSpec>> {
    descriptor
        .parse(input)
        .map_err(|e| Error::MalformedDescriptor {
            offset: e.offset(),
            reason: describe(e.inner()),
        })
}

fn describe(err: &ContextError) -> String {
    err.context()
        .find_map(|c| match c {
            StrContext::Label(label) => Some(label.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| match err.to_string() {
            s if s.is_empty() => "syntax error".to_string(),
            s => s,
        })
}

/// Fail at the current position with a diagnostic.
fn reject<T>(input: &mut &str, reason: &'static str) -> WResult<T> {
    fail.context(StrContext::Label(reason)).parse_next(input)
}

/// Parse a complete chain.
fn descriptor(input: &mut &str) -> WResult<Vec<FilterSpec>> {
    let _ = multispace0.parse_next(input)?;
    let mut filters = vec![filter.parse_next(input)?];

    loop {
        let _ = multispace0.parse_next(input)?;
        if input.is_empty() {
            return Ok(filters);
        }
        if input.starts_with(['=', ':']) {
            return reject(input, "unescaped reserved character in value");
        }
        if !input.starts_with(',') {
            return reject(input, "expected ',' between filters");
        }
        let _ = ','.parse_next(input)?;
        let _ = multispace0.parse_next(input)?;
        filters.push(filter.parse_next(input)?);
    }
}

/// Parse one filter token: `name` or `name=key=value:...`.
fn filter(input: &mut &str) -> WResult<FilterSpec> {
    let name = match identifier.parse_next(input) {
        Ok(name) => name,
        Err(_) => return reject(input, "empty filter name"),
    };

    let mut options = FilterOptions::new();
    if input.starts_with('=') {
        let _ = '='.parse_next(input)?;
        loop {
            let (key, value) = param.parse_next(input)?;
            options.insert(key, value);
            if !input.starts_with(':') {
                break;
            }
            let _ = ':'.parse_next(input)?;
        }
    }

    Ok(FilterSpec {
        name: name.to_string(),
        options,
    })
}

/// Parse a filter name.
fn identifier<'a>(input: &mut &'a str) -> WResult<&'a str> {
    (
        take_while(1, |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
    )
        .take()
        .parse_next(input)
}

/// Parse `key=value`.
fn param(input: &mut &str) -> WResult<(String, String)> {
    let key: WResult<&str> = take_while(1.., is_key_char).parse_next(input);
    let key = match key {
        Ok(key) => key,
        Err(_) => return reject(input, "expected an option key"),
    };
    if !input.starts_with('=') {
        return reject(input, "option key without a value");
    }
    let _ = '='.parse_next(input)?;
    let value = value.parse_next(input)?;
    Ok((key.to_string(), value))
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}

fn is_value_delimiter(c: char) -> bool {
    RESERVED.contains(&c) || c.is_whitespace()
}

/// Parse an option value: plain runs, `'quoted'` runs and `\` escapes.
fn value(input: &mut &str) -> WResult<String> {
    let mut out = String::new();
    let mut consumed = false;

    loop {
        let Some(next) = input.chars().next() else {
            break;
        };
        if is_value_delimiter(next) {
            break;
        }
        consumed = true;

        match next {
            '\'' => {
                let _ = '\''.parse_next(input)?;
                let quoted: &str = take_till(0.., '\'').parse_next(input)?;
                if input.is_empty() {
                    return reject(input, "unterminated quote");
                }
                let _ = '\''.parse_next(input)?;
                out.push_str(quoted);
            }
            '\\' => {
                let _ = '\\'.parse_next(input)?;
                let escaped: char = alt((any, |i: &mut &str| reject(i, "dangling escape")))
                    .parse_next(input)?;
                out.push(escaped);
            }
            _ => {
                let plain: &str =
                    take_till(1.., |c: char| is_value_delimiter(c) || c == '\'' || c == '\\')
                        .parse_next(input)?;
                out.push_str(plain);
            }
        }
    }

    if !consumed {
        return reject(input, "missing option value");
    }
    Ok(out)
}
