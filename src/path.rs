//! Slash-delimited addresses into a [`crate::tree::Tree`].
//!
//! `A/B/x` walks from the current node through children `A` and `B`; a
//! leading `/` starts the walk at the root instead. A step wrapped in double
//! quotes is taken literally and may itself contain slashes, so `"a/b"/x` has
//! two steps, `a/b` and `x`. A closing quote is only recognized right before a
//! `/` or at the end of the input.

use std::borrow::Cow;
use std::fmt;

use crate::error::{ArborError, Result};

pub const SEPARATOR: char = '/';
pub const QUOTE: char = '"';

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path {
    absolute: bool,
    steps: Vec<String>,
}

impl Path {
    pub fn new<I, S>(absolute: bool, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            absolute,
            steps: steps.into_iter().map(Into::into).collect(),
        }
    }

    /// Empty unquoted steps (as in `A//B`) are skipped.
    pub fn parse(input: &str) -> Result<Self> {
        let mut chars = input.chars().peekable();
        let absolute = chars.peek() == Some(&SEPARATOR);
        let mut steps = Vec::new();
        let mut current = String::new();
        let mut quoted = false;
        let mut in_quotes = false;
        while let Some(c) = chars.next() {
            if in_quotes {
                let closes = c == QUOTE && matches!(chars.peek(), None | Some(&SEPARATOR));
                if closes {
                    in_quotes = false;
                } else {
                    current.push(c);
                }
                continue;
            }
            match c {
                SEPARATOR => {
                    if quoted || !current.is_empty() {
                        steps.push(std::mem::take(&mut current));
                    }
                    quoted = false;
                }
                QUOTE if current.is_empty() && !quoted => {
                    quoted = true;
                    in_quotes = true;
                }
                _ if quoted => {
                    return Err(ArborError::InvalidArgument(format!(
                        "unexpected {c:?} after a quoted step in {input:?}"
                    )));
                }
                _ => current.push(c),
            }
        }
        if in_quotes {
            return Err(ArborError::InvalidArgument(format!(
                "unterminated quote in {input:?}"
            )));
        }
        if quoted || !current.is_empty() {
            steps.push(current);
        }
        Ok(Self { absolute, steps })
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }
    pub fn steps(&self) -> &[String] {
        &self.steps
    }
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
    /// Splits a variable path into the node steps and the trailing variable
    /// name.
    pub fn split_variable(&self) -> Result<(&[String], &str)> {
        match self.steps.split_last() {
            Some((name, nodes)) => Ok((nodes, name)),
            None => Err(ArborError::InvalidArgument(
                "a variable path needs at least one step".into(),
            )),
        }
    }
}

/// Quotes a step when it could not be read back as a single plain step.
pub fn quote_step(step: &str) -> Cow<'_, str> {
    if step.is_empty() || step.contains(SEPARATOR) || step.starts_with(QUOTE) {
        Cow::Owned(format!("{QUOTE}{step}{QUOTE}"))
    } else {
        Cow::Borrowed(step)
    }
}

pub fn join_steps<S: AsRef<str>>(absolute: bool, steps: &[S]) -> String {
    let mut out = String::new();
    if absolute {
        out.push(SEPARATOR);
    }
    for (i, step) in steps.iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        out.push_str(&quote_step(step.as_ref()));
    }
    out
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_steps(self.absolute, &self.steps))
    }
}

impl std::str::FromStr for Path {
    type Err = ArborError;
    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
