//! String-parsed size and channel selections used by the CLI and config.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One side of a [`Geometry`]: absolute pixels or a percentage of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    Pixels(usize),
    Percent(usize),
}

impl Extent {
    fn resolve(self, current: usize) -> usize {
        match self {
            Extent::Pixels(n) => n,
            Extent::Percent(p) => current * p / 100,
        }
    }
}

impl FromStr for Extent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (digits, percent) = match s.strip_suffix('%') {
            Some(digits) => (digits, true),
            None => (s, false),
        };
        let n: usize = digits
            .trim()
            .parse()
            .map_err(|_| format!("invalid size '{s}'"))?;
        if n == 0 {
            return Err(format!("size '{s}' must be positive"));
        }
        Ok(if percent {
            Extent::Percent(n)
        } else {
            Extent::Pixels(n)
        })
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extent::Pixels(n) => write!(f, "{n}"),
            Extent::Percent(p) => write!(f, "{p}%"),
        }
    }
}

/// Target size such as `640x480`, `200%x150%` or `200%` (both sides).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: Extent,
    pub height: Extent,
}

impl Geometry {
    /// Pixel size for an input of `width × height`.
    pub fn resolve(&self, width: usize, height: usize) -> (usize, usize) {
        (self.width.resolve(width), self.height.resolve(height))
    }
}

impl FromStr for Geometry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(['x', 'X']) {
            Some((w, h)) => Ok(Self {
                width: w.parse()?,
                height: h.parse()?,
            }),
            None => {
                let both: Extent = s.parse()?;
                Ok(Self {
                    width: both,
                    height: both,
                })
            }
        }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Inclusive range of processed channels, written `0-2` or `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelRange {
    pub first: usize,
    pub last: usize,
}

impl ChannelRange {
    pub fn as_range(&self) -> Range<usize> {
        self.first..self.last + 1
    }
}

impl FromStr for ChannelRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |v: &str| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid channel range '{s}'"))
        };
        let (first, last) = match s.split_once('-') {
            Some((a, b)) => (parse(a)?, parse(b)?),
            None => {
                let c = parse(s)?;
                (c, c)
            }
        };
        if first > last {
            return Err(format!("channel range '{s}' is reversed"));
        }
        Ok(Self { first, last })
    }
}

impl TryFrom<String> for ChannelRange {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ChannelRange> for String {
    fn from(range: ChannelRange) -> Self {
        format!("{}-{}", range.first, range.last)
    }
}
