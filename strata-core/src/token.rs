//! Ring tokens and token ranges.
//!
//! Tokens are Murmur3 long tokens: the ring spans `i64::MIN..=i64::MAX` and
//! wraps from `MAX` back to `MIN`. A [`Range`] is the half-open interval
//! `(left, right]`; when `left >= right` it wraps around the ring.

use std::fmt;

/// A position on the hash ring.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Token(i64);

impl Token {
    /// Lower sentinel of the ring.
    pub const MIN: Self = Self(i64::MIN);
    /// Upper sentinel of the ring.
    pub const MAX: Self = Self(i64::MAX);

    /// Creates a token from a raw Murmur3 value.
    #[inline]
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw token value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Returns true for the lower sentinel.
    #[inline]
    #[must_use]
    pub const fn is_min(self) -> bool {
        self.0 == i64::MIN
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::MIN => write!(f, "MIN"),
            Self::MAX => write!(f, "MAX"),
            Self(value) => write!(f, "{value}"),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<i64> for Token {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

/// A half-open token interval `(left, right]`.
///
/// Ordering is by `left`, then `right`, so sorted non-wrapping ranges that
/// partition the ring appear in ring order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Range {
    /// Exclusive left bound.
    pub left: Token,
    /// Inclusive right bound.
    pub right: Token,
}

impl Range {
    /// The whole ring as a single non-wrapping range.
    pub const FULL: Self = Self {
        left: Token::MIN,
        right: Token::MAX,
    };

    /// Creates a range `(left, right]`.
    #[must_use]
    pub const fn new(left: Token, right: Token) -> Self {
        Self { left, right }
    }

    /// Returns true if the range wraps past `MAX` back to `MIN`.
    ///
    /// `(t, t]` is the whole ring seen from `t` and therefore wraps too.
    #[must_use]
    pub fn is_wrap_around(&self) -> bool {
        self.left >= self.right
    }

    /// Returns true if the token falls inside `(left, right]`.
    #[must_use]
    pub fn contains(&self, token: Token) -> bool {
        if self.is_wrap_around() {
            token > self.left || token <= self.right
        } else {
            token > self.left && token <= self.right
        }
    }

    /// Splits a wrap-around range into `(left, MAX]` and `(MIN, right]`.
    ///
    /// Halves that would be empty (`left == MAX` or `right == MIN`) are
    /// omitted, so the result holds one or two non-wrapping ranges.
    ///
    /// # Panics
    ///
    /// Panics if the range does not wrap around.
    #[must_use]
    pub fn split_wrap_around(self) -> Vec<Self> {
        assert!(self.is_wrap_around(), "range {self} does not wrap around");
        let mut halves = Vec::with_capacity(2);
        if self.left != Token::MAX {
            halves.push(Self::new(self.left, Token::MAX));
        }
        if !self.right.is_min() {
            halves.push(Self::new(Token::MIN, self.right));
        }
        halves
    }
}

impl fmt::Debug for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?},{:?}]", self.left, self.right)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
