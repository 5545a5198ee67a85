//! AML name segments and name strings.
//!
//! ACPI names are composed of 4-byte segments. A full name string may carry
//! a root prefix (`\`), any number of parent prefixes (`^`), and zero or more
//! segments joined with `.` in their textual form.

extern crate alloc;

use alloc::vec::Vec;
use core::fmt;

use crate::AmlError;

/// A 4-byte AML name segment (e.g., `_SB_`, `PCI0`, `_HID`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NameSeg(pub [u8; 4]);

impl NameSeg {
    /// The root scope's pseudo-name.
    pub const ROOT: Self = Self(*b"\\___");

    /// Create a `NameSeg` from a 4-byte slice.
    ///
    /// Returns `None` if the slice is shorter than 4 bytes or is not a valid
    /// name segment.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..4)?;
        let mut seg = [0u8; 4];
        seg.copy_from_slice(bytes);
        let seg = Self(seg);
        seg.is_valid().then_some(seg)
    }

    /// Parses a textual segment, padding names shorter than four characters
    /// with `_` the way ASL compilers do.
    #[must_use]
    pub fn from_str_padded(name: &str) -> Option<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > 4 {
            return None;
        }
        let mut seg = [b'_'; 4];
        seg[..bytes.len()].copy_from_slice(bytes);
        let seg = Self(seg);
        seg.is_valid().then_some(seg)
    }

    /// Returns `true` if the segment follows the `LeadNameChar NameChar{3}`
    /// grammar.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        is_lead_name_char(self.0[0]) && self.0[1..].iter().all(|&c| is_name_char(c))
    }

    /// Returns the name as a UTF-8 string (ACPI names are always ASCII).
    #[must_use]
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.0).unwrap_or("")
    }
}

impl fmt::Debug for NameSeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameSeg(\"{}\")", self.as_str())
    }
}

impl fmt::Display for NameSeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `A`-`Z` or `_`.
#[must_use]
pub fn is_lead_name_char(c: u8) -> bool {
    c.is_ascii_uppercase() || c == b'_'
}

/// `A`-`Z`, `0`-`9` or `_`.
#[must_use]
pub fn is_name_char(c: u8) -> bool {
    is_lead_name_char(c) || c.is_ascii_digit()
}

/// A decoded AML `NameString`.
///
/// Holds the prefix information separately from the segments so the
/// namespace can apply the correct search rule: rooted and `^`-prefixed
/// names are resolved exactly, while a bare single segment walks upward
/// through enclosing scopes.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct AmlName {
    root: bool,
    parents: usize,
    segments: Vec<NameSeg>,
}

impl AmlName {
    /// The root name (`\`).
    #[must_use]
    pub fn root() -> Self {
        Self {
            root: true,
            parents: 0,
            segments: Vec::new(),
        }
    }

    /// The empty `NullName`.
    #[must_use]
    pub fn null() -> Self {
        Self::default()
    }

    /// Builds a name from its parts.
    #[must_use]
    pub fn new(root: bool, parents: usize, segments: Vec<NameSeg>) -> Self {
        Self {
            root,
            parents: if root { 0 } else { parents },
            segments,
        }
    }

    /// A bare, single-segment relative name.
    #[must_use]
    pub fn from_seg(seg: NameSeg) -> Self {
        Self::new(false, 0, alloc::vec![seg])
    }

    /// Parses the textual form, e.g. `\_SB.PCI0.LNKA`, `^_SB`, `_HID`.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::NameNotFound`] if the string is not a well-formed
    /// name, since such a path can never resolve.
    pub fn parse(path: &str) -> Result<Self, AmlError> {
        let invalid = || AmlError::NameNotFound(alloc::string::String::from(path));
        let mut rest = path;
        let root = rest.starts_with('\\');
        if root {
            rest = &rest[1..];
        }
        let mut parents = 0;
        while let Some(stripped) = rest.strip_prefix('^') {
            if root {
                return Err(invalid());
            }
            parents += 1;
            rest = stripped;
        }
        let mut segments = Vec::new();
        if !rest.is_empty() {
            for part in rest.split('.') {
                segments.push(NameSeg::from_str_padded(part).ok_or_else(invalid)?);
            }
        }
        if !root && parents == 0 && segments.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(root, parents, segments))
    }

    /// Whether the name starts with `\`.
    #[must_use]
    pub fn is_absolute(&self) -> bool {
        self.root
    }

    /// Number of leading `^` prefixes.
    #[must_use]
    pub fn parent_count(&self) -> usize {
        self.parents
    }

    /// Whether this is the `NullName`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        !self.root && self.parents == 0 && self.segments.is_empty()
    }

    /// Whether the upward search rule applies: a single relative segment,
    /// with the search starting after any `^` hops.
    #[must_use]
    pub fn uses_search_rule(&self) -> bool {
        !self.root && self.segments.len() == 1
    }

    /// The name's segments in order.
    #[must_use]
    pub fn segments(&self) -> &[NameSeg] {
        &self.segments
    }

    /// The final segment, i.e. the local name this string refers to.
    #[must_use]
    pub fn last(&self) -> Option<NameSeg> {
        self.segments.last().copied()
    }

    /// The name with its final segment removed.
    #[must_use]
    pub fn parent_path(&self) -> Self {
        let mut segments = self.segments.clone();
        segments.pop();
        Self {
            root: self.root,
            parents: self.parents,
            segments,
        }
    }

    /// Appends a segment.
    pub fn push(&mut self, seg: NameSeg) {
        self.segments.push(seg);
    }
}

impl fmt::Display for AmlName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.root {
            f.write_str("\\")?;
        }
        for _ in 0..self.parents {
            f.write_str("^")?;
        }
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for AmlName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AmlName(\"{self}\")")
    }
}
