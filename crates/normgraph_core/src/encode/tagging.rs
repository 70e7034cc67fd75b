//! Coded-text span arithmetic.
//!
//! # Responsibility
//! - Replay stored `start:end` fragments as graph references or annotations.
//! - Build merged source content from several text sections and emit the
//!   fragment of each section.
//!
//! # Invariants
//! - Fragments are 1-indexed and inclusive; `Length = end - start + 1`.
//! - Offsets and lengths count characters, not bytes.
//! - A replayed span never ends beyond its source's content.

use crate::model::graph::{GraphAnnotation, GraphNodeReference, TextSpan};
use crate::model::norm::Tagging;
use crate::model::taxonomy::ReferenceKind;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static FRAGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([0-9]+)\s*:\s*([0-9]+)\s*$").expect("valid fragment regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanError {
    /// Fragment text is not `start:end`.
    Malformed(String),
    /// Fragment starts at 0; fragments are 1-indexed.
    ZeroStart(String),
    /// `end` precedes `start`.
    Inverted { start: i64, end: i64 },
    /// Span ends past the owning source's content.
    OutOfBounds {
        source: Uuid,
        start: i64,
        end: i64,
        source_length: i64,
    },
}

impl Display for SpanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(fragment) => {
                write!(f, "fragment `{fragment}` is not in start:end form")
            }
            Self::ZeroStart(fragment) => {
                write!(f, "fragment `{fragment}` starts at 0; offsets are 1-indexed")
            }
            Self::Inverted { start, end } => {
                write!(f, "fragment end {end} precedes start {start}")
            }
            Self::OutOfBounds {
                source,
                start,
                end,
                source_length,
            } => write!(
                f,
                "fragment {start}:{end} exceeds length {source_length} of source {source}"
            ),
        }
    }
}

impl Error for SpanError {}

/// Inclusive, 1-indexed character range inside a source's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub start: i64,
    pub end: i64,
}

impl Fragment {
    /// Parses `start:end`.
    pub fn parse(fragment: &str) -> Result<Self, SpanError> {
        let captures = FRAGMENT_RE
            .captures(fragment)
            .ok_or_else(|| SpanError::Malformed(fragment.to_string()))?;
        let number = |index: usize| {
            captures
                .get(index)
                .and_then(|value| value.as_str().parse::<i64>().ok())
                .ok_or_else(|| SpanError::Malformed(fragment.to_string()))
        };
        let start = number(1)?;
        let end = number(2)?;

        if start == 0 {
            return Err(SpanError::ZeroStart(fragment.to_string()));
        }
        if end < start {
            return Err(SpanError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn span(self) -> TextSpan {
        TextSpan {
            start: self.start,
            length: self.end - self.start + 1,
        }
    }

    /// Fails when the fragment ends past `source_length` characters.
    pub fn check_bounds(self, source: Uuid, source_length: i64) -> Result<Self, SpanError> {
        if self.end > source_length {
            return Err(SpanError::OutOfBounds {
                source,
                start: self.start,
                end: self.end,
                source_length,
            });
        }
        Ok(self)
    }
}

impl Display for Fragment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Graph row produced by replaying one tagging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayedSpan {
    Reference(GraphNodeReference),
    Annotation(GraphAnnotation),
}

/// Replays `tagging` against its source.
///
/// A tagging with a node becomes a node reference; one without becomes an
/// annotation carrying the memo text.
pub fn replay_span(
    id: Uuid,
    tagging: &Tagging,
    source_length: i64,
) -> Result<ReplayedSpan, SpanError> {
    let span = Fragment::parse(&tagging.fragment)?
        .check_bounds(tagging.source, source_length)?
        .span();

    match tagging.node {
        Some(node) => Ok(ReplayedSpan::Reference(GraphNodeReference {
            id,
            node_item_id: node,
            source_item_id: tagging.source,
            reference: ReferenceKind::TextSpan,
            span,
            audit: tagging.audit,
        })),
        None => Ok(ReplayedSpan::Annotation(GraphAnnotation {
            id,
            item_id: tagging.source,
            text: tagging.memo.clone().unwrap_or_default(),
            reference: ReferenceKind::TextSpan,
            span,
            audit: tagging.audit,
        })),
    }
}

/// Per-source content buffer for merge-and-append imports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentBuilder {
    content: String,
    chars: usize,
}

impl ContentBuilder {
    /// Starts from existing content (for example a loaded source file).
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let chars = content.chars().count();
        Self { content, chars }
    }

    /// Appends one labelled section and returns the fragment of its text.
    ///
    /// Returns `None` and leaves the buffer untouched when `text` is empty.
    pub fn append_section(&mut self, label: &str, text: &str) -> Option<Fragment> {
        if text.is_empty() {
            return None;
        }

        if !self.content.is_empty() {
            self.push("\n\n");
        }
        self.push(label);
        self.push("\n\n");

        let start = self.chars + 1;
        let mut section = String::with_capacity(text.len() + 1);
        section.push_str(text);
        section.push('\n');
        let end = start + section.chars().count() - 1;
        self.push(&section);

        Some(Fragment {
            start: to_offset(start),
            end: to_offset(end),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    /// Content length in characters.
    pub fn char_len(&self) -> usize {
        self.chars
    }

    pub fn into_content(self) -> String {
        self.content
    }

    fn push(&mut self, value: &str) {
        self.chars += value.chars().count();
        self.content.push_str(value);
    }
}

fn to_offset(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::{replay_span, ContentBuilder, Fragment, ReplayedSpan, SpanError};
    use crate::model::norm::{Audit, Tagging};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn tagging(node: Option<Uuid>, fragment: &str) -> Tagging {
        let at = NaiveDate::from_ymd_opt(2024, 1, 2)
            .and_then(|date| date.and_hms_opt(3, 4, 5))
            .unwrap();
        Tagging {
            id: None,
            source: Uuid::from_u128(7),
            node,
            memo: Some("memo".to_string()),
            fragment: fragment.to_string(),
            audit: Audit::new(Uuid::from_u128(1), at),
        }
    }

    #[test]
    fn fragment_maps_to_start_and_inclusive_length() {
        let span = Fragment::parse("10:15").unwrap().span();
        assert_eq!(span.start, 10);
        assert_eq!(span.length, 6);
    }

    #[test]
    fn single_character_fragment_has_length_one() {
        assert_eq!(Fragment::parse("4:4").unwrap().span().length, 1);
    }

    #[test]
    fn malformed_and_inverted_fragments_fail() {
        assert!(matches!(Fragment::parse("10-15"), Err(SpanError::Malformed(_))));
        assert!(matches!(Fragment::parse(""), Err(SpanError::Malformed(_))));
        assert!(matches!(Fragment::parse("0:3"), Err(SpanError::ZeroStart(_))));
        assert_eq!(
            Fragment::parse("9:3"),
            Err(SpanError::Inverted { start: 9, end: 3 })
        );
    }

    #[test]
    fn span_past_source_length_fails() {
        let err = replay_span(Uuid::from_u128(9), &tagging(None, "5:12"), 11).unwrap_err();
        assert!(matches!(err, SpanError::OutOfBounds { end: 12, source_length: 11, .. }));
    }

    #[test]
    fn null_node_replays_as_annotation() {
        let replayed = replay_span(Uuid::from_u128(9), &tagging(None, "1:4"), 20).unwrap();
        match replayed {
            ReplayedSpan::Annotation(annotation) => {
                assert_eq!(annotation.item_id, Uuid::from_u128(7));
                assert_eq!(annotation.text, "memo");
            }
            ReplayedSpan::Reference(_) => panic!("expected annotation"),
        }
    }

    #[test]
    fn node_replays_as_reference() {
        let node = Uuid::from_u128(3);
        let replayed = replay_span(Uuid::from_u128(9), &tagging(Some(node), "1:4"), 20).unwrap();
        match replayed {
            ReplayedSpan::Reference(reference) => {
                assert_eq!(reference.node_item_id, node);
                assert_eq!(reference.source_item_id, Uuid::from_u128(7));
            }
            ReplayedSpan::Annotation(_) => panic!("expected reference"),
        }
    }

    #[test]
    fn sections_are_appended_in_order_with_headers() {
        let mut builder = ContentBuilder::default();
        let a = builder.append_section("A", "foo").unwrap();
        let b = builder.append_section("B", "bar").unwrap();

        assert_eq!(builder.as_str(), "A\n\nfoo\n\n\nB\n\nbar\n");
        assert_eq!(a, Fragment { start: 4, end: 7 });
        assert!(b.start > a.end);

        let chars: Vec<char> = builder.as_str().chars().collect();
        let text_of = |fragment: Fragment| -> String {
            chars[(fragment.start - 1) as usize..fragment.end as usize]
                .iter()
                .collect()
        };
        assert_eq!(text_of(a), "foo\n");
        assert_eq!(text_of(b), "bar\n");
    }

    #[test]
    fn empty_section_is_skipped() {
        let mut builder = ContentBuilder::new("body");
        assert_eq!(builder.append_section("A", ""), None);
        assert_eq!(builder.as_str(), "body");
    }

    #[test]
    fn offsets_count_characters() {
        let mut builder = ContentBuilder::new("héllo");
        let fragment = builder.append_section("Ü", "wörld").unwrap();
        // "héllo" + "\n\n" + "Ü" + "\n\n" = 10 characters.
        assert_eq!(fragment, Fragment { start: 11, end: 16 });
        assert_eq!(builder.char_len(), 16);
    }
}
