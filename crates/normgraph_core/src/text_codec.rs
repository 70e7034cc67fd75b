//! Codepoint shift correction for free-text fields.
//!
//! # Responsibility
//! - Shift free-text characters forward by a fixed offset when the target
//!   platform stores strings that way, and shift them back for readers.
//!
//! # Invariants
//! - Only free text (names, descriptions, attribute names/values, project
//!   title/description) is corrected; Ids, fragments and payloads never are.
//! - A character whose shifted codepoint is not a Unicode scalar value is
//!   reported, never silently replaced.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Fixed forward shift applied to every corrected character.
pub const CODEPOINT_SHIFT: u32 = 0x377;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextCodecError {
    /// Shifting `codepoint` leaves the representable scalar range.
    Unrepresentable { field: &'static str, codepoint: u32 },
}

impl Display for TextCodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unrepresentable { field, codepoint } => write!(
                f,
                "character U+{codepoint:04X} in `{field}` cannot be shifted by 0x{CODEPOINT_SHIFT:X}"
            ),
        }
    }
}

impl Error for TextCodecError {}

/// Run-scoped switch for the codepoint correction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextCorrector {
    enabled: bool,
}

impl TextCorrector {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Corrects one free-text value in place; no-op when disabled.
    pub fn correct(&self, field: &'static str, value: &mut String) -> Result<(), TextCodecError> {
        if self.enabled {
            *value = shift_forward(field, value)?;
        }
        Ok(())
    }
}

/// Adds [`CODEPOINT_SHIFT`] to every character of `value`.
pub fn shift_forward(field: &'static str, value: &str) -> Result<String, TextCodecError> {
    value
        .chars()
        .map(|ch| {
            let codepoint = u32::from(ch);
            codepoint
                .checked_add(CODEPOINT_SHIFT)
                .and_then(char::from_u32)
                .ok_or(TextCodecError::Unrepresentable { field, codepoint })
        })
        .collect()
}

/// Inverse of [`shift_forward`].
pub fn shift_back(field: &'static str, value: &str) -> Result<String, TextCodecError> {
    value
        .chars()
        .map(|ch| {
            let codepoint = u32::from(ch);
            codepoint
                .checked_sub(CODEPOINT_SHIFT)
                .and_then(char::from_u32)
                .ok_or(TextCodecError::Unrepresentable { field, codepoint })
        })
        .collect()
}
