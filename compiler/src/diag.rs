// diag.rs — Unified diagnostics model
//
// Shared diagnostic types used across all compiler phases. Every phase
// reports through these; the driver decides whether a phase's batch is
// fatal. Codes are stable and documented in the `codes` module.

use std::fmt;

use serde::Serialize;

use crate::lexer::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0201`, `W0001`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable diagnostic codes, one constant per failure kind.
pub mod codes {
    use super::DiagCode;

    /// Grammar or lexer rejected the input.
    pub const PARSE: DiagCode = DiagCode("E0001");
    /// Loop bound is not an integer literal.
    pub const BAD_LOOP_BOUND: DiagCode = DiagCode("E0101");
    /// Nested loop reuses an enclosing loop's counter name.
    pub const COUNTER_REUSE: DiagCode = DiagCode("E0102");
    /// Two states share a label.
    pub const DUPLICATE_LABEL: DiagCode = DiagCode("E0201");
    /// Malformed type (unknown base, dims on non-bit, bit width over 64).
    pub const BAD_TYPE: DiagCode = DiagCode("E0202");
    /// Duration carries an unknown unit.
    pub const BAD_UNIT: DiagCode = DiagCode("E0203");
    /// Two functions share a name.
    pub const DUPLICATE_FUNCTION: DiagCode = DiagCode("E0204");
    /// A predicated transition follows an unpredicated one.
    pub const DEAD_TRANSITION: DiagCode = DiagCode("E0301");
    /// A state path or transition names a label with no state.
    pub const UNKNOWN_LABEL: DiagCode = DiagCode("E0302");
    /// Both endpoints drive the same wire within one state.
    pub const WIRE_CONTENTION: DiagCode = DiagCode("E0303");
    /// Parameter has neither a source initializer nor an override.
    pub const PARAM_UNINITIALIZED: DiagCode = DiagCode("E0304");
    /// A `--param` override names no parameter in the source.
    pub const UNKNOWN_OVERRIDE: DiagCode = DiagCode("W0001");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A compiler diagnostic emitted by any phase.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code or hint.
    pub fn new(level: DiagLevel, span: Span, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span,
            message: message.into(),
            hint: None,
        }
    }

    /// Shorthand for an error-level diagnostic.
    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, span, message)
    }

    /// Shorthand for a warning-level diagnostic.
    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, span, message)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// True if any diagnostic in the batch is error-level.
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.level == DiagLevel::Error)
}

// ── JSON form (for --diagnostic-format json) ─────────────────────────────

/// Machine-readable diagnostic, one JSON object per line on stderr.
#[derive(Debug, Serialize)]
pub struct DiagnosticJson {
    pub level: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    pub message: String,
    pub start: usize,
    pub end: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl DiagnosticJson {
    pub fn from_diagnostic(diag: &Diagnostic) -> Self {
        DiagnosticJson {
            level: match diag.level {
                DiagLevel::Error => "error",
                DiagLevel::Warning => "warning",
            },
            code: diag.code.map(|c| c.0),
            message: diag.message.clone(),
            start: diag.span.start,
            end: diag.span.end,
            hint: diag.hint.clone(),
        }
    }
}

// ── Tests ──
