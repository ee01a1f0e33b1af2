// pipeline.rs — Compile driver.
//
// Runs parse → preprocess → transform → codegen and stops at the first
// stage that produces error diagnostics; no partial output escapes. Also
// computes source provenance (SHA-256) stamped into the generated files
// and exposed via `--emit build-info`.
//
// Preconditions: none (entry point).
// Postconditions: on success, both output texts are fully generated.
// Failure modes: any stage emitting error-level diagnostics.
// Side effects: none (file I/O lives in the binary).

use std::collections::HashMap;
use std::fmt;

use sha2::{Digest, Sha256};

use crate::ast::{Ast, Driver};
use crate::codegen::{self, CodegenOptions};
use crate::cst::Node;
use crate::diag::{codes, has_errors, Diagnostic};
use crate::lexer::Span;
use crate::parser;
use crate::preprocess;
use crate::provider::Provider;
use crate::transform;

// ── Options ────────────────────────────────────────────────────────────────

/// The compiler options record: endpoint side, target provider, and
/// parameter overrides (name → replacement initializer text).
pub struct CompileOptions {
    pub side: Driver,
    pub provider: Box<dyn Provider>,
    pub params: HashMap<String, String>,
}

// ── Errors ─────────────────────────────────────────────────────────────────

/// The stage a compilation failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Preprocess,
    Transform,
    Codegen,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Parse => write!(f, "parse"),
            Stage::Preprocess => write!(f, "preprocess"),
            Stage::Transform => write!(f, "transform"),
            Stage::Codegen => write!(f, "codegen"),
        }
    }
}

/// Compilation failed; `diagnostics` holds everything the failing stage
/// reported (errors and warnings alike).
#[derive(Debug)]
pub struct CompileError {
    pub stage: Stage,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Output ─────────────────────────────────────────────────────────────────

/// A successful compilation: the two output texts plus any warnings.
#[derive(Debug)]
pub struct CompileOutput {
    pub header: String,
    pub source: String,
    pub warnings: Vec<Diagnostic>,
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata stamped into generated files and printed by
/// `--emit build-info`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the source hash (64 characters).
    pub fn source_hash_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.source_hash {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
        }
        s
    }

    /// Truncated hash for the generated-file banner.
    pub fn short_hash(&self) -> String {
        self.source_hash_hex()[..16].to_string()
    }

    /// Serialize provenance as a JSON string for `--emit build-info`.
    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"source_hash\": \"{}\",\n  \"compiler_version\": \"{}\"\n}}\n",
            self.source_hash_hex(),
            self.compiler_version,
        )
    }
}

/// Compute provenance from the raw source text.
pub fn compute_provenance(source: &str) -> Provenance {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    Provenance {
        source_hash: hash,
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Stages ─────────────────────────────────────────────────────────────────

/// Parse to a raw parse tree (for `--emit tree` and the full pipeline).
pub fn parse_tree(source: &str) -> Result<Node, CompileError> {
    let result = parser::parse(source);
    if result.errors.is_empty() {
        if let Some(tree) = result.tree {
            return Ok(tree);
        }
    }
    let mut diagnostics: Vec<Diagnostic> = result
        .errors
        .iter()
        .map(|e| {
            let span = e.span();
            Diagnostic::error(Span::new(span.start, span.end), format!("{e}"))
                .with_code(codes::PARSE)
        })
        .collect();
    if diagnostics.is_empty() {
        diagnostics.push(
            Diagnostic::error(Span::new(0, 0), "parse failed with no output")
                .with_code(codes::PARSE),
        );
    }
    Err(CompileError {
        stage: Stage::Parse,
        diagnostics,
    })
}

/// Parse, preprocess, and transform to a typed AST. Returns the AST plus
/// accumulated warnings.
pub fn build_ast(
    source: &str,
    params: &HashMap<String, String>,
) -> Result<(Ast, Vec<Diagnostic>), CompileError> {
    let tree = parse_tree(source)?;

    let preprocessed = preprocess::preprocess(tree);
    if has_errors(&preprocessed.diagnostics) {
        return Err(CompileError {
            stage: Stage::Preprocess,
            diagnostics: preprocessed.diagnostics,
        });
    }
    let mut warnings = preprocessed.diagnostics;

    let transformed = transform::transform(&preprocessed.tree, params);
    if has_errors(&transformed.diagnostics) {
        return Err(CompileError {
            stage: Stage::Transform,
            diagnostics: transformed.diagnostics,
        });
    }
    warnings.extend(transformed.diagnostics);

    Ok((transformed.ast, warnings))
}

/// Compile one com2 source into a header/source pair.
///
/// `header_filename` is the basename the emitted `.c` includes (for a
/// prefix `out/uart` this is `uart.h`).
pub fn compile(
    source: &str,
    header_filename: &str,
    opts: &CompileOptions,
) -> Result<CompileOutput, CompileError> {
    let (ast, mut warnings) = build_ast(source, &opts.params)?;

    let cg_opts = CodegenOptions {
        side: opts.side,
        provider: opts.provider.as_ref(),
    };
    let header_result = codegen::generate_header(&ast, &cg_opts);
    let source_result = codegen::generate_source(&ast, &cg_opts, header_filename);

    let mut cg_diags = header_result.diagnostics;
    cg_diags.extend(source_result.diagnostics);
    if has_errors(&cg_diags) {
        return Err(CompileError {
            stage: Stage::Codegen,
            diagnostics: cg_diags,
        });
    }
    warnings.extend(cg_diags);

    let provenance = compute_provenance(source);
    let banner = format!(
        "// Generated by com2c {} (source sha256: {})\n",
        provenance.compiler_version,
        provenance.short_hash()
    );

    Ok(CompileOutput {
        header: format!("{banner}{}", header_result.code),
        source: format!("{banner}{}", source_result.code),
        warnings,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ArduinoProvider;

    fn options() -> CompileOptions {
        CompileOptions {
            side: Driver::Left,
            provider: Box::new(ArduinoProvider),
            params: HashMap::new(),
        }
    }

    const BAD_SYNTAX: &str = "parameters { wire clk = ; }";
    const GOOD: &str = "
        parameters { wire clk = 2; integer bit_time = 104; }
        left_functions {
            func send_bit(input bit b) {
                state hi (bit_time us) { clk -> b; }
                state lo (bit_time us) { }
                path hi .. lo;
            }
        }
    ";

    #[test]
    fn compile_succeeds_end_to_end() {
        let output = compile(GOOD, "proto.h", &options()).expect("compile failed");
        assert!(output.warnings.is_empty());
        assert!(output.header.contains("void send_bit(uint8_t (*b));\n"));
        assert!(output.source.contains("#include \"proto.h\"\n"));
        assert!(output.source.contains("const int clk = 2;\n"));
    }

    #[test]
    fn banner_carries_version_and_hash() {
        let output = compile(GOOD, "proto.h", &options()).unwrap();
        let first_line = output.source.lines().next().unwrap();
        assert!(first_line.starts_with("// Generated by com2c "));
        assert!(first_line.contains("source sha256: "));
        assert_eq!(output.header.lines().next().unwrap(), first_line);
    }

    #[test]
    fn output_is_deterministic() {
        let a = compile(GOOD, "proto.h", &options()).unwrap();
        let b = compile(GOOD, "proto.h", &options()).unwrap();
        assert_eq!(a.header, b.header);
        assert_eq!(a.source, b.source);
    }

    #[test]
    fn parse_errors_stop_at_parse_stage() {
        let err = compile(BAD_SYNTAX, "proto.h", &options()).unwrap_err();
        assert_eq!(err.stage, Stage::Parse);
        assert!(!err.diagnostics.is_empty());
    }

    #[test]
    fn transform_errors_stop_at_transform_stage() {
        let err = compile(
            "left_functions { func f() { state a { } state a { } } }",
            "proto.h",
            &options(),
        )
        .unwrap_err();
        assert_eq!(err.stage, Stage::Transform);
        assert_eq!(err.diagnostics[0].code, Some(codes::DUPLICATE_LABEL));
    }

    #[test]
    fn codegen_errors_stop_at_codegen_stage() {
        let err = compile(
            "left_functions { func f() { path nowhere; } }",
            "proto.h",
            &options(),
        )
        .unwrap_err();
        assert_eq!(err.stage, Stage::Codegen);
        assert_eq!(err.diagnostics[0].code, Some(codes::UNKNOWN_LABEL));
    }

    #[test]
    fn override_warnings_survive_success() {
        let mut opts = options();
        opts.params.insert("missing".to_string(), "1".to_string());
        let output = compile(GOOD, "proto.h", &opts).unwrap();
        assert_eq!(output.warnings.len(), 1);
        assert_eq!(output.warnings[0].code, Some(codes::UNKNOWN_OVERRIDE));
    }

    #[test]
    fn provenance_hash_is_stable() {
        let p1 = compute_provenance("abc");
        let p2 = compute_provenance("abc");
        let p3 = compute_provenance("abd");
        assert_eq!(p1.source_hash, p2.source_hash);
        assert_ne!(p1.source_hash, p3.source_hash);
        assert_eq!(p1.source_hash_hex().len(), 64);
        assert_eq!(p1.short_hash().len(), 16);
        assert!(p1.to_json().contains("\"compiler_version\""));
    }
}
