use clap::Parser;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use com2c::ast::Driver;
use com2c::diag::{Diagnostic, DiagnosticJson};
use com2c::pipeline::{self, CompileError, CompileOptions};
use com2c::provider::{ArduinoProvider, NoisyArduinoProvider, Provider};

const EXIT_OK: i32 = 0;
const EXIT_COMPILE_ERROR: i32 = 1;
const EXIT_USAGE_ERROR: i32 = 2;
const EXIT_SYSTEM_ERROR: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum DriverArg {
    #[value(name = "LEFT")]
    Left,
    #[value(name = "RIGHT")]
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum ProviderArg {
    Arduino,
    NoisyArduino,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum DiagnosticFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    /// Write the `.c`/`.h` pair (default).
    Files,
    /// Print the raw parse tree.
    Tree,
    /// Print the typed AST.
    Ast,
    /// Print the generated header to stdout.
    Header,
    /// Print the generated source to stdout.
    C,
    /// Print source provenance JSON.
    BuildInfo,
}

#[derive(Parser, Debug)]
#[command(
    name = "com2c",
    version,
    about = "com2 compiler — compiles .com2 wire-protocol definitions to portable C endpoint sources"
)]
struct Cli {
    /// Input .com2 source file
    source: PathBuf,

    /// Output path prefix for the generated pair (<prefix>.c, <prefix>.h)
    output_prefix: Option<PathBuf>,

    /// Endpoint to compile
    #[arg(long, value_enum, default_value_t = DriverArg::Left)]
    driver: DriverArg,

    /// Target backend for GPIO/timing fragments
    #[arg(long, value_enum, default_value_t = ProviderArg::Arduino)]
    provider: ProviderArg,

    /// Bit-flip rate for the noisy provider: one flipped write in <k>
    #[arg(long, default_value_t = 1000)]
    noise_one_in: u32,

    /// Parameter override: name=value (repeatable)
    #[arg(long)]
    param: Vec<String>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Files)]
    emit: EmitStage,

    /// Diagnostic output format
    #[arg(long, value_enum, default_value_t = DiagnosticFormat::Human)]
    diagnostic_format: DiagnosticFormat,

    /// Print compiler phases
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    // ── Parse --param overrides ──
    let mut params: HashMap<String, String> = HashMap::new();
    for p in &cli.param {
        let Some(eq) = p.find('=') else {
            eprintln!("error: --param requires name=value format: '{p}'");
            std::process::exit(EXIT_USAGE_ERROR);
        };
        let name = p[..eq].to_string();
        let value = p[eq + 1..].to_string();
        if name.is_empty() || value.is_empty() {
            eprintln!("error: --param requires non-empty name=value: '{p}'");
            std::process::exit(EXIT_USAGE_ERROR);
        }
        if params.insert(name.clone(), value).is_some() {
            eprintln!("warning: duplicate --param for '{name}', using last value");
        }
    }

    // ── --emit files needs a prefix ──
    if cli.emit == EmitStage::Files && cli.output_prefix.is_none() {
        eprintln!("error: an output prefix is required to write the .c/.h pair");
        std::process::exit(EXIT_USAGE_ERROR);
    }

    // ── Read source ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {}: {}", cli.source.display(), e);
            std::process::exit(EXIT_SYSTEM_ERROR);
        }
    };

    // ── --emit build-info: early exit before parsing ──
    if cli.emit == EmitStage::BuildInfo {
        print!("{}", pipeline::compute_provenance(&source).to_json());
        std::process::exit(EXIT_OK);
    }

    // ── --emit tree: raw parse tree ──
    if cli.emit == EmitStage::Tree {
        match pipeline::parse_tree(&source) {
            Ok(tree) => {
                print!("{}", tree.pretty());
                std::process::exit(EXIT_OK);
            }
            Err(err) => fail(&cli, &source, err),
        }
    }

    // ── --emit ast: typed AST ──
    if cli.emit == EmitStage::Ast {
        match pipeline::build_ast(&source, &params) {
            Ok((ast, warnings)) => {
                report_diagnostics(&cli, &source, &warnings);
                println!("{ast:#?}");
                std::process::exit(EXIT_OK);
            }
            Err(err) => fail(&cli, &source, err),
        }
    }

    // ── Full compile ──
    let provider: Box<dyn Provider> = match cli.provider {
        ProviderArg::Arduino => Box::new(ArduinoProvider),
        ProviderArg::NoisyArduino => Box::new(NoisyArduinoProvider::new(cli.noise_one_in)),
    };
    let opts = CompileOptions {
        side: match cli.driver {
            DriverArg::Left => Driver::Left,
            DriverArg::Right => Driver::Right,
        },
        provider,
        params,
    };

    let header_filename = header_filename(&cli);
    if cli.verbose {
        eprintln!("com2c: source = {}", cli.source.display());
        eprintln!("com2c: driver = {:?}", cli.driver);
        eprintln!("com2c: header = {header_filename}");
    }

    let output = match pipeline::compile(&source, &header_filename, &opts) {
        Ok(output) => output,
        Err(err) => fail(&cli, &source, err),
    };
    report_diagnostics(&cli, &source, &output.warnings);

    match cli.emit {
        EmitStage::Header => print!("{}", output.header),
        EmitStage::C => print!("{}", output.source),
        EmitStage::Files => {
            let prefix = cli.output_prefix.as_ref().unwrap();
            let header_path = prefix.with_extension("h");
            let source_path = prefix.with_extension("c");
            for (path, text) in [(&header_path, &output.header), (&source_path, &output.source)] {
                if let Err(e) = std::fs::write(path, text) {
                    eprintln!("error: {}: {}", path.display(), e);
                    std::process::exit(EXIT_SYSTEM_ERROR);
                }
            }
            if cli.verbose {
                eprintln!(
                    "com2c: wrote {} and {}",
                    header_path.display(),
                    source_path.display()
                );
            }
        }
        _ => unreachable!("handled above"),
    }
    std::process::exit(EXIT_OK);
}

/// Name of the header the generated `.c` includes: the prefix basename
/// with an `.h` extension, falling back to the source file stem.
fn header_filename(cli: &Cli) -> String {
    let stem = match &cli.output_prefix {
        Some(prefix) => prefix.file_name().map(|s| s.to_string_lossy().into_owned()),
        None => cli
            .source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned()),
    };
    format!("{}.h", stem.unwrap_or_else(|| "out".to_string()))
}

fn fail(cli: &Cli, source: &str, err: CompileError) -> ! {
    report_diagnostics(cli, source, &err.diagnostics);
    eprintln!("error: compilation failed at the {} stage", err.stage);
    std::process::exit(EXIT_COMPILE_ERROR);
}

fn report_diagnostics(cli: &Cli, source: &str, diagnostics: &[Diagnostic]) {
    for diag in diagnostics {
        match cli.diagnostic_format {
            DiagnosticFormat::Json => {
                let json = DiagnosticJson::from_diagnostic(diag);
                eprintln!("{}", serde_json::to_string(&json).unwrap());
            }
            DiagnosticFormat::Human => print_span_diagnostic(&cli.source, source, diag),
        }
    }
}

/// Render a diagnostic with its source line and a caret marker.
fn print_span_diagnostic(path: &Path, source: &str, diag: &Diagnostic) {
    let start = diag.span.start.min(source.len());
    let line_start = source[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = source[start..]
        .find('\n')
        .map(|i| start + i)
        .unwrap_or(source.len());
    let line_no = source[..start].matches('\n').count() + 1;
    let col = start - line_start + 1;

    eprintln!("{}:{}:{}: {}", path.display(), line_no, col, diag);
    let line = &source[line_start..line_end];
    if !line.is_empty() {
        eprintln!("  {line}");
        let width = (diag.span.end.min(line_end).saturating_sub(start)).max(1);
        eprintln!("  {}{}", " ".repeat(col - 1), "^".repeat(width));
    }
}
