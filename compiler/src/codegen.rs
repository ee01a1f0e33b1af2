// codegen.rs — C code generation for com2 protocols.
//
// Two emitters: `generate_header` (provider preamble plus prototypes of
// the selected side) and `generate_source` (parameter constants, static
// variables, then shared and selected-side function bodies). Function
// bodies drive the state-graph walker: each `path` statement emits one
// connected subgraph as labeled C with `goto` dispatch.
//
// The same source compiles to two complementary programs. For a wire
// action, the driving side configures the wire as output and writes it;
// the other side configures it as input and either stores the sampled
// bit (TRANSFER) or polls it against the expected value (SEND listed in
// the state's condition set).
//
// Preconditions: AST from `transform::transform` with no error diagnostics.
// Postconditions: returns generated C text plus any diagnostics.
// Failure modes: dead transitions, unknown labels, wire contention,
//                uninitialized parameters. Emission continues past errors
//                so one run reports them all; callers must discard the
//                text when any diagnostic is error-level.
// Side effects: none.

use std::collections::{HashSet, VecDeque};
use std::fmt::Write as _;

use crate::ast::*;
use crate::diag::{codes, Diagnostic};
use crate::lexer::Span;
use crate::provider::{Provider, WireMode};

/// Function-local C variable holding the current state's start time.
pub const STATE_TIME_VAR: &str = "__state_time";
/// Local label appended after each emitted state path.
pub const EXIT_LABEL: &str = "__exit";

/// Mangle a state label with its path number so multiple paths in one
/// function never share C labels.
fn mangle(label: &str, num: usize) -> String {
    format!("{label}_{num}")
}

#[derive(Clone, Copy)]
pub struct CodegenOptions<'a> {
    pub side: Driver,
    pub provider: &'a dyn Provider,
}

#[derive(Debug)]
pub struct CodegenResult {
    pub code: String,
    pub diagnostics: Vec<Diagnostic>,
}

fn prototype(function: &Function, provider: &dyn Provider) -> String {
    let params: Vec<String> = function.args.iter().map(|a| a.codegen(provider)).collect();
    format!("void {}({})", function.name, params.join(", "))
}

// ── Header emission ──

/// Emit the `.h` file: preamble, then one prototype per function on the
/// selected side.
pub fn generate_header(ast: &Ast, opts: &CodegenOptions) -> CodegenResult {
    let mut out = String::new();
    out.push_str("#pragma once\n");
    out.push_str(opts.provider.header_preamble());
    out.push('\n');
    for function in ast.side_functions(opts.side) {
        let _ = writeln!(out, "{};", prototype(function, opts.provider));
    }
    CodegenResult {
        code: out,
        diagnostics: Vec::new(),
    }
}

// ── Source emission ──

/// Emit the `.c` file. `header_filename` is the name of the companion
/// header, included at the top so the provider preamble is in scope.
pub fn generate_source(ast: &Ast, opts: &CodegenOptions, header_filename: &str) -> CodegenResult {
    let mut gen = SourceGen {
        opts: *opts,
        out: String::new(),
        diagnostics: Vec::new(),
    };
    gen.emit(ast, header_filename);
    CodegenResult {
        code: gen.out,
        diagnostics: gen.diagnostics,
    }
}

struct SourceGen<'a> {
    opts: CodegenOptions<'a>,
    out: String,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> SourceGen<'a> {
    fn provider(&self) -> &'a dyn Provider {
        self.opts.provider
    }

    fn emit(&mut self, ast: &Ast, header_filename: &str) {
        let _ = writeln!(self.out, "#include \"{header_filename}\"");
        self.out.push('\n');

        for param in &ast.params {
            self.emit_param(param);
        }
        if !ast.params.is_empty() {
            self.out.push('\n');
        }

        for var in &ast.vars {
            let _ = writeln!(self.out, "static {};", var.ty.codegen(self.provider(), &var.name));
        }
        if !ast.vars.is_empty() {
            self.out.push('\n');
        }

        for function in &ast.shared {
            self.emit_function(function);
        }
        for function in ast.side_functions(self.opts.side) {
            self.emit_function(function);
        }
    }

    fn emit_param(&mut self, param: &ParamDecl) {
        match &param.init {
            Some(init) => {
                let decl = param.ty.codegen(self.provider(), &param.name);
                let _ = writeln!(self.out, "const {decl} = {init};");
            }
            None => {
                self.diagnostics.push(
                    Diagnostic::error(
                        param.span,
                        format!(
                            "parameter `{}` has no initializer and no override",
                            param.name
                        ),
                    )
                    .with_code(codes::PARAM_UNINITIALIZED)
                    .with_hint(format!("pass --param {}=<value>", param.name)),
                );
            }
        }
    }

    // ── Function bodies ──

    fn emit_function(&mut self, function: &Function) {
        let input_vars: HashSet<&str> = function
            .args
            .iter()
            .filter(|a| a.io == IoKind::Input)
            .map(|a| a.name.as_str())
            .collect();

        let _ = writeln!(self.out, "{} {{", prototype(function, self.provider()));
        let _ = writeln!(
            self.out,
            "{} {} = {};",
            self.provider().time_type(),
            STATE_TIME_VAR,
            self.provider().get_micros()
        );

        let mut num = 0usize;
        for stmt in &function.stmts {
            match stmt {
                Stmt::Assign(assign) => {
                    let deref = input_vars.contains(assign.target.base.as_str());
                    self.out.push_str(&assign.codegen(deref));
                }
                Stmt::Path(path) => {
                    self.emit_state_path(function, path, num);
                    let _ = writeln!(self.out, "{}:", mangle(EXIT_LABEL, num));
                    num += 1;
                }
            }
        }

        self.out.push_str("return;\n}\n\n");
    }

    // ── State paths ──

    /// Emit one path's subgraph: the start state inline, then a frontier
    /// walk over successors until every reachable state up to the end
    /// label is emitted. Visit order is source order (transition order,
    /// then fall-through), so output is deterministic.
    fn emit_state_path(&mut self, function: &Function, path: &StatePath, num: usize) {
        let table = &function.states;

        let Some(start_label) = &path.start else {
            // Single-state path: the end state is both start and end.
            match table.get(&path.end) {
                Some(state) => self.emit_state(function, state, num, true, true),
                None => self.unknown_label(&path.end, path.span),
            }
            return;
        };

        let Some(start_state) = table.get(start_label) else {
            self.unknown_label(start_label, path.span);
            return;
        };
        // The start body is emitted unlabeled; it is deliberately not
        // marked completed, so a cycle back to the start label emits a
        // second, labeled copy that the gotos can target.
        self.emit_state(function, start_state, num, true, false);

        let mut completed: HashSet<String> = HashSet::new();
        let mut frontier: VecDeque<String> = VecDeque::new();
        for successor in start_state.successors() {
            if !completed.contains(&successor) && !frontier.contains(&successor) {
                frontier.push_back(successor);
            }
        }

        while let Some(label) = frontier.pop_front() {
            completed.insert(label.clone());
            let Some(state) = table.get(&label) else {
                self.unknown_label(&label, path.span);
                continue;
            };
            let end = label == path.end;
            self.emit_state(function, state, num, false, end);
            if !end {
                for successor in state.successors() {
                    if !completed.contains(&successor) && !frontier.contains(&successor) {
                        frontier.push_back(successor);
                    }
                }
            }
        }
    }

    // ── Single-state emission ──

    fn emit_state(
        &mut self,
        function: &Function,
        state: &State,
        num: usize,
        start: bool,
        end: bool,
    ) {
        if !start {
            let _ = writeln!(self.out, "{}:", mangle(&state.label, num));
        }

        self.check_wire_contention(state);

        // Walk actions in source order. Writes and mode changes are
        // emitted inline; reads and assertions are buffered so they can
        // be sampled at the right point of the timing regime.
        let mut reads: Vec<&WireAction> = Vec::new();
        let mut assertions: Vec<&WireAction> = Vec::new();
        for action in &state.actions {
            match action {
                Action::Assign(assign) => {
                    self.out.push_str(&assign.codegen(false));
                }
                Action::Wire(wire_action) => {
                    if wire_action.driver == self.opts.side {
                        let mode = self
                            .provider()
                            .set_wire_mode(&wire_action.wire, WireMode::Output);
                        let _ = writeln!(self.out, "{mode};");
                        let value = match &wire_action.kind {
                            WireKind::Transfer(target) => target.rvalue(),
                            WireKind::Send(value) => value.clone(),
                        };
                        let write = self.provider().write_wire_bit(&wire_action.wire, &value);
                        let _ = writeln!(self.out, "{write};");
                    } else {
                        match &wire_action.kind {
                            WireKind::Transfer(_) => {
                                let mode = self
                                    .provider()
                                    .set_wire_mode(&wire_action.wire, WireMode::Input);
                                let _ = writeln!(self.out, "{mode};");
                                reads.push(wire_action);
                            }
                            WireKind::Send(_) if state.watches_wire(&wire_action.wire) => {
                                let mode = self
                                    .provider()
                                    .set_wire_mode(&wire_action.wire, WireMode::Input);
                                let _ = writeln!(self.out, "{mode};");
                                assertions.push(wire_action);
                            }
                            // A send the receiver does not watch emits nothing.
                            WireKind::Send(_) => {}
                        }
                    }
                }
            }
        }

        if end {
            let _ = writeln!(self.out, "goto {};", mangle(EXIT_LABEL, num));
            return;
        }

        if !assertions.is_empty() {
            self.emit_wait_for_assertions(&assertions);
            let _ = writeln!(
                self.out,
                "{} = {};",
                STATE_TIME_VAR,
                self.provider().get_micros()
            );
            self.emit_reads(&reads);
        } else if let Some(duration) = state.duration() {
            self.emit_delay_until(&duration.half_us_expr());
            self.emit_reads(&reads);
            self.emit_delay_until(&duration.us_expr());
            let _ = writeln!(
                self.out,
                "{} = {} + {};",
                STATE_TIME_VAR,
                STATE_TIME_VAR,
                duration.us_expr()
            );
        } else {
            // No timing bound for this state: sample reads immediately.
            self.emit_reads(&reads);
        }

        self.emit_branches(function, state, num);
    }

    fn check_wire_contention(&mut self, state: &State) {
        let mut left: HashSet<&str> = HashSet::new();
        let mut right: HashSet<&str> = HashSet::new();
        for action in &state.actions {
            let Action::Wire(wire_action) = action else {
                continue;
            };
            let (mine, other) = match wire_action.driver {
                Driver::Left => (&mut left, &right),
                Driver::Right => (&mut right, &left),
            };
            if other.contains(wire_action.wire.as_str()) {
                self.diagnostics.push(
                    Diagnostic::error(
                        wire_action.span,
                        format!(
                            "wire `{}` is driven by both sides in state `{}`",
                            wire_action.wire, state.label
                        ),
                    )
                    .with_code(codes::WIRE_CONTENTION),
                );
            }
            mine.insert(wire_action.wire.as_str());
        }
    }

    // ── Timing and reads ──

    fn emit_delay_until(&mut self, delta_us: &str) {
        let _ = writeln!(
            self.out,
            "while ({} - {} < {}) {{}}",
            self.provider().get_micros(),
            STATE_TIME_VAR,
            delta_us
        );
    }

    fn emit_reads(&mut self, reads: &[&WireAction]) {
        for read in reads {
            let WireKind::Transfer(target) = &read.kind else {
                continue;
            };
            let sample = self.provider().read_wire_bit(&read.wire);
            self.out.push_str(&target.codegen_assign(&sample, false));
        }
    }

    /// The poll exits on the first sample that differs from the expected
    /// value, mirroring the reference behavior of the emitted protocol.
    fn emit_wait_for_assertions(&mut self, assertions: &[&WireAction]) {
        self.out.push_str("while (1) {\n");
        for assertion in assertions {
            let WireKind::Send(expected) = &assertion.kind else {
                continue;
            };
            let sample = self.provider().read_wire_bit(&assertion.wire);
            let _ = writeln!(self.out, "if ({sample} != {expected}) {{");
            self.out.push_str("    break;\n}\n");
        }
        self.out.push_str("}\n");
    }

    // ── Transition branches ──

    fn emit_branches(&mut self, function: &Function, state: &State, num: usize) {
        let mut fall_through = true;
        for transition in &state.transitions {
            if !fall_through {
                self.diagnostics.push(
                    Diagnostic::error(
                        transition.span,
                        format!(
                            "transition to `{}` is unreachable after an unconditional transition",
                            transition.target
                        ),
                    )
                    .with_code(codes::DEAD_TRANSITION),
                );
                break;
            }
            if function.states.get(&transition.target).is_none() {
                self.unknown_label(&transition.target, transition.span);
                continue;
            }
            let goto = format!("goto {};\n", mangle(&transition.target, num));
            match &transition.predicate {
                Some(predicate) => {
                    let _ = write!(self.out, "if ({predicate}) {{\n    {goto}}}\n");
                }
                None => {
                    self.out.push_str(&goto);
                    fall_through = false;
                }
            }
        }
        if fall_through {
            if let Some(next) = &state.next_state_label {
                if function.states.get(next).is_none() {
                    self.unknown_label(next, state.span);
                } else {
                    let _ = writeln!(self.out, "goto {};", mangle(next, num));
                }
            }
        }
    }

    fn unknown_label(&mut self, label: &str, span: Span) {
        self.diagnostics.push(
            Diagnostic::error(span, format!("no state with label `{label}`"))
                .with_code(codes::UNKNOWN_LABEL),
        );
    }
}

// ── Tests ──
