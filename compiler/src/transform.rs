// transform.rs — Parse tree to typed AST.
//
// Consumes the preprocessed parse tree: flattens expressions to C text,
// applies `--param` overrides to parameter initializers, splices unrolled
// state lists into their parents, and builds each function's state table
// (anonymous-label synthesis, duplicate detection, textual fall-through
// chaining). The `states` themselves never appear as function statements;
// only `path` statements reference them at codegen time.
//
// Preconditions: tree from `preprocess::preprocess` (no `for_loop` nodes).
// Postconditions: returns a typed AST plus all accumulated diagnostics.
// Failure modes: malformed types, duplicate labels, duplicate functions.
//                Transformation continues past errors.
// Side effects: none.

use std::collections::{HashMap, HashSet};

use crate::ast::*;
use crate::cst::{Node, Rule, TokenKind, Tree};
use crate::diag::{codes, Diagnostic};
use crate::lexer::Span;

/// Result of transformation.
#[derive(Debug)]
pub struct TransformResult {
    pub ast: Ast,
    pub diagnostics: Vec<Diagnostic>,
}

/// Transform a preprocessed parse tree into a typed AST.
///
/// `overrides` maps parameter names to replacement initializer text; an
/// override wins over the source initializer. Overrides naming no source
/// parameter produce a warning.
pub fn transform(tree: &Node, overrides: &HashMap<String, String>) -> TransformResult {
    let mut tf = Transformer {
        overrides,
        used_overrides: HashSet::new(),
        function_names: HashSet::new(),
        diagnostics: Vec::new(),
    };
    let ast = tf.program(tree);

    let mut unknown: Vec<&String> = overrides
        .keys()
        .filter(|name| !tf.used_overrides.contains(name.as_str()))
        .collect();
    unknown.sort();
    for name in unknown {
        tf.diagnostics.push(
            Diagnostic::warning(
                Span::new(0, 0),
                format!("parameter override `{name}` does not match any parameter"),
            )
            .with_code(codes::UNKNOWN_OVERRIDE),
        );
    }

    TransformResult {
        ast,
        diagnostics: tf.diagnostics,
    }
}

struct Transformer<'a> {
    overrides: &'a HashMap<String, String>,
    used_overrides: HashSet<String>,
    function_names: HashSet<String>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Transformer<'a> {
    fn program(&mut self, tree: &Node) -> Ast {
        let mut ast = Ast::default();
        let Some(program) = tree.as_tree() else {
            return ast;
        };
        for section in &program.children {
            let Some(section) = section.as_tree() else {
                continue;
            };
            match section.rule {
                Rule::Parameters => {
                    for decl in &section.children {
                        if let Some(param) = self.param_decl(decl) {
                            ast.params.push(param);
                        }
                    }
                }
                Rule::Variables => {
                    for decl in &section.children {
                        if let Some(var) = self.var_decl(decl) {
                            ast.vars.push(var);
                        }
                    }
                }
                Rule::SharedFunctions => self.functions(section, &mut ast.shared),
                Rule::LeftFunctions => self.functions(section, &mut ast.left),
                Rule::RightFunctions => self.functions(section, &mut ast.right),
                _ => {}
            }
        }
        ast
    }

    // ── Declarations ──

    fn param_decl(&mut self, node: &Node) -> Option<ParamDecl> {
        let tree = node.as_tree()?;
        let ty = self.type_of(&tree.children[0])?;
        let name_tok = tree.children[1].as_token()?;
        let name = name_tok.text.clone();

        let init = if let Some(value) = self.overrides.get(&name) {
            self.used_overrides.insert(name.clone());
            Some(value.clone())
        } else {
            tree.children
                .get(2)
                .and_then(Node::as_tree)
                .map(|e| self.flatten_expr(e))
        };

        Some(ParamDecl {
            ty,
            name,
            init,
            span: name_tok.span,
        })
    }

    fn var_decl(&mut self, node: &Node) -> Option<VarDecl> {
        let tree = node.as_tree()?;
        let ty = self.type_of(&tree.children[0])?;
        let name = tree.children[1].as_token()?.text.clone();
        Some(VarDecl { ty, name })
    }

    fn type_of(&mut self, node: &Node) -> Option<Type> {
        let tree = node.as_tree()?;
        let base_tok = tree.children[0].as_token()?;
        let mut dims = Vec::new();
        for dim in &tree.children[1..] {
            let tok = dim.as_token()?;
            match tok.text.parse::<u32>() {
                Ok(d) => dims.push(d),
                Err(_) => {
                    self.diagnostics.push(
                        Diagnostic::error(
                            tok.span,
                            format!("dimension `{}` is not a valid size", tok.text),
                        )
                        .with_code(codes::BAD_TYPE),
                    );
                    return None;
                }
            }
        }
        match Type::from_parts(&base_tok.text, dims) {
            Ok(ty) => Some(ty),
            Err(message) => {
                self.diagnostics
                    .push(Diagnostic::error(base_tok.span, message).with_code(codes::BAD_TYPE));
                None
            }
        }
    }

    // ── Functions ──

    fn functions(&mut self, section: &Tree, out: &mut Vec<Function>) {
        for node in &section.children {
            if let Some(function) = self.function(node) {
                out.push(function);
            }
        }
    }

    fn function(&mut self, node: &Node) -> Option<Function> {
        let tree = node.as_tree()?;
        let name_tok = tree.children[0].as_token()?;
        let name = name_tok.text.clone();
        if !self.function_names.insert(name.clone()) {
            self.diagnostics.push(
                Diagnostic::error(name_tok.span, format!("duplicate function `{name}`"))
                    .with_code(codes::DUPLICATE_FUNCTION),
            );
        }

        let mut args = Vec::new();
        if let Some(arg_list) = tree.children[1].as_tree() {
            for arg in &arg_list.children {
                if let Some(arg) = self.argument(arg) {
                    args.push(arg);
                }
            }
        }

        let mut stmts = Vec::new();
        let mut state_trees: Vec<&Tree> = Vec::new();
        for item in &tree.children[2..] {
            let Some(item_tree) = item.as_tree() else {
                continue;
            };
            match item_tree.rule {
                Rule::Assign => {
                    if let Some(assign) = self.assignment(item_tree) {
                        stmts.push(Stmt::Assign(assign));
                    }
                }
                Rule::StatePathStmt => {
                    stmts.push(Stmt::Path(self.state_path(item_tree)));
                }
                Rule::State => state_trees.push(item_tree),
                Rule::StateList => collect_states(item_tree, &mut state_trees),
                _ => {}
            }
        }

        let states = self.build_state_table(&state_trees);

        Some(Function {
            name,
            args,
            stmts,
            states,
            span: name_tok.span,
        })
    }

    fn argument(&mut self, node: &Node) -> Option<Argument> {
        let tree = node.as_tree()?;
        let io = match tree.children[0].as_token()?.text.as_str() {
            "input" => IoKind::Input,
            _ => IoKind::Output,
        };
        let ty = self.type_of(&tree.children[1])?;
        let name = tree.children[2].as_token()?.text.clone();
        Some(Argument { io, ty, name })
    }

    fn state_path(&mut self, tree: &Tree) -> StatePath {
        let span = tree.children[0].span();
        let labels: Vec<String> = tree
            .children
            .iter()
            .filter_map(Node::as_token)
            .map(|t| t.text.clone())
            .collect();
        match labels.as_slice() {
            [end] => StatePath {
                start: None,
                end: end.clone(),
                span,
            },
            [start, end] => StatePath {
                start: Some(start.clone()),
                end: end.clone(),
                span,
            },
            _ => StatePath {
                start: None,
                end: String::new(),
                span,
            },
        }
    }

    // ── States ──

    /// Assign labels (synthesizing `anonymousN` in source order), record
    /// each state's textual successor, and fill the table.
    fn build_state_table(&mut self, state_trees: &[&Tree]) -> StateTable {
        let mut anon = 0usize;
        let mut states: Vec<State> = Vec::new();
        for tree in state_trees {
            let state = self.state(tree, &mut anon);
            states.push(state);
        }

        for i in 0..states.len().saturating_sub(1) {
            let next = states[i + 1].label.clone();
            states[i].next_state_label = Some(next);
        }

        let mut table = StateTable::new();
        for state in states {
            if let Err(rejected) = table.insert(state) {
                self.diagnostics.push(
                    Diagnostic::error(
                        rejected.span,
                        format!("duplicate state label `{}`", rejected.label),
                    )
                    .with_code(codes::DUPLICATE_LABEL),
                );
            }
        }
        table
    }

    fn state(&mut self, tree: &Tree, anon: &mut usize) -> State {
        let mut idx = 0;
        let label = match tree.children.first().and_then(Node::as_token) {
            Some(tok) if tok.kind == TokenKind::Label => {
                idx = 1;
                tok.text.clone()
            }
            _ => {
                let label = format!("anonymous{anon}");
                *anon += 1;
                label
            }
        };
        let span = tree
            .children
            .first()
            .map(Node::span)
            .unwrap_or(Span::new(0, 0));

        let mut conds = Vec::new();
        if let Some(cond_list) = tree.children.get(idx).and_then(Node::as_tree) {
            for cond in &cond_list.children {
                match cond {
                    Node::Token(t) => conds.push(Cond::Wire(t.text.clone())),
                    Node::Tree(t) if t.rule == Rule::DurationCond => {
                        if let Some(d) = self.duration(t) {
                            conds.push(Cond::Duration(d));
                        }
                    }
                    Node::Tree(_) => {}
                }
            }
        }

        let mut actions = Vec::new();
        if let Some(action_list) = tree.children.get(idx + 1).and_then(Node::as_tree) {
            for action in &action_list.children {
                if let Some(action) = self.action(action) {
                    actions.push(action);
                }
            }
        }

        let mut transitions = Vec::new();
        if let Some(transition_list) = tree.children.get(idx + 2).and_then(Node::as_tree) {
            for transition in &transition_list.children {
                if let Some(t) = self.transition(transition) {
                    transitions.push(t);
                }
            }
        }

        State {
            label,
            conds,
            actions,
            transitions,
            next_state_label: None,
            span,
        }
    }

    fn duration(&mut self, tree: &Tree) -> Option<Duration> {
        let value = tree.children[0].as_token()?.text.clone();
        let unit_tok = tree.children[1].as_token()?;
        match TimeUnit::from_str(&unit_tok.text) {
            Some(unit) => Some(Duration { value, unit }),
            None => {
                self.diagnostics.push(
                    Diagnostic::error(
                        unit_tok.span,
                        format!("unknown duration unit `{}`", unit_tok.text),
                    )
                    .with_code(codes::BAD_UNIT),
                );
                None
            }
        }
    }

    fn action(&mut self, node: &Node) -> Option<Action> {
        let tree = node.as_tree()?;
        let span = node.span();
        match tree.rule {
            Rule::Assign => self.assignment(tree).map(Action::Assign),
            Rule::TransferRight => {
                let wire = tree.children[0].as_token()?.text.clone();
                let target = self.lvalue(tree.children[1].as_tree()?);
                Some(Action::Wire(WireAction {
                    kind: WireKind::Transfer(target),
                    driver: Driver::Left,
                    wire,
                    span,
                }))
            }
            Rule::TransferLeft => {
                let target = self.lvalue(tree.children[0].as_tree()?);
                let wire = tree.children[1].as_token()?.text.clone();
                Some(Action::Wire(WireAction {
                    kind: WireKind::Transfer(target),
                    driver: Driver::Right,
                    wire,
                    span,
                }))
            }
            Rule::SendRight => {
                let wire = tree.children[0].as_token()?.text.clone();
                let value = self.flatten_expr(tree.children[1].as_tree()?);
                Some(Action::Wire(WireAction {
                    kind: WireKind::Send(value),
                    driver: Driver::Left,
                    wire,
                    span,
                }))
            }
            Rule::SendLeft => {
                let value = self.flatten_expr(tree.children[0].as_tree()?);
                let wire = tree.children[1].as_token()?.text.clone();
                Some(Action::Wire(WireAction {
                    kind: WireKind::Send(value),
                    driver: Driver::Right,
                    wire,
                    span,
                }))
            }
            _ => None,
        }
    }

    fn transition(&mut self, node: &Node) -> Option<Transition> {
        let tree = node.as_tree()?;
        match tree.children.as_slice() {
            [Node::Token(target)] => Some(Transition {
                predicate: None,
                target: target.text.clone(),
                span: target.span,
            }),
            [Node::Tree(pred), Node::Token(target)] => Some(Transition {
                predicate: Some(self.flatten_expr(pred)),
                target: target.text.clone(),
                span: target.span,
            }),
            _ => None,
        }
    }

    fn assignment(&mut self, tree: &Tree) -> Option<VariableAssignment> {
        let target = self.lvalue(tree.children[0].as_tree()?);
        let expr = self.flatten_expr(tree.children[1].as_tree()?);
        Some(VariableAssignment { target, expr })
    }

    // ── Expressions ──

    /// Flatten an expression to C text by concatenating child token text.
    /// No separators are inserted; subscripted identifiers collapse to
    /// their bit-extraction rvalue form.
    fn flatten_expr(&mut self, tree: &Tree) -> String {
        let mut out = String::new();
        for child in &tree.children {
            match child {
                Node::Token(t) => out.push_str(&t.text),
                Node::Tree(t) if t.rule == Rule::LValue => {
                    out.push_str(&self.lvalue(t).rvalue());
                }
                Node::Tree(t) => out.push_str(&self.flatten_expr(t)),
            }
        }
        out
    }

    fn lvalue(&mut self, tree: &Tree) -> LValue {
        let base = tree.children[0]
            .as_token()
            .map(|t| t.text.clone())
            .unwrap_or_default();
        let indices = tree.children[1..]
            .iter()
            .filter_map(Node::as_tree)
            .map(|e| self.flatten_expr(e))
            .collect();
        LValue::new(base, indices)
    }
}

/// Splice nested state lists (produced by loop unrolling) into their
/// parent, preserving source order.
fn collect_states<'t>(tree: &'t Tree, out: &mut Vec<&'t Tree>) {
    for child in &tree.children {
        if let Some(child_tree) = child.as_tree() {
            match child_tree.rule {
                Rule::State => out.push(child_tree),
                Rule::StateList => collect_states(child_tree, out),
                _ => {}
            }
        }
    }
}

// ── Tests ──
