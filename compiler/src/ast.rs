// ast.rs — Typed AST for com2 protocols.
//
// Built by the transformer from the preprocessed parse tree. Expressions
// are already flattened to C text fragments at this level; the only
// structure kept is what the state-graph code generator needs.

use std::collections::HashMap;

use crate::lexer::Span;
use crate::provider::Provider;

// ── Endpoint selection ──

/// The endpoint a compilation targets, and the driving side of a wire action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Left,
    Right,
}

impl std::fmt::Display for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Driver::Left => write!(f, "LEFT"),
            Driver::Right => write!(f, "RIGHT"),
        }
    }
}

// ── Types ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Bit,
    Integer,
    Wire,
}

/// A declared type: algebraic base plus ordered dimensions.
///
/// `byte` is a pseudo-base: it normalizes to `bit` with a leading
/// dimension of 8 at construction. Only `bit` may carry dimensions, and
/// the first dimension (the packed width) must fit a `uint64_t`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    pub base: BaseType,
    pub dims: Vec<u32>,
}

impl Type {
    /// Build a type from source parts, normalizing `byte`.
    pub fn from_parts(base: &str, mut dims: Vec<u32>) -> Result<Type, String> {
        let base = match base {
            "bit" => BaseType::Bit,
            "byte" => {
                dims.insert(0, 8);
                BaseType::Bit
            }
            "integer" => BaseType::Integer,
            "wire" => BaseType::Wire,
            other => return Err(format!("unknown base type `{other}`")),
        };
        if base != BaseType::Bit && !dims.is_empty() {
            return Err("only `bit` types may carry dimensions".to_string());
        }
        if base == BaseType::Bit {
            if let Some(&first) = dims.first() {
                if first > 64 {
                    return Err(format!("bit width {first} exceeds 64"));
                }
            }
        }
        Ok(Type { base, dims })
    }

    /// C declarator for a value of this type named `name`.
    ///
    /// `bit` packs its first dimension into the smallest unsigned integer
    /// that holds it; the remaining dimensions become C array subscripts in
    /// reverse order.
    pub fn codegen(&self, provider: &dyn Provider, name: &str) -> String {
        match self.base {
            BaseType::Bit => {
                let first = self.dims.first().copied().unwrap_or(1);
                let width = [8u32, 16, 32, 64]
                    .iter()
                    .copied()
                    .find(|w| first <= *w)
                    .unwrap_or(64);
                let array: String = self.dims[1..]
                    .iter()
                    .rev()
                    .map(|d| format!("[{d}]"))
                    .collect();
                format!("uint{width}_t {name}{array}")
            }
            BaseType::Integer => format!("long {name}"),
            BaseType::Wire => format!("{} {}", provider.wire_type(), name),
        }
    }
}

// ── LValues ──

/// A base identifier plus index expressions (already flattened to C text).
///
/// With indices, the final index selects a bit within the packed first
/// dimension; earlier indices are plain array subscripts.
#[derive(Debug, Clone, PartialEq)]
pub struct LValue {
    pub base: String,
    pub indices: Vec<String>,
}

impl LValue {
    pub fn new(base: impl Into<String>, indices: Vec<String>) -> Self {
        LValue {
            base: base.into(),
            indices,
        }
    }

    fn subscripted_base(&self, prefix: &str) -> String {
        let mut s = format!("{prefix}{}", self.base);
        for idx in &self.indices[..self.indices.len() - 1] {
            s.push('[');
            s.push_str(idx);
            s.push(']');
        }
        s
    }

    /// Rvalue form: the bare identifier, or a single-bit extraction.
    pub fn rvalue(&self) -> String {
        if self.indices.is_empty() {
            return self.base.clone();
        }
        let last = self.indices.last().unwrap();
        format!("(({} >> ({})) & 1)", self.subscripted_base(""), last)
    }

    /// Assignment statement(s). With indices this is a read-modify-write
    /// on the selected bit.
    pub fn codegen_assign(&self, value: &str, deref: bool) -> String {
        let prefix = if deref { "*" } else { "" };
        if self.indices.is_empty() {
            return format!("{prefix}{} = {};\n", self.base, value);
        }
        let lhs = self.subscripted_base(prefix);
        let last = self.indices.last().unwrap();
        format!("{lhs} &= ~(1UL << {last});\n{lhs} |= (!!({value})) << {last};\n")
    }
}

// ── Declarations ──

#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub ty: Type,
    pub name: String,
    /// Source initializer, possibly replaced by a `--param` override.
    pub init: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub ty: Type,
    pub name: String,
}

// ── Durations ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    S,
    Ms,
    Us,
    Ns,
}

impl TimeUnit {
    pub fn from_str(text: &str) -> Option<TimeUnit> {
        match text {
            "s" => Some(TimeUnit::S),
            "ms" => Some(TimeUnit::Ms),
            "us" => Some(TimeUnit::Us),
            "ns" => Some(TimeUnit::Ns),
            _ => None,
        }
    }
}

/// A timing bound. The value is a pass-through C expression (a literal or
/// a parameter name), so the unit conversion stays symbolic.
#[derive(Debug, Clone, PartialEq)]
pub struct Duration {
    pub value: String,
    pub unit: TimeUnit,
}

impl Duration {
    /// Full period in microseconds, as a C expression.
    pub fn us_expr(&self) -> String {
        let suffix = match self.unit {
            TimeUnit::S => " * 1000000",
            TimeUnit::Ms => " * 1000",
            TimeUnit::Us => "",
            TimeUnit::Ns => " / 1000",
        };
        format!("({}){}", self.value, suffix)
    }

    /// Half period in microseconds, as a C expression.
    pub fn half_us_expr(&self) -> String {
        format!("({}) / 2", self.us_expr())
    }
}

// ── Function arguments ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    Input,
    Output,
}

#[derive(Debug, Clone)]
pub struct Argument {
    pub io: IoKind,
    pub ty: Type,
    pub name: String,
}

impl Argument {
    /// C parameter declarator. Inputs are passed by pointer.
    pub fn codegen(&self, provider: &dyn Provider) -> String {
        let name = match self.io {
            IoKind::Input => format!("(*{})", self.name),
            IoKind::Output => self.name.clone(),
        };
        self.ty.codegen(provider, &name)
    }
}

// ── Statements ──

#[derive(Debug, Clone)]
pub struct VariableAssignment {
    pub target: LValue,
    pub expr: String,
}

impl VariableAssignment {
    pub fn codegen(&self, deref: bool) -> String {
        self.target.codegen_assign(&self.expr, deref)
    }
}

/// One emission unit: a connected subgraph of states bounded by `end`.
/// With no `start`, the end state alone is emitted.
#[derive(Debug, Clone)]
pub struct StatePath {
    pub start: Option<String>,
    pub end: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Assign(VariableAssignment),
    Path(StatePath),
}

// ── Wire actions ──

/// What a wire event means to the receiver: `Transfer` carries data the
/// receiver stores through the lvalue; `Send` carries an expected value
/// the receiver may assert against.
#[derive(Debug, Clone)]
pub enum WireKind {
    Transfer(LValue),
    Send(String),
}

/// A state-level wire event. `driver` is the endpoint that writes the
/// wire; the same action compiles to complementary programs on the two
/// sides.
#[derive(Debug, Clone)]
pub struct WireAction {
    pub kind: WireKind,
    pub driver: Driver,
    pub wire: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Action {
    Assign(VariableAssignment),
    Wire(WireAction),
}

// ── States ──

#[derive(Debug, Clone)]
pub enum Cond {
    Duration(Duration),
    Wire(String),
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub predicate: Option<String>,
    pub target: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct State {
    pub label: String,
    pub conds: Vec<Cond>,
    pub actions: Vec<Action>,
    pub transitions: Vec<Transition>,
    /// Label of the textual successor at state-map construction time.
    pub next_state_label: Option<String>,
    pub span: Span,
}

impl State {
    /// Labels this state can branch to, in source order: every transition
    /// target, then the textual successor — the latter only when all
    /// transitions are predicated (fall-through still possible).
    pub fn successors(&self) -> Vec<String> {
        let mut can_fall_through = true;
        let mut next = Vec::new();
        for transition in &self.transitions {
            if !next.contains(&transition.target) {
                next.push(transition.target.clone());
            }
            if transition.predicate.is_none() {
                can_fall_through = false;
            }
        }
        if can_fall_through {
            if let Some(label) = &self.next_state_label {
                if !next.contains(label) {
                    next.push(label.clone());
                }
            }
        }
        next
    }

    /// First duration condition, if any.
    pub fn duration(&self) -> Option<&Duration> {
        self.conds.iter().find_map(|c| match c {
            Cond::Duration(d) => Some(d),
            Cond::Wire(_) => None,
        })
    }

    /// True if `wire` is listed in this state's condition set.
    pub fn watches_wire(&self, wire: &str) -> bool {
        self.conds
            .iter()
            .any(|c| matches!(c, Cond::Wire(w) if w == wire))
    }
}

// ── State table ──

/// Arena index of a state within its function's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(pub u32);

/// Per-function state storage: an arena of states plus the label map.
/// Fall-through edges are labels, not indices, so the logical graph may
/// contain cycles while the data stays a flat arena.
#[derive(Debug, Default)]
pub struct StateTable {
    states: Vec<State>,
    by_label: HashMap<String, StateId>,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a state under its label. Rejects duplicates, handing the
    /// state back so the caller can report its span.
    pub fn insert(&mut self, state: State) -> Result<StateId, State> {
        if self.by_label.contains_key(&state.label) {
            return Err(state);
        }
        let id = StateId(self.states.len() as u32);
        self.by_label.insert(state.label.clone(), id);
        self.states.push(state);
        Ok(id)
    }

    pub fn get(&self, label: &str) -> Option<&State> {
        self.by_label.get(label).map(|id| &self.states[id.0 as usize])
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// States in insertion (source) order.
    pub fn iter(&self) -> impl Iterator<Item = &State> {
        self.states.iter()
    }
}

// ── Functions and the program root ──

#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub args: Vec<Argument>,
    pub stmts: Vec<Stmt>,
    pub states: StateTable,
    pub span: Span,
}

#[derive(Debug, Default)]
pub struct Ast {
    pub params: Vec<ParamDecl>,
    pub vars: Vec<VarDecl>,
    pub shared: Vec<Function>,
    pub left: Vec<Function>,
    pub right: Vec<Function>,
}

impl Ast {
    /// The endpoint-specific functions for the compiled side.
    pub fn side_functions(&self, side: Driver) -> &[Function] {
        match side {
            Driver::Left => &self.left,
            Driver::Right => &self.right,
        }
    }
}

// ── Tests ──
