// cst.rs — Concrete parse tree for com2 source.
//
// The parser produces this tree; the preprocessor rewrites it (loop
// unrolling works on tokens, not typed nodes); the transformer consumes it
// to build the typed AST. Leaves are tokens carrying kind, text, and span,
// so token-level substitution never has to consult the source again.

use crate::lexer::Span;

/// Grammar rule that produced an interior node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Program,
    Parameters,
    Variables,
    SharedFunctions,
    LeftFunctions,
    RightFunctions,
    ParamDecl,
    VarDecl,
    TypeExpr,
    Function,
    ArgList,
    Arg,
    Assign,
    StatePathStmt,
    ForLoop,
    StateList,
    State,
    CondList,
    DurationCond,
    ActionList,
    TransitionList,
    TransferRight,
    TransferLeft,
    SendRight,
    SendLeft,
    Transition,
    LValue,
    Expr,
}

impl Rule {
    pub fn name(self) -> &'static str {
        match self {
            Rule::Program => "program",
            Rule::Parameters => "parameters",
            Rule::Variables => "variables",
            Rule::SharedFunctions => "shared_functions",
            Rule::LeftFunctions => "left_functions",
            Rule::RightFunctions => "right_functions",
            Rule::ParamDecl => "param_decl",
            Rule::VarDecl => "var_decl",
            Rule::TypeExpr => "type",
            Rule::Function => "function",
            Rule::ArgList => "arg_list",
            Rule::Arg => "arg",
            Rule::Assign => "assign",
            Rule::StatePathStmt => "state_path",
            Rule::ForLoop => "for_loop",
            Rule::StateList => "state_list",
            Rule::State => "state",
            Rule::CondList => "cond_list",
            Rule::DurationCond => "duration",
            Rule::ActionList => "action_list",
            Rule::TransitionList => "transition_list",
            Rule::TransferRight => "transfer_right",
            Rule::TransferLeft => "transfer_left",
            Rule::SendRight => "send_right",
            Rule::SendLeft => "send_left",
            Rule::Transition => "transition",
            Rule::LValue => "lvalue",
            Rule::Expr => "expr",
        }
    }
}

/// Lexical class of a leaf token.
///
/// The preprocessor keys its two substitution rules off this: `Ident`
/// tokens are replaced whole when they equal the loop counter, `Label`
/// tokens get textual substring replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Label,
    Int,
    Unit,
    Sym,
}

impl TokenKind {
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Ident => "IDENT",
            TokenKind::Label => "LABEL",
            TokenKind::Int => "INT",
            TokenKind::Unit => "UNIT",
            TokenKind::Sym => "SYM",
        }
    }
}

/// A leaf token in the parse tree.
#[derive(Debug, Clone, PartialEq)]
pub struct CstToken {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl CstToken {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        CstToken {
            kind,
            text: text.into(),
            span,
        }
    }
}

/// An interior node: a rule and its ordered children.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    pub rule: Rule,
    pub children: Vec<Node>,
}

impl Tree {
    pub fn new(rule: Rule, children: Vec<Node>) -> Self {
        Tree { rule, children }
    }
}

/// A parse tree node: interior rule or leaf token.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Tree(Tree),
    Token(CstToken),
}

impl Node {
    pub fn tree(rule: Rule, children: Vec<Node>) -> Self {
        Node::Tree(Tree::new(rule, children))
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Node::Tree(t) => Some(t),
            Node::Token(_) => None,
        }
    }

    pub fn as_token(&self) -> Option<&CstToken> {
        match self {
            Node::Token(t) => Some(t),
            Node::Tree(_) => None,
        }
    }

    /// True if this node is an interior node produced by `rule`.
    pub fn is_rule(&self, rule: Rule) -> bool {
        matches!(self, Node::Tree(t) if t.rule == rule)
    }

    /// Span of the first token under this node, for diagnostics.
    pub fn span(&self) -> Span {
        match self {
            Node::Token(t) => t.span,
            Node::Tree(t) => t
                .children
                .first()
                .map(Node::span)
                .unwrap_or(Span { start: 0, end: 0 }),
        }
    }

    /// Indented dump of the tree, one node per line.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.pretty_into(&mut out, 0);
        out
    }

    fn pretty_into(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        match self {
            Node::Token(t) => {
                out.push_str(t.kind.name());
                out.push_str(" \"");
                out.push_str(&t.text);
                out.push_str("\"\n");
            }
            Node::Tree(t) => {
                out.push_str(t.rule.name());
                out.push('\n');
                for child in &t.children {
                    child.pretty_into(out, depth + 1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(kind: TokenKind, text: &str) -> Node {
        Node::Token(CstToken::new(kind, text, Span::new(0, text.len())))
    }

    #[test]
    fn pretty_dump() {
        let tree = Node::tree(
            Rule::State,
            vec![
                tok(TokenKind::Label, "idle"),
                Node::tree(Rule::CondList, vec![tok(TokenKind::Ident, "ack")]),
            ],
        );
        assert_eq!(
            tree.pretty(),
            "state\n  LABEL \"idle\"\n  cond_list\n    IDENT \"ack\"\n"
        );
    }

    #[test]
    fn span_of_tree_is_first_token() {
        let tree = Node::tree(
            Rule::Expr,
            vec![Node::Token(CstToken::new(
                TokenKind::Int,
                "5",
                Span::new(10, 11),
            ))],
        );
        assert_eq!(tree.span(), Span::new(10, 11));
    }
}
