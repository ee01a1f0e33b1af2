// preprocess.rs — Loop unrolling over the parse tree.
//
// Rewrites every `for_loop` subtree into a flat `state_list` holding one
// deep copy of the loop body per iteration, with the counter substituted
// into tokens. Two substitution classes apply:
//
//   - identifier tokens are replaced whole, and only when the token text
//     equals the counter name;
//   - label tokens get textual substring replacement, so composed labels
//     like `bit_i` expand to `bit_0`, `bit_1`, ...
//
// The substring rule means a counter name that also occurs inside an
// unrelated label will be rewritten there too. Callers pick counter names
// accordingly; the behavior is covered by tests as a fixed boundary.
//
// Preconditions: tree produced by `parser::parse`.
// Postconditions: the returned tree contains no `for_loop` nodes.
// Failure modes: malformed loop bounds, counter reuse in nested loops.
// Side effects: none.

use crate::cst::{CstToken, Node, Rule, TokenKind, Tree};
use crate::diag::{codes, Diagnostic};

/// Result of preprocessing: rewritten tree plus any diagnostics.
#[derive(Debug)]
pub struct PreprocessResult {
    pub tree: Node,
    pub diagnostics: Vec<Diagnostic>,
}

/// Unroll all `for_loop` nodes in the tree.
pub fn preprocess(tree: Node) -> PreprocessResult {
    let mut pp = Preprocessor {
        diagnostics: Vec::new(),
    };
    let mut active = Vec::new();
    let tree = pp.expand(tree, &mut active);
    PreprocessResult {
        tree,
        diagnostics: pp.diagnostics,
    }
}

struct Preprocessor {
    diagnostics: Vec<Diagnostic>,
}

impl Preprocessor {
    fn expand(&mut self, node: Node, active: &mut Vec<String>) -> Node {
        match node {
            Node::Token(t) => Node::Token(t),
            Node::Tree(tree) if tree.rule == Rule::ForLoop => self.expand_for(tree, active),
            Node::Tree(tree) => {
                let children = tree
                    .children
                    .into_iter()
                    .map(|c| self.expand(c, active))
                    .collect();
                Node::Tree(Tree::new(tree.rule, children))
            }
        }
    }

    fn expand_for(&mut self, tree: Tree, active: &mut Vec<String>) -> Node {
        let mut children = tree.children.into_iter();
        let counter = expect_token(children.next());
        let start_tok = expect_token(children.next());
        let stop_tok = expect_token(children.next());
        let body = match children.next() {
            Some(Node::Tree(t)) if t.rule == Rule::StateList => t,
            _ => Tree::new(Rule::StateList, Vec::new()),
        };

        let start = self.int_bound(&start_tok);
        let stop = self.int_bound(&stop_tok);
        let (Some(start), Some(stop)) = (start, stop) else {
            return Node::tree(Rule::StateList, Vec::new());
        };

        if active.iter().any(|c| *c == counter.text) {
            self.diagnostics.push(
                Diagnostic::error(
                    counter.span,
                    format!("loop counter `{}` is already in use", counter.text),
                )
                .with_code(codes::COUNTER_REUSE),
            );
            return Node::tree(Rule::StateList, Vec::new());
        }

        active.push(counter.text.clone());
        let mut unrolled = Vec::new();
        for k in start..=stop {
            for item in &body.children {
                let copy = substitute(item.clone(), &counter.text, k);
                unrolled.push(self.expand(copy, active));
            }
        }
        active.pop();

        Node::tree(Rule::StateList, unrolled)
    }

    fn int_bound(&mut self, tok: &CstToken) -> Option<i64> {
        if tok.kind == TokenKind::Int {
            if let Ok(v) = tok.text.parse::<i64>() {
                return Some(v);
            }
        }
        self.diagnostics.push(
            Diagnostic::error(
                tok.span,
                format!("loop bound `{}` is not an integer", tok.text),
            )
            .with_code(codes::BAD_LOOP_BOUND),
        );
        None
    }
}

fn expect_token(node: Option<Node>) -> CstToken {
    match node {
        Some(Node::Token(t)) => t,
        _ => CstToken::new(TokenKind::Ident, "", crate::lexer::Span::new(0, 0)),
    }
}

/// Apply both substitution classes throughout a subtree.
fn substitute(node: Node, counter: &str, k: i64) -> Node {
    match node {
        Node::Token(mut t) => {
            match t.kind {
                TokenKind::Ident if t.text == counter => {
                    t.text = k.to_string();
                }
                TokenKind::Label => {
                    t.text = t.text.replace(counter, &k.to_string());
                }
                _ => {}
            }
            Node::Token(t)
        }
        Node::Tree(tree) => {
            let children = tree
                .children
                .into_iter()
                .map(|c| substitute(c, counter, k))
                .collect();
            Node::Tree(Tree::new(tree.rule, children))
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn preprocess_ok(source: &str) -> Node {
        let parsed = parser::parse(source);
        assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        let result = preprocess(parsed.tree.unwrap());
        assert!(
            result.diagnostics.is_empty(),
            "unexpected diagnostics: {:?}",
            result.diagnostics
        );
        result.tree
    }

    /// Collect the labels of every state below `node`, in tree order.
    fn state_labels(node: &Node, out: &mut Vec<String>) {
        if let Node::Tree(tree) = node {
            if tree.rule == Rule::State {
                if let Some(Node::Token(t)) = tree.children.first() {
                    if t.kind == TokenKind::Label {
                        out.push(t.text.clone());
                    }
                }
            }
            for child in &tree.children {
                state_labels(child, out);
            }
        }
    }

    /// Collect every token below `node`, in tree order.
    fn all_tokens(node: &Node, out: &mut Vec<CstToken>) {
        match node {
            Node::Token(t) => out.push(t.clone()),
            Node::Tree(tree) => {
                for child in &tree.children {
                    all_tokens(child, out);
                }
            }
        }
    }

    fn contains_rule(node: &Node, rule: Rule) -> bool {
        match node {
            Node::Token(_) => false,
            Node::Tree(tree) => {
                tree.rule == rule || tree.children.iter().any(|c| contains_rule(c, rule))
            }
        }
    }

    #[test]
    fn unrolls_inclusive_bounds() {
        let tree =
            preprocess_ok("left_functions { func f() { for i in 1..3 { state l_i { } } } }");
        let mut labels = Vec::new();
        state_labels(&tree, &mut labels);
        assert_eq!(labels, vec!["l_1", "l_2", "l_3"]);
        assert!(!contains_rule(&tree, Rule::ForLoop));
    }

    #[test]
    fn empty_range_unrolls_to_nothing() {
        let tree =
            preprocess_ok("left_functions { func f() { for i in 3..2 { state l_i { } } } }");
        let mut labels = Vec::new();
        state_labels(&tree, &mut labels);
        assert!(labels.is_empty());
    }

    #[test]
    fn identifier_substitution_is_whole_token() {
        let tree = preprocess_ok(
            "left_functions { func f() { for i in 2..2 { state s_i { clk -> d[i]; clk => ii; } } } }",
        );
        let mut tokens = Vec::new();
        all_tokens(&tree, &mut tokens);
        // Index expression `i` becomes `2`; identifier `ii` is untouched.
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Ident && t.text == "2"));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Ident && t.text == "ii"));
        assert!(!tokens.iter().any(|t| t.kind == TokenKind::Ident && t.text == "i"));
    }

    #[test]
    fn label_substitution_is_substring() {
        // Counter `i` also occurs inside `init_i`; every occurrence is
        // rewritten, including the ones in the middle of the word.
        let tree =
            preprocess_ok("left_functions { func f() { for i in 1..1 { state init_i { } } } }");
        let mut labels = Vec::new();
        state_labels(&tree, &mut labels);
        assert_eq!(labels, vec!["1n1t_1"]);
    }

    #[test]
    fn goto_targets_are_substituted() {
        let tree = preprocess_ok(
            "left_functions { func f() { for i in 0..1 { state b_i { goto b_i; } } } }",
        );
        let mut tokens = Vec::new();
        all_tokens(&tree, &mut tokens);
        let targets: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Label)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(targets, vec!["b_0", "b_0", "b_1", "b_1"]);
    }

    #[test]
    fn nested_loops_expand() {
        let tree = preprocess_ok(
            "left_functions { func f() { for i in 0..1 { for j in 0..1 { state s_i_j { } } } } }",
        );
        let mut labels = Vec::new();
        state_labels(&tree, &mut labels);
        assert_eq!(labels, vec!["s_0_0", "s_0_1", "s_1_0", "s_1_1"]);
    }

    #[test]
    fn counter_reuse_is_an_error() {
        let parsed = parser::parse(
            "left_functions { func f() { for i in 0..1 { for i in 0..1 { state s { } } } } }",
        );
        assert!(parsed.errors.is_empty());
        let result = preprocess(parsed.tree.unwrap());
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, Some(codes::COUNTER_REUSE));
    }

    #[test]
    fn states_outside_loops_are_untouched() {
        let src = "left_functions { func f() { state a { } state b { } } }";
        let before = parser::parse(src).tree.unwrap();
        let after = preprocess_ok(src);
        assert_eq!(before, after);
    }
}
