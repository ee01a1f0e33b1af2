// Parser for com2 protocol source files.
//
// Parses a token stream (from the lexer) into a concrete parse tree
// (`cst::Node`) using chumsky combinators. The tree keeps tokens as leaves
// because the preprocessor substitutes loop counters at the token level
// before any typed AST exists.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns a parse tree plus any parse errors.
// Failure modes: syntax errors produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::cst::{CstToken, Node, Rule, TokenKind};
use crate::lexer::{self, Span, Token};

/// Result of parsing: parse tree plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub tree: Option<Node>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a com2 source string. Lexes then parses.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = lexer::lex(source);
    let len = source.len();

    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let (tree, parse_errors) = program_parser().parse(stream).into_output_errors();

    // Merge lex errors + parse errors.
    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        tree,
        errors: all_errors,
    }
}

fn sp(span: SimpleSpan) -> Span {
    Span::new(span.start(), span.end())
}

// ── Main parser builder ──
//
// All grammar rules are built inside `program_parser` so the combinators
// can share each other by cloning without lifetime annotations per rule.

fn program_parser<'tokens, I>(
) -> impl Parser<'tokens, I, Node, extra::Err<Rich<'tokens, Token, SimpleSpan>>>
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    // ── Leaf tokens ──

    let ident = select! {
        Token::Ident(name) = e => CstToken::new(TokenKind::Ident, name, sp(e.span())),
    };

    // Same lexeme class as `ident`, reclassified so the preprocessor can
    // apply substring substitution to labels only.
    let label = select! {
        Token::Ident(name) = e => CstToken::new(TokenKind::Label, name, sp(e.span())),
    };

    let int_tok = select! {
        Token::Int(v) = e => CstToken::new(TokenKind::Int, v.to_string(), sp(e.span())),
    };

    // ── Expressions ──
    //
    // An expression is a flat run of pass-through atoms: operators, integer
    // literals, possibly-subscripted identifiers, and parenthesised groups.
    // The atoms become the children of an `Expr` node; nested groups are
    // spliced inline so flattening later is pure token-text concatenation.
    // Expressions and lvalues are mutually recursive (index expressions
    // may themselves contain subscripted identifiers), so the lvalue and
    // group builders are shared helpers parameterised on the expression
    // parser.

    let expr = recursive(|expr| {
        let lvalue = lvalue_parser(expr.clone());

        let op_atom = any().try_map(|tok: Token, span| match tok.op_text() {
            Some(text) => Ok(vec![Node::Token(CstToken::new(
                TokenKind::Sym,
                text,
                sp(span),
            ))]),
            None => Err(Rich::custom(span, "expected an expression token")),
        });

        let int_atom = select! {
            Token::Int(v) = e => vec![Node::Token(CstToken::new(
                TokenKind::Int,
                v.to_string(),
                sp(e.span()),
            ))],
        };

        let lvalue_atom = lvalue.map(|lv| vec![lv]);
        let paren_atom = paren_group_parser(expr);

        choice((paren_atom, int_atom, lvalue_atom, op_atom))
            .repeated()
            .at_least(1)
            .collect::<Vec<Vec<Node>>>()
            .map(|atoms| atoms.into_iter().flatten().collect::<Vec<Node>>())
    });

    let lvalue = lvalue_parser(expr.clone());
    let paren_atom = paren_group_parser(expr.clone());
    let int_atom = int_tok.clone().map(|t| vec![Node::Token(t)]);

    let expr_tree = expr
        .clone()
        .map(|nodes: Vec<Node>| Node::tree(Rule::Expr, nodes));

    // ── Types and declarations ──

    let type_expr = ident
        .clone()
        .then(
            int_tok
                .clone()
                .delimited_by(just(Token::LBracket), just(Token::RBracket))
                .repeated()
                .collect::<Vec<_>>(),
        )
        .map(|(base, dims)| {
            let mut children = vec![Node::Token(base)];
            children.extend(dims.into_iter().map(Node::Token));
            Node::tree(Rule::TypeExpr, children)
        });

    let param_decl = type_expr
        .clone()
        .then(ident.clone())
        .then(just(Token::Equals).ignore_then(expr_tree.clone()).or_not())
        .then_ignore(just(Token::Semi))
        .map(|((ty, name), init)| {
            let mut children = vec![ty, Node::Token(name)];
            if let Some(init) = init {
                children.push(init);
            }
            Node::tree(Rule::ParamDecl, children)
        });

    let var_decl = type_expr
        .clone()
        .then(ident.clone())
        .then_ignore(just(Token::Semi))
        .map(|(ty, name)| Node::tree(Rule::VarDecl, vec![ty, Node::Token(name)]));

    // ── Conditions ──

    let unit = any().try_map(|tok: Token, span| match tok {
        Token::Ident(u) if matches!(u.as_str(), "s" | "ms" | "us" | "ns") => {
            Ok(CstToken::new(TokenKind::Unit, u, sp(span)))
        }
        _ => Err(Rich::custom(span, "expected a duration unit (s, ms, us, ns)")),
    });

    let duration = int_tok
        .clone()
        .or(ident.clone())
        .then(unit)
        .map(|(value, unit)| {
            Node::tree(
                Rule::DurationCond,
                vec![Node::Token(value), Node::Token(unit)],
            )
        });

    let cond = duration.or(ident.clone().map(Node::Token));

    let cond_list = cond
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen))
        .map(|conds| Node::tree(Rule::CondList, conds));

    // ── Actions ──

    let assign = lvalue
        .clone()
        .then_ignore(just(Token::Equals))
        .then(expr_tree.clone())
        .then_ignore(just(Token::Semi))
        .map(|(lv, value)| Node::tree(Rule::Assign, vec![lv, value]));

    let transfer_right = ident
        .clone()
        .then_ignore(just(Token::TransferRight))
        .then(lvalue.clone())
        .then_ignore(just(Token::Semi))
        .map(|(wire, lv)| Node::tree(Rule::TransferRight, vec![Node::Token(wire), lv]));

    let send_right = ident
        .clone()
        .then_ignore(just(Token::SendRight))
        .then(expr_tree.clone())
        .then_ignore(just(Token::Semi))
        .map(|(wire, value)| Node::tree(Rule::SendRight, vec![Node::Token(wire), value]));

    let transfer_left = lvalue
        .clone()
        .then_ignore(just(Token::TransferLeft))
        .then(ident.clone())
        .then_ignore(just(Token::Semi))
        .map(|(lv, wire)| Node::tree(Rule::TransferLeft, vec![lv, Node::Token(wire)]));

    // The leftward send value is a single atom (literal, lvalue, or
    // parenthesised expression) so the `<=` arrow is never swallowed
    // by a greedy expression.
    let send_value = choice((
        paren_atom.map(|nodes| Node::tree(Rule::Expr, nodes)),
        int_atom.map(|nodes| Node::tree(Rule::Expr, nodes)),
        lvalue.clone().map(|lv| Node::tree(Rule::Expr, vec![lv])),
    ));

    let send_left = send_value
        .then_ignore(just(Token::SendLeft))
        .then(ident.clone())
        .then_ignore(just(Token::Semi))
        .map(|(value, wire)| Node::tree(Rule::SendLeft, vec![value, Node::Token(wire)]));

    let action = choice((
        transfer_right,
        send_right,
        transfer_left,
        assign.clone(),
        send_left,
    ));

    // ── Transitions ──

    let goto_tail = just(Token::Goto)
        .ignore_then(label.clone())
        .then_ignore(just(Token::Semi));

    let plain_goto = goto_tail
        .clone()
        .map(|target| Node::tree(Rule::Transition, vec![Node::Token(target)]));

    let cond_goto = just(Token::If)
        .ignore_then(
            expr_tree
                .clone()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .then(goto_tail)
        .map(|(pred, target)| Node::tree(Rule::Transition, vec![pred, Node::Token(target)]));

    let transition = cond_goto.or(plain_goto);

    // ── States ──

    let state = just(Token::State)
        .ignore_then(label.clone().or_not())
        .then(cond_list.or_not())
        .then(
            action
                .repeated()
                .collect::<Vec<_>>()
                .then(transition.repeated().collect::<Vec<_>>())
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map(|((label_opt, conds_opt), (actions, transitions))| {
            let mut children = Vec::new();
            if let Some(l) = label_opt {
                children.push(Node::Token(l));
            }
            children.push(conds_opt.unwrap_or_else(|| Node::tree(Rule::CondList, Vec::new())));
            children.push(Node::tree(Rule::ActionList, actions));
            children.push(Node::tree(Rule::TransitionList, transitions));
            Node::tree(Rule::State, children)
        });

    let for_loop = recursive(|for_loop| {
        just(Token::For)
            .ignore_then(ident.clone())
            .then_ignore(just(Token::In))
            .then(int_tok.clone())
            .then_ignore(just(Token::DotDot))
            .then(int_tok.clone())
            .then(
                state
                    .clone()
                    .or(for_loop)
                    .repeated()
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::LBrace), just(Token::RBrace)),
            )
            .map(|(((counter, start), stop), body)| {
                Node::tree(
                    Rule::ForLoop,
                    vec![
                        Node::Token(counter),
                        Node::Token(start),
                        Node::Token(stop),
                        Node::tree(Rule::StateList, body),
                    ],
                )
            })
    });

    // ── Statements and functions ──

    let path_stmt = just(Token::Path)
        .ignore_then(label.clone())
        .then(just(Token::DotDot).ignore_then(label.clone()).or_not())
        .then_ignore(just(Token::Semi))
        .map(|(first, second)| {
            let children = match second {
                Some(end) => vec![Node::Token(first), Node::Token(end)],
                None => vec![Node::Token(first)],
            };
            Node::tree(Rule::StatePathStmt, children)
        });

    let arg = choice((
        just(Token::Input).to("input"),
        just(Token::Output).to("output"),
    ))
    .map_with(|io, e| CstToken::new(TokenKind::Ident, io, sp(e.span())))
    .then(type_expr.clone())
    .then(ident.clone())
    .map(|((io, ty), name)| Node::tree(Rule::Arg, vec![Node::Token(io), ty, Node::Token(name)]));

    let arg_list = arg
        .separated_by(just(Token::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen))
        .map(|args| Node::tree(Rule::ArgList, args));

    let body_item = choice((state, for_loop, path_stmt, assign));

    let function = just(Token::Func)
        .ignore_then(ident.clone())
        .then(arg_list)
        .then(
            body_item
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map(|((name, args), mut body)| {
            let mut children = vec![Node::Token(name), args];
            children.append(&mut body);
            Node::tree(Rule::Function, children)
        });

    // ── Sections ──

    let braced_functions = function
        .repeated()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBrace), just(Token::RBrace));

    let parameters = just(Token::Parameters)
        .ignore_then(
            param_decl
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map(|decls| Node::tree(Rule::Parameters, decls));

    let variables = just(Token::Variables)
        .ignore_then(
            var_decl
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map(|decls| Node::tree(Rule::Variables, decls));

    let shared_functions = just(Token::SharedFunctions)
        .ignore_then(braced_functions.clone())
        .map(|fns| Node::tree(Rule::SharedFunctions, fns));

    let left_functions = just(Token::LeftFunctions)
        .ignore_then(braced_functions.clone())
        .map(|fns| Node::tree(Rule::LeftFunctions, fns));

    let right_functions = just(Token::RightFunctions)
        .ignore_then(braced_functions)
        .map(|fns| Node::tree(Rule::RightFunctions, fns));

    let section = choice((
        parameters,
        variables,
        shared_functions,
        left_functions,
        right_functions,
    ));

    section
        .repeated()
        .collect::<Vec<_>>()
        .then_ignore(end())
        .map(|sections| Node::tree(Rule::Program, sections))
}

/// Lvalue: an identifier with zero or more bracketed index expressions.
fn lvalue_parser<'tokens, I>(
    expr: impl Parser<'tokens, I, Vec<Node>, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + Clone,
) -> impl Parser<'tokens, I, Node, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let ident = select! {
        Token::Ident(name) = e => CstToken::new(TokenKind::Ident, name, sp(e.span())),
    };
    ident
        .then(
            expr.map(|nodes: Vec<Node>| Node::tree(Rule::Expr, nodes))
                .delimited_by(just(Token::LBracket), just(Token::RBracket))
                .repeated()
                .collect::<Vec<_>>(),
        )
        .map(|(base, indices)| {
            let mut children = vec![Node::Token(base)];
            children.extend(indices);
            Node::tree(Rule::LValue, children)
        })
}

/// Parenthesised expression group, spliced flat with its delimiters so
/// flattening reproduces the source parentheses.
fn paren_group_parser<'tokens, I>(
    expr: impl Parser<'tokens, I, Vec<Node>, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + Clone,
) -> impl Parser<'tokens, I, Vec<Node>, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    just(Token::LParen)
        .map_with(|_, e| CstToken::new(TokenKind::Sym, "(", sp(e.span())))
        .then(expr)
        .then(just(Token::RParen).map_with(|_, e| CstToken::new(TokenKind::Sym, ")", sp(e.span()))))
        .map(|((open, inner), close)| {
            let mut nodes = vec![Node::Token(open)];
            nodes.extend(inner);
            nodes.push(Node::Token(close));
            nodes
        })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Node {
        let result = parse(source);
        assert!(
            result.errors.is_empty(),
            "unexpected parse errors: {:?}",
            result.errors
        );
        result.tree.expect("no tree produced")
    }

    fn child<'a>(node: &'a Node, idx: usize) -> &'a Node {
        &node.as_tree().expect("expected tree").children[idx]
    }

    #[test]
    fn empty_program() {
        let tree = parse_ok("");
        let program = tree.as_tree().unwrap();
        assert_eq!(program.rule, Rule::Program);
        assert!(program.children.is_empty());
    }

    #[test]
    fn parameter_section() {
        let tree = parse_ok("parameters { wire clk = 2; integer baud = 9600; }");
        let section = child(&tree, 0).as_tree().unwrap();
        assert_eq!(section.rule, Rule::Parameters);
        assert_eq!(section.children.len(), 2);
        let decl = section.children[0].as_tree().unwrap();
        assert_eq!(decl.rule, Rule::ParamDecl);
        assert_eq!(decl.children.len(), 3);
        assert_eq!(decl.children[1].as_token().unwrap().text, "clk");
    }

    #[test]
    fn parameter_without_init() {
        let tree = parse_ok("parameters { integer baud; }");
        let decl = child(child(&tree, 0), 0).as_tree().unwrap();
        assert_eq!(decl.children.len(), 2);
    }

    #[test]
    fn variable_with_dims() {
        let tree = parse_ok("variables { bit[8][4] buf; }");
        let decl = child(child(&tree, 0), 0).as_tree().unwrap();
        assert_eq!(decl.rule, Rule::VarDecl);
        let ty = decl.children[0].as_tree().unwrap();
        assert_eq!(ty.rule, Rule::TypeExpr);
        let dims: Vec<&str> = ty.children[1..]
            .iter()
            .map(|n| n.as_token().unwrap().text.as_str())
            .collect();
        assert_eq!(dims, vec!["8", "4"]);
    }

    #[test]
    fn state_with_label_conds_actions() {
        let tree = parse_ok(
            "left_functions { func f() { state start (5 ms, ack) { clk -> d; } } }",
        );
        let func = child(child(&tree, 0), 0);
        let state = child(func, 2).as_tree().unwrap();
        assert_eq!(state.rule, Rule::State);
        // label, cond_list, action_list, transition_list
        assert_eq!(state.children.len(), 4);
        let label = state.children[0].as_token().unwrap();
        assert_eq!(label.kind, TokenKind::Label);
        assert_eq!(label.text, "start");
        let conds = state.children[1].as_tree().unwrap();
        assert_eq!(conds.rule, Rule::CondList);
        assert_eq!(conds.children.len(), 2);
        assert!(conds.children[0].is_rule(Rule::DurationCond));
        assert_eq!(conds.children[1].as_token().unwrap().kind, TokenKind::Ident);
        let actions = state.children[2].as_tree().unwrap();
        assert_eq!(actions.children.len(), 1);
        assert!(actions.children[0].is_rule(Rule::TransferRight));
    }

    #[test]
    fn anonymous_state() {
        let tree = parse_ok("left_functions { func f() { state { } } }");
        let func = child(child(&tree, 0), 0);
        let state = child(func, 2).as_tree().unwrap();
        // cond_list, action_list, transition_list (no label)
        assert_eq!(state.children.len(), 3);
        assert!(state.children[0].is_rule(Rule::CondList));
    }

    #[test]
    fn wire_actions() {
        let tree = parse_ok(
            "left_functions { func f() { state s { clk -> d; d <- clk; clk => 1; 0 <= clk; } } }",
        );
        let func = child(child(&tree, 0), 0);
        let actions = child(child(func, 2), 1).as_tree().unwrap();
        let rules: Vec<Rule> = actions
            .children
            .iter()
            .map(|n| n.as_tree().unwrap().rule)
            .collect();
        assert_eq!(
            rules,
            vec![
                Rule::TransferRight,
                Rule::TransferLeft,
                Rule::SendRight,
                Rule::SendLeft,
            ]
        );
    }

    #[test]
    fn transitions() {
        let tree = parse_ok(
            "left_functions { func f() { state s { if (d == 1) goto stop; goto s; } } }",
        );
        let func = child(child(&tree, 0), 0);
        let transitions = child(child(func, 2), 2).as_tree().unwrap();
        assert_eq!(transitions.children.len(), 2);
        let predicated = transitions.children[0].as_tree().unwrap();
        assert_eq!(predicated.children.len(), 2);
        assert!(predicated.children[0].is_rule(Rule::Expr));
        let target = predicated.children[1].as_token().unwrap();
        assert_eq!(target.kind, TokenKind::Label);
        assert_eq!(target.text, "stop");
        let plain = transitions.children[1].as_tree().unwrap();
        assert_eq!(plain.children.len(), 1);
    }

    #[test]
    fn for_loop_shape() {
        let tree = parse_ok(
            "left_functions { func f() { for i in 0..7 { state bit_i { } } } }",
        );
        let func = child(child(&tree, 0), 0);
        let for_loop = child(func, 2).as_tree().unwrap();
        assert_eq!(for_loop.rule, Rule::ForLoop);
        assert_eq!(for_loop.children[0].as_token().unwrap().text, "i");
        assert_eq!(for_loop.children[1].as_token().unwrap().text, "0");
        assert_eq!(for_loop.children[2].as_token().unwrap().text, "7");
        let states = for_loop.children[3].as_tree().unwrap();
        assert_eq!(states.rule, Rule::StateList);
        assert_eq!(states.children.len(), 1);
    }

    #[test]
    fn path_statements() {
        let tree = parse_ok("left_functions { func f() { path a .. b; path b; } }");
        let func = child(child(&tree, 0), 0).as_tree().unwrap();
        let two = func.children[2].as_tree().unwrap();
        assert_eq!(two.rule, Rule::StatePathStmt);
        assert_eq!(two.children.len(), 2);
        let one = func.children[3].as_tree().unwrap();
        assert_eq!(one.children.len(), 1);
        assert_eq!(one.children[0].as_token().unwrap().kind, TokenKind::Label);
    }

    #[test]
    fn function_arguments() {
        let tree = parse_ok("left_functions { func f(input byte d, output bit ack) { } }");
        let func = child(child(&tree, 0), 0);
        let args = child(func, 1).as_tree().unwrap();
        assert_eq!(args.rule, Rule::ArgList);
        assert_eq!(args.children.len(), 2);
        let first = args.children[0].as_tree().unwrap();
        assert_eq!(first.children[0].as_token().unwrap().text, "input");
        assert_eq!(first.children[2].as_token().unwrap().text, "d");
    }

    #[test]
    fn subscript_inside_expression() {
        let tree = parse_ok("left_functions { func f() { state s { clk => d[3] + 1; } } }");
        let func = child(child(&tree, 0), 0);
        let send = child(child(child(func, 2), 1), 0).as_tree().unwrap();
        let expr = send.children[1].as_tree().unwrap();
        assert!(expr.children[0].is_rule(Rule::LValue));
        assert_eq!(expr.children[1].as_token().unwrap().text, "+");
        assert_eq!(expr.children[2].as_token().unwrap().text, "1");
    }

    #[test]
    fn nested_parens_in_predicate() {
        let tree = parse_ok(
            "left_functions { func f() { state s { if ((d + 1) * 2 <= 8) goto s; } } }",
        );
        let func = child(child(&tree, 0), 0);
        let transitions = child(child(func, 2), 2).as_tree().unwrap();
        assert_eq!(transitions.children.len(), 1);
    }

    #[test]
    fn rejects_action_after_transition() {
        let result = parse("left_functions { func f() { state s { goto s; clk -> d; } } }");
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn rejects_stray_token() {
        let result = parse("parameters { wire clk = ; }");
        assert!(!result.errors.is_empty());
    }
}
