// Snippet parser - converts the token stream into statements.
// Precedence, loosest first: if-else, or, and, not, comparisons (incl. in / is), |, &,
// + -, * / // %, unary - + ~, **, postfix (attribute, call, subscript).

use super::ast::{BinOp, BoolOp, CmpOp, Expr, Statement, StmtKind, Target, UnaryOp};
use super::error::{EngineError, EngineResult};
use super::lexer::{tokenize, Spanned, Token};
use super::MAX_NESTING;

/// Statement keywords the language deliberately has no support for.
const UNSUPPORTED_STATEMENTS: &[&str] = &[
    "for", "while", "def", "class", "lambda", "import", "from", "if", "elif", "else", "return",
    "with", "try", "except", "finally", "raise", "global", "nonlocal", "yield", "async", "await",
    "assert", "pass", "break", "continue",
];

const RESERVED: &[&str] = &[
    "and", "or", "not", "in", "is", "del", "True", "False", "None", "for", "while", "def",
    "class", "lambda", "import", "from", "if", "elif", "else", "return", "with", "try",
    "except", "finally", "raise", "global", "nonlocal", "yield", "async", "await", "assert",
    "pass", "break", "continue",
];

/// Parse a whole snippet.
pub fn parse_program(source: &str) -> EngineResult<Vec<Statement>> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).program()
}

/// Parse a single expression (used by `query`).
pub fn parse_expression(source: &str) -> EngineResult<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.expr()?;
    parser.skip_newlines();
    if !parser.at(&Token::Eof) {
        return Err(parser.unexpected());
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Open brackets, prefix operators and left-deep chain links around the current position.
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn descend(&mut self) -> EngineResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(EngineError::syntax(format!(
                "expression nested more than {} levels deep",
                MAX_NESTING
            ))
            .at_line(self.line()));
        }
        Ok(())
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Name(n) if n == keyword)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> EngineResult<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(EngineError::syntax(format!("expected {}", what)).at_line(self.line()))
        }
    }

    fn unexpected(&self) -> EngineError {
        let found = match self.peek() {
            Token::Eof => "end of input".to_string(),
            Token::Newline => "end of line".to_string(),
            Token::Name(n) => format!("'{}'", n),
            other => format!("{:?}", other),
        };
        EngineError::syntax(format!("invalid syntax near {}", found)).at_line(self.line())
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Token::Newline) {}
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    fn program(&mut self) -> EngineResult<Vec<Statement>> {
        let mut statements = Vec::new();
        self.skip_newlines();
        while !self.at(&Token::Eof) {
            statements.push(self.statement()?);
            if !self.eat(&Token::Newline) && !self.at(&Token::Eof) {
                return Err(self.unexpected());
            }
            self.skip_newlines();
        }
        Ok(statements)
    }

    fn statement(&mut self) -> EngineResult<Statement> {
        let line = self.line();

        if let Token::Name(name) = self.peek() {
            if UNSUPPORTED_STATEMENTS.contains(&name.as_str()) {
                return Err(EngineError::syntax(format!(
                    "'{}' statements are not supported",
                    name
                ))
                .at_line(line));
            }
        }

        if self.eat_keyword("del") {
            let mut targets = Vec::new();
            loop {
                let expr = self.postfix()?;
                targets.push(self.to_target(&expr)?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            return Ok(Statement {
                kind: StmtKind::Del(targets),
                line,
            });
        }

        let first = self.expr()?;

        if let Token::AugAssign(symbol) = self.peek().clone() {
            self.advance();
            let op = match symbol {
                '+' => BinOp::Add,
                '-' => BinOp::Sub,
                '*' => BinOp::Mul,
                _ => BinOp::Div,
            };
            let target = self.to_target(&first)?;
            let value = self.expr()?;
            return Ok(Statement {
                kind: StmtKind::AugAssign { target, op, value },
                line,
            });
        }

        if !self.at(&Token::Assign) {
            return Ok(Statement {
                kind: StmtKind::Expr(first),
                line,
            });
        }

        let mut targets = vec![self.to_target(&first)?];
        let mut value;
        loop {
            self.expect(Token::Assign, "'='")?;
            value = self.expr()?;
            if self.at(&Token::Assign) {
                targets.push(self.to_target(&value)?);
            } else {
                break;
            }
        }
        Ok(Statement {
            kind: StmtKind::Assign { targets, value },
            line,
        })
    }

    fn to_target(&self, expr: &Expr) -> EngineResult<Target> {
        Target::from_expr(expr).ok_or_else(|| {
            EngineError::syntax("cannot assign to expression").at_line(self.line())
        })
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn expr(&mut self) -> EngineResult<Expr> {
        self.descend()?;
        let expr = self.conditional();
        self.depth -= 1;
        expr
    }

    fn conditional(&mut self) -> EngineResult<Expr> {
        if self.at_keyword("lambda") {
            return Err(EngineError::syntax("lambda expressions are not supported").at_line(self.line()));
        }
        let value = self.or_expr()?;
        if self.eat_keyword("if") {
            let cond = self.or_expr()?;
            if !self.eat_keyword("else") {
                return Err(EngineError::syntax("expected 'else' in conditional expression")
                    .at_line(self.line()));
            }
            let otherwise = self.expr()?;
            return Ok(Expr::IfElse {
                cond: Box::new(cond),
                then: Box::new(value),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(value)
    }

    fn or_expr(&mut self) -> EngineResult<Expr> {
        let mut left = self.and_expr()?;
        let mut links = 0;
        while self.eat_keyword("or") {
            self.descend()?;
            links += 1;
            let right = self.and_expr()?;
            left = Expr::Logical(BoolOp::Or, Box::new(left), Box::new(right));
        }
        self.depth -= links;
        Ok(left)
    }

    fn and_expr(&mut self) -> EngineResult<Expr> {
        let mut left = self.not_expr()?;
        let mut links = 0;
        while self.eat_keyword("and") {
            self.descend()?;
            links += 1;
            let right = self.not_expr()?;
            left = Expr::Logical(BoolOp::And, Box::new(left), Box::new(right));
        }
        self.depth -= links;
        Ok(left)
    }

    fn not_expr(&mut self) -> EngineResult<Expr> {
        if self.eat_keyword("not") {
            self.descend()?;
            let operand = self.not_expr();
            self.depth -= 1;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> EngineResult<Expr> {
        let left = self.bitor()?;
        let mut chain = Vec::new();

        loop {
            let op = match self.peek().clone() {
                Token::EqEq => CmpOp::Eq,
                Token::NotEq => CmpOp::NotEq,
                Token::Lt => CmpOp::Lt,
                Token::LtEq => CmpOp::LtEq,
                Token::Gt => CmpOp::Gt,
                Token::GtEq => CmpOp::GtEq,
                Token::Name(n) if n == "in" => CmpOp::In,
                Token::Name(n) if n == "is" => {
                    if matches!(self.peek_at(1), Token::Name(m) if m == "not") {
                        self.advance();
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                Token::Name(n) if n == "not" => {
                    if matches!(self.peek_at(1), Token::Name(m) if m == "in") {
                        self.advance();
                        CmpOp::NotIn
                    } else {
                        break;
                    }
                }
                _ => break,
            };
            self.advance();
            chain.push((op, self.bitor()?));
        }

        if chain.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare(Box::new(left), chain))
        }
    }

    fn bitor(&mut self) -> EngineResult<Expr> {
        let mut left = self.bitand()?;
        let mut links = 0;
        while self.eat(&Token::Pipe) {
            self.descend()?;
            links += 1;
            let right = self.bitand()?;
            left = Expr::Binary(BinOp::BitOr, Box::new(left), Box::new(right));
        }
        self.depth -= links;
        Ok(left)
    }

    fn bitand(&mut self) -> EngineResult<Expr> {
        let mut left = self.arith()?;
        let mut links = 0;
        while self.eat(&Token::Amp) {
            self.descend()?;
            links += 1;
            let right = self.arith()?;
            left = Expr::Binary(BinOp::BitAnd, Box::new(left), Box::new(right));
        }
        self.depth -= links;
        Ok(left)
    }

    fn arith(&mut self) -> EngineResult<Expr> {
        let mut left = self.term()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            self.descend()?;
            links += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth -= links;
        Ok(left)
    }

    fn term(&mut self) -> EngineResult<Expr> {
        let mut left = self.unary()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::DoubleSlash => BinOp::FloorDiv,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            self.descend()?;
            links += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth -= links;
        Ok(left)
    }

    fn unary(&mut self) -> EngineResult<Expr> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            Token::Tilde => UnaryOp::Invert,
            _ => return self.power(),
        };
        self.advance();
        self.descend()?;
        let operand = self.unary();
        self.depth -= 1;
        let operand = operand?;

        // Fold negative literals so `-1` stays a constant.
        Ok(match (op, operand) {
            (UnaryOp::Neg, Expr::Int(n)) => Expr::Int(-n),
            (UnaryOp::Neg, Expr::Float(f)) => Expr::Float(-f),
            (op, operand) => Expr::Unary(op, Box::new(operand)),
        })
    }

    fn power(&mut self) -> EngineResult<Expr> {
        let base = self.postfix()?;
        if self.eat(&Token::DoubleStar) {
            self.descend()?;
            let exponent = self.unary();
            self.depth -= 1;
            let exponent = exponent?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> EngineResult<Expr> {
        let mut expr = self.atom()?;
        let mut links = 0;
        loop {
            if matches!(self.peek(), Token::Dot | Token::LParen | Token::LBracket) {
                self.descend()?;
                links += 1;
            }
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    match self.advance() {
                        Token::Name(attr) => expr = Expr::Attr(Box::new(expr), attr),
                        _ => {
                            return Err(EngineError::syntax("expected attribute name after '.'")
                                .at_line(self.line()))
                        }
                    }
                }
                Token::LParen => {
                    self.advance();
                    let (args, kwargs) = self.call_args()?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                Token::LBracket => {
                    self.advance();
                    let key = self.subscript()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Subscript(Box::new(expr), Box::new(key));
                }
                _ => break,
            }
        }
        self.depth -= links;
        Ok(expr)
    }

    fn call_args(&mut self) -> EngineResult<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();

        while !self.at(&Token::RParen) {
            let keyword = match (self.peek(), self.peek_at(1)) {
                (Token::Name(name), Token::Assign) => Some(name.clone()),
                _ => None,
            };
            if let Some(name) = keyword {
                self.advance();
                self.advance();
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(EngineError::syntax(format!("keyword argument repeated: {}", name))
                        .at_line(self.line()));
                }
                kwargs.push((name, self.expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(EngineError::syntax("positional argument follows keyword argument")
                        .at_line(self.line()));
                }
                args.push(self.expr()?);
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen, "')'")?;
        Ok((args, kwargs))
    }

    /// Subscript contents: a single key, a slice, or a comma-separated tuple of either.
    fn subscript(&mut self) -> EngineResult<Expr> {
        let first = self.subscript_item()?;
        if !self.at(&Token::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.at(&Token::RBracket) {
                break;
            }
            items.push(self.subscript_item()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn subscript_item(&mut self) -> EngineResult<Expr> {
        let start = if self.at(&Token::Colon) {
            None
        } else {
            let expr = self.expr()?;
            if !self.at(&Token::Colon) {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect(Token::Colon, "':'")?;

        let stop = if matches!(self.peek(), Token::Colon | Token::Comma | Token::RBracket) {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        let step = if self.eat(&Token::Colon)
            && !matches!(self.peek(), Token::Comma | Token::RBracket)
        {
            Some(Box::new(self.expr()?))
        } else {
            None
        };
        Ok(Expr::Slice { start, stop, step })
    }

    fn atom(&mut self) -> EngineResult<Expr> {
        let line = self.line();
        match self.advance() {
            Token::Int(n) => Ok(Expr::Int(n)),
            Token::Float(f) => Ok(Expr::Float(f)),
            Token::Str(s) => {
                let mut text = s;
                while let Token::Str(next) = self.peek().clone() {
                    self.advance();
                    text.push_str(&next);
                }
                Ok(Expr::Str(text))
            }
            Token::Name(name) => match name.as_str() {
                "True" => Ok(Expr::Bool(true)),
                "False" => Ok(Expr::Bool(false)),
                "None" => Ok(Expr::None),
                "lambda" => Err(EngineError::syntax("lambda expressions are not supported").at_line(line)),
                n if RESERVED.contains(&n) => {
                    Err(EngineError::syntax(format!("invalid syntax near '{}'", n)).at_line(line))
                }
                _ => Ok(Expr::Name(name)),
            },
            Token::LParen => {
                if self.eat(&Token::RParen) {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.expr()?;
                if self.eat(&Token::RParen) {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat(&Token::Comma) {
                    if self.at(&Token::RParen) {
                        break;
                    }
                    items.push(self.expr()?);
                }
                self.expect(Token::RParen, "')'")?;
                Ok(Expr::Tuple(items))
            }
            Token::LBracket => self.list_display(),
            Token::LBrace => {
                let mut entries = Vec::new();
                while !self.at(&Token::RBrace) {
                    let key = self.expr()?;
                    self.expect(Token::Colon, "':' in dict literal")?;
                    let value = self.expr()?;
                    entries.push((key, value));
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RBrace, "'}'")?;
                Ok(Expr::Dict(entries))
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected())
            }
        }
    }

    fn list_display(&mut self) -> EngineResult<Expr> {
        if self.eat(&Token::RBracket) {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.expr()?;

        if self.eat_keyword("for") {
            let var = match self.advance() {
                Token::Name(n) if !RESERVED.contains(&n.as_str()) => n,
                _ => {
                    return Err(EngineError::syntax("expected a name after 'for'").at_line(self.line()))
                }
            };
            if !self.eat_keyword("in") {
                return Err(EngineError::syntax("expected 'in' in comprehension").at_line(self.line()));
            }
            let iter = self.or_expr()?;
            let cond = if self.eat_keyword("if") {
                Some(Box::new(self.or_expr()?))
            } else {
                None
            };
            self.expect(Token::RBracket, "']'")?;
            return Ok(Expr::ListComp {
                elt: Box::new(first),
                var,
                iter: Box::new(iter),
                cond,
            });
        }

        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.at(&Token::RBracket) {
                break;
            }
            items.push(self.expr()?);
        }
        self.expect(Token::RBracket, "']'")?;
        Ok(Expr::List(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::ExceptionKind;

    fn single(src: &str) -> StmtKind {
        let mut program = parse_program(src).unwrap();
        assert_eq!(program.len(), 1);
        program.remove(0).kind
    }

    #[test]
    fn test_filter_assignment() {
        let StmtKind::Assign { targets, value } = single("df = df[df['age'] > 30]") else {
            panic!("expected assignment");
        };
        assert_eq!(targets, vec![Target::Name("df".into())]);
        let Expr::Subscript(_, key) = value else {
            panic!("expected subscript");
        };
        assert!(matches!(*key, Expr::Compare(_, ref chain) if chain[0].0 == CmpOp::Gt));
    }

    #[test]
    fn test_precedence_of_masks() {
        // & binds tighter than comparison in Python, so parentheses matter.
        let expr = parse_expression("(a > 1) & (b < 2) | c").unwrap();
        let Expr::Binary(BinOp::BitOr, left, _) = expr else {
            panic!("expected | at the top");
        };
        assert!(matches!(*left, Expr::Binary(BinOp::BitAnd, _, _)));
    }

    #[test]
    fn test_deep_nesting_is_a_syntax_error() {
        let sources = [
            format!("df = df[{}1{}]", "(".repeat(10_000), ")".repeat(10_000)),
            format!("x = {}1", "~".repeat(10_000)),
            format!("x = {}y", "not ".repeat(10_000)),
            format!("x = 1{}", " + 1".repeat(10_000)),
            format!("x = 2{}", " ** 2".repeat(10_000)),
            format!("x = df{}", ".head()".repeat(10_000)),
        ];
        for source in &sources {
            let err = parse_program(source).unwrap_err();
            assert_eq!(err.kind, ExceptionKind::SyntaxError);
            assert!(err.message.contains("nested"), "{}", err.message);
        }
        let shallow = format!("x = {}1{}", "(".repeat(40), ")".repeat(40));
        assert!(parse_program(&shallow).is_ok());
    }

    #[test]
    fn test_power_binds_tighter_than_negation() {
        let expr = parse_expression("-x ** 2").unwrap();
        assert!(matches!(expr, Expr::Unary(UnaryOp::Neg, ref inner) if matches!(**inner, Expr::Binary(BinOp::Pow, _, _))));
    }

    #[test]
    fn test_keyword_arguments() {
        let expr = parse_expression("df.dropna(subset=['age'], how='any')").unwrap();
        let Expr::Call { args, kwargs, .. } = expr else {
            panic!("expected call");
        };
        assert!(args.is_empty());
        assert_eq!(kwargs[0].0, "subset");
        assert_eq!(kwargs[1].1, Expr::Str("any".into()));
    }

    #[test]
    fn test_loc_assignment_target() {
        let StmtKind::Assign { targets, .. } = single("df.loc[df['a'] > 1, 'b'] = 0") else {
            panic!("expected assignment");
        };
        let Target::Subscript(obj, key) = &targets[0] else {
            panic!("expected subscript target");
        };
        assert!(matches!(obj, Expr::Attr(_, attr) if attr == "loc"));
        assert!(matches!(key, Expr::Tuple(items) if items.len() == 2));
    }

    #[test]
    fn test_slices() {
        let expr = parse_expression("s.str[:3]").unwrap();
        let Expr::Subscript(_, key) = expr else {
            panic!("expected subscript");
        };
        assert!(matches!(*key, Expr::Slice { start: None, stop: Some(_), step: None }));
    }

    #[test]
    fn test_not_in_and_is_not() {
        let expr = parse_expression("a not in b").unwrap();
        assert!(matches!(expr, Expr::Compare(_, ref c) if c[0].0 == CmpOp::NotIn));
        let expr = parse_expression("a is not None").unwrap();
        assert!(matches!(expr, Expr::Compare(_, ref c) if c[0].0 == CmpOp::IsNot));
    }

    #[test]
    fn test_list_comprehension() {
        let expr = parse_expression("[c.strip() for c in df.columns if c]").unwrap();
        assert!(matches!(expr, Expr::ListComp { ref var, cond: Some(_), .. } if var == "c"));
    }

    #[test]
    fn test_multi_statement_program() {
        let program = parse_program("df = df.dropna()\n\ndf['x'] += 1\ndel df['y']\n").unwrap();
        assert_eq!(program.len(), 3);
        assert!(matches!(program[1].kind, StmtKind::AugAssign { op: BinOp::Add, .. }));
        assert!(matches!(program[2].kind, StmtKind::Del(_)));
        assert_eq!(program[2].line, 4);
    }

    #[test]
    fn test_unsupported_statements() {
        for src in [
            "for r in df:\n    x = 1",
            "while True:\n    pass",
            "import os",
            "def f(x):\n    return x",
            "df = df.apply(lambda r: r)",
            "if x:\n    y = 1",
        ] {
            let err = parse_program(src).unwrap_err();
            assert_eq!(err.kind, ExceptionKind::SyntaxError, "{}", src);
        }
    }

    #[test]
    fn test_invalid_targets() {
        assert!(parse_program("df.head() = 1").is_err());
        assert!(parse_program("1 = x").is_err());
        assert!(parse_program("df = df.head() df").is_err());
    }
}
