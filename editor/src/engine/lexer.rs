// Snippet tokenizer - converts snippet text into a flat token stream.
// Supports: int/float literals, quoted and raw strings, names, Python operators,
// comments, implicit line joining inside brackets and backslash continuation.

use super::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    Newline,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Assign,
    /// `+=`, `-=`, `*=`, `/=`
    AugAssign(char),
    Amp,
    Pipe,
    Tilde,
    Dot,
    Comma,
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Eof,
}

/// A token with the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

pub fn tokenize(source: &str) -> EngineResult<Vec<Spanned>> {
    let mut tokens: Vec<Spanned> = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1usize;
    let mut depth = 0usize;

    macro_rules! push {
        ($tok:expr) => {
            tokens.push(Spanned { token: $tok, line })
        };
    }

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' => {
                chars.next();
            }
            '\n' => {
                chars.next();
                if depth == 0 && tokens.last().is_some_and(|t| t.token != Token::Newline) {
                    push!(Token::Newline);
                }
                line += 1;
            }
            '#' => {
                while chars.peek().is_some_and(|&ch| ch != '\n') {
                    chars.next();
                }
            }
            '\\' => {
                chars.next();
                match chars.next() {
                    Some('\n') => line += 1,
                    Some('\r') if chars.peek() == Some(&'\n') => {
                        chars.next();
                        line += 1;
                    }
                    _ => {
                        return Err(EngineError::syntax("unexpected character after line continuation")
                            .at_line(line))
                    }
                }
            }
            '0'..='9' => {
                let tok = lex_number(&mut chars, line)?;
                push!(tok);
            }
            '.' => {
                chars.next();
                let follows_value = matches!(
                    tokens.last().map(|t| &t.token),
                    Some(Token::Name(_) | Token::RParen | Token::RBracket | Token::Str(_))
                );
                if !follows_value && chars.peek().is_some_and(|ch| ch.is_ascii_digit()) {
                    let mut text = String::from("0.");
                    while let Some(&d) = chars.peek() {
                        if d.is_ascii_digit() || d == '_' {
                            if d != '_' {
                                text.push(d);
                            }
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let value = text
                        .parse::<f64>()
                        .map_err(|_| EngineError::syntax("invalid number").at_line(line))?;
                    push!(Token::Float(value));
                } else {
                    push!(Token::Dot);
                }
            }
            '\'' | '"' => {
                let s = lex_string(&mut chars, false, &mut line)?;
                push!(Token::Str(s));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let is_raw = matches!(name.as_str(), "r" | "R");
                if is_raw && matches!(chars.peek(), Some('\'') | Some('"')) {
                    let s = lex_string(&mut chars, true, &mut line)?;
                    push!(Token::Str(s));
                } else {
                    push!(Token::Name(name));
                }
            }
            '(' | '[' | '{' => {
                chars.next();
                depth += 1;
                push!(match c {
                    '(' => Token::LParen,
                    '[' => Token::LBracket,
                    _ => Token::LBrace,
                });
            }
            ')' | ']' | '}' => {
                chars.next();
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| EngineError::syntax(format!("unmatched '{}'", c)).at_line(line))?;
                push!(match c {
                    ')' => Token::RParen,
                    ']' => Token::RBracket,
                    _ => Token::RBrace,
                });
            }
            '+' | '-' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    push!(Token::AugAssign(c));
                } else {
                    push!(if c == '+' { Token::Plus } else { Token::Minus });
                }
            }
            '%' => { chars.next(); push!(Token::Percent); }
            '&' => { chars.next(); push!(Token::Amp); }
            '|' => { chars.next(); push!(Token::Pipe); }
            '~' => { chars.next(); push!(Token::Tilde); }
            ',' => { chars.next(); push!(Token::Comma); }
            ':' => { chars.next(); push!(Token::Colon); }
            '*' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    chars.next();
                    push!(Token::DoubleStar);
                } else if chars.peek() == Some(&'=') {
                    chars.next();
                    push!(Token::AugAssign('*'));
                } else {
                    push!(Token::Star);
                }
            }
            '/' => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    push!(Token::DoubleSlash);
                } else if chars.peek() == Some(&'=') {
                    chars.next();
                    push!(Token::AugAssign('/'));
                } else {
                    push!(Token::Slash);
                }
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    push!(Token::EqEq);
                } else {
                    push!(Token::Assign);
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    push!(Token::NotEq);
                } else {
                    return Err(EngineError::syntax("invalid syntax '!'").at_line(line));
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    push!(Token::LtEq);
                } else {
                    push!(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    push!(Token::GtEq);
                } else {
                    push!(Token::Gt);
                }
            }
            other => {
                return Err(
                    EngineError::syntax(format!("invalid character '{}'", other)).at_line(line)
                );
            }
        }
    }

    if depth > 0 {
        return Err(EngineError::syntax("unexpected EOF: unclosed bracket").at_line(line));
    }
    if tokens.last().is_some_and(|t| t.token != Token::Newline) {
        push!(Token::Newline);
    }
    push!(Token::Eof);
    Ok(tokens)
}

fn lex_number(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    line: usize,
) -> EngineResult<Token> {
    let mut text = String::new();
    let mut is_float = false;

    while let Some(&ch) = chars.peek() {
        match ch {
            '0'..='9' => text.push(ch),
            '_' => {}
            '.' if !is_float => {
                is_float = true;
                text.push(ch);
            }
            'e' | 'E' => {
                is_float = true;
                text.push(ch);
                chars.next();
                if let Some(&sign) = chars.peek() {
                    if sign == '+' || sign == '-' {
                        text.push(sign);
                        chars.next();
                    }
                }
                continue;
            }
            _ => break,
        }
        chars.next();
    }

    if is_float {
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| EngineError::syntax(format!("invalid number '{}'", text)).at_line(line))
    } else {
        text.parse::<i64>()
            .map(Token::Int)
            .map_err(|_| EngineError::syntax(format!("integer too large '{}'", text)).at_line(line))
    }
}

fn lex_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    raw: bool,
    line: &mut usize,
) -> EngineResult<String> {
    let start_line = *line;
    let quote = chars.next().unwrap_or('\'');
    let mut s = String::new();

    loop {
        match chars.next() {
            Some(ch) if ch == quote => return Ok(s),
            Some('\n') | None => {
                return Err(EngineError::syntax("unterminated string literal").at_line(start_line))
            }
            Some('\\') if raw => {
                s.push('\\');
                if let Some(next) = chars.next() {
                    s.push(next);
                }
            }
            Some('\\') => match chars.next() {
                Some('n') => s.push('\n'),
                Some('t') => s.push('\t'),
                Some('r') => s.push('\r'),
                Some('0') => s.push('\0'),
                Some('\\') => s.push('\\'),
                Some('\'') => s.push('\''),
                Some('"') => s.push('"'),
                Some('\n') => *line += 1,
                Some(other) => {
                    s.push('\\');
                    s.push(other);
                }
                None => {
                    return Err(
                        EngineError::syntax("unterminated string literal").at_line(start_line)
                    )
                }
            },
            Some(ch) => s.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_assignment_tokens() {
        assert_eq!(
            kinds("df = df[df['Age'] >= 30.5]"),
            vec![
                Token::Name("df".into()),
                Token::Assign,
                Token::Name("df".into()),
                Token::LBracket,
                Token::Name("df".into()),
                Token::LBracket,
                Token::Str("Age".into()),
                Token::RBracket,
                Token::GtEq,
                Token::Float(30.5),
                Token::RBracket,
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_newlines_inside_brackets_are_joined() {
        let toks = kinds("df = df.rename(\n    columns={'a': 'b'},\n)\n\n# done\n");
        assert_eq!(toks.iter().filter(|t| **t == Token::Newline).count(), 1);
    }

    #[test]
    fn test_raw_string_keeps_backslashes() {
        assert_eq!(kinds(r"r'\s+'")[0], Token::Str(r"\s+".into()));
        assert_eq!(kinds(r"'a\tb'")[0], Token::Str("a\tb".into()));
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a // b ** 2 != ~c"),
            vec![
                Token::Name("a".into()),
                Token::DoubleSlash,
                Token::Name("b".into()),
                Token::DoubleStar,
                Token::Int(2),
                Token::NotEq,
                Token::Tilde,
                Token::Name("c".into()),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_augmented_assignment() {
        assert_eq!(kinds("x -= 1")[1], Token::AugAssign('-'));
        assert_eq!(kinds("x *= 2")[1], Token::AugAssign('*'));
        assert_eq!(kinds("x - 1")[1], Token::Minus);
    }

    #[test]
    fn test_line_numbers() {
        let toks = tokenize("a = 1\nb = 2").unwrap();
        let b = toks.iter().find(|t| t.token == Token::Name("b".into())).unwrap();
        assert_eq!(b.line, 2);
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            tokenize("df = 'open").unwrap_err().kind,
            super::super::error::ExceptionKind::SyntaxError
        );
        assert!(tokenize("df = (1").is_err());
        assert!(tokenize("df = 1)").is_err());
        assert!(tokenize("df = $").is_err());
    }
}
