// File: src/lexer.rs
//
// Hand-rolled char-by-char tokenizer, grounded in `ruff`'s `lexer.rs`
// (same `peekable()` scanning style, same line/column bookkeeping) but with
// the full token set this language's expression grammar needs.

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Integer(i64),
    StringLiteral(String),

    Assign,
    Plus,
    Minus,
    Bang,
    Asterisk,
    Slash,
    Lt,
    Gt,
    Eq,
    NotEq,

    Comma,
    Semicolon,
    Colon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Function,
    Let,
    True,
    False,
    If,
    Else,
    Return,

    Illegal(char),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer { chars: source.chars().peekable(), line: 1, column: 1 }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        match c {
            Some('\n') => {
                self.line += 1;
                self.column = 1;
            }
            Some(_) => self.column += 1,
            None => {}
        }
        c
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn read_identifier(&mut self, first: char) -> String {
        let mut ident = String::new();
        ident.push(first);
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        ident
    }

    fn read_integer(&mut self, first: char) -> i64 {
        let mut digits = String::new();
        digits.push(first);
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.bump();
            } else {
                break;
            }
        }
        digits.parse().unwrap_or(0)
    }

    fn read_string(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.bump() {
            if c == '"' {
                break;
            }
            if c == '\\' {
                if let Some(escaped) = self.bump() {
                    match escaped {
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        '"' => s.push('"'),
                        '\\' => s.push('\\'),
                        other => s.push(other),
                    }
                }
            } else {
                s.push(c);
            }
        }
        s
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();
        let line = self.line;
        let column = self.column;

        let kind = match self.bump() {
            Some('=') => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Eq
                } else {
                    TokenKind::Assign
                }
            }
            Some('+') => TokenKind::Plus,
            Some('-') => TokenKind::Minus,
            Some('!') => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            Some('*') => TokenKind::Asterisk,
            Some('/') => TokenKind::Slash,
            Some('<') => TokenKind::Lt,
            Some('>') => TokenKind::Gt,
            Some(',') => TokenKind::Comma,
            Some(';') => TokenKind::Semicolon,
            Some(':') => TokenKind::Colon,
            Some('(') => TokenKind::LParen,
            Some(')') => TokenKind::RParen,
            Some('{') => TokenKind::LBrace,
            Some('}') => TokenKind::RBrace,
            Some('[') => TokenKind::LBracket,
            Some(']') => TokenKind::RBracket,
            Some('"') => TokenKind::StringLiteral(self.read_string()),
            Some(c) if c.is_ascii_digit() => TokenKind::Integer(self.read_integer(c)),
            Some(c) if c.is_alphabetic() || c == '_' => {
                let ident = self.read_identifier(c);
                match ident.as_str() {
                    "fn" => TokenKind::Function,
                    "let" => TokenKind::Let,
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    "if" => TokenKind::If,
                    "else" => TokenKind::Else,
                    "return" => TokenKind::Return,
                    _ => TokenKind::Identifier(ident),
                }
            }
            Some(c) => TokenKind::Illegal(c),
            None => TokenKind::Eof,
        };

        Token { kind, line, column }
    }
}

pub fn tokenize(source: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let is_eof = token.kind == TokenKind::Eof;
        tokens.push(token);
        if is_eof {
            break;
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_basic_source() {
        let source = "let five = 5;\nlet add = fn(x, y) { x + y; };\nadd(five, 10);";
        let tokens: Vec<TokenKind> = tokenize(source).into_iter().map(|t| t.kind).collect();
        assert_eq!(
            tokens,
            vec![
                TokenKind::Let,
                TokenKind::Identifier("five".into()),
                TokenKind::Assign,
                TokenKind::Integer(5),
                TokenKind::Semicolon,
                TokenKind::Let,
                TokenKind::Identifier("add".into()),
                TokenKind::Assign,
                TokenKind::Function,
                TokenKind::LParen,
                TokenKind::Identifier("x".into()),
                TokenKind::Comma,
                TokenKind::Identifier("y".into()),
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Identifier("x".into()),
                TokenKind::Plus,
                TokenKind::Identifier("y".into()),
                TokenKind::Semicolon,
                TokenKind::RBrace,
                TokenKind::Semicolon,
                TokenKind::Identifier("add".into()),
                TokenKind::LParen,
                TokenKind::Identifier("five".into()),
                TokenKind::Comma,
                TokenKind::Integer(10),
                TokenKind::RParen,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_two_char_operators_and_strings() {
        let tokens: Vec<TokenKind> =
            tokenize("10 == 10; 10 != 9; \"foo\\nbar\"").into_iter().map(|t| t.kind).collect();
        assert_eq!(
            tokens,
            vec![
                TokenKind::Integer(10),
                TokenKind::Eq,
                TokenKind::Integer(10),
                TokenKind::Semicolon,
                TokenKind::Integer(10),
                TokenKind::NotEq,
                TokenKind::Integer(9),
                TokenKind::Semicolon,
                TokenKind::StringLiteral("foo\nbar".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tracks_line_and_column() {
        let tokens = tokenize("let a = 1;\nlet b = 2;");
        let second_let = tokens.iter().filter(|t| t.kind == TokenKind::Let).nth(1).unwrap();
        assert_eq!(second_let.line, 2);
    }

    #[test]
    fn reports_illegal_characters() {
        let tokens: Vec<TokenKind> = tokenize("@").into_iter().map(|t| t.kind).collect();
        assert_eq!(tokens, vec![TokenKind::Illegal('@'), TokenKind::Eof]);
    }
}
