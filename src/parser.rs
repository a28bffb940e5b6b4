// File: src/parser.rs
//
// Pratt parser, grounded in the original implementation's `parser/parser.go`
// (same prefix/infix function-table design, same precedence ladder) but
// completed with the registrations that early snapshot never filled in, plus
// the node types `ast.rs` needs (arrays, hashes, indexing, function
// literals).

use crate::ast::{BlockStatement, Expr, Program, Stmt};
use crate::lexer::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
}

fn precedence_of(kind: &TokenKind) -> Precedence {
    match kind {
        TokenKind::Eq | TokenKind::NotEq => Precedence::Equals,
        TokenKind::Lt | TokenKind::Gt => Precedence::LessGreater,
        TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
        TokenKind::Slash | TokenKind::Asterisk => Precedence::Product,
        TokenKind::LParen => Precedence::Call,
        TokenKind::LBracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    pub errors: Vec<ParseError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0, errors: Vec::new() }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or_else(|| self.tokens.last().unwrap())
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos + 1).unwrap_or_else(|| self.tokens.last().unwrap())
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn current_is(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn peek_is(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn expect_peek(&mut self, kind: &TokenKind) -> bool {
        if self.peek_is(kind) {
            self.advance();
            true
        } else {
            let tok = self.peek().clone();
            self.errors.push(ParseError {
                message: format!("expected next token to be {:?}, got {:?} instead", kind, tok.kind),
                line: tok.line,
                column: tok.column,
            });
            false
        }
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let tok = self.current();
        self.errors.push(ParseError { message: message.into(), line: tok.line, column: tok.column });
    }

    pub fn parse_program(&mut self) -> Program {
        let mut program = Program::default();
        while !self.current_is(&TokenKind::Eof) {
            if let Some(stmt) = self.parse_statement() {
                program.statements.push(stmt);
            }
            self.advance();
        }
        program
    }

    fn parse_statement(&mut self) -> Option<Stmt> {
        match &self.current().kind {
            TokenKind::Let => self.parse_let_statement(),
            TokenKind::Return => self.parse_return_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_let_statement(&mut self) -> Option<Stmt> {
        let name = if let TokenKind::Identifier(_) = self.peek().kind {
            self.advance();
            match &self.current().kind {
                TokenKind::Identifier(name) => name.clone(),
                _ => unreachable!(),
            }
        } else {
            self.error_here("expected identifier after `let`");
            return None;
        };

        if !self.expect_peek(&TokenKind::Assign) {
            return None;
        }
        self.advance();

        let mut value = self.parse_expression(Precedence::Lowest)?;
        if let Expr::FunctionLiteral { name: fn_name, .. } = &mut value {
            *fn_name = Some(name.clone());
        }

        if self.peek_is(&TokenKind::Semicolon) {
            self.advance();
        }

        Some(Stmt::Let { name, value })
    }

    fn parse_return_statement(&mut self) -> Option<Stmt> {
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        if self.peek_is(&TokenKind::Semicolon) {
            self.advance();
        }
        Some(Stmt::Return(value))
    }

    fn parse_expression_statement(&mut self) -> Option<Stmt> {
        let expr = self.parse_expression(Precedence::Lowest)?;
        if self.peek_is(&TokenKind::Semicolon) {
            self.advance();
        }
        Some(Stmt::Expression(expr))
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Option<Expr> {
        let mut left = self.parse_prefix()?;

        while !self.peek_is(&TokenKind::Semicolon) && precedence < precedence_of(&self.peek().kind) {
            match &self.peek().kind {
                TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Slash
                | TokenKind::Asterisk
                | TokenKind::Eq
                | TokenKind::NotEq
                | TokenKind::Lt
                | TokenKind::Gt => {
                    self.advance();
                    left = self.parse_infix(left)?;
                }
                TokenKind::LParen => {
                    self.advance();
                    left = self.parse_call_expression(left)?;
                }
                TokenKind::LBracket => {
                    self.advance();
                    left = self.parse_index_expression(left)?;
                }
                _ => break,
            }
        }

        Some(left)
    }

    fn parse_prefix(&mut self) -> Option<Expr> {
        match self.current().kind.clone() {
            TokenKind::Identifier(name) => Some(Expr::Identifier(name)),
            TokenKind::Integer(n) => Some(Expr::IntegerLiteral(n)),
            TokenKind::StringLiteral(s) => Some(Expr::StringLiteral(s)),
            TokenKind::True => Some(Expr::Boolean(true)),
            TokenKind::False => Some(Expr::Boolean(false)),
            TokenKind::Bang | TokenKind::Minus => self.parse_prefix_expression(),
            TokenKind::LParen => self.parse_grouped_expression(),
            TokenKind::If => self.parse_if_expression(),
            TokenKind::Function => self.parse_function_literal(),
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_hash_literal(),
            other => {
                self.error_here(format!("no prefix parse function for {:?}", other));
                None
            }
        }
    }

    fn parse_prefix_expression(&mut self) -> Option<Expr> {
        let operator = match &self.current().kind {
            TokenKind::Bang => "!",
            TokenKind::Minus => "-",
            _ => unreachable!(),
        }
        .to_string();
        self.advance();
        let right = self.parse_expression(Precedence::Prefix)?;
        Some(Expr::Prefix { operator, right: Box::new(right) })
    }

    fn parse_infix(&mut self, left: Expr) -> Option<Expr> {
        let operator = match &self.current().kind {
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Slash => "/",
            TokenKind::Asterisk => "*",
            TokenKind::Eq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            _ => unreachable!(),
        }
        .to_string();
        let precedence = precedence_of(&self.current().kind);
        self.advance();
        let right = self.parse_expression(precedence)?;
        Some(Expr::Infix { left: Box::new(left), operator, right: Box::new(right) })
    }

    fn parse_grouped_expression(&mut self) -> Option<Expr> {
        self.advance();
        let expr = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(&TokenKind::RParen) {
            return None;
        }
        Some(expr)
    }

    fn parse_if_expression(&mut self) -> Option<Expr> {
        if !self.expect_peek(&TokenKind::LParen) {
            return None;
        }
        self.advance();
        let condition = self.parse_expression(Precedence::Lowest)?;

        if !self.expect_peek(&TokenKind::RParen) {
            return None;
        }
        if !self.expect_peek(&TokenKind::LBrace) {
            return None;
        }
        let consequence = self.parse_block_statement();

        let alternative = if self.peek_is(&TokenKind::Else) {
            self.advance();
            if !self.expect_peek(&TokenKind::LBrace) {
                return None;
            }
            Some(self.parse_block_statement())
        } else {
            None
        };

        Some(Expr::If { condition: Box::new(condition), consequence, alternative })
    }

    fn parse_block_statement(&mut self) -> BlockStatement {
        let mut block = BlockStatement::default();
        self.advance();
        while !self.current_is(&TokenKind::RBrace) && !self.current_is(&TokenKind::Eof) {
            if let Some(stmt) = self.parse_statement() {
                block.statements.push(stmt);
            }
            self.advance();
        }
        block
    }

    fn parse_function_literal(&mut self) -> Option<Expr> {
        if !self.expect_peek(&TokenKind::LParen) {
            return None;
        }
        let parameters = self.parse_function_parameters()?;
        if !self.expect_peek(&TokenKind::LBrace) {
            return None;
        }
        let body = self.parse_block_statement();
        Some(Expr::FunctionLiteral { parameters, body, name: None })
    }

    fn parse_function_parameters(&mut self) -> Option<Vec<String>> {
        let mut params = Vec::new();
        if self.peek_is(&TokenKind::RParen) {
            self.advance();
            return Some(params);
        }

        self.advance();
        match &self.current().kind {
            TokenKind::Identifier(name) => params.push(name.clone()),
            _ => {
                self.error_here("expected parameter name");
                return None;
            }
        }

        while self.peek_is(&TokenKind::Comma) {
            self.advance();
            self.advance();
            match &self.current().kind {
                TokenKind::Identifier(name) => params.push(name.clone()),
                _ => {
                    self.error_here("expected parameter name");
                    return None;
                }
            }
        }

        if !self.expect_peek(&TokenKind::RParen) {
            return None;
        }
        Some(params)
    }

    fn parse_call_expression(&mut self, function: Expr) -> Option<Expr> {
        let arguments = self.parse_expression_list(&TokenKind::RParen)?;
        Some(Expr::Call { function: Box::new(function), arguments })
    }

    fn parse_array_literal(&mut self) -> Option<Expr> {
        let elements = self.parse_expression_list(&TokenKind::RBracket)?;
        Some(Expr::ArrayLiteral(elements))
    }

    fn parse_expression_list(&mut self, end: &TokenKind) -> Option<Vec<Expr>> {
        let mut list = Vec::new();
        if self.peek_is(end) {
            self.advance();
            return Some(list);
        }

        self.advance();
        list.push(self.parse_expression(Precedence::Lowest)?);

        while self.peek_is(&TokenKind::Comma) {
            self.advance();
            self.advance();
            list.push(self.parse_expression(Precedence::Lowest)?);
        }

        if !self.expect_peek(end) {
            return None;
        }
        Some(list)
    }

    fn parse_index_expression(&mut self, left: Expr) -> Option<Expr> {
        self.advance();
        let index = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(&TokenKind::RBracket) {
            return None;
        }
        Some(Expr::Index { left: Box::new(left), index: Box::new(index) })
    }

    fn parse_hash_literal(&mut self) -> Option<Expr> {
        let mut pairs = Vec::new();

        while !self.peek_is(&TokenKind::RBrace) {
            self.advance();
            let key = self.parse_expression(Precedence::Lowest)?;

            if !self.expect_peek(&TokenKind::Colon) {
                return None;
            }
            self.advance();
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));

            if !self.peek_is(&TokenKind::RBrace) && !self.expect_peek(&TokenKind::Comma) {
                return None;
            }
        }

        if !self.expect_peek(&TokenKind::RBrace) {
            return None;
        }
        Some(Expr::HashLiteral(pairs))
    }
}

pub fn parse(source: &str) -> Result<Program, Vec<ParseError>> {
    let tokens = crate::lexer::tokenize(source);
    let mut parser = Parser::new(tokens);
    let program = parser.parse_program();
    if parser.errors.is_empty() {
        Ok(program)
    } else {
        Err(parser.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        match parse(source) {
            Ok(program) => program,
            Err(errors) => panic!("unexpected parse errors: {:?}", errors),
        }
    }

    #[test]
    fn parses_let_statements() {
        let program = parse_ok("let x = 5; let y = true; let foobar = y;");
        assert_eq!(program.statements.len(), 3);
        assert_eq!(program.statements[0], Stmt::Let { name: "x".into(), value: Expr::IntegerLiteral(5) });
    }

    #[test]
    fn parses_operator_precedence() {
        let program = parse_ok("1 + 2 * 3");
        assert_eq!(program.to_string(), "(1 + (2 * 3))");
    }

    #[test]
    fn parses_if_else_expression() {
        let program = parse_ok("if (x < y) { x } else { y }");
        match &program.statements[0] {
            Stmt::Expression(Expr::If { alternative, .. }) => assert!(alternative.is_some()),
            other => panic!("expected if expression, got {:?}", other),
        }
    }

    #[test]
    fn parses_function_literal_with_parameters() {
        let program = parse_ok("fn(x, y) { x + y; }");
        match &program.statements[0] {
            Stmt::Expression(Expr::FunctionLiteral { parameters, .. }) => {
                assert_eq!(parameters, &vec!["x".to_string(), "y".to_string()]);
            }
            other => panic!("expected function literal, got {:?}", other),
        }
    }

    #[test]
    fn binds_let_function_literal_name_for_recursion_diagnostics() {
        let program = parse_ok("let counter = fn(x) { counter(x - 1); };");
        match &program.statements[0] {
            Stmt::Let { value: Expr::FunctionLiteral { name, .. }, .. } => {
                assert_eq!(name.as_deref(), Some("counter"));
            }
            other => panic!("expected named function literal, got {:?}", other),
        }
    }

    #[test]
    fn parses_call_expression_arguments() {
        let program = parse_ok("add(1, 2 * 3, 4 + 5);");
        match &program.statements[0] {
            Stmt::Expression(Expr::Call { arguments, .. }) => assert_eq!(arguments.len(), 3),
            other => panic!("expected call expression, got {:?}", other),
        }
    }

    #[test]
    fn parses_array_and_index_expressions() {
        let program = parse_ok("[1, 2 * 2, 3][1 + 1]");
        match &program.statements[0] {
            Stmt::Expression(Expr::Index { left, .. }) => match left.as_ref() {
                Expr::ArrayLiteral(elements) => assert_eq!(elements.len(), 3),
                other => panic!("expected array literal, got {:?}", other),
            },
            other => panic!("expected index expression, got {:?}", other),
        }
    }

    #[test]
    fn parses_hash_literal_with_expression_keys() {
        let program = parse_ok(r#"{"one": 1, "two": 2}"#);
        match &program.statements[0] {
            Stmt::Expression(Expr::HashLiteral(pairs)) => assert_eq!(pairs.len(), 2),
            other => panic!("expected hash literal, got {:?}", other),
        }
    }

    #[test]
    fn collects_multiple_parse_errors_without_aborting() {
        let errors = parse("let = 5; let y 10;").unwrap_err();
        assert!(errors.len() >= 2);
    }
}
