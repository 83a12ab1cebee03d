//! Template parsing
//!
//! Recursive descent over the lexer's token stream. Block tags recurse into
//! their bodies until a closing tag the caller accepts; anything else closing
//! the block is a [`SyntaxError::MismatchedBlock`].
//!
//! Recursion is bounded: every nested block tag, bracket lookup and range
//! counts against the nesting limit. `elsif`/`when` arms and `and`/`or`
//! chains are parsed in loops, so the AST (and the renderer walking it) never
//! grows deeper than that limit plus a logarithmic term.

use serde_json::Value;

use crate::ast::{AstNode, BinaryOp, Branch, Expression, FilterCall, ForLoop, PathSegment};
use crate::filters::FilterRegistry;
use crate::lexer::{tokenize, Keyword, Position, Token, TokenKind};
use crate::{RenderOptions, Result, SyntaxError, TemplateError};

/// Parse template source into AST nodes
///
/// Every filter name is checked against the registry here, so a template
/// naming an unknown filter never renders, whichever branch it sits in.
#[tracing::instrument(level = "debug", skip_all, fields(len = source.len()))]
pub fn parse_template(source: &str, options: &RenderOptions) -> Result<Vec<AstNode>> {
    let nodes = Parser::new(tokenize(source))
        .with_max_depth(options.max_nesting_depth)
        .parse()?;
    if let Some(call) = unknown_filter(&nodes, FilterRegistry::global()) {
        tracing::debug!(filter = %call.name, position = %call.position, "unknown filter");
        return Err(TemplateError::UnknownFilter {
            name: call.name.clone(),
            position: call.position,
        });
    }
    tracing::debug!(nodes = nodes.len(), "parsed template");
    Ok(nodes)
}

/// First filter call, in source order, that `filters` does not know
pub fn unknown_filter<'n>(nodes: &'n [AstNode], filters: &FilterRegistry) -> Option<&'n FilterCall> {
    let in_expression = |expression: &'n Expression| unknown_filter_in(expression, filters);
    nodes.iter().find_map(|node| match node {
        AstNode::TextLiteral(_) => None,
        AstNode::Output { expression, .. } | AstNode::Assign { expression, .. } => {
            in_expression(expression)
        }
        AstNode::ForLoop(for_loop) => in_expression(&for_loop.iterable)
            .or_else(|| for_loop.limit.as_ref().and_then(in_expression))
            .or_else(|| for_loop.offset.as_ref().and_then(in_expression))
            .or_else(|| unknown_filter(&for_loop.body, filters))
            .or_else(|| unknown_filter(&for_loop.else_body, filters)),
        AstNode::If {
            condition,
            then_branch,
            alternatives,
            else_branch,
            ..
        } => in_expression(condition)
            .or_else(|| unknown_filter(then_branch, filters))
            .or_else(|| {
                alternatives.iter().find_map(|branch| {
                    in_expression(&branch.condition)
                        .or_else(|| unknown_filter(&branch.body, filters))
                })
            })
            .or_else(|| unknown_filter(else_branch, filters)),
        AstNode::Capture { body, .. } => unknown_filter(body, filters),
    })
}

fn unknown_filter_in<'n>(expression: &'n Expression, filters: &FilterRegistry) -> Option<&'n FilterCall> {
    match expression {
        Expression::Literal(_) => None,
        Expression::VariableRef(path) => path.iter().find_map(|segment| match segment {
            PathSegment::Lookup(key) => unknown_filter_in(key, filters),
            PathSegment::Field(_) | PathSegment::Index(_) => None,
        }),
        Expression::FilterChain { base, filters: calls } => {
            unknown_filter_in(base, filters).or_else(|| {
                calls.iter().find_map(|call| {
                    if !filters.contains(&call.name) {
                        return Some(call);
                    }
                    call.args.iter().find_map(|arg| unknown_filter_in(arg, filters))
                })
            })
        }
        Expression::BinaryOp { left, right, .. } => {
            unknown_filter_in(left, filters).or_else(|| unknown_filter_in(right, filters))
        }
        Expression::Not(inner) => unknown_filter_in(inner, filters),
        Expression::Range { start, end, .. } => {
            unknown_filter_in(start, filters).or_else(|| unknown_filter_in(end, filters))
        }
    }
}

type ParseResult<T> = std::result::Result<T, SyntaxError>;

/// An open block tag and where it started
#[derive(Debug, Clone, Copy)]
struct OpenBlock {
    tag: Keyword,
    position: Position,
}

/// The tag that ended a block body, with the parser positioned just after its
/// keyword
#[derive(Debug, Clone, Copy)]
struct EndTag {
    keyword: Keyword,
    position: Position,
}

pub struct Parser<'a, I> {
    tokens: I,
    peeked: Option<Token<'a>>,
    last_position: Position,
    depth: usize,
    max_depth: usize,
}

impl<'a, I> Parser<'a, I>
where
    I: Iterator<Item = ParseResult<Token<'a>>>,
{
    pub fn new(tokens: I) -> Self {
        Self {
            tokens,
            peeked: None,
            last_position: Position::new(1, 1, 0),
            depth: 0,
            max_depth: RenderOptions::default().max_nesting_depth,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn parse(mut self) -> ParseResult<Vec<AstNode>> {
        let (nodes, _) = self.parse_nodes(None, &[])?;
        Ok(nodes)
    }

    // === Token plumbing ===

    fn peek_kind(&mut self) -> ParseResult<Option<TokenKind>> {
        if self.peeked.is_none() {
            self.peeked = self.tokens.next().transpose()?;
        }
        Ok(self.peeked.as_ref().map(|token| token.kind))
    }

    fn advance(&mut self) -> ParseResult<Option<Token<'a>>> {
        self.peek_kind()?;
        let token = self.peeked.take();
        if let Some(token) = &token {
            self.last_position = token.position;
        }
        Ok(token)
    }

    fn expect_any(&mut self, expected: &str) -> ParseResult<Token<'a>> {
        match self.advance()? {
            Some(token) => Ok(token),
            None => Err(SyntaxError::UnexpectedToken {
                found: "end of template".to_string(),
                expected: expected.to_string(),
                position: self.last_position,
            }),
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> ParseResult<Token<'a>> {
        let token = self.expect_any(expected)?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(unexpected(&token, expected))
        }
    }

    fn expect_close(&mut self) -> ParseResult<()> {
        self.expect(TokenKind::TagClose, "`%}`").map(|_| ())
    }

    fn eat(&mut self, kind: TokenKind) -> ParseResult<bool> {
        if self.peek_kind()? == Some(kind) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    // === Nodes ===

    /// Parse nodes until end of input (top level) or until a tag in `accepts`
    fn parse_nodes(
        &mut self,
        open: Option<OpenBlock>,
        accepts: &[Keyword],
    ) -> ParseResult<(Vec<AstNode>, Option<EndTag>)> {
        let mut nodes = Vec::new();

        while let Some(token) = self.advance()? {
            match token.kind {
                TokenKind::Literal => nodes.push(AstNode::TextLiteral(token.text.to_string())),
                TokenKind::OutputOpen => {
                    let expression = self.parse_expression()?;
                    self.expect(TokenKind::OutputClose, "`}}`")?;
                    nodes.push(AstNode::Output {
                        expression,
                        position: token.position,
                    });
                }
                TokenKind::TagOpen => {
                    let name = self.expect_any("tag name")?;
                    match name.kind {
                        TokenKind::Keyword(keyword) if is_block_delimiter(keyword) => {
                            if accepts.contains(&keyword) {
                                let end = EndTag {
                                    keyword,
                                    position: token.position,
                                };
                                return Ok((nodes, Some(end)));
                            }
                            return Err(SyntaxError::MismatchedBlock {
                                tag: keyword.as_str().to_string(),
                                expected: open
                                    .and_then(|block| block.tag.closing())
                                    .map(|closing| closing.as_str().to_string()),
                                position: token.position,
                            });
                        }
                        TokenKind::Keyword(keyword) => {
                            self.parse_tag(keyword, name.text, token.position, &mut nodes)?
                        }
                        TokenKind::Identifier => {
                            return Err(SyntaxError::UnknownTag {
                                name: name.text.to_string(),
                                position: token.position,
                            })
                        }
                        _ => return Err(unexpected(&name, "tag name")),
                    }
                }
                _ => return Err(unexpected(&token, "text or tag")),
            }
        }

        match open {
            Some(block) => Err(SyntaxError::UnclosedBlock {
                tag: block.tag.as_str().to_string(),
                position: block.position,
            }),
            None => Ok((nodes, None)),
        }
    }

    /// Body of an open block; always ends on one of `accepts`
    fn parse_body(
        &mut self,
        open: OpenBlock,
        accepts: &[Keyword],
    ) -> ParseResult<(Vec<AstNode>, EndTag)> {
        match self.parse_nodes(Some(open), accepts)? {
            (nodes, Some(end)) => Ok((nodes, end)),
            (_, None) => Err(SyntaxError::UnclosedBlock {
                tag: open.tag.as_str().to_string(),
                position: open.position,
            }),
        }
    }

    fn parse_tag(
        &mut self,
        keyword: Keyword,
        name: &str,
        position: Position,
        nodes: &mut Vec<AstNode>,
    ) -> ParseResult<()> {
        if keyword == Keyword::Assign {
            nodes.push(self.parse_assign(position)?);
            return Ok(());
        }
        if keyword.closing().is_none() {
            return Err(SyntaxError::UnknownTag {
                name: name.to_string(),
                position,
            });
        }

        let open = OpenBlock {
            tag: keyword,
            position,
        };
        self.nested(position, |parser| match keyword {
            Keyword::For => parser.parse_for(open).map(|node| nodes.push(node)),
            Keyword::If => parser.parse_if(open, false).map(|node| nodes.push(node)),
            Keyword::Unless => parser.parse_if(open, true).map(|node| nodes.push(node)),
            Keyword::Case => parser.parse_case(open).map(|parsed| nodes.extend(parsed)),
            Keyword::Capture => parser.parse_capture(open).map(|node| nodes.push(node)),
            Keyword::Comment => parser.parse_verbatim(open).map(|_| ()),
            _ => parser.parse_verbatim(open).map(|body| nodes.extend(body)),
        })
    }

    /// Run `parse` one nesting level deeper
    fn nested<T>(
        &mut self,
        position: Position,
        parse: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        if self.depth >= self.max_depth {
            return Err(SyntaxError::NestingTooDeep {
                limit: self.max_depth,
                position,
            });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_assign(&mut self, position: Position) -> ParseResult<AstNode> {
        let name = self.expect(TokenKind::Identifier, "variable name")?;
        self.expect(TokenKind::Assign, "`=`")?;
        let expression = self.parse_expression()?;
        self.expect_close()?;
        Ok(AstNode::Assign {
            name: name.text.to_string(),
            expression,
            position,
        })
    }

    fn parse_for(&mut self, open: OpenBlock) -> ParseResult<AstNode> {
        let variable = self.expect(TokenKind::Identifier, "loop variable")?;
        self.expect(TokenKind::Keyword(Keyword::In), "`in`")?;
        let mut for_loop = ForLoop {
            variable: variable.text.to_string(),
            iterable: self.parse_primary()?,
            body: Vec::new(),
            else_body: Vec::new(),
            reversed: false,
            limit: None,
            offset: None,
            position: open.position,
        };

        loop {
            let token = self.expect_any("`%}`")?;
            match (token.kind, token.text) {
                (TokenKind::TagClose, _) => break,
                (TokenKind::Identifier, "reversed") => for_loop.reversed = true,
                (TokenKind::Identifier, "limit") => {
                    self.expect(TokenKind::Colon, "`:`")?;
                    for_loop.limit = Some(self.parse_primary()?);
                }
                (TokenKind::Identifier, "offset") => {
                    self.expect(TokenKind::Colon, "`:`")?;
                    for_loop.offset = Some(self.parse_primary()?);
                }
                _ => return Err(unexpected(&token, "`%}`")),
            }
        }

        let (body, end) = self.parse_body(open, &[Keyword::Else, Keyword::EndFor])?;
        for_loop.body = body;
        if end.keyword == Keyword::Else {
            self.expect_close()?;
            let (else_body, _) = self.parse_body(open, &[Keyword::EndFor])?;
            for_loop.else_body = else_body;
        }
        self.expect_close()?;
        Ok(AstNode::ForLoop(for_loop))
    }

    fn parse_if(&mut self, open: OpenBlock, negate: bool) -> ParseResult<AstNode> {
        let condition = self.parse_expression()?;
        let condition = if negate {
            Expression::Not(Box::new(condition))
        } else {
            condition
        };
        let end = open.tag.closing().unwrap_or(Keyword::EndIf);
        let arms = [Keyword::Elsif, Keyword::Else, end];
        self.expect_close()?;
        let (then_branch, mut end_tag) = self.parse_body(open, &arms)?;

        let mut alternatives = Vec::new();
        while end_tag.keyword == Keyword::Elsif {
            let condition = self.parse_expression()?;
            self.expect_close()?;
            let (body, next) = self.parse_body(open, &arms)?;
            alternatives.push(Branch {
                condition,
                body,
                position: end_tag.position,
            });
            end_tag = next;
        }

        let else_branch = if end_tag.keyword == Keyword::Else {
            self.expect_close()?;
            let (else_branch, _) = self.parse_body(open, &[end])?;
            else_branch
        } else {
            Vec::new()
        };
        self.expect_close()?;

        Ok(AstNode::If {
            condition,
            then_branch,
            alternatives,
            else_branch,
            position: open.position,
        })
    }

    /// `case` lowers to one `If` whose arms compare the subject with `==`
    fn parse_case(&mut self, open: OpenBlock) -> ParseResult<Vec<AstNode>> {
        let subject = self.parse_expression()?;
        self.expect_close()?;

        let arms = [Keyword::When, Keyword::Else, Keyword::EndCase];
        // Anything before the first `when` is ignored.
        let (_, mut end) = self.parse_body(open, &arms)?;
        let mut branches = Vec::new();
        let mut fallback = Vec::new();

        loop {
            match end.keyword {
                Keyword::When => {
                    let condition = self.parse_when(&subject)?;
                    self.expect_close()?;
                    let (body, next) = self.parse_body(open, &arms)?;
                    branches.push(Branch {
                        condition,
                        body,
                        position: end.position,
                    });
                    end = next;
                }
                Keyword::Else => {
                    self.expect_close()?;
                    let (body, next) = self.parse_body(open, &[Keyword::EndCase])?;
                    fallback = body;
                    end = next;
                }
                _ => break,
            }
        }
        self.expect_close()?;

        let mut branches = branches.into_iter();
        let Some(first) = branches.next() else {
            return Ok(fallback);
        };
        Ok(vec![AstNode::If {
            condition: first.condition,
            then_branch: first.body,
            alternatives: branches.collect(),
            else_branch: fallback,
            position: first.position,
        }])
    }

    /// `when a, b or c` matches if the subject equals any value
    fn parse_when(&mut self, subject: &Expression) -> ParseResult<Expression> {
        let equals = |value| Expression::binary(BinaryOp::Eq, subject.clone(), value);
        let mut values = vec![equals(self.parse_primary()?)];
        while self.eat(TokenKind::Comma)? || self.eat(TokenKind::Keyword(Keyword::Or))? {
            values.push(equals(self.parse_primary()?));
        }
        self.logical(BinaryOp::Or, values)
    }

    fn parse_capture(&mut self, open: OpenBlock) -> ParseResult<AstNode> {
        let name = self.expect(TokenKind::Identifier, "variable name")?;
        self.expect_close()?;
        let (body, _) = self.parse_body(open, &[Keyword::EndCapture])?;
        self.expect_close()?;
        Ok(AstNode::Capture {
            name: name.text.to_string(),
            body,
            position: open.position,
        })
    }

    /// `raw` and `comment`; the lexer hands over their bodies as plain text
    fn parse_verbatim(&mut self, open: OpenBlock) -> ParseResult<Vec<AstNode>> {
        self.expect_close()?;
        let closing = open.tag.closing().unwrap_or(Keyword::EndRaw);
        let (body, _) = self.parse_body(open, &[closing])?;
        self.expect_close()?;
        Ok(body)
    }

    // === Expressions ===

    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        let mut operands = vec![self.parse_and()?];
        while self.eat(TokenKind::Keyword(Keyword::Or))? {
            operands.push(self.parse_and()?);
        }
        self.logical(BinaryOp::Or, operands)
    }

    fn parse_and(&mut self) -> ParseResult<Expression> {
        let mut operands = vec![self.parse_comparison()?];
        while self.eat(TokenKind::Keyword(Keyword::And))? {
            operands.push(self.parse_comparison()?);
        }
        self.logical(BinaryOp::And, operands)
    }

    fn logical(&self, op: BinaryOp, operands: Vec<Expression>) -> ParseResult<Expression> {
        Expression::balanced(op, operands).ok_or_else(|| SyntaxError::UnexpectedToken {
            found: "nothing".to_string(),
            expected: "expression".to_string(),
            position: self.last_position,
        })
    }

    fn parse_comparison(&mut self) -> ParseResult<Expression> {
        let left = self.parse_filtered()?;
        let op = match self.peek_kind()? {
            Some(TokenKind::Keyword(Keyword::Contains)) => {
                self.advance()?;
                BinaryOp::Contains
            }
            Some(TokenKind::Operator) => {
                let token = self.expect_any("operator")?;
                BinaryOp::from_operator(token.text)
                    .ok_or_else(|| unexpected(&token, "comparison operator"))?
            }
            _ => return Ok(left),
        };
        let right = self.parse_filtered()?;
        Ok(Expression::binary(op, left, right))
    }

    fn parse_filtered(&mut self) -> ParseResult<Expression> {
        let base = self.parse_primary()?;
        let mut filters = Vec::new();

        while self.eat(TokenKind::Pipe)? {
            let name = self.expect(TokenKind::Identifier, "filter name")?;
            let mut args = Vec::new();
            if self.eat(TokenKind::Colon)? {
                args.push(self.parse_primary()?);
                while self.eat(TokenKind::Comma)? {
                    args.push(self.parse_primary()?);
                }
            }
            filters.push(FilterCall {
                name: name.text.to_string(),
                args,
                position: name.position,
            });
        }

        if filters.is_empty() {
            Ok(base)
        } else {
            Ok(Expression::FilterChain {
                base: Box::new(base),
                filters,
            })
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        let token = self.expect_any("expression")?;
        match token.kind {
            TokenKind::String => Ok(Expression::Literal(Value::String(token.text.to_string()))),
            TokenKind::Number => number_literal(&token).map(Expression::Literal),
            TokenKind::Keyword(Keyword::True) => Ok(Expression::Literal(Value::Bool(true))),
            TokenKind::Keyword(Keyword::False) => Ok(Expression::Literal(Value::Bool(false))),
            TokenKind::Keyword(Keyword::Nil) => Ok(Expression::Literal(Value::Null)),
            TokenKind::LParen => self.nested(token.position, |parser| {
                let start = parser.parse_primary()?;
                parser.expect(TokenKind::DotDot, "`..`")?;
                let end = parser.parse_primary()?;
                parser.expect(TokenKind::RParen, "`)`")?;
                Ok(Expression::Range {
                    start: Box::new(start),
                    end: Box::new(end),
                    position: token.position,
                })
            }),
            TokenKind::Identifier => self.parse_path(token.text),
            _ => Err(unexpected(&token, "expression")),
        }
    }

    fn parse_path(&mut self, root: &str) -> ParseResult<Expression> {
        let mut segments = vec![PathSegment::Field(root.to_string())];
        loop {
            if self.eat(TokenKind::Dot)? {
                let token = self.expect_any("field name")?;
                let segment = match token.kind {
                    TokenKind::Identifier | TokenKind::Keyword(_) => {
                        PathSegment::Field(token.text.to_string())
                    }
                    TokenKind::Number => match token.text.parse::<i64>() {
                        Ok(index) => PathSegment::Index(index),
                        Err(_) => return Err(unexpected(&token, "field name")),
                    },
                    _ => return Err(unexpected(&token, "field name")),
                };
                segments.push(segment);
            } else if self.peek_kind()? == Some(TokenKind::LBracket) {
                let bracket = self.expect_any("`[`")?;
                let key = self.nested(bracket.position, |parser| {
                    let key = parser.parse_expression()?;
                    parser.expect(TokenKind::RBracket, "`]`")?;
                    Ok(key)
                })?;
                segments.push(match key {
                    Expression::Literal(Value::String(name)) => PathSegment::Field(name),
                    Expression::Literal(Value::Number(n)) if n.is_i64() => {
                        PathSegment::Index(n.as_i64().unwrap_or_default())
                    }
                    other => PathSegment::Lookup(Box::new(other)),
                });
            } else {
                return Ok(Expression::VariableRef(segments));
            }
        }
    }
}

fn is_block_delimiter(keyword: Keyword) -> bool {
    matches!(
        keyword,
        Keyword::EndFor
            | Keyword::Elsif
            | Keyword::Else
            | Keyword::EndIf
            | Keyword::EndUnless
            | Keyword::When
            | Keyword::EndCase
            | Keyword::EndCapture
            | Keyword::EndComment
            | Keyword::EndRaw
    )
}

fn unexpected(token: &Token<'_>, expected: &str) -> SyntaxError {
    let found = match token.kind {
        TokenKind::Literal => "text".to_string(),
        TokenKind::String => format!("string \"{}\"", token.text),
        _ => format!("`{}`", token.text),
    };
    SyntaxError::UnexpectedToken {
        found,
        expected: expected.to_string(),
        position: token.position,
    }
}

fn number_literal(token: &Token<'_>) -> ParseResult<Value> {
    if let Ok(n) = token.text.parse::<i64>() {
        return Ok(Value::from(n));
    }
    token
        .text
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| unexpected(token, "number"))
}
