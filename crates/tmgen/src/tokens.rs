//! token re-serializer
//!
//! Turns an [Expr] (evaluated, partially evaluated or untouched) back into HCL surface syntax.
//! The produced token stream parses back into an equivalent expression tree.
//!
//! Conventions:
//! - strings containing a newline are written as heredocs, everything else is quoted; `<<-EOT`
//!   with re-indented content unless every content line starts with whitespace
//! - object items go one per line, list items and call arguments are comma separated inline
//! - binary operators, `?`, `:`, `=` and `=>` are surrounded by single spaces
//!
//! Rendering ([Tokens] `Display`) applies indentation per line, following the rules of
//! `hclwrite`: a line that opens brackets indents the following lines by one level.
use crate::ast::{Expr, ForExpr, ObjectKey, Traversal, Traverser};
use crate::value::Value;

pub const HEREDOC_MARKER: &str = "EOT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    OQuote,
    CQuote,
    QuotedLit,
    TemplateInterp,
    TemplateSeqEnd,
    OHeredoc,
    HeredocLit,
    CHeredoc,
    OBrace,
    CBrace,
    OBrack,
    CBrack,
    OParen,
    CParen,
    Comma,
    Colon,
    Question,
    Dot,
    Equal,
    FatArrow,
    Operator,
    Star,
    Ellipsis,
    Newline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub bytes: String,
    pub spaces_before: usize,
}

impl Token {
    fn bracket_change(&self) -> i32 {
        match self.kind {
            TokenKind::OBrace | TokenKind::OBrack | TokenKind::OParen => 1,
            TokenKind::CBrace | TokenKind::CBrack | TokenKind::CParen => -1,
            _ => 0,
        }
    }
}

/// Sequence of tokens
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tokens {
    tokens: Vec<Token>,
    space_next: bool,
}

impl Tokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: TokenKind, bytes: impl Into<String>) {
        let spaces_before = usize::from(std::mem::take(&mut self.space_next));
        self.tokens.push(Token {
            kind,
            bytes: bytes.into(),
            spaces_before,
        });
    }

    /// The next pushed token is preceded by a space
    pub fn space(&mut self) {
        self.space_next = true;
    }

    pub fn newline(&mut self) {
        self.space_next = false;
        self.push(TokenKind::Newline, "\n");
    }

    /// Ends the current line, unless it is already ended
    pub fn end_line(&mut self) {
        if !self.ends_with_newline() {
            self.newline();
        }
    }

    pub fn ends_with_newline(&self) -> bool {
        self.tokens
            .last()
            .is_some_and(|token| token.kind == TokenKind::Newline)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter()
    }

    pub fn write_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(value) => self.write_value(value),
            Expr::Template(parts) => self.write_template(parts),
            Expr::TemplateWrap(wrapped) => self.write_template(std::slice::from_ref(wrapped)),
            Expr::Unary(unary) => {
                self.push(TokenKind::Operator, unary.operator.as_str());
                self.write_expr(&unary.expr);
            }
            Expr::Binary(binary) => {
                self.write_expr(&binary.lhs);
                self.space();
                self.push(TokenKind::Operator, binary.operator.as_str());
                self.space();
                self.write_expr(&binary.rhs);
            }
            Expr::Tuple(items) => {
                self.push(TokenKind::OBrack, "[");
                self.write_list(items);
                self.push(TokenKind::CBrack, "]");
            }
            Expr::Object(items) => {
                self.push(TokenKind::OBrace, "{");
                if !items.is_empty() {
                    self.newline();
                }
                for item in items {
                    match &item.key {
                        ObjectKey::Ident(ident) => self.push(TokenKind::Ident, ident.as_str()),
                        ObjectKey::Expr(key @ (Expr::ScopeTraversal(_) | Expr::RelativeTraversal(_))) => {
                            // a bare traversal would be taken as a literal identifier key
                            self.push(TokenKind::OParen, "(");
                            self.write_expr(key);
                            self.push(TokenKind::CParen, ")");
                        }
                        ObjectKey::Expr(key) => self.write_expr(key),
                    }
                    self.write_assign();
                    self.write_expr(&item.value);
                    self.end_line();
                }
                self.push(TokenKind::CBrace, "}");
            }
            Expr::Conditional(cond) => {
                self.write_expr(&cond.condition);
                self.space();
                self.push(TokenKind::Question, "?");
                self.space();
                self.write_expr(&cond.true_expr);
                self.space();
                self.push(TokenKind::Colon, ":");
                self.space();
                self.write_expr(&cond.false_expr);
            }
            Expr::FuncCall(call) => {
                self.push(TokenKind::Ident, call.name.as_str());
                self.push(TokenKind::OParen, "(");
                self.write_list(&call.args);
                if call.expand_final && !call.args.is_empty() {
                    self.push(TokenKind::Ellipsis, "...");
                }
                self.push(TokenKind::CParen, ")");
            }
            Expr::Index(index) => {
                self.write_expr(&index.collection);
                self.push(TokenKind::OBrack, "[");
                self.write_expr(&index.key);
                self.push(TokenKind::CBrack, "]");
            }
            Expr::Splat(splat) => {
                self.write_expr(&splat.source);
                self.push(TokenKind::OBrack, "[");
                self.push(TokenKind::Star, "*");
                self.push(TokenKind::CBrack, "]");
                self.write_expr(&splat.each);
            }
            Expr::ScopeTraversal(traversal) => self.write_traversal(traversal),
            Expr::RelativeTraversal(relative) => {
                self.write_expr(&relative.source);
                self.write_traversal(&relative.traversal);
            }
            Expr::Parens(inner) => {
                self.push(TokenKind::OParen, "(");
                self.write_expr(inner);
                self.push(TokenKind::CParen, ")");
            }
            Expr::For(forexpr) => self.write_for(forexpr),
            // only meaningful inside a splat, where it stands for the current element
            Expr::AnonSymbol => {}
        }
    }

    pub fn write_value(&mut self, value: &Value) {
        match value {
            Value::Null => self.push(TokenKind::Ident, "null"),
            Value::Boolean(b) => self.push(TokenKind::Ident, b.to_string()),
            Value::Integer(int) => self.push(TokenKind::Number, int.to_string()),
            Value::Decimal(dec) if dec.is_finite() => self.push(TokenKind::Number, dec.to_string()),
            Value::Decimal(_) => self.push(TokenKind::Ident, "null"),
            Value::String(s) => self.write_template(std::slice::from_ref(&Expr::Literal(
                Value::String(s.clone()),
            ))),
            Value::Array(items) => {
                self.push(TokenKind::OBrack, "[");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.push(TokenKind::Comma, ",");
                        self.space();
                    }
                    self.write_value(item);
                }
                self.push(TokenKind::CBrack, "]");
            }
            Value::Object(object) => {
                self.push(TokenKind::OBrace, "{");
                if !object.is_empty() {
                    self.newline();
                }
                for (key, value) in object {
                    self.write_key(key);
                    self.write_assign();
                    self.write_value(value);
                    self.end_line();
                }
                self.push(TokenKind::CBrace, "}");
            }
        }
    }

    /// Writes an attribute or object key, bare when it is a valid identifier
    pub fn write_key(&mut self, key: &str) {
        if is_identifier(key) {
            self.push(TokenKind::Ident, key);
        } else {
            self.push(TokenKind::OQuote, "\"");
            self.push(TokenKind::QuotedLit, escape_quoted(key));
            self.push(TokenKind::CQuote, "\"");
        }
    }

    /// ` = `
    pub fn write_assign(&mut self) {
        self.space();
        self.push(TokenKind::Equal, "=");
        self.space();
    }

    /// `ident "label" {` followed by a newline
    pub fn write_block_open(&mut self, ident: &str, labels: &[String]) {
        self.push(TokenKind::Ident, ident);
        for label in labels {
            self.space();
            self.push(TokenKind::OQuote, "\"");
            self.push(TokenKind::QuotedLit, escape_quoted(label));
            self.push(TokenKind::CQuote, "\"");
        }
        self.space();
        self.push(TokenKind::OBrace, "{");
        self.newline();
    }

    pub fn write_block_close(&mut self) {
        self.end_line();
        self.push(TokenKind::CBrace, "}");
        self.newline();
    }

    fn write_list(&mut self, items: &[Expr]) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(TokenKind::Comma, ",");
                self.space();
            }
            self.write_expr(item);
        }
    }

    fn write_template(&mut self, parts: &[Expr]) {
        let multiline = parts
            .iter()
            .any(|part| matches!(part, Expr::Literal(Value::String(s)) if s.contains('\n')));

        if multiline {
            self.write_heredoc(parts);
            return;
        }

        self.push(TokenKind::OQuote, "\"");
        for part in parts {
            match part {
                Expr::Literal(Value::String(literal)) => {
                    self.push(TokenKind::QuotedLit, escape_quoted(literal))
                }
                interpolated => self.write_interpolation(interpolated),
            }
        }
        self.push(TokenKind::CQuote, "\"");
    }

    /// `<<-EOT` when the content has a line starting without whitespace (the indentation added
    /// when rendering is stripped exactly), `<<EOT` with verbatim content otherwise
    ///
    /// The closing marker is not followed by a newline, statements end their line themselves.
    fn write_heredoc(&mut self, parts: &[Expr]) {
        let marker = heredoc_marker(parts);
        let open = if has_unindented_line(parts) { "<<-" } else { "<<" };
        self.push(TokenKind::OHeredoc, format!("{open}{marker}"));

        let mut ends_with_newline = false;
        for part in parts {
            match part {
                Expr::Literal(Value::String(literal)) => {
                    self.push(TokenKind::HeredocLit, escape_template(literal));
                    ends_with_newline = literal.ends_with('\n');
                }
                interpolated => {
                    self.write_interpolation(interpolated);
                    ends_with_newline = false;
                }
            }
        }

        // the closing marker needs a line of its own
        if !ends_with_newline {
            self.push(TokenKind::HeredocLit, "\n");
        }
        self.push(TokenKind::CHeredoc, marker);
    }

    fn write_interpolation(&mut self, expr: &Expr) {
        self.push(TokenKind::TemplateInterp, "${");
        self.write_expr(expr);
        self.push(TokenKind::TemplateSeqEnd, "}");
    }

    fn write_traversal(&mut self, traversal: &Traversal) {
        for (i, step) in traversal.0.iter().enumerate() {
            match step {
                Traverser::Root(name) => {
                    if i > 0 {
                        panic!("malformed traversal: root step `{name}` at position {i}");
                    }
                    self.push(TokenKind::Ident, name.as_str());
                }
                Traverser::Attr(name) => {
                    self.push(TokenKind::Dot, ".");
                    self.push(TokenKind::Ident, name.as_str());
                }
                Traverser::Index(key) => {
                    self.push(TokenKind::OBrack, "[");
                    self.write_value(key);
                    self.push(TokenKind::CBrack, "]");
                }
            }
        }
    }

    fn write_for(&mut self, forexpr: &ForExpr) {
        let (open, close) = match forexpr.key_expr {
            Some(_) => ((TokenKind::OBrace, "{"), (TokenKind::CBrace, "}")),
            None => ((TokenKind::OBrack, "["), (TokenKind::CBrack, "]")),
        };

        self.push(open.0, open.1);
        self.push(TokenKind::Ident, "for");
        self.space();
        if let Some(key_var) = &forexpr.key_var {
            self.push(TokenKind::Ident, key_var.as_str());
            self.push(TokenKind::Comma, ",");
            self.space();
        }
        self.push(TokenKind::Ident, forexpr.value_var.as_str());
        self.space();
        self.push(TokenKind::Ident, "in");
        self.space();
        self.write_expr(&forexpr.collection);
        self.space();
        self.push(TokenKind::Colon, ":");
        self.space();
        if let Some(key_expr) = &forexpr.key_expr {
            self.write_expr(key_expr);
            self.space();
            self.push(TokenKind::FatArrow, "=>");
            self.space();
        }
        self.write_expr(&forexpr.value_expr);
        if forexpr.grouping {
            self.push(TokenKind::Ellipsis, "...");
        }
        if let Some(condition) = &forexpr.condition {
            self.space();
            self.push(TokenKind::Ident, "if");
            self.space();
            self.write_expr(condition);
        }
        self.push(close.0, close.1);
    }
}

pub fn tokens_for_expr(expr: &Expr) -> Tokens {
    let mut tokens = Tokens::new();
    tokens.write_expr(expr);
    tokens
}

pub fn tokens_for_value(value: &Value) -> Tokens {
    let mut tokens = Tokens::new();
    tokens.write_value(value);
    tokens
}

pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    (first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// `EOT`, or `EOT<n>` when a content line would be taken as the closing marker
fn heredoc_marker(parts: &[Expr]) -> String {
    let closes_early = |marker: &str| {
        parts
            .iter()
            .filter_map(|part| match part {
                Expr::Literal(Value::String(literal)) => Some(literal),
                _ => None,
            })
            .flat_map(|literal| literal.split('\n'))
            .any(|line| line.trim_start().starts_with(marker))
    };

    let mut marker = HEREDOC_MARKER.to_string();
    let mut n = 1;
    while closes_early(&marker) {
        marker = format!("{HEREDOC_MARKER}{n}");
        n += 1;
    }
    marker
}

/// Whether a non-empty content line starts with something other than whitespace
///
/// Content without any non-empty line has nothing to strip and counts as unindented.
fn has_unindented_line(parts: &[Expr]) -> bool {
    let mut line_start = true;
    let mut any_line = false;

    for part in parts {
        match part {
            Expr::Literal(Value::String(literal)) => {
                for piece in literal.split_inclusive('\n') {
                    if line_start && piece != "\n" {
                        if !piece.starts_with(char::is_whitespace) {
                            return true;
                        }
                        any_line = true;
                    }
                    line_start = piece.ends_with('\n');
                }
            }
            // an interpolation at the start of a line
            _ if line_start => return true,
            _ => line_start = false,
        }
    }

    !any_line
}

fn escape_template(s: &str) -> String {
    s.replace("${", "$${").replace("%{", "%%{")
}

fn escape_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in escape_template(s).chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

impl std::fmt::Display for Tokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut indents: Vec<i32> = vec![];

        for line in self.tokens.split_inclusive(|t| t.kind == TokenKind::Newline) {
            let (content, newline) = match line.split_last() {
                Some((last, content)) if last.kind == TokenKind::Newline => (content, true),
                _ => (line, false),
            };

            if !content.is_empty() {
                let level = indent_level(&mut indents, content);
                write_line(f, content, level)?;
            }

            if newline {
                f.write_str("\n")?;
            }
        }

        Ok(())
    }
}

/// Indentation level of a line, updating the open bracket stack
fn indent_level(indents: &mut Vec<i32>, line: &[Token]) -> usize {
    let net: i32 = line.iter().map(Token::bracket_change).sum();

    if net > 0 {
        let level = indents.len();
        indents.push(net);
        return level;
    }

    let mut closed = -net;
    while closed > 0 {
        let Some(top) = indents.last_mut() else {
            break;
        };

        if closed >= *top {
            closed -= *top;
            indents.pop();
        } else {
            *top -= closed;
            closed = 0;
        }
    }
    indents.len()
}

fn write_line(f: &mut std::fmt::Formatter<'_>, line: &[Token], level: usize) -> std::fmt::Result {
    let indent = "  ".repeat(level);
    // content indentation of the open heredoc, none for `<<EOT` content
    let mut heredoc: Option<String> = None;
    let mut line_start = false;

    for (i, token) in line.iter().enumerate() {
        if i == 0 {
            f.write_str(&indent)?;
        } else if let Some(content_indent) = &heredoc {
            if line_start && !matches!(token.kind, TokenKind::HeredocLit | TokenKind::CHeredoc) {
                // interpolation at the start of a content line
                f.write_str(content_indent)?;
                line_start = false;
            } else if !line_start {
                write_spaces(f, token.spaces_before)?;
            }
        } else {
            write_spaces(f, token.spaces_before)?;
        }

        match token.kind {
            TokenKind::OHeredoc => {
                writeln!(f, "{}", token.bytes)?;
                // top level content is indented too, so `<<-` has something to strip
                heredoc = Some(if token.bytes.starts_with("<<-") {
                    "  ".repeat(level.max(1))
                } else {
                    String::new()
                });
                line_start = true;
            }
            TokenKind::HeredocLit => {
                let content_indent = heredoc.as_deref().unwrap_or_default();
                for piece in token.bytes.split_inclusive('\n') {
                    if line_start && piece != "\n" {
                        f.write_str(content_indent)?;
                    }
                    f.write_str(piece)?;
                    line_start = piece.ends_with('\n');
                }
            }
            TokenKind::CHeredoc => {
                // the preceding literal always ends the last content line
                f.write_str(&indent)?;
                f.write_str(&token.bytes)?;
                heredoc = None;
                line_start = false;
            }
            _ => f.write_str(&token.bytes)?,
        }
    }

    Ok(())
}

fn write_spaces(f: &mut std::fmt::Formatter<'_>, count: usize) -> std::fmt::Result {
    for _ in 0..count {
        f.write_str(" ")?;
    }
    Ok(())
}
