use std::collections::HashMap;

use crate::error::{CompileError, Result};
use crate::timing::TimingEnv;
use crate::types::TimeMs;

// ---------------------------------------------------------------------------
// Offset
// ---------------------------------------------------------------------------

/// A fragment offset: either a constant number of milliseconds or a lazy
/// `calc(...)` expression over fragment timing variables, evaluated at the
/// moment the owning fragment is placed.
#[derive(Debug, Clone)]
pub enum Offset {
    Const(TimeMs),
    Calc(CalcExpr),
}

impl Offset {
    pub const ZERO: Offset = Offset::Const(TimeMs::ZERO);

    pub fn resolve(&self, env: &TimingEnv) -> Result<TimeMs> {
        match self {
            Offset::Const(t) => Ok(*t),
            Offset::Calc(expr) => Ok(TimeMs(expr.eval(env)?.round() as i64)),
        }
    }

    pub fn is_const_zero(&self) -> bool {
        matches!(self, Offset::Const(t) if *t == TimeMs::ZERO)
    }

    /// This offset as a term usable inside a larger calc expression.
    fn term_text(&self) -> String {
        match self {
            Offset::Const(t) => t.millis().to_string(),
            Offset::Calc(expr) => format!("({})", expr.inner_text()),
        }
    }

    /// Folds two offsets into their sum. Constants fold numerically; as soon
    /// as either side is lazy the result is a freshly compiled
    /// `calc(<left> + <right>)` expression.
    pub fn fold_add(left: &Offset, right: &Offset) -> Result<Offset> {
        match (left, right) {
            (Offset::Const(a), Offset::Const(b)) => Ok(Offset::Const(*a + *b)),
            _ => {
                let source = format!("calc({} + {})", left.term_text(), right.term_text());
                CalcExpr::compile(&source).map(Offset::Calc)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CalcExpr
// ---------------------------------------------------------------------------

/// A reference substituted out of a calc expression: the fragment id and the
/// dotted property path below it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct VarRef {
    fragment_id: String,
    path: Vec<String>,
}

/// A compile-once thunk: the original source text, the parsed arithmetic
/// tree, and the table mapping substituted variables back to fragment
/// references.
#[derive(Debug, Clone)]
pub struct CalcExpr {
    source: String,
    inner: String,
    ast: Expr,
    bindings: HashMap<String, VarRef>,
}

impl CalcExpr {
    /// Compiles one `calc(...)` expression.
    pub fn compile(text: &str) -> Result<CalcExpr> {
        let trimmed = text.trim();
        let inner = trimmed
            .strip_prefix("calc(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| CompileError::ExpressionParse {
                source_text: text.to_string(),
                message: "expected calc(...)".to_string(),
            })?;

        let (substituted, bindings) = substitute_refs(inner, trimmed)?;
        let tokens = tokenize(&substituted, trimmed)?;
        let ast = Parser::new(tokens, trimmed).parse()?;

        Ok(CalcExpr {
            source: trimmed.to_string(),
            inner: inner.to_string(),
            ast,
            bindings,
        })
    }

    pub fn source_text(&self) -> &str {
        &self.source
    }

    fn inner_text(&self) -> &str {
        &self.inner
    }

    /// Evaluates against the timing environment; the result is interpreted
    /// as milliseconds.
    pub fn eval(&self, env: &TimingEnv) -> Result<f64> {
        self.eval_node(&self.ast, env)
    }

    fn eval_node(&self, node: &Expr, env: &TimingEnv) -> Result<f64> {
        match node {
            Expr::Number(n) => Ok(*n),
            Expr::Var(name) => {
                let var = self.bindings.get(name).ok_or_else(|| {
                    CompileError::ExpressionParse {
                        source_text: self.source.clone(),
                        message: format!("unbound variable `{name}`"),
                    }
                })?;
                if !env.contains(&var.fragment_id) {
                    return Err(CompileError::MissingFragment {
                        source_text: self.source.clone(),
                        id: var.fragment_id.clone(),
                    });
                }
                env.lookup(&var.fragment_id, &var.path).ok_or_else(|| {
                    CompileError::MissingProperty {
                        source_text: self.source.clone(),
                        path: format!("{}.{}", var.fragment_id, var.path.join(".")),
                    }
                })
            }
            Expr::Neg(inner) => Ok(-self.eval_node(inner, env)?),
            Expr::Binary { op, left, right } => {
                let l = self.eval_node(left, env)?;
                let r = self.eval_node(right, env)?;
                Ok(match op {
                    BinOp::Add => l + r,
                    BinOp::Sub => l - r,
                    BinOp::Mul => l * r,
                    BinOp::Div => l / r,
                })
            }
        }
    }
}

/// Replaces every `#<id>.<dot.path>` reference with an alphabetic variable
/// `<id>_<flat_path>` (dots and dashes become underscores) and records the
/// mapping back to the fragment reference.
fn substitute_refs(inner: &str, source: &str) -> Result<(String, HashMap<String, VarRef>)> {
    let mut out = String::with_capacity(inner.len());
    let mut bindings = HashMap::new();
    let chars: Vec<char> = inner.chars().collect();
    let mut i = 0;

    let ident_char = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let id_char = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';

    while i < chars.len() {
        if chars[i] != '#' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;
        let id_start = i;
        while i < chars.len() && id_char(chars[i]) {
            i += 1;
        }
        if i == id_start {
            return Err(CompileError::ExpressionParse {
                source_text: source.to_string(),
                message: "expected fragment id after `#`".to_string(),
            });
        }
        let id: String = chars[id_start..i].iter().collect();

        let mut path = Vec::new();
        while i < chars.len() && chars[i] == '.' {
            i += 1;
            let seg_start = i;
            while i < chars.len() && ident_char(chars[i]) {
                i += 1;
            }
            if i == seg_start {
                return Err(CompileError::ExpressionParse {
                    source_text: source.to_string(),
                    message: format!("incomplete property path after `#{id}`"),
                });
            }
            path.push(chars[seg_start..i].iter().collect::<String>());
        }
        if path.is_empty() {
            return Err(CompileError::ExpressionParse {
                source_text: source.to_string(),
                message: format!("fragment reference `#{id}` has no property path"),
            });
        }

        let var = format!("{}_{}", id.replace('-', "_"), path.join("_"));
        out.push_str(&var);
        bindings.insert(
            var,
            VarRef {
                fragment_id: id,
                path,
            },
        );
    }

    Ok((out, bindings))
}

// ---------------------------------------------------------------------------
// Arithmetic parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Var(String),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(text: &str, source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            _ if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text.parse::<f64>().map_err(|_| CompileError::ExpressionParse {
                    source_text: source.to_string(),
                    message: format!("invalid number `{text}`"),
                })?;
                tokens.push(Token::Number(value));
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => {
                return Err(CompileError::ExpressionParse {
                    source_text: source.to_string(),
                    message: format!("unexpected character `{c}`"),
                });
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token>, source: &'a str) -> Self {
        Self {
            tokens,
            pos: 0,
            source,
        }
    }

    fn parse(mut self) -> Result<Expr> {
        let expr = self.expression()?;
        if self.pos != self.tokens.len() {
            return Err(self.error("unexpected trailing tokens"));
        }
        Ok(expr)
    }

    fn error(&self, message: &str) -> CompileError {
        CompileError::ExpressionParse {
            source_text: self.source.to_string(),
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expression(&mut self) -> Result<Expr> {
        let mut left = self.term()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(BinOp::Add),
            Some(Token::Minus) => Some(BinOp::Sub),
            _ => None,
        } {
            self.advance();
            let right = self.term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut left = self.factor()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(BinOp::Mul),
            Some(Token::Slash) => Some(BinOp::Div),
            _ => None,
        } {
            self.advance();
            let right = self.factor()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Ident(name)) => Ok(Expr::Var(name)),
            Some(Token::Minus) => Ok(Expr::Neg(Box::new(self.factor()?))),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.error("expected `)`")),
                }
            }
            _ => Err(self.error("expected a number, reference or `(`")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
