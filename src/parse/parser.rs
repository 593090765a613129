use super::{ast::*, error::FormatError, lexer::*};
use crate::common::{CompareOp, Int};
use logos_iter::LogosIter;
use vec1::Vec1;

type PResult<T = Expr> = Result<T, FormatError>;

/// Operator-precedence parser over the token stream.
///
/// Binding, loosest to tightest: `+ - ,` < `*` < counting (`#` family)
/// < drop/keep/clamp/sort < reroll < explode/compound/penetrate < `d`.
/// Postfix modifier chains are left-associative; an absent operand parses as
/// the empty value and picks up its per-operator default at evaluation.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    source: &'a str,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            lexer: lexer(source),
            source,
        }
    }

    pub fn parse(mut self) -> PResult {
        let expr = self.parse_expr()?;
        if self.lexer.peek().is_some() {
            return self.unexpected("end of input");
        }
        Ok(expr)
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        self.lexer.peek() == Some(&kind)
    }

    /// Position just past the last consumed token.
    fn here(&mut self) -> usize {
        self.lexer.span().end
    }

    fn advance(&mut self) -> usize {
        self.lexer.next();
        self.lexer.span().start
    }

    fn error_at<T>(&self, message: impl Into<String>, position: usize) -> PResult<T> {
        Err(FormatError::new(message, self.source, position))
    }

    fn unexpected<T>(&mut self, expected: &str) -> PResult<T> {
        match self.lexer.next() {
            Some(_) => {
                let position = self.lexer.span().start;
                let slice = self.lexer.slice().to_string();
                self.error_at(
                    format!("expected {}, found {:?}", expected, slice),
                    position,
                )
            }
            None => self.error_at(
                format!("expected {}, found end of input", expected),
                self.source.len(),
            ),
        }
    }

    fn consume(&mut self, kind: TokenKind, expected: &str) -> PResult<()> {
        if self.matches(kind) {
            self.lexer.next();
            Ok(())
        } else {
            self.unexpected(expected)
        }
    }

    fn parse_integer(&mut self) -> PResult<Int> {
        self.consume(TokenKind::Integer, "an integer")?;
        let position = self.lexer.span().start;
        self.lexer
            .slice()
            .parse()
            .map_err(|_| FormatError::new("integer literal out of range", self.source, position))
    }

    fn opt_integer(&mut self) -> PResult<Option<Int>> {
        if self.matches(TokenKind::Integer) {
            self.parse_integer().map(Some)
        } else {
            Ok(None)
        }
    }

    fn opt_compare(&mut self) -> Option<CompareOp> {
        let op = match self.lexer.peek() {
            Some(TokenKind::Equal) => CompareOp::Equal,
            Some(TokenKind::GreaterThan) => CompareOp::Greater,
            Some(TokenKind::LessThan) => CompareOp::Less,
            Some(TokenKind::GreaterEqual) => CompareOp::GreaterEqual,
            Some(TokenKind::LessEqual) => CompareOp::LessEqual,
            _ => return None,
        };
        self.lexer.next();
        Some(op)
    }

    fn parse_expr(&mut self) -> PResult {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.lexer.peek() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                Some(TokenKind::Comma) => BinaryOp::Comma,
                _ => break,
            };
            let position = self.advance();
            let rhs = self.parse_term()?;
            lhs = Expr::Binary(Binary::new(op, lhs, rhs, position));
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> PResult {
        let mut lhs = self.parse_count()?;
        while self.matches(TokenKind::Star) {
            let position = self.advance();
            let rhs = self.parse_count()?;
            lhs = Expr::Binary(Binary::new(BinaryOp::Mul, lhs, rhs, position));
        }
        Ok(lhs)
    }

    fn parse_count(&mut self) -> PResult {
        let mut lhs = self.parse_drop()?;
        loop {
            let kind = match self.lexer.peek() {
                Some(TokenKind::Count) => CountKind::All,
                Some(TokenKind::CountSuccess) => CountKind::Success,
                Some(TokenKind::CountFailure) => CountKind::Failure,
                Some(TokenKind::CountCritSuccess) => CountKind::CritSuccess,
                Some(TokenKind::CountCritFailure) => CountKind::CritFailure,
                _ => break,
            };
            let position = self.advance();
            let cmp = self.opt_compare();
            let target = self.opt_integer()?;
            lhs = Expr::Count(Count::new(lhs, kind, cmp, target, position));
        }
        Ok(lhs)
    }

    fn parse_drop(&mut self) -> PResult {
        let mut lhs = self.parse_reroll()?;
        loop {
            let op = match self.lexer.peek() {
                Some(TokenKind::DropHigh) => PoolOp::DropHigh,
                Some(TokenKind::DropLow) => PoolOp::DropLow,
                Some(TokenKind::DropLess) => PoolOp::DropCmp(CompareOp::Less),
                Some(TokenKind::DropLessEqual) => PoolOp::DropCmp(CompareOp::LessEqual),
                Some(TokenKind::DropGreater) => PoolOp::DropCmp(CompareOp::Greater),
                Some(TokenKind::DropGreaterEqual) => PoolOp::DropCmp(CompareOp::GreaterEqual),
                Some(TokenKind::DropEqual) => PoolOp::DropCmp(CompareOp::Equal),
                // `k` is an alias of `kh`
                Some(TokenKind::KeepHigh | TokenKind::Keep) => PoolOp::KeepHigh,
                Some(TokenKind::KeepLow) => PoolOp::KeepLow,
                Some(TokenKind::ClampMax) => PoolOp::ClampMax,
                Some(TokenKind::ClampMin) => PoolOp::ClampMin,
                Some(TokenKind::SortAsc) => PoolOp::SortAsc,
                Some(TokenKind::SortDesc) => PoolOp::SortDesc,
                _ => break,
            };
            let position = self.advance();
            let target = self.opt_integer()?;
            lhs = Expr::Pool(Pool::new(lhs, op, target, position));
        }
        Ok(lhs)
    }

    fn parse_reroll(&mut self) -> PResult {
        let mut lhs = self.parse_explode()?;
        loop {
            let once = match self.lexer.peek() {
                Some(TokenKind::Reroll) => false,
                Some(TokenKind::RerollOnce) => true,
                _ => break,
            };
            let position = self.advance();
            let cmp = self.opt_compare();
            let target = self.opt_integer()?;
            lhs = Expr::Reroll(Reroll::new(lhs, once, cmp, target, position));
        }
        Ok(lhs)
    }

    fn parse_explode(&mut self) -> PResult {
        let mut lhs = self.parse_dice()?;
        loop {
            let (kind, once) = match self.lexer.peek() {
                Some(TokenKind::Explode) => (ExplodeKind::Explode, false),
                Some(TokenKind::ExplodeOnce) => (ExplodeKind::Explode, true),
                Some(TokenKind::Compound) => (ExplodeKind::Compound, false),
                Some(TokenKind::CompoundOnce) => (ExplodeKind::Compound, true),
                Some(TokenKind::Penetrate) => (ExplodeKind::Penetrate, false),
                _ => break,
            };
            let position = self.advance();
            let (cmp, target) = if kind == ExplodeKind::Penetrate {
                // a trailing integer is the penetration-die size
                (None, self.opt_integer()?)
            } else {
                (self.opt_compare(), self.opt_integer()?)
            };
            lhs = Expr::Explode(Explode::new(lhs, kind, once, cmp, target, position));
        }
        Ok(lhs)
    }

    fn parse_dice(&mut self) -> PResult {
        let count = self.parse_atom()?;
        match self.lexer.peek() {
            Some(TokenKind::Die) => {
                let position = self.advance();
                let kind = match self.lexer.peek() {
                    Some(TokenKind::Fudge) => {
                        self.lexer.next();
                        DiceKind::Fudge
                    }
                    Some(TokenKind::Percent) => {
                        self.lexer.next();
                        DiceKind::Percent
                    }
                    Some(TokenKind::LeftBracket) => DiceKind::Csv(self.parse_csv()?),
                    _ => DiceKind::Std(Box::new(self.parse_atom()?)),
                };
                Ok(Expr::Dice(Dice::new(count, kind, position)))
            }
            Some(TokenKind::D66) => {
                let position = self.advance();
                Ok(Expr::Dice(Dice::new(count, DiceKind::D66, position)))
            }
            _ => Ok(count),
        }
    }

    fn parse_csv(&mut self) -> PResult<Vec1<Int>> {
        self.consume(TokenKind::LeftBracket, "'['")?;
        let open = self.lexer.span().start;
        let mut vals = Vec::new();
        loop {
            let negative = if self.matches(TokenKind::Minus) {
                self.lexer.next();
                true
            } else {
                false
            };
            let v = self.parse_integer()?;
            vals.push(if negative { -v } else { v });
            match self.lexer.peek() {
                Some(TokenKind::Comma) => {
                    self.lexer.next();
                }
                Some(TokenKind::RightBracket) => {
                    self.lexer.next();
                    break;
                }
                _ => return self.unexpected("',' or ']'"),
            }
        }
        Vec1::try_from_vec(vals)
            .map_err(|_| FormatError::new("empty value list", self.source, open))
    }

    fn parse_atom(&mut self) -> PResult {
        match self.lexer.peek() {
            Some(TokenKind::Integer) => {
                let v = self.parse_integer()?;
                let position = self.lexer.span().start;
                Ok(Expr::Value(Value::new(v, position)))
            }
            Some(TokenKind::LeftParen) => {
                self.lexer.next();
                let inner = self.parse_expr()?;
                self.consume(TokenKind::RightParen, "')'")?;
                Ok(inner)
            }
            Some(TokenKind::LeftBrace) => {
                let position = self.advance();
                let inner = self.parse_expr()?;
                self.consume(TokenKind::RightBrace, "'}'")?;
                Ok(Expr::Aggregate(Aggregate::new(inner, position)))
            }
            _ => Ok(Expr::Value(Value::empty(self.here()))),
        }
    }
}
