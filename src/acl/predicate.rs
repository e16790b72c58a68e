//! Typed predicate trees and their compilation to flat params.
//!
//! Managers build a [`Predicate`] (in code or from a TOML script) and the ACL
//! stores the compiled [`Param`] list. Compilation lays nodes out in
//! pre-order, so every child index is larger than its parent's.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::params::{Op, Param, ParamId};
use crate::types::{Address, Word};

/// Left-hand side of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// Call argument by index.
    Arg(u8),
    /// Current block height.
    BlockNumber,
    /// Current timestamp.
    Timestamp,
    /// A constant.
    Literal(Word),
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Neq,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Gte,
    /// `<=`
    Lte,
}

impl From<CmpOp> for Op {
    fn from(op: CmpOp) -> Self {
        match op {
            CmpOp::Eq => Op::Eq,
            CmpOp::Neq => Op::Neq,
            CmpOp::Gt => Op::Gt,
            CmpOp::Lt => Op::Lt,
            CmpOp::Gte => Op::Gte,
            CmpOp::Lte => Op::Lte,
        }
    }
}

/// A boolean condition attached to a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// `left <op> right`.
    Compare {
        /// Value read from the call or the environment.
        left: Operand,
        /// Comparison operator.
        op: CmpOp,
        /// Constant right-hand side.
        right: Word,
    },
    /// Operand is non-zero (or `true`).
    Truthy(Operand),
    /// The oracle module at this address approves the call.
    Oracle(Address),
    /// Negation.
    Not(Box<Predicate>),
    /// Both hold (right side skipped when the left is false).
    And(Box<Predicate>, Box<Predicate>),
    /// Either holds (right side skipped when the left is true).
    Or(Box<Predicate>, Box<Predicate>),
    /// Exactly one holds.
    Xor(Box<Predicate>, Box<Predicate>),
    /// `if cond { then } else { otherwise }`.
    IfElse(Box<Predicate>, Box<Predicate>, Box<Predicate>),
}

/// Error compiling a predicate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredicateError {
    /// The tree has more nodes than a param index can address.
    #[error("predicate too large to encode")]
    TooLarge,
    /// Argument index collides with the reserved ids.
    #[error("argument index {0} is out of the addressable range")]
    ArgIndex(u8),
}

impl Operand {
    fn compare(self, op: CmpOp, right: impl Into<Word>) -> Predicate {
        Predicate::Compare {
            left: self,
            op,
            right: right.into(),
        }
    }

    /// `self == right`
    #[allow(clippy::should_implement_trait)]
    pub fn eq(self, right: impl Into<Word>) -> Predicate {
        self.compare(CmpOp::Eq, right)
    }

    /// `self != right`
    pub fn neq(self, right: impl Into<Word>) -> Predicate {
        self.compare(CmpOp::Neq, right)
    }

    /// `self > right`
    pub fn gt(self, right: impl Into<Word>) -> Predicate {
        self.compare(CmpOp::Gt, right)
    }

    /// `self < right`
    pub fn lt(self, right: impl Into<Word>) -> Predicate {
        self.compare(CmpOp::Lt, right)
    }

    /// `self >= right`
    pub fn gte(self, right: impl Into<Word>) -> Predicate {
        self.compare(CmpOp::Gte, right)
    }

    /// `self <= right`
    pub fn lte(self, right: impl Into<Word>) -> Predicate {
        self.compare(CmpOp::Lte, right)
    }

    fn param_id(self) -> Result<(ParamId, Option<Word>), PredicateError> {
        Ok(match self {
            Self::Arg(i) if i >= super::params::FIRST_RESERVED_ID => {
                return Err(PredicateError::ArgIndex(i))
            }
            Self::Arg(i) => (ParamId::Arg(i), None),
            Self::BlockNumber => (ParamId::BlockNumber, None),
            Self::Timestamp => (ParamId::Timestamp, None),
            Self::Literal(w) => (ParamId::Literal, Some(w)),
        })
    }
}

impl Predicate {
    /// Both `self` and `other`.
    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }

    /// Either `self` or `other`.
    pub fn or(self, other: Predicate) -> Predicate {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    /// Exactly one of `self` and `other`.
    pub fn xor(self, other: Predicate) -> Predicate {
        Predicate::Xor(Box::new(self), Box::new(other))
    }

    /// Negation of `self`.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }

    /// `if self { then } else { otherwise }`.
    pub fn if_else(self, then: Predicate, otherwise: Predicate) -> Predicate {
        Predicate::IfElse(Box::new(self), Box::new(then), Box::new(otherwise))
    }

    /// Lay the tree out as a flat param list rooted at index 0.
    ///
    /// # Errors
    ///
    /// Fails when an argument index collides with reserved ids or the tree
    /// cannot be indexed with `u32`.
    pub fn compile(&self) -> Result<Vec<Param>, PredicateError> {
        let mut out = Vec::new();
        self.emit(&mut out)?;
        Ok(out)
    }

    fn emit(&self, out: &mut Vec<Param>) -> Result<u32, PredicateError> {
        let index = u32::try_from(out.len()).map_err(|_| PredicateError::TooLarge)?;
        match self {
            Self::Compare { left, op, right } => {
                let (id, literal) = left.param_id()?;
                // Literal operands compare the param value against itself, so
                // the constant is folded into the stored value.
                let value = literal.map_or(*right, |l| fold_literal(l, *op, *right));
                let op = if literal.is_some() { Op::Ret } else { Op::from(*op) };
                out.push(Param::new(id, op, value));
            }
            Self::Truthy(operand) => {
                let (id, literal) = operand.param_id()?;
                out.push(Param::new(id, Op::Ret, literal.unwrap_or(Word::ZERO)));
            }
            Self::Oracle(addr) => out.push(Param::new(ParamId::Oracle, Op::Eq, addr.to_word())),
            Self::Not(inner) => {
                out.push(Param::logic(Op::Not, 0, 0, 0));
                let a = inner.emit(out)?;
                replace(out, index, Param::logic(Op::Not, a, 0, 0));
            }
            Self::And(l, r) | Self::Or(l, r) | Self::Xor(l, r) => {
                let op = match self {
                    Self::And(..) => Op::And,
                    Self::Or(..) => Op::Or,
                    _ => Op::Xor,
                };
                out.push(Param::logic(op, 0, 0, 0));
                let a = l.emit(out)?;
                let b = r.emit(out)?;
                replace(out, index, Param::logic(op, a, b, 0));
            }
            Self::IfElse(c, t, e) => {
                out.push(Param::logic(Op::IfElse, 0, 0, 0));
                let a = c.emit(out)?;
                let b = t.emit(out)?;
                let d = e.emit(out)?;
                replace(out, index, Param::logic(Op::IfElse, a, b, d));
            }
        }
        Ok(index)
    }
}

fn replace(out: &mut [Param], index: u32, param: Param) {
    if let Some(slot) = usize::try_from(index).ok().and_then(|i| out.get_mut(i)) {
        *slot = param;
    }
}

/// Evaluate a literal comparison at compile time; the result is stored as a
/// literal read with `Ret`.
fn fold_literal(left: Word, op: CmpOp, right: Word) -> Word {
    let holds = match op {
        CmpOp::Eq => left == right,
        CmpOp::Neq => left != right,
        CmpOp::Gt => left > right,
        CmpOp::Lt => left < right,
        CmpOp::Gte => left >= right,
        CmpOp::Lte => left <= right,
    };
    Word::from(holds)
}
