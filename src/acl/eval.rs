//! Predicate evaluator.
//!
//! Pure: reads the stored params, the call arguments and the chain facts and
//! returns a boolean or an [`EvalError`]. Errors never turn into `true`; the
//! ACL reports any error as "not permitted".
//!
//! Oracle params call back into the host through [`OracleHost`]. The
//! [`EvalEnv`] travels by value and carries the nesting depth, so re-entrant
//! checks made by an oracle see their own context and cannot recurse forever.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::params::{Op, Param, ParamId};
use crate::types::{Address, ArgValue, RoleId, Word};

/// Chain-level facts visible to predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChainFacts {
    /// Current block height.
    pub block_number: u64,
    /// Current timestamp in seconds since the Unix epoch.
    pub timestamp: u64,
}

/// The permission check an oracle is asked about.
#[derive(Debug, Clone, Copy)]
pub struct OracleRequest<'a> {
    /// Entity performing the action.
    pub who: Address,
    /// Module the action targets.
    pub app: Address,
    /// Role being exercised.
    pub role: RoleId,
    /// Arguments of the call.
    pub args: &'a [ArgValue],
}

/// Resolves oracle addresses to running module code.
pub trait OracleHost {
    /// Ask the oracle at `oracle` whether `request` may proceed.
    ///
    /// `env` is already one level deeper than the caller's context.
    ///
    /// # Errors
    ///
    /// Returns a reason when the oracle cannot be resolved or fails.
    fn consult(
        &self,
        oracle: Address,
        request: &OracleRequest<'_>,
        env: EvalEnv<'_>,
    ) -> Result<bool, String>;
}

/// Host without oracles; every oracle param fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOracles;

impl OracleHost for NoOracles {
    fn consult(
        &self,
        oracle: Address,
        _request: &OracleRequest<'_>,
        _env: EvalEnv<'_>,
    ) -> Result<bool, String> {
        Err(format!("no module host to resolve oracle {oracle}"))
    }
}

/// Evaluation context, passed by value through every (nested) evaluation.
#[derive(Clone, Copy)]
pub struct EvalEnv<'a> {
    /// Chain facts at the time of the check.
    pub facts: ChainFacts,
    /// Oracle resolver.
    pub oracles: &'a dyn OracleHost,
    /// Current oracle nesting depth.
    pub depth: usize,
    /// Maximum oracle nesting depth.
    pub max_depth: usize,
}

impl fmt::Debug for EvalEnv<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalEnv")
            .field("facts", &self.facts)
            .field("depth", &self.depth)
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

impl<'a> EvalEnv<'a> {
    /// A top-level context.
    pub fn new(facts: ChainFacts, oracles: &'a dyn OracleHost, max_depth: usize) -> Self {
        Self {
            facts,
            oracles,
            depth: 0,
            max_depth,
        }
    }

    /// A context without oracles, for checks made outside a host.
    pub fn detached(facts: ChainFacts) -> EvalEnv<'static> {
        EvalEnv {
            facts,
            oracles: &NoOracles,
            depth: 0,
            max_depth: 0,
        }
    }

    /// The context one oracle level deeper, or `None` past the limit.
    pub fn nested(self) -> Option<Self> {
        let depth = self.depth.checked_add(1)?;
        (depth <= self.max_depth).then_some(Self { depth, ..self })
    }
}

/// Why a predicate could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// The predicate reads an argument the call does not have.
    #[error("param {param} reads argument {index} but the call has {len}")]
    ArgOutOfRange {
        /// Index of the reading param.
        param: usize,
        /// Argument index requested.
        index: usize,
        /// Number of arguments supplied.
        len: usize,
    },

    /// An operand cannot be compared numerically.
    #[error("param {param}: {reason}")]
    TypeMismatch {
        /// Index of the offending param.
        param: usize,
        /// What could not be coerced.
        reason: &'static str,
    },

    /// The stored params are structurally broken.
    #[error("param {param} is malformed: {reason}")]
    Malformed {
        /// Index of the offending param.
        param: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// An oracle failed or could not be resolved.
    #[error("oracle {oracle} failed: {reason}")]
    Oracle {
        /// Address of the oracle.
        oracle: Address,
        /// Reason reported by the host.
        reason: String,
    },

    /// Oracle nesting went past the configured limit.
    #[error("oracle nesting exceeds depth {max}")]
    DepthExceeded {
        /// Configured limit.
        max: usize,
    },
}

fn malformed(param: usize, reason: impl Into<String>) -> EvalError {
    EvalError::Malformed {
        param,
        reason: reason.into(),
    }
}

/// Evaluate the predicate rooted at param 0.
///
/// # Errors
///
/// Returns an [`EvalError`] for out-of-range arguments, type mismatches,
/// malformed params and oracle failures.
pub fn evaluate(
    params: &[Param],
    request: &OracleRequest<'_>,
    env: EvalEnv<'_>,
) -> Result<bool, EvalError> {
    eval_node(params, 0, request, env)
}

fn eval_node(
    params: &[Param],
    index: usize,
    request: &OracleRequest<'_>,
    env: EvalEnv<'_>,
) -> Result<bool, EvalError> {
    let param = params
        .get(index)
        .ok_or_else(|| malformed(index, "node does not exist"))?;

    let (value, compared_to) = match param.id {
        ParamId::LogicOp => return eval_logic(params, index, param, request, env),
        ParamId::Oracle => {
            let oracle = Address::from_word(&param.value)
                .ok_or_else(|| malformed(index, "oracle value is not an address"))?;
            let nested = env.nested().ok_or(EvalError::DepthExceeded {
                max: env.max_depth,
            })?;
            let approved = env
                .oracles
                .consult(oracle, request, nested)
                .map_err(|reason| EvalError::Oracle { oracle, reason })?;
            (Word::from(approved), Word::from(1u64))
        }
        ParamId::BlockNumber => (Word::from(env.facts.block_number), param.value),
        ParamId::Timestamp => (Word::from(env.facts.timestamp), param.value),
        ParamId::Literal => (param.value, param.value),
        ParamId::Arg(i) => {
            let position = usize::from(i);
            let arg = request
                .args
                .get(position)
                .ok_or(EvalError::ArgOutOfRange {
                    param: index,
                    index: position,
                    len: request.args.len(),
                })?;
            if param.op == Op::Ret {
                return Ok(arg.is_truthy());
            }
            let number = arg
                .as_number()
                .map_err(|reason| EvalError::TypeMismatch {
                    param: index,
                    reason,
                })?;
            (number, param.value)
        }
    };

    if param.op == Op::Ret {
        return Ok(!value.is_zero());
    }
    compare(&value, param.op, &compared_to)
        .ok_or_else(|| malformed(index, format!("{:?} is not a comparison", param.op)))
}

fn eval_logic(
    params: &[Param],
    index: usize,
    param: &Param,
    request: &OracleRequest<'_>,
    env: EvalEnv<'_>,
) -> Result<bool, EvalError> {
    let child = |slot: usize| -> Result<usize, EvalError> {
        let c = param
            .child(slot)
            .ok_or_else(|| malformed(index, "unreadable child index"))?;
        if c <= index || c >= params.len() {
            return Err(malformed(index, format!("child {c} is out of order")));
        }
        Ok(c)
    };
    let eval = |slot: usize| -> Result<bool, EvalError> {
        eval_node(params, child(slot)?, request, env)
    };

    match param.op {
        Op::Not => Ok(!eval(0)?),
        Op::And => Ok(eval(0)? && eval(1)?),
        Op::Or => Ok(eval(0)? || eval(1)?),
        Op::Xor => {
            let left = eval(0)?;
            let right = eval(1)?;
            Ok(left ^ right)
        }
        Op::IfElse => {
            if eval(0)? {
                eval(1)
            } else {
                eval(2)
            }
        }
        other => Err(malformed(index, format!("{other:?} on a logic node"))),
    }
}

fn compare(a: &Word, op: Op, b: &Word) -> Option<bool> {
    Some(match op {
        Op::Eq => a == b,
        Op::Neq => a != b,
        Op::Gt => a > b,
        Op::Lt => a < b,
        Op::Gte => a >= b,
        Op::Lte => a <= b,
        _ => return None,
    })
}
