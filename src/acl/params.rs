//! Flat parameter encoding for conditional grants.
//!
//! A conditional grant stores its predicate as a list of [`Param`]s rooted at
//! index 0. Logic nodes reference their children by index; every child index
//! is strictly greater than its parent's, which keeps the graph acyclic and
//! evaluation finite. Lists are content-addressed by [`params_hash`].

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::types::{Address, Word};

/// Raw id of the first reserved (non-argument) param id.
pub const FIRST_RESERVED_ID: u8 = 200;

/// What a param reads its left-hand value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamId {
    /// Call argument at the given index (0..=199).
    Arg(u8),
    /// Current block height.
    BlockNumber,
    /// Current timestamp in seconds.
    Timestamp,
    /// Result of an oracle module; `value` holds the oracle address.
    Oracle,
    /// A logic node; `value` packs child indices.
    LogicOp,
    /// The param's own `value` (a literal).
    Literal,
}

impl ParamId {
    /// Stable numeric encoding used for hashing and persistence.
    pub fn to_raw(self) -> u8 {
        match self {
            Self::Arg(i) => i,
            Self::BlockNumber => 200,
            Self::Timestamp => 201,
            Self::Oracle => 203,
            Self::LogicOp => 204,
            Self::Literal => 205,
        }
    }

    /// Decode a raw id. Returns `None` for unassigned reserved ids.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            i if i < FIRST_RESERVED_ID => Some(Self::Arg(i)),
            200 => Some(Self::BlockNumber),
            201 => Some(Self::Timestamp),
            203 => Some(Self::Oracle),
            204 => Some(Self::LogicOp),
            205 => Some(Self::Literal),
            _ => None,
        }
    }
}

/// Operator of a param.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    /// No operation; never valid in a stored predicate.
    None,
    /// Equal.
    Eq,
    /// Not equal.
    Neq,
    /// Greater than.
    Gt,
    /// Less than.
    Lt,
    /// Greater than or equal.
    Gte,
    /// Less than or equal.
    Lte,
    /// Truthiness of the left-hand value.
    Ret,
    /// Logical negation of one child.
    Not,
    /// Short-circuit conjunction of two children.
    And,
    /// Short-circuit disjunction of two children.
    Or,
    /// Exclusive or of two children.
    Xor,
    /// `if first { second } else { third }`.
    IfElse,
}

impl Op {
    /// Stable numeric encoding.
    pub fn to_raw(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Eq => 1,
            Self::Neq => 2,
            Self::Gt => 3,
            Self::Lt => 4,
            Self::Gte => 5,
            Self::Lte => 6,
            Self::Ret => 7,
            Self::Not => 8,
            Self::And => 9,
            Self::Or => 10,
            Self::Xor => 11,
            Self::IfElse => 12,
        }
    }

    /// Decode a raw operator.
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::None,
            1 => Self::Eq,
            2 => Self::Neq,
            3 => Self::Gt,
            4 => Self::Lt,
            5 => Self::Gte,
            6 => Self::Lte,
            7 => Self::Ret,
            8 => Self::Not,
            9 => Self::And,
            10 => Self::Or,
            11 => Self::Xor,
            12 => Self::IfElse,
            _ => return None,
        })
    }

    /// Whether this operator combines child nodes.
    pub fn is_logic(self) -> bool {
        matches!(
            self,
            Self::Not | Self::And | Self::Or | Self::Xor | Self::IfElse
        )
    }

    /// Number of children a logic operator takes (0 for comparisons).
    pub fn arity(self) -> usize {
        match self {
            Self::Not => 1,
            Self::And | Self::Or | Self::Xor => 2,
            Self::IfElse => 3,
            _ => 0,
        }
    }
}

/// One node of a stored predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    /// Source of the left-hand value.
    pub id: ParamId,
    /// Operator.
    pub op: Op,
    /// Right-hand value, oracle address, or packed child indices.
    pub value: Word,
}

impl Param {
    /// A comparison leaf.
    pub fn new(id: ParamId, op: Op, value: Word) -> Self {
        Self { id, op, value }
    }

    /// A logic node over the given child indices (unused slots are 0).
    pub fn logic(op: Op, first: u32, second: u32, third: u32) -> Self {
        Self {
            id: ParamId::LogicOp,
            op,
            value: Word::pack_u32s(first, second, third),
        }
    }

    /// Child index in `slot` (0, 1 or 2) of a logic node.
    pub fn child(&self, slot: usize) -> Option<usize> {
        self.value
            .u32_at(slot)
            .and_then(|v| usize::try_from(v).ok())
    }

    /// Canonical 34-byte encoding: id, op, value.
    pub fn encode(&self) -> [u8; 34] {
        let mut out = [0u8; 34];
        out[0] = self.id.to_raw();
        out[1] = self.op.to_raw();
        out[2..].copy_from_slice(self.value.as_bytes());
        out
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:?} {}", self.id, self.op, self.value)
    }
}

/// Content hash of a param list.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamsHash(#[serde(with = "hex_bytes")] [u8; 32]);

impl ParamsHash {
    /// Wrap raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ParamsHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl std::str::FromStr for ParamsHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s.trim_start_matches("0x"), &mut out)?;
        Ok(Self(out))
    }
}

impl fmt::Debug for ParamsHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParamsHash({})", hex::encode(&self.0[..6]))
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let raw = hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        raw.as_slice()
            .try_into()
            .map_err(|_| serde::de::Error::custom("params hash must be 32 bytes"))
    }
}

/// Hash of the canonical encoding of `params`.
pub fn params_hash(params: &[Param]) -> ParamsHash {
    let mut hasher = Sha256::new();
    hasher.update(b"orgkernel.params.v1");
    for p in params {
        hasher.update(p.encode());
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    ParamsHash(out)
}

/// Structural defect in a param list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamsDefect {
    /// The list is empty.
    #[error("predicate has no params")]
    Empty,

    /// The list exceeds the configured maximum.
    #[error("predicate has {len} params, limit is {max}")]
    TooLong {
        /// Number of params supplied.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A node is internally inconsistent.
    #[error("param {index}: {reason}")]
    Node {
        /// Index of the offending param.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },
}

fn defect(index: usize, reason: impl Into<String>) -> ParamsDefect {
    ParamsDefect::Node {
        index,
        reason: reason.into(),
    }
}

/// Check a param list for structural soundness before it is stored.
///
/// Runtime failures that depend on the call (argument count, argument types,
/// oracle answers) are not detectable here and surface during evaluation.
///
/// # Errors
///
/// Returns the first [`ParamsDefect`] found.
pub fn validate(params: &[Param], max_len: usize) -> Result<(), ParamsDefect> {
    if params.is_empty() {
        return Err(ParamsDefect::Empty);
    }
    if params.len() > max_len {
        return Err(ParamsDefect::TooLong {
            len: params.len(),
            max: max_len,
        });
    }

    for (index, param) in params.iter().enumerate() {
        match param.id {
            ParamId::LogicOp => validate_logic(params, index, param)?,
            ParamId::Oracle => {
                if Address::from_word(&param.value).map_or(true, |a| a.is_zero()) {
                    return Err(defect(index, "oracle value is not a module address"));
                }
                if !matches!(param.op, Op::Eq | Op::Neq | Op::Ret) {
                    return Err(defect(index, "oracle result supports eq, neq or ret only"));
                }
            }
            _ => {
                if matches!(param.id, ParamId::Arg(i) if i >= FIRST_RESERVED_ID) {
                    return Err(defect(index, "argument index collides with reserved ids"));
                }
                if param.op.is_logic() {
                    return Err(defect(index, "logic operator on a value node"));
                }
                if param.op == Op::None {
                    return Err(defect(index, "missing operator"));
                }
            }
        }
    }
    Ok(())
}

fn validate_logic(params: &[Param], index: usize, param: &Param) -> Result<(), ParamsDefect> {
    if !param.op.is_logic() {
        return Err(defect(index, "logic node without a logic operator"));
    }
    let arity = param.op.arity();
    for slot in 0..3 {
        let child = param
            .child(slot)
            .ok_or_else(|| defect(index, "unreadable child index"))?;
        if slot < arity {
            if child <= index {
                return Err(defect(index, format!("child {child} does not follow its parent")));
            }
            if child >= params.len() {
                return Err(defect(index, format!("child {child} is out of range")));
            }
        } else if child != 0 {
            return Err(defect(
                index,
                format!("{:?} takes {arity} children", param.op),
            ));
        }
    }
    Ok(())
}
