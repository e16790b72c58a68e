//! Shared identity and value types.
//!
//! Addresses identify entities and modules. Roles, app ids and namespaces are
//! 32-byte identifiers derived from human-readable names with SHA-256.
//! [`Word`] is the 256-bit unsigned value that predicates compare.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// Error returned when parsing an address, word or identifier from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The input is not valid hexadecimal.
    #[error("invalid hex in {input:?}")]
    InvalidHex {
        /// The rejected input.
        input: String,
    },

    /// The decoded value has the wrong byte length.
    #[error("expected {expected} bytes, got {actual} in {input:?}")]
    WrongLength {
        /// Required length in bytes.
        expected: usize,
        /// Decoded length in bytes.
        actual: usize,
        /// The rejected input.
        input: String,
    },

    /// The input is not a decimal number that fits in 128 bits.
    #[error("invalid number {input:?}")]
    InvalidNumber {
        /// The rejected input.
        input: String,
    },
}

fn decode_hex(input: &str) -> Result<Vec<u8>, ParseError> {
    let digits = input.strip_prefix("0x").unwrap_or(input);
    // Odd-length values are left-padded with a zero nibble.
    let padded = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_owned()
    };
    hex::decode(padded).map_err(|_| ParseError::InvalidHex {
        input: input.to_owned(),
    })
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte identity for an entity or a module.
///
/// The all-zero address is the null address: it never identifies a real
/// entity and is what registry reads return for unset keys.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// The null address.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Wrap raw bytes.
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Deterministic address for a human-readable label (first 20 bytes of
    /// `sha256("entity:" || label)`).
    pub fn from_label(label: &str) -> Self {
        let digest = sha256(format!("entity:{label}").as_bytes());
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[..20]);
        Self(out)
    }

    /// Address of the `nonce`-th module created by `deployer`.
    pub fn derive(deployer: Address, nonce: u64) -> Self {
        let mut preimage = Vec::with_capacity(28);
        preimage.extend_from_slice(&deployer.0);
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let digest = sha256(&preimage);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[12..]);
        Self(out)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Whether this is the null address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Left-padded 256-bit representation.
    pub fn to_word(&self) -> Word {
        let mut out = [0u8; 32];
        out[12..].copy_from_slice(&self.0);
        Word(out)
    }

    /// Recover an address from a word whose upper 12 bytes are zero.
    pub fn from_word(word: &Word) -> Option<Self> {
        if word.0[..12].iter().any(|b| *b != 0) {
            return None;
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&word.0[12..]);
        Some(Self(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_hex(s)?;
        let arr: [u8; 20] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ParseError::WrongLength {
                expected: 20,
                actual: bytes.len(),
                input: s.to_owned(),
            })?;
        Ok(Self(arr))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Word
// ---------------------------------------------------------------------------

/// A 256-bit unsigned big-endian value.
///
/// Byte-wise ordering of a fixed-width big-endian array is numeric ordering,
/// so the derived `Ord` compares words as numbers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Word([u8; 32]);

impl Word {
    /// Zero.
    pub const ZERO: Word = Word([0u8; 32]);

    /// Wrap raw big-endian bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw big-endian bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether the value is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Left-pad up to 32 bytes into a word. Returns `None` for longer input.
    pub fn from_be_slice(bytes: &[u8]) -> Option<Self> {
        let offset = 32usize.checked_sub(bytes.len())?;
        let mut out = [0u8; 32];
        out[offset..].copy_from_slice(bytes);
        Some(Self(out))
    }

    /// The value as `u128` when it fits.
    pub fn as_u128(&self) -> Option<u128> {
        if self.0[..16].iter().any(|b| *b != 0) {
            return None;
        }
        let mut low = [0u8; 16];
        low.copy_from_slice(&self.0[16..]);
        Some(u128::from_be_bytes(low))
    }

    /// Read the big-endian `u32` stored at slot `slot` (0 = lowest 4 bytes).
    pub fn u32_at(&self, slot: usize) -> Option<u32> {
        let end = 32usize.checked_sub(slot.checked_mul(4)?)?;
        let start = end.checked_sub(4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.0[start..end]);
        Some(u32::from_be_bytes(buf))
    }

    /// Pack up to three `u32` values into the low 12 bytes.
    pub fn pack_u32s(first: u32, second: u32, third: u32) -> Self {
        let mut out = [0u8; 32];
        out[28..32].copy_from_slice(&first.to_be_bytes());
        out[24..28].copy_from_slice(&second.to_be_bytes());
        out[20..24].copy_from_slice(&third.to_be_bytes());
        Self(out)
    }
}

impl From<u64> for Word {
    fn from(value: u64) -> Self {
        Self::from(u128::from(value))
    }
}

impl From<u128> for Word {
    fn from(value: u128) -> Self {
        let mut out = [0u8; 32];
        out[16..].copy_from_slice(&value.to_be_bytes());
        Self(out)
    }
}

impl From<bool> for Word {
    fn from(value: bool) -> Self {
        Self::from(u64::from(value))
    }
}

impl From<Address> for Word {
    fn from(value: Address) -> Self {
        value.to_word()
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_u128() {
            Some(n) => write!(f, "{n}"),
            None => write!(f, "0x{}", hex::encode(self.0)),
        }
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Word({self})")
    }
}

impl FromStr for Word {
    type Err = ParseError;

    /// Accepts `0x`-prefixed hex (up to 32 bytes) or a decimal `u128`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("0x") {
            let bytes = decode_hex(s)?;
            return Self::from_be_slice(&bytes).ok_or(ParseError::WrongLength {
                expected: 32,
                actual: bytes.len(),
                input: s.to_owned(),
            });
        }
        s.parse::<u128>()
            .map(Self::from)
            .map_err(|_| ParseError::InvalidNumber {
                input: s.to_owned(),
            })
    }
}

impl Serialize for Word {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct WordVisitor;

impl Visitor<'_> for WordVisitor {
    type Value = Word;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer, a decimal string or a 0x-prefixed hex string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Word, E> {
        Ok(Word::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Word, E> {
        u64::try_from(v)
            .map(Word::from)
            .map_err(|_| E::custom("negative values are not words"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Word, E> {
        v.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Word {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(WordVisitor)
    }
}

// ---------------------------------------------------------------------------
// Named 32-byte identifiers
// ---------------------------------------------------------------------------

macro_rules! named_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Identifier derived from a human-readable name.
            pub fn named(name: &str) -> Self {
                Self(sha256(name.as_bytes()))
            }

            /// Wrap raw bytes.
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Raw bytes.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// The identifier as a predicate argument.
            pub fn to_word(&self) -> Word {
                Word(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(&self.0[..6]))
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = decode_hex(s)?;
                let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                    ParseError::WrongLength {
                        expected: 32,
                        actual: bytes.len(),
                        input: s.to_owned(),
                    }
                })?;
                Ok(Self(arr))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

named_id!(
    /// A module-scoped capability identifier.
    RoleId
);
named_id!(
    /// Identifies a kind of app (module) in the registry.
    AppId
);
named_id!(
    /// A registry partition.
    NamespaceId
);

// ---------------------------------------------------------------------------
// Call arguments
// ---------------------------------------------------------------------------

/// A raw call argument as seen by permission predicates and module code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ArgValue {
    /// Unsigned integer.
    Uint(Word),
    /// An entity or module address.
    Address(Address),
    /// A boolean flag.
    Bool(bool),
    /// Opaque bytes.
    Bytes(Vec<u8>),
}

impl ArgValue {
    /// Coerce to a numeric word for comparison.
    ///
    /// # Errors
    ///
    /// Returns a short reason when the value has no numeric interpretation
    /// (booleans, byte strings longer than 32 bytes).
    pub fn as_number(&self) -> Result<Word, &'static str> {
        match self {
            Self::Uint(w) => Ok(*w),
            Self::Address(a) => Ok(a.to_word()),
            Self::Bool(_) => Err("boolean argument is not numeric"),
            Self::Bytes(b) => Word::from_be_slice(b).ok_or("byte argument longer than 32 bytes"),
        }
    }

    /// Truthiness: non-zero numbers, `true`, non-empty bytes.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Uint(w) => !w.is_zero(),
            Self::Address(a) => !a.is_zero(),
            Self::Bool(b) => *b,
            Self::Bytes(b) => b.iter().any(|x| *x != 0),
        }
    }
}

impl From<u64> for ArgValue {
    fn from(value: u64) -> Self {
        Self::Uint(Word::from(value))
    }
}

impl From<Word> for ArgValue {
    fn from(value: Word) -> Self {
        Self::Uint(value)
    }
}

impl From<Address> for ArgValue {
    fn from(value: Address) -> Self {
        Self::Address(value)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<AppId> for ArgValue {
    fn from(value: AppId) -> Self {
        Self::Uint(value.to_word())
    }
}

impl From<NamespaceId> for ArgValue {
    fn from(value: NamespaceId) -> Self {
        Self::Uint(value.to_word())
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint(w) => write!(f, "{w}"),
            Self::Address(a) => write!(f, "{a}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
        }
    }
}
