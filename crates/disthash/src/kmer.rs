//! DNA k-mers and the extension records stored in the table.
//!
//! A [`Kmer`] is packed two bits per base so that keys stay fixed-size on
//! the wire and in the slot array. A [`KmerPair`] is the entry type of the
//! assembly pipeline: the k-mer plus the bases observed immediately before
//! and after it in the reads (`F` marks the end of a fragment).

use crate::key::{mix64, TableEntry, TableKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Longest k-mer that fits the packed representation.
pub const MAX_KMER_LEN: usize = 64;

/// Extension marker for "no neighbouring base".
pub const FRAGMENT_END: u8 = b'F';

/// Errors produced while parsing k-mers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KmerError {
    #[error("k-mer length {0} is outside 1..=64")]
    InvalidLength(usize),

    #[error("invalid base {0:?}")]
    InvalidBase(char),

    #[error("malformed k-mer record: {0:?}")]
    Malformed(String),
}

fn encode(base: u8) -> Result<u128, KmerError> {
    match base.to_ascii_uppercase() {
        b'A' => Ok(0),
        b'C' => Ok(1),
        b'G' => Ok(2),
        b'T' => Ok(3),
        other => Err(KmerError::InvalidBase(other as char)),
    }
}

fn decode(code: u128) -> char {
    match code & 0b11 {
        0 => 'A',
        1 => 'C',
        2 => 'G',
        _ => 'T',
    }
}

fn mask(len: usize) -> u128 {
    if len >= MAX_KMER_LEN {
        u128::MAX
    } else {
        (1u128 << (2 * len)) - 1
    }
}

/// A DNA k-mer of fixed length, two bits per base, first base most significant.
///
/// Deserialization re-checks the length and that no bits are set above it,
/// so a record off the wire is as valid as a parsed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawKmer")]
pub struct Kmer {
    packed: u128,
    len: u8,
}

#[derive(Deserialize)]
struct RawKmer {
    packed: u128,
    len: u8,
}

impl TryFrom<RawKmer> for Kmer {
    type Error = KmerError;

    fn try_from(raw: RawKmer) -> Result<Self, Self::Error> {
        let len = usize::from(raw.len);
        Kmer::check_len(len)?;
        if raw.packed & !mask(len) != 0 {
            return Err(KmerError::Malformed(format!(
                "packed value {:#x} exceeds {} bases",
                raw.packed, len
            )));
        }
        Ok(Self {
            packed: raw.packed,
            len: raw.len,
        })
    }
}

impl Kmer {
    /// Fail unless `len` is a representable k-mer length.
    pub fn check_len(len: usize) -> Result<(), KmerError> {
        if len == 0 || len > MAX_KMER_LEN {
            return Err(KmerError::InvalidLength(len));
        }
        Ok(())
    }

    /// Pack a k-mer from its ASCII bases.
    pub fn from_bases(bases: &[u8]) -> Result<Self, KmerError> {
        Self::check_len(bases.len())?;
        let mut packed = 0u128;
        for &b in bases {
            packed = (packed << 2) | encode(b)?;
        }
        Ok(Self {
            packed,
            len: bases.len() as u8,
        })
    }

    /// Number of bases.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Always false; zero-length k-mers cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base at `index`, or `None` past the end.
    pub fn base(&self, index: usize) -> Option<char> {
        if index >= self.len() {
            return None;
        }
        let shift = 2 * (self.len() - 1 - index);
        Some(decode(self.packed >> shift))
    }

    /// The k-mer obtained by dropping the first base and appending `base`.
    pub fn shift_in(&self, base: u8) -> Result<Self, KmerError> {
        let packed = ((self.packed << 2) | encode(base)?) & mask(self.len());
        Ok(Self {
            packed,
            len: self.len,
        })
    }
}

impl TableKey for Kmer {
    fn table_hash(&self) -> u64 {
        let hi = (self.packed >> 64) as u64;
        let lo = self.packed as u64;
        mix64(lo ^ mix64(hi ^ u64::from(self.len)))
    }
}

impl FromStr for Kmer {
    type Err = KmerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bases(s.trim().as_bytes())
    }
}

impl fmt::Display for Kmer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.len() {
            let shift = 2 * (self.len() - 1 - i);
            write!(f, "{}", decode(self.packed >> shift))?;
        }
        Ok(())
    }
}

/// A k-mer together with its backward and forward extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawKmerPair")]
pub struct KmerPair {
    pub kmer: Kmer,
    backward: u8,
    forward: u8,
}

#[derive(Deserialize)]
struct RawKmerPair {
    kmer: Kmer,
    backward: u8,
    forward: u8,
}

impl TryFrom<RawKmerPair> for KmerPair {
    type Error = KmerError;

    fn try_from(raw: RawKmerPair) -> Result<Self, Self::Error> {
        KmerPair::new(raw.kmer, raw.backward, raw.forward)
    }
}

fn check_ext(ext: u8) -> Result<u8, KmerError> {
    let ext = ext.to_ascii_uppercase();
    match ext {
        b'A' | b'C' | b'G' | b'T' | FRAGMENT_END => Ok(ext),
        other => Err(KmerError::InvalidBase(other as char)),
    }
}

impl KmerPair {
    /// Build a record; extensions must be a base or `F`.
    pub fn new(kmer: Kmer, backward: u8, forward: u8) -> Result<Self, KmerError> {
        Ok(Self {
            kmer,
            backward: check_ext(backward)?,
            forward: check_ext(forward)?,
        })
    }

    pub fn backward_ext(&self) -> char {
        self.backward as char
    }

    pub fn forward_ext(&self) -> char {
        self.forward as char
    }

    /// Whether this k-mer begins a contig (nothing precedes it).
    pub fn is_start(&self) -> bool {
        self.backward == FRAGMENT_END
    }

    /// Whether this k-mer ends a contig.
    pub fn is_end(&self) -> bool {
        self.forward == FRAGMENT_END
    }

    /// The k-mer that follows this one, or `None` at a fragment end.
    pub fn next_kmer(&self) -> Option<Kmer> {
        if self.is_end() {
            return None;
        }
        self.kmer.shift_in(self.forward).ok()
    }
}

impl TableEntry for KmerPair {
    type Key = Kmer;

    fn key(&self) -> &Kmer {
        &self.kmer
    }
}

impl FromStr for KmerPair {
    type Err = KmerError;

    /// Parses `"<bases> <backward><forward>"`, e.g. `"ACGTA GF"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split_whitespace();
        let (Some(kmer), Some(ext), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(KmerError::Malformed(s.to_string()));
        };
        let ext = ext.as_bytes();
        if ext.len() != 2 {
            return Err(KmerError::Malformed(s.to_string()));
        }
        Self::new(kmer.parse()?, ext[0], ext[1])
    }
}

impl fmt::Display for KmerPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}{}", self.kmer, self.backward_ext(), self.forward_ext())
    }
}
