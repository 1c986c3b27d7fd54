use alloy_primitives::U256;

/// Literal value as written in the source.
///
/// Every literal denotes one 256-bit word; `word()` computes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiteralValue {
    Number(U256),
    Hex(U256),
    Bool(bool),
    /// Raw bytes, left-aligned in a word when used as a value.
    String(Vec<u8>),
}

impl LiteralValue {
    /// The 256-bit word this literal denotes, `None` for strings longer than
    /// 32 bytes.
    pub fn word(&self) -> Option<U256> {
        match self {
            LiteralValue::Number(n) | LiteralValue::Hex(n) => Some(*n),
            LiteralValue::Bool(b) => Some(if *b { U256::from(1) } else { U256::ZERO }),
            LiteralValue::String(s) => string_word(s),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.word() == Some(U256::ZERO)
    }
}

impl std::fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiteralValue::Number(n) => write!(f, "{}", n),
            LiteralValue::Hex(n) => write!(f, "{:#x}", n),
            LiteralValue::Bool(b) => write!(f, "{}", b),
            LiteralValue::String(s) => write!(f, "\"{}\"", s.escape_ascii()),
        }
    }
}

/// Packs `s` into a word, first byte most significant, zero padded on the
/// right.
pub fn string_word(bytes: &[u8]) -> Option<U256> {
    if bytes.len() > 32 {
        return None;
    }
    let mut word = [0u8; 32];
    word[..bytes.len()].copy_from_slice(bytes);
    Some(U256::from_be_bytes(word))
}

/// Narrows a word to `u64` when it fits.
pub fn word_to_u64(value: U256) -> Option<u64> {
    let limbs = value.as_limbs();
    if limbs[1..].iter().all(|limb| *limb == 0) {
        Some(limbs[0])
    } else {
        None
    }
}
