//! Seed phrase validation.
//!
//! Validation is pure and cheap so it can run on every keystroke. Whether the
//! phrase passes the BIP39 wordlist/checksum test is not decided here: the
//! caller passes in what the last address derivation reported.

use serde::Serialize;

/// Minimum number of words before a phrase is no longer considered short.
///
/// Matches the smallest BIP39 mnemonic.
pub const MIN_WORD_COUNT: usize = 12;

/// Machine-readable classification of a seed phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, uniffi::Enum)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    /// A standard BIP39 recovery phrase.
    Valid,
    /// Nothing was typed.
    Empty,
    /// Leading whitespace or more than one separator between words.
    ExtraWhitespace,
    /// Fewer words than the configured minimum.
    TooShort,
    /// Enough words, but not a BIP39 phrase. Recovered as a legacy brain wallet.
    NotBip39,
}

impl VerdictKind {
    /// User-facing explanation. Empty for [`VerdictKind::Valid`].
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Valid => "",
            Self::Empty => "A seed phrase is required.",
            Self::ExtraWhitespace => "Extra whitespace found.",
            Self::TooShort => {
                "This seed phrase is short; use it for testing or advanced setups only."
            }
            Self::NotBip39 => {
                "This is not a standard recovery phrase; it will be treated as a legacy brain wallet."
            }
        }
    }

    /// Whether the user may continue after acknowledging the risk.
    #[must_use]
    pub const fn allows_recovery_override(self) -> bool {
        matches!(self, Self::ExtraWhitespace | Self::TooShort | Self::NotBip39)
    }
}

/// Outcome of validating a seed phrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, uniffi::Record)]
pub struct ValidationVerdict {
    /// Classification the other fields are derived from.
    pub kind: VerdictKind,
    /// The phrase can be used without asking the user anything.
    pub is_valid: bool,
    /// The last derivation recognised the phrase as a BIP39 mnemonic. Can be
    /// set on an invalid verdict, e.g. a mnemonic typed with a leading space.
    pub is_bip39: bool,
    /// The phrase is invalid but usable once the user accepts the risk.
    pub allows_recovery_override: bool,
    /// Explanation shown to the user. Empty when valid.
    pub reason: String,
}

impl ValidationVerdict {
    fn from_kind(kind: VerdictKind, is_bip39: bool) -> Self {
        let is_valid = kind == VerdictKind::Valid;
        Self {
            kind,
            is_valid,
            is_bip39,
            allows_recovery_override: kind.allows_recovery_override(),
            reason: kind.reason().to_string(),
        }
    }

    /// The verdict shown before anything is typed, and after a failed derivation.
    #[must_use]
    pub fn default_invalid() -> Self {
        Self::from_kind(VerdictKind::Empty, false)
    }

    /// Whether confirming requires an explicit risk acknowledgement.
    #[must_use]
    pub const fn needs_risk_confirmation(&self) -> bool {
        !self.is_valid && self.allows_recovery_override
    }
}

impl Default for ValidationVerdict {
    fn default() -> Self {
        Self::default_invalid()
    }
}

/// Validates `phrase` with an explicit minimum word count.
///
/// Trailing whitespace is ignored, since derivation runs on the phrase with
/// trailing whitespace removed.
#[must_use]
pub fn validate_phrase(
    phrase: &str,
    is_bip39_confirmed: bool,
    min_word_count: usize,
) -> ValidationVerdict {
    let phrase = phrase.trim_end();
    if phrase.is_empty() {
        return ValidationVerdict::default_invalid();
    }
    let verdict = |kind| ValidationVerdict::from_kind(kind, is_bip39_confirmed);

    let irregular_spacing = phrase
        .split(' ')
        .any(|word| word.is_empty() || word.contains(char::is_whitespace));
    if irregular_spacing {
        return verdict(VerdictKind::ExtraWhitespace);
    }

    if phrase.split(' ').count() < min_word_count {
        return verdict(VerdictKind::TooShort);
    }

    if !is_bip39_confirmed {
        return verdict(VerdictKind::NotBip39);
    }

    verdict(VerdictKind::Valid)
}

/// Validates a seed phrase using the default minimum word count.
///
/// `is_bip39_confirmed` is the BIP39 flag reported by the address derivation
/// for this exact phrase.
#[uniffi::export]
#[must_use]
#[allow(clippy::needless_pass_by_value)]
pub fn validate_seed(phrase: String, is_bip39_confirmed: bool) -> ValidationVerdict {
    validate_phrase(&phrase, is_bip39_confirmed, MIN_WORD_COUNT)
}
