//! Account names: up to 13 characters packed into a `u64`.
//!
//! The first 12 characters use 5 bits each from the most significant end;
//! the 13th only has the 4 lowest bits left, so it is limited to `.1-5a-j`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error;

const CHARMAP: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";
const MAX_NAME_LENGTH: usize = 13;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("name '{0}' is longer than 13 characters")]
    TooLong(String),

    #[error("invalid character '{character}' in name '{name}'")]
    InvalidCharacter { name: String, character: char },
}

/// An account name, ordered by its numeric value.
#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountName(u64);

impl AccountName {
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

fn symbol(name: &str, c: char) -> Result<u64, NameError> {
    match c {
        '.' => Ok(0),
        '1'..='5' => Ok(c as u64 - '1' as u64 + 1),
        'a'..='z' => Ok(c as u64 - 'a' as u64 + 6),
        _ => Err(NameError::InvalidCharacter {
            name: name.to_string(),
            character: c,
        }),
    }
}

impl FromStr for AccountName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.chars().count() > MAX_NAME_LENGTH {
            return Err(NameError::TooLong(s.to_string()));
        }

        let mut value = 0u64;
        for (i, c) in s.chars().enumerate() {
            let sym = symbol(s, c)?;
            if i < 12 {
                value |= (sym & 0x1f) << (64 - 5 * (i + 1));
            } else {
                if sym > 0x0f {
                    return Err(NameError::InvalidCharacter {
                        name: s.to_string(),
                        character: c,
                    });
                }
                value |= sym;
            }
        }
        Ok(Self(value))
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chars = [b'.'; MAX_NAME_LENGTH];
        let mut tmp = self.0;
        for i in 0..MAX_NAME_LENGTH {
            let (mask, shift) = if i == 0 { (0x0f, 4) } else { (0x1f, 5) };
            chars[MAX_NAME_LENGTH - 1 - i] = CHARMAP[(tmp & mask) as usize];
            tmp >>= shift;
        }
        let trimmed = std::str::from_utf8(&chars).unwrap_or_default().trim_end_matches('.');
        f.write_str(trimmed)
    }
}

impl fmt::Debug for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountName({self})")
    }
}

impl Serialize for AccountName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AccountName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl<C> minicbor::Encode<C> for AccountName {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.u64(self.0)?.ok()
    }
}

impl<'a, C> minicbor::Decode<'a, C> for AccountName {
    fn decode(d: &mut minicbor::Decoder<'a>, _ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(Self(d.u64()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("eosio")]
    #[test_case("eosio.token")]
    #[test_case("a")]
    #[test_case("zzzzzzzzzzzzj")]
    #[test_case("")]
    fn test_round_trips(name: &str) {
        let parsed: AccountName = name.parse().unwrap();
        assert_eq!(parsed.to_string(), name);
    }

    #[test]
    fn test_eosio_known_value() {
        let eosio: AccountName = "eosio".parse().unwrap();
        assert_eq!(eosio.as_u64(), 0x5530_ea00_0000_0000);
    }

    #[test]
    fn test_ordering_follows_numeric_value() {
        let a: AccountName = "alice".parse().unwrap();
        let b: AccountName = "bob".parse().unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_rejects_bad_names() {
        assert!(matches!(
            "Upper".parse::<AccountName>(),
            Err(NameError::InvalidCharacter { character: 'U', .. })
        ));
        assert!(matches!("abcdefghijklmn".parse::<AccountName>(), Err(NameError::TooLong(_))));
        // 13th character must fit in 4 bits
        assert!("zzzzzzzzzzzzz".parse::<AccountName>().is_err());
    }
}
