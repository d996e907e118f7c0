use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, ShelfError};

/// Longest custom comparator name that fits in the file metadata.
pub const MAX_COMPARATOR_NAME: usize = 63;

pub type CompareFn = dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync;

/// Caller-supplied total order, identified by name in the file metadata.
///
/// The name is what ties a file to its ordering: reopening a file created
/// with a custom comparator requires a comparator of the same name.
#[derive(Clone)]
pub struct CustomComparator {
    name: String,
    func: Arc<CompareFn>,
}

impl CustomComparator {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[u8], &[u8]) -> Ordering + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CustomComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomComparator")
            .field("name", &self.name)
            .finish()
    }
}

/// Key ordering of a B-tree database.
#[derive(Debug, Clone, Default)]
pub enum Comparator {
    /// Byte-wise lexical order.
    #[default]
    Lexical,
    /// Keys are decimal number strings, e.g. `"-12.5"`.
    Decimal,
    /// Keys are 4-byte little-endian signed integers.
    Int32,
    /// Keys are 8-byte little-endian signed integers.
    Int64,
    Custom(CustomComparator),
}

impl Comparator {
    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[u8], &[u8]) -> Ordering + Send + Sync + 'static,
    {
        Comparator::Custom(CustomComparator::new(name, func))
    }

    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            Comparator::Lexical => a.cmp(b),
            Comparator::Decimal => compare_decimal(a, b),
            Comparator::Int32 => compare_int::<4>(a, b),
            Comparator::Int64 => compare_int::<8>(a, b),
            Comparator::Custom(custom) => (custom.func)(a, b),
        }
    }

    pub fn is_lexical(&self) -> bool {
        matches!(self, Comparator::Lexical)
    }

    pub(crate) fn tag(&self) -> u8 {
        match self {
            Comparator::Lexical => 0,
            Comparator::Decimal => 1,
            Comparator::Int32 => 2,
            Comparator::Int64 => 3,
            Comparator::Custom(_) => 4,
        }
    }

    pub(crate) fn name(&self) -> &str {
        match self {
            Comparator::Custom(custom) => custom.name(),
            _ => "",
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Comparator::Custom(custom) = self {
            if custom.name.is_empty() || custom.name.len() > MAX_COMPARATOR_NAME {
                return Err(ShelfError::Invalid(
                    "custom comparator name must be 1 to 63 bytes",
                ));
            }
        }
        Ok(())
    }

    /// Comparator to use with a file whose metadata records `tag` and `name`.
    ///
    /// Built-in orderings are taken from the file; a custom ordering must be
    /// supplied again under the same name.
    pub(crate) fn reconcile(self, tag: u8, name: &str) -> Result<Comparator> {
        let stored = match tag {
            0 => Comparator::Lexical,
            1 => Comparator::Decimal,
            2 => Comparator::Int32,
            3 => Comparator::Int64,
            4 => {
                return match self {
                    Comparator::Custom(custom) if custom.name == name => {
                        Ok(Comparator::Custom(custom))
                    }
                    _ => Err(ShelfError::Meta(
                        "file requires the custom comparator it was created with",
                    )),
                }
            }
            _ => return Err(ShelfError::Meta("unknown comparator tag")),
        };

        match self {
            Comparator::Lexical => Ok(stored),
            ref supplied if supplied.tag() == tag => Ok(stored),
            _ => Err(ShelfError::Meta("comparator differs from the one in the file")),
        }
    }
}

fn compare_int<const N: usize>(a: &[u8], b: &[u8]) -> Ordering {
    match (decode_int::<N>(a), decode_int::<N>(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

fn decode_int<const N: usize>(raw: &[u8]) -> Option<i64> {
    if raw.len() != N {
        return None;
    }
    let mut buf = [0u8; 8];
    buf[..N].copy_from_slice(raw);
    Some(match N {
        4 => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as i64,
        _ => i64::from_le_bytes(buf),
    })
}

/// Sign, integer digits without leading zeros, fraction digits without trailing zeros.
struct Decimal<'a> {
    negative: bool,
    int: &'a [u8],
    frac: &'a [u8],
}

impl<'a> Decimal<'a> {
    fn parse(raw: &'a [u8]) -> Self {
        let mut rest = raw;
        while let [b' ' | b'\t', tail @ ..] = rest {
            rest = tail;
        }
        let mut negative = false;
        if let [sign @ (b'-' | b'+'), tail @ ..] = rest {
            negative = *sign == b'-';
            rest = tail;
        }

        let int_len = rest.iter().take_while(|b| b.is_ascii_digit()).count();
        let mut int = &rest[..int_len];
        while let [b'0', tail @ ..] = int {
            int = tail;
        }
        rest = &rest[int_len..];

        let mut frac: &[u8] = &[];
        if let [b'.', tail @ ..] = rest {
            let frac_len = tail.iter().take_while(|b| b.is_ascii_digit()).count();
            frac = &tail[..frac_len];
            while let [head @ .., b'0'] = frac {
                frac = head;
            }
        }

        let zero = int.is_empty() && frac.is_empty();
        Decimal {
            negative: negative && !zero,
            int,
            frac,
        }
    }

    fn magnitude_cmp(&self, other: &Self) -> Ordering {
        self.int
            .len()
            .cmp(&other.int.len())
            .then_with(|| self.int.cmp(other.int))
            .then_with(|| self.frac.cmp(other.frac))
    }
}

fn compare_decimal(a: &[u8], b: &[u8]) -> Ordering {
    let x = Decimal::parse(a);
    let y = Decimal::parse(b);
    let numeric = match (x.negative, y.negative) {
        (false, true) => Ordering::Greater,
        (true, false) => Ordering::Less,
        (false, false) => x.magnitude_cmp(&y),
        (true, true) => y.magnitude_cmp(&x),
    };
    numeric.then_with(|| a.cmp(b))
}
