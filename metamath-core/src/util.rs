//! Support functions that don't belong anywhere else.

use fnv::FnvHasher;
use std::collections;
use std::hash::BuildHasherDefault;

/// Type alias for hashmaps to allow swapping out the implementation.
pub(crate) type HashMap<K, V> = collections::HashMap<K, V, BuildHasherDefault<FnvHasher>>;
/// Type alias for hashsets to allow swapping out the implementation.
pub(crate) type HashSet<K> = collections::HashSet<K, BuildHasherDefault<FnvHasher>>;

/// Returns true if the given string is a valid label.
///
/// Labels are made of letters, digits, and the characters `-`, `_` and `.`.
#[must_use]
pub fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || c == b'.' || c == b'-' || c == b'_')
}

/// Returns true if the given string can be used as a math symbol.
///
/// Math symbols are runs of printable ASCII characters which do not contain `$`.
#[must_use]
pub fn is_valid_math_symbol(symbol: &str) -> bool {
    !symbol.is_empty() && symbol.bytes().all(|c| c.is_ascii_graphic() && c != b'$')
}

/// Returns true for the whitespace characters allowed in Metamath files:
/// space, TAB, LF, FF and CR.
#[inline]
pub(crate) const fn is_mm_space(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\n' | b'\x0c' | b'\r')
}

/// Inserts into a sorted vector, keeping it sorted and free of duplicates.
/// Returns false if the element was already present.
pub(crate) fn sorted_insert<T: Ord>(vec: &mut Vec<T>, item: T) -> bool {
    match vec.binary_search(&item) {
        Ok(_) => false,
        Err(pos) => {
            vec.insert(pos, item);
            true
        }
    }
}

/// Orders a pair so that the smaller element comes first.
#[inline]
pub(crate) fn ordered_pair<T: Ord>(a: T, b: T) -> (T, T) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
