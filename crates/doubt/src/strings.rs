//! Operations over immutable string views.
//!
//! Strings are arena-backed views owned by the interner; every operation here
//! reads view bytes and allocates results back into the interner's arena.
//! Equality and hashing work on bytes — interning dedups identical contents,
//! but no operation depends on id identity for correctness.

use std::cmp::Ordering;

use crate::intern::{Interns, StringId};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a, 64-bit. The hash every dict entry memoizes.
pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Natural ordering: runs of ASCII digits compare as integers, everything
/// else compares bytewise. `"file2" < "file10"`, while plain lexicographic
/// ordering would put `"file10"` first.
pub(crate) fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            let run_a = digit_run(a, i);
            let run_b = digit_run(b, j);
            match compare_digit_runs(&a[i..run_a], &b[j..run_b]) {
                Ordering::Equal => {
                    i = run_a;
                    j = run_b;
                }
                unequal => return unequal,
            }
        } else {
            match a[i].cmp(&b[j]) {
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
                unequal => return unequal,
            }
        }
    }
    (a.len() - i).cmp(&(b.len() - j))
}

fn digit_run(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    end
}

/// Compares two digit runs numerically without parsing into an integer, so
/// arbitrarily long runs never overflow.
fn compare_digit_runs(a: &[u8], b: &[u8]) -> Ordering {
    let a = strip_leading_zeros(a);
    let b = strip_leading_zeros(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn strip_leading_zeros(digits: &[u8]) -> &[u8] {
    let first = digits.iter().position(|&d| d != b'0').unwrap_or(digits.len());
    &digits[first..]
}

/// Splits on a separator character, returning views that share the source
/// block (no byte copies — only new interner entries for unseen pieces).
pub(crate) fn split(interns: &mut Interns, id: StringId, separator: char) -> Vec<StringId> {
    let view = interns.view(id);
    let mut pieces = Vec::new();
    let mut start = 0;
    let text = interns.get(id).to_owned();
    for (offset, ch) in text.char_indices() {
        if ch == separator {
            pieces.push(interns.intern_view(view.slice(start, offset - start)));
            start = offset + ch.len_utf8();
        }
    }
    pieces.push(interns.intern_view(view.slice(start, text.len() - start)));
    pieces
}

/// Joins pieces with a separator into a freshly allocated string.
pub(crate) fn join(interns: &mut Interns, pieces: &[StringId], separator: &str) -> StringId {
    let mut out = String::new();
    for (i, &piece) in pieces.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        out.push_str(interns.get(piece));
    }
    interns.intern(&out)
}

/// Substring by character offsets; out-of-range requests clamp to the end.
pub(crate) fn substring(interns: &mut Interns, id: StringId, start: usize, len: usize) -> StringId {
    let text = interns.get(id);
    let byte_start = char_boundary(text, start);
    let byte_end = char_boundary(text, start + len);
    let view = interns.view(id).slice(byte_start, byte_end - byte_start);
    interns.intern_view(view)
}

fn char_boundary(text: &str, chars: usize) -> usize {
    text.char_indices().nth(chars).map_or(text.len(), |(offset, _)| offset)
}

pub(crate) fn to_upper(interns: &mut Interns, id: StringId) -> StringId {
    let upper = interns.get(id).to_uppercase();
    interns.intern(&upper)
}

pub(crate) fn to_lower(interns: &mut Interns, id: StringId) -> StringId {
    let lower = interns.get(id).to_lowercase();
    interns.intern(&lower)
}

pub(crate) fn trim(interns: &mut Interns, id: StringId) -> StringId {
    let (start, len) = {
        let text = interns.get(id);
        let trimmed = text.trim();
        (trimmed.as_ptr() as usize - text.as_ptr() as usize, trimmed.len())
    };
    let view = interns.view(id).slice(start, len);
    interns.intern_view(view)
}

/// Character index of the first occurrence of `needle`, or `None`.
pub(crate) fn find(haystack: &str, needle: &str) -> Option<usize> {
    let byte_index = haystack.find(needle)?;
    Some(haystack[..byte_index].chars().count())
}

pub(crate) fn replace_char(interns: &mut Interns, id: StringId, from: char, to: char) -> StringId {
    let replaced: String = interns
        .get(id)
        .chars()
        .map(|ch| if ch == from { to } else { ch })
        .collect();
    interns.intern(&replaced)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv_is_deterministic_on_identical_bytes() {
        let a = String::from("observation");
        let b = format!("{}{}", "observ", "ation");
        assert_eq!(fnv1a(a.as_bytes()), fnv1a(b.as_bytes()));
        assert_ne!(fnv1a(b"observation"), fnv1a(b"observatioN"));
    }

    #[test]
    fn fnv_empty_is_offset_basis() {
        assert_eq!(fnv1a(b""), FNV_OFFSET);
    }

    #[test]
    fn natural_ordering_compares_digit_runs_numerically() {
        assert_eq!(natural_cmp("file2", "file10"), Ordering::Less);
        assert_eq!(natural_cmp("file10", "file2"), Ordering::Greater);
        assert_eq!(natural_cmp("a07", "a7"), Ordering::Equal);
        assert_eq!(natural_cmp("abc", "abd"), Ordering::Less);
        assert_eq!(natural_cmp("x", "x1"), Ordering::Less);
    }

    #[test]
    fn split_shares_source_memory() {
        let mut interns = Interns::new();
        let id = interns.intern("a,bb,ccc");
        let pieces = split(&mut interns, id, ',');
        let texts: Vec<&str> = pieces.iter().map(|&p| interns.get(p)).collect();
        assert_eq!(texts, ["a", "bb", "ccc"]);
    }

    #[test]
    fn split_keeps_empty_pieces() {
        let mut interns = Interns::new();
        let id = interns.intern(",x,");
        let pieces = split(&mut interns, id, ',');
        let texts: Vec<&str> = pieces.iter().map(|&p| interns.get(p)).collect();
        assert_eq!(texts, ["", "x", ""]);
    }

    #[test]
    fn join_round_trips_split() {
        let mut interns = Interns::new();
        let id = interns.intern("one:two:three");
        let pieces = split(&mut interns, id, ':');
        let joined = join(&mut interns, &pieces, ":");
        assert_eq!(interns.get(joined), "one:two:three");
    }

    #[test]
    fn trim_and_case_ops() {
        let mut interns = Interns::new();
        let id = interns.intern("  Doubt  ");
        let trimmed = trim(&mut interns, id);
        assert_eq!(interns.get(trimmed), "Doubt");
        let upper = to_upper(&mut interns, trimmed);
        assert_eq!(interns.get(upper), "DOUBT");
        let lower = to_lower(&mut interns, trimmed);
        assert_eq!(interns.get(lower), "doubt");
    }

    #[test]
    fn find_reports_character_offsets() {
        assert_eq!(find("hello world", "world"), Some(6));
        assert_eq!(find("hello", "xyz"), None);
    }

    #[test]
    fn replace_char_touches_every_occurrence() {
        let mut interns = Interns::new();
        let id = interns.intern("a-b-c");
        let replaced = replace_char(&mut interns, id, '-', '_');
        assert_eq!(interns.get(replaced), "a_b_c");
    }

    #[test]
    fn substring_clamps_to_end() {
        let mut interns = Interns::new();
        let id = interns.intern("doubt");
        let sub = substring(&mut interns, id, 1, 3);
        assert_eq!(interns.get(sub), "oub");
        let tail = substring(&mut interns, id, 3, 100);
        assert_eq!(interns.get(tail), "bt");
    }
}
