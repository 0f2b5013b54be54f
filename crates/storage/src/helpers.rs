//! Small lookup helpers shared by the entity accessors.

use std::collections::HashMap;

/// Find a value whose key equals `id` exactly, or failing that, whose key
/// starts with `id` (a unique-prefix lookup, the way git commit hashes are
/// usually looked up). Returns `None` on an ambiguous prefix (more than one
/// match).
pub fn find_by_prefix<'a, T>(map: &'a HashMap<String, T>, id: &str) -> Option<&'a T> {
    if let Some(v) = map.get(id) {
        return Some(v);
    }
    let mut matches = map.iter().filter(|(k, _)| k.starts_with(id));
    let first = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    Some(first.1)
}

/// The lowest positive integer not present in `used`.
pub fn lowest_unused(mut used: Vec<u32>) -> u32 {
    used.sort_unstable();
    let mut candidate = 1u32;
    for n in used {
        if n == candidate {
            candidate += 1;
        } else if n > candidate {
            break;
        }
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_unused_fills_gaps() {
        assert_eq!(lowest_unused(vec![]), 1);
        assert_eq!(lowest_unused(vec![1]), 2);
        assert_eq!(lowest_unused(vec![1, 3]), 2);
        assert_eq!(lowest_unused(vec![1, 2, 3]), 4);
        assert_eq!(lowest_unused(vec![3, 1, 2]), 4);
    }

    #[test]
    fn find_by_prefix_exact_match_wins() {
        let mut map = HashMap::new();
        map.insert("abc".to_string(), 1);
        map.insert("abcd".to_string(), 2);
        assert_eq!(find_by_prefix(&map, "abc"), Some(&1));
    }

    #[test]
    fn find_by_prefix_unique_prefix() {
        let mut map = HashMap::new();
        map.insert("abcd".to_string(), 2);
        assert_eq!(find_by_prefix(&map, "ab"), Some(&2));
    }

    #[test]
    fn find_by_prefix_ambiguous_is_none() {
        let mut map = HashMap::new();
        map.insert("abcd".to_string(), 1);
        map.insert("abce".to_string(), 2);
        assert_eq!(find_by_prefix(&map, "ab"), None);
    }
}
