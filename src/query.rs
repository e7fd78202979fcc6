use crate::entry::Entry;

/// External query evaluator (spec §6, "out of scope... specified only at
/// their interface"). An embedder implements this to express its own
/// expression language; the engine only ever calls `matches`.
pub trait Query: Send + Sync {
    fn matches(&self, entry: &Entry) -> bool;
    fn matches_everything(&self) -> bool {
        false
    }

    /// A lowercased literal this query narrows on, if any, monotonic in the
    /// sense that appending characters to it can only ever shrink the match
    /// set. The negative-name-cache (§B) uses this to recognize that a query
    /// refining a previously-empty one is still empty, without re-evaluating
    /// it. `None` opts a query out of the cache entirely.
    fn negative_cache_key(&self) -> Option<String> {
        None
    }
}

/// `query.matches_everything()` is true ⇒ it matches every entry trivially.
pub struct MatchAll;

impl Query for MatchAll {
    fn matches(&self, _entry: &Entry) -> bool {
        true
    }
    fn matches_everything(&self) -> bool {
        true
    }
}

/// A small reference `Query` used by this crate's own tests and suitable as
/// a default for embedders that don't need a full expression language: glob-
/// or substring-matching on the entry's basename, in the spirit of this
/// repo's original `query::parse_query`/`LikePattern` (kept here as a single
/// case-insensitive substring/glob matcher rather than the original's full
/// SQL-LIKE mode dispatch, since the expression evaluator itself is out of
/// scope — this is only ever a default, not the production query path).
pub struct NameGlob {
    segments: Vec<GlobSegment>,
}

enum GlobSegment {
    Literal(String),
    AnyChars,
}

impl NameGlob {
    pub fn new(pattern: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        for ch in pattern.chars() {
            if ch == '*' {
                if !literal.is_empty() {
                    segments.push(GlobSegment::Literal(std::mem::take(&mut literal).to_lowercase()));
                }
                segments.push(GlobSegment::AnyChars);
            } else {
                literal.push(ch);
            }
        }
        if !literal.is_empty() {
            segments.push(GlobSegment::Literal(literal.to_lowercase()));
        }
        NameGlob { segments }
    }

    fn is_match(&self, value: &str) -> bool {
        fn go(segments: &[GlobSegment], value: &str, seg: usize, pos: usize) -> bool {
            if seg >= segments.len() {
                return pos >= value.len();
            }
            let remaining = &value[pos..];
            match &segments[seg] {
                GlobSegment::Literal(lit) => {
                    remaining.starts_with(lit.as_str()) && go(segments, value, seg + 1, pos + lit.len())
                }
                GlobSegment::AnyChars => {
                    let next = seg + 1;
                    if next >= segments.len() {
                        return true;
                    }
                    if go(segments, value, next, pos) {
                        return true;
                    }
                    let mut p = pos;
                    for ch in remaining.chars() {
                        p += ch.len_utf8();
                        if go(segments, value, next, p) {
                            return true;
                        }
                    }
                    false
                }
            }
        }
        go(&self.segments, &value.to_lowercase(), 0, 0)
    }
}

impl Query for NameGlob {
    fn matches(&self, entry: &Entry) -> bool {
        self.is_match(&entry.name)
    }

    fn negative_cache_key(&self) -> Option<String> {
        match self.segments.as_slice() {
            [GlobSegment::Literal(lit)] => Some(lit.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryType;
    use std::sync::atomic::AtomicU32;

    fn entry(name: &str) -> Entry {
        Entry {
            entry_type: EntryType::File,
            name: name.to_string(),
            parent: None,
            size: 0,
            mtime: 0,
            idx: AtomicU32::new(0),
        }
    }

    #[test]
    fn match_all_matches_everything() {
        let q = MatchAll;
        assert!(q.matches_everything());
        assert!(q.matches(&entry("anything")));
    }

    #[test]
    fn name_glob_prefix() {
        let q = NameGlob::new("a*.txt");
        assert!(q.matches(&entry("abc.txt")));
        assert!(!q.matches(&entry("bcd.txt")));
    }

    #[test]
    fn name_glob_literal() {
        let q = NameGlob::new("readme.md");
        assert!(q.matches(&entry("README.md")));
        assert!(!q.matches(&entry("readme.txt")));
    }
}
