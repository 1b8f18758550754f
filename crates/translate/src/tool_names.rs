//! Tool-name shortening (spec.md §4.5.1): produce an injective mapping from
//! caller-provided tool names to upstream-acceptable names of at most 64
//! characters, and the reverse map needed to undo it on the way back.

use std::collections::HashMap;

pub const MAX_LEN: usize = 64;
const MCP_PREFIX: &str = "mcp__";

/// Bidirectional tool-name map built for one request's tool set.
///
/// Grounded on the corpus's bijective short-id map pattern (same shape as
/// the shortening maps used around length-capped upstream identifiers):
/// build the forward map once per request, keep the reverse map alongside
/// it for de-shortening the upstream response.
#[derive(Debug, Default, Clone)]
pub struct ToolNameMap {
    forward: HashMap<String, String>,
    reverse: HashMap<String, String>,
}

impl ToolNameMap {
    /// Build an injective mapping for `names`, in order. Later duplicates of
    /// an already-produced short name get a `~i` suffix (i = 1, 2, ...)
    /// trimmed so the total stays within [`MAX_LEN`].
    pub fn build<'a, I: IntoIterator<Item = &'a str>>(names: I) -> Self {
        let mut map = Self::default();
        for name in names {
            if map.forward.contains_key(name) {
                continue;
            }
            let candidate = shorten_candidate(name);
            let short = map.disambiguate(candidate);
            map.forward.insert(name.to_string(), short.clone());
            map.reverse.insert(short, name.to_string());
        }
        map
    }

    fn disambiguate(&self, candidate: String) -> String {
        if !self.reverse.contains_key(&candidate) {
            return candidate;
        }
        for i in 1u32.. {
            let suffix = format!("~{i}");
            let stem_len = MAX_LEN.saturating_sub(suffix.len());
            let stem: String = candidate.chars().take(stem_len).collect();
            let attempt = format!("{stem}{suffix}");
            if !self.reverse.contains_key(&attempt) {
                return attempt;
            }
        }
        unreachable!("u32 exhausted before finding a free suffix")
    }

    pub fn shorten(&self, name: &str) -> String {
        self.forward
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// De-shorten a name returned by upstream. Names never submitted
    /// through [`Self::build`] (e.g. a static built-in tool) pass through
    /// unchanged.
    pub fn lengthen(&self, short: &str) -> String {
        self.reverse
            .get(short)
            .cloned()
            .unwrap_or_else(|| short.to_string())
    }
}

fn shorten_candidate(name: &str) -> String {
    if name.chars().count() <= MAX_LEN {
        return name.to_string();
    }
    if let Some(stripped) = name.strip_prefix(MCP_PREFIX) {
        if let Some(suffix) = stripped.rsplit("__").next() {
            let candidate = format!("{MCP_PREFIX}{suffix}");
            return truncate(&candidate, MAX_LEN);
        }
    }
    truncate(name, MAX_LEN)
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_under_limit_are_identity() {
        let map = ToolNameMap::build(["search", "list_files"]);
        assert_eq!(map.shorten("search"), "search");
        assert_eq!(map.lengthen("search"), "search");
    }

    #[test]
    fn mcp_prefixed_name_keeps_suffix_after_last_double_underscore() {
        let long = "mcp__github__search_issues_with_very_long_tail_exceeding_sixty_four_chars";
        assert!(long.chars().count() > MAX_LEN);
        let map = ToolNameMap::build([long]);
        let short = map.shorten(long);
        assert!(short.len() <= MAX_LEN);
        assert!(short.starts_with("mcp__search_issues_with_very_long_tail_exceeding_sixty_four_cha"));
        assert_eq!(map.lengthen(&short), long);
    }

    #[test]
    fn non_mcp_long_name_is_truncated() {
        let long = "a".repeat(100);
        let map = ToolNameMap::build([long.as_str()]);
        let short = map.shorten(&long);
        assert_eq!(short.chars().count(), MAX_LEN);
        assert_eq!(map.lengthen(&short), long);
    }

    #[test]
    fn colliding_candidates_get_disambiguated() {
        let a = "a".repeat(100);
        let b = format!("{a}tail_differs_only_past_cap_xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx");
        let map = ToolNameMap::build([a.as_str(), b.as_str()]);
        let short_a = map.shorten(&a);
        let short_b = map.shorten(&b);
        assert_ne!(short_a, short_b);
        assert!(short_b.ends_with("~1"));
        assert_eq!(map.lengthen(&short_a), a);
        assert_eq!(map.lengthen(&short_b), b);
    }

    #[test]
    fn map_is_injective_for_many_collisions() {
        let names: Vec<String> = (0..5).map(|i| format!("{}{}", "x".repeat(100), i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let map = ToolNameMap::build(refs);
        let mut shorts: Vec<String> = names.iter().map(|n| map.shorten(n)).collect();
        let original_len = shorts.len();
        shorts.sort();
        shorts.dedup();
        assert_eq!(shorts.len(), original_len, "shortened names must be unique");
        for n in &names {
            assert_eq!(map.lengthen(&map.shorten(n)), *n);
        }
    }
}
