//! Relation and predicate label sanitization.
//!
//! Edge types in the graph use a constrained alphabet: uppercase words joined
//! by `_`. Raw labels produced by extraction are free text, so they are split
//! on whitespace, punctuation and underscores, rejoined with `_` and
//! uppercased.
//!
//! Two different raw labels can collapse into the same edge type (`"is a"`,
//! `"IS_A"` and `"is-a"` all become `IS_A`). No disambiguation is attempted:
//! such labels share one edge type in the graph.

/// Fallback edge type for relations whose label sanitizes to nothing.
pub const DEFAULT_RELATION: &str = "RELATED_TO";

/// Fallback edge type linking a Concept to an evidence passage.
pub const DEFAULT_PREDICATE: &str = "HAS_MENTION";

/// Sanitize a raw label, returning `None` when nothing usable remains.
pub fn sanitize(raw: &str) -> Option<String> {
    let words: Vec<String> = raw
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_uppercase())
        .collect();

    if words.is_empty() {
        None
    } else {
        Some(words.join("_"))
    }
}

/// Sanitize a relation label, falling back to [`DEFAULT_RELATION`].
pub fn relation_type(raw: &str) -> String {
    sanitize(raw).unwrap_or_else(|| DEFAULT_RELATION.to_string())
}

/// Sanitize a chunk predicate, falling back to [`DEFAULT_PREDICATE`].
pub fn predicate_type(raw: &str) -> String {
    sanitize(raw).unwrap_or_else(|| DEFAULT_PREDICATE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_joined_and_uppercased() {
        assert_eq!(relation_type("part of"), "PART_OF");
        assert_eq!(relation_type("  depends   on  "), "DEPENDS_ON");
    }

    #[test]
    fn test_collision_is_merged() {
        assert_eq!(relation_type("is a"), "IS_A");
        assert_eq!(relation_type("IS_A"), "IS_A");
        assert_eq!(relation_type("is-a"), "IS_A");
    }

    #[test]
    fn test_empty_falls_back() {
        assert_eq!(relation_type(""), DEFAULT_RELATION);
        assert_eq!(relation_type("  -- "), DEFAULT_RELATION);
        assert_eq!(predicate_type("___"), DEFAULT_PREDICATE);
    }

    #[test]
    fn test_non_ascii_words_survive() {
        assert_eq!(relation_type("属于"), "属于");
        assert_eq!(predicate_type("describes 闭包"), "DESCRIBES_闭包");
    }
}
