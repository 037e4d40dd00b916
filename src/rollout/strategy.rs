//! Retrieval strategy normalization.
//!
//! Requested strategies arrive as free-form tokens from older and newer clients.
//! [`normalize`] maps them onto [`Strategy`]; deprecated aliases are accepted but
//! warned about once per process.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use tracing::warn;

use crate::error::{RecallError, Result};

/// Canonical retrieval strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Lexical,
    Semantic,
    /// Lexical and semantic fused; eligible for graph expansion.
    Hybrid,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
        }
    }

    pub fn includes_graph(&self) -> bool {
        matches!(self, Self::Hybrid)
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deprecated tokens still accepted from older clients.
const DEPRECATED_ALIASES: &[(&str, Strategy)] = &[
    ("baseline", Strategy::Lexical),
    ("hybrid_graph", Strategy::Hybrid),
];

/// Result of normalizing a requested strategy token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalized {
    pub strategy: Strategy,
    /// The deprecated alias that was used, if any.
    pub deprecated_alias: Option<&'static str>,
}

/// Strict parse of a canonical token. Used for persisted values and CLI input,
/// where an unknown value is an error rather than a silent default.
pub fn parse_strategy(token: &str) -> Result<Strategy> {
    match token.trim().to_ascii_lowercase().as_str() {
        "lexical" => Ok(Strategy::Lexical),
        "semantic" => Ok(Strategy::Semantic),
        "hybrid" => Ok(Strategy::Hybrid),
        other => Err(RecallError::validation(
            "INVALID_STRATEGY",
            format!("unknown retrieval strategy: {other}"),
        )),
    }
}

/// Owns the "already warned" alias registry.
#[derive(Debug, Default)]
pub struct StrategyNormalizer {
    warned: Mutex<HashSet<&'static str>>,
    suppress_warnings: AtomicBool,
}

impl StrategyNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_suppress_warnings(&self, suppress: bool) {
        self.suppress_warnings.store(suppress, Ordering::Relaxed);
    }

    /// Map a requested token to a canonical strategy.
    ///
    /// Unknown or empty input resolves to [`Strategy::Lexical`]. Input is trimmed and
    /// compared case-insensitively.
    pub fn normalize(&self, requested: Option<&str>) -> Normalized {
        let token = requested
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if let Ok(strategy) = parse_strategy(&token) {
            return Normalized {
                strategy,
                deprecated_alias: None,
            };
        }

        match DEPRECATED_ALIASES.iter().find(|(alias, _)| *alias == token) {
            Some(&(alias, strategy)) => {
                self.warn_once(alias, strategy);
                Normalized {
                    strategy,
                    deprecated_alias: Some(alias),
                }
            }
            None => Normalized {
                strategy: Strategy::Lexical,
                deprecated_alias: None,
            },
        }
    }

    /// Returns true when this call recorded the alias for the first time.
    fn warn_once(&self, alias: &'static str, replacement: Strategy) -> bool {
        let first = match self.warned.lock() {
            Ok(mut warned) => warned.insert(alias),
            Err(poisoned) => poisoned.into_inner().insert(alias),
        };
        if first && !self.suppress_warnings.load(Ordering::Relaxed) {
            warn!(
                alias,
                replacement = %replacement,
                "deprecated retrieval strategy alias; use the canonical name instead"
            );
        }
        first
    }

    pub fn has_warned(&self, alias: &str) -> bool {
        match self.warned.lock() {
            Ok(warned) => warned.contains(alias),
            Err(poisoned) => poisoned.into_inner().contains(alias),
        }
    }

    /// Forget every recorded alias.
    #[doc(hidden)]
    pub fn reset(&self) {
        match self.warned.lock() {
            Ok(mut warned) => warned.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

/// Process-wide normalizer.
pub fn global() -> &'static StrategyNormalizer {
    static NORMALIZER: OnceLock<StrategyNormalizer> = OnceLock::new();
    NORMALIZER.get_or_init(StrategyNormalizer::new)
}

/// Normalize through the process-wide registry.
pub fn normalize(requested: Option<&str>) -> Normalized {
    global().normalize(requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_tokens_are_unchanged() {
        let n = StrategyNormalizer::new();
        for s in [Strategy::Lexical, Strategy::Semantic, Strategy::Hybrid] {
            let out = n.normalize(Some(s.as_str()));
            assert_eq!(out.strategy, s);
            assert!(out.deprecated_alias.is_none());
            // Idempotent
            assert_eq!(n.normalize(Some(out.strategy.as_str())).strategy, s);
        }
        assert_eq!(n.normalize(Some("  HYBRID ")).strategy, Strategy::Hybrid);
    }

    #[test]
    fn unknown_and_empty_fall_back_to_lexical() {
        let n = StrategyNormalizer::new();
        assert_eq!(n.normalize(None).strategy, Strategy::Lexical);
        assert_eq!(n.normalize(Some("")).strategy, Strategy::Lexical);
        assert_eq!(n.normalize(Some("vector")).strategy, Strategy::Lexical);
    }

    #[test]
    fn aliases_map_and_register_once() {
        let n = StrategyNormalizer::new();
        let first = n.normalize(Some("hybrid_graph"));
        assert_eq!(first.strategy, Strategy::Hybrid);
        assert_eq!(first.deprecated_alias, Some("hybrid_graph"));
        assert!(n.has_warned("hybrid_graph"));
        assert!(!n.has_warned("baseline"));

        assert!(!n.warn_once("hybrid_graph", Strategy::Hybrid));
        assert!(n.warn_once("baseline", Strategy::Lexical));
        assert_eq!(n.normalize(Some("baseline")).strategy, Strategy::Lexical);
    }

    #[test]
    fn reset_clears_registry() {
        let n = StrategyNormalizer::new();
        n.set_suppress_warnings(true);
        n.normalize(Some("baseline"));
        assert!(n.has_warned("baseline"));
        n.reset();
        assert!(!n.has_warned("baseline"));
    }

    #[test]
    fn strict_parse_rejects_aliases() {
        assert_eq!(parse_strategy("semantic").unwrap(), Strategy::Semantic);
        let err = parse_strategy("hybrid_graph").unwrap_err();
        assert_eq!(err.code(), "INVALID_STRATEGY");
    }
}
