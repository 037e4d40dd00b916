//! Core memory type definitions.
//!
//! Defines [`MemoryType`] (what a memory records), [`MemoryLayer`] (how long it is
//! meant to live), [`Scope`] (the tenant/user/project a request runs as) and
//! [`Memory`] (a full record).

use serde::{Deserialize, Serialize};

/// What kind of knowledge a memory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Always-on instructions for the agent. Lives in the rule layer.
    Rule,
    Decision,
    Fact,
    Note,
    /// Reusable procedures, optionally backed by a skill file path.
    Skill,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Decision => "decision",
            Self::Fact => "fact",
            Self::Note => "note",
            Self::Skill => "skill",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rule" => Ok(Self::Rule),
            "decision" => Ok(Self::Decision),
            "fact" => Ok(Self::Fact),
            "note" => Ok(Self::Note),
            "skill" => Ok(Self::Skill),
            _ => Err(format!("unknown memory type: {s}")),
        }
    }
}

/// Retention layer of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLayer {
    Rule,
    Working,
    LongTerm,
}

impl MemoryLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Working => "working",
            Self::LongTerm => "long_term",
        }
    }

    /// Rules always live in the rule layer; everything else defaults to long-term.
    pub fn resolve(memory_type: MemoryType, requested: Option<MemoryLayer>) -> Self {
        match (memory_type, requested) {
            (MemoryType::Rule, _) => Self::Rule,
            (_, Some(Self::Rule)) | (_, None) => Self::LongTerm,
            (_, Some(layer)) => layer,
        }
    }
}

impl std::fmt::Display for MemoryLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryLayer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rule" => Ok(Self::Rule),
            "working" => Ok(Self::Working),
            "long_term" => Ok(Self::LongTerm),
            _ => Err(format!("unknown memory layer: {s}")),
        }
    }
}

/// The resolved identity a request runs as. Produced by an external scope
/// resolver; never authenticated here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
}

/// Key used for tenant-wide rollout state when no tenant is set.
pub const LOCAL_SCOPE_KEY: &str = "local";

impl Scope {
    pub fn new(
        tenant_id: Option<String>,
        user_id: Option<String>,
        project_id: Option<String>,
    ) -> Self {
        let clean = |v: Option<String>| {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        };
        Self {
            tenant_id: clean(tenant_id),
            user_id: clean(user_id),
            project_id: clean(project_id),
        }
    }

    /// Key for per-tenant rollout config, policy and events.
    pub fn tenant_key(&self) -> &str {
        self.tenant_id.as_deref().unwrap_or(LOCAL_SCOPE_KEY)
    }
}

/// A memory record, matching the `memories` table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub layer: MemoryLayer,
    pub content: String,
    pub tags: Vec<String>,
    /// Skill file path, when the memory mirrors a file on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A skill file surfaced in a context bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillFile {
    pub path: String,
    pub content: String,
}

/// A memory found by ordinary lexical/semantic search.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub memory: Memory,
    pub score: f64,
}

/// A memory reached from a seed by walking shared graph nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphCandidate {
    pub memory: Memory,
    pub seed_memory_id: String,
    /// `node_type:node_key` of the node that links this memory to its seed.
    pub linked_via_node: String,
    pub edge_type: String,
    pub hop_count: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_type_forces_rule_layer() {
        assert_eq!(
            MemoryLayer::resolve(MemoryType::Rule, Some(MemoryLayer::Working)),
            MemoryLayer::Rule
        );
        assert_eq!(MemoryLayer::resolve(MemoryType::Fact, None), MemoryLayer::LongTerm);
        assert_eq!(
            MemoryLayer::resolve(MemoryType::Note, Some(MemoryLayer::Working)),
            MemoryLayer::Working
        );
        // Only rules may sit in the rule layer
        assert_eq!(
            MemoryLayer::resolve(MemoryType::Note, Some(MemoryLayer::Rule)),
            MemoryLayer::LongTerm
        );
    }

    #[test]
    fn scope_trims_and_keys_by_tenant() {
        let scope = Scope::new(Some("  acme ".into()), Some("".into()), None);
        assert_eq!(scope.tenant_id.as_deref(), Some("acme"));
        assert!(scope.user_id.is_none());
        assert_eq!(scope.tenant_key(), "acme");
        assert_eq!(Scope::default().tenant_key(), LOCAL_SCOPE_KEY);
    }

    #[test]
    fn memory_type_round_trips_through_str() {
        for t in ["rule", "decision", "fact", "note", "skill"] {
            assert_eq!(t.parse::<MemoryType>().unwrap().as_str(), t);
        }
        assert!("episodic".parse::<MemoryType>().is_err());
    }
}
