//! Entity/relationship extraction (component E).
//!
//! Two strategies are combined: a regex layer for kebab-case service names,
//! curated technology tokens, and a small set of high-precision relationship
//! patterns; and a heuristic capitalization-run layer standing in for a
//! trained NER model. Both layers feed the same quality filters before
//! producing output.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::types::{Entity, EntityType, Relationship};

/// Curated technology/service tokens recognized by the regex layer.
const TECH_TOKENS: &[&str] = &[
    "rust", "python", "javascript", "typescript", "go", "java", "kotlin", "swift", "ruby",
    "postgresql", "postgres", "mysql", "sqlite", "redis", "mongodb", "kafka", "rabbitmq",
    "docker", "kubernetes", "terraform", "ansible", "jenkins", "github", "gitlab", "aws", "gcp",
    "azure", "nginx", "grpc", "graphql", "rest", "jwt", "oauth", "tls", "ssl", "http", "tcp",
    "websocket", "elasticsearch", "prometheus", "grafana", "webpack", "react", "vue", "angular",
];

/// Stopwords rejected as entity candidates ("a stopword list").
const STOPWORDS: &[&str] = &[
    "i", "we", "you", "he", "she", "it", "they", "today", "yesterday", "tomorrow", "the", "a",
    "an", "this", "that", "these", "those",
];

/// Product-suffix blacklist rejecting PERSON false-positives like "Suite Pro".
const PRODUCT_SUFFIX_BLACKLIST: &[&str] = &["pro", "max", "ultra", "edition", "plus"];

static KEBAB_SERVICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-z][a-z0-9]*(?:-[a-z0-9]+)+\b").expect("valid regex"));

static USES_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([a-z][a-z0-9_-]*)\s+uses\s+([a-z][a-z0-9_-]*)\b").expect("valid regex")
});

static CONNECTS_TO_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([a-z][a-z0-9_-]*)\s+connects\s+to\s+([a-z][a-z0-9_-]*)\b")
        .expect("valid regex")
});

static STORES_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([a-z][a-z0-9_-]*)\s+stores\s+([a-z][a-z0-9_-]*)\b").expect("valid regex")
});

static CAPITALIZED_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-zA-Z]*(?:\s+[A-Z][a-zA-Z]*)*\b").expect("valid regex"));

/// Extracted entities and relationships, both carrying `provenance_memory_id`.
#[derive(Debug, Default)]
pub struct ExtractionResult {
    /// Entities found in the text.
    pub entities: Vec<Entity>,
    /// Relationships found in the text.
    pub relationships: Vec<Relationship>,
}

/// Extracts typed entities and relationships from free text.
#[derive(Debug, Default, Clone, Copy)]
pub struct EntityExtractor;

impl EntityExtractor {
    /// Construct an extractor. Stateless — all configuration is fixed by
    /// the quality filters applied in `extract`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Extract entities and relationships from `text`, attributing both to
    /// `provenance_memory_id`. Entities are deduplicated by name within a
    /// single call; relationship edges link entities by their index in
    /// `result.entities`.
    #[must_use]
    pub fn extract(&self, text: &str, provenance_memory_id: Uuid) -> ExtractionResult {
        let mut result = ExtractionResult::default();
        let mut seen: HashSet<(String, EntityType)> = HashSet::new();

        self.extract_regex_entities(text, &mut result, &mut seen);
        self.extract_heuristic_entities(text, provenance_memory_id, &mut result, &mut seen);
        self.extract_relationships(text, provenance_memory_id, &mut result);

        result
    }

    fn push_entity(
        &self,
        display_name: &str,
        entity_type: EntityType,
        result: &mut ExtractionResult,
        seen: &mut HashSet<(String, EntityType)>,
    ) {
        let name = display_name.to_lowercase();
        let key = (name.clone(), entity_type);
        if seen.contains(&key) {
            return;
        }
        seen.insert(key);
        result.entities.push(Entity {
            id: Uuid::new_v4(),
            name,
            display_name: display_name.to_string(),
            entity_type,
            workspace_id: None,
        });
    }

    fn extract_regex_entities(
        &self,
        text: &str,
        result: &mut ExtractionResult,
        seen: &mut HashSet<(String, EntityType)>,
    ) {
        for m in KEBAB_SERVICE.find_iter(text) {
            self.push_entity(m.as_str(), EntityType::Service, result, seen);
        }
        let lower = text.to_lowercase();
        for token in TECH_TOKENS {
            if contains_word(&lower, token) {
                self.push_entity(token, EntityType::Tech, result, seen);
            }
        }
    }

    /// Heuristic stand-in for a NER model: contiguous capitalized-word runs,
    /// validated against length, stopword, and entity-type-specific filters.
    fn extract_heuristic_entities(
        &self,
        text: &str,
        _provenance_memory_id: Uuid,
        result: &mut ExtractionResult,
        seen: &mut HashSet<(String, EntityType)>,
    ) {
        for m in CAPITALIZED_RUN.find_iter(text) {
            let candidate = m.as_str();
            if !passes_quality_filters(candidate) {
                continue;
            }
            let entity_type = classify(candidate);
            if let Some(entity_type) = entity_type {
                self.push_entity(candidate, entity_type, result, seen);
            }
        }
    }

    fn extract_relationships(
        &self,
        text: &str,
        provenance_memory_id: Uuid,
        result: &mut ExtractionResult,
    ) {
        for (pattern, relation_type) in [
            (&*USES_PATTERN, "uses"),
            (&*CONNECTS_TO_PATTERN, "connects_to"),
            (&*STORES_PATTERN, "stores"),
        ] {
            for caps in pattern.captures_iter(text) {
                let subject = &caps[1];
                let object = &caps[2];
                let source_id = self.entity_id_for(result, subject);
                let target_id = self.entity_id_for(result, object);
                if let (Some(source_entity_id), Some(target_entity_id)) = (source_id, target_id) {
                    result.relationships.push(Relationship {
                        id: Uuid::new_v4(),
                        source_entity_id,
                        relation_type: relation_type.to_string(),
                        target_entity_id,
                        provenance_memory_id,
                        confidence: 0.9,
                    });
                }
            }
        }
    }

    fn entity_id_for(&self, result: &ExtractionResult, name: &str) -> Option<Uuid> {
        let lower = name.to_lowercase();
        result
            .entities
            .iter()
            .find(|e| e.name == lower)
            .map(|e| e.id)
    }
}

fn contains_word(haystack_lower: &str, word: &str) -> bool {
    haystack_lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|tok| tok == word)
}

/// Quality filters shared by every candidate from the heuristic layer
///.
fn passes_quality_filters(candidate: &str) -> bool {
    let len = candidate.chars().count();
    if !(3..=50).contains(&len) {
        return false;
    }
    if STOPWORDS.contains(&candidate.to_lowercase().as_str()) {
        return false;
    }
    if !candidate.chars().any(char::is_alphabetic) {
        return false;
    }
    if candidate.contains(['(', ')', '[', ']']) {
        return false;
    }
    let lower = candidate.to_lowercase();
    for word in lower.split_whitespace() {
        if PRODUCT_SUFFIX_BLACKLIST.contains(&word) {
            return false;
        }
        if matches!(word, "the" | "a" | "an") {
            return false;
        }
    }
    true
}

/// Best-effort classification of a capitalized-run candidate.
fn classify(candidate: &str) -> Option<EntityType> {
    let starts_upper = candidate.chars().next().is_some_and(char::is_uppercase);
    if !starts_upper {
        return None;
    }
    let is_acronym = candidate.chars().all(|c| c.is_uppercase()) && candidate.len() <= 4;
    if is_acronym {
        return Some(EntityType::Org);
    }
    if candidate.split_whitespace().count() <= 3 {
        Some(EntityType::Person)
    } else {
        Some(EntityType::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_kebab_service_and_tech_token() {
        let extractor = EntityExtractor::new();
        let result = extractor.extract("auth-service uses PostgreSQL", Uuid::new_v4());
        assert!(result
            .entities
            .iter()
            .any(|e| e.name == "auth-service" && e.entity_type == EntityType::Service));
        assert!(result
            .entities
            .iter()
            .any(|e| e.name == "postgresql" && e.entity_type == EntityType::Tech));
    }

    #[test]
    fn extracts_uses_relationship() {
        let extractor = EntityExtractor::new();
        let result = extractor.extract("auth-service uses jwt-validator", Uuid::new_v4());
        assert_eq!(result.relationships.len(), 1);
        assert_eq!(result.relationships[0].relation_type, "uses");
    }

    #[test]
    fn rejects_stopword_and_short_candidates() {
        assert!(!passes_quality_filters("We"));
        assert!(!passes_quality_filters("Hi"));
    }

    #[test]
    fn rejects_product_suffix_blacklist() {
        assert!(!passes_quality_filters("Suite Pro"));
    }

    #[test]
    fn allows_short_org_acronym() {
        assert!(passes_quality_filters("IBM"));
        assert_eq!(classify("IBM"), Some(EntityType::Org));
    }

    #[test]
    fn person_like_candidate_classified_as_person() {
        assert_eq!(classify("Joe Smith"), Some(EntityType::Person));
    }
}
