//! Entity resolution engine
//!
//! Matches an extracted field mapping against canonical records with
//! three-tier precedence: deterministic exact query, semantic similarity,
//! then the manual review queue. The engine never guesses silently —
//! ambiguity always routes to review, and a caller always gets either an
//! entity id or the review item now holding the decision.

use crate::config::ResolverConfig;
use crate::embeddings::{cosine_similarity, EmbeddingBackend};
use crate::error::Result;
use crate::storage::Store;
use crate::types::{
    parse_dob, Candidate, EntityKind, FieldMap, Location, ParseId, Person, QueryKind, Resolution,
    ReviewId, ReviewQueueItem, ReviewStatus,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Three-tier entity resolver
pub struct EntityResolver {
    store: Arc<dyn Store>,
    embedder: Option<Arc<dyn EmbeddingBackend>>,
    config: ResolverConfig,
}

impl EntityResolver {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Option<Arc<dyn EmbeddingBackend>>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Resolve a sender slot to a Location
    pub async fn resolve_sender(
        &self,
        data: &serde_json::Map<String, serde_json::Value>,
        parse_id: ParseId,
    ) -> Result<Resolution> {
        self.resolve(data, EntityKind::Location, parse_id).await
    }

    /// Resolve a recipient slot to a Person
    pub async fn resolve_recipient(
        &self,
        data: &serde_json::Map<String, serde_json::Value>,
        parse_id: ParseId,
    ) -> Result<Resolution> {
        self.resolve(data, EntityKind::Person, parse_id).await
    }

    /// Full precedence resolution for one entity slot
    pub async fn resolve(
        &self,
        data: &serde_json::Map<String, serde_json::Value>,
        kind: EntityKind,
        parse_id: ParseId,
    ) -> Result<Resolution> {
        let fields = normalize(data);
        match kind {
            EntityKind::Person => self.resolve_person(fields, parse_id).await,
            EntityKind::Location => self.resolve_location(fields, parse_id).await,
        }
    }

    async fn resolve_person(&self, fields: FieldMap, parse_id: ParseId) -> Result<Resolution> {
        // Step 1: deterministic match
        if let Some(person) = self.match_person_deterministic(&fields).await? {
            debug!("deterministic person match: {}", person.id);
            return Ok(Resolution::Matched(person.id.0));
        }

        // Step 2: semantic match
        let matches = self.match_person_semantic(&fields).await?;

        match matches.len() {
            1 => {
                let (person, score) = &matches[0];
                debug!("single semantic person match: {} ({:.3})", person.id, score);
                Ok(Resolution::Matched(person.id.0))
            }
            0 => {
                let first = fields.get("first_name").filter(|s| !s.is_empty());
                let last = fields.get("last_name").filter(|s| !s.is_empty());
                if let (Some(first), Some(last)) = (first, last) {
                    let dob = fields.get("dob").and_then(|s| parse_dob(s));
                    let person = Person::new(first.clone(), last.clone(), dob);
                    self.store.insert_person(&person).await?;
                    info!(
                        "Created new person: {} {} ({})",
                        person.first_name, person.last_name, person.id
                    );
                    Ok(Resolution::Matched(person.id.0))
                } else {
                    // Not enough identity to create; a human decides
                    let review_id = self
                        .queue_for_review(
                            parse_id,
                            EntityKind::Person,
                            QueryKind::NoResults,
                            fields,
                            vec![],
                        )
                        .await?;
                    Ok(Resolution::Queued(review_id))
                }
            }
            _ => {
                let candidates = matches
                    .iter()
                    .take(self.config.max_candidates)
                    .map(|(person, score)| {
                        let mut display = FieldMap::new();
                        display.insert("first_name".to_string(), person.first_name.clone());
                        display.insert("last_name".to_string(), person.last_name.clone());
                        Candidate {
                            entity_id: person.id.0,
                            display,
                            similarity: *score,
                        }
                    })
                    .collect();
                let review_id = self
                    .queue_for_review(
                        parse_id,
                        EntityKind::Person,
                        QueryKind::MultipleResults,
                        fields,
                        candidates,
                    )
                    .await?;
                Ok(Resolution::Queued(review_id))
            }
        }
    }

    async fn resolve_location(&self, fields: FieldMap, parse_id: ParseId) -> Result<Resolution> {
        if let Some(location) = self.match_location_deterministic(&fields).await? {
            debug!("deterministic location match: {}", location.id);
            return Ok(Resolution::Matched(location.id.0));
        }

        let matches = self.match_location_semantic(&fields).await?;

        match matches.len() {
            1 => {
                let (location, score) = &matches[0];
                debug!(
                    "single semantic location match: {} ({:.3})",
                    location.id, score
                );
                Ok(Resolution::Matched(location.id.0))
            }
            0 => {
                // Locations are never auto-created: organization identity is
                // riskier to invent than a fully-named person.
                let review_id = self
                    .queue_for_review(
                        parse_id,
                        EntityKind::Location,
                        QueryKind::NoResults,
                        fields,
                        vec![],
                    )
                    .await?;
                Ok(Resolution::Queued(review_id))
            }
            _ => {
                let candidates = matches
                    .iter()
                    .take(self.config.max_candidates)
                    .map(|(location, score)| {
                        let mut display = FieldMap::new();
                        display.insert("name".to_string(), location.name.clone());
                        for (key, value) in [
                            ("address", &location.address),
                            ("city", &location.city),
                            ("state", &location.state),
                        ] {
                            if let Some(value) = value {
                                display.insert(key.to_string(), value.clone());
                            }
                        }
                        Candidate {
                            entity_id: location.id.0,
                            display,
                            similarity: *score,
                        }
                    })
                    .collect();
                let review_id = self
                    .queue_for_review(
                        parse_id,
                        EntityKind::Location,
                        QueryKind::MultipleResults,
                        fields,
                        candidates,
                    )
                    .await?;
                Ok(Resolution::Queued(review_id))
            }
        }
    }

    /// Case-insensitive exact match on given+family name, with an exact DOB
    /// constraint when one is present. Accepts only a unique hit.
    async fn match_person_deterministic(&self, fields: &FieldMap) -> Result<Option<Person>> {
        let (Some(first), Some(last)) = (fields.get("first_name"), fields.get("last_name"))
        else {
            return Ok(None);
        };

        let dob = match fields.get("dob") {
            Some(raw) => {
                let parsed = parse_dob(raw);
                if parsed.is_none() {
                    warn!("Unparseable date of birth ignored for matching: {}", raw);
                }
                parsed
            }
            None => None,
        };

        let matches = self.store.find_persons_by_name(first, last, dob).await?;
        Ok(if matches.len() == 1 {
            matches.into_iter().next()
        } else {
            None
        })
    }

    /// Exact location match: address+zip, then name+city+state. Each clause
    /// accepts only a unique hit.
    async fn match_location_deterministic(&self, fields: &FieldMap) -> Result<Option<Location>> {
        if let (Some(address), Some(zip)) = (fields.get("address"), fields.get("zip")) {
            let matches = self.store.find_locations_by_address(address, zip).await?;
            if matches.len() == 1 {
                return Ok(matches.into_iter().next());
            }
        }

        if let (Some(name), Some(city), Some(state)) =
            (fields.get("name"), fields.get("city"), fields.get("state"))
        {
            let matches = self.store.find_locations_by_name(name, city, state).await?;
            if matches.len() == 1 {
                return Ok(matches.into_iter().next());
            }
        }

        Ok(None)
    }

    async fn match_person_semantic(&self, fields: &FieldMap) -> Result<Vec<(Person, f32)>> {
        let search_text = join_present(fields, &["first_name", "last_name"]);
        if search_text.is_empty() {
            return Ok(vec![]);
        }

        let persons = self.store.list_persons().await?;
        let texts: Vec<String> = persons.iter().map(|p| p.identity_text()).collect();
        let scores = self.score_candidates(&search_text, &texts).await;

        let mut matches: Vec<(Person, f32)> = persons
            .into_iter()
            .zip(scores)
            .filter(|(_, score)| *score >= self.config.similarity_threshold)
            .collect();
        matches.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(matches)
    }

    async fn match_location_semantic(&self, fields: &FieldMap) -> Result<Vec<(Location, f32)>> {
        let search_text = join_present(fields, &["name", "address", "city", "state"]);
        if search_text.is_empty() {
            return Ok(vec![]);
        }

        let locations = self.store.list_locations().await?;
        let texts: Vec<String> = locations.iter().map(|l| l.identity_text()).collect();
        let scores = self.score_candidates(&search_text, &texts).await;

        let mut matches: Vec<(Location, f32)> = locations
            .into_iter()
            .zip(scores)
            .filter(|(_, score)| *score >= self.config.similarity_threshold)
            .collect();
        matches.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(matches)
    }

    /// Similarity of every candidate text to the search string. An absent or
    /// failing embedding backend yields zero scores, which the caller treats
    /// as "no semantic candidates" — never a pipeline failure.
    async fn score_candidates(&self, search_text: &str, texts: &[String]) -> Vec<f32> {
        let Some(embedder) = self.embedder.as_deref() else {
            debug!("embedding backend unavailable, skipping semantic tier");
            return vec![0.0; texts.len()];
        };
        if texts.is_empty() {
            return vec![];
        }

        let search_embedding = match embedder.embed(search_text).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("search-string embedding failed, skipping semantic tier: {}", e);
                return vec![0.0; texts.len()];
            }
        };

        match embedder.embed_batch(texts).await {
            Ok(embeddings) => embeddings
                .iter()
                .map(|embedding| cosine_similarity(&search_embedding, embedding))
                .collect(),
            Err(e) => {
                warn!("candidate embedding failed, skipping semantic tier: {}", e);
                vec![0.0; texts.len()]
            }
        }
    }

    /// Create a pending review item for an unresolved slot, reusing an
    /// already-open item so a slot never has two simultaneously.
    async fn queue_for_review(
        &self,
        parse_id: ParseId,
        kind: EntityKind,
        query_kind: QueryKind,
        fields: FieldMap,
        candidates: Vec<Candidate>,
    ) -> Result<ReviewId> {
        if let Some(existing) = self.store.find_pending_review(parse_id, kind).await? {
            debug!(
                "slot already has open review item {}, not queuing again",
                existing.id
            );
            return Ok(existing.id);
        }

        let item = ReviewQueueItem {
            id: ReviewId::new(),
            parse_id,
            entity_kind: kind,
            query_kind,
            fields,
            candidates,
            status: ReviewStatus::Pending,
            resolved_entity_id: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: Utc::now(),
        };
        self.store.insert_review(&item).await?;
        info!(
            "Queued {} slot of parse {} for review ({})",
            kind,
            parse_id,
            query_kind.as_str()
        );
        Ok(item.id)
    }
}

/// Step 0: flatten nested address-like substructure and rename known
/// synonyms so both matching tiers operate on one canonical vocabulary.
pub fn normalize(data: &serde_json::Map<String, serde_json::Value>) -> FieldMap {
    let mut normalized = FieldMap::new();

    for (key, value) in data {
        match value {
            serde_json::Value::Object(nested) => {
                for (nested_key, nested_value) in nested {
                    if let serde_json::Value::String(s) = nested_value {
                        normalized.insert(canonical_key(nested_key), s.clone());
                    }
                }
            }
            serde_json::Value::String(s) => {
                normalized.insert(canonical_key(key), s.clone());
            }
            // Non-string, non-object values carry no identity data
            _ => {}
        }
    }

    normalized
}

fn canonical_key(key: &str) -> String {
    match key {
        "street_address" => "address".to_string(),
        "organization_name" => "name".to_string(),
        other => other.to_string(),
    }
}

fn join_present(fields: &FieldMap, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| fields.get(*k))
        .filter(|v| !v.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
}
