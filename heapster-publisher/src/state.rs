use crate::codec::Measurement;
use crate::config::Settings;
use crate::error::{PathError, PublishError};
use crate::health::CoreStats;
use crate::models::Node;
use crate::pipeline::{self, BatchReport};
use crate::template::{CompiledTemplate, SAMPLES_PATH};
use crate::walker;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// One committed sample. `document` already carries its interface list.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: OffsetDateTime,
    pub document: Node,
}

/// A tracked container: its document and the sample history, oldest first.
#[derive(Debug, Clone)]
pub struct Entity {
    pub key: String,
    pub id: String,
    pub document: Node,
    pub history: VecDeque<Sample>,
}

impl Entity {
    pub fn new(key: &str, id: &str, skeleton: Node) -> Result<Self, PathError> {
        let mut document = skeleton;
        walker::set(&mut document, "/id", Node::string(id))?;
        walker::set(&mut document, "/name", Node::string(key))?;
        Ok(Self {
            key: key.to_string(),
            id: id.to_string(),
            document,
            history: VecDeque::new(),
        })
    }

    /// The document as served: `stats` holds the history oldest to newest.
    pub fn render(&self) -> Result<Node, PathError> {
        let mut doc = self.document.clone();
        let samples = self.history.iter().map(|s| s.document.clone()).collect();
        walker::set(&mut doc, SAMPLES_PATH, Node::List(samples))?;
        Ok(doc)
    }
}

/// Dual count/age bound on a history. Zero disables a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub depth: usize,
    pub span: Duration,
}

impl RetentionPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            depth: settings.stats_depth,
            span: settings.stats_span,
        }
    }

    pub fn admit(&self, history: &mut VecDeque<Sample>, sample: Sample) {
        if self.depth > 0 && history.len() >= self.depth {
            history.pop_front();
        }
        // a horizon before the earliest representable date prunes nothing
        let horizon = if self.span.is_positive() {
            sample.timestamp.checked_sub(self.span)
        } else {
            None
        };
        if let Some(horizon) = horizon {
            while history.front().is_some_and(|oldest| oldest.timestamp < horizon) {
                history.pop_front();
            }
        }
        history.push_back(sample);
    }
}

#[derive(Debug, Default)]
pub struct StoreState {
    pub entities: HashMap<String, Entity>,
    pub stats: CoreStats,
}

/// All containers behind one lock, held for a whole batch.
#[derive(Debug, Default)]
pub struct EntityStore {
    inner: Mutex<StoreState>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(
        &self,
        batch: &[Measurement],
        template: &CompiledTemplate,
        settings: &Settings,
    ) -> Result<BatchReport, PublishError> {
        self.with_state(|state| pipeline::process(state, batch, template, settings))
    }

    pub fn container_count(&self) -> usize {
        self.inner.lock().entities.len()
    }

    pub fn container_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.inner.lock().entities.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn history_len(&self, key: &str) -> Option<usize> {
        self.inner.lock().entities.get(key).map(|e| e.history.len())
    }

    pub fn history(&self, key: &str) -> Option<Vec<Sample>> {
        self.inner
            .lock()
            .entities
            .get(key)
            .map(|e| e.history.iter().cloned().collect())
    }

    pub fn document(&self, key: &str) -> Result<Option<Node>, PathError> {
        self.inner.lock().entities.get(key).map(Entity::render).transpose()
    }

    /// Every container document, keyed by routing key, taken under one lock.
    pub fn snapshot(&self) -> Result<BTreeMap<String, Node>, PathError> {
        let state = self.inner.lock();
        state
            .entities
            .iter()
            .map(|(key, entity)| Ok((key.clone(), entity.render()?)))
            .collect()
    }

    pub fn stats(&self) -> CoreStats {
        self.inner.lock().stats
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
