//! Passage sources: the inspiration text fed into prompts.
//!
//! Each logical dataset name (`text`, `code`, ...) maps to one
//! [`PassageSource`]. Sources never run dry: a finite list of passages is
//! walked with an explicit wrapping cursor, so the generator can keep
//! drawing for as long as the process lives.

pub mod hub;
pub mod loader;

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::PassageError;

pub use loader::{load_source, PassageSourceConfig, RowFormat, SourceLocation};

/// An endless supply of passages.
pub trait PassageSource: Send {
    /// Draw the next passage, advancing the cursor.
    fn next_passage(&mut self) -> String;
}

/// A finite passage list read round-robin, forever.
#[derive(Debug, Clone)]
pub struct CyclicPassages {
    items: Vec<String>,
    cursor: usize,
}

impl CyclicPassages {
    pub fn new(name: &str, items: Vec<String>) -> Result<Self, PassageError> {
        if items.is_empty() {
            return Err(PassageError::EmptySource(name.to_string()));
        }
        Ok(Self { items, cursor: 0 })
    }

    /// Like [`CyclicPassages::new`], with the order shuffled once up front.
    pub fn shuffled<R: Rng + ?Sized>(
        name: &str,
        mut items: Vec<String>,
        rng: &mut R,
    ) -> Result<Self, PassageError> {
        items.shuffle(rng);
        Self::new(name, items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl PassageSource for CyclicPassages {
    fn next_passage(&mut self) -> String {
        let passage = self.items[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.items.len();
        passage
    }
}

/// Passage sources keyed by dataset name.
#[derive(Default)]
pub struct PassagePool {
    sources: HashMap<String, Box<dyn PassageSource>>,
}

impl PassagePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the source for a dataset.
    pub fn insert(&mut self, dataset: impl Into<String>, source: Box<dyn PassageSource>) {
        self.sources.insert(dataset.into(), source);
    }

    pub fn contains(&self, dataset: &str) -> bool {
        self.sources.contains_key(dataset)
    }

    /// Next passage from the named dataset.
    pub fn draw(&mut self, dataset: &str) -> Result<String, PassageError> {
        self.sources
            .get_mut(dataset)
            .map(|source| source.next_passage())
            .ok_or_else(|| PassageError::UnknownDataset(dataset.to_string()))
    }

    pub fn datasets(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for PassagePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassagePool")
            .field("datasets", &self.sources.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cyclic_wraps_around() {
        let mut source = CyclicPassages::new("t", strings(&["a", "b", "c"])).unwrap();
        let drawn: Vec<String> = (0..7).map(|_| source.next_passage()).collect();
        assert_eq!(drawn, strings(&["a", "b", "c", "a", "b", "c", "a"]));
    }

    #[test]
    fn test_single_item_repeats() {
        let mut source = CyclicPassages::new("t", strings(&["only"])).unwrap();
        assert_eq!(source.next_passage(), "only");
        assert_eq!(source.next_passage(), "only");
    }

    #[test]
    fn test_empty_source_rejected() {
        assert!(matches!(
            CyclicPassages::new("code", Vec::new()),
            Err(PassageError::EmptySource(name)) if name == "code"
        ));
    }

    #[test]
    fn test_shuffled_keeps_every_item() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let items = strings(&["a", "b", "c", "d", "e", "f"]);
        let mut source = CyclicPassages::shuffled("t", items.clone(), &mut rng).unwrap();

        let mut first_cycle: Vec<String> = (0..6).map(|_| source.next_passage()).collect();
        let second_cycle: Vec<String> = (0..6).map(|_| source.next_passage()).collect();
        assert_eq!(first_cycle, second_cycle);

        first_cycle.sort();
        assert_eq!(first_cycle, items);
    }

    #[test]
    fn test_pool_draws_per_dataset() {
        let mut pool = PassagePool::new();
        pool.insert(
            "text",
            Box::new(CyclicPassages::new("text", strings(&["t1", "t2"])).unwrap()),
        );
        pool.insert(
            "code",
            Box::new(CyclicPassages::new("code", strings(&["c1"])).unwrap()),
        );

        assert_eq!(pool.draw("text").unwrap(), "t1");
        assert_eq!(pool.draw("code").unwrap(), "c1");
        assert_eq!(pool.draw("text").unwrap(), "t2");
        assert_eq!(pool.draw("code").unwrap(), "c1");
        assert!(matches!(
            pool.draw("missing"),
            Err(PassageError::UnknownDataset(_))
        ));
    }
}
