use std::fmt;

/// Generates container identifiers for new connections.
///
/// Implementations are shared by concurrent bootstrap attempts, and must never hand out
/// the same identifier twice.
pub trait IdGenerator: fmt::Debug + Send + Sync {
    /// The next identifier.
    fn next_id(&self) -> String;
}

/// Random 128-bit (UUID v4) identifiers.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds {
    _priv: (),
}

impl RandomIds {
    /// Create a new random identifier generator.
    pub fn new() -> Self {
        Self { _priv: () }
    }
}

impl IdGenerator for RandomIds {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn random_ids_are_distinct() {
        let ids = RandomIds::new();
        let seen: HashSet<_> = (0..256).map(|_| ids.next_id()).collect();
        assert_eq!(seen.len(), 256);
    }

    #[tokio::test]
    async fn random_ids_across_tasks() {
        let ids = RandomIds::new();
        let handles: Vec<_> = (0..8)
            .map(|_| tokio::spawn(async move { (0..32).map(|_| ids.next_id()).collect::<Vec<_>>() }))
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(seen.insert(id));
            }
        }
    }
}
