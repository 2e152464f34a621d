use rand::Rng;
use tokio::sync::RwLock;

/// EdgeRoster is the origin's list of registered edge node addresses.
/// Entries are kept in registration order, exactly as the edge supplied
/// them. The roster never shrinks within a process lifetime: an edge that
/// goes offline stays selectable until the origin restarts.
pub struct EdgeRoster {
    edges: RwLock<Vec<String>>,
}

impl EdgeRoster {
    pub fn new() -> Self {
        Self {
            edges: RwLock::new(Vec::new()),
        }
    }

    /// Append an edge address verbatim. No deduplication, no reachability
    /// check.
    pub async fn register(&self, address: String) {
        self.edges.write().await.push(address);
    }

    pub async fn is_empty(&self) -> bool {
        self.edges.read().await.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.edges.read().await.len()
    }

    pub async fn snapshot(&self) -> Vec<String> {
        self.edges.read().await.clone()
    }

    /// Pick one registered edge uniformly at random.
    pub async fn pick(&self) -> Option<String> {
        let edges = self.edges.read().await;
        if edges.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..edges.len());
        edges.get(index).cloned()
    }
}

impl Default for EdgeRoster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_register_keeps_order_and_duplicates() {
        let roster = EdgeRoster::new();
        assert!(roster.is_empty().await);

        roster.register("http://edge-a:8193".to_string()).await;
        roster.register("http://edge-b:8193".to_string()).await;
        roster.register("http://edge-a:8193".to_string()).await;

        assert_eq!(
            roster.snapshot().await,
            vec![
                "http://edge-a:8193",
                "http://edge-b:8193",
                "http://edge-a:8193"
            ]
        );
    }

    #[tokio::test]
    async fn test_pick_none_when_empty() {
        assert_eq!(EdgeRoster::new().pick().await, None);
    }

    #[tokio::test]
    async fn test_pick_is_roughly_uniform() {
        let roster = EdgeRoster::new();
        for name in ["a", "b", "c", "d"] {
            roster.register(format!("http://edge-{}:8193", name)).await;
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..4000 {
            let edge = roster.pick().await.unwrap();
            *counts.entry(edge).or_insert(0) += 1;
        }

        assert_eq!(counts.len(), 4);
        for (edge, count) in counts {
            assert!(
                (700..=1300).contains(&count),
                "{} picked {} times out of 4000",
                edge,
                count
            );
        }
    }

    #[tokio::test]
    async fn test_concurrent_registration() {
        let roster = Arc::new(EdgeRoster::new());

        let mut handles = Vec::new();
        for i in 0..16 {
            let roster = roster.clone();
            handles.push(tokio::spawn(async move {
                roster.register(format!("http://edge-{}:8193", i)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(roster.len().await, 16);
    }
}
