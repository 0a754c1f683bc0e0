//! Round-robin agent selection

use std::sync::atomic::{AtomicUsize, Ordering};

/// Ordered agent list with a process-wide rotating cursor
#[derive(Debug)]
pub struct RoundRobin {
    agents: Vec<String>,
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new(agents: Vec<String>) -> Self {
        Self {
            agents,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Next agent in rotation. Every call advances the cursor.
    pub fn next(&self) -> Option<&str> {
        let len = self.agents.len();
        if len == 0 {
            return None;
        }

        let index = self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some((c + 1) % len))
            .unwrap_or_else(|c| c);

        self.agents.get(index).map(String::as_str)
    }

    pub fn agents(&self) -> &[String] {
        &self.agents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn pool(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("http://agent-{}", i)).collect()
    }

    #[test]
    fn test_rotation_wraps() {
        let rr = RoundRobin::new(pool(2));
        let picks: Vec<_> = (0..5).map(|_| rr.next().unwrap().to_string()).collect();
        assert_eq!(
            picks,
            vec![
                "http://agent-0",
                "http://agent-1",
                "http://agent-0",
                "http://agent-1",
                "http://agent-0",
            ]
        );
    }

    #[test]
    fn test_empty_pool() {
        let rr = RoundRobin::new(Vec::new());
        assert!(rr.next().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_picks_are_even() {
        let rr = Arc::new(RoundRobin::new(pool(4)));
        let tasks: Vec<_> = (0..400)
            .map(|_| {
                let rr = rr.clone();
                tokio::spawn(async move { rr.next().unwrap().to_string() })
            })
            .collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for task in tasks {
            *counts.entry(task.await.unwrap()).or_default() += 1;
        }

        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&c| c == 100));
    }
}
