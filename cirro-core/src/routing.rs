use crate::cache::normalize_request_path;
use crate::error::Result;
use crate::roster::EdgeRoster;
use std::path::{Path, PathBuf};

/// Outcome of the origin's routing decision for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// The origin answers the request from its own serve directory.
    SelfServe,
    /// The client is sent a temporary (307) redirect to the given URL.
    Redirect(String),
}

/// RoutePolicy decides whether the origin serves a request itself or
/// redirects it to a registered edge node.
///
/// Self-served suffixes keep pages like `.html` on the origin so a client's
/// address bar never shows an edge node's address.
pub struct RoutePolicy {
    serve_dir: PathBuf,
    self_served_suffixes: Vec<String>,
}

impl RoutePolicy {
    pub fn new(serve_dir: PathBuf, self_served_suffixes: Vec<String>) -> Self {
        Self {
            serve_dir,
            self_served_suffixes,
        }
    }

    pub fn serve_dir(&self) -> &Path {
        &self.serve_dir
    }

    /// Map `request_path` onto the serve directory. The root path maps to
    /// the serve directory itself.
    pub fn local_path(&self, request_path: &str) -> Result<PathBuf> {
        let normalized = normalize_request_path(request_path)?;
        let mut path = self.serve_dir.clone();
        for component in normalized.split('/').filter(|c| !c.is_empty()) {
            path.push(component);
        }
        Ok(path)
    }

    fn is_self_served(&self, request_path: &str) -> bool {
        self.self_served_suffixes
            .iter()
            .any(|suffix| request_path.ends_with(suffix.as_str()))
    }

    /// Decide how to answer `request_path`; the first matching rule wins:
    ///
    /// 1. a fetch relayed by an edge node is always self-served, so a
    ///    cache fill can never be redirected back to an edge node;
    /// 2. an empty roster leaves nothing to redirect to;
    /// 3. directories are self-served, edge nodes do not serve listings;
    /// 4. self-served suffixes stay on the origin regardless of the roster;
    /// 5. otherwise a uniformly random roster entry takes the request.
    ///
    /// The roster is only read here.
    pub async fn decide(
        &self,
        request_path: &str,
        edge_fetch: bool,
        roster: &EdgeRoster,
    ) -> Result<RouteDecision> {
        if edge_fetch {
            return Ok(RouteDecision::SelfServe);
        }
        if roster.is_empty().await {
            return Ok(RouteDecision::SelfServe);
        }
        if self.local_path(request_path)?.is_dir() {
            return Ok(RouteDecision::SelfServe);
        }
        if self.is_self_served(request_path) {
            return Ok(RouteDecision::SelfServe);
        }

        Ok(match roster.pick().await {
            Some(edge) => RouteDecision::Redirect(format!("{}{}", edge, request_path)),
            None => RouteDecision::SelfServe,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn roster_with(edges: &[&str]) -> EdgeRoster {
        let roster = EdgeRoster::new();
        for edge in edges {
            roster.register(edge.to_string()).await;
        }
        roster
    }

    #[tokio::test]
    async fn test_edge_fetch_always_self_serves() {
        let dir = tempfile::tempdir().unwrap();
        let policy = RoutePolicy::new(dir.path().to_path_buf(), Vec::new());
        let roster = roster_with(&["http://edge-a:8193"]).await;

        assert_eq!(
            policy.decide("/image.png", true, &roster).await.unwrap(),
            RouteDecision::SelfServe
        );
    }

    #[tokio::test]
    async fn test_empty_roster_self_serves() {
        let dir = tempfile::tempdir().unwrap();
        let policy = RoutePolicy::new(dir.path().to_path_buf(), Vec::new());
        let roster = EdgeRoster::new();

        assert_eq!(
            policy.decide("/image.png", false, &roster).await.unwrap(),
            RouteDecision::SelfServe
        );
    }

    #[tokio::test]
    async fn test_directory_self_serves() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("assets")).unwrap();
        let policy = RoutePolicy::new(dir.path().to_path_buf(), Vec::new());
        let roster = roster_with(&["http://edge-a:8193"]).await;

        assert_eq!(
            policy.decide("/assets", false, &roster).await.unwrap(),
            RouteDecision::SelfServe
        );
        assert_eq!(
            policy.decide("/", false, &roster).await.unwrap(),
            RouteDecision::SelfServe
        );
    }

    #[tokio::test]
    async fn test_self_served_suffix_wins_over_redirect() {
        let dir = tempfile::tempdir().unwrap();
        let policy = RoutePolicy::new(dir.path().to_path_buf(), vec![".html".to_string()]);
        let roster = roster_with(&["http://edge-a:8193"]).await;

        assert_eq!(
            policy.decide("/index.html", false, &roster).await.unwrap(),
            RouteDecision::SelfServe
        );
    }

    #[tokio::test]
    async fn test_redirect_targets_registered_edge() {
        let dir = tempfile::tempdir().unwrap();
        let policy = RoutePolicy::new(dir.path().to_path_buf(), vec![".html".to_string()]);
        let roster = roster_with(&["http://edge-a:8193"]).await;

        assert_eq!(
            policy.decide("/image.png", false, &roster).await.unwrap(),
            RouteDecision::Redirect("http://edge-a:8193/image.png".to_string())
        );
    }

    #[tokio::test]
    async fn test_redirect_target_always_from_roster() {
        let dir = tempfile::tempdir().unwrap();
        let policy = RoutePolicy::new(dir.path().to_path_buf(), Vec::new());
        let edges = ["http://edge-a:8193", "http://edge-b:8193"];
        let roster = roster_with(&edges).await;

        for _ in 0..50 {
            match policy.decide("/image.png", false, &roster).await.unwrap() {
                RouteDecision::Redirect(target) => {
                    assert!(edges.iter().any(|edge| {
                        target == format!("{}/image.png", edge)
                    }));
                }
                RouteDecision::SelfServe => panic!("expected a redirect"),
            }
        }
    }
}
