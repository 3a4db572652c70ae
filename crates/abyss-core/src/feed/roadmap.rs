//! Roadmap feed: milestones and issues of tracked GitHub repositories.

use super::aggregator::{DynFeedSource, FeedAggregator, FeedSource};
use super::envelope::now_epoch_ms;
use crate::config::{FeedConfig, NetworkConfig};
use crate::network::{
    ApiClient, ApiError, HttpMethod, RateLimitWatcher, RequestBody, RequestOptions,
};
use crate::store::LocalStore;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubLabel {
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    #[serde(default)]
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneRef {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubMilestone {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    pub state: String,
    pub open_issues: u64,
    pub closed_issues: u64,
    pub due_on: Option<String>,
    pub html_url: String,
    pub created_at: String,
    pub updated_at: String,
}

impl GitHubMilestone {
    /// Share of closed issues, rounded to a whole percent.
    pub fn progress_percent(&self) -> u8 {
        let total = self.open_issues + self.closed_issues;
        if total == 0 {
            return 0;
        }
        ((self.closed_issues as f64 / total as f64) * 100.0).round() as u8
    }

    pub fn is_closed(&self) -> bool {
        self.state == "closed"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubIssue {
    pub id: u64,
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub html_url: String,
    #[serde(default)]
    pub labels: Vec<GitHubLabel>,
    pub milestone: Option<MilestoneRef>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub user: Option<GitHubUser>,
    /// Present only on pull requests, which the issues endpoint also returns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<Value>,
}

impl GitHubIssue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

/// Roadmap of one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoRoadmap {
    /// `owner/repo`
    pub repo: String,
    pub display_name: String,
    pub description: String,
    pub milestones: Vec<GitHubMilestone>,
    pub issues: Vec<GitHubIssue>,
    pub last_fetched: i64,
}

/// A repository the roadmap follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedRepo {
    pub owner: String,
    pub repo: String,
    pub display_name: String,
    pub description: String,
}

impl TrackedRepo {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            display_name: display_name.into(),
            description: description.into(),
        }
    }

    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// The project's own repositories.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(
                "TellurianCorp",
                "from-abyss-webfront",
                "From Abyss Webfront",
                "React-based multimedia portal for the horror community",
            ),
            Self::new(
                "TellurianCorp",
                "from-abyss-api",
                "From Abyss API",
                "Golang control layer serving REST/GraphQL endpoints",
            ),
            Self::new(
                "FromAbyssStudio",
                "koliseum",
                "Koliseum",
                "Gaming platform and competitive infrastructure",
            ),
            Self::new(
                "TellurianCorp",
                "HydraMedia",
                "Hydra Media",
                "Media processing and distribution pipeline",
            ),
        ]
    }

    fn empty_roadmap(&self, last_fetched: i64) -> RepoRoadmap {
        RepoRoadmap {
            repo: self.slug(),
            display_name: self.display_name.clone(),
            description: self.description.clone(),
            milestones: Vec::new(),
            issues: Vec::new(),
            last_fetched,
        }
    }
}

/// Fetches one repository's milestones and roadmap-labelled issues.
pub struct RepoRoadmapSource {
    client: Arc<ApiClient>,
    repo: TrackedRepo,
    slug: String,
    api_base: String,
    rate_limit: RateLimitWatcher,
}

impl RepoRoadmapSource {
    pub fn new(client: Arc<ApiClient>, repo: TrackedRepo) -> Self {
        Self::with_api_base(client, repo, NetworkConfig::GITHUB_API_BASE)
    }

    /// Point at a GitHub-compatible API other than api.github.com.
    pub fn with_api_base(
        client: Arc<ApiClient>,
        repo: TrackedRepo,
        api_base: impl Into<String>,
    ) -> Self {
        let slug = repo.slug();
        Self {
            client,
            repo,
            slug,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            rate_limit: RateLimitWatcher::default(),
        }
    }

    /// Report GitHub's remaining request budget to `watcher`.
    ///
    /// Sources of one feed share a watcher so the budget reads as one value.
    pub fn with_rate_limit_watcher(mut self, watcher: RateLimitWatcher) -> Self {
        self.rate_limit = watcher;
        self
    }

    pub fn repo(&self) -> &TrackedRepo {
        &self.repo
    }

    pub fn rate_limit(&self) -> &RateLimitWatcher {
        &self.rate_limit
    }

    /// A non-success response yields an empty list. No response, a timeout or
    /// an undecodable body fails the whole source.
    async fn fetch_list<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>, ApiError> {
        let options = RequestOptions::new().with_header("accept", NetworkConfig::GITHUB_ACCEPT);
        let result = self
            .client
            .request_raw(HttpMethod::Get, url, RequestBody::Empty, options)
            .await;
        match result {
            Ok(response) => {
                self.rate_limit.observe(&response);
                let status = response.status;
                response.into_payload()?.decode(status)
            }
            Err(e) if (e.is_client_error() && !e.is_timeout()) || e.is_server_error() => {
                debug!("{} returned {} for {}", self.slug, e.status(), url);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl FeedSource<RepoRoadmap> for RepoRoadmapSource {
    fn id(&self) -> &str {
        &self.slug
    }

    async fn fetch(&self) -> Result<RepoRoadmap, ApiError> {
        let milestones_url = format!(
            "{}/repos/{}/milestones?state=all&per_page=10",
            self.api_base, self.slug
        );
        let issues_url = format!(
            "{}/repos/{}/issues?state=all&per_page=30&labels=roadmap,feature,enhancement",
            self.api_base, self.slug
        );

        let (milestones, issues) = tokio::join!(
            self.fetch_list::<GitHubMilestone>(&milestones_url),
            self.fetch_list::<GitHubIssue>(&issues_url)
        );

        let mut roadmap = self.repo.empty_roadmap(now_epoch_ms());
        roadmap.milestones = milestones?;
        roadmap.issues = issues?
            .into_iter()
            .filter(|issue| !issue.is_pull_request())
            .collect();
        Ok(roadmap)
    }

    fn placeholder(&self) -> RepoRoadmap {
        self.repo.empty_roadmap(0)
    }
}

/// The roadmap aggregator over `repos`, in the given order.
pub fn roadmap_feed(
    client: Arc<ApiClient>,
    store: Arc<dyn LocalStore>,
    repos: Vec<TrackedRepo>,
) -> FeedAggregator<RepoRoadmap> {
    let rate_limit = RateLimitWatcher::default();
    let sources: Vec<DynFeedSource<RepoRoadmap>> = repos
        .into_iter()
        .map(|repo| {
            let source = RepoRoadmapSource::new(client.clone(), repo)
                .with_rate_limit_watcher(rate_limit.clone());
            Arc::new(source) as DynFeedSource<RepoRoadmap>
        })
        .collect();
    FeedAggregator::with_ttl(
        FeedConfig::ROADMAP_CACHE_KEY,
        store,
        sources,
        FeedConfig::DEFAULT_TTL,
    )
}
