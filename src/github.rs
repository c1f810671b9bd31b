use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::env;
use std::process::Command;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::retry::RetryPolicy;
use crate::tags::{OrgProviderTag, TagSource};

/// Repositories requested per GraphQL page
const ORG_PAGE_SIZE: u32 = 100;

/// Refs requested per REST page
const REFS_PAGE_SIZE: u32 = 100;

const ORG_PROVIDERS_QUERY: &str = r#"
query($orgName: String!, $first: Int!, $endCursor: String) {
  organization(login: $orgName) {
    repositories(first: $first, after: $endCursor) {
      nodes {
        nameWithOwner
        name
        refs(first: 1, refPrefix: "refs/tags/", orderBy: {field: TAG_COMMIT_DATE, direction: DESC}) {
          nodes {
            name
          }
        }
      }
      pageInfo {
        hasNextPage
        endCursor
      }
    }
  }
}
"#;

/// GitHub client wrapper used to resolve provider tags
pub struct GitHubClient {
    client: Octocrab,
    graphql_client: Octocrab,
    query_policy: RetryPolicy,
}

/// GitHub authentication strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Use GitHub CLI authentication
    GitHubCLI,
    /// Use environment variable token
    EnvironmentToken,
    /// Unauthenticated requests
    Anonymous,
}

impl GitHubClient {
    /// Create a new GitHub client with automatic authentication
    pub fn new(config: &Config) -> Result<Self> {
        let (auth_strategy, token) = Self::detect_authentication(&config.github.auth_method)?;

        info!("Using authentication strategy: {:?}", auth_strategy);

        Self::connect(
            config.github.api_base.as_deref(),
            token,
            config.github.query_policy(),
        )
    }

    /// Build clients for an optional API base URL and token
    ///
    /// REST calls go to `api_base`. GraphQL goes to the base with a trailing
    /// `/v3` removed, which is where GitHub Enterprise serves it.
    pub fn connect(
        api_base: Option<&str>,
        token: Option<String>,
        query_policy: RetryPolicy,
    ) -> Result<Self> {
        let build = |base: Option<&str>| -> Result<Octocrab> {
            let mut builder = Octocrab::builder();
            if let Some(token) = token.clone() {
                builder = builder.personal_token(token);
            }
            if let Some(base) = base {
                builder = builder
                    .base_uri(base)
                    .with_context(|| format!("Invalid GitHub API base URL: {}", base))?;
            }
            builder.build().context("Failed to create GitHub client")
        };

        let client = build(api_base)?;
        let graphql_client = match api_base {
            Some(base) => {
                let graphql_base = graphql_base(base);
                debug!("GraphQL endpoint base: {}", graphql_base);
                build(Some(graphql_base))?
            }
            None => client.clone(),
        };

        Ok(Self {
            client,
            graphql_client,
            query_policy,
        })
    }

    /// Wrap an existing octocrab instance (used against mock servers)
    pub fn with_client(client: Octocrab, query_policy: RetryPolicy) -> Self {
        Self {
            graphql_client: client.clone(),
            client,
            query_policy,
        }
    }

    /// Detect and obtain a GitHub token for the configured method
    pub fn detect_authentication(auth_method: &str) -> Result<(AuthStrategy, Option<String>)> {
        match auth_method {
            "auto" => {
                // Try GitHub CLI first, then environment token
                if let Ok(token) = Self::try_github_cli() {
                    Ok((AuthStrategy::GitHubCLI, Some(token)))
                } else if let Ok(token) = Self::try_environment_token() {
                    Ok((AuthStrategy::EnvironmentToken, Some(token)))
                } else {
                    Err(anyhow!(
                        "No GitHub authentication found. Please either:\n\
                         1. Install and authenticate GitHub CLI: gh auth login\n\
                         2. Set GITHUB_TOKEN environment variable\n\
                         3. Set github.auth_method to \"none\" for anonymous access"
                    ))
                }
            }
            "gh_cli" => {
                let token = Self::try_github_cli()
                    .context("GitHub CLI authentication failed. Run: gh auth login")?;
                Ok((AuthStrategy::GitHubCLI, Some(token)))
            }
            "token" => {
                let token = Self::try_environment_token()
                    .context("GITHUB_TOKEN environment variable not found or invalid")?;
                Ok((AuthStrategy::EnvironmentToken, Some(token)))
            }
            "none" => Ok((AuthStrategy::Anonymous, None)),
            other => Err(anyhow!("Unknown auth method: {}", other)),
        }
    }

    /// Try to get token from GitHub CLI
    fn try_github_cli() -> Result<String> {
        debug!("Attempting GitHub CLI authentication");

        let token_output = Command::new("gh")
            .args(["auth", "token"])
            .output()
            .context("Failed to run GitHub CLI (gh)")?;

        if !token_output.status.success() {
            return Err(anyhow!(
                "Failed to retrieve token from GitHub CLI: {}",
                String::from_utf8_lossy(&token_output.stderr)
            ));
        }

        let token = String::from_utf8(token_output.stdout)
            .context("GitHub CLI token is not valid UTF-8")?
            .trim()
            .to_string();

        if token.is_empty() {
            return Err(anyhow!("GitHub CLI returned empty token"));
        }

        debug!("Successfully obtained token from GitHub CLI");
        Ok(token)
    }

    /// Try to get token from environment variable
    fn try_environment_token() -> Result<String> {
        debug!("Attempting environment variable authentication");

        let token = env::var("GITHUB_TOKEN").context("GITHUB_TOKEN environment variable not set")?;

        if token.is_empty() {
            return Err(anyhow!("GITHUB_TOKEN is empty"));
        }

        if !token.starts_with("ghp_")
            && !token.starts_with("gho_")
            && !token.starts_with("ghs_")
            && !token.starts_with("github_pat_")
        {
            warn!("GITHUB_TOKEN doesn't look like a valid GitHub token");
        }

        debug!("Successfully found GITHUB_TOKEN environment variable");
        Ok(token)
    }

    /// Fetch one page of an organization's repositories
    async fn org_repositories_page(
        &self,
        org: &str,
        cursor: Option<&str>,
    ) -> Result<RepositoryConnection> {
        let payload = json!({
            "query": ORG_PROVIDERS_QUERY,
            "variables": {
                "orgName": org,
                "first": ORG_PAGE_SIZE,
                "endCursor": cursor,
            },
        });

        let client = &self.graphql_client;
        let payload = &payload;
        let response = self
            .query_policy
            .run("GitHub GraphQL query", |_| async move {
                client
                    .graphql::<GraphQlResponse>(payload)
                    .await
                    .map_err(anyhow::Error::from)
            })
            .await
            .with_context(|| format!("Failed to query repositories for organization {}", org))?;

        if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<_> = errors.into_iter().map(|e| e.message).collect();
            bail!(
                "GitHub GraphQL query for organization {} failed: {}",
                org,
                messages.join("; ")
            );
        }

        response
            .data
            .and_then(|d| d.organization)
            .map(|o| o.repositories)
            .ok_or_else(|| anyhow!("Organization not found: {}", org))
    }

    /// Fetch one page of tag refs; `None` when the repository has no tags
    async fn tag_refs_page(&self, owner: &str, repo: &str, page: u32) -> Result<Option<Vec<GitRef>>> {
        let route = format!("/repos/{}/{}/git/refs/tags", owner, repo);
        let params = PageParams {
            per_page: REFS_PAGE_SIZE,
            page,
        };

        let client = &self.client;
        let (route, params) = (&route, &params);
        self.query_policy
            .run("GitHub tag refs query", |_| async move {
                match client.get::<Vec<GitRef>, _, _>(route, Some(params)).await {
                    Ok(refs) => Ok(Some(refs)),
                    Err(octocrab::Error::GitHub { source, .. })
                        if source.status_code.as_u16() == 404 =>
                    {
                        Ok(None)
                    }
                    Err(e) => Err(anyhow::Error::from(e)),
                }
            })
            .await
            .with_context(|| format!("Failed to fetch tag refs for {}/{} page {}", owner, repo, page))
    }

    /// Whether `owner/repo` is visible to this client
    async fn repository_exists(&self, owner: &str, repo: &str) -> Result<bool> {
        let route = format!("/repos/{}/{}", owner, repo);

        let client = &self.client;
        let route = &route;
        self.query_policy
            .run("GitHub repository lookup", |_| async move {
                match client.get::<serde_json::Value, _, ()>(route, None).await {
                    Ok(_) => Ok(true),
                    Err(octocrab::Error::GitHub { source, .. })
                        if source.status_code.as_u16() == 404 =>
                    {
                        Ok(false)
                    }
                    Err(e) => Err(anyhow::Error::from(e)),
                }
            })
            .await
            .with_context(|| format!("Failed to look up repository {}/{}", owner, repo))
    }
}

#[async_trait]
impl TagSource for GitHubClient {
    async fn list_org_providers(&self, org: &str, prefix: &str) -> Result<Vec<OrgProviderTag>> {
        debug!("Scanning organization: {}", org);

        let mut providers = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let connection = self.org_repositories_page(org, cursor.as_deref()).await?;
            pages += 1;

            providers.extend(select_providers(connection.nodes, prefix));

            match (connection.page_info.has_next_page, connection.page_info.end_cursor) {
                (true, Some(next)) => cursor = Some(next),
                (true, None) => bail!(
                    "GitHub reported another page of repositories for organization {} without a cursor",
                    org
                ),
                (false, _) => break,
            }
        }

        info!(
            "Found {} tagged providers in organization {} ({} pages)",
            providers.len(),
            org,
            pages
        );
        Ok(providers)
    }

    async fn list_tag_refs(&self, owner: &str, repo: &str) -> Result<Vec<String>> {
        debug!("Fetching tag refs for {}/{}", owner, repo);

        let mut refs = Vec::new();
        let mut page = 1u32;

        loop {
            let Some(items) = self.tag_refs_page(owner, repo, page).await? else {
                if self.repository_exists(owner, repo).await? {
                    debug!("{}/{} has no tags", owner, repo);
                } else {
                    warn!(
                        "Repository {}/{} returned 404; check the slug in sources.repositories",
                        owner, repo
                    );
                }
                break;
            };

            let count = items.len();
            refs.extend(items.into_iter().map(|r| r.git_ref));

            if count < REFS_PAGE_SIZE as usize {
                break;
            }
            page += 1;
        }

        Ok(refs)
    }
}

/// GraphQL base for a REST API base: `https://host/api/v3` becomes `https://host/api`
fn graphql_base(api_base: &str) -> &str {
    let trimmed = api_base.trim_end_matches('/');
    trimmed.strip_suffix("/v3").unwrap_or(trimmed)
}

/// Keep repositories named with `prefix` that carry at least one tag
fn select_providers(nodes: Vec<RepositoryNode>, prefix: &str) -> Vec<OrgProviderTag> {
    nodes
        .into_iter()
        .filter(|node| node.name.starts_with(prefix))
        .filter_map(|node| {
            let tag = node.refs.nodes.into_iter().next()?;
            Some(OrgProviderTag {
                name_with_owner: node.name_with_owner,
                latest_tag: tag.name,
            })
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct PageParams {
    per_page: u32,
    page: u32,
}

#[derive(Debug, Deserialize)]
struct GitRef {
    #[serde(rename = "ref")]
    git_ref: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<OrgQueryData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct OrgQueryData {
    organization: Option<Organization>,
}

#[derive(Debug, Deserialize)]
struct Organization {
    repositories: RepositoryConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryConnection {
    nodes: Vec<RepositoryNode>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    name: String,
    name_with_owner: String,
    refs: RefConnection,
}

#[derive(Debug, Deserialize)]
struct RefConnection {
    nodes: Vec<RefNode>,
}

#[derive(Debug, Deserialize)]
struct RefNode {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use serial_test::serial;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo_node(name: &str, owner: &str, tags: &[&str]) -> Value {
        json!({
            "name": name,
            "nameWithOwner": format!("{}/{}", owner, name),
            "refs": { "nodes": tags.iter().map(|t| json!({ "name": t })).collect::<Vec<_>>() },
        })
    }

    fn org_page(nodes: Vec<Value>, next: Option<&str>) -> Value {
        json!({
            "data": {
                "organization": {
                    "repositories": {
                        "nodes": nodes,
                        "pageInfo": { "hasNextPage": next.is_some(), "endCursor": next },
                    }
                }
            }
        })
    }

    async fn mock_client(server: &MockServer) -> GitHubClient {
        let octocrab = Octocrab::builder()
            .base_uri(server.uri())
            .unwrap()
            .build()
            .unwrap();
        GitHubClient::with_client(octocrab, RetryPolicy::once())
    }

    #[test]
    fn test_select_providers_filters_prefix_and_untagged() {
        let nodes: Vec<RepositoryNode> = serde_json::from_value(json!([
            repo_node("terraform-provider-aws", "hashicorp", &["v5.0.0"]),
            repo_node("terraform-provider-empty", "hashicorp", &[]),
            repo_node("consul", "hashicorp", &["v1.0.0"]),
        ]))
        .unwrap();

        let providers = select_providers(nodes, "terraform-provider-");
        assert_eq!(
            providers,
            vec![OrgProviderTag {
                name_with_owner: "hashicorp/terraform-provider-aws".to_string(),
                latest_tag: "v5.0.0".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_list_org_providers_follows_pagination() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_partial_json(json!({ "variables": { "endCursor": null } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(org_page(
                vec![repo_node("terraform-provider-a", "acme", &["v1.0.0"])],
                Some("cursor-1"),
            )))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_partial_json(json!({ "variables": { "endCursor": "cursor-1" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(org_page(
                vec![
                    repo_node("terraform-provider-b", "acme", &["v2.0.0"]),
                    repo_node("website", "acme", &["v9.9.9"]),
                ],
                None,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let client = mock_client(&server).await;
        let providers = client
            .list_org_providers("acme", "terraform-provider-")
            .await
            .unwrap();

        let names: Vec<_> = providers.iter().map(|p| p.name_with_owner.as_str()).collect();
        assert_eq!(names, vec!["acme/terraform-provider-a", "acme/terraform-provider-b"]);
        assert_eq!(providers[1].latest_tag, "v2.0.0");
    }

    #[tokio::test]
    async fn test_list_org_providers_unknown_org_is_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "organization": null },
                "errors": [{ "message": "Could not resolve to an Organization with the login of 'nope'." }],
            })))
            .mount(&server)
            .await;

        let client = mock_client(&server).await;
        let err = client
            .list_org_providers("nope", "terraform-provider-")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Could not resolve"));
    }

    #[tokio::test]
    async fn test_list_tag_refs_paginates_until_short_page() {
        let server = MockServer::start().await;

        let full_page: Vec<Value> = (0..REFS_PAGE_SIZE)
            .map(|i| json!({ "ref": format!("refs/tags/v0.{}.0", i) }))
            .collect();

        Mock::given(method("GET"))
            .and(path("/repos/acme/terraform-provider-foo/git/refs/tags"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(full_page))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/terraform-provider-foo/git/refs/tags"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{ "ref": "refs/tags/v3.1.0" }])),
            )
            .mount(&server)
            .await;

        let client = mock_client(&server).await;
        let refs = client
            .list_tag_refs("acme", "terraform-provider-foo")
            .await
            .unwrap();

        assert_eq!(refs.len(), REFS_PAGE_SIZE as usize + 1);
        assert_eq!(refs.last().map(String::as_str), Some("refs/tags/v3.1.0"));
    }

    fn not_found() -> ResponseTemplate {
        ResponseTemplate::new(404).set_body_json(json!({
            "message": "Not Found",
            "documentation_url": "https://docs.github.com/rest",
        }))
    }

    #[tokio::test]
    async fn test_list_tag_refs_not_found_means_no_tags() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/terraform-provider-new/git/refs/tags"))
            .respond_with(not_found())
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/terraform-provider-new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "full_name": "acme/terraform-provider-new",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = mock_client(&server).await;
        let refs = client
            .list_tag_refs("acme", "terraform-provider-new")
            .await
            .unwrap();
        assert!(refs.is_empty());
    }

    #[tokio::test]
    async fn test_repository_exists_distinguishes_missing_repository() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/terraform-provider-real"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "full_name": "acme/terraform-provider-real",
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/terraform-provider-typo"))
            .respond_with(not_found())
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/terraform-provider-typo/git/refs/tags"))
            .respond_with(not_found())
            .mount(&server)
            .await;

        let client = mock_client(&server).await;
        assert!(client
            .repository_exists("acme", "terraform-provider-real")
            .await
            .unwrap());
        assert!(!client
            .repository_exists("acme", "terraform-provider-typo")
            .await
            .unwrap());

        let refs = client
            .list_tag_refs("acme", "terraform-provider-typo")
            .await
            .unwrap();
        assert!(refs.is_empty());
    }

    #[tokio::test]
    async fn test_list_org_providers_rejects_next_page_without_cursor() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "organization": {
                        "repositories": {
                            "nodes": [repo_node("terraform-provider-a", "acme", &["v1.0.0"])],
                            "pageInfo": { "hasNextPage": true, "endCursor": null },
                        }
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = mock_client(&server).await;
        let err = client
            .list_org_providers("acme", "terraform-provider-")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("without a cursor"));
    }

    #[test]
    fn test_graphql_base_drops_rest_version_segment() {
        assert_eq!(graphql_base("https://ghe.example.com/api/v3"), "https://ghe.example.com/api");
        assert_eq!(graphql_base("https://ghe.example.com/api/v3/"), "https://ghe.example.com/api");
        assert_eq!(graphql_base("https://api.github.com"), "https://api.github.com");
    }

    #[tokio::test]
    async fn test_enterprise_base_routes_graphql_and_rest_separately() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(org_page(
                vec![repo_node("terraform-provider-a", "acme", &["v1.0.0"])],
                None,
            )))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v3/repos/acme/terraform-provider-a/git/refs/tags"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{ "ref": "refs/tags/v1.0.0" }])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api_base = format!("{}/api/v3", server.uri());
        let client = GitHubClient::connect(Some(&api_base), None, RetryPolicy::once()).unwrap();

        let providers = client
            .list_org_providers("acme", "terraform-provider-")
            .await
            .unwrap();
        assert_eq!(providers.len(), 1);

        let refs = client
            .list_tag_refs("acme", "terraform-provider-a")
            .await
            .unwrap();
        assert_eq!(refs, vec!["refs/tags/v1.0.0".to_string()]);
    }

    #[test]
    fn test_unknown_auth_method() {
        let err = GitHubClient::detect_authentication("oauth").unwrap_err();
        assert!(err.to_string().contains("Unknown auth method"));
    }

    #[test]
    fn test_anonymous_auth() {
        let (strategy, token) = GitHubClient::detect_authentication("none").unwrap();
        assert_eq!(strategy, AuthStrategy::Anonymous);
        assert!(token.is_none());
    }

    #[test]
    #[serial]
    fn test_token_auth_reads_environment() {
        let original = env::var("GITHUB_TOKEN").ok();
        env::set_var("GITHUB_TOKEN", "ghp_testtoken");

        let (strategy, token) = GitHubClient::detect_authentication("token").unwrap();
        assert_eq!(strategy, AuthStrategy::EnvironmentToken);
        assert_eq!(token.as_deref(), Some("ghp_testtoken"));

        env::set_var("GITHUB_TOKEN", "");
        assert!(GitHubClient::detect_authentication("token").is_err());

        match original {
            Some(value) => env::set_var("GITHUB_TOKEN", value),
            None => env::remove_var("GITHUB_TOKEN"),
        }
    }
}
