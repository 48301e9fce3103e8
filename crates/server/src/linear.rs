//! Linear GraphQL client.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use linear_assistant_core::{Error, Issue, IssueDraft, IssueTracker, Team};

use crate::http::{client, send_with_retry, Retry};

const ISSUE_FIELDS: &str = "id identifier title description url createdAt";
const LIST_ISSUES_LIMIT: u32 = 50;

/// Linear API client.
#[derive(Clone)]
pub struct LinearClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinearIssue {
    id: String,
    #[serde(default)]
    identifier: Option<String>,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

impl From<LinearIssue> for Issue {
    fn from(issue: LinearIssue) -> Self {
        Issue {
            id: issue.id,
            identifier: issue.identifier,
            title: issue.title,
            description: issue.description,
            url: issue.url,
            created_at: issue.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Nodes<T> {
    nodes: Vec<T>,
}

impl LinearClient {
    pub fn new(api_url: &str, api_key: &str) -> Result<Self, Error> {
        let http = client().map_err(|e| Error::Tracker(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Run a GraphQL operation. Mutations pass `Retry::ConnectOnly`.
    async fn query(&self, query: &str, variables: Value, retry: Retry) -> Result<Value, Error> {
        debug!(url = %self.api_url, "Linear API request");
        let body = json!({ "query": query, "variables": variables });

        let resp = send_with_retry("linear", retry, || {
            self.http
                .post(&self.api_url)
                // Personal API keys go in the header without a Bearer prefix.
                .header("Authorization", &self.api_key)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
        })
        .await
        .map_err(|e| Error::Tracker(format!("Failed to send Linear API request: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Tracker(format!("Linear API error: {status} - {text}")));
        }

        let parsed: GraphqlResponse = resp
            .json()
            .await
            .map_err(|e| Error::Tracker(format!("Failed to parse Linear response: {e}")))?;
        into_data(parsed)
    }
}

fn into_data(resp: GraphqlResponse) -> Result<Value, Error> {
    if let Some(errors) = resp.errors.filter(|e| !e.is_empty()) {
        let messages: Vec<_> = errors.into_iter().map(|e| e.message).collect();
        return Err(Error::Tracker(format!("Linear GraphQL error: {}", messages.join("; "))));
    }
    resp.data
        .ok_or_else(|| Error::Tracker("Linear response carried no data".into()))
}

fn field<T: for<'de> Deserialize<'de>>(data: &Value, name: &str) -> Result<T, Error> {
    serde_json::from_value(data[name].clone())
        .map_err(|e| Error::Tracker(format!("Unexpected Linear {name} shape: {e}")))
}

/// Creation-time filter for an optional window.
fn issue_filter(from_time: Option<&str>, to_time: Option<&str>) -> Value {
    let mut created_at = serde_json::Map::new();
    if let Some(from) = from_time {
        created_at.insert("gte".into(), json!(from));
    }
    if let Some(to) = to_time {
        created_at.insert("lte".into(), json!(to));
    }
    if created_at.is_empty() {
        json!({})
    } else {
        json!({ "createdAt": created_at })
    }
}

#[async_trait]
impl IssueTracker for LinearClient {
    async fn list_issues(
        &self,
        from_time: Option<&str>,
        to_time: Option<&str>,
    ) -> Result<Vec<Issue>, Error> {
        let query = format!(
            "query ListIssues($filter: IssueFilter, $first: Int) {{ \
             issues(filter: $filter, first: $first) {{ nodes {{ {ISSUE_FIELDS} }} }} }}"
        );
        let variables = json!({
            "filter": issue_filter(from_time, to_time),
            "first": LIST_ISSUES_LIMIT,
        });
        let data = self.query(&query, variables, Retry::Transient).await?;
        let issues: Nodes<LinearIssue> = field(&data, "issues")?;
        debug!(count = issues.nodes.len(), "Listed Linear issues");
        Ok(issues.nodes.into_iter().map(Issue::from).collect())
    }

    async fn list_teams(&self) -> Result<Vec<Team>, Error> {
        let data = self
            .query(
                "query ListTeams { teams { nodes { id name key } } }",
                json!({}),
                Retry::Transient,
            )
            .await?;
        let teams: Nodes<Team> = field(&data, "teams")?;
        debug!(count = teams.nodes.len(), "Listed Linear teams");
        Ok(teams.nodes)
    }

    async fn create_issue(&self, draft: &IssueDraft) -> Result<Issue, Error> {
        let query = format!(
            "mutation CreateIssue($input: IssueCreateInput!) {{ \
             issueCreate(input: $input) {{ success issue {{ {ISSUE_FIELDS} }} }} }}"
        );
        let variables = json!({
            "input": {
                "title": draft.title,
                "description": draft.description,
                "teamId": draft.team_id,
            }
        });
        let data = self.query(&query, variables, Retry::ConnectOnly).await?;

        #[derive(Deserialize)]
        struct Payload {
            success: bool,
            issue: Option<LinearIssue>,
        }
        let payload: Payload = field(&data, "issueCreate")?;
        let issue = match payload {
            Payload {
                success: true,
                issue: Some(issue),
            } => Issue::from(issue),
            _ => return Err(Error::Tracker("Linear rejected issue creation".into())),
        };

        info!(
            id = %issue.id,
            identifier = ?issue.identifier,
            team_id = %draft.team_id,
            "Created Linear issue"
        );
        Ok(issue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_filter() {
        assert_eq!(issue_filter(None, None), json!({}));
        assert_eq!(
            issue_filter(Some("2024-01-01"), None),
            json!({"createdAt": {"gte": "2024-01-01"}})
        );
        assert_eq!(
            issue_filter(Some("2024-01-01"), Some("2024-02-01")),
            json!({"createdAt": {"gte": "2024-01-01", "lte": "2024-02-01"}})
        );
    }

    #[test]
    fn test_graphql_errors_surface() {
        let resp: GraphqlResponse = serde_json::from_value(json!({
            "data": null,
            "errors": [{"message": "Authentication required"}, {"message": "again"}]
        }))
        .unwrap();
        let err = into_data(resp).unwrap_err();
        assert!(matches!(err, Error::Tracker(m) if m.contains("Authentication required; again")));
    }

    #[test]
    fn test_parse_issue_nodes() {
        let data = json!({
            "issues": {"nodes": [{
                "id": "abc",
                "identifier": "ENG-12",
                "title": "Fridge empty",
                "description": null,
                "url": "https://linear.app/acme/issue/ENG-12",
                "createdAt": "2024-05-01T10:00:00.000Z"
            }]}
        });
        let nodes: Nodes<LinearIssue> = field(&data, "issues").unwrap();
        let issue = Issue::from(nodes.nodes.into_iter().next().unwrap());
        assert_eq!(issue.identifier.as_deref(), Some("ENG-12"));
        assert_eq!(issue.created_at.as_deref(), Some("2024-05-01T10:00:00.000Z"));
        assert!(issue.description.is_none());
    }

    #[test]
    fn test_parse_teams_shape_error() {
        let err = field::<Nodes<Team>>(&json!({"teams": []}), "teams").unwrap_err();
        assert!(matches!(err, Error::Tracker(_)));
    }
}
