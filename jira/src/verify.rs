//! Startup/configuration verification against a live tracker instance.
//!
//! Backs the CLI `verify` subcommand: checks that the credentials work, that
//! the issue types and priorities the portal maps onto exist, and that every
//! configured project is reachable.

use reqwest::header::ACCEPT;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;

use intake_core::Project;

use crate::client::JiraClient;
use crate::error::JiraError;
use crate::error::Result;

/// Issue types the portal files tickets as.
const REQUIRED_ISSUE_TYPES: &[&str] = &["Bug", "Task"];
/// Priorities the urgency field maps onto.
const REQUIRED_PRIORITIES: &[&str] = &["Low", "Medium", "High"];

#[derive(Debug, Deserialize)]
struct Myself {
    #[serde(rename = "displayName")]
    display_name: String,
    #[serde(rename = "emailAddress", default)]
    email_address: String,
}

#[derive(Debug, Deserialize)]
struct NamedEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ProjectInfo {
    name: String,
}

/// One configured project's verification outcome.
#[derive(Debug, Clone)]
pub struct ProjectCheck {
    pub slug: String,
    pub key: String,
    pub configured_name: String,
    /// Name reported by the tracker when the project is reachable.
    pub found: Option<String>,
}

/// What `verify_config` learned about the instance.
#[derive(Debug, Clone)]
pub struct ConfigReport {
    pub user: String,
    pub user_email: String,
    pub issue_types: Vec<String>,
    pub missing_issue_types: Vec<String>,
    pub priorities: Vec<String>,
    pub missing_priorities: Vec<String>,
    pub projects: Vec<ProjectCheck>,
}

impl ConfigReport {
    pub fn is_complete(&self) -> bool {
        self.missing_issue_types.is_empty()
            && self.missing_priorities.is_empty()
            && self.projects.iter().all(|p| p.found.is_some())
    }
}

impl JiraClient {
    /// Verify credentials, issue types, priorities and project access.
    /// Authentication failure is an error; missing types/priorities and
    /// unreachable projects are reported, not fatal.
    pub async fn verify_config(
        &self,
        projects: impl IntoIterator<Item = (&str, Project)>,
    ) -> Result<ConfigReport> {
        let myself: Myself = self.get_json("myself").await?;

        let issue_types: Vec<NamedEntity> = self.get_json("issuetype").await?;
        let issue_types: Vec<String> = issue_types.into_iter().map(|t| t.name).collect();
        let missing_issue_types = missing(REQUIRED_ISSUE_TYPES, &issue_types);

        let priorities: Vec<NamedEntity> = self.get_json("priority").await?;
        let priorities: Vec<String> = priorities.into_iter().map(|p| p.name).collect();
        let missing_priorities = missing(REQUIRED_PRIORITIES, &priorities);

        let mut checks = Vec::new();
        for (slug, project) in projects {
            let found = match self
                .get_json::<ProjectInfo>(&format!("project/{}", project.key))
                .await
            {
                Ok(info) => Some(info.name),
                Err(e) => {
                    tracing::warn!(project = %project.key, error = %e, "project probe failed");
                    None
                }
            };
            checks.push(ProjectCheck {
                slug: slug.to_string(),
                key: project.key.to_string(),
                configured_name: project.name.to_string(),
                found,
            });
        }

        Ok(ConfigReport {
            user: myself.display_name,
            user_email: myself.email_address,
            issue_types,
            missing_issue_types,
            priorities,
            missing_priorities,
            projects: checks,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http()
            .get(self.api_url(path))
            .header(AUTHORIZATION, self.auth())
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(JiraError::Api {
                status: status.as_u16(),
                message: format!("GET {path} failed"),
            });
        }
        Ok(response.json().await?)
    }
}

fn missing(required: &[&str], present: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !present.iter().any(|p| p == *name))
        .map(|name| (*name).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::config::JiraConfig;
    use pretty_assertions::assert_eq;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    fn test_client(host: &str) -> JiraClient {
        JiraClient::new(&JiraConfig {
            host: host.to_string(),
            email: "bot@acme.com".to_string(),
            api_token: "token".to_string(),
        })
        .expect("client")
    }

    async fn mount_get(server: &MockServer, route: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn reports_missing_types_and_unreachable_projects() {
        let server = MockServer::start().await;
        mount_get(
            &server,
            "/rest/api/3/myself",
            serde_json::json!({ "displayName": "Portal Bot", "emailAddress": "bot@acme.com" }),
        )
        .await;
        mount_get(
            &server,
            "/rest/api/3/issuetype",
            serde_json::json!([{ "id": "1", "name": "Bug" }, { "id": "2", "name": "Story" }]),
        )
        .await;
        mount_get(
            &server,
            "/rest/api/3/priority",
            serde_json::json!([
                { "id": "1", "name": "Low" },
                { "id": "2", "name": "Medium" },
                { "id": "3", "name": "High" }
            ]),
        )
        .await;
        mount_get(
            &server,
            "/rest/api/3/project/HIR",
            serde_json::json!({ "id": "100", "key": "HIR", "name": "HIRAOKA" }),
        )
        .await;
        // GB is not mocked: the probe 404s.

        let report = test_client(&server.uri())
            .verify_config([
                (
                    "hiraoka",
                    Project {
                        key: "HIR",
                        name: "HIRAOKA",
                    },
                ),
                (
                    "goodyear",
                    Project {
                        key: "GB",
                        name: "Goodyear Brasil",
                    },
                ),
            ])
            .await
            .expect("report");

        assert_eq!(report.user, "Portal Bot");
        assert_eq!(report.missing_issue_types, vec!["Task".to_string()]);
        assert!(report.missing_priorities.is_empty());
        assert_eq!(report.projects.len(), 2);
        assert_eq!(report.projects[0].found.as_deref(), Some("HIRAOKA"));
        assert_eq!(report.projects[1].found, None);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn authentication_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/3/myself"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .verify_config(std::iter::empty::<(&str, Project)>())
            .await
            .err()
            .expect("should fail");
        assert!(matches!(err, JiraError::Api { status: 401, .. }));
    }
}
