//! GitHub webhook event names and the event value handed to handlers

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::GateError;

macro_rules! event_names {
    ($($variant:ident => $name:literal,)+) => {
        /// Every event name GitHub sends in the `X-GitHub-Event` header.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EventName {
            $($variant,)+
        }

        impl EventName {
            pub const ALL: &'static [EventName] = &[$(EventName::$variant,)+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(EventName::$variant => $name,)+
                }
            }
        }

        impl FromStr for EventName {
            type Err = GateError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(EventName::$variant),)+
                    other => Err(GateError::UnknownEvent(other.to_string())),
                }
            }
        }
    };
}

event_names! {
    BranchProtectionConfiguration => "branch_protection_configuration",
    BranchProtectionRule => "branch_protection_rule",
    CheckRun => "check_run",
    CheckSuite => "check_suite",
    CodeScanningAlert => "code_scanning_alert",
    CommitComment => "commit_comment",
    Create => "create",
    CustomProperty => "custom_property",
    CustomPropertyValues => "custom_property_values",
    Delete => "delete",
    DependabotAlert => "dependabot_alert",
    DeployKey => "deploy_key",
    Deployment => "deployment",
    DeploymentProtectionRule => "deployment_protection_rule",
    DeploymentReview => "deployment_review",
    DeploymentStatus => "deployment_status",
    Discussion => "discussion",
    DiscussionComment => "discussion_comment",
    Fork => "fork",
    GithubAppAuthorization => "github_app_authorization",
    Gollum => "gollum",
    Installation => "installation",
    InstallationRepositories => "installation_repositories",
    InstallationTarget => "installation_target",
    IssueComment => "issue_comment",
    Issues => "issues",
    Label => "label",
    MarketplacePurchase => "marketplace_purchase",
    Member => "member",
    Membership => "membership",
    MergeGroup => "merge_group",
    Meta => "meta",
    Milestone => "milestone",
    OrgBlock => "org_block",
    Organization => "organization",
    Package => "package",
    PageBuild => "page_build",
    PersonalAccessTokenRequest => "personal_access_token_request",
    Ping => "ping",
    Project => "project",
    ProjectCard => "project_card",
    ProjectColumn => "project_column",
    ProjectsV2 => "projects_v2",
    ProjectsV2Item => "projects_v2_item",
    Public => "public",
    PullRequest => "pull_request",
    PullRequestReview => "pull_request_review",
    PullRequestReviewComment => "pull_request_review_comment",
    PullRequestReviewThread => "pull_request_review_thread",
    Push => "push",
    RegistryPackage => "registry_package",
    Release => "release",
    Repository => "repository",
    RepositoryAdvisory => "repository_advisory",
    RepositoryDispatch => "repository_dispatch",
    RepositoryImport => "repository_import",
    RepositoryRuleset => "repository_ruleset",
    RepositoryVulnerabilityAlert => "repository_vulnerability_alert",
    SecretScanningAlert => "secret_scanning_alert",
    SecretScanningAlertLocation => "secret_scanning_alert_location",
    SecurityAdvisory => "security_advisory",
    SecurityAndAnalysis => "security_and_analysis",
    Sponsorship => "sponsorship",
    Star => "star",
    Status => "status",
    Team => "team",
    TeamAdd => "team_add",
    Watch => "watch",
    WorkflowDispatch => "workflow_dispatch",
    WorkflowJob => "workflow_job",
    WorkflowRun => "workflow_run",
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A verified delivery, as passed to every matching handler.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub name: EventName,
    pub payload: Arc<serde_json::Value>,
}

impl WebhookEvent {
    pub fn new(id: impl Into<String>, name: EventName, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name,
            payload: Arc::new(payload),
        }
    }

    /// The payload's `action` field, e.g. `opened` for `issues.opened`.
    pub fn action(&self) -> Option<&str> {
        self.payload.get("action").and_then(|a| a.as_str())
    }
}
