//! Hierarchical topic paths of the form `namespace/project/topic...`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for topic paths that cannot be split into namespace/project/topic
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TopicPathError {
    #[error("topic path must have at least three segments (namespace/project/topic), got {0}")]
    TooFewSegments(usize),

    #[error("namespace cannot be empty")]
    EmptyNamespace,

    #[error("project cannot be empty")]
    EmptyProject,

    #[error("topic cannot be empty")]
    EmptyTopic,
}

/// A transport topic split into its namespace, project and logical topic
///
/// The first two path segments are the namespace and the project; the
/// remainder (which may itself contain `/`) is the logical topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicPath {
    pub namespace: String,
    pub project: String,
    pub topic: String,
}

impl TopicPath {
    /// Create a topic path from its parts
    pub fn new(
        namespace: impl Into<String>,
        project: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            project: project.into(),
            topic: topic.into(),
        }
    }

    /// Split a transport topic into namespace, project and logical topic
    pub fn parse(path: &str) -> Result<Self, TopicPathError> {
        let mut parts = path.splitn(3, '/');
        let namespace = parts.next().unwrap_or_default();
        let project = parts.next().ok_or(TopicPathError::TooFewSegments(1))?;
        let topic = parts.next().ok_or(TopicPathError::TooFewSegments(2))?;

        if namespace.is_empty() {
            return Err(TopicPathError::EmptyNamespace);
        }
        if project.is_empty() {
            return Err(TopicPathError::EmptyProject);
        }
        if topic.is_empty() {
            return Err(TopicPathError::EmptyTopic);
        }

        Ok(Self::new(namespace, project, topic))
    }

    /// Number of `/`-separated segments in a raw transport topic
    pub fn segment_count(path: &str) -> usize {
        path.split('/').count()
    }
}

impl FromStr for TopicPath {
    type Err = TopicPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TopicPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.project, self.topic)
    }
}

/// Build a fully-qualified topic, omitting empty leading parts
///
/// An empty namespace yields `project/topic`; an empty namespace and project
/// yield the bare topic.
pub fn full_qualified_topic(namespace: &str, project: &str, topic: &str) -> String {
    if namespace.is_empty() {
        if project.is_empty() {
            return topic.to_string();
        }
        return format!("{}/{}", project, topic);
    }
    format!("{}/{}/{}", namespace, project, topic)
}
