//! Per-route requirement declarations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::context::ContextType;

/// Requirements a route declares.
///
/// Each field maps to one gate. An absent category (`None` or `false`) means
/// the gate is skipped, not trivially passed. `permissions: Some(vec![])` is
/// a declared, if empty, permission requirement and still runs the check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Requirements {
    /// Accepted context types.
    pub contexts: Option<Vec<ContextType>>,
    /// The user must have authorized the application.
    pub authorization: bool,
    /// Scopes the user's token must hold, in the order they are reported.
    pub permissions: Option<Vec<String>>,
    /// The viewer must administer the page hosting the tab.
    pub page_admin: bool,
}

impl Requirements {
    /// No requirements; every gate is skipped.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn contexts(mut self, contexts: impl IntoIterator<Item = ContextType>) -> Self {
        self.contexts = Some(contexts.into_iter().collect());
        self
    }

    pub fn authorization(mut self) -> Self {
        self.authorization = true;
        self
    }

    pub fn permissions<S: Into<String>>(mut self, scopes: impl IntoIterator<Item = S>) -> Self {
        self.permissions = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    pub fn page_admin(mut self) -> Self {
        self.page_admin = true;
        self
    }

    /// Returns true if no gate will run.
    pub fn is_empty(&self) -> bool {
        self.contexts.is_none()
            && !self.authorization
            && self.permissions.is_none()
            && !self.page_admin
    }
}

/// Lookup of the requirements declared for a route.
pub trait RequirementSource: Send + Sync {
    /// Requirements for `route`, or `None` when the route declares nothing.
    fn requirements(&self, route: &str) -> Option<Requirements>;
}

/// In-memory requirement table keyed by route path.
///
/// # Example
///
/// ```rust
/// use canvasgate_core::{ContextType, RequirementSource, Requirements, StaticRequirements};
///
/// let routes = StaticRequirements::new()
///     .route("/tab", Requirements::none().contexts([ContextType::Tab]))
///     .route("/publish", Requirements::none().authorization().permissions(["publish_stream"]));
///
/// assert!(routes.requirements("/tab").is_some());
/// assert!(routes.requirements("/other").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticRequirements {
    routes: HashMap<String, Requirements>,
}

impl StaticRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare requirements for a route, replacing any earlier declaration.
    pub fn route(mut self, path: impl Into<String>, requirements: Requirements) -> Self {
        self.insert(path, requirements);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, requirements: Requirements) {
        self.routes.insert(path.into(), requirements);
    }

    /// Merge another table into this one. Entries from `other` win.
    pub fn extend(&mut self, other: StaticRequirements) {
        self.routes.extend(other.routes);
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl RequirementSource for StaticRequirements {
    fn requirements(&self, route: &str) -> Option<Requirements> {
        self.routes.get(route).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_option_names() {
        let requirements: Requirements = serde_json::from_str(
            r#"{"contexts": ["tab"], "authorization": true, "permissions": ["email", "publish"], "page_admin": true}"#,
        )
        .unwrap();

        assert_eq!(requirements.contexts, Some(vec![ContextType::Tab]));
        assert!(requirements.authorization);
        assert_eq!(
            requirements.permissions,
            Some(vec!["email".to_string(), "publish".to_string()])
        );
        assert!(requirements.page_admin);
    }

    #[test]
    fn test_absent_options_are_skipped_categories() {
        let requirements: Requirements = serde_json::from_str("{}").unwrap();
        assert!(requirements.is_empty());

        let requirements: Requirements = serde_json::from_str(r#"{"permissions": []}"#).unwrap();
        assert!(!requirements.is_empty());
        assert_eq!(requirements.permissions, Some(vec![]));
    }

    #[test]
    fn test_builder() {
        let requirements = Requirements::none()
            .contexts([ContextType::Canvas, ContextType::Tab])
            .authorization()
            .permissions(["read"])
            .page_admin();

        assert_eq!(
            requirements.contexts,
            Some(vec![ContextType::Canvas, ContextType::Tab])
        );
        assert!(requirements.authorization);
        assert!(requirements.page_admin);
    }

    #[test]
    fn test_static_requirements_lookup() {
        let mut routes =
            StaticRequirements::new().route("/a", Requirements::none().authorization());
        routes.extend(StaticRequirements::new().route("/b", Requirements::none().page_admin()));

        assert_eq!(routes.len(), 2);
        assert!(routes.requirements("/a").unwrap().authorization);
        assert!(routes.requirements("/b").unwrap().page_admin);
        assert!(routes.requirements("/c").is_none());
    }

    #[test]
    fn test_static_requirements_from_json_table() {
        let routes: StaticRequirements = serde_json::from_str(
            r#"{"/tab": {"contexts": ["tab"]}, "/open": {}}"#,
        )
        .unwrap();

        assert_eq!(
            routes.requirements("/tab").unwrap().contexts,
            Some(vec![ContextType::Tab])
        );
        assert!(routes.requirements("/open").unwrap().is_empty());
    }
}
