//! Collaborator Interfaces
//!
//! Narrow views of the systems the payment core depends on but does not own:
//! the course catalog, the authentication layer, and the activity log.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::model::{CourseId, UserId};

/// The part of a course the payment core needs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    
    /// List price; `None` means the client-supplied amount is accepted
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// Course lookup
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    async fn find(&self, id: CourseId) -> Result<Option<Course>>;
}

/// Resolves a bearer credential to the current user
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Option<UserId>>;
}

/// An auditable action performed on behalf of a user
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub user_id: UserId,
    pub action: String,
    pub details: String,
}

impl Activity {
    pub fn new(user_id: UserId, action: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            user_id,
            action: action.into(),
            details: details.into(),
        }
    }
}

/// Fire-and-forget activity recording. Implementations log their own failures.
pub trait ActivitySink: Send + Sync {
    fn record(&self, activity: Activity);
}

/// Catalog held in memory, optionally loaded from a JSON array of courses
#[derive(Default)]
pub struct MemoryCatalog {
    courses: HashMap<CourseId, Course>,
}

impl MemoryCatalog {
    pub fn new(courses: impl IntoIterator<Item = Course>) -> Self {
        Self {
            courses: courses.into_iter().map(|c| (c.id, c)).collect(),
        }
    }
    
    /// Parse a JSON array of courses
    pub fn from_json(json: &str) -> Result<Self> {
        let courses: Vec<Course> = serde_json::from_str(json)
            .map_err(|e| crate::CheckoutError::Config(format!("invalid catalog: {}", e)))?;
        Ok(Self::new(courses))
    }
    
    pub fn len(&self) -> usize {
        self.courses.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }
}

#[async_trait]
impl CourseCatalog for MemoryCatalog {
    async fn find(&self, id: CourseId) -> Result<Option<Course>> {
        Ok(self.courses.get(&id).cloned())
    }
}

/// Writes activity records to the `activity` tracing target
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingActivitySink;

impl ActivitySink for TracingActivitySink {
    fn record(&self, activity: Activity) {
        tracing::info!(
            target: "activity",
            user_id = %activity.user_id,
            action = %activity.action,
            details = %activity.details,
            "Activity recorded"
        );
    }
}

/// Keeps activity records in memory (for tests)
#[derive(Clone, Default)]
pub struct MemoryActivityLog {
    entries: Arc<Mutex<Vec<Activity>>>,
}

impl MemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }
    
    pub fn entries(&self) -> Vec<Activity> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
    
    pub fn actions(&self) -> Vec<String> {
        self.entries().into_iter().map(|a| a.action).collect()
    }
}

impl ActivitySink for MemoryActivityLog {
    fn record(&self, activity: Activity) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(activity),
            Err(e) => tracing::warn!("Failed to record activity: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_catalog_from_json() {
        let catalog = MemoryCatalog::from_json(
            r#"[{"id": 42, "title": "Rust for Payments", "price": "29.99"},
                {"id": 7, "title": "Free Intro"}]"#,
        )
        .unwrap();
        
        assert_eq!(catalog.len(), 2);
        let course = catalog.find(CourseId(42)).await.unwrap().unwrap();
        assert_eq!(course.price, Some(dec!(29.99)));
        assert_eq!(catalog.find(CourseId(7)).await.unwrap().unwrap().price, None);
        assert!(catalog.find(CourseId(1)).await.unwrap().is_none());
    }

    #[test]
    fn test_activity_log_collects() {
        let log = MemoryActivityLog::new();
        log.record(Activity::new(UserId(1), "purchase_initiated", "course 42"));
        assert_eq!(log.actions(), vec!["purchase_initiated".to_string()]);
    }
}
