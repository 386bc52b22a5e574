//! Scripted reporting API for tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{EmbedToken, EmbedTokenRequest, Report, ReportingApi, ReportingError};

/// What the next `generate_embed_token` call returns
#[derive(Debug, Clone)]
pub enum TokenOutcome {
    Success,
    RequiresIdentity,
    Fail(u16, String),
}

#[derive(Default)]
pub struct StubReporting {
    reports: Vec<Report>,
    dataset_roles: HashMap<String, Vec<String>>,
    fail_listing: bool,
    outcomes: Mutex<VecDeque<TokenOutcome>>,
    requests: Mutex<Vec<EmbedTokenRequest>>,
    token_calls: AtomicUsize,
}

impl StubReporting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reports(mut self, reports: Vec<Report>) -> Self {
        self.reports = reports;
        self
    }

    pub fn with_dataset_roles(mut self, dataset_id: &str, roles: &[&str]) -> Self {
        self.dataset_roles.insert(
            dataset_id.to_string(),
            roles.iter().map(|r| r.to_string()).collect(),
        );
        self
    }

    /// Make every listing call fail with a 500
    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Outcomes consumed in order; once exhausted, calls succeed
    pub fn with_token_outcomes(self, outcomes: Vec<TokenOutcome>) -> Self {
        *self.outcomes.lock().unwrap() = outcomes.into();
        self
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn token_requests(&self) -> Vec<EmbedTokenRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn listing_failure(&self) -> Result<(), ReportingError> {
        if self.fail_listing {
            Err(ReportingError::Upstream {
                status: 500,
                body: "listing unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ReportingApi for StubReporting {
    async fn list_reports(&self) -> Result<Vec<Report>, ReportingError> {
        self.listing_failure()?;
        Ok(self.reports.clone())
    }

    async fn get_report(&self, report_id: &str) -> Result<Report, ReportingError> {
        self.listing_failure()?;
        self.reports
            .iter()
            .find(|r| r.id == report_id)
            .cloned()
            .ok_or_else(|| ReportingError::Upstream {
                status: 404,
                body: format!("report {report_id} not found"),
            })
    }

    async fn list_dataset_roles(&self, dataset_id: &str) -> Result<Vec<String>, ReportingError> {
        self.listing_failure()?;
        Ok(self.dataset_roles.get(dataset_id).cloned().unwrap_or_default())
    }

    async fn generate_embed_token(
        &self,
        request: &EmbedTokenRequest,
    ) -> Result<EmbedToken, ReportingError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(TokenOutcome::Success);

        match outcome {
            TokenOutcome::Success => Ok(EmbedToken {
                token: format!("embed-token-{}", self.token_calls()),
                token_id: None,
                expiration: Some("2030-01-01T00:00:00Z".to_string()),
            }),
            TokenOutcome::RequiresIdentity => Err(ReportingError::Upstream {
                status: 400,
                body: r#"{"error":{"code":"InvalidRequest","message":"Creating embed token for accessing dataset requires effective identity to be provided"}}"#.to_string(),
            }),
            TokenOutcome::Fail(status, body) => Err(ReportingError::Upstream { status, body }),
        }
    }
}
