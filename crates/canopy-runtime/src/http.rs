#![forbid(unsafe_code)]

//! Blocking HTTP client for the treatment service.

use std::time::Duration;

use canopy_core::{Action, PlanSummary, ProjectAreaId, StandId, TreatmentPlan, TreatmentPlanId};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info_span};

use crate::backend::TreatmentBackend;
use crate::config::BackendConfig;
use crate::error::BackendError;

#[derive(Debug, Serialize)]
struct SetTreatmentsBody<'a> {
    project_area: ProjectAreaId,
    action: &'a Action,
    stand_ids: &'a [StandId],
}

#[derive(Debug, Serialize)]
struct RemoveTreatmentsBody<'a> {
    stand_ids: &'a [StandId],
}

/// [`TreatmentBackend`] over JSON/HTTP.
#[derive(Debug, Clone)]
pub struct HttpTreatmentBackend {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpTreatmentBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone().filter(|t| !t.is_empty()),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn plan_url(&self, plan: TreatmentPlanId) -> String {
        format!("{}/v2/treatment_plans/{plan}/", self.base_url)
    }

    #[must_use]
    pub fn summary_url(&self, plan: TreatmentPlanId) -> String {
        format!("{}summary/", self.plan_url(plan))
    }

    #[must_use]
    pub fn prescriptions_url(&self, plan: TreatmentPlanId) -> String {
        format!("{}treatment_prescriptions/", self.plan_url(plan))
    }

    #[must_use]
    pub fn delete_prescriptions_url(&self, plan: TreatmentPlanId) -> String {
        format!("{}delete_prescriptions/", self.prescriptions_url(plan))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, BackendError> {
        let response = self.authorize(self.client.get(url)).send()?;
        let body = check_status(response)?;
        Ok(serde_json::from_str(&body)?)
    }

    fn post_json<T: Serialize + ?Sized>(&self, url: &str, payload: &T) -> Result<(), BackendError> {
        let request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(payload);
        let response = self.authorize(request).send()?;
        let body = check_status(response)?;
        debug!(url, response_bytes = body.len(), "mutation acknowledged");
        Ok(())
    }
}

fn check_status(response: reqwest::blocking::Response) -> Result<String, BackendError> {
    let status = response.status();
    let body = response.text()?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl TreatmentBackend for HttpTreatmentBackend {
    fn summary(&self, plan: TreatmentPlanId) -> Result<PlanSummary, BackendError> {
        let _span = info_span!("canopy.http.summary", plan = plan.get()).entered();
        self.get_json(&self.summary_url(plan))
    }

    fn set_treatments(
        &self,
        plan: TreatmentPlanId,
        project_area: ProjectAreaId,
        action: &Action,
        stand_ids: &[StandId],
    ) -> Result<(), BackendError> {
        let _span = info_span!(
            "canopy.http.set_treatments",
            plan = plan.get(),
            project_area = project_area.get(),
            stand_count = stand_ids.len()
        )
        .entered();
        self.post_json(
            &self.prescriptions_url(plan),
            &SetTreatmentsBody {
                project_area,
                action,
                stand_ids,
            },
        )
    }

    fn remove_treatments(
        &self,
        plan: TreatmentPlanId,
        stand_ids: &[StandId],
    ) -> Result<(), BackendError> {
        let _span = info_span!(
            "canopy.http.remove_treatments",
            plan = plan.get(),
            stand_count = stand_ids.len()
        )
        .entered();
        self.post_json(
            &self.delete_prescriptions_url(plan),
            &RemoveTreatmentsBody { stand_ids },
        )
    }

    fn treatment_plan(&self, plan: TreatmentPlanId) -> Result<TreatmentPlan, BackendError> {
        let _span = info_span!("canopy.http.treatment_plan", plan = plan.get()).entered();
        self.get_json(&self.plan_url(plan))
    }
}
