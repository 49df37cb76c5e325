//! `GET /analytics/daily?companyId=<id>[&date=YYYY-MM-DD]`
//!
//! Returns the stored rollup; `date` defaults to today (UTC). 404 until the
//! first visit of that day has been rolled up.

use axum::{
  Json,
  extract::{Query, State, rejection::QueryRejection},
};
use chrono::{NaiveDate, Utc};
use engage_core::{rollup::DailyAnalytic, store::EngagementStore};
use engage_pipeline::Engine;
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyParams {
  pub company_id: Option<String>,
  pub date:       Option<NaiveDate>,
}

pub async fn daily<S>(
  State(engine): State<Engine<S>>,
  params: Result<Query<DailyParams>, QueryRejection>,
) -> Result<Json<DailyAnalytic>, ApiError>
where
  S: EngagementStore + 'static,
{
  let Query(params) = params?;
  let date = params.date.unwrap_or_else(|| Utc::now().date_naive());

  engine
    .daily_analytic(params.company_id, date)
    .await?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("no rollup for {date}")))
}
