use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    handlers::common::{success_response, PaginatedResponse, PaginationParams},
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/v1/projects",
    params(PaginationParams),
    responses(
        (status = 200, description = "Projects, newest first")
    ),
    tag = "Projects"
)]
pub async fn list_projects(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (projects, total) = state
        .services
        .projects
        .list_projects(params.page, params.per_page)
        .await?;
    Ok(success_response(PaginatedResponse::new(
        projects,
        params.page,
        params.per_page,
        total,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/projects/{id}",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project", body = crate::services::projects::ProjectView),
        (status = 404, description = "Project not found")
    ),
    tag = "Projects"
)]
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let project = state.services.projects.get_project(id).await?;
    Ok(success_response(project))
}

#[utoipa::path(
    get,
    path = "/api/v1/projects/{id}/invoices",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Invoices for the project, in issue order"),
        (status = 404, description = "Project not found")
    ),
    tag = "Projects"
)]
pub async fn list_project_invoices(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let invoices = state.services.projects.list_project_invoices(id).await?;
    Ok(success_response(invoices))
}
