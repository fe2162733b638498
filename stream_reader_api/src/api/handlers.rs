use crate::api::converters::{
    batch_to_dto, endpoint_to_dto, parse_param, stats_to_dto, stream_to_dto, vhost_to_dto,
};
use crate::api::{
    ConnectionDto, HealthDto, MessageBatchDto, ReadMessagesParams, StreamDto, StreamPath,
    StreamStatsDto, VirtualHostDto,
};
use crate::error::ApplicationError;
use axum::extract::{Path, Query, State};
use axum::Json;
use std::sync::Arc;
use stream_reader::manager::ConnectionManager;
use stream_reader::queries::read_messages::DEFAULT_READ_LIMIT;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type ApiResult<T> = Result<Json<T>, ApplicationError>;

pub(crate) async fn health() -> Json<HealthDto> {
    Json(HealthDto { status: "ok" })
}

pub(crate) async fn list_connections(
    State(manager): State<Arc<ConnectionManager>>,
) -> Json<Vec<ConnectionDto>> {
    Json(
        manager
            .list_connections()
            .iter()
            .map(endpoint_to_dto)
            .collect(),
    )
}

pub(crate) async fn list_vhosts(
    State(manager): State<Arc<ConnectionManager>>,
) -> ApiResult<Vec<VirtualHostDto>> {
    // cancels in-flight broker calls when the client goes away
    let cancellation_token = CancellationToken::new();
    let _guard = cancellation_token.clone().drop_guard();

    let vhosts = manager
        .list_vhosts(&cancellation_token)
        .await
        .map_err(|e| ApplicationError::from_reader("Failed to list vhosts", e))?;

    Ok(Json(vhosts.into_iter().map(vhost_to_dto).collect()))
}

pub(crate) async fn list_streams(
    State(manager): State<Arc<ConnectionManager>>,
) -> ApiResult<Vec<StreamDto>> {
    let cancellation_token = CancellationToken::new();
    let _guard = cancellation_token.clone().drop_guard();

    let streams = manager
        .list_streams(&cancellation_token)
        .await
        .map_err(|e| ApplicationError::from_reader("Failed to list streams", e))?;

    Ok(Json(streams.into_iter().map(stream_to_dto).collect()))
}

pub(crate) async fn get_stream_stats(
    State(manager): State<Arc<ConnectionManager>>,
    Path(path): Path<StreamPath>,
) -> ApiResult<StreamStatsDto> {
    debug!("Stats request: {:?}", path);

    let connection = manager
        .get_connection(&path.connection_id)
        .await
        .map_err(|e| ApplicationError::from_reader("Connection not found", e))?;

    let cancellation_token = CancellationToken::new();
    let _guard = cancellation_token.clone().drop_guard();

    let stats = connection
        .get_stream_stats_for_vhost(&path.vhost, &path.stream_name, &cancellation_token)
        .await
        .map_err(|e| ApplicationError::from_reader("Failed to get stream stats", e))?;

    Ok(Json(stats_to_dto(stats)))
}

pub(crate) async fn get_messages(
    State(manager): State<Arc<ConnectionManager>>,
    Path(path): Path<StreamPath>,
    Query(params): Query<ReadMessagesParams>,
) -> ApiResult<MessageBatchDto> {
    debug!("Messages request: {:?} {:?}", path, params);

    let offset = parse_param(params.offset.as_deref(), 0u64)
        .map_err(|e| ApplicationError::bad_request("Invalid offset parameter", e))?;
    let limit = parse_param(params.limit.as_deref(), DEFAULT_READ_LIMIT as i64)
        .map_err(|e| ApplicationError::bad_request("Invalid limit parameter", e))?;

    let connection = manager
        .get_connection(&path.connection_id)
        .await
        .map_err(|e| ApplicationError::from_reader("Connection not found", e))?;

    let cancellation_token = CancellationToken::new();
    let _guard = cancellation_token.clone().drop_guard();

    let batch = connection
        .read_messages_from_vhost(
            &path.vhost,
            &path.stream_name,
            offset,
            limit,
            &cancellation_token,
        )
        .await
        .map_err(|e| ApplicationError::from_reader("Failed to read messages", e))?;

    Ok(Json(batch_to_dto(batch)))
}
