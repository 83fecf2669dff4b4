//! `/stt` and `/tts`: per-user speech records. Both routers share the
//! handlers below and differ only in the repository they resolve.

use crate::{
    auth::CurrentUser,
    error::{not_found, ApiError, ApiResult},
    extract::{JsonBody, PathParam, QueryParams},
    routes::{ListEnvelope, MessageResponse, SearchQuery},
    AppState,
};
use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use waypoint_common::{PageRequest, WaypointError};
use waypoint_core::models::SpeechRecord;
use waypoint_core::speech::{SpeechKind, SpeechRepository};

#[derive(Debug, Deserialize)]
pub struct CreateSpeechRequest {
    pub text: String,
    pub audio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSpeechRequest {
    pub text: Option<String>,
    pub audio: Option<String>,
}

/// A speech record with its audio as base64.
#[derive(Debug, Serialize)]
pub struct SpeechResponse {
    pub id: i64,
    pub user_id: i64,
    pub text: String,
    pub audio: String,
    pub created_at: DateTime<Utc>,
}

impl From<SpeechRecord> for SpeechResponse {
    fn from(record: SpeechRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            text: record.text,
            audio: record.audio.map(|bytes| STANDARD.encode(bytes)).unwrap_or_default(),
            created_at: record.created_at,
        }
    }
}

fn decode_audio(audio: Option<&str>) -> ApiResult<Option<Vec<u8>>> {
    audio
        .map(|encoded| {
            STANDARD
                .decode(encoded.trim())
                .map_err(|_| {
                    ApiError::from(WaypointError::BadRequest(
                        "Invalid base64 audio data".to_string(),
                    ))
                })
        })
        .transpose()
}

/// Resolves which table a router serves.
trait SpeechTable {
    const KIND: SpeechKind;
    const LIST_KEY: &'static str;

    fn repo(state: &AppState) -> &SpeechRepository {
        state.core.speech(Self::KIND)
    }
}

struct Stt;
struct Tts;

impl SpeechTable for Stt {
    const KIND: SpeechKind = SpeechKind::Stt;
    const LIST_KEY: &'static str = "stts";
}

impl SpeechTable for Tts {
    const KIND: SpeechKind = SpeechKind::Tts;
    const LIST_KEY: &'static str = "ttss";
}

pub fn stt_routes() -> Router<AppState> {
    routes::<Stt>()
}

pub fn tts_routes() -> Router<AppState> {
    routes::<Tts>()
}

fn routes<T: SpeechTable + Send + Sync + 'static>() -> Router<AppState> {
    Router::new()
        .route("/", get(list_records::<T>).post(create_record::<T>))
        .route("/search", get(search_records::<T>))
        .route(
            "/:record_id",
            get(get_record::<T>)
                .put(update_record::<T>)
                .delete(delete_record::<T>),
        )
}

async fn create_record<T: SpeechTable>(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(request): JsonBody<CreateSpeechRequest>,
) -> ApiResult<Json<SpeechResponse>> {
    let audio = decode_audio(request.audio.as_deref())?;
    let record = T::repo(&state).create(user.id, &request.text, audio).await?;
    Ok(Json(record.into()))
}

async fn list_records<T: SpeechTable>(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    QueryParams(page): QueryParams<PageRequest>,
) -> ApiResult<ListEnvelope<SpeechResponse>> {
    page.validate()?;
    let records = T::repo(&state).list(user.id, page).await?;
    Ok(ListEnvelope::new(T::LIST_KEY, records.map(SpeechResponse::from)))
}

async fn search_records<T: SpeechTable>(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    QueryParams(query): QueryParams<SearchQuery>,
) -> ApiResult<ListEnvelope<SpeechResponse>> {
    let page = query.page_request()?;
    let records = T::repo(&state).search(user.id, &query.q, page).await?;
    Ok(ListEnvelope::new(T::LIST_KEY, records.map(SpeechResponse::from)))
}

async fn get_record<T: SpeechTable>(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParam(record_id): PathParam<i64>,
) -> ApiResult<Json<SpeechResponse>> {
    let record = T::repo(&state)
        .find(user.id, record_id)
        .await?
        .ok_or_else(|| not_found(T::KIND.not_found_message()))?;
    Ok(Json(record.into()))
}

async fn update_record<T: SpeechTable>(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParam(record_id): PathParam<i64>,
    JsonBody(request): JsonBody<UpdateSpeechRequest>,
) -> ApiResult<Json<SpeechResponse>> {
    let audio = decode_audio(request.audio.as_deref())?;
    let record = T::repo(&state)
        .update(user.id, record_id, request.text.as_deref(), audio)
        .await?
        .ok_or_else(|| not_found(T::KIND.not_found_message()))?;
    Ok(Json(record.into()))
}

async fn delete_record<T: SpeechTable>(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParam(record_id): PathParam<i64>,
) -> ApiResult<Json<MessageResponse>> {
    if !T::repo(&state).delete(user.id, record_id).await? {
        return Err(not_found(T::KIND.not_found_message()));
    }
    let message = match T::KIND {
        SpeechKind::Stt => "STT record deleted successfully",
        SpeechKind::Tts => "TTS record deleted successfully",
    };
    Ok(MessageResponse::new(message))
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::{app, call, register, test_state};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_stt_records_are_private() {
        let app = app(&test_state().await);
        let alice = register(&app, "alice").await;
        let bob = register(&app, "bob").await;

        let (status, created) = call(
            &app,
            Method::POST,
            "/api/v1/stt",
            Some(&alice),
            Some(json!({"text": "Сәлем", "audio": "UklGRg=="})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["audio"], "UklGRg==");
        let uri = format!("/api/v1/stt/{}", created["id"]);

        let (status, body) = call(&app, Method::GET, &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "STT record not found");

        let (_, list) = call(&app, Method::GET, "/api/v1/stt", Some(&bob), None).await;
        assert_eq!(list["total"], 0);
        let (_, list) = call(&app, Method::GET, "/api/v1/stt", Some(&alice), None).await;
        assert_eq!(list["stts"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tts_update_search_delete() {
        let app = app(&test_state().await);
        let token = register(&app, "alice").await;

        let (_, first) = call(
            &app,
            Method::POST,
            "/api/v1/tts",
            Some(&token),
            Some(json!({"text": "Good morning"})),
        )
        .await;
        assert_eq!(first["audio"], "");
        call(
            &app,
            Method::POST,
            "/api/v1/tts",
            Some(&token),
            Some(json!({"text": "Good night"})),
        )
        .await;

        let (_, list) = call(&app, Method::GET, "/api/v1/tts", Some(&token), None).await;
        assert_eq!(list["ttss"][0]["text"], "Good night");

        let uri = format!("/api/v1/tts/{}", first["id"]);
        let (status, updated) = call(
            &app,
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({"text": "Good afternoon"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["text"], "Good afternoon");

        let (_, found) = call(&app, Method::GET, "/api/v1/tts/search?q=afternoon", Some(&token), None).await;
        assert_eq!(found["total"], 1);

        let (status, body) = call(&app, Method::DELETE, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "TTS record deleted successfully");
        let (status, _) = call(&app, Method::DELETE, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_audio_and_empty_text() {
        let app = app(&test_state().await);
        let token = register(&app, "alice").await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/stt",
            Some(&token),
            Some(json!({"text": "hi", "audio": "%%%not base64%%%"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid base64 audio data");

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/stt",
            Some(&token),
            Some(json!({"text": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
