//! HTTP endpoints for the browser page.
//!
use std::{convert::Infallible, sync::Arc};

use axum::{
    body::StreamBody,
    extract::{multipart::MultipartError, Multipart},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    Extension, Json,
};
use futures::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use common::{detection::CounterState, status::Status};

use crate::controller::DetectorSession;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>petcam</title></head>
<body>
  <h3>petcam: cat and dog counter</h3>
  <p>
    <button onclick="fetch('/start', {method: 'POST'})">Start camera</button>
    <button onclick="fetch('/stop', {method: 'POST'})">Stop camera</button>
    <input type="file" accept="image/*" onchange="uploadImage(this.files[0])">
  </p>
  <p id="status"></p>
  <p>
    Cats: <span id="cats">0</span>,
    Dogs: <span id="dogs">0</span>,
    Confidence: <span id="confidence">0</span>%
  </p>
  <img src="./stream" width="100%">
  <script>
    async function uploadImage(file) {
      if (!file) return;
      const form = new FormData();
      form.append('image', file);
      await fetch('/upload', {method: 'POST', body: form});
    }
    setInterval(async () => {
      const counters = await (await fetch('/counters')).json();
      document.getElementById('cats').textContent = counters.cats;
      document.getElementById('dogs').textContent = counters.dogs;
      document.getElementById('confidence').textContent =
        Math.round(counters.avg_confidence_percent);
      const status = await (await fetch('/status')).json();
      document.getElementById('status').textContent = status ? status.message : '';
    }, 500);
  </script>
</body>
</html>
"#;

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn healthcheck() -> &'static str {
    "Healthy"
}

/// Serve the annotated frames as a motion JPEG stream.
pub async fn annotated_stream(
    Extension(session): Extension<Arc<DetectorSession>>,
) -> impl IntoResponse {
    let frames = BroadcastStream::new(session.subscribe_frames())
        .filter_map(|item| async move { item.ok().map(Ok::<_, Infallible>) });

    (
        [(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )],
        StreamBody::new(frames),
    )
}

pub async fn counters(
    Extension(session): Extension<Arc<DetectorSession>>,
) -> Json<CounterState> {
    Json(session.counters())
}

pub async fn status(
    Extension(session): Extension<Arc<DetectorSession>>,
) -> Json<Option<Status>> {
    Json(session.current_status())
}

pub async fn start_live(
    Extension(session): Extension<Arc<DetectorSession>>,
) -> (StatusCode, String) {
    match session.start_live().await {
        Ok(()) => (StatusCode::OK, "live detection started".to_owned()),
        Err(err) => {
            log::warn!("Could not start live detection: {err:#}");
            (StatusCode::SERVICE_UNAVAILABLE, format!("{err:#}"))
        }
    }
}

pub async fn stop_live(
    Extension(session): Extension<Arc<DetectorSession>>,
) -> (StatusCode, String) {
    session.stop_live().await;
    (StatusCode::OK, "live detection stopped".to_owned())
}

/// Accept an image upload and run a single detection pass over it.
pub async fn upload_image(
    Extension(session): Extension<Arc<DetectorSession>>,
    mut multipart: Multipart,
) -> Result<Json<CounterState>, (StatusCode, String)> {
    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let data = field.bytes().await.map_err(bad_request)?;
        if data.is_empty() {
            continue;
        }

        let counters = session
            .submit_image(&data)
            .await
            .map_err(|err| (StatusCode::UNPROCESSABLE_ENTITY, format!("{err:#}")))?;
        return Ok(Json(counters));
    }

    Err((
        StatusCode::BAD_REQUEST,
        "no image field in upload".to_owned(),
    ))
}

fn bad_request(err: MultipartError) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, err.to_string())
}
