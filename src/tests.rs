use actix_web::{
    body::MessageBody,
    dev::ServiceResponse,
    http::{header, StatusCode},
    test, App,
};
use uuid::Uuid;

use crate::{
    auth::make_jwt,
    configure_endpoints,
    repo::VideoRecord,
    state::testing::{FakeProbe, FakeRewriter, TestState, JWT_SECRET},
};

const BOUNDARY: &str = "tubely-test-boundary";

fn multipart(field: &str, filename: &str, content_type: Option<&str>, bytes: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
    )
    .into_bytes();

    if let Some(content_type) = content_type {
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
    }
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    body
}

fn bearer(user_id: Uuid) -> (header::HeaderName, String) {
    (
        header::AUTHORIZATION,
        format!("Bearer {}", make_jwt(user_id, JWT_SECRET, 60)),
    )
}

fn upload_request(path: &str, user_id: Uuid, content_type: Option<&str>) -> test::TestRequest {
    test::TestRequest::post()
        .uri(path)
        .insert_header(bearer(user_id))
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(multipart("video", "video.mp4", content_type, b"mp4 bytes"))
}

async fn error_code<B: MessageBody>(res: ServiceResponse<B>) -> String {
    let body: serde_json::Value = test::read_body_json(res).await;

    body["code"].as_str().expect("error code").to_string()
}

async fn create_video(fixture: &TestState, user_id: Uuid) -> VideoRecord {
    fixture
        .state
        .repo
        .create_video(user_id, "a video".into(), "about something".into())
        .await
        .expect("created video")
}

async fn fixture() -> TestState {
    TestState::new(FakeProbe::Ratio("9:16"), FakeRewriter::default()).await
}

#[actix_web::test]
async fn healthz_checks_repo_and_store() {
    let fixture = fixture().await;
    let app = test::init_service(App::new().configure(|sc| {
        configure_endpoints(sc, fixture.state.clone(), Some(fixture.file_store.clone()))
    }))
    .await;

    let res = test::call_service(&app, test::TestRequest::get().uri("/healthz").to_request()).await;

    assert_eq!(res.status(), StatusCode::OK);
}

#[actix_web::test]
async fn requests_need_a_token() {
    let fixture = fixture().await;
    let app = test::init_service(App::new().configure(|sc| {
        configure_endpoints(sc, fixture.state.clone(), Some(fixture.file_store.clone()))
    }))
    .await;

    let req = test::TestRequest::post()
        .uri("/api/videos")
        .set_json(serde_json::json!({ "title": "t", "description": "d" }))
        .to_request();
    let res = test::call_service(&app, req).await;

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "missing-token");

    let req = test::TestRequest::post()
        .uri("/api/videos")
        .insert_header((header::AUTHORIZATION, "Bearer not-a-jwt"))
        .set_json(serde_json::json!({ "title": "t", "description": "d" }))
        .to_request();
    let res = test::call_service(&app, req).await;

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "invalid-token");
}

#[actix_web::test]
async fn created_videos_belong_to_the_caller() {
    let fixture = fixture().await;
    let app = test::init_service(App::new().configure(|sc| {
        configure_endpoints(sc, fixture.state.clone(), Some(fixture.file_store.clone()))
    }))
    .await;

    let user_id = Uuid::new_v4();

    let req = test::TestRequest::post()
        .uri("/api/videos")
        .insert_header(bearer(user_id))
        .set_json(serde_json::json!({
            "title": "a video",
            "description": "about something",
        }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let created: VideoRecord = test::read_body_json(res).await;
    assert_eq!(created.user_id, user_id);
    assert_eq!(created.title, "a video");
    assert!(created.video_url.is_none());

    let req = test::TestRequest::get()
        .uri(&format!("/api/videos/{}", created.id))
        .insert_header(bearer(user_id))
        .to_request();
    let fetched: VideoRecord = test::call_and_read_body_json(&app, req).await;
    assert_eq!(fetched, created);
}

#[actix_web::test]
async fn uploaded_video_is_served_through_signed_url() {
    let fixture = fixture().await;
    let app = test::init_service(App::new().configure(|sc| {
        configure_endpoints(sc, fixture.state.clone(), Some(fixture.file_store.clone()))
    }))
    .await;

    let user_id = Uuid::new_v4();
    let video = create_video(&fixture, user_id).await;
    assert!(video.video_url.is_none());

    let req = upload_request(
        &format!("/api/video_upload/{}", video.id),
        user_id,
        Some("video/mp4"),
    )
    .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let key: String = test::read_body_json(res).await;
    assert!(key.starts_with("portrait/"), "{key}");

    let req = test::TestRequest::get()
        .uri(&format!("/api/videos/{}", video.id))
        .insert_header(bearer(user_id))
        .to_request();
    let record: VideoRecord = test::call_and_read_body_json(&app, req).await;

    let url: url::Url = record
        .video_url
        .as_deref()
        .expect("video url")
        .parse()
        .expect("signed url");
    assert!(url.path().ends_with(&key), "{url}");

    let uri = format!("{}?{}", url.path(), url.query().expect("signature query"));
    let res = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("video/mp4")
    );

    let body = test::read_body(res).await;
    assert_eq!(&body[..], b"faststart:mp4 bytes");

    // tampering with the signed url is refused
    let uri = format!("{}?expires=1&signature=00", url.path());
    let res = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn declared_content_type_is_served_back() {
    let fixture = fixture().await;
    let app = test::init_service(App::new().configure(|sc| {
        configure_endpoints(sc, fixture.state.clone(), Some(fixture.file_store.clone()))
    }))
    .await;

    let user_id = Uuid::new_v4();
    let video = create_video(&fixture, user_id).await;

    let req = upload_request(
        &format!("/api/video_upload/{}", video.id),
        user_id,
        Some("video/mp4; codecs=avc1"),
    )
    .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri(&format!("/api/videos/{}", video.id))
        .insert_header(bearer(user_id))
        .to_request();
    let record: VideoRecord = test::call_and_read_body_json(&app, req).await;

    let url: url::Url = record
        .video_url
        .as_deref()
        .expect("video url")
        .parse()
        .expect("signed url");

    let uri = format!("{}?{}", url.path(), url.query().expect("signature query"));
    let res = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("video/mp4; codecs=avc1")
    );
}

#[actix_web::test]
async fn short_upload_route_is_the_same_pipeline() {
    let fixture = fixture().await;
    let app = test::init_service(App::new().configure(|sc| {
        configure_endpoints(sc, fixture.state.clone(), Some(fixture.file_store.clone()))
    }))
    .await;

    let user_id = Uuid::new_v4();
    let video = create_video(&fixture, user_id).await;

    let req = upload_request(&format!("/videos/{}", video.id), user_id, Some("video/mp4")).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let key: String = test::read_body_json(res).await;
    assert!(key.starts_with("portrait/"), "{key}");
}

#[actix_web::test]
async fn upload_client_faults() {
    let fixture = fixture().await;
    let app = test::init_service(App::new().configure(|sc| {
        configure_endpoints(sc, fixture.state.clone(), Some(fixture.file_store.clone()))
    }))
    .await;

    let user_id = Uuid::new_v4();
    let video = create_video(&fixture, user_id).await;

    let req = upload_request(
        &format!("/api/video_upload/{}", video.id),
        user_id,
        Some("image/png"),
    )
    .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "unsupported-media-type");

    let req = upload_request(&format!("/api/video_upload/{}", video.id), user_id, None).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "unsupported-media-type");
    assert!(fixture.tmp_files().is_empty());

    let req = upload_request("/api/video_upload/not-a-uuid", user_id, Some("video/mp4")).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "invalid-video-id");

    let req = upload_request(
        &format!("/api/video_upload/{}", video.id),
        Uuid::new_v4(),
        Some("video/mp4"),
    )
    .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "not-owner");

    let req = upload_request(
        &format!("/api/video_upload/{}", Uuid::new_v4()),
        user_id,
        Some("video/mp4"),
    )
    .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    assert!(fixture.tmp_files().is_empty());
}

#[actix_web::test]
async fn videos_are_private_to_their_owner() {
    let fixture = fixture().await;
    let app = test::init_service(App::new().configure(|sc| {
        configure_endpoints(sc, fixture.state.clone(), Some(fixture.file_store.clone()))
    }))
    .await;

    let video = create_video(&fixture, Uuid::new_v4()).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/videos/{}", video.id))
        .insert_header(bearer(Uuid::new_v4()))
        .to_request();
    let res = test::call_service(&app, req).await;

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn thumbnails_are_uploaded_and_served() {
    let fixture = fixture().await;
    let app = test::init_service(App::new().configure(|sc| {
        configure_endpoints(sc, fixture.state.clone(), Some(fixture.file_store.clone()))
    }))
    .await;

    let user_id = Uuid::new_v4();
    let video = create_video(&fixture, user_id).await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/thumbnail_upload/{}", video.id))
        .insert_header(bearer(user_id))
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(multipart("thumbnail", "thumb.png", Some("image/png"), b"png bytes"))
        .to_request();
    let record: VideoRecord = test::call_and_read_body_json(&app, req).await;

    let url = record.thumbnail_url.expect("thumbnail url");
    assert_eq!(url.path(), format!("/assets/{}.png", video.id));

    let res = test::call_service(&app, test::TestRequest::get().uri(url.path()).to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("image/png")
    );
    assert_eq!(&test::read_body(res).await[..], b"png bytes");

    let res = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/assets/missing.png")
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
