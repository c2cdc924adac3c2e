mod aspect;
mod auth;
mod config;
mod error;
mod error_code;
mod faststart;
mod ffprobe;
mod future;
mod ingest;
mod init_metrics;
mod init_tracing;
mod locator;
mod process;
mod repo;
mod signed_url;
mod state;
mod store;
mod thumbnail;
mod tmp_file;

#[cfg(test)]
mod tests;

use actix_form_data::{Field, Form, FormData, Multipart, Value};
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{
    path::{Component, Path},
    sync::Arc,
};
use tokio_util::io::ReaderStream;
use tracing::Instrument;
use tracing_actix_web::TracingLogger;
use uuid::Uuid;

use self::{
    config::Configuration,
    error::{Error, UploadError},
    faststart::{FfMpeg, Rewrite},
    ffprobe::{FfProbe, Probe},
    init_tracing::init_tracing,
    repo::{RepoError, VideoRecord},
    state::State,
    store::{file_store::FileStore, object_store::ObjectStore, ArcStore, ObjectKey},
    tmp_file::TmpDir,
};

/// A configured tubely server, ready to run
pub struct TubelyConfiguration {
    config: Configuration,
}

fn format_error(e: &dyn std::error::Error) -> String {
    let mut out = e.to_string();

    let mut source = e.source();
    while let Some(e) = source {
        out.push_str(": ");
        out.push_str(&e.to_string());
        source = e.source();
    }

    out
}

fn video_id(req: &HttpRequest) -> Result<Uuid, Error> {
    let id = req.match_info().get("video_id").unwrap_or_default();

    Uuid::parse_str(id).map_err(|e| UploadError::InvalidVideoId(e).into())
}

fn request_state(req: &HttpRequest) -> web::Data<State> {
    req.app_data::<web::Data<State>>()
        .expect("No state in request")
        .clone()
}

fn transform_error(error: actix_form_data::Error) -> actix_web::Error {
    let error: Error = error.into();
    let error: actix_web::Error = error.into();
    error
}

struct Upload(Value<ObjectKey>);

impl FormData for Upload {
    type Item = ObjectKey;
    type Error = Error;

    fn form(req: &HttpRequest) -> Result<Form<Self::Item, Self::Error>, Self::Error> {
        let state = request_state(req);

        let video_id = video_id(req)?;
        let user_id = auth::authenticate(req, &state.config.auth.jwt_secret)?;

        // A single 'video' file, validated and published as it streams in
        Ok(Form::new()
            .max_files(1)
            .max_file_size(state.config.media.max_file_size)
            .transform_error(transform_error)
            .field(
                "video",
                Field::file(move |filename, content_type, stream| {
                    let state = state.clone();

                    let span = tracing::info_span!("video-upload", ?filename, %video_id);

                    Box::pin(
                        async move {
                            ingest::ingest(&state, video_id, user_id, content_type.as_ref(), stream)
                                .await
                        }
                        .instrument(span),
                    )
                }),
            ))
    }

    fn extract(value: Value<Self::Item>) -> Result<Self, Self::Error> {
        Ok(Upload(value))
    }
}

struct Thumbnail(Value<VideoRecord>);

impl FormData for Thumbnail {
    type Item = VideoRecord;
    type Error = Error;

    fn form(req: &HttpRequest) -> Result<Form<Self::Item, Self::Error>, Self::Error> {
        let state = request_state(req);

        let video_id = video_id(req)?;
        let user_id = auth::authenticate(req, &state.config.auth.jwt_secret)?;

        Ok(Form::new()
            .max_files(1)
            .max_file_size(thumbnail::MAX_THUMBNAIL_SIZE)
            .transform_error(transform_error)
            .field(
                "thumbnail",
                Field::file(move |filename, content_type, stream| {
                    let state = state.clone();

                    let span = tracing::info_span!("thumbnail-upload", ?filename, %video_id);

                    Box::pin(
                        async move {
                            thumbnail::save(&state, video_id, user_id, content_type.as_ref(), stream)
                                .await
                        }
                        .instrument(span),
                    )
                }),
            ))
    }

    fn extract(value: Value<Self::Item>) -> Result<Self, Self::Error> {
        Ok(Thumbnail(value))
    }
}

/// Handle responding to successful uploads
#[tracing::instrument(name = "Uploaded video", skip(value))]
async fn upload(Multipart(Upload(value)): Multipart<Upload>) -> Result<HttpResponse, Error> {
    let key = value
        .map()
        .and_then(|mut m| m.remove("video"))
        .and_then(|v| v.file())
        .ok_or(UploadError::NoFiles)?
        .result;

    Ok(HttpResponse::Ok().json(key.into_string()))
}

#[tracing::instrument(name = "Uploaded thumbnail", skip(value))]
async fn upload_thumbnail(
    Multipart(Thumbnail(value)): Multipart<Thumbnail>,
) -> Result<HttpResponse, Error> {
    let video = value
        .map()
        .and_then(|mut m| m.remove("thumbnail"))
        .and_then(|v| v.file())
        .ok_or(UploadError::NoFiles)?
        .result;

    Ok(HttpResponse::Ok().json(&video))
}

#[derive(Debug, serde::Deserialize)]
struct NewVideo {
    title: String,
    description: String,
}

#[tracing::instrument(name = "Creating video", skip(req, state, body))]
async fn create_video(
    req: HttpRequest,
    state: web::Data<State>,
    body: web::Json<NewVideo>,
) -> Result<HttpResponse, Error> {
    let user_id = auth::authenticate(&req, &state.config.auth.jwt_secret)?;

    let NewVideo { title, description } = body.into_inner();

    let video = state.repo.create_video(user_id, title, description).await?;

    Ok(HttpResponse::Created().json(&video))
}

#[tracing::instrument(name = "Fetching video", skip(req, state))]
async fn video(req: HttpRequest, state: web::Data<State>) -> Result<HttpResponse, Error> {
    let video_id = video_id(&req)?;
    let user_id = auth::authenticate(&req, &state.config.auth.jwt_secret)?;

    let video = state
        .repo
        .video(video_id)
        .await?
        .ok_or(RepoError::NotFound(video_id))?;

    if video.user_id != user_id {
        return Err(RepoError::NotOwner(video_id).into());
    }

    let video = signed_url::sign_video(&*state.store, video).await?;

    Ok(HttpResponse::Ok().json(&video))
}

async fn open_file(path: &Path) -> Result<tokio::fs::File, Error> {
    match tokio::fs::File::open(path).await {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(UploadError::MissingFile.into()),
        Err(e) => Err(e.into()),
    }
}

fn content_type_for(path: &Path) -> mime::Mime {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("mp4") => "video/mp4".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        Some("jpeg" | "jpg") => mime::IMAGE_JPEG,
        Some("png") => mime::IMAGE_PNG,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

/// Serve a thumbnail from the assets directory
#[tracing::instrument(name = "Serving asset", skip(state))]
async fn serve_asset(
    file: web::Path<String>,
    state: web::Data<State>,
) -> Result<HttpResponse, Error> {
    let file = file.into_inner();

    let is_file_name = matches!(
        Path::new(&file).components().collect::<Vec<_>>().as_slice(),
        [Component::Normal(_)]
    );

    if !is_file_name {
        return Err(UploadError::MissingFile.into());
    }

    let path = state.config.server.assets_root.join(&file);
    let reader = open_file(&path).await?;

    Ok(HttpResponse::Ok()
        .content_type(content_type_for(&path))
        .streaming(ReaderStream::new(reader)))
}

#[derive(Debug, serde::Deserialize)]
struct SignedQuery {
    expires: i64,
    signature: String,
}

/// Serve a video from the filesystem store to holders of a signed url
#[tracing::instrument(name = "Serving file", skip(store, query))]
async fn serve_file(
    path: web::Path<(String, String)>,
    query: web::Query<SignedQuery>,
    store: web::Data<FileStore>,
) -> Result<HttpResponse, Error> {
    let (container, key) = path.into_inner();
    let SignedQuery { expires, signature } = query.into_inner();

    let path = store
        .verify(&container, &key, expires, &signature)
        .map_err(store::StoreError::from)?;

    let reader = open_file(&path).await?;

    let content_type = match store.content_type(&path).await {
        Some(content_type) => content_type,
        None => content_type_for(&path),
    };

    Ok(HttpResponse::Ok()
        .content_type(content_type)
        .streaming(ReaderStream::new(reader)))
}

async fn healthz(state: web::Data<State>) -> Result<HttpResponse, Error> {
    state.repo.health_check().await?;
    state.store.health_check().await?;
    Ok(HttpResponse::Ok().finish())
}

fn configure_endpoints(
    config: &mut web::ServiceConfig,
    state: State,
    file_store: Option<FileStore>,
) {
    config
        .app_data(web::Data::new(state))
        .route("/healthz", web::get().to(healthz))
        .service(
            web::scope("/api")
                .service(web::resource("/videos").route(web::post().to(create_video)))
                .service(web::resource("/videos/{video_id}").route(web::get().to(video)))
                .service(
                    web::resource("/video_upload/{video_id}").route(web::post().to(upload)),
                )
                .service(
                    web::resource("/thumbnail_upload/{video_id}")
                        .route(web::post().to(upload_thumbnail)),
                ),
        )
        .service(web::resource("/videos/{video_id}").route(web::post().to(upload)))
        .service(web::resource("/assets/{file}").route(web::get().to(serve_asset)));

    if let Some(file_store) = file_store {
        config.app_data(web::Data::new(file_store)).service(
            web::resource("/files/{container}/{key:.*}").route(web::get().to(serve_file)),
        );
    }
}

async fn report_pending(state: &State) -> Result<(), RepoError> {
    for pending in state.repo.pending_locators().await? {
        tracing::warn!(
            "Locator {} for video {} was reserved at {} but never confirmed, the object may be orphaned",
            pending.locator,
            pending.video_id,
            pending.reserved_at
        );
    }

    Ok(())
}

async fn launch(state: State, file_store: Option<FileStore>) -> std::io::Result<()> {
    let address = state.config.server.address;

    tracing::info!("Starting tubely on {address}");

    HttpServer::new(move || {
        let state = state.clone();
        let file_store = file_store.clone();

        App::new()
            .wrap(TracingLogger::default())
            .configure(move |sc| configure_endpoints(sc, state, file_store))
    })
    .bind(address)?
    .run()
    .await
}

impl TubelyConfiguration {
    /// Build the configuration from commandline arguments, the environment and an optional file
    pub fn build_default() -> color_eyre::Result<Self> {
        Ok(TubelyConfiguration {
            config: config::configure()?,
        })
    }

    /// Build the configuration without reading the commandline
    ///
    /// Defaults are overridden by `config_file` and then by `TUBELY__` environment variables.
    /// When `save_to` is given, the resulting configuration is written there as TOML.
    pub fn from_file<P: AsRef<Path>, Q: AsRef<Path>>(
        config_file: Option<P>,
        save_to: Option<Q>,
    ) -> color_eyre::Result<Self> {
        Ok(TubelyConfiguration {
            config: config::configure_without_clap(config_file, save_to)?,
        })
    }

    /// Install the default tubely tracer
    ///
    /// This is probably not useful for 3rd party applications that install their own tracing
    /// subscribers.
    pub fn install_tracing(self) -> color_eyre::Result<Self> {
        init_tracing(&self.config.tracing)?;
        Ok(self)
    }

    pub fn install_metrics(self) -> color_eyre::Result<Self> {
        if let Some(addr) = self.config.metrics.prometheus_address {
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()?;

            init_metrics::init_metrics();
        }

        Ok(self)
    }

    /// Run the tubely server until it's shut down
    pub async fn run(self) -> color_eyre::Result<()> {
        let TubelyConfiguration { config } = self;

        let tmp_dir = TmpDir::init(&config.server.temporary_directory).await?;
        tokio::fs::create_dir_all(&config.server.assets_root).await?;

        let repo = repo::open(&config.repo)?;

        let timeout = config.media.process_timeout();
        let probe: Arc<dyn Probe> = Arc::new(FfProbe::new(&config.media.ffprobe_path, timeout));
        let rewriter: Arc<dyn Rewrite> = Arc::new(FfMpeg::new(&config.media.ffmpeg_path, timeout));

        let (store, file_store): (ArcStore, Option<FileStore>) = match config.store.clone() {
            config::Store::Filesystem(config::Filesystem {
                path,
                container,
                signing_secret,
            }) => {
                let store = FileStore::build(
                    path,
                    container,
                    signing_secret,
                    config.server.public_url.clone(),
                )
                .await?;

                (Arc::new(store.clone()), Some(store))
            }
            config::Store::ObjectStorage(object_storage) => {
                (Arc::new(ObjectStore::build(object_storage)?), None)
            }
        };

        let state = State {
            config,
            tmp_dir: tmp_dir.clone(),
            repo,
            store,
            probe,
            rewriter,
        };

        report_pending(&state).await?;

        launch(state, file_store).await?;

        tmp_dir.cleanup().await?;

        Ok(())
    }
}
