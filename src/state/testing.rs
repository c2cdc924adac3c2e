use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::{
    config::{configure_without_clap, Configuration, ProbeFailure},
    faststart::{processing_path, Rewrite, RewriteError},
    ffprobe::{Probe, ProbeError},
    process::ProcessError,
    repo::sled::SledRepo,
    state::State,
    store::file_store::FileStore,
    tmp_file::TmpDir,
};

pub(crate) const JWT_SECRET: &str = "test-secret-that-is-long-enough-for-hmac";
pub(crate) const CONTAINER: &str = "tubely-test";

/// Canned ffprobe answers
#[derive(Debug)]
pub(crate) enum FakeProbe {
    Ratio(&'static str),
    Unparseable,
    Timeout,
}

#[async_trait::async_trait(?Send)]
impl Probe for FakeProbe {
    async fn aspect_ratio(&self, _: &Path) -> Result<String, ProbeError> {
        match self {
            Self::Ratio(ratio) => Ok((*ratio).to_string()),
            Self::Unparseable => Err(ProbeError::EmptyAspectRatio),
            Self::Timeout => Err(ProbeError::Process(ProcessError::Timeout(Arc::from(
                "ffprobe",
            )))),
        }
    }
}

/// Writes `faststart:` followed by the input, so tests can tell which file was published
#[derive(Debug, Default)]
pub(crate) struct FakeRewriter {
    pub(crate) fail: bool,
    pub(crate) outputs: Mutex<Vec<PathBuf>>,
}

#[async_trait::async_trait(?Send)]
impl Rewrite for FakeRewriter {
    async fn faststart(&self, input: &Path) -> Result<PathBuf, RewriteError> {
        let output = processing_path(input)?;

        if self.fail {
            return Err(RewriteError::Process(ProcessError::Timeout(Arc::from(
                "ffmpeg",
            ))));
        }

        let mut bytes = b"faststart:".to_vec();
        bytes.extend(tokio::fs::read(input).await.expect("read input"));
        tokio::fs::write(&output, bytes).await.expect("wrote output");

        self.outputs.lock().expect("not poisoned").push(output.clone());

        Ok(output)
    }
}

pub(crate) struct TestState {
    pub(crate) state: State,
    pub(crate) file_store: FileStore,
    pub(crate) rewriter: Arc<FakeRewriter>,
    pub(crate) root: PathBuf,
}

impl TestState {
    pub(crate) async fn new(probe: FakeProbe, rewriter: FakeRewriter) -> Self {
        Self::with_policy(probe, rewriter, ProbeFailure::Degrade).await
    }

    pub(crate) async fn with_policy(
        probe: FakeProbe,
        rewriter: FakeRewriter,
        probe_failure: ProbeFailure,
    ) -> Self {
        let root = std::env::temp_dir().join(format!("tubely-test-{}", uuid::Uuid::now_v7()));

        let mut config: Configuration =
            configure_without_clap(None::<PathBuf>, None::<PathBuf>).expect("default config");

        config.auth.jwt_secret = JWT_SECRET.into();
        config.media.probe_failure = probe_failure;
        config.media.process_timeout = 5;
        config.server.temporary_directory = root.join("tmp");
        config.server.assets_root = root.join("assets");

        let tmp_dir = TmpDir::init(&config.server.temporary_directory)
            .await
            .expect("created tmp dir");

        tokio::fs::create_dir_all(&config.server.assets_root)
            .await
            .expect("created assets dir");

        let file_store = FileStore::build(
            root.join("files"),
            CONTAINER.into(),
            "signing secret".into(),
            config.server.public_url.clone(),
        )
        .await
        .expect("built store");

        let db = sled::Config::new()
            .temporary(true)
            .open()
            .expect("opened db");
        let repo = SledRepo::new(db).expect("opened trees");

        let rewriter = Arc::new(rewriter);

        let state = State {
            config,
            tmp_dir,
            repo: Arc::new(repo),
            store: Arc::new(file_store.clone()),
            probe: Arc::new(probe),
            rewriter: rewriter.clone(),
        };

        TestState {
            state,
            file_store,
            rewriter,
            root,
        }
    }

    pub(crate) fn tmp_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.state.tmp_dir.path())
            .expect("read tmp dir")
            .map(|entry| entry.expect("dir entry").path())
            .collect()
    }

    pub(crate) fn stored_file(&self, key: &str) -> PathBuf {
        self.root.join("files").join(CONTAINER).join(key)
    }

    pub(crate) fn process_timeout(&self) -> Duration {
        self.state.config.media.process_timeout()
    }
}

impl Drop for TestState {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}
