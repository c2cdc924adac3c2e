use std::sync::Arc;

use crate::{
    config::Configuration, faststart::Rewrite, ffprobe::Probe, repo::ArcRepo, store::ArcStore,
    tmp_file::ArcTmpDir,
};

#[cfg(test)]
pub(crate) mod testing;

#[derive(Clone)]
pub(crate) struct State {
    pub(super) config: Configuration,
    pub(super) tmp_dir: ArcTmpDir,
    pub(super) repo: ArcRepo,
    pub(super) store: ArcStore,
    pub(super) probe: Arc<dyn Probe>,
    pub(super) rewriter: Arc<dyn Rewrite>,
}
