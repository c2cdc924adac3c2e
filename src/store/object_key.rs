use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

use crate::aspect::AspectClass;

const ENTROPY_BYTES: usize = 32;

/// The name a published video is stored under, `{class}/{random}.mp4`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ObjectKey(String);

impl ObjectKey {
    /// No uniqueness check is made against the store, 256 random bits make
    /// collisions negligible
    pub(crate) fn generate(class: AspectClass) -> Self {
        let mut bytes = [0u8; ENTROPY_BYTES];
        rand::rng().fill_bytes(&mut bytes);

        ObjectKey(format!(
            "{}/{}.mp4",
            class.prefix(),
            BASE64_URL_SAFE_NO_PAD.encode(bytes)
        ))
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
