/// The storage prefix a video is filed under, based on its display aspect ratio
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum AspectClass {
    Portrait,
    Landscape,
    Other,
}

impl AspectClass {
    /// Only exact ratios are recognized, "16:10" or "16:9 " are `Other`
    pub(crate) fn classify(ratio: &str) -> Self {
        match ratio {
            "9:16" => Self::Portrait,
            "16:9" => Self::Landscape,
            _ => Self::Other,
        }
    }

    pub(crate) const fn prefix(self) -> &'static str {
        match self {
            Self::Portrait => "portrait",
            Self::Landscape => "landscape",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for AspectClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}
