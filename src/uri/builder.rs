//! Destination URI composition

/// Composes `segment/segment/.../{identifier}.{extension}` paths
///
/// Segments are trimmed of surrounding slashes and whitespace; empty
/// segments are dropped. An empty identifier is allowed and produces an
/// empty terminal name (`src/sch/tbl/.xml`).
#[derive(Clone, Debug, Default)]
pub struct UriBuilder {
    prefix: String,
    leading_slash: bool,
}

impl UriBuilder {
    /// Builder with fixed namespace segments, e.g. `[source, schema, table]`
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            prefix: join_segments(segments),
            leading_slash: false,
        }
    }

    /// Prefix every path with `/`, as document stores rooted at `/` expect
    pub fn with_leading_slash(mut self, leading_slash: bool) -> Self {
        self.leading_slash = leading_slash;
        self
    }

    /// Path for one document under this builder's namespace
    pub fn uri(&self, identifier: &str, extension: &str) -> String {
        let slash = if self.leading_slash { "/" } else { "" };
        if self.prefix.is_empty() {
            format!("{}{}.{}", slash, identifier, extension)
        } else {
            format!("{}{}/{}.{}", slash, self.prefix, identifier, extension)
        }
    }

    /// One-shot form of [`UriBuilder::new`] + [`UriBuilder::uri`]
    pub fn build<I, S>(segments: I, identifier: &str, extension: &str) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(segments).uri(identifier, extension)
    }
}

fn join_segments<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    segments
        .into_iter()
        .map(|s| s.as_ref().trim().trim_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
