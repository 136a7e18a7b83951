use std::fmt;

use tracing::debug;
use url::Url;

use crate::error::{ClientError, ClientResult};

const EMBED_BASE: &str = "https://www.youtube.com/embed/";

/// Player id taken from the `v` parameter of a source video url.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmbedId(String);

impl EmbedId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn player_url(&self) -> String {
        format!("{EMBED_BASE}{}?start=0&autoplay=0", self.0)
    }
}

impl fmt::Display for EmbedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn try_embed_id(source_url: &str) -> ClientResult<Option<EmbedId>> {
    let url = Url::parse(source_url.trim())
        .map_err(|err| ClientError::Parse(format!("{source_url:?}: {err}")))?;
    Ok(url
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(EmbedId))
}

/// Like [`try_embed_id`], but a url that does not parse means "no embed".
pub fn derive_embed_id(source_url: &str) -> Option<EmbedId> {
    match try_embed_id(source_url) {
        Ok(id) => id,
        Err(err) => {
            debug!("embed: no player for source url: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_url_yields_embed_id() {
        let id = derive_embed_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s").expect("embed");
        assert_eq!(id.as_str(), "dQw4w9WgXcQ");
        assert_eq!(
            id.player_url(),
            "https://www.youtube.com/embed/dQw4w9WgXcQ?start=0&autoplay=0"
        );
    }

    #[test]
    fn malformed_url_degrades_to_no_embed() {
        assert!(derive_embed_id("not a url at all").is_none());
        assert!(derive_embed_id("").is_none());
        assert!(matches!(try_embed_id("::::"), Err(ClientError::Parse(_))));
    }

    #[test]
    fn url_without_v_parameter_has_no_embed() {
        assert_eq!(derive_embed_id("https://youtu.be/dQw4w9WgXcQ"), None);
        assert_eq!(derive_embed_id("https://www.youtube.com/watch?v="), None);
    }
}
