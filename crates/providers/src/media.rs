//! Resolving worker output into media bytes.
//!
//! GPU workers hand back either a URL to download or the media inline as
//! base64 (optionally wrapped in a `data:` URI).

use base64::Engine;

use crate::error::ProviderError;
use crate::http::ensure_success;

/// Media bytes plus the content type, when one was declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBlob {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl MediaBlob {
    /// File extension for the declared type, or `fallback`.
    pub fn extension<'a>(&self, fallback: &'a str) -> &'a str {
        match self.content_type.as_deref() {
            Some("image/png") => "png",
            Some("image/jpeg") | Some("image/jpg") => "jpg",
            Some("image/webp") => "webp",
            Some("video/mp4") => "mp4",
            Some("video/webm") => "webm",
            Some("audio/mpeg") => "mp3",
            _ => fallback,
        }
    }
}

/// Download or decode a worker output reference.
pub async fn fetch_output(client: &reqwest::Client, output: &str) -> Result<MediaBlob, ProviderError> {
    let output = output.trim();
    if output.starts_with("http://") || output.starts_with("https://") {
        let response = ensure_success(client.get(output).send().await?).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let bytes = response.bytes().await?.to_vec();
        return Ok(MediaBlob {
            bytes,
            content_type,
        });
    }
    decode_inline(output)
}

/// Decode base64 media, with or without a `data:<mime>;base64,` prefix.
pub fn decode_inline(output: &str) -> Result<MediaBlob, ProviderError> {
    let (content_type, data) = match output.strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest
                .split_once(',')
                .ok_or_else(|| ProviderError::Decode("data URI has no payload".into()))?;
            let mime = meta.strip_suffix(";base64").unwrap_or(meta);
            (Some(mime.to_string()).filter(|m| !m.is_empty()), data)
        }
        None => (None, output),
    };

    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| ProviderError::Decode(e.to_string()))?;
    if bytes.is_empty() {
        return Err(ProviderError::Decode("empty media payload".into()));
    }
    Ok(MediaBlob {
        bytes,
        content_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn decodes_bare_base64() {
        let blob = decode_inline("aGVsbG8=").unwrap();
        assert_eq!(blob.bytes, b"hello");
        assert_eq!(blob.content_type, None);
        assert_eq!(blob.extension("png"), "png");
    }

    #[test]
    fn decodes_data_uri_with_type() {
        let blob = decode_inline("data:video/mp4;base64,aGVs\nbG8=").unwrap();
        assert_eq!(blob.bytes, b"hello");
        assert_eq!(blob.content_type.as_deref(), Some("video/mp4"));
        assert_eq!(blob.extension("bin"), "mp4");
    }

    #[test]
    fn rejects_garbage() {
        assert_matches!(decode_inline("not base64!"), Err(ProviderError::Decode(_)));
        assert_matches!(decode_inline("data:image/png;base64"), Err(ProviderError::Decode(_)));
    }
}
