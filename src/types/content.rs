//! Multimodal content parts
//!
//! [`Part`] is the provider-agnostic fragment type carried inside messages.
//! Each variant has a stable kebab-case discriminator on the wire, and only
//! the fields meaningful for the variant are serialized.

use serde::{Deserialize, Serialize};

/// Where a media payload lives.
///
/// Adapters may rewrite a `Url` or `Bytes` source into `ProviderFile` after
/// uploading it to the provider's file API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MediaSource {
    /// Remote or data URL.
    Url { url: String },
    /// Inline bytes, base64 on the wire.
    Bytes {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        /// Media type of the payload, when known.
        #[serde(skip_serializing_if = "Option::is_none")]
        mime: Option<String>,
    },
    /// Reference to a file previously registered with the provider.
    ProviderFile {
        file_id: String,
        /// Provider-issued content URI, when one was returned.
        #[serde(skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
    },
}

impl MediaSource {
    /// Create a URL source.
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    /// Create an inline bytes source.
    pub fn bytes(data: Vec<u8>, mime: Option<String>) -> Self {
        Self::Bytes { data, mime }
    }

    /// Create a provider file reference.
    pub fn provider_file(file_id: impl Into<String>) -> Self {
        Self::ProviderFile {
            file_id: file_id.into(),
            uri: None,
        }
    }

    /// Whether this source still needs a provider-side upload.
    pub fn needs_upload(&self) -> bool {
        !matches!(self, Self::ProviderFile { .. })
    }
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&base64::engine::general_purpose::STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(de)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

/// Image detail hint for providers that support it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Auto,
    Low,
    High,
}

/// A single multimodal fragment of a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    /// Plain text.
    Text { text: String },

    /// Image referenced by URL.
    Image {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<ImageDetail>,
    },

    /// Audio clip.
    Audio {
        source: MediaSource,
        #[serde(skip_serializing_if = "Option::is_none")]
        sample_rate: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        channels: Option<u8>,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_secs: Option<f64>,
    },

    /// Video clip.
    Video {
        source: MediaSource,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_secs: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },

    /// Arbitrary file (PDF, documents, etc.).
    File {
        source: MediaSource,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        purpose: Option<String>,
    },
}

impl Part {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create an image part from a URL.
    pub fn image_url(url: impl Into<String>) -> Self {
        Self::Image {
            url: url.into(),
            detail: None,
        }
    }

    /// Create an audio part.
    pub fn audio(source: MediaSource) -> Self {
        Self::Audio {
            source,
            sample_rate: None,
            channels: None,
            duration_secs: None,
        }
    }

    /// Create a video part.
    pub fn video(source: MediaSource) -> Self {
        Self::Video {
            source,
            duration_secs: None,
            width: None,
            height: None,
        }
    }

    /// Create a file part.
    pub fn file(source: MediaSource, name: Option<String>) -> Self {
        Self::File {
            source,
            name,
            purpose: None,
        }
    }

    /// The text content, if this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Mutable access to an uploadable media source, if this part has one.
    ///
    /// Image parts are URL-only and never uploaded.
    pub fn media_source_mut(&mut self) -> Option<&mut MediaSource> {
        match self {
            Self::Audio { source, .. } | Self::Video { source, .. } | Self::File { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_discriminators_are_stable() {
        let text = serde_json::to_value(Part::text("hi")).unwrap();
        assert_eq!(text["type"], "text");

        let image = serde_json::to_value(Part::image_url("https://x/y.png")).unwrap();
        assert_eq!(image["type"], "image");
        assert!(image.get("detail").is_none());

        let file = serde_json::to_value(Part::file(
            MediaSource::provider_file("abc"),
            Some("doc.pdf".into()),
        ))
        .unwrap();
        assert_eq!(file["type"], "file");
        assert_eq!(file["source"]["kind"], "provider-file");
        assert_eq!(file["source"]["file_id"], "abc");
    }

    #[test]
    fn bytes_source_round_trips_base64() {
        let src = MediaSource::bytes(vec![0, 1, 2, 3], Some("audio/wav".into()));
        let json = serde_json::to_value(&src).unwrap();
        assert_eq!(json["kind"], "bytes");
        assert_eq!(json["data"], "AAECAw==");
        let back: MediaSource = serde_json::from_value(json).unwrap();
        assert_eq!(back, src);
    }

    #[test]
    fn provider_file_does_not_need_upload() {
        assert!(MediaSource::url("https://x").needs_upload());
        assert!(MediaSource::bytes(vec![1], None).needs_upload());
        assert!(!MediaSource::provider_file("f").needs_upload());
    }
}
