//! Normalization of `tools/call` result content into a single JSON value.
//!
//! Tools answer with an ordered list of typed content blocks. Callers of the
//! gateway want one JSON document, so the common case of a single text block
//! holding JSON is passed through untouched and everything else degrades to a
//! `{"text": ...}` wrapper or an opaque marker.

use rust_mcp_schema::ContentBlock;
use serde_json::{json, Map, Value};

/// One unit of a tool response, reduced to what the normalizer cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentChunk {
    Text(String),
    Image,
    Audio,
    ResourceLink,
    Resource,
    /// A block whose `type` tag this client does not know.
    Unknown(String),
}

impl ContentChunk {
    pub fn text(text: impl Into<String>) -> Self {
        ContentChunk::Text(text.into())
    }

    /// Wire tag of the chunk kind, as used in the protocol's `type` field.
    pub fn kind(&self) -> &str {
        match self {
            ContentChunk::Text(_) => "text",
            ContentChunk::Image => "image",
            ContentChunk::Audio => "audio",
            ContentChunk::ResourceLink => "resource_link",
            ContentChunk::Resource => "resource",
            ContentChunk::Unknown(kind) => kind,
        }
    }

    fn from_kind(kind: &str) -> Self {
        match kind {
            "image" => ContentChunk::Image,
            "audio" => ContentChunk::Audio,
            "resource_link" => ContentChunk::ResourceLink,
            "resource" => ContentChunk::Resource,
            other => ContentChunk::Unknown(other.to_string()),
        }
    }
}

impl From<&ContentBlock> for ContentChunk {
    fn from(block: &ContentBlock) -> Self {
        match block {
            ContentBlock::TextContent(text) => ContentChunk::Text(text.text.clone()),
            other => {
                let kind = serde_json::to_value(other)
                    .ok()
                    .and_then(|value| {
                        value
                            .get("type")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .unwrap_or_else(|| "unknown".to_string());
                ContentChunk::from_kind(&kind)
            }
        }
    }
}

pub fn chunks_from_blocks(blocks: &[ContentBlock]) -> Vec<ContentChunk> {
    blocks.iter().map(ContentChunk::from).collect()
}

/// Collapses a tool's content chunks into one JSON value. Never fails.
pub fn normalize(chunks: &[ContentChunk]) -> Value {
    match chunks {
        [] => empty_object(),
        [ContentChunk::Text(text)] => normalize_single_text(text),
        _ => normalize_many(chunks),
    }
}

fn normalize_single_text(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return empty_object();
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(_) => json!({ "text": trimmed }),
    }
}

fn normalize_many(chunks: &[ContentChunk]) -> Value {
    let texts: Vec<&str> = chunks
        .iter()
        .filter_map(|chunk| match chunk {
            ContentChunk::Text(text) => Some(text.as_str()),
            ContentChunk::Image
            | ContentChunk::Audio
            | ContentChunk::ResourceLink
            | ContentChunk::Resource
            | ContentChunk::Unknown(_) => None,
        })
        .collect();

    if !texts.is_empty() {
        return json!({ "text": texts.join("\n") });
    }

    match chunks.first() {
        Some(first) => json!({ "content": first.kind() }),
        None => empty_object(),
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_is_an_empty_object() {
        assert_eq!(normalize(&[]), json!({}));
    }

    #[test]
    fn blank_single_text_is_an_empty_object() {
        assert_eq!(normalize(&[ContentChunk::text(" ")]), json!({}));
        assert_eq!(normalize(&[ContentChunk::text("\n\t ")]), json!({}));
    }

    #[test]
    fn single_text_json_passes_through() {
        let structured = json!({
            "schemas": [{"name": "public", "owner": "postgres"}],
            "count": 1,
        });
        let encoded = serde_json::to_string(&structured).expect("encode");

        assert_eq!(normalize(&[ContentChunk::text(encoded)]), structured);
    }

    #[test]
    fn single_text_json_scalars_and_arrays_pass_through() {
        assert_eq!(normalize(&[ContentChunk::text("  [1, 2, 3]\n")]), json!([1, 2, 3]));
        assert_eq!(normalize(&[ContentChunk::text("42")]), json!(42));
        assert_eq!(normalize(&[ContentChunk::text("\"quoted\"")]), json!("quoted"));
        assert_eq!(normalize(&[ContentChunk::text("null")]), Value::Null);
    }

    #[test]
    fn single_plain_text_is_wrapped_and_trimmed() {
        assert_eq!(
            normalize(&[ContentChunk::text("  No rows returned.\n")]),
            json!({"text": "No rows returned."})
        );
    }

    #[test]
    fn multiple_text_chunks_are_joined_in_order() {
        let chunks = [
            ContentChunk::text("first"),
            ContentChunk::Image,
            ContentChunk::text(" second "),
        ];

        assert_eq!(normalize(&chunks), json!({"text": "first\n second "}));
    }

    #[test]
    fn multiple_json_text_chunks_are_not_parsed() {
        let chunks = [ContentChunk::text("{\"a\":1}"), ContentChunk::text("{\"b\":2}")];

        assert_eq!(normalize(&chunks), json!({"text": "{\"a\":1}\n{\"b\":2}"}));
    }

    #[test]
    fn non_text_content_yields_a_kind_marker() {
        assert_eq!(normalize(&[ContentChunk::Image]), json!({"content": "image"}));
        assert_eq!(
            normalize(&[ContentChunk::Resource, ContentChunk::Audio]),
            json!({"content": "resource"})
        );
        assert_eq!(
            normalize(&[ContentChunk::Unknown("hologram".to_string())]),
            json!({"content": "hologram"})
        );
    }

    #[test]
    fn content_blocks_map_to_chunks() {
        let blocks: Vec<ContentBlock> = serde_json::from_value(json!([
            {"type": "text", "text": "hello"},
            {"type": "image", "data": "aGVsbG8=", "mimeType": "image/png"}
        ]))
        .expect("content blocks should parse");

        assert_eq!(
            chunks_from_blocks(&blocks),
            vec![ContentChunk::text("hello"), ContentChunk::Image]
        );
    }
}
