use std::fs;
use std::path::Path;

use kerf_core::document::{BlockDefinition, DEFAULT_LAYER, Document, Entity, Unsupported};
use kerf_core::geometry::Point2;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document, IoError>;
}

/// 参与测量或可识别的图元类型标签（含 DXF 别名）。
const KNOWN_KINDS: &[&str] = &[
    "line",
    "circle",
    "arc",
    "polyline",
    "lwpolyline",
    "spline",
    "block_reference",
    "insert",
    "text",
    "unsupported",
];

/// 已解码图元图的 JSON 表示。
///
/// 顶层为 `{ "entities": [...], "blocks": [...] }`，每个图元以 `kind` 字段区分类型。
/// 未知类型保留为 `Unsupported`，缺字段或类型错误的图元被丢弃；
/// 只有整体结构无法解析时才返回错误。
#[derive(Debug, Default)]
pub struct JsonFacade;

impl JsonFacade {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Document, IoError> {
        let wire: WireDocument = serde_json::from_slice(bytes)
            .map_err(|err| IoError::InvalidDocument(err.to_string()))?;

        let mut document = Document::new();
        for block in wire.blocks {
            if document.block(&block.name).is_some() {
                warn!(block = %block.name, "块定义重复，后者覆盖前者");
            }
            let entities = block
                .entities
                .into_iter()
                .enumerate()
                .filter_map(|(index, value)| decode_entity(value, &block.name, index))
                .collect();
            document.add_block_definition(BlockDefinition {
                name: block.name,
                base_point: block.base_point.unwrap_or(Point2::new(0.0, 0.0)),
                entities,
            });
        }
        for (index, value) in wire.entities.into_iter().enumerate() {
            if let Some(entity) = decode_entity(value, "*MODEL_SPACE", index) {
                document.add_entity(entity);
            }
        }

        debug!(
            entities = document.entities().count(),
            blocks = document.blocks().count(),
            "JSON 图元图解码完成"
        );
        Ok(document)
    }
}

impl DocumentLoader for JsonFacade {
    fn load(&self, path: &Path) -> Result<Document, IoError> {
        let data = fs::read(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        self.decode(&data)
    }
}

#[derive(Debug, Deserialize)]
struct WireDocument {
    #[serde(default)]
    entities: Vec<Value>,
    #[serde(default)]
    blocks: Vec<WireBlock>,
}

#[derive(Debug, Deserialize)]
struct WireBlock {
    name: String,
    #[serde(default)]
    base_point: Option<Point2>,
    #[serde(default)]
    entities: Vec<Value>,
}

/// `kind` 不区分大小写，`LINE` 与 `line` 等价。
fn decode_entity(mut value: Value, owner: &str, index: usize) -> Option<Entity> {
    let Some(kind) = value
        .get("kind")
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase)
    else {
        warn!(owner, index, "图元缺少 kind 字段，已忽略");
        return None;
    };

    if !KNOWN_KINDS.contains(&kind.as_str()) {
        let layer = value
            .get("layer")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_LAYER)
            .to_string();
        debug!(owner, index, kind = %kind, "未参与测量的图元类型");
        return Some(Entity::Unsupported(Unsupported {
            type_name: kind.to_ascii_uppercase(),
            layer,
        }));
    }

    if let Some(record) = value.as_object_mut() {
        record.insert("kind".to_string(), Value::String(kind.clone()));
    }
    match serde_json::from_value::<Entity>(value) {
        Ok(entity) => Some(entity),
        Err(err) => {
            warn!(owner, index, kind = %kind, error = %err, "图元字段无效，已忽略");
            None
        }
    }
}
