//! 配置模块，负责从JSON配置文件加载schema定义
//!
//! 宿主系统用一个JSON文档描述实体类型：字段、类型、可空性、choice选项
//! 和关系目标。`into_model` 把它变成查询引擎使用的 [`SchemaModel`]。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::schema::{
    EntitySchema, FieldDescriptor, SchemaModel, DEFAULT_MAX_RELATION_DEPTH,
};

/// Schema配置错误
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "配置错误: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}

/// 一个choice选项；label 缺省时使用 value 本身
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceConfig {
    pub value: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// 单个字段的配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    /// 字段类型: text / number / boolean / date / datetime / choice / relation
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub choices: Vec<ChoiceConfig>,
    /// relation 字段的目标实体名
    #[serde(default)]
    pub relation: Option<String>,
}

/// 单个实体的配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    pub fields: Vec<FieldConfig>,
}

/// 整个schema的配置结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// 查询的根实体名
    pub root: String,
    /// 关系路径的最大深度
    #[serde(default = "default_max_relation_depth")]
    pub max_relation_depth: usize,
    /// 实体名到实体配置的映射
    pub entities: HashMap<String, EntityConfig>,
}

fn default_max_relation_depth() -> usize {
    DEFAULT_MAX_RELATION_DEPTH
}

impl SchemaConfig {
    /// 从JSON文件加载schema配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        // 检查文件是否存在
        if !path_ref.exists() {
            return Err(ConfigError::new(format!(
                "配置文件不存在: {}",
                path_ref.display()
            )));
        }

        // 读取文件内容
        let content = fs::read_to_string(path_ref).map_err(|e| {
            ConfigError::new(format!("无法读取配置文件 {}: {}", path_ref.display(), e))
        })?;

        Self::from_json_str(&content)
            .map_err(|e| ConfigError::new(format!("{} ({})", e.message, path_ref.display())))
    }

    /// 从JSON字符串解析schema配置
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content)
            .map_err(|e| ConfigError::new(format!("无法解析JSON配置: {e}")))
    }

    /// 把配置转换成可用于验证和补全的schema模型
    pub fn into_model(self) -> Result<SchemaModel, ConfigError> {
        let mut builder =
            SchemaModel::builder(self.root).max_relation_depth(self.max_relation_depth);
        for (name, entity) in self.entities {
            let mut fields = Vec::with_capacity(entity.fields.len());
            for field in entity.fields {
                fields.push(build_field(&name, field)?);
            }
            builder = builder.entity(EntitySchema::new(name, fields));
        }
        builder
            .build()
            .map_err(|e| ConfigError::new(e.to_string()))
    }

    /// 内置的演示schema（用于测试或fallback）
    pub fn default() -> Self {
        let demo = r#"{
            "root": "book",
            "max_relation_depth": 5,
            "entities": {
                "book": {
                    "fields": [
                        {"name": "title", "type": "text"},
                        {"name": "price", "type": "number"},
                        {"name": "published", "type": "date"},
                        {"name": "available", "type": "boolean"},
                        {"name": "genre", "type": "choice", "choices": [
                            {"value": "fiction", "label": "Fiction"},
                            {"value": "nonfiction", "label": "Non-fiction"},
                            {"value": "poetry", "label": "Poetry"}
                        ]},
                        {"name": "notes", "type": "text", "nullable": true},
                        {"name": "author", "type": "relation", "relation": "author"}
                    ]
                },
                "author": {
                    "fields": [
                        {"name": "name", "type": "text"},
                        {"name": "age", "type": "number"},
                        {"name": "email", "type": "text"},
                        {"name": "country", "type": "relation", "relation": "country"}
                    ]
                },
                "country": {
                    "fields": [
                        {"name": "name", "type": "text"},
                        {"name": "code", "type": "text"}
                    ]
                }
            }
        }"#;
        Self::from_json_str(demo).expect("built-in demo schema is valid")
    }
}

/// 把单个字段配置转换成字段描述符
fn build_field(entity: &str, field: FieldConfig) -> Result<FieldDescriptor, ConfigError> {
    let descriptor = match field.field_type.as_str() {
        "text" => FieldDescriptor::text(&field.name),
        "number" => FieldDescriptor::number(&field.name),
        "boolean" => FieldDescriptor::boolean(&field.name),
        "date" => FieldDescriptor::date(&field.name),
        "datetime" => FieldDescriptor::datetime(&field.name),
        "choice" => {
            let choices = field.choices.iter().map(|c| {
                let label = c.label.clone().unwrap_or_else(|| c.value.clone());
                (c.value.clone(), label)
            });
            FieldDescriptor::choice(&field.name, choices)
        }
        "relation" => {
            let Some(target) = &field.relation else {
                return Err(ConfigError::new(format!(
                    "字段 {entity}.{} 是relation类型但缺少relation目标",
                    field.name
                )));
            };
            FieldDescriptor::relation(&field.name, target)
        }
        other => {
            return Err(ConfigError::new(format!(
                "字段 {entity}.{} 的类型 \"{other}\" 无法识别",
                field.name
            )));
        }
    };
    let descriptor = if field.nullable {
        descriptor.nullable()
    } else {
        descriptor
    };
    Ok(descriptor)
}
