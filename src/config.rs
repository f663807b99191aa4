use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TABLE_PREFIX: &str = "object_eb_";

fn default_table_prefix() -> String {
    DEFAULT_TABLE_PREFIX.to_owned()
}

/// Runtime knobs, read once when an adapter is constructed.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Settings {
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
    #[serde(default)]
    pub strict_validation: bool,
    #[serde(default)]
    pub max_items: Option<usize>,
    #[serde(default)]
    pub query_debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            table_prefix: default_table_prefix(),
            strict_validation: false,
            max_items: None,
            query_debug: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    Read(std::io::Error),
    #[error("Failed to parse TOML settings: {0}")]
    ParseToml(toml::de::Error),
    #[error("Failed to parse YAML settings: {0}")]
    ParseYaml(serde_yaml::Error),
}

impl Settings {
    /// Loads settings from a `.toml` file, or YAML for any other extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(SettingsError::Read)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content).map_err(SettingsError::ParseToml),
            _ => serde_yaml::from_str(&content).map_err(SettingsError::ParseYaml),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub key: String,
    pub value: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum Kind {
    Input {
        #[serde(default)]
        max_length: Option<u32>,
    },
    Textarea,
    Wysiwyg,
    Numeric,
    Checkbox,
    Date,
    Select {
        #[serde(default)]
        options: Vec<SelectOption>,
    },
    Multiselect {
        #[serde(default)]
        options: Vec<SelectOption>,
    },
    Language,
    Country,
    Link,
    Image,
    ManyToOneRelation {
        #[serde(default)]
        classes: Vec<String>,
    },
    ManyToManyRelation {
        #[serde(default)]
        classes: Vec<String>,
    },
    Localizedfields {
        #[serde(default)]
        children: Vec<FieldDeclaration>,
    },
    Block {
        #[serde(default)]
        children: Vec<FieldDeclaration>,
    },
    Fieldcollections {
        #[serde(default)]
        allowed: Vec<String>,
    },
    Objectbricks {
        #[serde(default)]
        allowed: Vec<String>,
    },
    Classificationstore,
    AdvancedManyToManyRelation,
    ReverseObjectRelation,
    ExtendedBlock(Box<FieldTypeDefinition>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindTag {
    Input,
    Textarea,
    Wysiwyg,
    Numeric,
    Checkbox,
    Date,
    Select,
    Multiselect,
    Language,
    Country,
    Link,
    Image,
    ManyToOneRelation,
    ManyToManyRelation,
    Localizedfields,
    Block,
    Fieldcollections,
    Objectbricks,
    Classificationstore,
    AdvancedManyToManyRelation,
    ReverseObjectRelation,
    ExtendedBlock,
}

impl std::fmt::Display for KindTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Debug>::fmt(self, f)
    }
}

impl Kind {
    pub fn tag(&self) -> KindTag {
        match self {
            Self::Input { .. } => KindTag::Input,
            Self::Textarea => KindTag::Textarea,
            Self::Wysiwyg => KindTag::Wysiwyg,
            Self::Numeric => KindTag::Numeric,
            Self::Checkbox => KindTag::Checkbox,
            Self::Date => KindTag::Date,
            Self::Select { .. } => KindTag::Select,
            Self::Multiselect { .. } => KindTag::Multiselect,
            Self::Language => KindTag::Language,
            Self::Country => KindTag::Country,
            Self::Link => KindTag::Link,
            Self::Image => KindTag::Image,
            Self::ManyToOneRelation { .. } => KindTag::ManyToOneRelation,
            Self::ManyToManyRelation { .. } => KindTag::ManyToManyRelation,
            Self::Localizedfields { .. } => KindTag::Localizedfields,
            Self::Block { .. } => KindTag::Block,
            Self::Fieldcollections { .. } => KindTag::Fieldcollections,
            Self::Objectbricks { .. } => KindTag::Objectbricks,
            Self::Classificationstore => KindTag::Classificationstore,
            Self::AdvancedManyToManyRelation => KindTag::AdvancedManyToManyRelation,
            Self::ReverseObjectRelation => KindTag::ReverseObjectRelation,
            Self::ExtendedBlock(_) => KindTag::ExtendedBlock,
        }
    }
}

impl KindTag {
    /// Kinds that can never be declared inside an extended block.
    pub fn is_forbidden_in_block(self) -> bool {
        matches!(
            self,
            Self::Localizedfields
                | Self::Block
                | Self::Fieldcollections
                | Self::Objectbricks
                | Self::Classificationstore
                | Self::AdvancedManyToManyRelation
                | Self::ReverseObjectRelation
                | Self::ExtendedBlock
        )
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FieldDeclaration {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub localized: bool,
    #[serde(flatten)]
    pub kind: Kind,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BlockDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDeclaration>,
}

impl BlockDefinition {
    pub fn field(&self, name: &str) -> Option<&FieldDeclaration> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn plain_fields(&self) -> impl Iterator<Item = &FieldDeclaration> {
        self.fields.iter().filter(|field| !field.localized)
    }

    pub fn localized_fields(&self) -> impl Iterator<Item = &FieldDeclaration> {
        self.fields.iter().filter(|field| field.localized)
    }
}

/// Class-definition-time configuration of one extended-block field.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct FieldTypeDefinition {
    #[serde(default)]
    pub block_definitions: IndexMap<String, BlockDefinition>,
    #[serde(default)]
    pub max_items: Option<usize>,
    #[serde(default)]
    pub min_items: Option<usize>,
    #[serde(default)]
    pub lazy_loading: bool,
    #[serde(default)]
    pub collapsible: bool,
    #[serde(default)]
    pub collapsed: bool,
    /// Overrides the prefix from [`Settings`] for this field only.
    #[serde(default)]
    pub table_prefix: Option<String>,
    /// Set by the host when the field sits inside a document-wide localization container.
    #[serde(skip)]
    pub inside_localizedfields: bool,
}

impl FieldTypeDefinition {
    pub fn has_localized_fields(&self) -> bool {
        self.block_definitions
            .values()
            .any(|block| block.localized_fields().next().is_some())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ClassDefinition {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDeclaration>,
}

impl ClassDefinition {
    /// Top-level extended-block fields, in declaration order.
    pub fn extended_blocks(&self) -> impl Iterator<Item = (&str, &FieldTypeDefinition)> {
        self.fields.iter().filter_map(|field| match &field.kind {
            Kind::ExtendedBlock(definition) => Some((field.name.as_str(), definition.as_ref())),
            _ => None,
        })
    }
}
