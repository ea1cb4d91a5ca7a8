use crate::compiler::core::TreeBuilder;
use crate::compiler::serializer::Serializer;
use crate::dsl::RawFields;
use crate::error::SerializeError;
use crate::nodes::registry::Variant;
use crate::nodes::{Node, NodeKind, VariantTag};

pub struct SimpleVariant;

impl Variant for SimpleVariant {
    fn tag(&self) -> VariantTag {
        VariantTag::Simple
    }

    fn build(&self, _id: &str, _raw: &mut RawFields, _builder: &mut TreeBuilder<'_>) -> NodeKind {
        NodeKind::Simple
    }
}

pub struct HumanVariant;

impl Variant for HumanVariant {
    fn tag(&self) -> VariantTag {
        VariantTag::Human
    }

    fn build(&self, _id: &str, _raw: &mut RawFields, _builder: &mut TreeBuilder<'_>) -> NodeKind {
        NodeKind::Human
    }
}

/// Start / End. Created by the builder, never persisted.
pub struct MarkerVariant(pub VariantTag);

impl Variant for MarkerVariant {
    fn tag(&self) -> VariantTag {
        self.0
    }

    fn build(&self, _id: &str, _raw: &mut RawFields, _builder: &mut TreeBuilder<'_>) -> NodeKind {
        match self.0 {
            VariantTag::EndMarker => NodeKind::EndMarker,
            _ => NodeKind::StartMarker,
        }
    }

    fn to_raw(&self, node: &Node, _serializer: &Serializer<'_>) -> Result<RawFields, SerializeError> {
        Err(SerializeError::SyntheticNode(node.id.clone()))
    }
}
