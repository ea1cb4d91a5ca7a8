use crate::compiler::core::TreeBuilder;
use crate::compiler::serializer::Serializer;
use crate::dsl::{self, RawFields};
use crate::error::SerializeError;
use crate::nodes::common::{HumanVariant, MarkerVariant, SimpleVariant};
use crate::nodes::flow::{DecisionVariant, DoWhileVariant, ForkJoinVariant, JoinVariant};
use crate::nodes::subworkflow::SubWorkflowVariant;
use crate::nodes::{Node, NodeKind, VariantTag};
use crate::tree::IdIndex;
use std::collections::HashMap;
use std::sync::Arc;

/// Engine task types without nested structure; they render as plain steps.
const SYSTEM_TASKS: &[&str] = &[
    "HTTP",
    "INLINE",
    "LAMBDA",
    "WAIT",
    "TERMINATE",
    "EVENT",
    "SET_VARIABLE",
    "JSON_JQ_TRANSFORM",
    "KAFKA_PUBLISH",
    "NOOP",
];

/// Outcome of a node's `check` hook.
#[derive(Debug)]
pub enum Verdict {
    Keep,
    /// Detach the node and everything it owns.
    Remove,
    /// Keep the node and place the given node right after it.
    FollowWith(Node),
}

/// Behaviour of one node variant.
///
/// The tree builder, serializer and consistency pass only ever talk to nodes
/// through this trait, so adding a variant means registering a new
/// implementation rather than editing their dispatch.
pub trait Variant: Send + Sync {
    fn tag(&self) -> VariantTag;

    /// Takes the structural fields this variant owns out of `raw` and returns
    /// the node's shape. Whatever is left in `raw` is kept verbatim.
    fn build(&self, id: &str, raw: &mut RawFields, builder: &mut TreeBuilder<'_>) -> NodeKind;

    /// Inverse of `build`: the full field map of the persisted entry.
    fn to_raw(&self, node: &Node, _serializer: &Serializer<'_>) -> Result<RawFields, SerializeError> {
        Ok(node.raw.clone())
    }

    fn check(&self, _node: &mut Node, _index: &IdIndex) -> Verdict {
        Verdict::Keep
    }

    fn renderable(&self) -> bool {
        true
    }
}

pub struct VariantRegistry {
    by_type: HashMap<String, Arc<dyn Variant>>,
    by_tag: HashMap<VariantTag, Arc<dyn Variant>>,
    fallback: Arc<dyn Variant>,
}

impl VariantRegistry {
    /// A registry that only knows the synthetic markers; every task type
    /// falls back to Simple.
    pub fn new() -> Self {
        let fallback: Arc<dyn Variant> = Arc::new(SimpleVariant);
        let mut by_tag: HashMap<VariantTag, Arc<dyn Variant>> = HashMap::new();
        by_tag.insert(VariantTag::Simple, fallback.clone());
        by_tag.insert(VariantTag::StartMarker, Arc::new(MarkerVariant(VariantTag::StartMarker)));
        by_tag.insert(VariantTag::EndMarker, Arc::new(MarkerVariant(VariantTag::EndMarker)));
        Self {
            by_type: HashMap::new(),
            by_tag,
            fallback,
        }
    }

    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(dsl::SIMPLE, Arc::new(SimpleVariant));
        registry.register(dsl::HUMAN, Arc::new(HumanVariant));
        registry.register(dsl::FORK_JOIN, Arc::new(ForkJoinVariant));
        registry.register(dsl::JOIN, Arc::new(JoinVariant));
        registry.register(dsl::DO_WHILE, Arc::new(DoWhileVariant));
        registry.register(dsl::DECISION, Arc::new(DecisionVariant));
        registry.register(dsl::SWITCH, Arc::new(DecisionVariant));
        registry.register(dsl::SUB_WORKFLOW, Arc::new(SubWorkflowVariant));
        for task_type in SYSTEM_TASKS {
            registry.register(task_type, Arc::new(SimpleVariant));
        }
        registry
    }

    pub fn register(&mut self, task_type: &str, variant: Arc<dyn Variant>) {
        self.by_tag.entry(variant.tag()).or_insert_with(|| variant.clone());
        self.by_type.insert(task_type.to_string(), variant);
    }

    pub fn resolve(&self, task_type: &str) -> Option<&Arc<dyn Variant>> {
        self.by_type.get(task_type)
    }

    pub fn fallback(&self) -> &Arc<dyn Variant> {
        &self.fallback
    }

    /// The default hooks for a tag, used when a node's own type is not
    /// registered (synthesized nodes, unknown types).
    pub fn variant(&self, tag: VariantTag) -> &dyn Variant {
        self.by_tag.get(&tag).unwrap_or(&self.fallback).as_ref()
    }

    /// The hooks for an existing node: the variant registered for its type,
    /// as long as that variant could have built it.
    pub fn variant_for(&self, node: &Node) -> &dyn Variant {
        match node
            .task_type()
            .and_then(|task_type| self.resolve(task_type))
            .filter(|variant| variant.tag() == node.tag())
        {
            Some(variant) => variant.as_ref(),
            None => self.variant(node.tag()),
        }
    }

    pub fn is_renderable(&self, node: &Node) -> bool {
        self.variant_for(node).renderable()
    }
}

impl Default for VariantRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
