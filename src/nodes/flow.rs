use crate::compiler::core::TreeBuilder;
use crate::compiler::serializer::Serializer;
use crate::dsl::{self, RawFields, TaskDef};
use crate::error::SerializeError;
use crate::nodes::registry::{Variant, Verdict};
use crate::nodes::{DEFAULT_LABEL, DecisionCase, Node, NodeKind, VariantTag};
use crate::tree::IdIndex;
use serde_json::{Map, Value};
use tracing::warn;

// --- FORK / JOIN ---

pub struct ForkJoinVariant;

impl Variant for ForkJoinVariant {
    fn tag(&self) -> VariantTag {
        VariantTag::ForkJoin
    }

    fn build(&self, id: &str, raw: &mut RawFields, builder: &mut TreeBuilder<'_>) -> NodeKind {
        let branches = match raw.remove(dsl::FORK_TASKS) {
            None => Vec::new(),
            Some(value) => match serde_json::from_value::<Vec<Vec<TaskDef>>>(value.clone()) {
                Ok(lists) => lists
                    .into_iter()
                    .map(|tasks| builder.build_sequence(tasks))
                    .collect(),
                Err(e) => {
                    warn!(node_id = %id, error = %e, "forkTasks is not a list of task lists; keeping it opaque");
                    raw.insert(dsl::FORK_TASKS.to_string(), value);
                    Vec::new()
                }
            },
        };
        // The partner is filled in once the level's Join has been seen.
        NodeKind::ForkJoin {
            branches,
            join_id: None,
        }
    }

    fn to_raw(&self, node: &Node, serializer: &Serializer<'_>) -> Result<RawFields, SerializeError> {
        let mut raw = node.raw.clone();
        if let NodeKind::ForkJoin { branches, .. } = &node.kind {
            // Opaque forkTasks are still in `raw`.
            if raw.contains_key(dsl::FORK_TASKS)
                || !node.writes_list(dsl::FORK_TASKS, branches.len())
            {
                return Ok(raw);
            }
            let mut lists = Vec::with_capacity(branches.len());
            for branch in branches {
                lists.push(serializer.serialize_body(branch)?);
            }
            raw.insert(dsl::FORK_TASKS.to_string(), Value::Array(lists));
        }
        Ok(raw)
    }

    fn check(&self, node: &mut Node, index: &IdIndex) -> Verdict {
        let paired = node
            .partner()
            .and_then(|join_id| index.get(join_id))
            .is_some_and(|entry| {
                entry.tag == VariantTag::Join && entry.partner.as_deref() == Some(node.id.as_str())
            });
        if paired {
            return Verdict::Keep;
        }

        let join_id = index.unique_id(&format!("{}_join", node.id));
        warn!(node_id = %node.id, join_id = %join_id, "fork lost its join; synthesizing one");
        let join = synthesize_join(node, join_id.clone());
        if let NodeKind::ForkJoin { join_id: slot, .. } = &mut node.kind {
            *slot = Some(join_id);
        }
        Verdict::FollowWith(join)
    }
}

/// A Join for `fork` that waits on the last step of each non-empty branch.
pub(crate) fn synthesize_join(fork: &Node, join_id: String) -> Node {
    let join_on = match &fork.kind {
        NodeKind::ForkJoin { branches, .. } => branches
            .iter()
            .filter_map(|branch| branch.last().map(|n| n.id.clone()))
            .collect(),
        _ => Vec::new(),
    };
    let mut raw = RawFields::new();
    raw.insert("name".to_string(), Value::String(join_id.clone()));
    Node::new(
        join_id,
        Some(dsl::JOIN.to_string()),
        raw,
        NodeKind::Join {
            fork_id: Some(fork.id.clone()),
            join_on,
        },
    )
}

pub struct JoinVariant;

impl Variant for JoinVariant {
    fn tag(&self) -> VariantTag {
        VariantTag::Join
    }

    fn build(&self, id: &str, raw: &mut RawFields, _builder: &mut TreeBuilder<'_>) -> NodeKind {
        let join_on = match raw.get(dsl::JOIN_ON) {
            Some(Value::Array(items)) if items.iter().all(Value::is_string) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(_) => {
                warn!(node_id = %id, "joinOn is not a list of references; keeping it opaque");
                return NodeKind::Join {
                    fork_id: None,
                    join_on: Vec::new(),
                };
            }
            None => Vec::new(),
        };
        raw.remove(dsl::JOIN_ON);
        // Paired with its fork by the builder, not here.
        NodeKind::Join {
            fork_id: None,
            join_on,
        }
    }

    fn to_raw(&self, node: &Node, _serializer: &Serializer<'_>) -> Result<RawFields, SerializeError> {
        let mut raw = node.raw.clone();
        if let NodeKind::Join { join_on, .. } = &node.kind {
            // An entry whose joinOn was kept opaque still has it in `raw`.
            if !raw.contains_key(dsl::JOIN_ON)
                && node.writes_list(dsl::JOIN_ON, join_on.len())
            {
                let ids: Vec<Value> = join_on.iter().map(|id| Value::from(id.as_str())).collect();
                raw.insert(dsl::JOIN_ON.to_string(), Value::Array(ids));
            }
        }
        Ok(raw)
    }

    fn check(&self, node: &mut Node, index: &IdIndex) -> Verdict {
        let paired = node
            .partner()
            .and_then(|fork_id| index.get(fork_id))
            .is_some_and(|entry| {
                entry.tag == VariantTag::ForkJoin
                    && entry.partner.as_deref() == Some(node.id.as_str())
            });
        if paired {
            Verdict::Keep
        } else {
            warn!(node_id = %node.id, fork_id = ?node.partner(), "removing join without a matching fork");
            Verdict::Remove
        }
    }

    fn renderable(&self) -> bool {
        false
    }
}

// --- DO WHILE ---

pub struct DoWhileVariant;

impl Variant for DoWhileVariant {
    fn tag(&self) -> VariantTag {
        VariantTag::DoWhile
    }

    fn build(&self, id: &str, raw: &mut RawFields, builder: &mut TreeBuilder<'_>) -> NodeKind {
        let condition = match raw.get(dsl::LOOP_CONDITION) {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        };
        if condition.is_some() {
            raw.remove(dsl::LOOP_CONDITION);
        }
        let body = builder.take_body(id, raw, dsl::LOOP_OVER);
        NodeKind::DoWhile { body, condition }
    }

    fn to_raw(&self, node: &Node, serializer: &Serializer<'_>) -> Result<RawFields, SerializeError> {
        let mut raw = node.raw.clone();
        if let NodeKind::DoWhile { body, condition } = &node.kind {
            if let Some(condition) = condition {
                raw.insert(dsl::LOOP_CONDITION.to_string(), Value::from(condition.as_str()));
            }
            if !raw.contains_key(dsl::LOOP_OVER) && node.writes_list(dsl::LOOP_OVER, body.len()) {
                raw.insert(dsl::LOOP_OVER.to_string(), serializer.serialize_body(body)?);
            }
        }
        Ok(raw)
    }
}

// --- DECISION / SWITCH ---

pub struct DecisionVariant;

impl Variant for DecisionVariant {
    fn tag(&self) -> VariantTag {
        VariantTag::Decision
    }

    fn build(&self, id: &str, raw: &mut RawFields, builder: &mut TreeBuilder<'_>) -> NodeKind {
        let clashes = raw.contains_key(dsl::DEFAULT_CASE)
            && raw
                .get(dsl::DECISION_CASES)
                .and_then(Value::as_object)
                .is_some_and(|cases| cases.contains_key(DEFAULT_LABEL));
        if clashes {
            warn!(node_id = %id, "decision names a case \"default\" and has a defaultCase; keeping cases opaque");
            return NodeKind::Decision { cases: Vec::new() };
        }

        let mut cases = Vec::new();
        if let Some(value) = raw.remove(dsl::DECISION_CASES) {
            let parsed: Option<Vec<(String, Vec<TaskDef>)>> = match &value {
                Value::Object(map) => map
                    .iter()
                    .map(|(label, tasks)| {
                        serde_json::from_value::<Vec<TaskDef>>(tasks.clone())
                            .ok()
                            .map(|tasks| (label.clone(), tasks))
                    })
                    .collect(),
                _ => None,
            };
            match parsed {
                Some(lists) => {
                    for (label, tasks) in lists {
                        cases.push(DecisionCase {
                            label,
                            body: builder.build_sequence(tasks),
                            is_default: false,
                        });
                    }
                }
                None => {
                    warn!(node_id = %id, "decisionCases is not a map of task lists; keeping it opaque");
                    raw.insert(dsl::DECISION_CASES.to_string(), value);
                }
            }
        }
        if raw.contains_key(dsl::DEFAULT_CASE) {
            let body = builder.take_body(id, raw, dsl::DEFAULT_CASE);
            if !raw.contains_key(dsl::DEFAULT_CASE) {
                cases.push(DecisionCase {
                    label: DEFAULT_LABEL.to_string(),
                    body,
                    is_default: true,
                });
            }
        }
        NodeKind::Decision { cases }
    }

    fn to_raw(&self, node: &Node, serializer: &Serializer<'_>) -> Result<RawFields, SerializeError> {
        let mut raw = node.raw.clone();
        if let NodeKind::Decision { cases } = &node.kind {
            let mut named = Map::new();
            for case in cases.iter().filter(|c| !c.is_default) {
                named.insert(case.label.clone(), serializer.serialize_body(&case.body)?);
            }
            if !raw.contains_key(dsl::DECISION_CASES)
                && node.writes_list(dsl::DECISION_CASES, named.len())
            {
                raw.insert(dsl::DECISION_CASES.to_string(), Value::Object(named));
            }
            if let Some(default) = cases.iter().find(|c| c.is_default) {
                raw.insert(dsl::DEFAULT_CASE.to_string(), serializer.serialize_body(&default.body)?);
            }
        }
        Ok(raw)
    }
}
