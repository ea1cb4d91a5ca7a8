use thiserror::Error;

/// Rejections of a structural edit. The tree is left untouched whenever one
/// of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("Node '{0}' not found")]
    TargetNotFound(String),

    #[error("Node id '{0}' is already in use")]
    DuplicateId(String),

    #[error("Node '{0}' is a start/end marker and cannot be edited")]
    MarkerNotEditable(String),

    #[error("Cannot place nodes {placement} '{anchor}'")]
    InvalidPlacement { anchor: String, placement: String },

    #[error("Node '{parent}' has no body {body}")]
    BodyNotFound { parent: String, body: String },

    #[error("Nodes '{0}' and '{1}' do not share a parent body")]
    NotSiblings(String, String),

    #[error("Selected nodes are not a contiguous run")]
    NotContiguous,

    #[error("No nodes selected")]
    EmptySelection,

    #[error("Cannot move '{0}' into its own sub-tree")]
    CyclicMove(String),

    #[error("Node '{0}' is not an inline sub-workflow")]
    NotInlineSubWorkflow(String),

    #[error("No workflow is loaded")]
    NoWorkflowLoaded,
}

/// The tree could not be turned back into a definition. This means the tree
/// itself is broken; callers must not persist anything when they see it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializeError {
    #[error("Synthetic node '{0}' found inside a body")]
    SyntheticNode(String),

    #[error("Fork/join node '{0}' has lost its partner")]
    Unpaired(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown execution status '{0}'")]
pub struct UnknownStatus(pub String);
