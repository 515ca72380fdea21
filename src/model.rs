pub type NodeId = u64;
pub type RelId = u64;
pub type TypeId = u32;
pub type KeyId = u32;
pub type TxId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_owned())
    }
}

/// Direction of a relationship relative to one of its endpoints. A
/// self-loop is tagged `Both` and counted once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

impl Direction {
    /// Whether a relationship stored under `self` should be yielded when
    /// iterating in direction `wanted`.
    pub fn matches(self, wanted: Direction) -> bool {
        matches!(
            (self, wanted),
            (Direction::Both, _)
                | (_, Direction::Both)
                | (Direction::Outgoing, Direction::Outgoing)
                | (Direction::Incoming, Direction::Incoming)
        )
    }
}

/// Identity of a lockable / change-tracked entity. The graph itself is an
/// entity too: it carries properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityRef {
    Node(NodeId),
    Rel(RelId),
    Graph,
}

impl EntityRef {
    pub fn kind_name(&self) -> &'static str {
        match self {
            EntityRef::Node(_) => "Node",
            EntityRef::Rel(_) => "Relationship",
            EntityRef::Graph => "Graph",
        }
    }
}

/// Id namespaces handed to the id generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Node,
    Relationship,
    RelationshipType,
    PropertyKey,
}
