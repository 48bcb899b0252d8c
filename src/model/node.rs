//! The filter tree itself: `Node` is a sealed Block/Condition variant (per
//! the "Polymorphic node shape" design note — no inheritance, no dual
//! discriminator once past [`crate::model::parse`]).

use super::operator::OpTag;
use super::value::PredicateValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: String,
    pub logic: Logic,
    pub children: Vec<Node>,
    pub custom_block_name: Option<String>,
    /// `Some(false)` marks "require this named condition to be false" (§4.9).
    /// `Some(true)`/`None` are both ordinary blocks.
    pub is_true: Option<bool>,
}

impl Block {
    /// A block materializes as a projected boolean (§4.9) iff it carries a
    /// name and is explicitly required to be false.
    pub fn is_projected_boolean(&self) -> bool {
        self.custom_block_name.is_some() && self.is_true == Some(false)
    }
}

#[derive(Debug, Clone)]
pub struct Condition {
    pub id: String,
    pub field: String,
    pub operator: OpTag,
    pub value: PredicateValue,
    pub boolean_switch: Option<bool>,
}

#[derive(Debug, Clone)]
pub enum Node {
    Block(Block),
    Condition(Condition),
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Node::Block(b) => &b.id,
            Node::Condition(c) => &c.id,
        }
    }

    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Node::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_condition(&self) -> Option<&Condition> {
        match self {
            Node::Condition(c) => Some(c),
            _ => None,
        }
    }
}
