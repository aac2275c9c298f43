//! View Descriptions
//!
//! Immutable node descriptions and the `h` function that builds them.

mod builder;
mod node;

pub use builder::{flatten, h};
pub use node::{
    Child, Component, Element, Key, Leaf, Node, NodeRef, PropValue, Props, RenderFn, StyleValue, Tag, Value,
};
