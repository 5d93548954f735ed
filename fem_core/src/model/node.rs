//! # Nodes
//!
//! Nodes carry their coordinates, the fixed-dof flags and an optional lumped
//! mass. Their dimension is the number of coordinates.
//!
//! The fixed-dof vector has one flag per degree of freedom of the node's
//! dimension:
//!
//! | Coordinates | Flags | Layout |
//! |---|---|---|
//! | 1 | 1 | ux |
//! | 2 | 4 | ux, uy, rz, reserved |
//! | 3 | 6 | ux, uy, uz, rx, ry, rz |
//!
//! A vector of the wrong length is accepted here and reported by validation.

use crate::errors::{ModelError, ModelResult};
use crate::model::{check_id, Entity, EntityId, EntityKind, EntityRef};

/// Number of fixed-dof flags a node of dimension `ndm` carries.
pub fn fixed_dof_count(ndm: usize) -> Option<usize> {
    match ndm {
        1 => Some(1),
        2 => Some(4),
        3 => Some(6),
        _ => None,
    }
}

/// Degrees of freedom per node the model builder uses for dimension `ndm`.
pub fn builder_dof_count(ndm: usize) -> Option<usize> {
    match ndm {
        1 => Some(1),
        2 => Some(3),
        3 => Some(6),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: EntityId,
    pub name: Option<String>,
    pub coords: Vec<f64>,
    pub fixed_dofs: Vec<bool>,
    pub mass: Option<Vec<f64>>,
}

impl Node {
    /// Create a free node at `coords`.
    ///
    /// Fails on a zero id, an empty coordinate list or a non-finite
    /// coordinate. Any other shape problem is left to validation.
    ///
    /// ```rust
    /// use fem_core::model::Node;
    ///
    /// let node = Node::new(1, vec![0.0, 3.0]).unwrap();
    /// assert_eq!(node.dimension(), 2);
    /// assert_eq!(node.fixed_dofs, vec![false; 4]);
    /// ```
    pub fn new(id: EntityId, coords: Vec<f64>) -> ModelResult<Self> {
        check_id(EntityKind::Node, id)?;
        if coords.is_empty() {
            return Err(ModelError::invalid_input("node.coords", "[]", "At least one coordinate is required"));
        }
        if let Some(bad) = coords.iter().find(|c| !c.is_finite()) {
            return Err(ModelError::invalid_input("node.coords", bad.to_string(), "Coordinates must be finite"));
        }
        let flags = fixed_dof_count(coords.len()).unwrap_or(0);
        Ok(Node {
            id,
            name: None,
            coords,
            fixed_dofs: vec![false; flags],
            mass: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_fixed_dofs(mut self, fixed_dofs: Vec<bool>) -> Self {
        self.fixed_dofs = fixed_dofs;
        self
    }

    /// Fix every degree of freedom.
    pub fn fixed(mut self) -> Self {
        self.fixed_dofs.iter_mut().for_each(|flag| *flag = true);
        self
    }

    pub fn with_mass(mut self, mass: Vec<f64>) -> Self {
        self.mass = Some(mass);
        self
    }

    /// Number of coordinates
    pub fn dimension(&self) -> usize {
        self.coords.len()
    }

    pub fn is_restrained(&self) -> bool {
        self.fixed_dofs.iter().any(|flag| *flag)
    }
}

impl Entity for Node {
    const KIND: EntityKind = EntityKind::Node;

    fn id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn type_tag(&self) -> &'static str {
        "Node"
    }

    fn references(&self) -> Vec<EntityRef> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_defaults() {
        let node = Node::new(3, vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(node.fixed_dofs.len(), 6);
        assert!(!node.is_restrained());
        assert!(node.fixed().is_restrained());
    }

    #[test]
    fn test_wrong_flag_count_is_not_a_construction_error() {
        let node = Node::new(1, vec![0.0, 0.0, 0.0])
            .unwrap()
            .with_fixed_dofs(vec![true, true, true, false]);
        assert_eq!(node.fixed_dofs.len(), 4);
    }

    #[test]
    fn test_factory_rejects_missing_coordinates() {
        assert!(Node::new(1, vec![]).is_err());
        assert!(Node::new(0, vec![1.0]).is_err());
        assert!(Node::new(1, vec![f64::NAN]).is_err());
    }

    #[test]
    fn test_dof_tables() {
        assert_eq!(fixed_dof_count(2), Some(4));
        assert_eq!(builder_dof_count(2), Some(3));
        assert_eq!(fixed_dof_count(4), None);
    }
}
