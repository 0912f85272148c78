use std::collections::HashMap;

use crate::descriptor::{EntityDescriptor, RelationDescriptor};
use crate::error::Result;
use crate::graph::{DependencyGraph, GraphReport};
use crate::types::TypeTag;
use crate::validation::validate_entities;

/// Validated, immutable set of entity descriptors plus their generation order.
#[derive(Debug)]
pub struct Schema {
    entities: Vec<EntityDescriptor>,
    index: HashMap<TypeTag, usize>,
    order: Vec<TypeTag>,
    graph: GraphReport,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Entities in registration order.
    pub fn entities(&self) -> &[EntityDescriptor] {
        &self.entities
    }

    pub fn entity(&self, tag: &TypeTag) -> Option<&EntityDescriptor> {
        self.index.get(tag).map(|idx| &self.entities[*idx])
    }

    pub fn entity_by_name(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entities.iter().find(|entity| entity.name() == name)
    }

    pub fn contains(&self, tag: &TypeTag) -> bool {
        self.index.contains_key(tag)
    }

    /// Dependency-respecting order in which types are materialized.
    pub fn generation_order(&self) -> &[TypeTag] {
        &self.order
    }

    pub fn graph_report(&self) -> &GraphReport {
        &self.graph
    }

    pub fn relations(&self) -> impl Iterator<Item = &RelationDescriptor> {
        self.entities.iter().flat_map(|entity| entity.relations())
    }
}

/// Collects descriptors and validates them into a [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    entities: Vec<EntityDescriptor>,
}

impl SchemaBuilder {
    pub fn entity(mut self, entity: impl Into<EntityDescriptor>) -> Self {
        self.entities.push(entity.into());
        self
    }

    pub fn build(self) -> Result<Schema> {
        validate_entities(&self.entities)?;

        let graph = DependencyGraph::from_entities(&self.entities);
        let order = graph.generation_order()?;
        let report = graph.report();

        let index = self
            .entities
            .iter()
            .enumerate()
            .map(|(idx, entity)| (entity.tag(), idx))
            .collect();

        Ok(Schema {
            entities: self.entities,
            index,
            order,
            graph: report,
        })
    }
}
