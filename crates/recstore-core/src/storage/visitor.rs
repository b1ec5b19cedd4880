//! Structural record visitor
//!
//! Consistency checking and store-copy tooling walk records through
//! [`RecordVisitor`]. Each store dispatches its records to exactly one
//! branch (see `RecordFormat::accept`). Branches default to doing nothing,
//! so a visitor only implements what it cares about. A branch failure is
//! returned unchanged to whoever called `accept`.

use crate::storage::record::{
    DynamicRecord, NodeRecord, PropertyRecord, RelationshipRecord, TokenRecord,
};

/// One method per concrete record kind
pub trait RecordVisitor {
    /// Failure type raised by the visitor
    type Error;

    /// Node records
    fn process_node(&mut self, _record: &NodeRecord) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Relationship records
    fn process_relationship(&mut self, _record: &RelationshipRecord) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Property records
    fn process_property(&mut self, _record: &PropertyRecord) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Label token records
    fn process_label_token(&mut self, _record: &TokenRecord) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Relationship type token records
    fn process_relationship_type_token(
        &mut self,
        _record: &TokenRecord,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Property key token records
    fn process_property_key_token(&mut self, _record: &TokenRecord) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Dynamic records of string stores (string properties, token names)
    fn process_string(&mut self, _record: &DynamicRecord) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Dynamic records of array property stores
    fn process_array(&mut self, _record: &DynamicRecord) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Dynamic records of the node label store
    fn process_label_array_with_owner(
        &mut self,
        _record: &DynamicRecord,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
}
