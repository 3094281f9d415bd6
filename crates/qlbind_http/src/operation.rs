//! Operation selection and the method guard.

use crate::error::ProtocolError;
use hyper::Method;
use qlbind_syntax::ast::{Document, OperationDefinition};

pub use qlbind_syntax::OperationType as OperationKind;

/// The operation chosen to run.
#[derive(Debug, Clone, Copy)]
pub struct SelectedOperation<'d> {
    pub definition: &'d OperationDefinition,
    pub kind: OperationKind,
}

impl<'d> SelectedOperation<'d> {
    fn new(definition: &'d OperationDefinition) -> Self {
        Self {
            definition,
            kind: definition.operation,
        }
    }

    pub fn name(&self) -> Option<&'d str> {
        self.definition.name()
    }
}

/// Picks the operation to execute.
///
/// A lone operation runs when no name is given; otherwise the name must match
/// one operation exactly.
pub fn select_operation<'d>(
    document: &'d Document,
    operation_name: Option<&str>,
) -> Result<SelectedOperation<'d>, ProtocolError> {
    let mut operations = document.operations();
    let Some(first) = operations.next() else {
        return Err(ProtocolError::document("Must provide an operation."));
    };

    match operation_name {
        None if operations.next().is_none() => Ok(SelectedOperation::new(first)),
        None => Err(ProtocolError::AmbiguousOperation),
        Some(name) => document
            .operations()
            .find(|op| op.name() == Some(name))
            .map(SelectedOperation::new)
            .ok_or_else(|| ProtocolError::UnknownOperationName(name.to_string())),
    }
}

/// Rejects mutations and subscriptions that arrive over GET.
pub fn guard_method(method: &Method, operation: &SelectedOperation<'_>) -> Result<(), ProtocolError> {
    match operation.kind {
        OperationKind::Query => Ok(()),
        kind if *method == Method::GET => Err(ProtocolError::MutationViaUnsafeMethod(kind)),
        _ => Ok(()),
    }
}
