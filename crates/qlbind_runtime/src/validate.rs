//! Validation of executable documents against a schema.
//!
//! Runs after parsing and before execution. Every rule reports into a
//! [`DiagnosticBag`]; a document with any error is never executed.

use crate::coerce::value_from_ast;
use crate::schema::{InputFieldDef, Schema, TypeDef, TypeRef};
use indexmap::IndexMap;
use qlbind_core::diagnostics::codes;
use qlbind_core::{DiagnosticBag, Span};
use qlbind_syntax::ast::{
    Argument, Definition, Directive, Document, FragmentDefinition, Name, OperationDefinition,
    OperationType, Selection, SelectionSet, Value,
};
use rustc_hash::{FxHashMap, FxHashSet};

/// Maximum depth of an operation's selections once fragment spreads are
/// expanded. Each field, spread and inline fragment adds a level.
pub const MAX_SELECTION_DEPTH: usize = 128;

/// Validates `document` against `schema`.
///
/// Documents nested too deeply or with fragment cycles are rejected before
/// any rule that follows fragment spreads runs.
pub fn validate(schema: &Schema, document: &Document) -> DiagnosticBag {
    let mut validator = Validator {
        schema,
        document,
        diagnostics: DiagnosticBag::new(),
    };
    validator.check_definitions();
    if !validator.check_selection_depth() || !validator.check_fragment_cycles() {
        return validator.diagnostics;
    }
    for fragment in document.fragments() {
        validator.check_fragment(fragment);
    }
    for operation in document.operations() {
        validator.check_operation(operation);
    }
    validator.diagnostics
}

/// A variable reference and the type its position expects, when known.
struct VariableUsage<'a> {
    name: &'a Name,
    expected: Option<&'a TypeRef>,
}

struct Validator<'a> {
    schema: &'a Schema,
    document: &'a Document,
    diagnostics: DiagnosticBag,
}

impl<'a> Validator<'a> {
    fn error(&mut self, code: &str, span: Span, message: String) {
        self.diagnostics.error_at(code, span, message);
    }

    fn check_definitions(&mut self) {
        let document = self.document;
        let mut operation_names = FxHashSet::default();
        let mut fragment_names = FxHashSet::default();
        let operation_count = document.operations().count();

        for definition in &document.definitions {
            match definition {
                Definition::Operation(op) => match &op.name {
                    Some(name) => {
                        if !operation_names.insert(name.as_str()) {
                            self.error(
                                codes::DUPLICATE_OPERATION,
                                name.span,
                                format!("There can be only one operation named \"{name}\"."),
                            );
                        }
                    }
                    None if operation_count > 1 => self.error(
                        codes::ANONYMOUS_NOT_ALONE,
                        op.span,
                        "This anonymous operation must be the only defined operation.".to_string(),
                    ),
                    None => {}
                },
                Definition::Fragment(fragment) => {
                    if !fragment_names.insert(fragment.name.as_str()) {
                        self.error(
                            codes::DUPLICATE_FRAGMENT,
                            fragment.name.span,
                            format!(
                                "There can be only one fragment named \"{}\".",
                                fragment.name
                            ),
                        );
                    }
                }
                Definition::Schema(def) => self.error(
                    codes::NOT_EXECUTABLE,
                    def.span,
                    "The schema definition is not executable.".to_string(),
                ),
                Definition::Type(def) => self.error(
                    codes::NOT_EXECUTABLE,
                    def.span(),
                    format!("The \"{}\" definition is not executable.", def.name()),
                ),
                Definition::Directive(def) => self.error(
                    codes::NOT_EXECUTABLE,
                    def.span,
                    format!("The \"@{}\" definition is not executable.", def.name),
                ),
            }
        }
    }

    /// Returns false if an operation exceeds [`MAX_SELECTION_DEPTH`].
    fn check_selection_depth(&mut self) -> bool {
        let document = self.document;
        let fragments = fragment_depths(document);
        let mut within_limit = true;
        for operation in document.operations() {
            let depth = selection_depth(&operation.selection_set, &fragments);
            if depth > MAX_SELECTION_DEPTH {
                self.error(
                    codes::SELECTION_TOO_DEEP,
                    operation.span,
                    format!(
                        "Operation selections are nested {depth} levels deep with fragments expanded, exceeding the limit of {MAX_SELECTION_DEPTH}."
                    ),
                );
                within_limit = false;
            }
        }
        within_limit
    }

    /// Reports every spread that leads back into its own fragment. Returns
    /// false if any was found.
    fn check_fragment_cycles(&mut self) -> bool {
        let document = self.document;
        let mut spreads: FxHashMap<&str, Vec<&Name>> = FxHashMap::default();
        for fragment in document.fragments() {
            spreads.insert(fragment.name.as_str(), fragment_spreads(fragment));
        }

        let mut acyclic = true;
        let mut done = FxHashSet::default();
        for fragment in document.fragments() {
            let root = fragment.name.as_str();
            if !done.insert(root) {
                continue;
            }
            let mut path = vec![root];
            let mut cursors = vec![0usize];
            while let (Some(&current), Some(cursor)) = (path.last(), cursors.last_mut()) {
                let Some(&spread) = spreads.get(current).and_then(|s| s.get(*cursor)) else {
                    path.pop();
                    cursors.pop();
                    continue;
                };
                *cursor += 1;
                let name = spread.as_str();
                if let Some(start) = path.iter().position(|visited| *visited == name) {
                    let via = &path[start + 1..];
                    let message = if via.is_empty() {
                        format!("Cannot spread fragment \"{spread}\" within itself.")
                    } else {
                        let via = via
                            .iter()
                            .map(|name| format!("\"{name}\""))
                            .collect::<Vec<_>>()
                            .join(", ");
                        format!("Cannot spread fragment \"{spread}\" within itself via {via}.")
                    };
                    self.error(codes::FRAGMENT_CYCLE, spread.span, message);
                    acyclic = false;
                } else if done.insert(name) {
                    path.push(name);
                    cursors.push(0);
                }
            }
        }
        acyclic
    }

    fn check_fragment(&mut self, fragment: &'a FragmentDefinition) {
        self.check_directives(&fragment.directives, "FRAGMENT_DEFINITION");
        if let Some(type_name) = self.check_type_condition(&fragment.type_condition, Some(&fragment.name)) {
            self.check_selection_set(type_name, &fragment.selection_set);
        }
    }

    /// Returns the condition's name if it names a composite type.
    fn check_type_condition(&mut self, condition: &'a Name, fragment: Option<&Name>) -> Option<&'a str> {
        let schema = self.schema;
        match schema.get_type(condition.as_str()) {
            None => {
                self.error(
                    codes::UNDEFINED_TYPE,
                    condition.span,
                    format!("Unknown type \"{condition}\"."),
                );
                None
            }
            Some(def) if !def.is_composite() => {
                let message = match fragment {
                    Some(name) => format!(
                        "Fragment \"{name}\" cannot condition on non composite type \"{condition}\"."
                    ),
                    None => format!(
                        "Fragment cannot condition on non composite type \"{condition}\"."
                    ),
                };
                self.error(codes::INVALID_TYPE, condition.span, message);
                None
            }
            Some(_) => Some(condition.as_str()),
        }
    }

    fn check_operation(&mut self, operation: &'a OperationDefinition) {
        let schema = self.schema;
        let location = match operation.operation {
            OperationType::Query => "QUERY",
            OperationType::Mutation => "MUTATION",
            OperationType::Subscription => "SUBSCRIPTION",
        };
        self.check_directives(&operation.directives, location);

        let mut defined: FxHashMap<&str, (TypeRef, bool)> = FxHashMap::default();
        for variable in &operation.variables {
            self.check_directives(&variable.directives, "VARIABLE_DEFINITION");
            let ty = TypeRef::from(&variable.ty);
            match schema.get_type(ty.named_type()) {
                None => self.error(
                    codes::UNDEFINED_TYPE,
                    variable.ty.span(),
                    format!("Unknown type \"{}\".", ty.named_type()),
                ),
                Some(def) if !def.is_input() => self.error(
                    codes::INVALID_TYPE,
                    variable.ty.span(),
                    format!(
                        "Variable \"${}\" cannot be non-input type \"{ty}\".",
                        variable.name
                    ),
                ),
                Some(_) => {}
            }
            if let Some(default) = &variable.default_value {
                if let Err(reason) = value_from_ast(schema, default, &ty, &serde_json::Map::new()) {
                    self.error(codes::INVALID_VALUE, default.span(), reason);
                }
            }
            let has_default = variable.default_value.is_some();
            if defined
                .insert(variable.name.as_str(), (ty, has_default))
                .is_some()
            {
                self.error(
                    codes::DUPLICATE_NAME,
                    variable.name.span,
                    format!(
                        "There can be only one variable named \"${}\".",
                        variable.name
                    ),
                );
            }
        }

        let Some(root) = schema.root_type_name(operation.operation) else {
            self.error(
                codes::MISSING_ROOT_TYPE,
                operation.span,
                format!(
                    "Schema is not configured to execute {} operation.",
                    operation.operation
                ),
            );
            return;
        };
        self.check_selection_set(root, &operation.selection_set);

        let mut usages = Vec::new();
        let mut visited = FxHashSet::default();
        self.collect_variable_usages(Some(root), &operation.selection_set, &mut visited, &mut usages);
        collect_directive_variables(schema, &operation.directives, &mut usages);

        let mut reported = FxHashSet::default();
        for usage in usages {
            let name = usage.name.as_str();
            match defined.get(name) {
                None => {
                    if !reported.insert(name) {
                        continue;
                    }
                    let message = match operation.name() {
                        Some(op) => {
                            format!("Variable \"${name}\" is not defined by operation \"{op}\".")
                        }
                        None => format!("Variable \"${name}\" is not defined."),
                    };
                    self.error(codes::UNDEFINED_VARIABLE, usage.name.span, message);
                }
                Some((ty, has_default)) => {
                    if let Some(expected) = usage.expected {
                        if !allowed_in_position(ty, *has_default, expected) {
                            self.error(
                                codes::VARIABLE_MISMATCH,
                                usage.name.span,
                                format!(
                                    "Variable \"${name}\" of type \"{ty}\" used in position expecting type \"{expected}\"."
                                ),
                            );
                        }
                    }
                }
            }
        }
    }

    fn check_selection_set(&mut self, parent: &'a str, selection_set: &'a SelectionSet) {
        let schema = self.schema;
        let document = self.document;
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    self.check_directives(&field.directives, "FIELD");
                    let name = field.name.as_str();
                    if name == "__typename" {
                        if field.selection_set.is_some() {
                            self.error(
                                codes::SELECTION_MISMATCH,
                                field.span,
                                "Field \"__typename\" must not have a selection since type \"String!\" has no subfields.".to_string(),
                            );
                        }
                        continue;
                    }
                    let Some(def) = schema.field(parent, name) else {
                        self.error(
                            codes::UNDEFINED_FIELD,
                            field.name.span,
                            format!("Cannot query field \"{name}\" on type \"{parent}\"."),
                        );
                        continue;
                    };
                    let coordinate = format!("{parent}.{name}");
                    self.check_arguments(
                        &def.arguments,
                        &field.arguments,
                        &format!("field \"{coordinate}\""),
                        &format!("Field \"{coordinate}\""),
                        field.span,
                    );

                    let named = def.ty.named_type();
                    let is_leaf = schema.get_type(named).is_some_and(TypeDef::is_leaf);
                    match (&field.selection_set, is_leaf) {
                        (Some(_), true) => self.error(
                            codes::SELECTION_MISMATCH,
                            field.span,
                            format!(
                                "Field \"{name}\" must not have a selection since type \"{}\" has no subfields.",
                                def.ty
                            ),
                        ),
                        (None, false) => self.error(
                            codes::SELECTION_MISMATCH,
                            field.span,
                            format!(
                                "Field \"{name}\" of type \"{}\" must have a selection of subfields. Did you mean \"{name} {{ ... }}\"?",
                                def.ty
                            ),
                        ),
                        (Some(sub), false) => self.check_selection_set(named, sub),
                        (None, true) => {}
                    }
                }
                Selection::FragmentSpread(spread) => {
                    self.check_directives(&spread.directives, "FRAGMENT_SPREAD");
                    let Some(fragment) = document.fragment(spread.name.as_str()) else {
                        self.error(
                            codes::UNDEFINED_FRAGMENT,
                            spread.name.span,
                            format!("Unknown fragment \"{}\".", spread.name),
                        );
                        continue;
                    };
                    let condition = fragment.type_condition.as_str();
                    if schema.get_type(condition).is_some_and(TypeDef::is_composite)
                        && !schema.types_overlap(parent, condition)
                    {
                        self.error(
                            codes::INVALID_SPREAD,
                            spread.span,
                            format!(
                                "Fragment \"{}\" cannot be spread here as objects of type \"{parent}\" can never be of type \"{condition}\".",
                                spread.name
                            ),
                        );
                    }
                }
                Selection::InlineFragment(inline) => {
                    self.check_directives(&inline.directives, "INLINE_FRAGMENT");
                    let type_name = match &inline.type_condition {
                        Some(condition) => {
                            let Some(type_name) = self.check_type_condition(condition, None) else {
                                continue;
                            };
                            if !schema.types_overlap(parent, type_name) {
                                self.error(
                                    codes::INVALID_SPREAD,
                                    inline.span,
                                    format!(
                                        "Fragment cannot be spread here as objects of type \"{parent}\" can never be of type \"{type_name}\"."
                                    ),
                                );
                            }
                            type_name
                        }
                        None => parent,
                    };
                    self.check_selection_set(type_name, &inline.selection_set);
                }
            }
        }
    }

    fn check_arguments(
        &mut self,
        definitions: &IndexMap<String, InputFieldDef>,
        arguments: &[Argument],
        owner: &str,
        owner_title: &str,
        span: Span,
    ) {
        let schema = self.schema;
        let mut seen = FxHashSet::default();
        for argument in arguments {
            let name = argument.name.as_str();
            if !seen.insert(name) {
                self.error(
                    codes::DUPLICATE_NAME,
                    argument.name.span,
                    format!("There can be only one argument named \"{name}\"."),
                );
                continue;
            }
            let Some(definition) = definitions.get(name) else {
                self.error(
                    codes::UNDEFINED_ARGUMENT,
                    argument.name.span,
                    format!("Unknown argument \"{name}\" on {owner}."),
                );
                continue;
            };
            if !contains_variable(&argument.value) {
                if let Err(reason) =
                    value_from_ast(schema, &argument.value, &definition.ty, &serde_json::Map::new())
                {
                    self.error(codes::INVALID_VALUE, argument.value.span(), reason);
                }
            }
        }

        for definition in definitions.values() {
            if definition.is_required() && !seen.contains(definition.name.as_str()) {
                self.error(
                    codes::MISSING_ARGUMENT,
                    span,
                    format!(
                        "{owner_title} argument \"{}\" of type \"{}\" is required, but it was not provided.",
                        definition.name, definition.ty
                    ),
                );
            }
        }
    }

    fn check_directives(&mut self, directives: &[Directive], location: &str) {
        let schema = self.schema;
        let mut seen = FxHashSet::default();
        for directive in directives {
            let name = directive.name.as_str();
            let Some(definition) = schema.directive(name) else {
                self.error(
                    codes::UNDEFINED_DIRECTIVE,
                    directive.name.span,
                    format!("Unknown directive \"@{name}\"."),
                );
                continue;
            };
            if !definition.locations.iter().any(|l| l == location) {
                self.error(
                    codes::MISPLACED_DIRECTIVE,
                    directive.span,
                    format!("Directive \"@{name}\" may not be used on {location}."),
                );
            }
            if !definition.repeatable && !seen.insert(name) {
                self.error(
                    codes::DUPLICATE_NAME,
                    directive.span,
                    format!("The directive \"@{name}\" can only be used once at this location."),
                );
            }
            self.check_arguments(
                &definition.arguments,
                &directive.arguments,
                &format!("directive \"@{name}\""),
                &format!("Directive \"@{name}\""),
                directive.span,
            );
        }
    }

    /// Walks a selection set and every fragment it reaches, recording each
    /// variable reference.
    fn collect_variable_usages(
        &self,
        parent: Option<&'a str>,
        selection_set: &'a SelectionSet,
        visited: &mut FxHashSet<&'a str>,
        usages: &mut Vec<VariableUsage<'a>>,
    ) {
        let schema = self.schema;
        let document = self.document;
        for selection in &selection_set.selections {
            collect_directive_variables(schema, selection.directives(), usages);
            match selection {
                Selection::Field(field) => {
                    let def = parent.and_then(|p| schema.field(p, field.name.as_str()));
                    for argument in &field.arguments {
                        let expected = def
                            .and_then(|d| d.arguments.get(argument.name.as_str()))
                            .map(|d| &d.ty);
                        collect_value_variables(&argument.value, expected, usages);
                    }
                    if let Some(sub) = &field.selection_set {
                        let sub_parent = def.map(|d| d.ty.named_type());
                        self.collect_variable_usages(sub_parent, sub, visited, usages);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if !visited.insert(spread.name.as_str()) {
                        continue;
                    }
                    if let Some(fragment) = document.fragment(spread.name.as_str()) {
                        collect_directive_variables(schema, &fragment.directives, usages);
                        self.collect_variable_usages(
                            Some(fragment.type_condition.as_str()),
                            &fragment.selection_set,
                            visited,
                            usages,
                        );
                    }
                }
                Selection::InlineFragment(inline) => {
                    let type_name = inline
                        .type_condition
                        .as_ref()
                        .map(Name::as_str)
                        .or(parent);
                    self.collect_variable_usages(type_name, &inline.selection_set, visited, usages);
                }
            }
        }
    }
}

fn collect_directive_variables<'a>(
    schema: &'a Schema,
    directives: &'a [Directive],
    usages: &mut Vec<VariableUsage<'a>>,
) {
    for directive in directives {
        let definition = schema.directive(directive.name.as_str());
        for argument in &directive.arguments {
            let expected = definition
                .and_then(|d| d.arguments.get(argument.name.as_str()))
                .map(|d| &d.ty);
            collect_value_variables(&argument.value, expected, usages);
        }
    }
}

/// Records the variables of a value. Only a bare variable has a known
/// expected type; variables nested in lists or objects are recorded untyped.
fn collect_value_variables<'a>(
    value: &'a Value,
    expected: Option<&'a TypeRef>,
    usages: &mut Vec<VariableUsage<'a>>,
) {
    match value {
        Value::Variable(name) => usages.push(VariableUsage { name, expected }),
        Value::List(items, _) => {
            for item in items {
                collect_value_variables(item, None, usages);
            }
        }
        Value::Object(fields, _) => {
            for (_, item) in fields {
                collect_value_variables(item, None, usages);
            }
        }
        _ => {}
    }
}

fn contains_variable(value: &Value) -> bool {
    match value {
        Value::Variable(_) => true,
        Value::List(items, _) => items.iter().any(contains_variable),
        Value::Object(fields, _) => fields.iter().any(|(_, v)| contains_variable(v)),
        _ => false,
    }
}

fn collect_spreads<'a>(selection_set: &'a SelectionSet, out: &mut Vec<&'a Name>) {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => {
                if let Some(sub) = &field.selection_set {
                    collect_spreads(sub, out);
                }
            }
            Selection::FragmentSpread(spread) => out.push(&spread.name),
            Selection::InlineFragment(inline) => collect_spreads(&inline.selection_set, out),
        }
    }
}

fn fragment_spreads(fragment: &FragmentDefinition) -> Vec<&Name> {
    let mut names = Vec::new();
    collect_spreads(&fragment.selection_set, &mut names);
    names
}

/// Depth of every fragment with its spreads expanded, walked without
/// recursion so long spread chains cannot exhaust the stack. A spread back
/// into a fragment still being walked counts as one level.
fn fragment_depths(document: &Document) -> FxHashMap<&str, usize> {
    let mut depths: FxHashMap<&str, usize> = FxHashMap::default();
    let mut on_path = FxHashSet::default();
    for root in document.fragments() {
        if depths.contains_key(root.name.as_str()) {
            continue;
        }
        on_path.insert(root.name.as_str());
        let mut stack = vec![(root, fragment_spreads(root), 0usize)];
        while let Some((fragment, spreads, next)) = stack.last_mut() {
            if let Some(&spread) = spreads.get(*next) {
                *next += 1;
                let name = spread.as_str();
                if depths.contains_key(name) || on_path.contains(name) {
                    continue;
                }
                if let Some(child) = document.fragment(name) {
                    on_path.insert(name);
                    stack.push((child, fragment_spreads(child), 0));
                }
                continue;
            }
            let fragment: &FragmentDefinition = *fragment;
            let depth = selection_depth(&fragment.selection_set, &depths);
            on_path.remove(fragment.name.as_str());
            depths.insert(fragment.name.as_str(), depth);
            stack.pop();
        }
    }
    depths
}

/// Nesting of a selection set, taking spreads at their fragment's depth.
/// Only recurses through syntactic nesting, which the parser bounds.
fn selection_depth(selection_set: &SelectionSet, fragments: &FxHashMap<&str, usize>) -> usize {
    selection_set
        .selections
        .iter()
        .map(|selection| match selection {
            Selection::Field(field) => field
                .selection_set
                .as_ref()
                .map_or(1, |sub| 1 + selection_depth(sub, fragments)),
            Selection::FragmentSpread(spread) => {
                1 + fragments.get(spread.name.as_str()).copied().unwrap_or(0)
            }
            Selection::InlineFragment(inline) => 1 + selection_depth(&inline.selection_set, fragments),
        })
        .max()
        .unwrap_or(0)
}

/// A nullable variable with a default may fill a non-null position.
fn allowed_in_position(variable: &TypeRef, has_default: bool, expected: &TypeRef) -> bool {
    if let (false, TypeRef::NonNull(inner)) = (variable.is_non_null(), expected) {
        return has_default && is_subtype(variable, inner);
    }
    is_subtype(variable, expected)
}

fn is_subtype(variable: &TypeRef, expected: &TypeRef) -> bool {
    match (variable, expected) {
        (TypeRef::NonNull(v), TypeRef::NonNull(e)) => is_subtype(v, e),
        (TypeRef::NonNull(v), e) => is_subtype(v, e),
        (_, TypeRef::NonNull(_)) => false,
        (TypeRef::List(v), TypeRef::List(e)) => is_subtype(v, e),
        (TypeRef::Named(v), TypeRef::Named(e)) => v == e,
        _ => false,
    }
}
