//! Input coercion.
//!
//! Variables arrive as JSON and are coerced against their declared types
//! before execution starts. Field arguments are coerced from document
//! literals (with variables substituted) as each field executes.

use crate::schema::{InputFieldDef, Schema, TypeDef, TypeRef};
use indexmap::IndexMap;
use qlbind_syntax::ast::{self, OperationDefinition};
use serde_json::{Map, Number, Value};
use std::fmt::Write as _;

/// Converts a literal to JSON without type information. Enum values become
/// strings; unknown variables become null.
pub fn value_to_json(value: &ast::Value, variables: &Map<String, Value>) -> Value {
    match value {
        ast::Value::Variable(name) => variables.get(&name.value).cloned().unwrap_or(Value::Null),
        ast::Value::Int(i, _) => Value::from(*i),
        ast::Value::Float(f, _) => float(*f),
        ast::Value::String(s, _) => Value::String(s.clone()),
        ast::Value::Boolean(b, _) => Value::Bool(*b),
        ast::Value::Null(_) => Value::Null,
        ast::Value::Enum(name) => Value::String(name.value.clone()),
        ast::Value::List(items, _) => {
            Value::Array(items.iter().map(|v| value_to_json(v, variables)).collect())
        }
        ast::Value::Object(fields, _) => Value::Object(
            fields
                .iter()
                .map(|(name, v)| (name.value.clone(), value_to_json(v, variables)))
                .collect(),
        ),
    }
}

pub(crate) fn float(f: f64) -> Value {
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}

/// Prints a literal the way it would appear in a document.
pub fn print_value(value: &ast::Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &ast::Value) {
    match value {
        ast::Value::Variable(name) => {
            let _ = write!(out, "${name}");
        }
        ast::Value::Int(i, _) => {
            let _ = write!(out, "{i}");
        }
        ast::Value::Float(f, _) => {
            let _ = write!(out, "{f}");
        }
        ast::Value::String(s, _) => out.push_str(&Value::String(s.clone()).to_string()),
        ast::Value::Boolean(b, _) => {
            let _ = write!(out, "{b}");
        }
        ast::Value::Null(_) => out.push_str("null"),
        ast::Value::Enum(name) => out.push_str(&name.value),
        ast::Value::List(items, _) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        ast::Value::Object(fields, _) => {
            out.push('{');
            for (i, (name, item)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{name}: ");
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

/// Coerces the raw variables of a request against an operation's variable
/// definitions. Every problem is reported, not just the first.
pub fn coerce_variable_values(
    schema: &Schema,
    operation: &OperationDefinition,
    inputs: &Map<String, Value>,
) -> Result<Map<String, Value>, Vec<String>> {
    let mut coerced = Map::new();
    let mut errors = Vec::new();

    for definition in &operation.variables {
        let name = &definition.name.value;
        let ty = TypeRef::from(&definition.ty);

        if !schema.get_type(ty.named_type()).is_some_and(TypeDef::is_input) {
            errors.push(format!(
                "Variable \"${name}\" expected value of type \"{ty}\" which cannot be used as an input type."
            ));
            continue;
        }

        match inputs.get(name) {
            None => {
                if let Some(default) = &definition.default_value {
                    match value_from_ast(schema, default, &ty, &Map::new()) {
                        Ok(value) => {
                            coerced.insert(name.clone(), value);
                        }
                        Err(reason) => errors.push(format!(
                            "Variable \"${name}\" has invalid default value {}; {reason}",
                            print_value(default)
                        )),
                    }
                } else if ty.is_non_null() {
                    errors.push(format!(
                        "Variable \"${name}\" of required type \"{ty}\" was not provided."
                    ));
                }
            }
            Some(Value::Null) if ty.is_non_null() => {
                errors.push(format!(
                    "Variable \"${name}\" of non-null type \"{ty}\" must not be null."
                ));
            }
            Some(value) => match coerce_input_value(schema, &ty, value) {
                Ok(value) => {
                    coerced.insert(name.clone(), value);
                }
                Err(reason) => errors.push(format!(
                    "Variable \"${name}\" got invalid value {value}; {reason}"
                )),
            },
        }
    }

    if errors.is_empty() {
        Ok(coerced)
    } else {
        Err(errors)
    }
}

/// Coerces a JSON input value to an input type.
pub fn coerce_input_value(schema: &Schema, ty: &TypeRef, value: &Value) -> Result<Value, String> {
    match ty {
        TypeRef::NonNull(inner) => {
            if value.is_null() {
                return Err(format!("Expected non-nullable type \"{ty}\" not to be null."));
            }
            coerce_input_value(schema, inner, value)
        }
        _ if value.is_null() => Ok(Value::Null),
        TypeRef::List(inner) => match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    coerce_input_value(schema, inner, item).map_err(|e| format!("{e} At index {i}."))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(Value::Array(vec![coerce_input_value(schema, inner, other)?])),
        },
        TypeRef::Named(name) => match schema.get_type(name) {
            Some(TypeDef::Scalar(_)) => coerce_scalar(name, value),
            Some(TypeDef::Enum(def)) => match value {
                Value::String(s) if def.has_value(s) => Ok(value.clone()),
                _ => Err(format!("Value {value} does not exist in \"{name}\" enum.")),
            },
            Some(TypeDef::InputObject(def)) => {
                let Value::Object(fields) = value else {
                    return Err(format!("Expected type \"{name}\" to be an object."));
                };
                if let Some(unknown) = fields.keys().find(|key| !def.fields.contains_key(*key)) {
                    return Err(format!(
                        "Field \"{unknown}\" is not defined by type \"{name}\"."
                    ));
                }
                coerce_input_fields(schema, &def.fields, |field| fields.get(field).cloned())
            }
            _ => Err(format!("Unknown type \"{name}\".")),
        },
    }
}

/// Fills an input object from `lookup`, applying defaults and checking that
/// required fields are present.
fn coerce_input_fields(
    schema: &Schema,
    definitions: &IndexMap<String, InputFieldDef>,
    lookup: impl Fn(&str) -> Option<Value>,
) -> Result<Value, String> {
    let mut out = Map::new();
    for field in definitions.values() {
        match lookup(&field.name) {
            Some(value) => {
                let value = coerce_input_value(schema, &field.ty, &value)
                    .map_err(|e| format!("{e} At field \"{}\".", field.name))?;
                out.insert(field.name.clone(), value);
            }
            None => {
                if let Some(default) = &field.default_value {
                    out.insert(field.name.clone(), coerce_default(schema, &field.ty, default));
                } else if field.ty.is_non_null() {
                    return Err(format!(
                        "Field \"{}\" of required type \"{}\" was not provided.",
                        field.name, field.ty
                    ));
                }
            }
        }
    }
    Ok(Value::Object(out))
}

/// SDL defaults are stored untyped; a default that fails to coerce is used as written.
fn coerce_default(schema: &Schema, ty: &TypeRef, default: &Value) -> Value {
    coerce_input_value(schema, ty, default).unwrap_or_else(|_| default.clone())
}

fn coerce_scalar(name: &str, value: &Value) -> Result<Value, String> {
    match name {
        "Int" => {
            let int = value
                .as_i64()
                .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .ok_or_else(|| format!("Int cannot represent non-integer value: {value}"))?;
            i32::try_from(int)
                .map(Value::from)
                .map_err(|_| format!("Int cannot represent non 32-bit signed integer value: {value}"))
        }
        "Float" => value
            .as_f64()
            .map(float)
            .ok_or_else(|| format!("Float cannot represent non numeric value: {value}")),
        "String" => match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err(format!("String cannot represent a non string value: {value}")),
        },
        "Boolean" => match value {
            Value::Bool(_) => Ok(value.clone()),
            _ => Err(format!("Boolean cannot represent a non boolean value: {value}")),
        },
        "ID" => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::String(n.to_string())),
            _ => Err(format!("ID cannot represent value: {value}")),
        },
        _ => Ok(value.clone()),
    }
}

/// Coerces a document literal to an input type, substituting variables.
///
/// A variable without a runtime value counts as absent: null for nullable
/// positions and an error for non-null ones.
pub fn value_from_ast(
    schema: &Schema,
    value: &ast::Value,
    ty: &TypeRef,
    variables: &Map<String, Value>,
) -> Result<Value, String> {
    if let ast::Value::Variable(name) = value {
        return match variables.get(&name.value) {
            Some(Value::Null) | None if ty.is_non_null() => Err(format!(
                "Variable \"${name}\" of non-null type \"{ty}\" must not be null."
            )),
            Some(v) => Ok(v.clone()),
            None => Ok(Value::Null),
        };
    }

    match ty {
        TypeRef::NonNull(inner) => {
            if matches!(value, ast::Value::Null(_)) {
                return Err(format!("Expected value of non-null type \"{ty}\" not to be null."));
            }
            value_from_ast(schema, value, inner, variables)
        }
        _ if matches!(value, ast::Value::Null(_)) => Ok(Value::Null),
        TypeRef::List(inner) => match value {
            ast::Value::List(items, _) => items
                .iter()
                .map(|item| value_from_ast(schema, item, inner, variables))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(Value::Array(vec![value_from_ast(schema, other, inner, variables)?])),
        },
        TypeRef::Named(name) => match schema.get_type(name) {
            Some(TypeDef::Scalar(_)) => scalar_from_ast(name, value, variables),
            Some(TypeDef::Enum(def)) => match value {
                ast::Value::Enum(v) if def.has_value(&v.value) => Ok(Value::String(v.value.clone())),
                ast::Value::Enum(v) => Err(format!(
                    "Value \"{v}\" does not exist in \"{name}\" enum."
                )),
                other => Err(format!(
                    "Enum \"{name}\" cannot represent non-enum value: {}.",
                    print_value(other)
                )),
            },
            Some(TypeDef::InputObject(def)) => {
                let ast::Value::Object(fields, _) = value else {
                    return Err(format!(
                        "Expected value of type \"{name}\", found {}.",
                        print_value(value)
                    ));
                };
                if let Some((unknown, _)) = fields.iter().find(|(k, _)| !def.fields.contains_key(&k.value)) {
                    return Err(format!(
                        "Field \"{unknown}\" is not defined by type \"{name}\"."
                    ));
                }
                let mut out = Map::new();
                for field in def.fields.values() {
                    let provided = fields
                        .iter()
                        .find(|(k, _)| k.value == field.name)
                        .map(|(_, v)| v)
                        .filter(|v| !is_missing_variable(v, variables));
                    match provided {
                        Some(v) => {
                            out.insert(field.name.clone(), value_from_ast(schema, v, &field.ty, variables)?);
                        }
                        None => {
                            if let Some(default) = &field.default_value {
                                out.insert(field.name.clone(), coerce_default(schema, &field.ty, default));
                            } else if field.ty.is_non_null() {
                                return Err(format!(
                                    "Field \"{name}.{}\" of required type \"{}\" was not provided.",
                                    field.name, field.ty
                                ));
                            }
                        }
                    }
                }
                Ok(Value::Object(out))
            }
            _ => Err(format!("Unknown type \"{name}\".")),
        },
    }
}

fn is_missing_variable(value: &ast::Value, variables: &Map<String, Value>) -> bool {
    matches!(value, ast::Value::Variable(name) if !variables.contains_key(&name.value))
}

fn scalar_from_ast(name: &str, value: &ast::Value, variables: &Map<String, Value>) -> Result<Value, String> {
    let mismatch = |kind: &str| Err(format!("{name} cannot represent {kind}: {}", print_value(value)));
    match (name, value) {
        ("Int", ast::Value::Int(i, _)) => i32::try_from(*i).map(Value::from).map_err(|_| {
            format!("Int cannot represent non 32-bit signed integer value: {i}")
        }),
        ("Int", _) => mismatch("non-integer value"),
        ("Float", ast::Value::Int(i, _)) => Ok(float(*i as f64)),
        ("Float", ast::Value::Float(f, _)) => Ok(float(*f)),
        ("Float", _) => mismatch("non numeric value"),
        ("String", ast::Value::String(s, _)) => Ok(Value::String(s.clone())),
        ("String", _) => mismatch("a non string value"),
        ("Boolean", ast::Value::Boolean(b, _)) => Ok(Value::Bool(*b)),
        ("Boolean", _) => mismatch("a non boolean value"),
        ("ID", ast::Value::String(s, _)) => Ok(Value::String(s.clone())),
        ("ID", ast::Value::Int(i, _)) => Ok(Value::String(i.to_string())),
        ("ID", _) => mismatch("a non-string and non-integer value"),
        _ => Ok(value_to_json(value, variables)),
    }
}

/// Coerces the arguments of a field (or directive) against its definitions.
pub fn coerce_argument_values(
    schema: &Schema,
    definitions: &IndexMap<String, InputFieldDef>,
    arguments: &[ast::Argument],
    variables: &Map<String, Value>,
) -> Result<Map<String, Value>, String> {
    let mut coerced = Map::new();
    for definition in definitions.values() {
        let provided = arguments
            .iter()
            .find(|arg| arg.name.value == definition.name)
            .filter(|arg| !is_missing_variable(&arg.value, variables));

        match provided {
            Some(argument) => {
                let value = value_from_ast(schema, &argument.value, &definition.ty, variables)
                    .map_err(|e| {
                        format!(
                            "Argument \"{}\" has invalid value {}. {e}",
                            definition.name,
                            print_value(&argument.value)
                        )
                    })?;
                coerced.insert(definition.name.clone(), value);
            }
            None => {
                if let Some(default) = &definition.default_value {
                    coerced.insert(
                        definition.name.clone(),
                        coerce_default(schema, &definition.ty, default),
                    );
                } else if definition.ty.is_non_null() {
                    return Err(format!(
                        "Argument \"{}\" of required type \"{}\" was not provided.",
                        definition.name, definition.ty
                    ));
                }
            }
        }
    }
    Ok(coerced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SDL: &str = r#"
        type Query {
          add(x: Int, y: Int): Int
          echo(text: String = "hi", count: Int!): String
          color(c: Color): Color
          plot(p: Point!): Float
        }
        enum Color { RED GREEN }
        input Point { x: Float! y: Float = 0 tags: [String] }
    "#;

    fn schema() -> Schema {
        Schema::from_sdl(SDL).unwrap()
    }

    fn operation(source: &str) -> OperationDefinition {
        let document = qlbind_syntax::parse(source).into_result().unwrap();
        let operation = document.operations().next().unwrap().clone();
        operation
    }

    fn field(source: &str) -> ast::Field {
        let op = operation(source);
        match &op.selection_set.selections[0] {
            ast::Selection::Field(field) => field.clone(),
            _ => panic!("expected field"),
        }
    }

    fn vars(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_variables_coerced() {
        let schema = schema();
        let op = operation("query ($x: Int, $y: Int = 5, $id: ID) { add(x: $x, y: $y) }");
        let coerced =
            coerce_variable_values(&schema, &op, &vars(json!({"x": 2, "id": 7}))).unwrap();
        assert_eq!(Value::Object(coerced), json!({"x": 2, "y": 5, "id": "7"}));
    }

    #[test]
    fn test_absent_nullable_variable_stays_absent() {
        let schema = schema();
        let op = operation("query ($x: Int) { add(x: $x) }");
        let coerced = coerce_variable_values(&schema, &op, &Map::new()).unwrap();
        assert!(coerced.is_empty());
    }

    #[test]
    fn test_variable_errors_reported_together() {
        let schema = schema();
        let op = operation("query ($x: Int!, $y: Int, $z: Int!) { add(x: $x, y: $y) }");
        let errors =
            coerce_variable_values(&schema, &op, &vars(json!({"y": "abc", "z": null}))).unwrap_err();
        assert_eq!(
            errors,
            vec![
                "Variable \"$x\" of required type \"Int!\" was not provided.".to_string(),
                "Variable \"$y\" got invalid value \"abc\"; Int cannot represent non-integer value: \"abc\"".to_string(),
                "Variable \"$z\" of non-null type \"Int!\" must not be null.".to_string(),
            ]
        );
    }

    #[test]
    fn test_int_range() {
        assert_eq!(coerce_scalar("Int", &json!(2.0)).unwrap(), json!(2));
        assert!(coerce_scalar("Int", &json!(2.5)).is_err());
        assert_eq!(
            coerce_scalar("Int", &json!(4_000_000_000_i64)).unwrap_err(),
            "Int cannot represent non 32-bit signed integer value: 4000000000"
        );
    }

    #[test]
    fn test_input_object_variable() {
        let schema = schema();
        let ty = TypeRef::non_null(TypeRef::named("Point"));
        let value = coerce_input_value(&schema, &ty, &json!({"x": 1, "tags": "a"})).unwrap();
        assert_eq!(value, json!({"x": 1.0, "y": 0.0, "tags": ["a"]}));

        let err = coerce_input_value(&schema, &ty, &json!({"x": 1, "z": 2})).unwrap_err();
        assert_eq!(err, "Field \"z\" is not defined by type \"Point\".");

        let err = coerce_input_value(&schema, &ty, &json!({"y": 1})).unwrap_err();
        assert_eq!(err, "Field \"x\" of required type \"Float!\" was not provided.");
    }

    #[test]
    fn test_enum_input() {
        let schema = schema();
        let ty = TypeRef::named("Color");
        assert_eq!(coerce_input_value(&schema, &ty, &json!("RED")).unwrap(), json!("RED"));
        assert_eq!(
            coerce_input_value(&schema, &ty, &json!("BLUE")).unwrap_err(),
            "Value \"BLUE\" does not exist in \"Color\" enum."
        );
    }

    #[test]
    fn test_argument_values_from_literals_and_variables() {
        let schema = schema();
        let def = schema.field("Query", "add").unwrap();
        let f = field("{ add(x: 2, y: $y) }");

        let args =
            coerce_argument_values(&schema, &def.arguments, &f.arguments, &vars(json!({"y": 3})))
                .unwrap();
        assert_eq!(Value::Object(args), json!({"x": 2, "y": 3}));

        // Missing variable means the argument is absent.
        let args = coerce_argument_values(&schema, &def.arguments, &f.arguments, &Map::new()).unwrap();
        assert_eq!(Value::Object(args), json!({"x": 2}));
    }

    #[test]
    fn test_argument_defaults_and_required() {
        let schema = schema();
        let def = schema.field("Query", "echo").unwrap();

        let f = field("{ echo(count: 1) }");
        let args = coerce_argument_values(&schema, &def.arguments, &f.arguments, &Map::new()).unwrap();
        assert_eq!(Value::Object(args), json!({"text": "hi", "count": 1}));

        let f = field("{ echo }");
        let err = coerce_argument_values(&schema, &def.arguments, &f.arguments, &Map::new()).unwrap_err();
        assert_eq!(err, "Argument \"count\" of required type \"Int!\" was not provided.");
    }

    #[test]
    fn test_literal_type_mismatch() {
        let schema = schema();
        let ty = TypeRef::named("Int");
        let f = field("{ add(x: \"a\") }");
        let err = value_from_ast(&schema, &f.arguments[0].value, &ty, &Map::new()).unwrap_err();
        assert_eq!(err, "Int cannot represent non-integer value: \"a\"");
    }

    #[test]
    fn test_literal_enum_and_object() {
        let schema = schema();
        let f = field("{ plot(p: {x: 1, tags: [\"a\", \"b\"]}) }");
        let ty = TypeRef::non_null(TypeRef::named("Point"));
        let value = value_from_ast(&schema, &f.arguments[0].value, &ty, &Map::new()).unwrap();
        assert_eq!(value, json!({"x": 1.0, "y": 0.0, "tags": ["a", "b"]}));

        let f = field("{ color(c: BLUE) }");
        let err = value_from_ast(&schema, &f.arguments[0].value, &TypeRef::named("Color"), &Map::new())
            .unwrap_err();
        assert_eq!(err, "Value \"BLUE\" does not exist in \"Color\" enum.");
    }

    #[test]
    fn test_print_value() {
        let f = field("{ plot(p: {x: 1.5, tags: [\"a\", null]}, c: RED, v: $v) }");
        let printed: Vec<String> = f.arguments.iter().map(|a| print_value(&a.value)).collect();
        assert_eq!(printed, vec!["{x: 1.5, tags: [\"a\", null]}", "RED", "$v"]);
    }
}
