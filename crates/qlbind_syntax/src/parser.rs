//! Recursive descent parser for GraphQL.
//!
//! The parser stops at the first syntax error. Later productions see the
//! `failed` flag and return placeholder nodes without reporting anything.

use crate::ast::*;
use crate::lexer::{block_string_value, string_value, Lexer};
use crate::token::{DirectiveLocation, Token, TokenKind};
use qlbind_core::{diagnostics::codes, DiagnosticBag, Span};

/// Maximum nesting of selection sets, list/object values and list types.
const MAX_DEPTH: u32 = 64;

/// Parser for GraphQL documents.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    prev_end: u32,
    depth: u32,
    failed: bool,
    diagnostics: DiagnosticBag,
}

/// Result of parsing.
#[derive(Debug)]
pub struct ParseResult {
    pub document: Document,
    pub diagnostics: DiagnosticBag,
}

impl ParseResult {
    /// Returns true if the source had syntax errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }

    /// Returns the document, or the diagnostics when parsing failed.
    pub fn into_result(self) -> Result<Document, DiagnosticBag> {
        if self.diagnostics.has_errors() {
            Err(self.diagnostics)
        } else {
            Ok(self.document)
        }
    }
}

/// Parses a source string into a document.
pub fn parse(source: &str) -> ParseResult {
    let mut parser = Parser::new(source);
    let document = parser.parse_document();
    ParseResult {
        document,
        diagnostics: parser.diagnostics,
    }
}

impl<'a> Parser<'a> {
    /// Creates a new parser.
    pub fn new(source: &'a str) -> Self {
        let mut parser = Self {
            lexer: Lexer::new(source),
            current: Token::new(TokenKind::Eof, Span::empty(0)),
            prev_end: 0,
            depth: 0,
            failed: false,
            diagnostics: DiagnosticBag::new(),
        };
        parser.bump();
        parser
    }

    /// Returns the current token kind.
    #[inline]
    fn at(&self) -> TokenKind {
        self.current.kind
    }

    /// Returns true if at the given kind.
    #[inline]
    fn at_kind(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    /// Returns true if at a name token spelled `keyword`.
    fn at_keyword(&self, keyword: &str) -> bool {
        self.at_kind(TokenKind::Name) && self.current_text() == keyword
    }

    /// Returns true when a delimited list should stop: at `close`, at the
    /// end of input, or after an error.
    #[inline]
    fn at_end_of(&self, close: TokenKind) -> bool {
        self.failed || self.at_kind(close) || self.at_kind(TokenKind::Eof)
    }

    /// Advances to the next token.
    fn advance(&mut self) {
        self.prev_end = self.current.span.end;
        self.bump();
    }

    fn bump(&mut self) {
        self.current = self.lexer.next_token();
        if self.current.kind == TokenKind::Error {
            let text = self.current_text();
            let message = if text.starts_with('"') {
                "unterminated string".to_string()
            } else if text.starts_with(|c: char| c == '-' || c.is_ascii_digit()) {
                format!("invalid number \"{text}\"")
            } else {
                format!("unexpected character \"{text}\"")
            };
            self.error_with(codes::INVALID_LITERAL, self.current.span, message);
        }
    }

    /// Expects a specific token kind.
    fn expect(&mut self, kind: TokenKind) -> bool {
        if self.at_kind(kind) {
            self.advance();
            true
        } else {
            self.error_expected(kind.as_str());
            false
        }
    }

    /// Expects a contextual keyword.
    fn expect_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.advance();
            true
        } else {
            self.error_expected(&format!("\"{keyword}\""));
            false
        }
    }

    /// Gets the text of the current token.
    fn current_text(&self) -> &'a str {
        self.lexer.span_text(self.current.span)
    }

    fn span_from(&self, start: u32) -> Span {
        Span::new(start, self.prev_end.max(start))
    }

    /// Describes the current token for error messages.
    fn found(&self) -> String {
        match self.at() {
            TokenKind::Name => format!("\"{}\"", self.current_text()),
            kind => kind.as_str().to_string(),
        }
    }

    /// Records an error unless one was already reported.
    fn error_with(&mut self, code: &str, span: Span, message: String) {
        if !self.failed {
            self.failed = true;
            self.diagnostics.error_at(code, span, message);
        }
    }

    /// Reports an error at the current token.
    fn error(&mut self, message: String) {
        self.error_with(codes::INVALID_SYNTAX, self.current.span, message);
    }

    /// Reports an expected token error.
    fn error_expected(&mut self, expected: &str) {
        let code = if self.at_kind(TokenKind::Eof) {
            codes::UNEXPECTED_EOF
        } else {
            codes::UNEXPECTED_TOKEN
        };
        let message = format!("expected {expected}, found {}", self.found());
        self.error_with(code, self.current.span, message);
    }

    fn enter(&mut self) -> bool {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            self.error(format!("document nesting exceeds {MAX_DEPTH} levels"));
            return false;
        }
        true
    }

    fn exit(&mut self) {
        self.depth -= 1;
    }

    /// Parses `open item+ close`.
    fn many<T>(
        &mut self,
        open: TokenKind,
        close: TokenKind,
        mut item: impl FnMut(&mut Self) -> T,
    ) -> Vec<T> {
        self.expect(open);
        let mut items = vec![item(self)];
        while !self.at_end_of(close) {
            items.push(item(self));
        }
        self.expect(close);
        items
    }

    /// Parses `open item* close`.
    fn any<T>(
        &mut self,
        open: TokenKind,
        close: TokenKind,
        mut item: impl FnMut(&mut Self) -> T,
    ) -> Vec<T> {
        self.expect(open);
        let mut items = Vec::new();
        while !self.at_end_of(close) {
            items.push(item(self));
        }
        self.expect(close);
        items
    }

    /// Parses a document.
    pub fn parse_document(&mut self) -> Document {
        let start = self.current.span.start;
        let mut definitions = Vec::new();

        while !self.at_end_of(TokenKind::Eof) {
            if let Some(def) = self.parse_definition() {
                definitions.push(def);
            }
        }

        if definitions.is_empty() {
            self.error_expected("definition");
        }

        Document {
            definitions,
            span: self.span_from(start),
        }
    }

    /// Parses a definition.
    fn parse_definition(&mut self) -> Option<Definition> {
        let description = self.parse_description();

        if self.at_kind(TokenKind::LBrace) {
            if description.is_some() {
                self.error("operations cannot have descriptions".to_string());
            }
            return Some(Definition::Operation(self.parse_operation()));
        }

        if !self.at_kind(TokenKind::Name) {
            self.error_expected("definition");
            return None;
        }

        let definition = match self.current_text() {
            "query" | "mutation" | "subscription" if description.is_none() => {
                Definition::Operation(self.parse_operation())
            }
            "fragment" if description.is_none() => {
                Definition::Fragment(self.parse_fragment_definition())
            }
            "schema" => Definition::Schema(self.parse_schema_definition(description)),
            "type" => Definition::Type(TypeDefinition::Object(
                self.parse_object_type(description),
            )),
            "interface" => Definition::Type(TypeDefinition::Interface(
                self.parse_interface_type(description),
            )),
            "union" => Definition::Type(TypeDefinition::Union(self.parse_union_type(description))),
            "enum" => Definition::Type(TypeDefinition::Enum(self.parse_enum_type(description))),
            "input" => Definition::Type(TypeDefinition::Input(
                self.parse_input_object_type(description),
            )),
            "scalar" => Definition::Type(TypeDefinition::Scalar(
                self.parse_scalar_type(description),
            )),
            "directive" => Definition::Directive(self.parse_directive_definition(description)),
            "extend" => {
                self.error("type system extensions are not supported".to_string());
                return None;
            }
            _ => {
                self.error_expected("definition");
                return None;
            }
        };
        Some(definition)
    }

    /// Parses an optional description string.
    fn parse_description(&mut self) -> Option<String> {
        if self.at().is_string() {
            Some(self.parse_string())
        } else {
            None
        }
    }

    /// Parses a string or block string token into its value.
    fn parse_string(&mut self) -> String {
        let span = self.current.span;
        let text = self.current_text();
        let value = if self.at_kind(TokenKind::BlockStringLiteral) {
            block_string_value(text)
        } else {
            match string_value(text) {
                Ok(value) => value,
                Err(sequence) => {
                    self.error_with(
                        codes::INVALID_LITERAL,
                        span,
                        format!("invalid escape sequence \"{sequence}\""),
                    );
                    String::new()
                }
            }
        };
        self.advance();
        value
    }

    /// Parses a name.
    fn parse_name(&mut self) -> Name {
        let span = self.current.span;
        if self.at_kind(TokenKind::Name) {
            let value = self.current_text();
            self.advance();
            Name::new(value, span)
        } else {
            self.error_expected("name");
            Name::new(String::new(), span)
        }
    }

    /// Parses schema definition.
    fn parse_schema_definition(&mut self, description: Option<String>) -> SchemaDefinition {
        let start = self.current.span.start;
        self.advance(); // schema

        let directives = self.parse_directives(true);
        let operations = self.many(TokenKind::LBrace, TokenKind::RBrace, |p| {
            p.parse_operation_type_definition()
        });

        SchemaDefinition {
            description,
            directives,
            operations,
            span: self.span_from(start),
        }
    }

    fn parse_operation_type_definition(&mut self) -> OperationTypeDefinition {
        let start = self.current.span.start;
        let operation = match OperationType::from_keyword(self.current_text()) {
            Some(op) if self.at_kind(TokenKind::Name) => {
                self.advance();
                op
            }
            _ => {
                self.error_expected("\"query\", \"mutation\" or \"subscription\"");
                OperationType::Query
            }
        };
        self.expect(TokenKind::Colon);
        let type_name = self.parse_name();

        OperationTypeDefinition {
            operation,
            type_name,
            span: self.span_from(start),
        }
    }

    /// Parses `implements A & B`.
    fn parse_implements(&mut self) -> Vec<Name> {
        let mut names = Vec::new();
        if self.at_keyword("implements") {
            self.advance();
            if self.at_kind(TokenKind::Amp) {
                self.advance();
            }
            names.push(self.parse_name());
            while self.at_kind(TokenKind::Amp) {
                self.advance();
                names.push(self.parse_name());
            }
        }
        names
    }

    fn parse_fields_definition(&mut self) -> Vec<FieldDefinition> {
        if self.at_kind(TokenKind::LBrace) {
            self.many(TokenKind::LBrace, TokenKind::RBrace, Self::parse_field_definition)
        } else {
            Vec::new()
        }
    }

    /// Parses an object type definition.
    fn parse_object_type(&mut self, description: Option<String>) -> ObjectTypeDefinition {
        let start = self.current.span.start;
        self.advance(); // type

        let name = self.parse_name();
        let implements = self.parse_implements();
        let directives = self.parse_directives(true);
        let fields = self.parse_fields_definition();

        ObjectTypeDefinition {
            description,
            name,
            implements,
            directives,
            fields,
            span: self.span_from(start),
        }
    }

    /// Parses an interface type definition.
    fn parse_interface_type(&mut self, description: Option<String>) -> InterfaceTypeDefinition {
        let start = self.current.span.start;
        self.advance(); // interface

        let name = self.parse_name();
        let implements = self.parse_implements();
        let directives = self.parse_directives(true);
        let fields = self.parse_fields_definition();

        InterfaceTypeDefinition {
            description,
            name,
            implements,
            directives,
            fields,
            span: self.span_from(start),
        }
    }

    /// Parses a union type definition.
    fn parse_union_type(&mut self, description: Option<String>) -> UnionTypeDefinition {
        let start = self.current.span.start;
        self.advance(); // union

        let name = self.parse_name();
        let directives = self.parse_directives(true);

        let mut members = Vec::new();
        if self.at_kind(TokenKind::Eq) {
            self.advance();
            if self.at_kind(TokenKind::Pipe) {
                self.advance();
            }
            members.push(self.parse_name());
            while self.at_kind(TokenKind::Pipe) {
                self.advance();
                members.push(self.parse_name());
            }
        }

        UnionTypeDefinition {
            description,
            name,
            directives,
            members,
            span: self.span_from(start),
        }
    }

    /// Parses an enum type definition.
    fn parse_enum_type(&mut self, description: Option<String>) -> EnumTypeDefinition {
        let start = self.current.span.start;
        self.advance(); // enum

        let name = self.parse_name();
        let directives = self.parse_directives(true);
        let values = if self.at_kind(TokenKind::LBrace) {
            self.many(TokenKind::LBrace, TokenKind::RBrace, Self::parse_enum_value)
        } else {
            Vec::new()
        };

        EnumTypeDefinition {
            description,
            name,
            directives,
            values,
            span: self.span_from(start),
        }
    }

    fn parse_enum_value(&mut self) -> EnumValueDefinition {
        let start = self.current.span.start;
        let description = self.parse_description();
        if matches!(self.current_text(), "true" | "false" | "null") {
            self.error(format!("{} is reserved and cannot be an enum value", self.found()));
        }
        let name = self.parse_name();
        let directives = self.parse_directives(true);

        EnumValueDefinition {
            description,
            name,
            directives,
            span: self.span_from(start),
        }
    }

    /// Parses an input object type definition.
    fn parse_input_object_type(&mut self, description: Option<String>) -> InputObjectTypeDefinition {
        let start = self.current.span.start;
        self.advance(); // input

        let name = self.parse_name();
        let directives = self.parse_directives(true);
        let fields = if self.at_kind(TokenKind::LBrace) {
            self.many(TokenKind::LBrace, TokenKind::RBrace, Self::parse_input_value_definition)
        } else {
            Vec::new()
        };

        InputObjectTypeDefinition {
            description,
            name,
            directives,
            fields,
            span: self.span_from(start),
        }
    }

    /// Parses a scalar type definition.
    fn parse_scalar_type(&mut self, description: Option<String>) -> ScalarTypeDefinition {
        let start = self.current.span.start;
        self.advance(); // scalar

        let name = self.parse_name();
        let directives = self.parse_directives(true);

        ScalarTypeDefinition {
            description,
            name,
            directives,
            span: self.span_from(start),
        }
    }

    /// Parses a directive definition.
    ///
    /// ```graphql
    /// directive @cached(ttl: Int) repeatable on FIELD_DEFINITION | OBJECT
    /// ```
    fn parse_directive_definition(&mut self, description: Option<String>) -> DirectiveDefinition {
        let start = self.current.span.start;
        self.advance(); // directive

        self.expect(TokenKind::At);
        let name = self.parse_name();
        let arguments = self.parse_arguments_definition();

        let repeatable = self.at_keyword("repeatable");
        if repeatable {
            self.advance();
        }

        self.expect_keyword("on");
        if self.at_kind(TokenKind::Pipe) {
            self.advance();
        }
        let mut locations = vec![self.parse_directive_location()];
        while self.at_kind(TokenKind::Pipe) {
            self.advance();
            locations.push(self.parse_directive_location());
        }

        DirectiveDefinition {
            description,
            name,
            arguments,
            repeatable,
            locations: locations.into_iter().flatten().collect(),
            span: self.span_from(start),
        }
    }

    fn parse_directive_location(&mut self) -> Option<DirectiveLocation> {
        let span = self.current.span;
        let name = self.parse_name();
        let location = DirectiveLocation::parse(&name.value);
        if location.is_none() && !self.failed {
            self.error_with(
                codes::INVALID_SYNTAX,
                span,
                format!("unknown directive location \"{name}\""),
            );
        }
        location
    }

    fn parse_arguments_definition(&mut self) -> Vec<InputValueDefinition> {
        if self.at_kind(TokenKind::LParen) {
            self.many(TokenKind::LParen, TokenKind::RParen, Self::parse_input_value_definition)
        } else {
            Vec::new()
        }
    }

    /// Parses a field definition.
    fn parse_field_definition(&mut self) -> FieldDefinition {
        let start = self.current.span.start;
        let description = self.parse_description();
        let name = self.parse_name();
        let arguments = self.parse_arguments_definition();
        self.expect(TokenKind::Colon);
        let ty = self.parse_type();
        let directives = self.parse_directives(true);

        FieldDefinition {
            description,
            name,
            arguments,
            ty,
            directives,
            span: self.span_from(start),
        }
    }

    /// Parses an input value definition.
    fn parse_input_value_definition(&mut self) -> InputValueDefinition {
        let start = self.current.span.start;
        let description = self.parse_description();
        let name = self.parse_name();
        self.expect(TokenKind::Colon);
        let ty = self.parse_type();

        let default_value = if self.at_kind(TokenKind::Eq) {
            self.advance();
            Some(self.parse_value(true))
        } else {
            None
        };

        let directives = self.parse_directives(true);

        InputValueDefinition {
            description,
            name,
            ty,
            default_value,
            directives,
            span: self.span_from(start),
        }
    }

    /// Parses a type reference.
    fn parse_type(&mut self) -> Type {
        let start = self.current.span.start;

        let ty = if self.at_kind(TokenKind::LBracket) {
            if !self.enter() {
                return Type::Named(Name::new(String::new(), self.current.span));
            }
            self.advance();
            let inner = self.parse_type();
            self.expect(TokenKind::RBracket);
            self.exit();
            Type::List(Box::new(inner), self.span_from(start))
        } else {
            Type::Named(self.parse_name())
        };

        if self.at_kind(TokenKind::Bang) {
            self.advance();
            Type::NonNull(Box::new(ty), self.span_from(start))
        } else {
            ty
        }
    }

    /// Parses directives.
    fn parse_directives(&mut self, is_const: bool) -> Vec<Directive> {
        let mut directives = Vec::new();
        while self.at_kind(TokenKind::At) {
            directives.push(self.parse_directive(is_const));
        }
        directives
    }

    /// Parses a directive.
    fn parse_directive(&mut self, is_const: bool) -> Directive {
        let start = self.current.span.start;
        self.advance(); // @

        let name = self.parse_name();
        let arguments = self.parse_arguments(is_const);

        Directive {
            name,
            arguments,
            span: self.span_from(start),
        }
    }

    /// Parses arguments.
    fn parse_arguments(&mut self, is_const: bool) -> Vec<Argument> {
        if self.at_kind(TokenKind::LParen) {
            self.many(TokenKind::LParen, TokenKind::RParen, |p| {
                p.parse_argument(is_const)
            })
        } else {
            Vec::new()
        }
    }

    /// Parses an argument.
    fn parse_argument(&mut self, is_const: bool) -> Argument {
        let start = self.current.span.start;
        let name = self.parse_name();
        self.expect(TokenKind::Colon);
        let value = self.parse_value(is_const);
        Argument {
            name,
            value,
            span: self.span_from(start),
        }
    }

    /// Parses a value.
    fn parse_value(&mut self, is_const: bool) -> Value {
        let start = self.current.span.start;

        match self.at() {
            TokenKind::Dollar if is_const => {
                self.error("variables are not allowed in constant values".to_string());
                Value::Null(self.current.span)
            }
            TokenKind::Dollar => {
                self.advance();
                let name = self.parse_name();
                Value::Variable(Name::new(name.value, self.span_from(start)))
            }
            TokenKind::IntLiteral => {
                let span = self.current.span;
                let text = self.current_text();
                let value = match text.parse::<i64>() {
                    Ok(value) => value,
                    Err(_) => {
                        self.error_with(
                            codes::INVALID_LITERAL,
                            span,
                            format!("integer literal {text} is out of range"),
                        );
                        0
                    }
                };
                self.advance();
                Value::Int(value, span)
            }
            TokenKind::FloatLiteral => {
                let span = self.current.span;
                let text = self.current_text();
                let value = match text.parse::<f64>() {
                    Ok(value) if value.is_finite() => value,
                    _ => {
                        self.error_with(
                            codes::INVALID_LITERAL,
                            span,
                            format!("float literal {text} is out of range"),
                        );
                        0.0
                    }
                };
                self.advance();
                Value::Float(value, span)
            }
            TokenKind::StringLiteral | TokenKind::BlockStringLiteral => {
                let span = self.current.span;
                let value = self.parse_string();
                Value::String(value, span)
            }
            TokenKind::Name => {
                let span = self.current.span;
                match self.current_text() {
                    "true" => {
                        self.advance();
                        Value::Boolean(true, span)
                    }
                    "false" => {
                        self.advance();
                        Value::Boolean(false, span)
                    }
                    "null" => {
                        self.advance();
                        Value::Null(span)
                    }
                    _ => Value::Enum(self.parse_name()),
                }
            }
            TokenKind::LBracket => {
                if !self.enter() {
                    return Value::Null(self.current.span);
                }
                let values = self.any(TokenKind::LBracket, TokenKind::RBracket, |p| {
                    p.parse_value(is_const)
                });
                self.exit();
                Value::List(values, self.span_from(start))
            }
            TokenKind::LBrace => {
                if !self.enter() {
                    return Value::Null(self.current.span);
                }
                let fields = self.any(TokenKind::LBrace, TokenKind::RBrace, |p| {
                    let name = p.parse_name();
                    p.expect(TokenKind::Colon);
                    let value = p.parse_value(is_const);
                    (name, value)
                });
                self.exit();
                Value::Object(fields, self.span_from(start))
            }
            _ => {
                self.error_expected("value");
                Value::Null(self.current.span)
            }
        }
    }

    /// Parses an operation definition.
    fn parse_operation(&mut self) -> OperationDefinition {
        let start = self.current.span.start;

        if self.at_kind(TokenKind::LBrace) {
            // Query shorthand
            let selection_set = self.parse_selection_set();
            return OperationDefinition {
                operation: OperationType::Query,
                name: None,
                variables: Vec::new(),
                directives: Vec::new(),
                selection_set,
                span: self.span_from(start),
            };
        }

        let operation =
            OperationType::from_keyword(self.current_text()).unwrap_or(OperationType::Query);
        self.advance();

        let name = if self.at_kind(TokenKind::Name) {
            Some(self.parse_name())
        } else {
            None
        };

        let variables = if self.at_kind(TokenKind::LParen) {
            self.many(TokenKind::LParen, TokenKind::RParen, Self::parse_variable_definition)
        } else {
            Vec::new()
        };

        let directives = self.parse_directives(false);
        let selection_set = self.parse_selection_set();

        OperationDefinition {
            operation,
            name,
            variables,
            directives,
            selection_set,
            span: self.span_from(start),
        }
    }

    /// Parses a variable definition.
    fn parse_variable_definition(&mut self) -> VariableDefinition {
        let start = self.current.span.start;
        self.expect(TokenKind::Dollar);
        let name = self.parse_name();
        self.expect(TokenKind::Colon);
        let ty = self.parse_type();

        let default_value = if self.at_kind(TokenKind::Eq) {
            self.advance();
            Some(self.parse_value(true))
        } else {
            None
        };

        let directives = self.parse_directives(true);

        VariableDefinition {
            name,
            ty,
            default_value,
            directives,
            span: self.span_from(start),
        }
    }

    /// Parses a fragment definition.
    fn parse_fragment_definition(&mut self) -> FragmentDefinition {
        let start = self.current.span.start;
        self.advance(); // fragment

        if self.at_keyword("on") {
            self.error_expected("fragment name");
        }
        let name = self.parse_name();
        self.expect_keyword("on");
        let type_condition = self.parse_name();
        let directives = self.parse_directives(false);
        let selection_set = self.parse_selection_set();

        FragmentDefinition {
            name,
            type_condition,
            directives,
            selection_set,
            span: self.span_from(start),
        }
    }

    /// Parses a selection set.
    fn parse_selection_set(&mut self) -> SelectionSet {
        let start = self.current.span.start;
        if !self.enter() {
            return SelectionSet::default();
        }
        let selections = self.many(TokenKind::LBrace, TokenKind::RBrace, Self::parse_selection);
        self.exit();

        SelectionSet {
            selections,
            span: self.span_from(start),
        }
    }

    /// Parses a selection.
    fn parse_selection(&mut self) -> Selection {
        if !self.at_kind(TokenKind::Spread) {
            return Selection::Field(self.parse_field());
        }

        let start = self.current.span.start;
        self.advance(); // ...

        if self.at_keyword("on") {
            self.advance();
            let type_condition = Some(self.parse_name());
            let directives = self.parse_directives(false);
            let selection_set = self.parse_selection_set();
            Selection::InlineFragment(InlineFragment {
                type_condition,
                directives,
                selection_set,
                span: self.span_from(start),
            })
        } else if self.at_kind(TokenKind::LBrace) || self.at_kind(TokenKind::At) {
            let directives = self.parse_directives(false);
            let selection_set = self.parse_selection_set();
            Selection::InlineFragment(InlineFragment {
                type_condition: None,
                directives,
                selection_set,
                span: self.span_from(start),
            })
        } else {
            let name = self.parse_name();
            let directives = self.parse_directives(false);
            Selection::FragmentSpread(FragmentSpread {
                name,
                directives,
                span: self.span_from(start),
            })
        }
    }

    /// Parses a field selection.
    fn parse_field(&mut self) -> Field {
        let start = self.current.span.start;

        let first_name = self.parse_name();
        let (alias, name) = if self.at_kind(TokenKind::Colon) {
            self.advance();
            (Some(first_name), self.parse_name())
        } else {
            (None, first_name)
        };

        let arguments = self.parse_arguments(false);
        let directives = self.parse_directives(false);

        let selection_set = if self.at_kind(TokenKind::LBrace) {
            Some(self.parse_selection_set())
        } else {
            None
        };

        Field {
            alias,
            name,
            arguments,
            directives,
            selection_set,
            span: self.span_from(start),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_error(source: &str) -> String {
        let result = parse(source);
        let message = result
            .diagnostics
            .errors()
            .next()
            .map(|d| d.display_message().to_string())
            .expect("expected a syntax error");
        message
    }

    #[test]
    fn test_parse_simple_type() {
        let result = parse("type Query { hello: String }");
        assert!(!result.has_errors());
        assert_eq!(result.document.definitions.len(), 1);
    }

    #[test]
    fn test_parse_shorthand_query() {
        let result = parse("{ add(x: 2, y: 2) }");
        assert!(!result.has_errors());
        let op = result.document.operations().next().expect("operation");
        assert_eq!(op.operation, OperationType::Query);
        assert!(op.name.is_none());
        match &op.selection_set.selections[0] {
            Selection::Field(field) => {
                assert_eq!(field.name.as_str(), "add");
                assert_eq!(field.arguments.len(), 2);
                assert!(matches!(field.arguments[0].value, Value::Int(2, _)));
            }
            _ => panic!("expected field"),
        }
    }

    #[test]
    fn test_parse_named_operations_with_variables() {
        let result = parse(
            r#"
            query Double($x: Int!) { add(x: $x, y: $x) }
            mutation Save($msg: String = "hi") { setMessage(message: $msg) }
        "#,
        );
        assert!(!result.has_errors());
        let ops: Vec<_> = result.document.operations().collect();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].name(), Some("Double"));
        assert_eq!(ops[0].variables[0].ty.to_string(), "Int!");
        assert_eq!(ops[1].operation, OperationType::Mutation);
        assert!(matches!(
            ops[1].variables[0].default_value,
            Some(Value::String(ref s, _)) if s == "hi"
        ));
    }

    #[test]
    fn test_keywords_as_field_names() {
        let result = parse("{ query type fragment: on }");
        assert!(!result.has_errors());
    }

    #[test]
    fn test_parse_fragments() {
        let result = parse(
            r#"
            query { user { ...UserFields ... on Admin { level } ... @include(if: true) { id } } }
            fragment UserFields on User { id name }
        "#,
        );
        assert!(!result.has_errors());
        assert!(result.document.fragment("UserFields").is_some());
        let op = result.document.operations().next().expect("operation");
        let Selection::Field(user) = &op.selection_set.selections[0] else {
            panic!("expected field");
        };
        let inner = &user.selection_set.as_ref().expect("selection set").selections;
        assert!(matches!(inner[0], Selection::FragmentSpread(_)));
        assert!(matches!(inner[1], Selection::InlineFragment(ref f) if f.type_condition.is_some()));
        assert!(matches!(inner[2], Selection::InlineFragment(ref f) if f.type_condition.is_none()));
    }

    #[test]
    fn test_unterminated_selection_set() {
        let result = parse("{ add(x: 2, y: 2)");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics.error_count(), 1);
        assert_eq!(first_error("{ add(x: 2, y: 2)"), "expected }, found <eof>");
    }

    #[test]
    fn test_single_error_reported() {
        let result = parse("{ a( }");
        assert_eq!(result.diagnostics.error_count(), 1);
        assert_eq!(first_error("{ a( }"), "expected name, found }");
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(first_error("  # nothing here\n"), "expected definition, found <eof>");
    }

    #[test]
    fn test_empty_selection_set() {
        assert!(parse("{ }").has_errors());
    }

    #[test]
    fn test_variable_in_const_position() {
        assert!(parse("query ($a: Int = $b) { f }").has_errors());
    }

    #[test]
    fn test_lexer_error_surfaces() {
        assert_eq!(first_error("{ a(x: \"oops) }"), "unterminated string");
        assert_eq!(first_error("{ a(x: 01) }"), "invalid number \"01\"");
    }

    #[test]
    fn test_int_out_of_range() {
        let message = first_error("{ a(x: 99999999999999999999) }");
        assert!(message.contains("out of range"));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let source = format!("{}{}", "{ a ".repeat(100), "}".repeat(100));
        let message = first_error(&source);
        assert!(message.contains("nesting"));
    }

    #[test]
    fn test_parse_schema_sdl() {
        let result = parse(
            r#"
            """
            The root.
            """
            schema { query: Root mutation: Mut }

            "Entry point"
            type Root implements Node & Named @tag(name: "root") {
              "adds"
              add(x: Int = 0, y: Int!): Int
              list: [String!]!
            }
            interface Node { id: ID! }
            union Item = | Root | Mut
            enum Color { RED GREEN }
            input Point { x: Float! y: Float = 1.5 }
            scalar Date
            directive @tag(name: String) repeatable on OBJECT | FIELD_DEFINITION
        "#,
        );
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        assert!(!result.document.is_executable());

        let Definition::Schema(schema) = &result.document.definitions[0] else {
            panic!("expected schema definition");
        };
        assert_eq!(schema.description.as_deref(), Some("The root."));
        assert_eq!(schema.operations.len(), 2);

        let Definition::Type(TypeDefinition::Object(root)) = &result.document.definitions[1] else {
            panic!("expected object type");
        };
        assert_eq!(root.description.as_deref(), Some("Entry point"));
        assert_eq!(root.implements.len(), 2);
        assert_eq!(root.fields[1].ty.to_string(), "[String!]!");
        assert_eq!(root.fields[1].ty.named_type(), "String");

        let Definition::Directive(tag) = result.document.definitions.last().expect("directive") else {
            panic!("expected directive definition");
        };
        assert!(tag.repeatable);
        assert_eq!(
            tag.locations,
            vec![DirectiveLocation::Object, DirectiveLocation::FieldDefinition]
        );
    }

    #[test]
    fn test_extensions_rejected() {
        assert!(parse("extend type Query { a: Int }").has_errors());
    }
}
