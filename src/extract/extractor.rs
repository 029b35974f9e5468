//! Tree-sitter driven fact extraction.
//!
//! The walk is an explicit dispatch on CST node kinds. Field access is
//! defensive throughout: a recognized construct contributes rows, an
//! unexpected tree shape contributes nothing, and grammar error nodes turn
//! into parse-error rows without aborting the file.
//!
//! tree-sitter parsers are not `Sync`, so each worker thread keeps its own
//! parser in a thread-local slot.

use crate::error::{ExtractError, ExtractResult};
use crate::extract::FactsExtractor;
use crate::extract::decl::{parse_object_decl, split_entries};
use crate::extract::process::{ProcessScope, extract_process};
use crate::extract::tags::{is_verification_tag, parse_verification_tag};
use crate::extract::tree::{
    MAX_TREE_DEPTH, descendants_of_kind, first_child_of_kinds, identifiers_in, line_of, node_text,
};
use crate::facts::{
    ArchitectureRow, AssociationRow, CaseRow, ClockDomainRow, ComponentRow, ConfigurationRow,
    ConstantRow, ContextClauseRow, DependencyKind, DependencyRow, EntityRow, FileFacts,
    GenerateKind, GenerateRow, GenericClass, GenericRow, InstanceKind, InstanceRow,
    LibraryClauseRow, NameUseRow, PackageRow, ParseErrorRow, PortRow, ScopeRow, SignalRow,
    SubtypeRow, SymbolDefRow, TypeKind, TypeRow, UseClauseRow, VerificationBlockRow,
    VerificationTagErrorRow, VerificationTagRow,
};
use regex::Regex;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;
use tree_sitter::{Node, Parser};

thread_local! {
    static PARSER: RefCell<Option<Parser>> = const { RefCell::new(None) };
}

fn with_parser<T>(f: impl FnOnce(&mut Parser) -> T) -> ExtractResult<T> {
    PARSER.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            let mut parser = Parser::new();
            parser
                .set_language(&tree_sitter_vhdl::LANGUAGE.into())
                .map_err(|e| ExtractError::ParserInit {
                    reason: e.to_string(),
                })?;
            *slot = Some(parser);
        }
        Ok(f(slot.as_mut().expect("parser installed above")))
    })
}

/// The production extractor: parse with the VHDL grammar, walk the tree.
#[derive(Debug, Default)]
pub struct TreeSitterExtractor;

impl TreeSitterExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl FactsExtractor for TreeSitterExtractor {
    fn extract(&self, path: &Path) -> ExtractResult<FileFacts> {
        let source = std::fs::read_to_string(path).map_err(|e| ExtractError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file = path.to_string_lossy().into_owned();
        let tree = with_parser(|parser| parser.parse(&source, None))?;

        let mut facts = FileFacts::new(&file);
        match tree {
            Some(tree) => {
                let mut visit = Visit {
                    src: &source,
                    file: &file,
                    facts: &mut facts,
                    error_lines: BTreeSet::new(),
                };
                visit.visit(tree.root_node(), &Ctx::default(), 0);
            }
            None => facts.parse_errors.push(ParseErrorRow {
                file: file.clone(),
                line: 1,
                message: "grammar produced no syntax tree".into(),
            }),
        }
        finish(&mut facts);
        Ok(facts)
    }
}

/// Enclosing scope names flowing down the walk.
#[derive(Debug, Clone, Default)]
struct Ctx {
    in_entity: String,
    in_arch: String,
    in_package: String,
    in_component: String,
    in_block: String,
}

impl Ctx {
    /// Nearest enclosing scope name for symbol-definition rows.
    fn scope(&self) -> String {
        for name in [
            &self.in_component,
            &self.in_block,
            &self.in_package,
            &self.in_arch,
            &self.in_entity,
        ] {
            if !name.is_empty() {
                return name.clone();
            }
        }
        String::new()
    }
}

struct Visit<'a> {
    src: &'a str,
    file: &'a str,
    facts: &'a mut FileFacts,
    error_lines: BTreeSet<usize>,
}

impl Visit<'_> {
    fn visit(&mut self, node: Node, ctx: &Ctx, depth: usize) {
        if depth > MAX_TREE_DEPTH {
            return;
        }
        if node.is_error() || node.is_missing() {
            self.record_parse_error(node);
            // Children of an error node may still be well-formed
        }

        match node.kind() {
            "entity_declaration" => {
                let name = name_of(node, self.src).unwrap_or_default();
                if !name.is_empty() {
                    self.facts.entities.push(EntityRow {
                        name: name.clone(),
                        file: self.file.to_string(),
                        line: line_of(node),
                    });
                    self.push_scope("entity", &name, &ctx.scope(), line_of(node));
                }
                let inner = Ctx {
                    in_entity: name,
                    ..ctx.clone()
                };
                self.recurse(node, &inner, depth);
            }
            "architecture_body" => {
                let (name, entity_name) = architecture_names(node, self.src);
                if !name.is_empty() {
                    self.facts.architectures.push(ArchitectureRow {
                        name: name.clone(),
                        entity_name,
                        file: self.file.to_string(),
                        line: line_of(node),
                    });
                    self.push_scope("architecture", &name, &ctx.scope(), line_of(node));
                }
                let inner = Ctx {
                    in_arch: name,
                    ..ctx.clone()
                };
                self.recurse(node, &inner, depth);
            }
            "package_declaration" | "package_body" => {
                let is_body = node.kind() == "package_body";
                let name = name_of(node, self.src).unwrap_or_default();
                if !name.is_empty() {
                    self.facts.packages.push(PackageRow {
                        name: name.clone(),
                        file: self.file.to_string(),
                        line: line_of(node),
                        is_body,
                    });
                    let kind = if is_body { "package_body" } else { "package" };
                    self.push_scope(kind, &name, &ctx.scope(), line_of(node));
                }
                let inner = Ctx {
                    in_package: name,
                    ..ctx.clone()
                };
                self.recurse(node, &inner, depth);
            }
            "configuration_declaration" => {
                let names = child_names(node, self.src);
                let name = names.first().cloned().unwrap_or_default();
                let entity_name = names.get(1).cloned().unwrap_or_default();
                if !name.is_empty() {
                    self.facts.configurations.push(ConfigurationRow {
                        name: name.clone(),
                        entity_name,
                        file: self.file.to_string(),
                        line: line_of(node),
                    });
                    self.push_scope("configuration", &name, &ctx.scope(), line_of(node));
                }
                self.recurse(node, ctx, depth);
            }
            "context_declaration" => {
                let name = name_of(node, self.src).unwrap_or_default();
                if !name.is_empty() {
                    self.push_scope("context", &name, &ctx.scope(), line_of(node));
                }
                self.recurse(node, ctx, depth);
            }
            "context_reference" => {
                for target in clause_targets(node, self.src, "context") {
                    self.facts.context_clauses.push(ContextClauseRow {
                        target: target.clone(),
                        file: self.file.to_string(),
                        line: line_of(node),
                    });
                    self.push_dependency(&target, DependencyKind::Context, line_of(node));
                }
            }
            "library_clause" => {
                for name in clause_targets(node, self.src, "library") {
                    self.facts.library_clauses.push(LibraryClauseRow {
                        name: name.clone(),
                        file: self.file.to_string(),
                        line: line_of(node),
                    });
                    self.push_dependency(&name, DependencyKind::Library, line_of(node));
                }
            }
            "use_clause" => {
                // Multi-item clauses expand into one row per item
                for target in clause_targets(node, self.src, "use") {
                    self.facts.use_clauses.push(UseClauseRow {
                        target: target.clone(),
                        file: self.file.to_string(),
                        line: line_of(node),
                    });
                    self.push_dependency(&target, DependencyKind::Use, line_of(node));
                }
            }
            "port_clause" => self.handle_ports(node, ctx),
            "generic_clause" => self.handle_generics(node, ctx),
            "signal_declaration" => {
                if let Some(decl) = parse_object_decl(node_text(node, self.src)) {
                    for name in decl.names {
                        self.facts.signals.push(SignalRow {
                            name: name.clone(),
                            signal_type: decl.type_text.clone(),
                            default: decl.default.clone(),
                            file: self.file.to_string(),
                            line: line_of(node),
                            in_entity: ctx.in_entity.clone(),
                            in_arch: ctx.in_arch.clone(),
                            in_package: ctx.in_package.clone(),
                        });
                        self.push_symbol_def(&name, "signal", ctx, line_of(node));
                    }
                }
            }
            "constant_declaration" => {
                if let Some(decl) = parse_object_decl(node_text(node, self.src)) {
                    for name in decl.names {
                        self.facts.constants.push(ConstantRow {
                            name: name.clone(),
                            const_type: decl.type_text.clone(),
                            value: decl.default.clone(),
                            file: self.file.to_string(),
                            line: line_of(node),
                            in_entity: ctx.in_entity.clone(),
                            in_arch: ctx.in_arch.clone(),
                            in_package: ctx.in_package.clone(),
                            in_process: String::new(),
                        });
                        self.push_symbol_def(&name, "constant", ctx, line_of(node));
                    }
                }
            }
            "full_type_declaration" => self.handle_type(node, ctx),
            "subtype_declaration" => {
                let text = node_text(node, self.src);
                if let Some(captures) = subtype_pattern().captures(text) {
                    let name = captures[1].to_string();
                    self.facts.subtypes.push(SubtypeRow {
                        name: name.clone(),
                        base_type: crate::extract::decl::normalize_ws(captures[2].trim()),
                        file: self.file.to_string(),
                        line: line_of(node),
                        in_arch: ctx.in_arch.clone(),
                        in_package: ctx.in_package.clone(),
                    });
                    self.push_symbol_def(&name, "subtype", ctx, line_of(node));
                }
            }
            "alias_declaration" => {
                if let Some(name) = identifiers_in(node_text(node, self.src)).into_iter().next() {
                    self.push_symbol_def(&name, "alias", ctx, line_of(node));
                }
            }
            "attribute_declaration" | "attribute_specification" => {
                if let Some(name) = identifiers_in(node_text(node, self.src)).into_iter().next() {
                    self.push_symbol_def(&name, "attribute", ctx, line_of(node));
                }
            }
            "component_declaration" => {
                let name = name_of(node, self.src).unwrap_or_default();
                if name.is_empty() {
                    return;
                }
                self.facts.components.push(ComponentRow {
                    name: name.clone(),
                    file: self.file.to_string(),
                    line: line_of(node),
                    in_arch: ctx.in_arch.clone(),
                    in_package: ctx.in_package.clone(),
                });
                self.push_symbol_def(&name, "component", ctx, line_of(node));
                let inner = Ctx {
                    in_component: name,
                    ..ctx.clone()
                };
                for clause in descendants_of_kind(node, "port_clause") {
                    self.handle_ports(clause, &inner);
                }
                for clause in descendants_of_kind(node, "generic_clause") {
                    self.handle_generics(clause, &inner);
                }
            }
            "component_instantiation_statement" => self.handle_instantiation(node, ctx),
            "process_statement" => {
                let label = first_child_of_kinds(node, &["label"], self.src)
                    .map(|t| t.trim_end_matches(':').trim().to_string())
                    .unwrap_or_default();
                self.push_scope("process", &label, &ctx.scope(), line_of(node));
                let scope = ProcessScope {
                    file: self.file,
                    in_arch: &ctx.in_arch,
                };
                extract_process(node, self.src, &scope, self.facts);
            }
            "for_generate_statement" | "if_generate_statement" | "case_generate_statement" => {
                self.handle_generate(node, ctx);
                self.recurse(node, ctx, depth);
            }
            "block_statement" => {
                let label = first_child_of_kinds(node, &["label"], self.src)
                    .map(|t| t.trim_end_matches(':').trim().to_string())
                    .unwrap_or_default();
                if label.eq_ignore_ascii_case("verification") {
                    self.facts.verification_blocks.push(VerificationBlockRow {
                        label: label.clone(),
                        file: self.file.to_string(),
                        line: line_of(node),
                        in_arch: ctx.in_arch.clone(),
                    });
                }
                self.push_scope("block", &label, &ctx.scope(), line_of(node));
                let inner = Ctx {
                    in_block: label,
                    ..ctx.clone()
                };
                self.recurse(node, &inner, depth);
            }
            "function_body" | "function_declaration" => {
                self.handle_function(node, ctx, node.kind() == "function_body");
            }
            "procedure_body" | "procedure_declaration" => {
                let has_body = node.kind() == "procedure_body";
                if let Some(name) = name_of(node, self.src) {
                    self.facts.procedures.push(crate::facts::ProcedureRow {
                        name: name.clone(),
                        has_body,
                        file: self.file.to_string(),
                        line: line_of(node),
                        in_arch: ctx.in_arch.clone(),
                        in_package: ctx.in_package.clone(),
                    });
                    self.push_symbol_def(&name, "procedure", ctx, line_of(node));
                    if has_body {
                        self.push_scope("procedure", &name, &ctx.scope(), line_of(node));
                    }
                }
            }
            "package_instantiation_declaration" => {
                let text = node_text(node, self.src);
                if let Some(captures) = package_instance_pattern().captures(text) {
                    let name = captures[1].to_string();
                    let target = captures[2].to_string();
                    self.facts.packages.push(PackageRow {
                        name,
                        file: self.file.to_string(),
                        line: line_of(node),
                        is_body: false,
                    });
                    self.push_dependency(&target, DependencyKind::PackageInstantiation, line_of(node));
                }
            }
            "configuration_specification" => {
                if let Some(target) = binding_target(node_text(node, self.src)) {
                    self.push_dependency(
                        &target,
                        DependencyKind::ConfigurationSpecification,
                        line_of(node),
                    );
                }
            }
            "procedure_instantiation_declaration" | "function_instantiation_declaration" => {
                let text = node_text(node, self.src);
                if let Some(captures) = subprogram_instance_pattern().captures(text) {
                    self.push_dependency(
                        &captures[2].to_string(),
                        DependencyKind::SubprogramInstantiation,
                        line_of(node),
                    );
                }
            }
            "simple_concurrent_signal_assignment"
            | "conditional_concurrent_signal_assignment"
            | "selected_concurrent_signal_assignment" => {
                self.handle_concurrent_assignment(node, ctx);
            }
            "comment" => {
                let text = node_text(node, self.src);
                if is_verification_tag(text) {
                    self.handle_tag(text, node, ctx);
                }
            }
            _ => self.recurse(node, ctx, depth),
        }
    }

    fn recurse(&mut self, node: Node, ctx: &Ctx, depth: usize) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            self.visit(child, ctx, depth + 1);
        }
    }

    fn record_parse_error(&mut self, node: Node) {
        let line = line_of(node);
        if !self.error_lines.insert(line) {
            return;
        }
        let fragment: String = node_text(node, self.src).chars().take(40).collect();
        let message = if node.is_missing() {
            format!("missing {} near line {line}", node.kind())
        } else {
            format!("syntax error near '{}'", fragment.trim())
        };
        self.facts.parse_errors.push(ParseErrorRow {
            file: self.file.to_string(),
            line,
            message,
        });
    }

    fn push_scope(&mut self, kind: &str, name: &str, parent: &str, line: usize) {
        self.facts.scopes.push(ScopeRow {
            kind: kind.to_string(),
            name: name.to_string(),
            parent: parent.to_string(),
            file: self.file.to_string(),
            line,
        });
    }

    fn push_symbol_def(&mut self, name: &str, kind: &str, ctx: &Ctx, line: usize) {
        self.facts.symbol_defs.push(SymbolDefRow {
            name: name.to_string(),
            kind: kind.to_string(),
            scope: ctx.scope(),
            file: self.file.to_string(),
            line,
        });
    }

    fn push_dependency(&mut self, target: &str, kind: DependencyKind, line: usize) {
        self.facts.dependencies.push(DependencyRow {
            file: self.file.to_string(),
            target: target.to_string(),
            kind,
            line,
            resolved: false,
        });
    }

    fn handle_ports(&mut self, clause: Node, ctx: &Ctx) {
        for (text, line) in interface_entries(clause, self.src) {
            if let Some(decl) = parse_object_decl(&text) {
                for name in decl.names {
                    self.facts.ports.push(PortRow {
                        name: name.clone(),
                        direction: decl.direction,
                        port_type: decl.type_text.clone(),
                        default: decl.default.clone(),
                        file: self.file.to_string(),
                        line,
                        in_entity: ctx.in_entity.clone(),
                        in_component: ctx.in_component.clone(),
                    });
                    self.push_symbol_def(&name, "port", ctx, line);
                }
            }
        }
    }

    fn handle_generics(&mut self, clause: Node, ctx: &Ctx) {
        for (text, line) in interface_entries(clause, self.src) {
            let lower = text.trim_start().to_ascii_lowercase();
            let class = if lower.starts_with("type ") {
                GenericClass::Type
            } else if lower.starts_with("function ") || lower.starts_with("impure function ")
                || lower.starts_with("pure function ")
            {
                GenericClass::Function
            } else if lower.starts_with("procedure ") {
                GenericClass::Procedure
            } else if lower.starts_with("package ") {
                GenericClass::Package
            } else {
                GenericClass::Constant
            };

            match class {
                GenericClass::Constant => {
                    if let Some(decl) = parse_object_decl(&text) {
                        for name in decl.names {
                            self.push_generic(name, class, &decl.type_text, &decl.default, ctx, line);
                        }
                    }
                }
                _ => {
                    // Interface subprogram/type/package generics: the first
                    // non-keyword word is the name
                    if let Some(name) = identifiers_in(&text).into_iter().next() {
                        self.push_generic(name, class, "", "", ctx, line);
                    }
                }
            }
        }
    }

    fn push_generic(
        &mut self,
        name: String,
        class: GenericClass,
        generic_type: &str,
        default: &str,
        ctx: &Ctx,
        line: usize,
    ) {
        self.facts.generics.push(GenericRow {
            name: name.clone(),
            class,
            generic_type: generic_type.to_string(),
            default: default.to_string(),
            file: self.file.to_string(),
            line,
            in_entity: ctx.in_entity.clone(),
            in_component: ctx.in_component.clone(),
            in_package: ctx.in_package.clone(),
        });
        self.push_symbol_def(&name, "generic", ctx, line);
    }

    fn handle_type(&mut self, node: Node, ctx: &Ctx) {
        let Some(name) = name_of(node, self.src) else {
            return;
        };
        let text = node_text(node, self.src);
        let lower = text.to_ascii_lowercase();

        let mut kind = TypeKind::Other;
        let mut literals = Vec::new();
        for (node_kind, type_kind) in [
            ("enumeration_type_definition", TypeKind::Enumeration),
            ("record_type_definition", TypeKind::Record),
            ("constrained_array_definition", TypeKind::Array),
            ("unbounded_array_definition", TypeKind::Array),
            ("access_type_definition", TypeKind::Access),
            ("file_type_definition", TypeKind::File),
            ("protected_type_declaration", TypeKind::Protected),
            ("physical_type_definition", TypeKind::Physical),
            ("numeric_type_definition", TypeKind::Integer),
        ] {
            if let Some(definition) = descendants_of_kind(node, node_kind).into_iter().next() {
                kind = type_kind;
                if kind == TypeKind::Enumeration {
                    literals = enumeration_literals(node_text(definition, self.src));
                }
                break;
            }
        }
        if kind == TypeKind::Other {
            // Tree shape fallback on the declaration text
            kind = if lower.contains(" is (") || lower.contains(" is(") {
                literals = enumeration_literals(&text[text.find('(').unwrap_or(0)..]);
                TypeKind::Enumeration
            } else if lower.contains(" is array") {
                TypeKind::Array
            } else if lower.contains(" is record") {
                TypeKind::Record
            } else if lower.contains(" is access") {
                TypeKind::Access
            } else if lower.contains(" is file") {
                TypeKind::File
            } else if lower.contains(" is protected") {
                TypeKind::Protected
            } else if lower.contains(" is range") {
                TypeKind::Integer
            } else {
                TypeKind::Other
            };
        }

        self.facts.types.push(TypeRow {
            name: name.clone(),
            kind,
            file: self.file.to_string(),
            line: line_of(node),
            in_entity: ctx.in_entity.clone(),
            in_arch: ctx.in_arch.clone(),
            in_package: ctx.in_package.clone(),
            literals,
        });
        self.push_symbol_def(&name, "type", ctx, line_of(node));
    }

    fn handle_function(&mut self, node: Node, ctx: &Ctx, has_body: bool) {
        let text = node_text(node, self.src);
        let lower = text.trim_start().to_ascii_lowercase();
        let purity = if lower.starts_with("impure") {
            "impure"
        } else if lower.starts_with("pure") {
            "pure"
        } else {
            ""
        };
        let Some(name) = name_of(node, self.src) else {
            return;
        };
        let return_type = return_type_pattern()
            .captures(text)
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        self.facts.functions.push(crate::facts::FunctionRow {
            name: name.clone(),
            purity: purity.to_string(),
            return_type,
            has_body,
            file: self.file.to_string(),
            line: line_of(node),
            in_arch: ctx.in_arch.clone(),
            in_package: ctx.in_package.clone(),
        });
        self.push_symbol_def(&name, "function", ctx, line_of(node));
        if has_body {
            self.push_scope("function", &name, &ctx.scope(), line_of(node));
        }
    }

    fn handle_generate(&mut self, node: Node, ctx: &Ctx) {
        let text = node_text(node, self.src);
        let label = first_child_of_kinds(node, &["label"], self.src)
            .map(|t| t.trim_end_matches(':').trim().to_string())
            .unwrap_or_default();
        let (kind, can_elaborate) = match node.kind() {
            "for_generate_statement" => {
                (GenerateKind::For, literal_range_pattern().is_match(text))
            }
            "if_generate_statement" => {
                (GenerateKind::If, literal_condition_pattern().is_match(text))
            }
            _ => (GenerateKind::Case, true),
        };
        self.facts.generates.push(GenerateRow {
            label: label.clone(),
            kind,
            file: self.file.to_string(),
            line: line_of(node),
            in_arch: ctx.in_arch.clone(),
            can_elaborate,
        });
        self.push_scope("generate", &label, &ctx.scope(), line_of(node));
    }

    fn handle_instantiation(&mut self, node: Node, ctx: &Ctx) {
        let label = first_child_of_kinds(node, &["label"], self.src)
            .map(|t| t.trim_end_matches(':').trim().to_string())
            .unwrap_or_default();

        let (target, kind, dependency_kind) = if let Some(inst) =
            descendants_of_kind(node, "entity_instantiation").into_iter().next()
        {
            let raw = node_text(inst, self.src);
            (
                strip_arch_suffix(raw.trim_start_matches("entity").trim()),
                InstanceKind::Entity,
                DependencyKind::Instantiation,
            )
        } else if let Some(inst) =
            descendants_of_kind(node, "configuration_instantiation").into_iter().next()
        {
            let raw = node_text(inst, self.src);
            (
                raw.trim_start_matches("configuration").trim().to_string(),
                InstanceKind::Configuration,
                DependencyKind::Instantiation,
            )
        } else if let Some(inst) =
            descendants_of_kind(node, "component_instantiation").into_iter().next()
        {
            (
                node_text(inst, self.src)
                    .trim_start_matches("component")
                    .trim()
                    .to_string(),
                InstanceKind::Component,
                DependencyKind::Component,
            )
        } else if let Some((target, kind, dep)) = instantiation_fallback(node, self.src) {
            (target, kind, dep)
        } else {
            return;
        };
        if target.is_empty() {
            return;
        }

        let mut associations = Vec::new();
        for (aspect_kind, list) in [("port_map_aspect", "port"), ("generic_map_aspect", "generic")]
        {
            for aspect in descendants_of_kind(node, aspect_kind) {
                collect_associations(aspect, self.src, list, &mut associations);
            }
        }

        self.push_dependency(&target, dependency_kind, line_of(node));
        self.facts.instances.push(InstanceRow {
            label,
            target,
            kind,
            file: self.file.to_string(),
            line: line_of(node),
            in_arch: ctx.in_arch.clone(),
            associations,
        });
    }

    fn handle_concurrent_assignment(&mut self, node: Node, ctx: &Ctx) {
        let text = node_text(node, self.src);
        let Some(split) = text.find("<=") else {
            return;
        };
        if let Some(target) = identifiers_in(&text[..split]).into_iter().next() {
            self.facts.name_uses.push(NameUseRow {
                name: target,
                access: "write".into(),
                file: self.file.to_string(),
                line: line_of(node),
                in_process: String::new(),
                in_arch: ctx.in_arch.clone(),
            });
        }
        for name in identifiers_in(&text[split + 2..]) {
            self.facts.name_uses.push(NameUseRow {
                name,
                access: "read".into(),
                file: self.file.to_string(),
                line: line_of(node),
                in_process: String::new(),
                in_arch: ctx.in_arch.clone(),
            });
        }
    }

    fn handle_tag(&mut self, text: &str, node: Node, ctx: &Ctx) {
        match parse_verification_tag(text) {
            Ok(tag) => self.facts.verification_tags.push(VerificationTagRow {
                id: tag.id,
                scope: tag.scope,
                bindings: tag.bindings,
                file: self.file.to_string(),
                line: line_of(node),
                in_arch: ctx.in_arch.clone(),
                in_block: ctx.in_block.clone(),
            }),
            Err(message) => self
                .facts
                .verification_tag_errors
                .push(VerificationTagErrorRow {
                    file: self.file.to_string(),
                    line: line_of(node),
                    message,
                    raw: text.trim().to_string(),
                }),
        }
    }
}

/// Extract a case statement (called from process extraction).
pub(super) fn extract_case(
    node: Node,
    src: &str,
    file: &str,
    in_process: &str,
    in_arch: &str,
    facts: &mut FileFacts,
) {
    let text = node_text(node, src);
    let Some(expression) = case_expression_pattern()
        .captures(text)
        .map(|c| c[1].trim().to_string())
    else {
        return;
    };

    let mut choices = Vec::new();
    let mut has_others = false;
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != "case_statement_alternative" {
            continue;
        }
        let alt_text = node_text(child, src);
        let Some(choice) = alternative_choice(alt_text) else {
            continue;
        };
        if choice.eq_ignore_ascii_case("others") {
            has_others = true;
        } else {
            choices.push(choice);
        }
    }

    facts.case_statements.push(CaseRow {
        expression,
        choices,
        has_others,
        is_complete: has_others, // refined in finish() against enum types
        file: file.to_string(),
        line: line_of(node),
        in_process: in_process.to_string(),
        in_arch: in_arch.to_string(),
    });
}

/// Post-walk passes that need whole-file context.
fn finish(facts: &mut FileFacts) {
    complete_cases(facts);
    summarize_clock_domains(facts);
}

/// Mark case statements complete when their choices cover a same-file
/// enumeration type.
fn complete_cases(facts: &mut FileFacts) {
    for case in &mut facts.case_statements {
        if case.is_complete {
            continue;
        }
        let Some(signal) = facts
            .signals
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(&case.expression))
        else {
            continue;
        };
        let Some(enum_type) = facts.types.iter().find(|t| {
            t.kind == crate::facts::TypeKind::Enumeration
                && t.name.eq_ignore_ascii_case(&signal.signal_type)
        }) else {
            continue;
        };
        let covered: BTreeSet<String> = case
            .choices
            .iter()
            .flat_map(|choice| choice.split('|'))
            .map(|choice| choice.trim().to_ascii_lowercase())
            .collect();
        case.is_complete = enum_type
            .literals
            .iter()
            .all(|literal| covered.contains(&literal.to_ascii_lowercase()));
    }
}

/// Group sequential processes by clock into per-architecture summaries.
fn summarize_clock_domains(facts: &mut FileFacts) {
    let mut domains: Vec<ClockDomainRow> = Vec::new();
    for process in facts.processes.iter().filter(|p| p.is_sequential) {
        let found = domains.iter_mut().find(|d| {
            d.in_arch.eq_ignore_ascii_case(&process.in_arch)
                && d.clock_signal.eq_ignore_ascii_case(&process.clock_signal)
                && d.clock_edge == process.clock_edge
        });
        match found {
            Some(domain) => {
                domain.process_count += 1;
                if !process.reset_signal.is_empty()
                    && !domain
                        .reset_signals
                        .iter()
                        .any(|r| r.eq_ignore_ascii_case(&process.reset_signal))
                {
                    domain.reset_signals.push(process.reset_signal.clone());
                }
            }
            None => domains.push(ClockDomainRow {
                file: process.file.clone(),
                in_arch: process.in_arch.clone(),
                clock_signal: process.clock_signal.clone(),
                clock_edge: process.clock_edge,
                process_count: 1,
                reset_signals: if process.reset_signal.is_empty() {
                    Vec::new()
                } else {
                    vec![process.reset_signal.clone()]
                },
            }),
        }
    }
    facts.clock_domains = domains;
}

fn name_of(node: Node, src: &str) -> Option<String> {
    if let Some(name) = node.child_by_field_name("name") {
        let text = node_text(name, src).trim();
        if !text.is_empty() {
            return Some(text.to_string());
        }
    }
    first_child_of_kinds(node, &["identifier", "extended_identifier"], src)
        .map(|t| t.trim().to_string())
}

/// Direct child names in document order (identifiers and name references).
fn child_names(node: Node, src: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if matches!(
            child.kind(),
            "identifier" | "extended_identifier" | "simple_name" | "selected_name"
        ) {
            out.push(node_text(child, src).trim().to_string());
        }
    }
    out
}

/// Architecture name and the entity it implements.
fn architecture_names(node: Node, src: &str) -> (String, String) {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(n, src).trim().to_string());
    let entity = node
        .child_by_field_name("entity")
        .map(|n| node_text(n, src).trim().to_string());
    if let (Some(name), Some(entity)) = (&name, &entity) {
        return (name.clone(), entity.clone());
    }
    let names = child_names(node, src);
    (
        name.or_else(|| names.first().cloned()).unwrap_or_default(),
        entity.or_else(|| names.get(1).cloned()).unwrap_or_default(),
    )
}

/// Targets of a use/library/context clause, one per item.
fn clause_targets(node: Node, src: &str, keyword: &str) -> Vec<String> {
    // Only outermost selected names: `a.b.all` nests selected names, and
    // each nesting level must not become its own row
    let selected: Vec<Node> = descendants_of_kind(node, "selected_name")
        .into_iter()
        .filter(|n| {
            let mut parent = n.parent();
            while let Some(p) = parent {
                if p.id() == node.id() {
                    return true;
                }
                if p.kind() == "selected_name" {
                    return false;
                }
                parent = p.parent();
            }
            true
        })
        .collect();
    if !selected.is_empty() {
        return selected
            .into_iter()
            .map(|n| node_text(n, src).trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
    }
    let named = child_names(node, src);
    if !named.is_empty() {
        return named;
    }
    // Last resort: strip the keyword and split on commas
    let text = node_text(node, src).trim().trim_end_matches(';');
    let lower = text.to_ascii_lowercase();
    let body = lower
        .strip_prefix(keyword)
        .map(|_| text[keyword.len()..].trim())
        .unwrap_or(text);
    body.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Entries of a port or generic clause with their 1-based lines.
fn interface_entries(clause: Node, src: &str) -> Vec<(String, usize)> {
    let mut out = Vec::new();
    let mut cursor = clause.walk();
    for child in clause.named_children(&mut cursor) {
        if child.kind().ends_with("_interface_declaration") {
            out.push((node_text(child, src).to_string(), line_of(child)));
        }
    }
    if !out.is_empty() {
        return out;
    }

    // Fallback: split the clause body text between its outer parentheses
    let text = node_text(clause, src);
    let Some(open) = text.find('(') else {
        return out;
    };
    let Some(close) = text.rfind(')') else {
        return out;
    };
    if close <= open {
        return out;
    }
    let body = &text[open + 1..close];
    let clause_line = line_of(clause);
    for entry in split_entries(body) {
        let offset = entry.as_ptr() as usize - text.as_ptr() as usize;
        let line = clause_line + text[..offset].matches('\n').count();
        out.push((entry.to_string(), line));
    }
    out
}

/// Collect formal->actual pairs from a map aspect.
fn collect_associations(aspect: Node, src: &str, list: &str, out: &mut Vec<AssociationRow>) {
    let named = descendants_of_kind(aspect, "named_association_element");
    let positional = descendants_of_kind(aspect, "positional_association_element");
    if named.is_empty() && positional.is_empty() {
        // Textual fallback over the aspect's parenthesized body
        let text = node_text(aspect, src);
        let (Some(open), Some(close)) = (text.find('('), text.rfind(')')) else {
            return;
        };
        if close <= open {
            return;
        }
        for entry in split_map_entries(&text[open + 1..close]) {
            out.push(association_from_text(&entry, list));
        }
        return;
    }
    for node in named {
        out.push(association_from_text(node_text(node, src), list));
    }
    for node in positional {
        out.push(AssociationRow {
            formal: String::new(),
            actual: node_text(node, src).trim().to_string(),
            positional: true,
            list: list.to_string(),
        });
    }
}

fn association_from_text(text: &str, list: &str) -> AssociationRow {
    match text.split_once("=>") {
        Some((formal, actual)) => AssociationRow {
            formal: formal.trim().to_string(),
            actual: actual.trim().to_string(),
            positional: false,
            list: list.to_string(),
        },
        None => AssociationRow {
            formal: String::new(),
            actual: text.trim().to_string(),
            positional: true,
            list: list.to_string(),
        },
    }
}

/// Split a map aspect body at top-level commas.
fn split_map_entries(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(text[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < text.len() {
        out.push(text[start..].trim().to_string());
    }
    out.retain(|entry| !entry.is_empty());
    out
}

/// `when <choice> =>` choice text of a case alternative.
fn alternative_choice(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let when = lower.find("when")?;
    let arrow = text[when..].find("=>").map(|i| i + when)?;
    Some(text[when + 4..arrow].trim().to_string())
}

/// Strip a trailing `(arch)` selector from an instantiated entity name.
fn strip_arch_suffix(raw: &str) -> String {
    match raw.find('(') {
        Some(open) => raw[..open].trim().to_string(),
        None => raw.trim().to_string(),
    }
}

/// Textual fallback when the instantiation CST children are unrecognized:
/// `label : [entity|configuration] name ...`.
fn instantiation_fallback(
    node: Node,
    src: &str,
) -> Option<(String, InstanceKind, DependencyKind)> {
    let text = node_text(node, src);
    let after_label = match text.split_once(':') {
        Some((_, rest)) => rest,
        None => text,
    };
    let trimmed = after_label.trim_start();
    let lower = trimmed.to_ascii_lowercase();
    if let Some(rest) = lower.strip_prefix("entity") {
        if rest.starts_with(char::is_whitespace) {
            let raw = &trimmed[trimmed.len() - rest.len()..];
            let name = raw.split_whitespace().next()?;
            return Some((
                strip_arch_suffix(name),
                InstanceKind::Entity,
                DependencyKind::Instantiation,
            ));
        }
    }
    if let Some(rest) = lower.strip_prefix("configuration") {
        if rest.starts_with(char::is_whitespace) {
            let name = trimmed.split_whitespace().nth(1)?;
            return Some((
                name.to_string(),
                InstanceKind::Configuration,
                DependencyKind::Instantiation,
            ));
        }
    }
    let name = trimmed.split_whitespace().next()?;
    if name.is_empty() || lower.starts_with("process") || lower.starts_with("block") {
        return None;
    }
    Some((
        name.trim_end_matches(';').to_string(),
        InstanceKind::Component,
        DependencyKind::Component,
    ))
}

/// `for <instances> : <component> use entity <target>` binding target.
fn binding_target(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?is)\buse\s+(?:entity|configuration)\s+([A-Za-z][\w.]*)")
            .expect("binding target pattern")
    });
    re.captures(text).map(|c| strip_arch_suffix(&c[1]))
}

fn enumeration_literals(text: &str) -> Vec<String> {
    let open = text.find('(').map(|i| i + 1).unwrap_or(0);
    let close = text.rfind(')').unwrap_or(text.len());
    if close <= open {
        return Vec::new();
    }
    text[open..close]
        .split(',')
        .map(|literal| literal.trim().trim_end_matches(';').to_string())
        .filter(|literal| !literal.is_empty())
        .collect()
}

fn subtype_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\bsubtype\s+([A-Za-z][\w]*)\s+is\s+(.+?);?\s*$")
            .expect("subtype pattern")
    })
}

fn return_type_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\breturn\s+([A-Za-z][\w.]*)").expect("return type pattern")
    })
}

fn case_expression_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)^\s*case\s+(.+?)\s+is\b").expect("case expression pattern")
    })
}

fn package_instance_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\bpackage\s+([A-Za-z][\w]*)\s+is\s+new\s+([A-Za-z][\w.]*)")
            .expect("package instance pattern")
    })
}

fn subprogram_instance_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\b(function|procedure)\s+([A-Za-z][\w]*)\s+is\s+new\s+")
            .expect("subprogram instance pattern")
    })
}

fn literal_range_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\bfor\s+\w+\s+in\s+\d+\s+(to|downto)\s+\d+")
            .expect("literal range pattern")
    })
}

fn literal_condition_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)\bif\s+(true|false|\w+\s*=\s*(\d+|"[01]*"|'.'|true|false))\s+generate"#)
            .expect("literal condition pattern")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::{ClockEdge, ResetKind};
    use std::fs;
    use tempfile::TempDir;

    fn extract_source(source: &str) -> FileFacts {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("unit.vhd");
        fs::write(&path, source).unwrap();
        TreeSitterExtractor::new().extract(&path).unwrap()
    }

    const COUNTER: &str = "\
library ieee;
use ieee.std_logic_1164.all, ieee.numeric_std.all;

entity counter is
  generic (
    WIDTH : integer := 8
  );
  port (
    clk   : in  std_logic;
    rst_n : in  std_logic;
    q     : out std_logic_vector(7 downto 0)
  );
end entity counter;

architecture rtl of counter is
  signal count : unsigned(7 downto 0);
begin
  main : process(clk, rst_n)
  begin
    if rst_n = '0' then
      count <= (others => '0');
    elsif rising_edge(clk) then
      count <= count + 1;
    end if;
  end process main;

  q <= std_logic_vector(count);
end architecture rtl;
";

    #[test]
    fn extracts_design_units() {
        let facts = extract_source(COUNTER);
        assert_eq!(facts.entities.len(), 1);
        assert_eq!(facts.entities[0].name, "counter");
        assert_eq!(facts.architectures.len(), 1);
        assert_eq!(facts.architectures[0].name, "rtl");
        assert_eq!(facts.architectures[0].entity_name, "counter");
    }

    #[test]
    fn extracts_ports_and_generics() {
        let facts = extract_source(COUNTER);
        let names: Vec<&str> = facts.ports.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["clk", "rst_n", "q"]);
        assert_eq!(facts.ports[0].direction, crate::facts::Direction::In);
        assert_eq!(facts.ports[2].direction, crate::facts::Direction::Out);
        assert!(facts.ports.iter().all(|p| p.in_entity == "counter"));

        assert_eq!(facts.generics.len(), 1);
        assert_eq!(facts.generics[0].name, "WIDTH");
        assert_eq!(facts.generics[0].default, "8");
    }

    #[test]
    fn multi_item_use_expands() {
        let facts = extract_source(COUNTER);
        let targets: Vec<&str> = facts.use_clauses.iter().map(|u| u.target.as_str()).collect();
        assert_eq!(
            targets,
            vec!["ieee.std_logic_1164.all", "ieee.numeric_std.all"]
        );
    }

    #[test]
    fn classifies_sequential_process_with_async_reset() {
        let facts = extract_source(COUNTER);
        assert_eq!(facts.processes.len(), 1);
        let process = &facts.processes[0];
        assert!(process.is_sequential);
        assert!(!process.is_combinational);
        assert_eq!(process.clock_signal, "clk");
        assert_eq!(process.clock_edge, ClockEdge::Rising);
        assert_eq!(process.reset_signal, "rst_n");
        assert_eq!(process.reset_kind, ResetKind::Async);
        assert_eq!(process.sensitivity, vec!["clk", "rst_n"]);
        assert!(process.writes.iter().any(|w| w == "count"));
    }

    #[test]
    fn combinational_process_has_no_clock() {
        let facts = extract_source(
            "\
entity mux is
end entity;

architecture comb of mux is
  signal a, b, sel, y : bit;
begin
  p_mux : process(all)
  begin
    if sel = '1' then
      y <= a;
    else
      y <= b;
    end if;
  end process;
end architecture;
",
        );
        let process = &facts.processes[0];
        assert!(process.is_combinational);
        assert_eq!(process.clock_signal, "");
        assert!(process.sensitivity_all);
    }

    #[test]
    fn falling_edge_and_tick_event_forms() {
        let facts = extract_source(
            "\
entity ff is
end entity;

architecture rtl of ff is
  signal q, d, clk : bit;
begin
  p1 : process(clk)
  begin
    if falling_edge(clk) then
      q <= d;
    end if;
  end process;

  p2 : process(clk)
  begin
    if clk'event and clk = '1' then
      q <= d;
    end if;
  end process;
end architecture;
",
        );
        assert_eq!(facts.processes.len(), 2);
        assert_eq!(facts.processes[0].clock_edge, ClockEdge::Falling);
        assert_eq!(facts.processes[1].clock_edge, ClockEdge::Rising);
        assert_eq!(facts.clock_domains.len(), 2);
    }

    #[test]
    fn case_statement_completeness() {
        let facts = extract_source(
            "\
entity fsm is
end entity;

architecture rtl of fsm is
  type state_t is (IDLE, RUN, DONE);
  signal state : state_t;
  signal y : bit;
begin
  p : process(state)
  begin
    case state is
      when IDLE => y <= '0';
      when RUN  => y <= '1';
    end case;
  end process;
end architecture;
",
        );
        assert_eq!(facts.types.len(), 1);
        assert_eq!(facts.types[0].literals, vec!["IDLE", "RUN", "DONE"]);
        assert_eq!(facts.case_statements.len(), 1);
        let case = &facts.case_statements[0];
        assert_eq!(case.expression, "state");
        assert!(!case.has_others);
        assert!(!case.is_complete);
        assert_eq!(case.choices, vec!["IDLE", "RUN"]);
    }

    #[test]
    fn case_with_others_is_complete() {
        let facts = extract_source(
            "\
entity fsm is
end entity;

architecture rtl of fsm is
  signal sel : bit;
  signal y : bit;
begin
  p : process(sel)
  begin
    case sel is
      when '0' => y <= '0';
      when others => y <= '1';
    end case;
  end process;
end architecture;
",
        );
        let case = &facts.case_statements[0];
        assert!(case.has_others);
        assert!(case.is_complete);
    }

    #[test]
    fn direct_instantiation_yields_dependency() {
        let facts = extract_source(
            "\
entity top is
end entity;

architecture structural of top is
  signal clk, rst : bit;
begin
  u_core : entity work.core(rtl)
    port map (
      clk => clk,
      rst => rst
    );
end architecture;
",
        );
        assert_eq!(facts.instances.len(), 1);
        let instance = &facts.instances[0];
        assert_eq!(instance.label, "u_core");
        assert_eq!(instance.target, "work.core");
        assert_eq!(instance.kind, InstanceKind::Entity);
        assert_eq!(instance.associations.len(), 2);
        assert!(instance.associations.iter().all(|a| !a.positional));
        assert_eq!(instance.associations[0].formal, "clk");

        assert!(facts.dependencies.iter().any(|d| {
            d.target == "work.core" && d.kind == DependencyKind::Instantiation
        }));
    }

    #[test]
    fn verification_tag_rows() {
        let facts = extract_source(
            "\
entity fsm is
end entity;

architecture rtl of fsm is
  signal state : bit;
begin
  --@check id=fsm.legal_state scope=arch:rtl state=state
  --@check id=fsm.legal_state scope=arch:rtl
end architecture;
",
        );
        assert_eq!(facts.verification_tags.len(), 1);
        assert_eq!(facts.verification_tags[0].id, "fsm.legal_state");
        assert_eq!(facts.verification_tags[0].in_arch, "rtl");
        assert_eq!(facts.verification_tag_errors.len(), 1);
        assert!(facts.verification_tag_errors[0].message.contains("state"));
    }

    #[test]
    fn package_and_component_rows() {
        let facts = extract_source(
            "\
package util_pkg is
  constant C_MAGIC : integer := 42;
  component fifo is
    port (
      wr : in bit;
      rd : in bit
    );
  end component;
end package util_pkg;
",
        );
        assert_eq!(facts.packages.len(), 1);
        assert!(!facts.packages[0].is_body);
        assert_eq!(facts.components.len(), 1);
        assert_eq!(facts.components[0].name, "fifo");
        assert_eq!(facts.components[0].in_package, "util_pkg");
        assert!(facts.constants.iter().any(|c| c.name == "C_MAGIC"));
        let fifo_ports: Vec<&PortRow> = facts
            .ports
            .iter()
            .filter(|p| p.in_component == "fifo")
            .collect();
        assert_eq!(fifo_ports.len(), 2);
    }

    #[test]
    fn identical_input_identical_facts() {
        let first = extract_source(COUNTER);
        let second = extract_source(COUNTER);
        assert_eq!(first, second);
    }

    #[test]
    fn unreadable_file_is_read_error() {
        let err = TreeSitterExtractor::new()
            .extract(Path::new("/nonexistent/missing.vhd"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::Read { .. }));
    }

    #[test]
    fn malformed_source_yields_parse_errors_not_failure() {
        let facts = extract_source("entity broken is port ( ; end entity;\n@@@@\n");
        assert!(!facts.parse_errors.is_empty());
    }
}
