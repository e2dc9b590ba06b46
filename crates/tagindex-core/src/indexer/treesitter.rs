//! Tree-sitter backed snippet extraction.
//!
//! Emits one snippet per definition node (functions, methods, classes,
//! interfaces, type declarations), nested definitions included. Lines are
//! 0-based tree-sitter rows.

use std::sync::LazyLock;

use regex::Regex;
use tree_sitter::{Language, Node, Parser};

use crate::errors::{ExtractionError, ExtractionResult};
use crate::indexer::extract::SnippetExtractor;
use crate::indexer::filesystem::detect_language;
use crate::models::Snippet;

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const JAVA_DEFINITIONS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "method_declaration",
    "constructor_declaration",
];

const TYPESCRIPT_DEFINITIONS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "class_declaration",
    "abstract_class_declaration",
    "method_definition",
    "interface_declaration",
    "type_alias_declaration",
    "enum_declaration",
];

const GO_DEFINITIONS: &[&str] = &["function_declaration", "method_declaration", "type_spec"];

const PYTHON_DEFINITIONS: &[&str] = &["function_definition", "class_definition"];

#[derive(Clone, Copy, Debug, Default)]
pub struct TreeSitterExtractor;

impl TreeSitterExtractor {
    pub const SUPPORTED_LANGUAGES: [&'static str; 6] =
        ["java", "typescript", "tsx", "javascript", "go", "python"];

    pub fn new() -> Self {
        Self
    }

    fn grammar(language: &str) -> Option<(Language, &'static [&'static str])> {
        let (ts_language, definitions) = match language {
            "java" => (tree_sitter_java::LANGUAGE, JAVA_DEFINITIONS),
            "typescript" => (
                tree_sitter_typescript::LANGUAGE_TYPESCRIPT,
                TYPESCRIPT_DEFINITIONS,
            ),
            "tsx" | "javascript" => (tree_sitter_typescript::LANGUAGE_TSX, TYPESCRIPT_DEFINITIONS),
            "go" => (tree_sitter_go::LANGUAGE, GO_DEFINITIONS),
            "python" => (tree_sitter_python::LANGUAGE, PYTHON_DEFINITIONS),
            _ => return None,
        };
        Some((ts_language.into(), definitions))
    }

    /// Extract snippets from `source` parsed as `language`.
    pub fn extract_language(
        &self,
        path: &str,
        language: &str,
        source: &str,
    ) -> ExtractionResult<Vec<Snippet>> {
        let (grammar, definitions) = Self::grammar(language)
            .ok_or_else(|| ExtractionError::Unsupported(language.to_string()))?;

        let mut parser = Parser::new();
        parser
            .set_language(&grammar)
            .map_err(|e| ExtractionError::Parse(format!("Failed to set language: {e}")))?;
        let tree = parser
            .parse(source.as_bytes(), None)
            .ok_or_else(|| ExtractionError::Parse(format!("Failed to parse {path}")))?;

        let mut snippets = Vec::new();
        let mut stack = vec![tree.root_node()];
        while let Some(node) = stack.pop() {
            if definitions.contains(&node.kind()) {
                snippets.push(snippet_for(node, source));
            }
            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
        Ok(snippets)
    }
}

impl SnippetExtractor for TreeSitterExtractor {
    fn extract(&self, path: &str, contents: &str) -> ExtractionResult<Vec<Snippet>> {
        let language =
            detect_language(path).ok_or_else(|| ExtractionError::Unsupported(path.to_string()))?;
        self.extract_language(path, &language, contents)
    }
}

fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or_default()
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

/// Header text before the body, or the first line when there is no body.
fn signature_for(node: Node<'_>, source: &str) -> String {
    let header = match node.child_by_field_name("body") {
        Some(body) => source
            .get(node.start_byte()..body.start_byte())
            .unwrap_or_default(),
        None => node_text(node, source).lines().next().unwrap_or_default(),
    };
    collapse_whitespace(header)
        .trim_end_matches([':', '{'])
        .trim_end()
        .to_string()
}

fn snippet_for(node: Node<'_>, source: &str) -> Snippet {
    let title = node
        .child_by_field_name("name")
        .map(|name| node_text(name, source).to_string())
        .unwrap_or_default();
    Snippet {
        title,
        body: node_text(node, source).to_string(),
        signature: signature_for(node, source),
        start_line: node.start_position().row as i64,
        end_line: node.end_position().row as i64,
    }
}
