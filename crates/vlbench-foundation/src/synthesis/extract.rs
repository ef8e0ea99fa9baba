//! Source extraction and constructor naming
//!
//! The code-generation response must contain the marker line. The first
//! line that equals the marker (ignoring trailing whitespace and `\r`)
//! starts the candidate source: everything after that line's newline,
//! later marker lines included. There is no fallback.

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};
use vlbench_kernel::{ADAPTER_NAME_SUFFIX, DispatchError, ModelIdentifier};

/// Line separating the response preamble from the generated source
pub const MARKER: &str = "# GENERATED_ADAPTER_CODE";

// Only used when the source does not parse
static CONSTRUCTOR_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:private[ \t]+)?fn[ \t]+([A-Za-z_][A-Za-z0-9_]*ResponseGenerator)[ \t]*\(")
        .expect("static pattern")
});

fn is_marker_line(line: &str) -> bool {
    line.trim_end() == MARKER
}

/// Everything strictly after the first marker line
pub fn extract_source(response: &str, identifier: &ModelIdentifier) -> Result<String, DispatchError> {
    let mut offset = 0;
    let mut lines = response.split_inclusive('\n');

    for line in lines.by_ref() {
        offset += line.len();
        if is_marker_line(line) {
            let source = &response[offset..];
            let repeated = source.split_inclusive('\n').filter(|l| is_marker_line(l)).count();
            if repeated > 0 {
                warn!(
                    %identifier,
                    repeated,
                    "synthesis response repeats the marker line; using the first occurrence"
                );
            }
            return Ok(source.to_string());
        }
    }

    Err(DispatchError::SynthesisExtraction {
        identifier: identifier.clone(),
        marker: MARKER.to_string(),
    })
}

/// Whether a function name follows the constructor naming convention
pub fn is_constructor_name(name: &str) -> bool {
    name.len() > ADAPTER_NAME_SUFFIX.len() && name.ends_with(ADAPTER_NAME_SUFFIX)
}

/// Distinct constructor names among `names`, sorted
pub fn constructor_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut found: Vec<String> = names
        .into_iter()
        .filter(|name| is_constructor_name(name))
        .map(str::to_string)
        .collect();
    found.sort();
    found.dedup();
    found
}

/// Every distinct constructor name declared in `source`, sorted
///
/// Names come from the parsed function list, so comments and string
/// literals never count. Source that does not parse is scanned line by line
/// instead; the loader rejects it later.
pub fn declared_constructors(source: &str) -> Vec<String> {
    match rhai::Engine::new_raw().compile(source) {
        Ok(ast) => constructor_names(ast.iter_functions().map(|f| f.name)),
        Err(err) => {
            debug!(%err, "generated source does not parse, scanning declarations by line");
            constructor_names(
                CONSTRUCTOR_DECL
                    .captures_iter(source)
                    .filter_map(|caps| caps.get(1))
                    .map(|m| m.as_str()),
            )
        }
    }
}

/// The single declared name ending in `ResponseGenerator`
pub fn derive_class_name(source: &str, identifier: &ModelIdentifier) -> Result<String, DispatchError> {
    let mut names = declared_constructors(source);
    if names.len() == 1 {
        if let Some(name) = names.pop() {
            return Ok(name);
        }
    }
    Err(DispatchError::SynthesisNaming {
        identifier: identifier.clone(),
        suffix: ADAPTER_NAME_SUFFIX.to_string(),
        found: names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> ModelIdentifier {
        ModelIdentifier::new("vendor/new-model")
    }

    #[test]
    fn source_after_single_marker_is_exact() {
        let source = "fn FooResponseGenerator(ctx) { #{} }\n";
        let response = format!("Here you go:\n{}\n{}", MARKER, source);
        assert_eq!(extract_source(&response, &id()).unwrap(), source);
    }

    #[test]
    fn marker_with_crlf_and_trailing_spaces() {
        let response = format!("preamble\r\n{}  \r\nlet x = 1;\r\n", MARKER);
        assert_eq!(extract_source(&response, &id()).unwrap(), "let x = 1;\r\n");
    }

    #[test]
    fn missing_marker_is_extraction_error() {
        let err = extract_source("fn FooResponseGenerator(ctx) {}", &id()).unwrap_err();
        assert!(matches!(err, DispatchError::SynthesisExtraction { ref marker, .. } if marker == MARKER));
    }

    #[test]
    fn indented_or_inline_marker_does_not_count() {
        let response = format!("  {}\ncode\nnote: {}\n", MARKER, MARKER);
        assert!(extract_source(&response, &id()).is_err());
    }

    #[test]
    fn first_of_two_markers_wins() {
        let response = format!("a\n{m}\nfirst\n{m}\nsecond\n", m = MARKER);
        assert_eq!(
            extract_source(&response, &id()).unwrap(),
            format!("first\n{}\nsecond\n", MARKER)
        );
    }

    #[test]
    fn marker_on_last_line_gives_empty_source() {
        let response = format!("text\n{}", MARKER);
        assert_eq!(extract_source(&response, &id()).unwrap(), "");
    }

    #[test]
    fn single_constructor_name() {
        let source = "// FooResponseGenerator is the adapter\nfn FooResponseGenerator(ctx) { #{} }\n\
                      fn generate_response(q, p) { \"\" }\nfn FooResponseGenerator(a, b) { () }\n";
        assert_eq!(derive_class_name(source, &id()).unwrap(), "FooResponseGenerator");
    }

    #[test]
    fn zero_or_many_names_fail() {
        let none = derive_class_name("fn ResponseGenerator(ctx) {}\nfn helper() {}", &id()).unwrap_err();
        assert!(matches!(none, DispatchError::SynthesisNaming { ref found, .. } if found.is_empty()));

        let two = derive_class_name(
            "fn FooResponseGenerator(ctx) {}\nfn BarResponseGenerator(ctx) {}",
            &id(),
        )
        .unwrap_err();
        assert!(matches!(
            two,
            DispatchError::SynthesisNaming { ref found, .. }
                if found == &vec!["BarResponseGenerator".to_string(), "FooResponseGenerator".to_string()]
        ));
    }

    #[test]
    fn names_in_comments_and_strings_do_not_count() {
        let source = "/*\nfn BarResponseGenerator(ctx) { #{} }\n*/\n\
                      fn FooResponseGenerator(ctx) { #{ usage: `\nfn BazResponseGenerator(ctx) is not here` } }\n\
                      fn generate_response(q, p) { this.usage }\n";
        assert_eq!(derive_class_name(source, &id()).unwrap(), "FooResponseGenerator");
    }

    #[test]
    fn unparsable_source_falls_back_to_line_scan() {
        let source = "fn FooResponseGenerator(ctx) { #{ \n";
        assert_eq!(declared_constructors(source), vec!["FooResponseGenerator".to_string()]);
    }
}
