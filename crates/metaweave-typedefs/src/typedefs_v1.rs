//! `.typedefs` dialect: `typedefs_v1`
//!
//! One declaration per line (relationship declarations may wrap across lines
//! while their parenthesis block is open):
//!
//! ```text
//! module OpenMetadataTypes
//!
//! entity Referenceable
//! entity Comment < Referenceable @owned
//! classification Anchors
//! relationship AttachedComment(end1: Referenceable, end2: Comment) @at_most_one end2
//! ```
//!
//! Notes:
//! - `@owned` marks an entity type that has no existence independent of the
//!   relationship attaching it (ratings, comments, likes).
//! - `@at_most_one endN` declares the default cardinality: each instance at
//!   that end may carry at most one relationship of the type.
//! - The parser only checks syntax. Unknown supertypes, dangling end types and
//!   duplicate names are reported when a registry is built from the module.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char as pchar, multispace0, multispace1},
    combinator::{all_consuming, opt, recognize},
    sequence::{preceded, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Name = String;

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeDefModuleV1 {
    pub module_name: Name,
    pub entities: Vec<EntityDefV1>,
    pub classifications: Vec<ClassificationDefV1>,
    pub relationships: Vec<RelationshipDefV1>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityDefV1 {
    pub name: Name,
    pub supertype: Option<Name>,
    /// Deleted together with the relationship that attaches it.
    pub relationship_owned: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassificationDefV1 {
    pub name: Name,
    pub supertype: Option<Name>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndDefV1 {
    /// Attribute name of the end (`end1`, `parent`, ...).
    pub attribute: Name,
    pub entity_type: Name,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EndSelectorV1 {
    End1,
    End2,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelationshipDefV1 {
    pub name: Name,
    pub end1: EndDefV1,
    pub end2: EndDefV1,
    pub at_most_one: Option<EndSelectorV1>,
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeDefParseError {
    #[error("parse error on line {line}: {message}")]
    Line { line: usize, message: String },
}

pub fn parse_typedefs_v1(text: &str) -> Result<TypeDefModuleV1, TypeDefParseError> {
    let mut module = TypeDefModuleV1 {
        module_name: "Unnamed".to_string(),
        entities: vec![],
        classifications: vec![],
        relationships: vec![],
    };

    let lines: Vec<&str> = text.lines().collect();

    let mut i = 0usize;
    while i < lines.len() {
        let line_no = i + 1;
        let line = strip_comment(lines[i]).trim();
        if line.is_empty() {
            i += 1;
            continue;
        }

        if let Some(name) = line
            .strip_prefix("module ")
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            module.module_name = name.to_string();
            i += 1;
            continue;
        }

        if let Some(rest) = line.strip_prefix("entity ") {
            let entity =
                parse_entity_decl(rest).map_err(|message| TypeDefParseError::Line {
                    line: line_no,
                    message,
                })?;
            module.entities.push(entity);
            i += 1;
            continue;
        }

        if let Some(rest) = line.strip_prefix("classification ") {
            let classification =
                parse_classification_decl(rest).map_err(|message| TypeDefParseError::Line {
                    line: line_no,
                    message,
                })?;
            module.classifications.push(classification);
            i += 1;
            continue;
        }

        if line.starts_with("relationship ") {
            let (combined, next_index) =
                collect_balanced_parens(lines.as_slice(), i, "relationship").map_err(
                    |message| TypeDefParseError::Line {
                        line: line_no,
                        message,
                    },
                )?;
            let relationship =
                parse_relationship_decl(&combined).map_err(|message| TypeDefParseError::Line {
                    line: line_no,
                    message,
                })?;
            module.relationships.push(relationship);
            i = next_index;
            continue;
        }

        return Err(TypeDefParseError::Line {
            line: line_no,
            message: format!("unrecognized typedefs line: {line}"),
        });
    }

    Ok(module)
}

fn strip_comment(line: &str) -> &str {
    if let Some((before, _)) = line.split_once('#') {
        return before;
    }
    line.split_once("--").map(|(a, _)| a).unwrap_or(line)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn parse_ident(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        take_while1(is_ident_start),
        take_while(is_ident_continue),
    )))(input)
}

fn supertype_clause(input: &str) -> IResult<&str, &str> {
    preceded(
        tuple((multispace1, alt((tag("<:"), tag("<"))), multispace1)),
        parse_ident,
    )(input)
}

fn parse_entity_decl(rest: &str) -> Result<EntityDefV1, String> {
    fn parser(input: &str) -> IResult<&str, EntityDefV1> {
        let (input, name) = parse_ident(input)?;
        let (input, supertype) = opt(supertype_clause)(input)?;
        let (input, owned) = opt(preceded(multispace1, tag("@owned")))(input)?;
        let (input, _) = multispace0(input)?;
        Ok((
            input,
            EntityDefV1 {
                name: name.to_string(),
                supertype: supertype.map(str::to_string),
                relationship_owned: owned.is_some(),
            },
        ))
    }

    all_consuming(parser)(rest.trim())
        .map(|(_, v)| v)
        .map_err(|_| "entity expects: `entity <Name> [< <Super>] [@owned]`".to_string())
}

fn parse_classification_decl(rest: &str) -> Result<ClassificationDefV1, String> {
    fn parser(input: &str) -> IResult<&str, ClassificationDefV1> {
        let (input, name) = parse_ident(input)?;
        let (input, supertype) = opt(supertype_clause)(input)?;
        let (input, _) = multispace0(input)?;
        Ok((
            input,
            ClassificationDefV1 {
                name: name.to_string(),
                supertype: supertype.map(str::to_string),
            },
        ))
    }

    all_consuming(parser)(rest.trim())
        .map(|(_, v)| v)
        .map_err(|_| "classification expects: `classification <Name> [< <Super>]`".to_string())
}

fn collect_balanced_parens(
    lines: &[&str],
    start_index: usize,
    keyword: &str,
) -> Result<(String, usize), String> {
    let mut depth: i32 = 0;
    let mut combined = String::new();

    let mut i = start_index;
    while i < lines.len() {
        let line = strip_comment(lines[i]).trim();
        if line.is_empty() {
            i += 1;
            continue;
        }
        if combined.is_empty() && !line.starts_with(keyword) {
            return Err(format!("expected `{keyword}` declaration"));
        }

        if !combined.is_empty() {
            combined.push(' ');
        }
        combined.push_str(line);

        for ch in line.chars() {
            if ch == '(' {
                depth += 1;
            } else if ch == ')' {
                depth -= 1;
            }
        }

        i += 1;
        if depth <= 0 {
            break;
        }
    }

    if depth != 0 {
        return Err("unclosed parenthesis block".to_string());
    }
    Ok((combined, i))
}

fn parse_relationship_decl(line: &str) -> Result<RelationshipDefV1, String> {
    fn end_decl(input: &str) -> IResult<&str, EndDefV1> {
        let (input, attribute) = preceded(multispace0, parse_ident)(input)?;
        let (input, _) = preceded(multispace0, pchar(':'))(input)?;
        let (input, _) = multispace0(input)?;
        let (input, ty) = parse_ident(input)?;
        let (input, _) = multispace0(input)?;
        Ok((
            input,
            EndDefV1 {
                attribute: attribute.to_string(),
                entity_type: ty.to_string(),
            },
        ))
    }

    fn end_selector(input: &str) -> IResult<&str, EndSelectorV1> {
        let (input, end) = alt((tag("end1"), tag("end2")))(input)?;
        let selector = if end == "end1" {
            EndSelectorV1::End1
        } else {
            EndSelectorV1::End2
        };
        Ok((input, selector))
    }

    fn parser(input: &str) -> IResult<&str, RelationshipDefV1> {
        let (input, _) = tag("relationship")(input)?;
        let (input, _) = multispace1(input)?;
        let (input, name) = parse_ident(input)?;
        let (input, _) = preceded(multispace0, pchar('('))(input)?;
        let (input, end1) = end_decl(input)?;
        let (input, _) = pchar(',')(input)?;
        let (input, end2) = end_decl(input)?;
        let (input, _) = pchar(')')(input)?;
        let (input, at_most_one) = opt(preceded(
            tuple((multispace1, tag("@at_most_one"), multispace1)),
            end_selector,
        ))(input)?;
        let (input, _) = multispace0(input)?;
        Ok((
            input,
            RelationshipDefV1 {
                name: name.to_string(),
                end1,
                end2,
                at_most_one,
            },
        ))
    }

    all_consuming(parser)(line.trim())
        .map(|(_, v)| v)
        .map_err(|_| {
            "relationship expects: `relationship Name(end1: Ty, end2: Ty)` (optionally followed by `@at_most_one end1|end2`)".to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entity_with_supertype_and_owned_marker() {
        let entity = parse_entity_decl("Rating < Referenceable @owned").expect("parse");
        assert_eq!(entity.name, "Rating");
        assert_eq!(entity.supertype.as_deref(), Some("Referenceable"));
        assert!(entity.relationship_owned);
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse_entity_decl("Rating < Referenceable extra").is_err());
    }

    #[test]
    fn relationship_may_wrap_lines() {
        let text = "relationship AttachedLike(\n  end1: Referenceable,\n  end2: Like\n) @at_most_one end2\n";
        let module = parse_typedefs_v1(text).expect("parse");
        assert_eq!(module.relationships.len(), 1);
        let rel = &module.relationships[0];
        assert_eq!(rel.end2.entity_type, "Like");
        assert_eq!(rel.at_most_one, Some(EndSelectorV1::End2));
    }
}
