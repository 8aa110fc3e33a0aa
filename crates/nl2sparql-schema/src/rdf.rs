//! RDF statement reader (Sophia) for ontology schemas.
//!
//! Only IRI subjects/objects matter for the schema index; blank nodes (OWL
//! restrictions, list cells) are dropped here and literals keep just their
//! lexical form.

use std::path::Path;

use sophia::api::prelude::*;

use crate::SchemaLoadError;

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS_NS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const OWL_NS: &str = "http://www.w3.org/2002/07/owl#";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdfFormat {
    NTriples,
    Turtle,
    RdfXml,
}

impl RdfFormat {
    pub fn from_path(path: &Path) -> Result<Self, SchemaLoadError> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "nt" | "ntriples" => Ok(RdfFormat::NTriples),
            "ttl" | "turtle" => Ok(RdfFormat::Turtle),
            "rdf" | "owl" | "xml" => Ok(RdfFormat::RdfXml),
            other => Err(SchemaLoadError::UnsupportedFormat(other.to_string())),
        }
    }

    fn name(self) -> &'static str {
        match self {
            RdfFormat::NTriples => "N-Triples",
            RdfFormat::Turtle => "Turtle",
            RdfFormat::RdfXml => "RDF/XML",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RdfObject {
    Iri(String),
    Literal(String),
}

/// An `<iri> <iri> (<iri>|literal)` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub subject: String,
    pub predicate: String,
    pub object: RdfObject,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct SinkError(String);

enum Term {
    Iri(String),
    Blank,
    Literal(String),
}

fn parse_term_display(term: &str) -> Result<Term, SinkError> {
    let s = term.trim();
    if let Some(iri) = s.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        return Ok(Term::Iri(iri.to_string()));
    }
    if s.starts_with("_:") {
        return Ok(Term::Blank);
    }
    if let Some(rest) = s.strip_prefix('"') {
        let end = rest.rfind('"').unwrap_or(rest.len());
        return Ok(Term::Literal(rest[..end].to_string()));
    }
    Err(SinkError(format!("unsupported RDF term form: {s}")))
}

fn push_statement(out: &mut Vec<Statement>, s: &str, p: &str, o: &str) -> Result<(), SinkError> {
    let Term::Iri(subject) = parse_term_display(s)? else {
        return Ok(());
    };
    let Term::Iri(predicate) = parse_term_display(p)? else {
        return Ok(());
    };
    let object = match parse_term_display(o)? {
        Term::Iri(iri) => RdfObject::Iri(iri),
        Term::Literal(lexical) => RdfObject::Literal(lexical),
        Term::Blank => return Ok(()),
    };
    out.push(Statement {
        subject,
        predicate,
        object,
    });
    Ok(())
}

fn parse_error(format: RdfFormat, e: impl std::fmt::Display) -> SchemaLoadError {
    SchemaLoadError::Parse {
        format: format.name(),
        message: e.to_string(),
    }
}

pub fn parse_statements(bytes: &[u8], format: RdfFormat) -> Result<Vec<Statement>, SchemaLoadError> {
    let reader = std::io::BufReader::new(std::io::Cursor::new(bytes));
    let mut out: Vec<Statement> = Vec::new();

    match format {
        RdfFormat::NTriples => sophia::turtle::parser::nt::parse_bufread(reader)
            .try_for_each_triple(|t| {
                push_statement(&mut out, &t.s().to_string(), &t.p().to_string(), &t.o().to_string())
            })
            .map_err(|e| parse_error(format, e))?,
        RdfFormat::Turtle => sophia::turtle::parser::turtle::parse_bufread(reader)
            .try_for_each_triple(|t| {
                push_statement(&mut out, &t.s().to_string(), &t.p().to_string(), &t.o().to_string())
            })
            .map_err(|e| parse_error(format, e))?,
        RdfFormat::RdfXml => sophia::xml::parser::parse_bufread(reader)
            .try_for_each_triple(|t| {
                push_statement(&mut out, &t.s().to_string(), &t.p().to_string(), &t.o().to_string())
            })
            .map_err(|e| parse_error(format, e))?,
    }
    Ok(out)
}

/// Local part of an IRI (after the last `#` or `/`).
pub fn local_name(iri: &str) -> &str {
    iri.rsplit(['#', '/']).next().unwrap_or(iri)
}

/// Namespace part of an IRI (up to and including the last `#` or `/`).
pub fn namespace_of(iri: &str) -> &str {
    match iri.rfind(['#', '/']) {
        Some(i) => &iri[..=i],
        None => iri,
    }
}

pub fn is_standard_namespace(iri: &str) -> bool {
    [RDF_NS, RDFS_NS, OWL_NS, XSD_NS]
        .iter()
        .any(|ns| iri.starts_with(ns))
}
