//! Query parsing for lexical search.
//!
//! Grammar: bare words are terms, `"..."` is an exact phrase, uppercase
//! `OR` separates alternatives and uppercase `AND` is accepted but implicit.
//! AND binds tighter than OR, so a query parses to disjunctive normal form:
//! a list of groups, each of which requires all of its clauses.
//!
//! A bare word that tokenizes to several tokens (`docker-compose`) is
//! treated as a phrase.

use std::collections::BTreeSet;

use crate::chunk::tokenize;
use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Clause {
    Term(String),
    Phrase(Vec<String>),
}

impl Clause {
    /// Tokens this clause needs to find.
    pub fn tokens(&self) -> &[String] {
        match self {
            Clause::Term(t) => std::slice::from_ref(t),
            Clause::Phrase(ts) => ts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    pub groups: Vec<Vec<Clause>>,
}

impl ParsedQuery {
    /// Every distinct token referenced anywhere in the query, sorted.
    pub fn terms(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self
            .groups
            .iter()
            .flatten()
            .flat_map(|c| c.tokens().iter())
            .collect();
        set.into_iter().cloned().collect()
    }
}

enum Lexeme {
    Word(String),
    Quoted(String),
}

fn lex(query: &str) -> Vec<Lexeme> {
    let mut out = Vec::new();
    let mut word = String::new();
    let mut chars = query.chars();

    while let Some(c) = chars.next() {
        if c == '"' {
            if !word.is_empty() {
                out.push(Lexeme::Word(std::mem::take(&mut word)));
            }
            // An unterminated quote runs to the end of the query.
            let phrase: String = chars.by_ref().take_while(|c| *c != '"').collect();
            out.push(Lexeme::Quoted(phrase));
        } else if c.is_whitespace() {
            if !word.is_empty() {
                out.push(Lexeme::Word(std::mem::take(&mut word)));
            }
        } else {
            word.push(c);
        }
    }
    if !word.is_empty() {
        out.push(Lexeme::Word(word));
    }
    out
}

fn clause_from(text: &str) -> Option<Clause> {
    let mut tokens: Vec<String> = tokenize(text).into_iter().map(|t| t.text).collect();
    match tokens.len() {
        0 => None,
        1 => tokens.pop().map(Clause::Term),
        _ => Some(Clause::Phrase(tokens)),
    }
}

/// Parse a user query. A query with no searchable token is `INVALID_INPUT`.
pub fn parse(query: &str) -> Result<ParsedQuery> {
    let mut groups: Vec<Vec<Clause>> = Vec::new();
    let mut current: Vec<Clause> = Vec::new();

    for lexeme in lex(query) {
        let clause = match lexeme {
            Lexeme::Word(w) if w == "OR" => {
                if !current.is_empty() {
                    groups.push(std::mem::take(&mut current));
                }
                continue;
            }
            Lexeme::Word(w) if w == "AND" => continue,
            Lexeme::Word(w) => clause_from(&w),
            Lexeme::Quoted(q) => clause_from(&q),
        };
        if let Some(clause) = clause {
            if !current.contains(&clause) {
                current.push(clause);
            }
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }

    if groups.is_empty() {
        return Err(LedgerError::invalid(format!(
            "query '{query}' contains no searchable terms"
        )));
    }
    Ok(ParsedQuery { groups })
}
