//! Interactive mapping: ask the user for unresolved words and let them
//! review the final table.
//!
//! By default lines come from `rustyline`; a plain stdin reader is used when
//! the crate is built with `--no-default-features`.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};

use colored::Colorize;
use nl2sparql_compiler::{CollaboratorError, ManualResolver, MappedEntity, MappingConfirmer};
use nl2sparql_schema::SchemaIndex;

/// Where answers come from. `Ok(None)` means end of input.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, String>;
}

#[cfg(feature = "console-rustyline")]
pub struct Terminal {
    editor: rustyline::DefaultEditor,
}

#[cfg(feature = "console-rustyline")]
impl Terminal {
    pub fn new() -> anyhow::Result<Self> {
        let editor = rustyline::DefaultEditor::new()
            .map_err(|e| anyhow::anyhow!("failed to init rustyline: {e}"))?;
        Ok(Self { editor })
    }
}

#[cfg(feature = "console-rustyline")]
impl LineSource for Terminal {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, String> {
        use rustyline::error::ReadlineError;
        match self.editor.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => Ok(None),
            Err(e) => Err(format!("readline error: {e}")),
        }
    }
}

#[cfg(not(feature = "console-rustyline"))]
pub struct Terminal;

#[cfg(not(feature = "console-rustyline"))]
impl Terminal {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self)
    }
}

#[cfg(not(feature = "console-rustyline"))]
impl LineSource for Terminal {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, String> {
        use std::io::Write;
        print!("{prompt}");
        std::io::stdout().flush().map_err(|e| e.to_string())?;
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(line)),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Canned answers, one per prompt.
#[derive(Debug, Default)]
pub struct Scripted {
    answers: VecDeque<String>,
}

impl Scripted {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl LineSource for Scripted {
    fn read_line(&mut self, _prompt: &str) -> Result<Option<String>, String> {
        Ok(self.answers.pop_front())
    }
}

/// Resolver and confirmer backed by one line source.
pub struct Console<L> {
    lines: RefCell<L>,
}

impl<L: LineSource> Console<L> {
    pub fn new(lines: L) -> Self {
        Self {
            lines: RefCell::new(lines),
        }
    }

    fn ask(&self, prompt: &str, collaborator: &'static str) -> Result<Option<String>, CollaboratorError> {
        self.lines
            .borrow_mut()
            .read_line(prompt)
            .map(|line| line.map(|l| l.trim().to_string()))
            .map_err(|message| CollaboratorError::Failed {
                collaborator,
                message,
            })
    }
}

impl<L: LineSource> ManualResolver for Console<L> {
    fn resolve_unmapped(
        &self,
        words: &[String],
        schema: &SchemaIndex,
    ) -> Result<BTreeMap<String, String>, CollaboratorError> {
        let mut out = BTreeMap::new();
        for word in words {
            loop {
                let prompt = format!("schema entity for `{word}` (empty to skip): ");
                let Some(answer) = self.ask(&prompt, "console resolver")? else {
                    return Ok(out);
                };
                if answer.is_empty() {
                    break;
                }
                if schema.contains(&answer) {
                    out.insert(word.clone(), answer);
                    break;
                }
                eprintln!("{} `{answer}` is not in the schema", "warning:".yellow().bold());
            }
        }
        Ok(out)
    }
}

impl<L: LineSource> MappingConfirmer for Console<L> {
    fn confirm_mapping(
        &self,
        proposed: &BTreeMap<String, MappedEntity>,
    ) -> Result<BTreeMap<String, String>, CollaboratorError> {
        eprintln!("{}", "Proposed mapping".green().bold());
        for (word, entity) in proposed {
            eprintln!("  {word} -> {} ({})", entity.name.bold(), entity.kind);
        }

        let mut table: BTreeMap<String, String> = proposed
            .iter()
            .map(|(w, e)| (w.clone(), e.name.clone()))
            .collect();
        let answer = self
            .ask("accept? [Y/n/edit] ", "console confirmer")?
            .unwrap_or_default()
            .to_lowercase();
        match answer.as_str() {
            "" | "y" | "yes" => Ok(table),
            "e" | "edit" => {
                for (word, name) in table.iter_mut() {
                    let prompt = format!("{word} [{name}]: ");
                    match self.ask(&prompt, "console confirmer")? {
                        Some(a) if !a.is_empty() => *name = a,
                        _ => {}
                    }
                }
                Ok(table)
            }
            _ => Err(CollaboratorError::Declined {
                collaborator: "console confirmer",
                reason: "mapping rejected by the user".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nl2sparql_schema::{EntityKind, SchemaBuilder};

    fn proposal() -> BTreeMap<String, MappedEntity> {
        BTreeMap::from([
            (
                "point".to_string(),
                MappedEntity {
                    name: "Point".into(),
                    kind: EntityKind::Class,
                },
            ),
            (
                "tower".to_string(),
                MappedEntity {
                    name: "Building".into(),
                    kind: EntityKind::Class,
                },
            ),
        ])
    }

    #[test]
    fn resolver_reprompts_until_known_or_skipped() {
        let schema = SchemaBuilder::new().class("Building").class("Point").build();
        let console = Console::new(Scripted::new(&["Bilding", "Building", ""]));
        let words = vec!["tower".to_string(), "weather".to_string()];
        let out = console.resolve_unmapped(&words, &schema).unwrap();
        assert_eq!(out, BTreeMap::from([("tower".to_string(), "Building".to_string())]));
    }

    #[test]
    fn confirmer_accepts_edits_and_declines() {
        let accepted = Console::new(Scripted::new(&[""])).confirm_mapping(&proposal()).unwrap();
        assert_eq!(accepted["tower"], "Building");

        let edited = Console::new(Scripted::new(&["edit", "", "Church"]))
            .confirm_mapping(&proposal())
            .unwrap();
        assert_eq!(edited["point"], "Point");
        assert_eq!(edited["tower"], "Church");

        let declined = Console::new(Scripted::new(&["n"])).confirm_mapping(&proposal());
        assert!(matches!(declined, Err(CollaboratorError::Declined { .. })));
    }
}
