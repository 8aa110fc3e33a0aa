//! nl2sparql CLI
//!
//! - `compile`: five-list IR (JSON or list literals) -> SPARQL
//! - `ask`: natural-language question -> IR (chat model) -> SPARQL
//! - `schema`: inspect what a schema file declares

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use nl2sparql_compiler::{
    AcceptProposed, CompiledQuery, Compiler, CompilerConfig, ManualResolver, MappingConfirmer,
    RejectUnmapped, SynonymTable,
};
use nl2sparql_ir::{parse_ir_lists, QueryIr};
use nl2sparql_llm::{annotated_wordlist, ChatQueryParser, LlmConfig, QueryParser};
use nl2sparql_schema::{EntityKind, SchemaIndex};

mod console;

use console::{Console, Terminal};

#[derive(Parser)]
#[command(name = "nl2sparql")]
#[command(author, version, about = "Compile parsed natural-language questions into SPARQL")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an IR file into a SPARQL query.
    Compile {
        /// IR file: `.json`, or `L1 = [...]` .. `L5 = [...]` list literals
        ir: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Parse a question with the chat model, then compile it.
    ///
    /// Reads OPENAI_API_KEY, OPENAI_MODEL and OPENAI_BASE_URL.
    Ask {
        question: String,
        /// Send the schema's multi-word names along with the question
        #[arg(long)]
        wordlist: bool,
        /// Also print the parsed IR as JSON
        #[arg(long)]
        show_ir: bool,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Print the entities of a schema file.
    Schema {
        schema: PathBuf,
        /// Print the annotated multi-word list instead
        #[arg(long)]
        wordlist: bool,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Ontology schema (RDF/XML, Turtle or N-Triples)
    #[arg(short, long)]
    schema: PathBuf,
    /// Schema namespace (default: the namespace found in the schema file)
    #[arg(short, long)]
    namespace: Option<String>,
    /// Graph URI for the `FROM` clause
    #[arg(short, long)]
    graph: String,
    /// Compiler configuration JSON
    #[arg(long)]
    config: Option<PathBuf>,
    /// Synonym table JSON (`{"word": ["Entity", ...]}`)
    #[arg(long)]
    synonyms: Option<PathBuf>,
    /// Ask for unmapped words and confirm the mapping on the terminal
    #[arg(short, long)]
    interactive: bool,
    /// Write the query here instead of stdout
    #[arg(short, long)]
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Compile { ir, target } => {
            let ir = read_ir(&ir)?;
            cmd_compile(&ir, &target)
        }
        Commands::Ask {
            question,
            wordlist,
            show_ir,
            target,
        } => {
            let schema = load_schema(&target.schema)?;
            let mut parser = ChatQueryParser::new(LlmConfig::from_env()?)?;
            if wordlist {
                parser = parser.with_wordlist(annotated_wordlist(&schema));
            }
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;
            let ir = rt.block_on(parser.parse_query(&question))?;
            if show_ir {
                eprintln!("{}", ir.to_json_pretty());
            }
            cmd_compile(&ir, &target)
        }
        Commands::Schema { schema, wordlist } => cmd_schema(&schema, wordlist),
    }
}

fn load_schema(path: &Path) -> Result<SchemaIndex> {
    SchemaIndex::load(path).with_context(|| format!("loading schema {}", path.display()))
}

fn read_ir(path: &Path) -> Result<QueryIr> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let ir = if path.extension().is_some_and(|e| e == "json") {
        QueryIr::from_json(&text)?
    } else {
        parse_ir_lists(&text)?
    };
    Ok(ir)
}

fn cmd_compile(ir: &QueryIr, target: &TargetArgs) -> Result<()> {
    let schema = load_schema(&target.schema)?;
    let namespace = target
        .namespace
        .as_deref()
        .or(schema.namespace())
        .ok_or_else(|| anyhow!("schema declares no namespace; pass --namespace"))?
        .to_string();

    let config = match &target.config {
        Some(path) => CompilerConfig::from_json(&fs::read_to_string(path)?)
            .with_context(|| format!("parsing config {}", path.display()))?,
        None => CompilerConfig::default(),
    };
    let synonyms = match &target.synonyms {
        Some(path) => SynonymTable::from_json(&fs::read_to_string(path)?)
            .with_context(|| format!("parsing synonyms {}", path.display()))?,
        None => SynonymTable::new(),
    };

    let console = if target.interactive {
        Some(Console::new(Terminal::new()?))
    } else {
        None
    };
    let (resolver, confirmer): (&dyn ManualResolver, &dyn MappingConfirmer) = match &console {
        Some(c) => (c, c),
        None => (&RejectUnmapped, &AcceptProposed),
    };

    debug!(%namespace, graph = %target.graph, interactive = target.interactive, "compiling");
    let query = Compiler::new(&schema)
        .with_config(config)
        .with_synonyms(&synonyms)
        .with_resolver(resolver)
        .with_confirmer(confirmer)
        .compile(ir, &namespace, &target.graph)?;
    write_query(&query, target.out.as_deref())
}

fn write_query(query: &CompiledQuery, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            fs::write(path, format!("{query}\n"))?;
            eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
        }
        None => println!("{query}"),
    }
    Ok(())
}

fn cmd_schema(path: &Path, wordlist: bool) -> Result<()> {
    let schema = load_schema(path)?;
    if wordlist {
        println!("{}", annotated_wordlist(&schema));
        return Ok(());
    }
    if let Some(ns) = schema.namespace() {
        println!("{} {ns}", "namespace".bold());
    }
    for kind in EntityKind::ALL {
        let names = schema.names_of(kind);
        println!("{} ({})", kind.to_string().green().bold(), names.len());
        for name in names {
            println!("  {name}");
        }
    }
    Ok(())
}
