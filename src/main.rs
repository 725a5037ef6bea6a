use clap::{Args, Parser as ClapParser, Subcommand};
use motif_lang::cli::{self, CheckOptions, CliError, InputKind};
use std::io::{self, Read};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "motif")]
#[command(about = "Motif - parse, validate and explain Motif views, queries, funnels and segments")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Motif source text (reads from stdin if not provided)
    source: Option<String>,

    /// What the source holds
    #[arg(short, long, value_enum, default_value_t = InputKind::Statements)]
    kind: InputKind,

    /// Schema expressions and views bind against
    #[arg(short, long)]
    schema: Option<String>,

    /// Schema file to register before parsing (repeatable)
    #[arg(long = "schema-file")]
    schema_files: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate source text and print its canonical form
    Check(SourceArgs),

    /// Print the finalized syntax tree
    Explain(SourceArgs),

    /// Print the finalized syntax tree as tagged JSON
    Json {
        #[command(flatten)]
        args: SourceArgs,

        /// Pretty-print the output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Explain a schema file
    Schema {
        /// Path to the schema file
        file: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check(args) => run(args, |checked| Ok(checked.generate_motif())),
        Commands::Explain(args) => run(args, |checked| Ok(checked.explain())),
        Commands::Json { args, pretty } => run(args, |checked| Ok(checked.to_json(pretty)?)),
        Commands::Schema { file } => cli::explain_schema_file(&file).map(|text| print!("{}", text)),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: SourceArgs, render: impl FnOnce(&cli::Checked) -> Result<String, CliError>) -> Result<(), CliError> {
    let source = match args.source {
        Some(s) => s,
        None if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
        None => return Err(CliError::NoInput),
    };

    let options = CheckOptions {
        source,
        kind: args.kind,
        schema: args.schema,
        schema_files: args.schema_files,
    };

    let checked = cli::execute_check(&options)?;
    println!("{}", render(&checked)?);
    Ok(())
}
