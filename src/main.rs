//! sqltemplate CLI
//!
//! Usage:
//!   sqltemplate [OPTIONS] [FILE]
//!
//! Options:
//!   -d, --data <FILE>     JSON data to execute against
//!   -c, --config <FILE>   Options file (TOML format)
//!   -n, --name <NAME>     Associated template to execute
//!   --inline              Write values into the text instead of binding them
//!   --json                Print {"text": ..., "args": [...]}
//!   -v, --verbose         Log parse and execution steps to stderr
//!   -h, --help            Print help

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing::Level;

use sqltemplate::{Mode, Options, Template, Value};

#[derive(Parser)]
#[command(name = "sqltemplate")]
#[command(about = "Render templates into parameterized SQL text plus arguments")]
struct Cli {
    /// Template file (reads from stdin if not provided)
    input: Option<PathBuf>,

    /// JSON data file
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Options file (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Execute this associated template instead of the root
    #[arg(short, long)]
    name: Option<String>,

    /// Inline values as text; no arguments are collected
    #[arg(long)]
    inline: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Log parse and execution steps to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_target(false)
        .init();

    let mut options = match &cli.config {
        Some(path) => Options::from_file(path).unwrap_or_else(|e| {
            fail(&format!("Error loading config '{}': {}", path.display(), e))
        }),
        None => Options::default(),
    };
    if cli.inline {
        options = options.with_mode(Mode::Inline);
    }

    let (source, filename) = match &cli.input {
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => (content, path.display().to_string()),
            Err(e) => fail(&format!("Error reading file '{}': {}", path.display(), e)),
        },
        None => {
            let mut buffer = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut buffer) {
                fail(&format!("Error reading from stdin: {}", e));
            }
            (buffer, "<stdin>".to_string())
        }
    };

    let data = match &cli.data {
        Some(path) => load_data(path),
        None => Value::Nil,
    };

    let template = match Template::new("main").with_options(options).parse(&source) {
        Ok(t) => t,
        Err(e) => fail(&e.format(&source, &filename)),
    };

    let result = match &cli.name {
        Some(name) => template.execute_template(name, &data),
        None => template.execute(&data),
    };

    match result {
        Ok(rendered) if cli.json => match serde_json::to_string_pretty(&rendered) {
            Ok(json) => println!("{}", json),
            Err(e) => fail(&format!("Error encoding result: {}", e)),
        },
        Ok(rendered) => {
            println!("{}", rendered.text);
            for (i, arg) in rendered.args.iter().enumerate() {
                println!("-- ${} = {}", i + 1, arg);
            }
        }
        Err(e) => fail(&format!("Error: {}", e)),
    }
}

fn load_data(path: &Path) -> Value {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| fail(&format!("Error reading data '{}': {}", path.display(), e)));
    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(json) => Value::from(json),
        Err(e) => fail(&format!("Error parsing data '{}': {}", path.display(), e)),
    }
}

fn fail(message: &str) -> ! {
    eprintln!("{}", message);
    process::exit(1);
}
