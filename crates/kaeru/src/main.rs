//! Kaeru: Neo4j CSV to Soufflé converter
//!
//! Main binary with subcommands:
//! - `node`: convert a single node file
//! - `relation`: convert a single relationship file
//! - `import`: convert a whole set of node and relationship files at once

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kaeru_datalog::{ConvertOptions, EntityKind, InputFile, RunReport, convert};
use miette::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod args;

use args::{LabeledPath, LayoutArg, OutputArgs, SharedArgs, declaration_name, parse_labeled_path};

#[derive(Parser)]
#[command(name = "kaeru")]
#[command(about = "Convert Neo4j CSV files into Soufflé facts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a node CSV file
    Node {
        /// Node CSV file
        #[arg(short = 'f', long)]
        file: PathBuf,

        /// Relation name to use instead of the file name
        #[arg(short = 'l', long)]
        label: Option<String>,

        /// Relation layout for node properties
        #[arg(short = 's', long, env = "KAERU_LAYOUT", value_enum, default_value_t = LayoutArg::Row)]
        layout: LayoutArg,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        shared: SharedArgs,
    },

    /// Convert a relationship CSV file
    Relation {
        /// Relationship CSV file
        #[arg(short = 'f', long)]
        file: PathBuf,

        /// Relationship type for rows without a :TYPE value
        #[arg(short = 'l', long)]
        label: Option<String>,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        shared: SharedArgs,
    },

    /// Convert node and relationship files into one program
    Import {
        /// Node files, optionally prefixed with a label (`Person=people.csv`)
        #[arg(
            long,
            num_args = 1..,
            value_parser = parse_labeled_path,
            required_unless_present = "relationships"
        )]
        nodes: Vec<LabeledPath>,

        /// Relationship files, optionally prefixed with a type (`KNOWS=knows.csv`)
        #[arg(long, num_args = 1.., value_parser = parse_labeled_path)]
        relationships: Vec<LabeledPath>,

        /// Relation layout for node properties
        #[arg(short = 's', long, env = "KAERU_LAYOUT", value_enum, default_value_t = LayoutArg::Row)]
        layout: LayoutArg,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        shared: SharedArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; the run summary goes to stdout.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "kaeru=info,kaeru_datalog=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Node {
            file,
            label,
            layout,
            output,
            shared,
        } => {
            let options = shared.options(&output, layout, &declaration_name(&file));
            let input = LabeledPath { label, path: file }.into_input(EntityKind::Node, &output.input_dir);
            run(vec![input], &output, &shared, &options).await
        }
        Commands::Relation {
            file,
            label,
            output,
            shared,
        } => {
            let options = shared.options(&output, LayoutArg::Row, &declaration_name(&file));
            let input = LabeledPath { label, path: file }
                .into_input(EntityKind::Relationship, &output.input_dir);
            run(vec![input], &output, &shared, &options).await
        }
        Commands::Import {
            nodes,
            relationships,
            layout,
            output,
            shared,
        } => {
            let options = shared.options(&output, layout, "schema.dl");
            let inputs = nodes
                .into_iter()
                .map(|n| n.into_input(EntityKind::Node, &output.input_dir))
                .chain(
                    relationships
                        .into_iter()
                        .map(|r| r.into_input(EntityKind::Relationship, &output.input_dir)),
                )
                .collect();
            run(inputs, &output, &shared, &options).await
        }
    }
}

async fn run(
    inputs: Vec<InputFile>,
    output: &OutputArgs,
    shared: &SharedArgs,
    options: &ConvertOptions,
) -> Result<()> {
    info!(
        files = inputs.len(),
        output = %output.output_dir.display(),
        "starting conversion"
    );

    let report = convert(inputs, &output.output_dir, options)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    if let Some(path) = &shared.report {
        report
            .write_json(path)
            .await
            .map_err(|e| miette::miette!("failed to write report: {}", e))?;
    }

    print_summary(&report);
    Ok(())
}

fn print_summary(report: &RunReport) {
    if let Some(path) = &report.declaration_file {
        println!("declarations: {}", path.display());
    }
    for file in &report.files {
        println!(
            "{}: {} rows written, {} skipped, {} values cleaned",
            file.file.display(),
            file.rows_written,
            file.rows_skipped,
            file.values_cleaned
        );
        for error in &file.errors {
            println!("  {}", error);
        }
        if file.rows_skipped as usize > file.errors.len() {
            println!(
                "  ... and {} more",
                file.rows_skipped as usize - file.errors.len()
            );
        }
    }
    for collision in &report.collisions {
        println!("renamed: {}", collision);
    }
    println!(
        "{} relations, {} rows written, {} rows skipped",
        report.relations,
        report.rows_written(),
        report.rows_skipped()
    );
}
